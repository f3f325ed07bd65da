//! Main PhoneAgent type for orchestrating phone automation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;

use crate::actions::{
    Action, ActionError, ActionHandler, ActionParser, ActionResult, ConfirmationCallback,
    ParserMode, Reply, TakeoverCallback,
};
use crate::adb::AdbDevice;
use crate::config::{get_messages, get_system_prompt, package_for_alias, render_prompt};
use crate::device::Device;
use crate::model::{ChatModel, ModelClient, ModelConfig, ModelError, ToolDef};

use super::conversation::Conversation;

/// Final message of a run that exhausted its step budget.
pub const MAX_STEPS_REACHED: &str = "Max steps reached";

/// Label used when the foreground app cannot be determined.
const UNKNOWN_APP: &str = "Unknown";

/// Agent errors.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Task required for first step")]
    TaskRequired,
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
    #[error("Action error: {0}")]
    Parse(ActionError),
    #[error("Task cancelled")]
    Cancelled,
}

/// Configuration for the PhoneAgent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum number of steps before stopping.
    pub max_steps: u32,
    /// Optional ADB device ID for multi-device setups.
    pub device_id: Option<String>,
    /// Language code ("cn" for Chinese, "en" for English).
    pub lang: String,
    /// How the model encodes its actions.
    pub mode: ParserMode,
    /// Custom system prompt template (if None, uses the built-in one for lang and mode).
    pub system_prompt: Option<String>,
    /// Whether to print verbose output.
    pub verbose: bool,
    /// Pause between the keyboard sub-steps of a Type action.
    pub settle_delay: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 100,
            device_id: None,
            lang: "cn".to_string(),
            mode: ParserMode::default(),
            system_prompt: None,
            verbose: true,
            settle_delay: Duration::from_secs(1),
        }
    }
}

impl AgentConfig {
    /// Create a new AgentConfig with custom device ID.
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Create a new AgentConfig with custom language.
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// Create a new AgentConfig with custom max steps.
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_mode(mut self, mode: ParserMode) -> Self {
        self.mode = mode;
        self
    }

    /// Use a custom system prompt template. `{{ datetime }}` is substituted.
    pub fn with_system_prompt(mut self, template: impl Into<String>) -> Self {
        self.system_prompt = Some(template.into());
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Create a new AgentConfig with verbose output disabled.
    pub fn quiet(mut self) -> Self {
        self.verbose = false;
        self
    }

    /// Rendered system prompt (custom or built-in).
    pub fn get_system_prompt(&self) -> String {
        match &self.system_prompt {
            Some(template) => render_prompt(template, &self.lang),
            None => get_system_prompt(&self.lang, self.mode),
        }
    }
}

/// Result of a single agent step.
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Whether the action was successful.
    pub success: bool,
    /// Whether the task is finished.
    pub finished: bool,
    /// The action that was executed.
    pub action: Option<Action>,
    /// The thinking process from the model.
    pub thinking: String,
    /// Optional message (e.g., finish message).
    pub message: Option<String>,
}

impl StepResult {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            finished: false,
            action: None,
            thinking: String::new(),
            message: Some(message.into()),
        }
    }
}

/// Where the agent is in its task lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    /// No conversation yet.
    Idle,
    /// A step is in flight.
    Stepping,
    /// The last step was recorded and the task goes on.
    AwaitingNextStep,
    /// The task ended.
    Finished,
}

/// AI-powered agent for automating Android phone interactions.
///
/// The agent uses a vision-language model to understand screen content
/// and decide on actions to complete user tasks.
///
/// # Example
///
/// ```rust,no_run
/// use adb_agent::{AgentConfig, ModelConfig, PhoneAgent};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let model_config = ModelConfig::default();
///     let agent_config = AgentConfig::default();
///
///     let mut agent = PhoneAgent::new(model_config, agent_config, None, None);
///     let result = agent.run("Open Settings").await?;
///
///     println!("Task result: {}", result);
///     Ok(())
/// }
/// ```
pub struct PhoneAgent {
    model: Box<dyn ChatModel>,
    device: Arc<dyn Device>,
    parser: Box<dyn ActionParser>,
    tools: Vec<ToolDef>,
    agent_config: AgentConfig,
    action_handler: ActionHandler,
    conversation: Conversation,
    step_count: u32,
    state: AgentState,
    cancelled: Arc<AtomicBool>,
}

impl PhoneAgent {
    /// Create a new PhoneAgent driving a device over ADB.
    ///
    /// # Arguments
    /// * `model_config` - Configuration for the AI model.
    /// * `agent_config` - Configuration for the agent behavior.
    /// * `confirmation_callback` - Optional callback for sensitive action confirmation.
    /// * `takeover_callback` - Optional callback for takeover requests.
    pub fn new(
        model_config: ModelConfig,
        agent_config: AgentConfig,
        confirmation_callback: Option<ConfirmationCallback>,
        takeover_callback: Option<TakeoverCallback>,
    ) -> Self {
        Self::from_parts(
            Box::new(ModelClient::new(model_config)),
            Arc::new(AdbDevice::new()),
            agent_config,
            confirmation_callback,
            takeover_callback,
        )
    }

    /// Create an agent from an explicit model backend and device.
    pub fn from_parts(
        model: Box<dyn ChatModel>,
        device: Arc<dyn Device>,
        agent_config: AgentConfig,
        confirmation_callback: Option<ConfirmationCallback>,
        takeover_callback: Option<TakeoverCallback>,
    ) -> Self {
        let action_handler = ActionHandler::new(
            device.clone(),
            agent_config.device_id.clone(),
            confirmation_callback,
            takeover_callback,
        )
        .with_settle_delay(agent_config.settle_delay);

        let parser = agent_config.mode.parser();
        let tools = parser.tools();

        Self {
            model,
            device,
            parser,
            tools,
            agent_config,
            action_handler,
            conversation: Conversation::new(),
            step_count: 0,
            state: AgentState::Idle,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run the agent to complete a task.
    ///
    /// Returns the final message, or [`MAX_STEPS_REACHED`] when the step
    /// budget runs out first.
    pub async fn run(&mut self, task: &str) -> Result<String, AgentError> {
        if task.trim().is_empty() {
            return Err(AgentError::TaskRequired);
        }
        self.reset();

        while self.step_count < self.agent_config.max_steps {
            if self.cancelled.load(Ordering::SeqCst) {
                tracing::info!(step = self.step_count, "task cancelled");
                self.state = AgentState::Finished;
                return Err(AgentError::Cancelled);
            }

            // The task text goes with the first turn that reaches the conversation.
            let is_first = self.conversation.is_empty();
            let result = self.execute_step(is_first.then_some(task), is_first).await?;

            if result.finished {
                let done = get_messages(&self.agent_config.lang).done;
                return Ok(result.message.unwrap_or_else(|| done.to_string()));
            }
        }

        tracing::info!(max_steps = self.agent_config.max_steps, "step budget exhausted");
        self.state = AgentState::Finished;
        Ok(MAX_STEPS_REACHED.to_string())
    }

    /// Execute a single step of the agent.
    ///
    /// Useful for manual control or debugging.
    ///
    /// # Arguments
    /// * `task` - Task description (only needed for first step).
    pub async fn step(&mut self, task: Option<&str>) -> Result<StepResult, AgentError> {
        let is_first = self.conversation.is_empty();

        if is_first && task.map_or(true, |t| t.trim().is_empty()) {
            return Err(AgentError::TaskRequired);
        }

        self.execute_step(task, is_first).await
    }

    /// Reset the agent state for a new task.
    pub fn reset(&mut self) {
        self.conversation.clear();
        self.step_count = 0;
        self.state = AgentState::Idle;
    }

    /// Execute one observe, ask, parse, dispatch cycle.
    pub async fn execute_step(
        &mut self,
        user_prompt: Option<&str>,
        is_first: bool,
    ) -> Result<StepResult, AgentError> {
        self.step_count += 1;
        self.state = AgentState::Stepping;
        tracing::info!(step = self.step_count, mode = %self.agent_config.mode, "executing step");

        let device_id = self.agent_config.device_id.clone();
        let device_id = device_id.as_deref();

        // Capture current screen state
        let screenshot = match self.device.screenshot(device_id) {
            Ok(screenshot) => screenshot,
            Err(e) => {
                tracing::error!(step = self.step_count, error = %e, "failed to capture screenshot");
                self.state = AgentState::AwaitingNextStep;
                return Ok(StepResult::failure(format!("Failed to get screenshot: {}", e)));
            }
        };
        if screenshot.is_sensitive {
            tracing::warn!("screen is protected, sending a blank screenshot");
        }

        let current_app = self.device.current_app(device_id).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to read foreground app");
            UNKNOWN_APP.to_string()
        });
        let screen_info = build_screen_info(&current_app);

        if is_first {
            self.conversation.push_system(self.agent_config.get_system_prompt());
            let text = format!("{}\n\n{}", user_prompt.unwrap_or_default(), screen_info);
            self.conversation.push_user(text, Some(&screenshot.base64_data));
        } else {
            let text = format!("** Screen Info **\n\n{}", screen_info);
            self.conversation.push_user(text, Some(&screenshot.base64_data));
        }

        let messages = get_messages(&self.agent_config.lang);
        if self.agent_config.verbose {
            println!("{}", "=".repeat(50));
            println!("💭 {}:", messages.thinking);
            println!("{}", "-".repeat(50));
        }

        // Get model response
        let response = self
            .model
            .request(self.conversation.messages(), &self.tools)
            .await;

        // The model has seen the screen; history keeps only the text.
        self.conversation.strip_latest_image();

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(step = self.step_count, error = %e, "model request failed");
                self.state = AgentState::AwaitingNextStep;
                return Err(AgentError::Model(e));
            }
        };

        let reply = self.parser.split(&response);
        let tool_calls = reply.tool_call.clone().map(|call| vec![call]);

        let action = match self.parser.parse(&reply) {
            Ok(action) => action,
            Err(ActionError::Malformed(e)) => {
                tracing::warn!(error = %e, raw = %reply.action_text, "unparseable action, finishing");
                Action::finish(reply.action_text.clone())
            }
            Err(ActionError::NoToolCall) => {
                tracing::warn!(step = self.step_count, "model returned no tool call");
                self.conversation.push_assistant(response.content.clone(), None);
                self.state = AgentState::AwaitingNextStep;
                return Ok(StepResult {
                    thinking: reply.thinking,
                    ..StepResult::failure(ActionError::NoToolCall.to_string())
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to parse tool call");
                self.conversation.push_assistant(assistant_content(&reply, self.parser.mode()), None);
                self.state = AgentState::AwaitingNextStep;
                return Err(AgentError::Parse(e));
            }
        };

        if self.agent_config.verbose {
            if !self.model.echoes_thinking() {
                println!("{}", reply.thinking);
            }
            println!("{}", "-".repeat(50));
            println!("🎯 {}:", messages.action);
            println!(
                "{}",
                serde_json::to_string_pretty(&action.to_json()).unwrap_or_default()
            );
            println!("{}", "=".repeat(50));
        }

        tracing::info!(
            step = self.step_count,
            thinking = %reply.thinking,
            action = %action.to_json(),
            "dispatching action"
        );

        self.conversation
            .push_assistant(assistant_content(&reply, self.parser.mode()), tool_calls);

        // Execute action
        let (action, result) =
            match self
                .action_handler
                .execute(&action, screenshot.width, screenshot.height)
            {
                Ok(result) => (action, result),
                Err(e) => {
                    tracing::error!(error = %e, "action execution failed");
                    let message = format!("Failed to execute action: {}", e);
                    (Action::finish(message.clone()), ActionResult::finish(Some(message)))
                }
            };

        if !result.success {
            tracing::warn!(
                action = ?action,
                message = result.message.as_deref().unwrap_or_default(),
                "action did not succeed"
            );
        }

        if let Some(call) = &reply.tool_call {
            let content = result
                .message
                .clone()
                .unwrap_or_else(|| if result.success { "success" } else { "failed" }.to_string());
            self.conversation.push_tool(call.id.clone(), content);
        }

        let finished = action.is_finish() || result.should_finish;
        let message = result
            .message
            .clone()
            .filter(|m| !m.is_empty())
            .or_else(|| action.message().map(str::to_string));

        if finished && self.agent_config.verbose {
            println!("\n🎉 {}", "=".repeat(48));
            println!(
                "✅ {}: {}",
                messages.task_completed,
                message.as_deref().unwrap_or(messages.done)
            );
            println!("{}\n", "=".repeat(50));
        }

        self.state = if finished {
            AgentState::Finished
        } else {
            AgentState::AwaitingNextStep
        };

        Ok(StepResult {
            success: result.success,
            finished,
            action: Some(action),
            thinking: reply.thinking,
            message,
        })
    }

    /// Get the current conversation.
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Get the current step count.
    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn config(&self) -> &AgentConfig {
        &self.agent_config
    }

    /// Flag checked between steps; setting it makes [`PhoneAgent::run`]
    /// return [`AgentError::Cancelled`]. It stays set until the caller clears it.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }
}

/// Observation blob sent with each screenshot.
fn build_screen_info(current_app: &str) -> String {
    let mut info = json!({ "current_app": current_app });
    if let Some(package) = package_for_alias(current_app) {
        info["current_app_name"] = json!(package);
    }
    info.to_string()
}

fn assistant_content(reply: &Reply, mode: ParserMode) -> String {
    match mode {
        ParserMode::Dsl => format!(
            "<think>{}</think><answer>{}</answer>",
            reply.thinking, reply.action_text
        ),
        ParserMode::Tools => reply.thinking.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::FakeDevice;
    use crate::model::{ChatMessage, ModelResponse, ToolCall};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Model that replays canned responses and records every request.
    #[derive(Default, Clone)]
    struct ScriptedModel {
        responses: Arc<Mutex<VecDeque<Result<ModelResponse, ModelError>>>>,
        requests: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<Result<ModelResponse, ModelError>>) -> Self {
            Self {
                responses: Arc::new(Mutex::new(responses.into())),
                requests: Arc::default(),
            }
        }

        fn requests(&self) -> Vec<Vec<ChatMessage>> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn request(
            &self,
            messages: &[ChatMessage],
            _tools: &[ToolDef],
        ) -> Result<ModelResponse, ModelError> {
            self.requests.lock().unwrap().push(messages.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(tool("finish_task", r#"{"message": "Done"}"#)))
        }
    }

    fn tool(name: &str, arguments: &str) -> ModelResponse {
        ModelResponse::text("").with_tool_call(ToolCall::function(
            format!("call_{}", name),
            name,
            arguments,
        ))
    }

    fn agent(
        model: &ScriptedModel,
        device: &Arc<FakeDevice>,
        config: AgentConfig,
        confirm: Option<ConfirmationCallback>,
    ) -> PhoneAgent {
        PhoneAgent::from_parts(
            Box::new(model.clone()),
            device.clone(),
            config.quiet().with_settle_delay(Duration::ZERO),
            confirm,
            Some(Box::new(|_| Ok(()))),
        )
    }

    #[test]
    fn test_agent_config_default() {
        let config = AgentConfig::default();
        assert_eq!(config.max_steps, 100);
        assert_eq!(config.lang, "cn");
        assert_eq!(config.mode, ParserMode::Tools);
        assert!(config.verbose);
    }

    #[test]
    fn test_agent_config_builder() {
        let config = AgentConfig::default()
            .with_device_id("device123")
            .with_lang("en")
            .with_max_steps(50)
            .with_mode(ParserMode::Dsl)
            .quiet();

        assert_eq!(config.device_id, Some("device123".to_string()));
        assert_eq!(config.lang, "en");
        assert_eq!(config.max_steps, 50);
        assert_eq!(config.mode, ParserMode::Dsl);
        assert!(!config.verbose);
    }

    #[test]
    fn test_custom_system_prompt_is_rendered() {
        let config = AgentConfig::default().with_system_prompt("Today: {{ datetime }}");
        let prompt = config.get_system_prompt();
        assert!(prompt.starts_with("Today: "));
        assert!(!prompt.contains("{{ datetime }}"));
    }

    #[test]
    fn test_screen_info() {
        assert_eq!(build_screen_info("System Home"), r#"{"current_app":"System Home"}"#);
        assert_eq!(
            build_screen_info("Settings"),
            r#"{"current_app":"Settings","current_app_name":"com.android.settings"}"#
        );
    }

    #[tokio::test]
    async fn test_finish_task_ends_run() {
        let model = ScriptedModel::new(vec![Ok(tool("finish_task", r#"{"message": "Done"}"#))]);
        let device = Arc::new(FakeDevice::new());
        let mut agent = agent(&model, &device, AgentConfig::default(), None);

        assert_eq!(agent.run("say hi").await.unwrap(), "Done");
        assert_eq!(agent.state(), AgentState::Finished);
        assert_eq!(agent.step_count(), 1);
        assert!(device.action_calls().is_empty());

        let roles: Vec<_> = agent
            .conversation()
            .messages()
            .iter()
            .map(|m| m.role.as_str())
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);
        let tool_turn = &agent.conversation().messages()[3];
        assert_eq!(tool_turn.tool_call_id.as_deref(), Some("call_finish_task"));
        assert_eq!(tool_turn.text_content(), "Done");
    }

    /// Log sink shared with a test subscriber.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_quiet_step_logs_thinking_and_action() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let model = ScriptedModel::new(vec![Ok(ModelResponse::text(
            r#"Back to the launcher first. do(action="Home")"#,
        ))]);
        let device = Arc::new(FakeDevice::new());
        let config = AgentConfig::default().with_mode(ParserMode::Dsl);
        let mut agent = agent(&model, &device, config, None);

        let result = agent.step(Some("go home")).await.unwrap();
        assert!(result.success);
        assert_eq!(device.action_calls(), vec!["home"]);

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("dispatching action"));
        assert!(output.contains("Back to the launcher first."));
        assert!(output.contains("Home"));
    }

    #[tokio::test]
    async fn test_open_settings_scenario() {
        let model = ScriptedModel::new(vec![
            Ok(tool("launch_app", r#"{"app": "Settings"}"#)),
            Ok(tool("finish_task", r#"{"message": "Settings opened"}"#)),
        ]);
        let device = Arc::new(FakeDevice::new());
        let mut agent = agent(&model, &device, AgentConfig::default(), None);

        let first = agent.step(Some("open settings")).await.unwrap();
        assert!(first.success);
        assert!(!first.finished);
        assert_eq!(agent.state(), AgentState::AwaitingNextStep);

        let second = agent.step(None).await.unwrap();
        assert!(second.finished);
        assert_eq!(second.message.as_deref(), Some("Settings opened"));
        assert_eq!(device.action_calls(), vec!["launch com.android.settings"]);

        let requests = model.requests();
        let first_user = requests[0].last().unwrap();
        assert_eq!(
            first_user.text_content(),
            "open settings\n\n{\"current_app\":\"System Home\"}"
        );
        let second_user = requests[1].last().unwrap();
        assert!(second_user.text_content().starts_with("** Screen Info **\n\n"));
        assert!(!second_user.text_content().contains("open settings"));
    }

    #[tokio::test]
    async fn test_only_current_turn_carries_image() {
        let model = ScriptedModel::new(vec![
            Ok(tool("press_back", "")),
            Ok(tool("press_home", "{}")),
            Ok(tool("finish_task", r#"{"message": "ok"}"#)),
        ]);
        let device = Arc::new(FakeDevice::new());
        let mut agent = agent(&model, &device, AgentConfig::default(), None);

        agent.run("navigate").await.unwrap();

        for request in model.requests() {
            let with_image: Vec<_> = request.iter().filter(|m| m.has_image()).collect();
            assert_eq!(with_image.len(), 1);
            assert!(request.last().unwrap().has_image());
        }
        assert_eq!(agent.conversation().image_count(), 0);
        assert_eq!(device.action_calls(), vec!["back", "home"]);
    }

    #[tokio::test]
    async fn test_zero_max_steps_runs_nothing() {
        let model = ScriptedModel::new(vec![]);
        let device = Arc::new(FakeDevice::new());
        let mut agent = agent(&model, &device, AgentConfig::default().with_max_steps(0), None);

        assert_eq!(agent.run("anything").await.unwrap(), MAX_STEPS_REACHED);
        assert!(device.calls().is_empty());
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_step_budget_exhausted() {
        let model = ScriptedModel::new(vec![
            Ok(tool("press_back", "")),
            Ok(tool("press_back", "")),
            Ok(tool("press_back", "")),
        ]);
        let device = Arc::new(FakeDevice::new());
        let mut agent = agent(&model, &device, AgentConfig::default().with_max_steps(2), None);

        assert_eq!(agent.run("loop").await.unwrap(), MAX_STEPS_REACHED);
        assert_eq!(device.action_calls(), vec!["back", "back"]);
        assert_eq!(agent.state(), AgentState::Finished);
    }

    #[tokio::test]
    async fn test_declined_confirmation_finishes() {
        let model = ScriptedModel::new(vec![Ok(ModelResponse::text(
            r#"Paying now. do(action="Tap", element=[500, 500], message="Pay 10")"#,
        ))]);
        let device = Arc::new(FakeDevice::new());
        let config = AgentConfig::default().with_mode(ParserMode::Dsl);
        let mut agent = agent(&model, &device, config, Some(Box::new(|_| Ok(false))));

        let result = agent.run("pay").await.unwrap();
        assert_eq!(result, "User cancelled sensitive operation");
        assert!(device.action_calls().is_empty());

        let assistant = &agent.conversation().messages()[2];
        assert_eq!(
            assistant.text_content(),
            r#"<think>Paying now.</think><answer>do(action="Tap", element=[500, 500], message="Pay 10")</answer>"#
        );
    }

    #[tokio::test]
    async fn test_malformed_dsl_finishes_with_raw_text() {
        let model = ScriptedModel::new(vec![Ok(ModelResponse::text("I am not sure what to do"))]);
        let device = Arc::new(FakeDevice::new());
        let config = AgentConfig::default().with_mode(ParserMode::Dsl);
        let mut agent = agent(&model, &device, config, None);

        assert_eq!(agent.run("task").await.unwrap(), "I am not sure what to do");
        assert!(device.action_calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_tool_call_is_not_terminal() {
        let model = ScriptedModel::new(vec![
            Ok(ModelResponse::text("Let me think.")),
            Ok(tool("finish_task", r#"{"message": "Done"}"#)),
        ]);
        let device = Arc::new(FakeDevice::new());
        let mut agent = agent(&model, &device, AgentConfig::default(), None);

        let result = agent.step(Some("task")).await.unwrap();
        assert!(!result.success);
        assert!(!result.finished);
        assert_eq!(result.thinking, "Let me think.");
        assert_eq!(agent.state(), AgentState::AwaitingNextStep);

        assert_eq!(agent.run("task").await.unwrap(), "Done");
    }

    #[tokio::test]
    async fn test_unknown_function_is_propagated() {
        let model = ScriptedModel::new(vec![Ok(tool("teleport", "{}"))]);
        let device = Arc::new(FakeDevice::new());
        let mut agent = agent(&model, &device, AgentConfig::default(), None);

        let err = agent.run("task").await.unwrap_err();
        assert!(matches!(err, AgentError::Parse(ActionError::UnknownFunction(_))));
        assert_eq!(agent.conversation().image_count(), 0);
    }

    #[tokio::test]
    async fn test_model_error_strips_image_and_propagates() {
        let model = ScriptedModel::new(vec![Err(ModelError::ApiError("400: bad".into()))]);
        let device = Arc::new(FakeDevice::new());
        let mut agent = agent(&model, &device, AgentConfig::default(), None);

        let err = agent.run("task").await.unwrap_err();
        assert!(matches!(err, AgentError::Model(_)));
        assert_eq!(agent.conversation().image_count(), 0);
        assert_eq!(agent.conversation().len(), 2);
    }

    #[tokio::test]
    async fn test_screenshot_failure_is_soft() {
        let model = ScriptedModel::new(vec![]);
        let device = Arc::new(FakeDevice {
            fail_screenshot: true,
            ..FakeDevice::new()
        });
        let mut agent = agent(&model, &device, AgentConfig::default(), None);

        let result = agent.step(Some("task")).await.unwrap();
        assert!(!result.success);
        assert!(!result.finished);
        assert!(agent.conversation().is_empty());
        assert_eq!(agent.step_count(), 1);
        assert!(model.requests().is_empty());
    }

    #[tokio::test]
    async fn test_current_app_failure_degrades() {
        let model = ScriptedModel::new(vec![]);
        let device = Arc::new(FakeDevice {
            fail_current_app: true,
            ..FakeDevice::new()
        });
        let mut agent = agent(&model, &device, AgentConfig::default(), None);

        assert_eq!(agent.run("task").await.unwrap(), "Done");
        let first_user = &model.requests()[0][1];
        assert!(first_user.text_content().ends_with(r#"{"current_app":"Unknown"}"#));
    }

    #[tokio::test]
    async fn test_prompt_failure_substitutes_finish() {
        let model = ScriptedModel::new(vec![Ok(tool("take_over", r#"{"message": "log in"}"#))]);
        let device = Arc::new(FakeDevice::new());
        let mut agent = PhoneAgent::from_parts(
            Box::new(model.clone()),
            device,
            AgentConfig::default().quiet(),
            None,
            Some(Box::new(|_| {
                Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "stdin closed"))
            })),
        );

        let result = agent.run("task").await.unwrap();
        assert!(result.starts_with("Failed to execute action:"));
    }

    #[tokio::test]
    async fn test_step_requires_task_first() {
        let model = ScriptedModel::new(vec![]);
        let device = Arc::new(FakeDevice::new());
        let mut agent = agent(&model, &device, AgentConfig::default(), None);

        assert!(matches!(agent.step(None).await, Err(AgentError::TaskRequired)));
        assert!(matches!(agent.run("  ").await, Err(AgentError::TaskRequired)));
        assert_eq!(agent.state(), AgentState::Idle);
    }

    #[tokio::test]
    async fn test_cancel_flag_stops_between_steps() {
        let model = ScriptedModel::new(vec![]);
        let device = Arc::new(FakeDevice::new());
        let mut agent = agent(&model, &device, AgentConfig::default(), None);

        agent.cancel_flag().store(true, Ordering::SeqCst);
        assert!(matches!(agent.run("task").await, Err(AgentError::Cancelled)));
        assert!(device.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reset_clears_history() {
        let model = ScriptedModel::new(vec![]);
        let device = Arc::new(FakeDevice::new());
        let mut agent = agent(&model, &device, AgentConfig::default(), None);

        agent.run("first").await.unwrap();
        agent.reset();
        assert!(agent.conversation().is_empty());
        assert_eq!(agent.step_count(), 0);
        assert_eq!(agent.state(), AgentState::Idle);
    }
}
