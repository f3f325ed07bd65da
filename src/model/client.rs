//! Model client for AI inference using OpenAI-compatible API.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::sleep;

use super::stream::StreamCollector;
use super::types::{ChatMessage, ModelResponse, ResponseMetrics, ToolCall, ToolDef};
use crate::config::get_messages;

/// Default number of retry attempts for failed requests.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between retry attempts in seconds.
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 2;

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Model client errors.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Failed to parse response: {0}")]
    ParseError(String),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Stream error: {0}")]
    Stream(String),
    #[error("Max retries exceeded after {0} attempts: {1}")]
    MaxRetriesExceeded(u32, String),
}

/// Configuration for the AI model.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub extra_body: HashMap<String, Value>,
    /// Maximum number of retry attempts for failed requests.
    pub max_retries: u32,
    /// Delay between retry attempts in seconds.
    pub retry_delay_secs: u64,
    pub request_timeout_secs: u64,
    /// Use server-sent events and echo thinking while it streams.
    pub stream: bool,
    /// Language of the metric labels.
    pub lang: String,
    /// Print streamed thinking and performance metrics.
    pub verbose: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let mut extra_body = HashMap::new();
        extra_body.insert("skip_special_tokens".to_string(), json!(false));

        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: "EMPTY".to_string(),
            model_name: "autoglm-phone-9b".to_string(),
            max_tokens: 3000,
            temperature: 0.0,
            top_p: 0.85,
            frequency_penalty: 0.2,
            extra_body,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            stream: false,
            lang: "cn".to_string(),
            verbose: true,
        }
    }
}

impl ModelConfig {
    /// Create a new ModelConfig with custom base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Create a new ModelConfig with custom API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Create a new ModelConfig with custom model name.
    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_frequency_penalty(mut self, frequency_penalty: f32) -> Self {
        self.frequency_penalty = frequency_penalty;
        self
    }

    /// Set the maximum number of retry attempts for failed requests.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay between retry attempts in seconds.
    pub fn with_retry_delay(mut self, delay_secs: u64) -> Self {
        self.retry_delay_secs = delay_secs;
        self
    }

    pub fn with_request_timeout(mut self, timeout_secs: u64) -> Self {
        self.request_timeout_secs = timeout_secs;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// A chat-completion backend.
///
/// The agent talks to the model only through this trait so that tests can
/// script replies.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send the conversation and return one reply. `tools` is empty in DSL mode.
    async fn request(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDef],
    ) -> Result<ModelResponse, ModelError>;

    /// Whether thinking is printed while the reply streams in.
    fn echoes_thinking(&self) -> bool {
        false
    }
}

/// OpenAI API response structures.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<RawToolCall>,
}

#[derive(Debug, Deserialize)]
struct RawToolCall {
    #[serde(default)]
    id: String,
    function: RawFunction,
}

#[derive(Debug, Deserialize)]
struct RawFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

/// Client for interacting with OpenAI-compatible vision-language models.
pub struct ModelClient {
    config: ModelConfig,
    client: Client,
}

impl ModelClient {
    /// Create a new ModelClient with the given configuration.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Create a new ModelClient with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ModelConfig::default())
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn build_body(&self, messages: &[ChatMessage], tools: &[ToolDef]) -> Result<Value, ModelError> {
        let messages =
            serde_json::to_value(messages).map_err(|e| ModelError::ParseError(e.to_string()))?;

        let mut body = json!({
            "messages": messages,
            "model": self.config.model_name,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "top_p": self.config.top_p,
            "frequency_penalty": self.config.frequency_penalty,
            "stream": self.config.stream,
        });

        if !tools.is_empty() {
            body["tools"] =
                serde_json::to_value(tools).map_err(|e| ModelError::ParseError(e.to_string()))?;
            body["tool_choice"] = json!("auto");
        }

        // Merge extra_body
        if let Value::Object(ref mut map) = body {
            for (key, value) in &self.config.extra_body {
                map.insert(key.clone(), value.clone());
            }
        }

        Ok(body)
    }

    /// Check if an error is retryable (network errors, timeouts, etc.)
    fn is_retryable_error(error: &ModelError) -> bool {
        match error {
            ModelError::RequestFailed(_) => true,
            ModelError::ApiError(msg) => match status_code(msg) {
                // Retry on server errors (5xx) or rate limits (429)
                Some(code) => code == 429 || (500..=599).contains(&code),
                // Errors reported inside a stream carry no status
                None => {
                    let lower = msg.to_lowercase();
                    lower.contains("timeout") || lower.contains("rate limit")
                }
            },
            ModelError::ParseError(_)
            | ModelError::Stream(_)
            | ModelError::MaxRetriesExceeded(_, _) => false,
        }
    }

    /// Send a single request to the API.
    async fn send_request(&self, url: &str, body: &Value) -> Result<ModelResponse, ModelError> {
        let started = Instant::now();
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ModelError::ApiError(format!("{}: {}", status, error_text)));
        }

        let response = if self.config.stream {
            self.read_stream(response, started).await?
        } else {
            Self::read_json(response, started).await?
        };

        if self.config.verbose {
            print_metrics(&self.config.lang, &response.metrics);
        }
        Ok(response)
    }

    async fn read_json(
        response: reqwest::Response,
        started: Instant,
    ) -> Result<ModelResponse, ModelError> {
        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ModelError::ParseError(e.to_string()))?;

        let Some(choice) = completion.choices.into_iter().next() else {
            return Err(ModelError::ParseError("No choices in response".to_string()));
        };

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| {
                let id = if call.id.is_empty() {
                    format!("call_{}", uuid::Uuid::new_v4().simple())
                } else {
                    call.id
                };
                ToolCall::function(id, call.function.name, call.function.arguments)
            })
            .collect();

        let total_time = started.elapsed().as_secs_f64();
        tracing::debug!(total_time, "model response received");

        Ok(ModelResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            metrics: ResponseMetrics {
                time_to_first_token: None,
                time_to_thinking_end: None,
                total_time,
            },
        })
    }

    async fn read_stream(
        &self,
        response: reqwest::Response,
        started: Instant,
    ) -> Result<ModelResponse, ModelError> {
        let mut byte_stream = response.bytes_stream();
        let mut collector = StreamCollector::new(started, self.config.verbose);

        while let Some(chunk) = byte_stream.next().await {
            collector.feed(&chunk?)?;
            if collector.is_done() {
                break;
            }
        }

        let response = collector.finish()?;
        tracing::debug!(
            content_len = response.content.len(),
            tool_calls = response.tool_calls.len(),
            total_time = response.metrics.total_time,
            "model stream complete"
        );
        Ok(response)
    }
}

/// HTTP status at the start of an `ApiError` message ("503 Service Unavailable: ...").
fn status_code(message: &str) -> Option<u16> {
    let code = message.split_whitespace().next()?.trim_end_matches(':');
    if code.len() != 3 {
        return None;
    }
    code.parse().ok()
}

#[async_trait]
impl ChatModel for ModelClient {
    /// Send a request to the model, retrying transient failures.
    async fn request(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDef],
    ) -> Result<ModelResponse, ModelError> {
        let url = self.config.completions_url();
        let body = self.build_body(messages, tools)?;

        tracing::debug!(
            model = %self.config.model_name,
            stream = self.config.stream,
            tools = tools.len(),
            body = %redact_images(&body),
            "sending model request"
        );

        let mut last_error: Option<ModelError> = None;
        let max_attempts = self.config.max_retries + 1; // +1 for the initial attempt

        for attempt in 1..=max_attempts {
            match self.send_request(&url, &body).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if !Self::is_retryable_error(&e) {
                        return Err(e);
                    }
                    if attempt < max_attempts {
                        tracing::warn!(
                            attempt,
                            max_attempts,
                            error = %e,
                            "model request failed, retrying in {}s",
                            self.config.retry_delay_secs
                        );
                        sleep(Duration::from_secs(self.config.retry_delay_secs)).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        // All retries exhausted
        Err(ModelError::MaxRetriesExceeded(
            max_attempts,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
        ))
    }

    fn echoes_thinking(&self) -> bool {
        self.config.stream && self.config.verbose
    }
}

/// Serialize a request body for logging with image payloads replaced.
fn redact_images(body: &Value) -> String {
    let mut log_body = body.clone();
    if let Some(messages) = log_body.get_mut("messages").and_then(Value::as_array_mut) {
        for part in messages
            .iter_mut()
            .filter_map(|m| m.get_mut("content").and_then(Value::as_array_mut))
            .flatten()
        {
            if part.get("type").and_then(Value::as_str) == Some("image_url") {
                part["image_url"]["url"] = json!("<omitted_base64_image>");
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}

/// Print the timing block for one response.
pub fn print_metrics(lang: &str, metrics: &ResponseMetrics) {
    let messages = get_messages(lang);
    println!();
    println!("{}", "=".repeat(50));
    println!("⏱️  {}", messages.performance_metrics);
    println!("{}", "-".repeat(50));
    if let Some(ttft) = metrics.time_to_first_token {
        println!("{}: {:.3}s", messages.time_to_first_token, ttft);
    }
    if let Some(thinking_end) = metrics.time_to_thinking_end {
        println!("{}: {:.3}s", messages.time_to_thinking_end, thinking_end);
    }
    println!("{}: {:.3}s", messages.total_inference_time, metrics.total_time);
    println!("{}", "=".repeat(50));
}
