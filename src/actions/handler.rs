//! Dispatch of parsed actions to the device.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::package_for_alias;
use crate::device::{Device, DeviceError};

use super::action::{Action, Coordinate, DoAction};
use super::parser::ActionError;

/// Result of an action execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    pub should_finish: bool,
    pub message: Option<String>,
    pub requires_confirmation: bool,
}

impl ActionResult {
    /// Create a successful result.
    pub fn success() -> Self {
        Self {
            success: true,
            should_finish: false,
            message: None,
            requires_confirmation: false,
        }
    }

    /// Create a failure result.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            should_finish: false,
            message: Some(message.into()),
            requires_confirmation: false,
        }
    }

    /// Create a finish result.
    pub fn finish(message: Option<String>) -> Self {
        Self {
            success: true,
            should_finish: true,
            message,
            requires_confirmation: false,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Callback asked to approve a sensitive operation. `Ok(true)` approves.
pub type ConfirmationCallback = Box<dyn Fn(&str) -> io::Result<bool> + Send + Sync>;

/// Callback that blocks until the operator has finished a manual step.
pub type TakeoverCallback = Box<dyn Fn(&str) -> io::Result<()> + Send + Sync>;

const DEFAULT_WAIT: Duration = Duration::from_secs(1);
const DEFAULT_TAKEOVER_MESSAGE: &str = "User intervention required";

/// Executes actions against a [`Device`].
///
/// Device failures never escape: they are reported through
/// [`ActionResult::failure`]. The only error is a failed operator prompt.
pub struct ActionHandler {
    device: Arc<dyn Device>,
    device_id: Option<String>,
    settle_delay: Duration,
    confirmation_callback: ConfirmationCallback,
    takeover_callback: TakeoverCallback,
}

impl ActionHandler {
    /// Create a new ActionHandler.
    ///
    /// # Arguments
    /// * `device` - Device the actions run on.
    /// * `device_id` - Optional ADB device ID for multi-device setups.
    /// * `confirmation_callback` - Optional callback for sensitive action confirmation.
    /// * `takeover_callback` - Optional callback for takeover requests (login, captcha).
    pub fn new(
        device: Arc<dyn Device>,
        device_id: Option<String>,
        confirmation_callback: Option<ConfirmationCallback>,
        takeover_callback: Option<TakeoverCallback>,
    ) -> Self {
        Self {
            device,
            device_id,
            settle_delay: Duration::from_secs(1),
            confirmation_callback: confirmation_callback
                .unwrap_or_else(|| Box::new(default_confirmation)),
            takeover_callback: takeover_callback.unwrap_or_else(|| Box::new(default_takeover)),
        }
    }

    /// Pause between the keyboard sub-steps of a Type action.
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Execute an action.
    ///
    /// # Arguments
    /// * `action` - The parsed action.
    /// * `screen_width` - Width of the screenshot taken this step.
    /// * `screen_height` - Height of the screenshot taken this step.
    pub fn execute(
        &self,
        action: &Action,
        screen_width: u32,
        screen_height: u32,
    ) -> Result<ActionResult, ActionError> {
        match action {
            Action::Finish { message } => Ok(ActionResult::finish(message.clone())),
            Action::Do(action) => self.handle_action(action, screen_width, screen_height),
        }
    }

    fn handle_action(
        &self,
        action: &DoAction,
        screen_width: u32,
        screen_height: u32,
    ) -> Result<ActionResult, ActionError> {
        let screen = (screen_width, screen_height);
        let result = match action {
            DoAction::Launch { app } => self.handle_launch(app),
            DoAction::Tap { element, message } => {
                return self.handle_tap(element, message.as_deref(), screen)
            }
            DoAction::Type { text } => self.handle_type(text),
            DoAction::Swipe { start, end } => self.handle_swipe(start, end, screen),
            DoAction::Back => self.device_result("press back", self.device.back(self.device_id())),
            DoAction::Home => self.device_result("press home", self.device.home(self.device_id())),
            DoAction::DoubleTap { element } => self.handle_point(element, screen, "double tap", |x, y| {
                self.device.double_tap(x, y, self.device_id())
            }),
            DoAction::LongPress { element } => self.handle_point(element, screen, "long press", |x, y| {
                self.device.long_press(x, y, self.device_id())
            }),
            DoAction::Wait { duration } => self.handle_wait(duration.as_deref()),
            DoAction::TakeOver { message } => {
                let message = message.as_deref().filter(|m| !m.is_empty());
                (self.takeover_callback)(message.unwrap_or(DEFAULT_TAKEOVER_MESSAGE))?;
                ActionResult::success()
            }
            DoAction::Note { .. } | DoAction::CallApi { .. } => ActionResult::success(),
            DoAction::Interact => ActionResult::success().with_message("User interaction required"),
            DoAction::Unknown { name } => ActionResult::failure(format!("Unknown action: {}", name)),
        };
        Ok(result)
    }

    fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    fn device_result(&self, what: &str, result: Result<(), DeviceError>) -> ActionResult {
        match result {
            Ok(()) => ActionResult::success(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to {}", what);
                ActionResult::failure(format!("Failed to {}: {}", what, e))
            }
        }
    }

    fn handle_launch(&self, app: &str) -> ActionResult {
        if app.is_empty() {
            return ActionResult::failure("No app name specified");
        }

        let package = package_for_alias(app).unwrap_or(app);
        match self.device.launch_app(package, self.device_id()) {
            Ok(true) => ActionResult::success(),
            Ok(false) => ActionResult::failure(format!("App not found: {}", app)),
            Err(e) => {
                tracing::warn!(app, package, error = %e, "failed to launch app");
                ActionResult::failure(format!("Failed to launch app: {}", e))
            }
        }
    }

    fn handle_tap(
        &self,
        element: &[i64],
        message: Option<&str>,
        (screen_width, screen_height): (u32, u32),
    ) -> Result<ActionResult, ActionError> {
        let point = match Coordinate::parse(element) {
            Ok(point) => point,
            Err(e) => return Ok(ActionResult::failure(format!("Invalid element coordinates: {}", e))),
        };

        // A message marks a sensitive operation that needs approval.
        if let Some(message) = message {
            if !(self.confirmation_callback)(message)? {
                return Ok(ActionResult {
                    success: false,
                    should_finish: true,
                    message: Some("User cancelled sensitive operation".to_string()),
                    requires_confirmation: true,
                });
            }
        }

        let (x, y) = point.to_absolute(screen_width, screen_height);
        Ok(self.device_result("tap", self.device.tap(x, y, self.device_id())))
    }

    fn handle_point<F>(&self, element: &[i64], (width, height): (u32, u32), what: &str, op: F) -> ActionResult
    where
        F: FnOnce(i32, i32) -> Result<(), DeviceError>,
    {
        match Coordinate::parse(element) {
            Ok(point) => {
                let (x, y) = point.to_absolute(width, height);
                self.device_result(what, op(x, y))
            }
            Err(e) => ActionResult::failure(format!("Invalid element coordinates: {}", e)),
        }
    }

    /// Switch IME, clear, type, restore. The restore always runs.
    fn handle_type(&self, text: &str) -> ActionResult {
        let device_id = self.device_id();

        let original_ime = self
            .device
            .detect_and_set_keyboard(device_id)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "failed to switch to ADB keyboard");
                String::new()
            });
        thread::sleep(self.settle_delay);

        if let Err(e) = self.device.clear_text(device_id) {
            tracing::warn!(error = %e, "failed to clear text");
        }
        thread::sleep(self.settle_delay);

        let typed = self.device.type_text(text, device_id);
        thread::sleep(self.settle_delay);

        if let Err(e) = self.device.restore_keyboard(&original_ime, device_id) {
            tracing::warn!(ime = %original_ime, error = %e, "failed to restore keyboard");
        }
        thread::sleep(self.settle_delay);

        self.device_result("type text", typed)
    }

    fn handle_swipe(&self, start: &[i64], end: &[i64], (width, height): (u32, u32)) -> ActionResult {
        let (start, end) = match (Coordinate::parse(start), Coordinate::parse(end)) {
            (Ok(start), Ok(end)) => (start, end),
            (Err(e), _) | (_, Err(e)) => {
                return ActionResult::failure(format!("Invalid swipe coordinates: {}", e))
            }
        };

        let (start_x, start_y) = start.to_absolute(width, height);
        let (end_x, end_y) = end.to_absolute(width, height);
        self.device_result(
            "swipe",
            self.device.swipe(start_x, start_y, end_x, end_y, self.device_id()),
        )
    }

    fn handle_wait(&self, duration: Option<&str>) -> ActionResult {
        thread::sleep(parse_wait_duration(duration));
        ActionResult::success()
    }
}

/// Wait time for a `duration` argument such as `"2 seconds"`.
///
/// Anything that is not a representable non-negative number of seconds
/// waits one second.
pub fn parse_wait_duration(duration: Option<&str>) -> Duration {
    duration
        .and_then(|d| d.replace("seconds", "").trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(DEFAULT_WAIT)
}

/// Default confirmation callback using console input.
fn default_confirmation(message: &str) -> io::Result<bool> {
    print!("Sensitive operation: {}\nConfirm? (Y/N): ", message);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;

    Ok(line.trim().eq_ignore_ascii_case("y"))
}

/// Default takeover callback using console input.
fn default_takeover(message: &str) -> io::Result<()> {
    print!("{}\nPress Enter after completing manual operation...", message);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::FakeDevice;
    use std::sync::Mutex;

    fn handler_with(device: Arc<FakeDevice>) -> ActionHandler {
        ActionHandler::new(
            device,
            None,
            Some(Box::new(|_| Ok(true))),
            Some(Box::new(|_| Ok(()))),
        )
        .with_settle_delay(Duration::ZERO)
    }

    fn tap(element: Vec<i64>) -> Action {
        Action::Do(DoAction::Tap {
            element,
            message: None,
        })
    }

    #[test]
    fn test_action_result_constructors() {
        let success = ActionResult::success();
        assert!(success.success);
        assert!(!success.should_finish);

        let finish = ActionResult::finish(Some("Done".to_string()));
        assert!(finish.success);
        assert!(finish.should_finish);

        let failure = ActionResult::failure("nope");
        assert!(!failure.success);
        assert!(!failure.should_finish);
    }

    #[test]
    fn test_finish_does_not_touch_device() {
        let device = Arc::new(FakeDevice::new());
        let handler = handler_with(device.clone());
        let result = handler.execute(&Action::finish("Done"), 1080, 2400).unwrap();
        assert_eq!(result, ActionResult::finish(Some("Done".into())));
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_tap_converts_relative_coordinates() {
        let device = Arc::new(FakeDevice::new());
        let handler = handler_with(device.clone());
        let result = handler.execute(&tap(vec![500, 500]), 1080, 2400).unwrap();
        assert!(result.success);
        assert_eq!(device.calls(), vec!["tap 540 1200"]);
    }

    #[test]
    fn test_invalid_coordinates_fail_without_finishing() {
        let device = Arc::new(FakeDevice::new());
        let handler = handler_with(device.clone());

        for action in [
            tap(vec![500]),
            tap(vec![1500, 500]),
            Action::Do(DoAction::DoubleTap { element: vec![] }),
            Action::Do(DoAction::LongPress { element: vec![1, 2, 3] }),
            Action::Do(DoAction::Swipe {
                start: vec![-1, 0],
                end: vec![10, 10],
            }),
        ] {
            let result = handler.execute(&action, 1080, 2400).unwrap();
            assert!(!result.success, "{:?}", action);
            assert!(!result.should_finish, "{:?}", action);
        }
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_sensitive_tap_declined_finishes() {
        let device = Arc::new(FakeDevice::new());
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let seen = prompts.clone();
        let handler = ActionHandler::new(
            device.clone(),
            None,
            Some(Box::new(move |msg| {
                seen.lock().unwrap().push(msg.to_string());
                Ok(false)
            })),
            None,
        );

        let action = Action::Do(DoAction::Tap {
            element: vec![100, 100],
            message: Some("Confirm payment".into()),
        });
        let result = handler.execute(&action, 1080, 2400).unwrap();
        assert!(!result.success);
        assert!(result.should_finish);
        assert!(result.requires_confirmation);
        assert_eq!(result.message.as_deref(), Some("User cancelled sensitive operation"));
        assert_eq!(*prompts.lock().unwrap(), vec!["Confirm payment"]);
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_sensitive_tap_approved_taps() {
        let device = Arc::new(FakeDevice::new());
        let handler = handler_with(device.clone());
        let action = Action::Do(DoAction::Tap {
            element: vec![1000, 0],
            message: Some("Pay".into()),
        });
        assert!(handler.execute(&action, 1080, 2400).unwrap().success);
        assert_eq!(device.calls(), vec!["tap 1080 0"]);
    }

    #[test]
    fn test_prompt_io_failure_is_error() {
        let device = Arc::new(FakeDevice::new());
        let handler = ActionHandler::new(
            device,
            None,
            None,
            Some(Box::new(|_| Err(io::Error::new(io::ErrorKind::UnexpectedEof, "closed")))),
        );
        let action = Action::Do(DoAction::TakeOver { message: None });
        assert!(matches!(handler.execute(&action, 1080, 2400), Err(ActionError::Prompt(_))));
    }

    #[test]
    fn test_launch_resolves_alias_or_uses_package() {
        let device = Arc::new(FakeDevice::new());
        let handler = handler_with(device.clone());

        let settings = Action::Do(DoAction::Launch { app: "Settings".into() });
        assert!(handler.execute(&settings, 1080, 2400).unwrap().success);

        let literal = Action::Do(DoAction::Launch { app: "org.example.app".into() });
        assert!(handler.execute(&literal, 1080, 2400).unwrap().success);

        assert_eq!(
            device.calls(),
            vec!["launch com.android.settings", "launch org.example.app"]
        );
    }

    #[test]
    fn test_launch_failures_are_recoverable() {
        let device = Arc::new(FakeDevice {
            missing_packages: vec!["org.missing".into()],
            ..FakeDevice::new()
        });
        let handler = handler_with(device.clone());

        let empty = handler
            .execute(&Action::Do(DoAction::Launch { app: String::new() }), 1080, 2400)
            .unwrap();
        assert_eq!(empty, ActionResult::failure("No app name specified"));

        let missing = handler
            .execute(&Action::Do(DoAction::Launch { app: "org.missing".into() }), 1080, 2400)
            .unwrap();
        assert!(!missing.success);
        assert!(!missing.should_finish);
    }

    #[test]
    fn test_type_runs_keyboard_saga() {
        let device = Arc::new(FakeDevice::new());
        let handler = handler_with(device.clone());
        let result = handler
            .execute(&Action::Do(DoAction::Type { text: "hello".into() }), 1080, 2400)
            .unwrap();
        assert!(result.success);
        assert_eq!(
            device.calls(),
            vec![
                "set_keyboard",
                "clear",
                "type hello",
                "restore_keyboard com.google.android.inputmethod.latin/.LatinIME",
            ]
        );
    }

    #[test]
    fn test_type_restores_keyboard_even_when_typing_fails() {
        let device = Arc::new(FakeDevice {
            fail_keyboard: true,
            fail_type: true,
            ..FakeDevice::new()
        });
        let handler = handler_with(device.clone());
        let result = handler
            .execute(&Action::Do(DoAction::Type { text: "x".into() }), 1080, 2400)
            .unwrap();
        assert!(!result.success);
        assert!(!result.should_finish);
        assert_eq!(device.calls().last().map(String::as_str), Some("restore_keyboard "));
    }

    #[test]
    fn test_device_error_becomes_failure() {
        let device = Arc::new(FakeDevice {
            fail_tap: true,
            ..FakeDevice::new()
        });
        let handler = handler_with(device);
        let result = handler.execute(&tap(vec![10, 10]), 1080, 2400).unwrap();
        assert!(!result.success);
        assert!(result.message.unwrap().contains("input tap failed"));
    }

    #[test]
    fn test_swipe_and_keys() {
        let device = Arc::new(FakeDevice::new());
        let handler = handler_with(device.clone());
        let swipe = Action::Do(DoAction::Swipe {
            start: vec![500, 800],
            end: vec![500, 200],
        });
        handler.execute(&swipe, 1000, 2000).unwrap();
        handler.execute(&Action::Do(DoAction::Back), 1000, 2000).unwrap();
        handler.execute(&Action::Do(DoAction::Home), 1000, 2000).unwrap();
        handler
            .execute(&Action::Do(DoAction::DoubleTap { element: vec![100, 100] }), 1000, 2000)
            .unwrap();
        handler
            .execute(&Action::Do(DoAction::LongPress { element: vec![100, 100] }), 1000, 2000)
            .unwrap();
        assert_eq!(
            device.calls(),
            vec![
                "swipe 500 1600 500 400",
                "back",
                "home",
                "double_tap 100 200",
                "long_press 100 200",
            ]
        );
    }

    #[test]
    fn test_placeholders_and_unknown() {
        let device = Arc::new(FakeDevice::new());
        let handler = handler_with(device.clone());

        let interact = handler.execute(&Action::Do(DoAction::Interact), 1080, 2400).unwrap();
        assert!(interact.success);
        assert_eq!(interact.message.as_deref(), Some("User interaction required"));

        let note = handler
            .execute(&Action::Do(DoAction::Note { message: None }), 1080, 2400)
            .unwrap();
        assert_eq!(note, ActionResult::success());

        let unknown = handler
            .execute(&Action::Do(DoAction::Unknown { name: "Fly".into() }), 1080, 2400)
            .unwrap();
        assert!(!unknown.success);
        assert!(!unknown.should_finish);
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_takeover_uses_default_message() {
        let device = Arc::new(FakeDevice::new());
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = seen.clone();
        let handler = ActionHandler::new(
            device,
            None,
            None,
            Some(Box::new(move |msg| {
                *sink.lock().unwrap() = msg.to_string();
                Ok(())
            })),
        );
        let result = handler
            .execute(&Action::Do(DoAction::TakeOver { message: None }), 1080, 2400)
            .unwrap();
        assert!(result.success);
        assert_eq!(*seen.lock().unwrap(), "User intervention required");
    }

    #[test]
    fn test_parse_wait_duration() {
        assert_eq!(parse_wait_duration(Some("2 seconds")), Duration::from_secs(2));
        assert_eq!(parse_wait_duration(Some("0.5")), Duration::from_millis(500));
        assert_eq!(parse_wait_duration(Some("soon")), DEFAULT_WAIT);
        assert_eq!(parse_wait_duration(Some("-3")), DEFAULT_WAIT);
        assert_eq!(parse_wait_duration(Some("NaN")), DEFAULT_WAIT);
        assert_eq!(parse_wait_duration(Some("1e20 seconds")), DEFAULT_WAIT);
        assert_eq!(parse_wait_duration(None), DEFAULT_WAIT);
    }

    #[test]
    fn test_wait_with_oversized_duration_falls_back() {
        let device = Arc::new(FakeDevice::new());
        let handler = handler_with(device.clone());
        let action = crate::actions::parse_action(r#"do(action="Wait", duration="1e20 seconds")"#)
            .unwrap();

        let result = handler.execute(&action, 1080, 2400).unwrap();
        assert_eq!(result, ActionResult::success());
        assert!(device.calls().is_empty());
    }
}
