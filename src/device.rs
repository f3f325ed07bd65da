//! Device capability consumed by the agent.
//!
//! Everything the agent needs from a phone goes through [`Device`]. The ADB
//! backend lives in [`crate::adb`]; tests use [`testing::FakeDevice`].

use thiserror::Error;

/// Device operation errors.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Failed to run device command: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device command failed: {0}")]
    CommandFailed(String),
    #[error("Invalid screenshot: {0}")]
    InvalidScreenshot(String),
}

/// A captured screen.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub base64_data: String,
    pub width: u32,
    pub height: u32,
    pub is_sensitive: bool,
}

impl Screenshot {
    /// Create a new screenshot.
    pub fn new(base64_data: String, width: u32, height: u32, is_sensitive: bool) -> Self {
        Self {
            base64_data,
            width,
            height,
            is_sensitive,
        }
    }
}

/// Operations the agent performs on a phone.
///
/// Every call is synchronous and blocks until the underlying command has
/// returned (plus any settle delay the backend applies). Coordinates are
/// absolute pixels.
pub trait Device: Send + Sync {
    fn screenshot(&self, device_id: Option<&str>) -> Result<Screenshot, DeviceError>;

    /// Label of the foreground app.
    fn current_app(&self, device_id: Option<&str>) -> Result<String, DeviceError>;

    fn tap(&self, x: i32, y: i32, device_id: Option<&str>) -> Result<(), DeviceError>;

    fn double_tap(&self, x: i32, y: i32, device_id: Option<&str>) -> Result<(), DeviceError>;

    fn long_press(&self, x: i32, y: i32, device_id: Option<&str>) -> Result<(), DeviceError>;

    fn swipe(
        &self,
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        device_id: Option<&str>,
    ) -> Result<(), DeviceError>;

    fn back(&self, device_id: Option<&str>) -> Result<(), DeviceError>;

    fn home(&self, device_id: Option<&str>) -> Result<(), DeviceError>;

    /// Launch an app by package identifier. `Ok(false)` means the package has
    /// no launchable activity on the device.
    fn launch_app(&self, package: &str, device_id: Option<&str>) -> Result<bool, DeviceError>;

    fn type_text(&self, text: &str, device_id: Option<&str>) -> Result<(), DeviceError>;

    fn clear_text(&self, device_id: Option<&str>) -> Result<(), DeviceError>;

    /// Switch to the ADB keyboard, returning the IME that was active before.
    fn detect_and_set_keyboard(&self, device_id: Option<&str>) -> Result<String, DeviceError>;

    fn restore_keyboard(&self, ime: &str, device_id: Option<&str>) -> Result<(), DeviceError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory device that records calls.

    use std::sync::Mutex;

    use super::{Device, DeviceError, Screenshot};

    #[derive(Default)]
    pub struct FakeDevice {
        pub calls: Mutex<Vec<String>>,
        pub width: u32,
        pub height: u32,
        pub app: String,
        pub fail_screenshot: bool,
        pub fail_current_app: bool,
        pub fail_keyboard: bool,
        pub fail_type: bool,
        pub fail_tap: bool,
        /// Packages that report "not launchable".
        pub missing_packages: Vec<String>,
    }

    impl FakeDevice {
        pub fn new() -> Self {
            Self {
                width: 1080,
                height: 2400,
                app: "System Home".to_string(),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|c| c.clone()).unwrap_or_default()
        }

        /// Calls that change device state (everything except observation).
        pub fn action_calls(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|c| c != "screenshot" && c != "current_app")
                .collect()
        }

        fn record(&self, call: String) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
        }
    }

    impl Device for FakeDevice {
        fn screenshot(&self, _device_id: Option<&str>) -> Result<Screenshot, DeviceError> {
            self.record("screenshot".to_string());
            if self.fail_screenshot {
                return Err(DeviceError::CommandFailed("screencap failed".to_string()));
            }
            Ok(Screenshot::new(
                "iVBORw0KGgo=".to_string(),
                self.width,
                self.height,
                false,
            ))
        }

        fn current_app(&self, _device_id: Option<&str>) -> Result<String, DeviceError> {
            self.record("current_app".to_string());
            if self.fail_current_app {
                return Err(DeviceError::CommandFailed("dumpsys failed".to_string()));
            }
            Ok(self.app.clone())
        }

        fn tap(&self, x: i32, y: i32, _device_id: Option<&str>) -> Result<(), DeviceError> {
            self.record(format!("tap {} {}", x, y));
            if self.fail_tap {
                return Err(DeviceError::CommandFailed("input tap failed".to_string()));
            }
            Ok(())
        }

        fn double_tap(&self, x: i32, y: i32, _device_id: Option<&str>) -> Result<(), DeviceError> {
            self.record(format!("double_tap {} {}", x, y));
            Ok(())
        }

        fn long_press(&self, x: i32, y: i32, _device_id: Option<&str>) -> Result<(), DeviceError> {
            self.record(format!("long_press {} {}", x, y));
            Ok(())
        }

        fn swipe(
            &self,
            start_x: i32,
            start_y: i32,
            end_x: i32,
            end_y: i32,
            _device_id: Option<&str>,
        ) -> Result<(), DeviceError> {
            self.record(format!("swipe {} {} {} {}", start_x, start_y, end_x, end_y));
            Ok(())
        }

        fn back(&self, _device_id: Option<&str>) -> Result<(), DeviceError> {
            self.record("back".to_string());
            Ok(())
        }

        fn home(&self, _device_id: Option<&str>) -> Result<(), DeviceError> {
            self.record("home".to_string());
            Ok(())
        }

        fn launch_app(&self, package: &str, _device_id: Option<&str>) -> Result<bool, DeviceError> {
            self.record(format!("launch {}", package));
            Ok(!self.missing_packages.iter().any(|p| p == package))
        }

        fn type_text(&self, text: &str, _device_id: Option<&str>) -> Result<(), DeviceError> {
            self.record(format!("type {}", text));
            if self.fail_type {
                return Err(DeviceError::CommandFailed("broadcast failed".to_string()));
            }
            Ok(())
        }

        fn clear_text(&self, _device_id: Option<&str>) -> Result<(), DeviceError> {
            self.record("clear".to_string());
            Ok(())
        }

        fn detect_and_set_keyboard(&self, _device_id: Option<&str>) -> Result<String, DeviceError> {
            self.record("set_keyboard".to_string());
            if self.fail_keyboard {
                return Err(DeviceError::CommandFailed("settings get failed".to_string()));
            }
            Ok("com.google.android.inputmethod.latin/.LatinIME".to_string())
        }

        fn restore_keyboard(&self, ime: &str, _device_id: Option<&str>) -> Result<(), DeviceError> {
            self.record(format!("restore_keyboard {}", ime));
            Ok(())
        }
    }
}
