//! Device control over the `adb` command line.

use std::thread;
use std::time::Duration;

use crate::config::alias_for_package;
use crate::device::{Device, DeviceError, Screenshot};

use super::connection::{adb_command, combined_output, run_checked};

/// Label reported when no known app holds focus.
pub const SYSTEM_HOME: &str = "System Home";

const DOUBLE_TAP_INTERVAL: Duration = Duration::from_millis(100);
const LONG_PRESS_DURATION_MS: u64 = 3000;

/// Swipe duration in milliseconds for a gesture between two points.
///
/// Squared pixel distance divided by 1000, clamped to 1000..=2000.
pub fn swipe_duration_ms(start_x: i32, start_y: i32, end_x: i32, end_y: i32) -> u64 {
    let dx = (start_x - end_x) as i64;
    let dy = (start_y - end_y) as i64;
    let dist_sq = (dx * dx + dy * dy) as u64;
    (dist_sq / 1000).clamp(1000, 2000)
}

/// Map `dumpsys window` output to an app label.
///
/// The focused package is taken from the `mCurrentFocus` / `mFocusedApp`
/// lines and translated through the alias table.
pub fn foreground_app_label(dumpsys: &str) -> String {
    dumpsys
        .lines()
        .filter(|line| line.contains("mCurrentFocus") || line.contains("mFocusedApp"))
        .filter_map(focused_package)
        .find_map(alias_for_package)
        .map(str::to_string)
        .unwrap_or_else(|| SYSTEM_HOME.to_string())
}

/// Extract `com.pkg` from a token such as `com.pkg/.MainActivity}`.
fn focused_package(line: &str) -> Option<&str> {
    line.split_whitespace()
        .filter_map(|token| token.split_once('/').map(|(pkg, _)| pkg))
        .find(|pkg| pkg.contains('.'))
}

/// Android device reached through the `adb` binary.
///
/// Every gesture is followed by a settle delay so the UI has stabilised
/// before the next screenshot.
#[derive(Debug, Clone)]
pub struct AdbDevice {
    pub(super) adb_path: String,
    pub(super) settle_delay: Duration,
}

impl Default for AdbDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AdbDevice {
    pub fn new() -> Self {
        Self {
            adb_path: "adb".to_string(),
            settle_delay: Duration::from_secs(1),
        }
    }

    pub fn with_adb_path(mut self, adb_path: impl Into<String>) -> Self {
        self.adb_path = adb_path.into();
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Run `adb shell <args>` and return its combined output.
    pub(super) fn shell(&self, device_id: Option<&str>, args: &[&str]) -> Result<String, DeviceError> {
        let mut command = adb_command(&self.adb_path, device_id);
        command.arg("shell").args(args);
        let output = run_checked(&mut command)?;
        Ok(combined_output(&output))
    }

    fn settle(&self) {
        thread::sleep(self.settle_delay);
    }

    fn input_tap(&self, x: i32, y: i32, device_id: Option<&str>) -> Result<(), DeviceError> {
        self.shell(device_id, &["input", "tap", &x.to_string(), &y.to_string()])?;
        Ok(())
    }

    fn input_swipe(
        &self,
        from: (i32, i32),
        to: (i32, i32),
        duration_ms: u64,
        device_id: Option<&str>,
    ) -> Result<(), DeviceError> {
        self.shell(
            device_id,
            &[
                "input",
                "swipe",
                &from.0.to_string(),
                &from.1.to_string(),
                &to.0.to_string(),
                &to.1.to_string(),
                &duration_ms.to_string(),
            ],
        )?;
        Ok(())
    }
}

impl Device for AdbDevice {
    fn screenshot(&self, device_id: Option<&str>) -> Result<Screenshot, DeviceError> {
        self.capture_screenshot(device_id)
    }

    fn current_app(&self, device_id: Option<&str>) -> Result<String, DeviceError> {
        let output = self.shell(device_id, &["dumpsys", "window"])?;
        Ok(foreground_app_label(&output))
    }

    fn tap(&self, x: i32, y: i32, device_id: Option<&str>) -> Result<(), DeviceError> {
        self.input_tap(x, y, device_id)?;
        self.settle();
        Ok(())
    }

    fn double_tap(&self, x: i32, y: i32, device_id: Option<&str>) -> Result<(), DeviceError> {
        self.input_tap(x, y, device_id)?;
        thread::sleep(DOUBLE_TAP_INTERVAL);
        self.input_tap(x, y, device_id)?;
        self.settle();
        Ok(())
    }

    fn long_press(&self, x: i32, y: i32, device_id: Option<&str>) -> Result<(), DeviceError> {
        self.input_swipe((x, y), (x, y), LONG_PRESS_DURATION_MS, device_id)?;
        self.settle();
        Ok(())
    }

    fn swipe(
        &self,
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        device_id: Option<&str>,
    ) -> Result<(), DeviceError> {
        let duration = swipe_duration_ms(start_x, start_y, end_x, end_y);
        self.input_swipe((start_x, start_y), (end_x, end_y), duration, device_id)?;
        self.settle();
        Ok(())
    }

    fn back(&self, device_id: Option<&str>) -> Result<(), DeviceError> {
        self.shell(device_id, &["input", "keyevent", "4"])?;
        self.settle();
        Ok(())
    }

    fn home(&self, device_id: Option<&str>) -> Result<(), DeviceError> {
        self.shell(device_id, &["input", "keyevent", "KEYCODE_HOME"])?;
        self.settle();
        Ok(())
    }

    fn launch_app(&self, package: &str, device_id: Option<&str>) -> Result<bool, DeviceError> {
        let mut command = adb_command(&self.adb_path, device_id);
        command.args([
            "shell",
            "monkey",
            "-p",
            package,
            "-c",
            "android.intent.category.LAUNCHER",
            "1",
        ]);
        tracing::debug!(?command, "launching app");
        let output = command.output()?;
        let text = combined_output(&output);

        // monkey exits non-zero when the package has no launcher activity.
        if text.contains("No activities found") || text.contains("monkey aborted") {
            tracing::warn!(package, "package has no launchable activity");
            return Ok(false);
        }
        if !output.status.success() {
            return Err(DeviceError::CommandFailed(text.trim().to_string()));
        }

        self.settle();
        Ok(true)
    }

    fn type_text(&self, text: &str, device_id: Option<&str>) -> Result<(), DeviceError> {
        self.broadcast_text(text, device_id)
    }

    fn clear_text(&self, device_id: Option<&str>) -> Result<(), DeviceError> {
        self.broadcast_clear(device_id)
    }

    fn detect_and_set_keyboard(&self, device_id: Option<&str>) -> Result<String, DeviceError> {
        self.switch_to_adb_keyboard(device_id)
    }

    fn restore_keyboard(&self, ime: &str, device_id: Option<&str>) -> Result<(), DeviceError> {
        self.set_ime(ime, device_id)
    }
}
