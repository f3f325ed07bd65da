//! Screenshot capture for Android devices.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage};

use crate::device::{DeviceError, Screenshot};

use super::connection::adb_command;
use super::device::AdbDevice;

const PNG_MAGIC: &[u8; 8] = b"\x89PNG\r\n\x1a\n";
const FALLBACK_WIDTH: u32 = 1080;
const FALLBACK_HEIGHT: u32 = 2400;

impl AdbDevice {
    /// Capture the screen with `adb exec-out screencap -p`.
    ///
    /// Screens the system refuses to capture (payment pages and the like)
    /// yield a black placeholder flagged `is_sensitive`.
    pub(super) fn capture_screenshot(&self, device_id: Option<&str>) -> Result<Screenshot, DeviceError> {
        let mut command = adb_command(&self.adb_path, device_id);
        command.args(["exec-out", "screencap", "-p"]);
        tracing::debug!(?command, "capturing screenshot");
        let output = command.output()?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_sensitive_failure(&stderr) {
            tracing::warn!("screenshot refused, using sensitive placeholder: {}", stderr.trim());
            return fallback_screenshot(true);
        }
        if !output.status.success() {
            return Err(DeviceError::CommandFailed(stderr.trim().to_string()));
        }

        decode_png(&output.stdout)
    }
}

fn is_sensitive_failure(stderr: &str) -> bool {
    stderr.contains("Status: -1") || stderr.contains("Failed")
}

/// Validate PNG bytes and wrap them as a screenshot.
pub(crate) fn decode_png(png: &[u8]) -> Result<Screenshot, DeviceError> {
    if png.len() < PNG_MAGIC.len() || &png[..PNG_MAGIC.len()] != PNG_MAGIC {
        return Err(DeviceError::InvalidScreenshot(format!(
            "not a PNG ({} bytes)",
            png.len()
        )));
    }

    let (width, height) = ImageReader::with_format(Cursor::new(png), ImageFormat::Png)
        .into_dimensions()
        .map_err(|e| DeviceError::InvalidScreenshot(e.to_string()))?;

    Ok(Screenshot::new(STANDARD.encode(png), width, height, false))
}

/// Black 1080x2400 PNG.
pub(crate) fn fallback_screenshot(is_sensitive: bool) -> Result<Screenshot, DeviceError> {
    let black = RgbImage::new(FALLBACK_WIDTH, FALLBACK_HEIGHT);
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(black)
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| DeviceError::InvalidScreenshot(e.to_string()))?;

    Ok(Screenshot::new(
        STANDARD.encode(buffer.into_inner()),
        FALLBACK_WIDTH,
        FALLBACK_HEIGHT,
        is_sensitive,
    ))
}
