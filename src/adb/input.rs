//! Text input through the ADB Keyboard IME.
//!
//! Requires ADB Keyboard to be installed on the device.
//! See: https://github.com/senzhk/ADBKeyBoard

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::device::DeviceError;

use super::device::AdbDevice;

/// IME identifier of ADB Keyboard.
pub const ADB_KEYBOARD_IME: &str = "com.android.adbkeyboard/.AdbIME";

/// Encode text for the `ADB_INPUT_B64` broadcast.
pub fn encode_input(text: &str) -> String {
    STANDARD.encode(text.as_bytes())
}

impl AdbDevice {
    /// Type text into the focused field via a base64 broadcast.
    pub(super) fn broadcast_text(&self, text: &str, device_id: Option<&str>) -> Result<(), DeviceError> {
        let encoded = encode_input(text);
        self.shell(
            device_id,
            &["am", "broadcast", "-a", "ADB_INPUT_B64", "--es", "msg", &encoded],
        )?;
        Ok(())
    }

    /// Clear the focused field.
    pub(super) fn broadcast_clear(&self, device_id: Option<&str>) -> Result<(), DeviceError> {
        self.shell(device_id, &["am", "broadcast", "-a", "ADB_CLEAR_TEXT"])?;
        Ok(())
    }

    /// Switch to ADB Keyboard if needed, returning the IME that was active.
    pub(super) fn switch_to_adb_keyboard(&self, device_id: Option<&str>) -> Result<String, DeviceError> {
        let current_ime = self
            .shell(device_id, &["settings", "get", "secure", "default_input_method"])?
            .trim()
            .to_string();

        if !current_ime.contains(ADB_KEYBOARD_IME) {
            self.shell(device_id, &["ime", "set", ADB_KEYBOARD_IME])?;
        }

        // An empty broadcast wakes the keyboard service before real input.
        self.broadcast_text("", device_id)?;

        Ok(current_ime)
    }

    /// Restore a previously active IME. No-op for an empty id or ADB Keyboard itself.
    pub(super) fn set_ime(&self, ime: &str, device_id: Option<&str>) -> Result<(), DeviceError> {
        if ime.is_empty() || ime.contains(ADB_KEYBOARD_IME) {
            return Ok(());
        }
        self.shell(device_id, &["ime", "set", ime])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_input_handles_unicode() {
        assert_eq!(encode_input("hi"), "aGk=");
        let encoded = encode_input("Hello, 世界!");
        let decoded = STANDARD.decode(encoded).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "Hello, 世界!");
    }

    #[test]
    fn test_restore_adb_keyboard_is_noop() {
        // Must not spawn adb for these inputs.
        let device = AdbDevice::new().with_adb_path("/nonexistent/adb");
        assert!(device.set_ime("", None).is_ok());
        assert!(device.set_ime(ADB_KEYBOARD_IME, None).is_ok());
        assert!(device.set_ime("com.other/.Ime", None).is_err());
    }
}
