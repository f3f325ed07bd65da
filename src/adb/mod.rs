//! ADB (Android Debug Bridge) backend for the [`Device`](crate::device::Device) capability.

mod connection;
mod device;
mod input;
mod screenshot;

pub use connection::{ADBConnection, AdbError, ConnectionType, DeviceInfo, DEFAULT_TCPIP_PORT};
pub use device::{foreground_app_label, swipe_duration_ms, AdbDevice, SYSTEM_HOME};
pub use input::{encode_input, ADB_KEYBOARD_IME};

pub(crate) use connection::{adb_command, combined_output};
