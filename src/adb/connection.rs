//! ADB connection management for local and remote devices.

use std::process::{Command, Output};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::device::DeviceError;

/// Default TCP/IP port used by `adb tcpip` and `adb connect`.
pub const DEFAULT_TCPIP_PORT: u16 = 5555;

/// Type of ADB connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    Usb,
    Remote,
}

impl ConnectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::Usb => "usb",
            ConnectionType::Remote => "remote",
        }
    }
}

/// Information about a connected device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub device_id: String,
    pub status: String,
    pub connection_type: ConnectionType,
    pub model: Option<String>,
}

impl DeviceInfo {
    /// Whether adb reports the device as ready for commands.
    pub fn is_ready(&self) -> bool {
        self.status == "device"
    }
}

/// ADB connection errors.
#[derive(Error, Debug)]
pub enum AdbError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Command execution failed: {0}")]
    CommandFailed(String),
    #[error("Device IP not found")]
    IpNotFound,
}

/// Manages ADB connections to Android devices.
///
/// Supports USB and remote TCP/IP connections.
///
/// # Example
/// ```rust,no_run
/// use adb_agent::adb::ADBConnection;
///
/// let conn = ADBConnection::new();
/// // Connect to remote device
/// let result = conn.connect("192.168.1.100:5555");
/// // List devices
/// let devices = conn.list_devices();
/// ```
pub struct ADBConnection {
    adb_path: String,
}

impl Default for ADBConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl ADBConnection {
    /// Create a new ADB connection manager with default path.
    pub fn new() -> Self {
        Self {
            adb_path: "adb".to_string(),
        }
    }

    /// Create a new ADB connection manager with custom ADB path.
    pub fn with_path(adb_path: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, AdbError> {
        tracing::debug!(adb = %self.adb_path, ?args, "running adb command");
        let output = Command::new(&self.adb_path)
            .args(args)
            .output()
            .map_err(|e| AdbError::CommandFailed(e.to_string()))?;
        Ok(combined_output(&output))
    }

    /// Connect to a remote device via TCP/IP.
    ///
    /// # Arguments
    /// * `address` - Device address in format "host:port". The port defaults to 5555.
    pub fn connect(&self, address: &str) -> Result<String, AdbError> {
        let address = normalize_address(address);
        let output = self.run(&["connect", &address])?;
        let lower = output.to_lowercase();

        if lower.contains("already connected") {
            Ok(format!("Already connected to {}", address))
        } else if lower.contains("connected") && !lower.contains("cannot") && !lower.contains("failed") {
            Ok(format!("Connected to {}", address))
        } else {
            Err(AdbError::Connection(output.trim().to_string()))
        }
    }

    /// Disconnect from a remote device.
    ///
    /// # Arguments
    /// * `address` - Device address to disconnect. If None, disconnects all.
    pub fn disconnect(&self, address: Option<&str>) -> Result<String, AdbError> {
        let output = match address {
            Some(addr) => self.run(&["disconnect", addr])?,
            None => self.run(&["disconnect"])?,
        };
        Ok(output.trim().to_string())
    }

    /// List all connected devices.
    pub fn list_devices(&self) -> Result<Vec<DeviceInfo>, AdbError> {
        let output = self.run(&["devices", "-l"])?;
        Ok(parse_device_list(&output))
    }

    /// Enable TCP/IP debugging on a USB-connected device.
    pub fn enable_tcpip(&self, port: u16, device_id: Option<&str>) -> Result<String, AdbError> {
        let port = port.to_string();
        let mut args = device_args(device_id);
        args.extend(["tcpip", port.as_str()]);
        let output = self.run(&args)?;

        if output.to_lowercase().contains("restarting") {
            // adbd restarts on the device; give it time before callers connect.
            thread::sleep(Duration::from_secs(3));
            Ok(format!("TCP/IP mode enabled on port {}", port))
        } else {
            Err(AdbError::CommandFailed(output.trim().to_string()))
        }
    }

    /// Get the Wi-Fi IP address of a device.
    pub fn get_device_ip(&self, device_id: Option<&str>) -> Result<String, AdbError> {
        let mut args = device_args(device_id);
        args.extend(["shell", "ip", "route"]);
        let routes = self.run(&args)?;
        if let Some(ip) = parse_route_src(&routes) {
            return Ok(ip);
        }

        let mut args = device_args(device_id);
        args.extend(["shell", "ip", "addr", "show", "wlan0"]);
        let addrs = self.run(&args)?;
        parse_inet_addr(&addrs).ok_or(AdbError::IpNotFound)
    }

    /// Restart the ADB server.
    pub fn restart_server(&self) -> Result<String, AdbError> {
        self.run(&["kill-server"])?;
        thread::sleep(Duration::from_secs(1));
        let output = self.run(&["start-server"])?;
        Ok(output.trim().to_string())
    }
}

fn device_args(device_id: Option<&str>) -> Vec<&str> {
    match device_id {
        Some(id) => vec!["-s", id],
        None => Vec::new(),
    }
}

fn normalize_address(address: &str) -> String {
    if address.contains(':') {
        address.to_string()
    } else {
        format!("{}:{}", address, DEFAULT_TCPIP_PORT)
    }
}

/// Parse the output of `adb devices -l`.
fn parse_device_list(output: &str) -> Vec<DeviceInfo> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 2 {
                return None;
            }

            let device_id = parts[0].to_string();
            let connection_type = if device_id.contains(':') {
                ConnectionType::Remote
            } else {
                ConnectionType::Usb
            };
            let model = parts[2..]
                .iter()
                .find_map(|p| p.strip_prefix("model:"))
                .map(str::to_string);

            Some(DeviceInfo {
                device_id,
                status: parts[1].to_string(),
                connection_type,
                model,
            })
        })
        .collect()
}

fn parse_route_src(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let parts: Vec<&str> = line.split_whitespace().collect();
        parts
            .iter()
            .position(|p| *p == "src")
            .and_then(|i| parts.get(i + 1))
            .map(|ip| ip.to_string())
    })
}

fn parse_inet_addr(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let line = line.trim();
        let rest = line.strip_prefix("inet ")?;
        rest.split_whitespace()
            .next()
            .and_then(|cidr| cidr.split('/').next())
            .map(str::to_string)
    })
}

/// Build an adb command targeting an optional device.
pub(crate) fn adb_command(adb_path: &str, device_id: Option<&str>) -> Command {
    let mut command = Command::new(adb_path);
    if let Some(id) = device_id {
        command.args(["-s", id]);
    }
    command
}

/// Run a prepared command, failing on a non-zero exit status.
pub(crate) fn run_checked(command: &mut Command) -> Result<Output, DeviceError> {
    tracing::debug!(?command, "running device command");
    let output = command.output()?;
    if !output.status.success() {
        return Err(DeviceError::CommandFailed(combined_output(&output).trim().to_string()));
    }
    Ok(output)
}

pub(crate) fn combined_output(output: &Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adb_connection_new() {
        let conn = ADBConnection::new();
        assert_eq!(conn.adb_path, "adb");
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("192.168.1.5"), "192.168.1.5:5555");
        assert_eq!(normalize_address("192.168.1.5:7000"), "192.168.1.5:7000");
    }

    #[test]
    fn test_parse_device_list() {
        let output = "List of devices attached\n\
            emulator-5554          device product:sdk model:Pixel_7 device:emu64\n\
            192.168.1.20:5555      offline\n\n";
        let devices = parse_device_list(output);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].device_id, "emulator-5554");
        assert_eq!(devices[0].connection_type, ConnectionType::Usb);
        assert_eq!(devices[0].model.as_deref(), Some("Pixel_7"));
        assert!(devices[0].is_ready());
        assert_eq!(devices[1].connection_type, ConnectionType::Remote);
        assert!(!devices[1].is_ready());
    }

    #[test]
    fn test_parse_device_ip() {
        let route = "192.168.1.0/24 dev wlan0 proto kernel scope link src 192.168.1.42\n";
        assert_eq!(parse_route_src(route).as_deref(), Some("192.168.1.42"));
        assert_eq!(parse_route_src("default via 10.0.0.1 dev rmnet0"), None);

        let addr = "3: wlan0: <BROADCAST,MULTICAST,UP>\n    inet 10.1.2.3/24 brd 10.1.2.255 scope global wlan0\n";
        assert_eq!(parse_inet_addr(addr).as_deref(), Some("10.1.2.3"));
    }
}
