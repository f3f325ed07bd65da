//! Startup checks for the CLI.
//!
//! Each check prints one numbered line ending in OK or FAILED, followed by
//! the fix when it fails.

use regex::Regex;
use std::process::Command;

use crate::adb::{adb_command, combined_output, ADBConnection, ADB_KEYBOARD_IME};
use crate::model::{ChatMessage, ChatModel, ModelClient, ModelConfig};

/// Version number from `adb version` output.
pub fn parse_adb_version(output: &str) -> Option<String> {
    let re = Regex::new(r"Android Debug Bridge version\s+(\d+(?:\.\d+)*)").ok()?;
    re.captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Whether `ime list -s` output lists the ADB keyboard.
pub fn has_adb_keyboard(ime_list: &str) -> bool {
    ime_list.lines().any(|line| line.trim() == ADB_KEYBOARD_IME)
}

fn separator() {
    println!("{}", "-".repeat(50));
}

/// Check that adb runs, a device is ready and the ADB keyboard is installed.
pub fn check_system_requirements(adb_path: &str, device_id: Option<&str>) -> bool {
    println!("🔍 Checking system requirements...");
    separator();

    print!("1. Checking ADB installation... ");
    match Command::new(adb_path).arg("version").output() {
        Ok(output) if output.status.success() => {
            let text = combined_output(&output);
            let version = parse_adb_version(&text).unwrap_or_else(|| "unknown version".to_string());
            println!("✅ OK ({})", version);
        }
        Ok(output) => {
            println!("❌ FAILED");
            println!("   Error: adb exited with {}", output.status);
            return fail_summary();
        }
        Err(e) => {
            println!("❌ FAILED");
            println!("   Error: {} is not installed or not in PATH ({}).", adb_path, e);
            println!("   Solution: Install Android platform tools:");
            println!("     - macOS: brew install android-platform-tools");
            println!("     - Linux: sudo apt install android-tools-adb");
            println!("     - Windows: Download from https://developer.android.com/studio/releases/platform-tools");
            return fail_summary();
        }
    }

    print!("2. Checking connected devices... ");
    let devices = match ADBConnection::with_path(adb_path).list_devices() {
        Ok(devices) => devices,
        Err(e) => {
            println!("❌ FAILED");
            println!("   Error: {}", e);
            return fail_summary();
        }
    };
    let ready: Vec<_> = devices.iter().filter(|d| d.is_ready()).collect();
    if ready.is_empty() {
        println!("❌ FAILED");
        println!("   Error: No devices connected.");
        println!("   Solution:");
        println!("     1. Enable USB debugging on your Android device");
        println!("     2. Connect via USB and authorize the connection");
        println!("     3. Or connect remotely: adb-agent --connect <ip>:<port>");
        return fail_summary();
    }
    let ids: Vec<_> = ready.iter().map(|d| d.device_id.as_str()).collect();
    println!("✅ OK ({} device(s): {})", ready.len(), ids.join(", "));

    print!("3. Checking ADB Keyboard... ");
    let ime_list = adb_command(adb_path, device_id)
        .args(["shell", "ime", "list", "-s"])
        .output();
    let passed = match ime_list {
        Ok(output) if has_adb_keyboard(&combined_output(&output)) => {
            println!("✅ OK");
            true
        }
        Ok(_) => {
            println!("❌ FAILED");
            println!("   Error: ADB Keyboard is not installed on the device.");
            println!("   Solution:");
            println!("     1. Download ADB Keyboard APK from:");
            println!("        https://github.com/senzhk/ADBKeyBoard/blob/master/ADBKeyboard.apk");
            println!("     2. Install it on your device: adb install ADBKeyboard.apk");
            println!("     3. Enable it in Settings > System > Languages & Input > Virtual Keyboard");
            false
        }
        Err(e) => {
            println!("❌ FAILED");
            println!("   Error: {}", e);
            false
        }
    };

    separator();
    if passed {
        println!("✅ All system checks passed!\n");
        true
    } else {
        fail_summary()
    }
}

fn fail_summary() -> bool {
    separator();
    println!("❌ System check failed. Please fix the issues above.");
    false
}

/// Check that the model endpoint answers a tiny chat request.
pub async fn check_model_api(config: &ModelConfig) -> bool {
    println!("🔍 Checking model API...");
    separator();
    print!("1. Checking API connectivity ({})... ", config.base_url);

    let probe = config
        .clone()
        .with_max_tokens(5)
        .with_stream(false)
        .with_verbose(false)
        .with_max_retries(0)
        .with_request_timeout(30);
    let client = ModelClient::new(probe);

    let passed = match client.request(&[ChatMessage::user("Hi", None)], &[]).await {
        Ok(_) => {
            println!("✅ OK");
            true
        }
        Err(e) => {
            println!("❌ FAILED");
            println!("   Error: {}", e);
            println!("   Solution:");
            println!("     1. Check that the model server is running at {}", config.base_url);
            println!("     2. Verify the model name ({}) and API key", config.model_name);
            println!("     3. Check network connectivity and firewall settings");
            false
        }
    };

    separator();
    if passed {
        println!("✅ Model API checks passed!\n");
    } else {
        println!("❌ Model API check failed. Please fix the issues above.");
    }
    passed
}
