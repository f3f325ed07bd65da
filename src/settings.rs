//! Persisted CLI settings.
//! Stored in the platform-specific config directory via `directories::ProjectDirs`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::actions::ParserMode;
use crate::agent::AgentConfig;
use crate::model::{ModelConfig, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS};

/// Application settings that can be saved and loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Model API base URL
    pub base_url: String,
    /// Model API key
    pub api_key: String,
    /// Model name
    pub model_name: String,
    /// ADB device ID (empty for the only attached device)
    pub device_id: String,
    /// Language code ("cn" or "en")
    pub lang: String,
    /// Action encoding the model is asked for
    pub mode: ParserMode,
    /// Stream model responses
    pub stream: bool,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    /// Maximum retries for model requests
    pub max_retries: u32,
    /// Retry delay in seconds
    pub retry_delay: u64,
    /// Maximum steps for agent
    pub max_steps: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        let model = ModelConfig::default();
        Self {
            base_url: model.base_url,
            api_key: model.api_key,
            model_name: model.model_name,
            device_id: String::new(),
            lang: "cn".to_string(),
            mode: ParserMode::default(),
            stream: false,
            max_tokens: model.max_tokens,
            temperature: model.temperature,
            top_p: model.top_p,
            frequency_penalty: model.frequency_penalty,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY_SECS,
            max_steps: 100,
        }
    }
}

impl AppSettings {
    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "adb-agent")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the settings file path.
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("settings.json"))
    }

    /// Load settings from the config file, falling back to defaults.
    pub fn load() -> Self {
        Self::settings_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load settings from `path`. Missing or unreadable files yield defaults.
    pub fn load_from(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Self::default(),
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "ignoring invalid settings file");
            Self::default()
        })
    }

    /// Save settings to the config file.
    pub fn save(&self) -> Result<PathBuf, String> {
        let path = Self::settings_path().ok_or("Cannot determine config directory")?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(dir) = path.parent() {
            // Create config directory if it doesn't exist
            fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        fs::write(path, content).map_err(|e| format!("Failed to write settings file: {}", e))
    }

    pub fn model_config(&self) -> ModelConfig {
        ModelConfig::default()
            .with_base_url(&self.base_url)
            .with_api_key(&self.api_key)
            .with_model_name(&self.model_name)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
            .with_top_p(self.top_p)
            .with_frequency_penalty(self.frequency_penalty)
            .with_max_retries(self.max_retries)
            .with_retry_delay(self.retry_delay)
            .with_stream(self.stream)
            .with_lang(&self.lang)
    }

    pub fn agent_config(&self) -> AgentConfig {
        let config = AgentConfig::default()
            .with_lang(&self.lang)
            .with_max_steps(self.max_steps)
            .with_mode(self.mode);
        if self.device_id.is_empty() {
            config
        } else {
            config.with_device_id(&self.device_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("adb-agent-{}", uuid::Uuid::new_v4()))
            .join("settings.json")
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path();
        let settings = AppSettings {
            lang: "en".to_string(),
            mode: ParserMode::Dsl,
            device_id: "emulator-5554".to_string(),
            ..AppSettings::default()
        };
        settings.save_to(&path).unwrap();

        assert_eq!(AppSettings::load_from(&path), settings);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let path = temp_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"model_name": "custom", "mode": "dsl"}"#).unwrap();

        let settings = AppSettings::load_from(&path);
        assert_eq!(settings.model_name, "custom");
        assert_eq!(settings.mode, ParserMode::Dsl);
        assert_eq!(settings.max_steps, 100);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_or_invalid_file() {
        assert_eq!(AppSettings::load_from(&temp_path()), AppSettings::default());
    }

    #[test]
    fn test_conversions() {
        let settings = AppSettings {
            device_id: "abc".to_string(),
            stream: true,
            ..AppSettings::default()
        };
        let agent = settings.agent_config();
        assert_eq!(agent.device_id.as_deref(), Some("abc"));
        assert_eq!(agent.mode, ParserMode::Tools);
        assert!(settings.model_config().stream);
        assert_eq!(AppSettings::default().agent_config().device_id, None);
    }
}
