//! Configuration management for routerchat.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::Backend;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub chat: ChatConfig,
}

/// Default backend and model selection for a fresh conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_backend_token")]
    pub backend: String,
    #[serde(default)]
    pub model: String,
}

fn default_backend_token() -> String {
    Backend::OpenRouter.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chat: ChatConfig {
                backend: default_backend_token(),
                model: Backend::OpenRouter.default_model().to_string(),
            },
        }
    }
}

impl AppConfig {
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".routerchat").join("config.toml"))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;
            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Self::default()
        };

        if let Ok(backend) = std::env::var("ROUTERCHAT_BACKEND") {
            config.chat.backend = backend;
        }
        if let Ok(model) = std::env::var("ROUTERCHAT_MODEL") {
            config.chat.model = model;
        }

        Ok(config)
    }

    /// The configured default backend, parsed.
    pub fn default_backend(&self) -> Result<Backend> {
        self.chat
            .backend
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))
    }

    /// The configured default model, falling back to the backend's first
    /// known model when unset.
    pub fn default_model(&self, backend: Backend) -> String {
        if self.chat.model.is_empty() {
            backend.default_model().to_string()
        } else {
            self.chat.model.clone()
        }
    }

    pub fn save_default() -> Result<PathBuf> {
        let config_path = Self::config_path()?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let default = Self::default();
        let content = toml::to_string_pretty(&default).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.default_backend().unwrap(), Backend::OpenRouter);
        assert_eq!(config.default_model(Backend::OpenRouter), "openai/gpt-4o");
    }

    #[test]
    fn test_parse_config_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [chat]
            backend = "anthropic_messages"
            model = "claude-3-opus-20240229"
            "#,
        )
        .unwrap();
        assert_eq!(config.default_backend().unwrap(), Backend::AnthropicMessages);
        assert_eq!(
            config.default_model(Backend::AnthropicMessages),
            "claude-3-opus-20240229"
        );
    }

    #[test]
    fn test_empty_model_falls_back_to_backend_default() {
        let config: AppConfig = toml::from_str("[chat]\nbackend = \"anthropic_completion\"\n").unwrap();
        assert_eq!(
            config.default_model(Backend::AnthropicCompletion),
            "claude-2"
        );
    }

    #[test]
    fn test_bad_backend_token_is_an_error() {
        let config: AppConfig = toml::from_str("[chat]\nbackend = \"mystery\"\n").unwrap();
        assert!(config.default_backend().is_err());
    }
}
