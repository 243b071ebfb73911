use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::llm::classifier::{MetadataPolicy, DEFAULT_METADATA_MARKERS};

pub const DEFAULT_ENDPOINT: &str =
    "https://millions-screeching-vultur.mastra.cloud/api/agents/weatherAgent/stream";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Client settings. Every field has a default, so a partial file is valid.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ChatConfig {
    pub endpoint: String,
    pub run_id: String,
    pub resource_id: String,
    pub thread_id: String,
    pub max_retries: u32,
    pub max_steps: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Deadline for one request, from send to end of body.
    pub request_timeout_ms: u64,
    pub max_message_chars: usize,
    pub sound_enabled: bool,
    pub log_level: String,
    /// Substrings that mark an unshaped stream line as metadata.
    pub metadata_markers: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            run_id: "weatherAgent".to_string(),
            resource_id: "weatherAgent".to_string(),
            thread_id: "60002220086".to_string(),
            max_retries: 2,
            max_steps: 5,
            temperature: 0.5,
            top_p: 1.0,
            request_timeout_ms: 45_000,
            max_message_chars: 1000,
            sound_enabled: true,
            log_level: "info".to_string(),
            metadata_markers: DEFAULT_METADATA_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl ChatConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Like [`ChatConfig::load`], but a missing file yields defaults.
    ///
    /// Called before logging is up, so errors are returned rather than logged.
    pub fn load_if_present(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn metadata_policy(&self) -> MetadataPolicy {
        MetadataPolicy::new(self.metadata_markers.iter().cloned())
    }
}
