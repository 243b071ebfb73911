//! Command-line arguments.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use crate::config::ChatConfig;

/// Terminal client for the weather agent.
#[derive(Parser, Debug, Default)]
#[command(name = "weather-chat", version, about)]
pub struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Agent stream endpoint.
    #[arg(short = 'e', long = "endpoint")]
    pub endpoint: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Start with notifications muted.
    #[arg(long = "mute")]
    pub mute: bool,
}

impl CliArgs {
    /// --config flag > WEATHER_CHAT_CONFIG env var > ~/.weather-chat/config.json.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("WEATHER_CHAT_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Apply flag and env overrides on top of a loaded config.
    pub fn apply(&self, mut config: ChatConfig) -> ChatConfig {
        if let Some(ref endpoint) = self.endpoint {
            config.endpoint = endpoint.clone();
        } else if let Ok(endpoint) = std::env::var("WEATHER_CHAT_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(ref level) = self.log_level {
            config.log_level = level.clone();
        }
        if self.mute {
            config.sound_enabled = false;
        }
        config
    }
}

fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".weather-chat").join("config.json");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".weather-chat").join("config.json");
    }
    PathBuf::from("config.json")
}
