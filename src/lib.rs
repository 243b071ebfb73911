pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod llm;
pub mod notify;
mod repl;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;

use cli::CliArgs;
use commands::ChatController;
use config::{ChatConfig, ConfigError};
use notify::{LogSink, ToggleSink};

pub use commands::{SendOutcome, SessionState, Snapshot};
pub use error::{ChatError, FailureKind};

fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Layer flags and env over the config file. A file that fails to load
/// falls back to defaults, and its error is handed back for reporting.
fn load_config(args: &CliArgs) -> (PathBuf, ChatConfig, Option<ConfigError>) {
    let path = args.resolve_config_path();
    let (config, load_error) = match ChatConfig::load_if_present(&path) {
        Ok(config) => (config, None),
        Err(e) => (ChatConfig::default(), Some(e)),
    };
    (path, args.apply(config), load_error)
}

pub async fn run(args: CliArgs) -> std::io::Result<()> {
    let (config_path, config, load_error) = load_config(&args);
    init_logging(&config.log_level);
    match load_error {
        Some(e) => tracing::warn!(
            "Failed to load config from {}: {}. Using defaults.",
            config_path.display(),
            e
        ),
        None => tracing::info!(path = %config_path.display(), "Configuration loaded"),
    }
    tracing::info!(endpoint = %config.endpoint, "weather chat starting");

    let sink = Arc::new(ToggleSink::new(LogSink, config.sound_enabled));
    let controller = Arc::new(ChatController::new(&config, sink.clone()));
    repl::run(controller, sink).await
}
