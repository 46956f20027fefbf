//! Logging configuration.

use serde::Deserialize;

use crate::error::OrchestratorResult;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Logging configuration.
///
/// - `BPMN_LOG_FORMAT`: "plain" or "json" (default: "plain")
/// - `BPMN_LOG_FILTER`: `EnvFilter` directive, overridden by `RUST_LOG` when set
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_filter")]
    pub log_filter: String,
}

fn default_filter() -> String {
    "info,bpmn_orchestrator=debug".to_string()
}

impl LogConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> OrchestratorResult<Self> {
        dotenvy::dotenv().ok();
        Ok(envy::prefixed("BPMN_").from_env::<LogConfig>()?)
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_filter: default_filter(),
        }
    }
}
