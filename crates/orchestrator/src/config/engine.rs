//! Engine configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::OrchestratorResult;
use crate::intercept::InterceptMode;

/// Engine configuration loaded from environment variables.
///
/// Environment variables are prefixed with `BPMN_`:
/// - `BPMN_BUSINESS_API_TIMEOUT_SECS`: hard cutoff for business API calls (default: 30)
/// - `BPMN_INTERCEPT_MODE`: default mode for new intercept sessions (default: "disabled")
/// - `BPMN_RESPONSE_VARIABLE`: variable the service task response is merged under
/// - `BPMN_MAX_DEBUG_STEPS`: loop guard for free-running drivers (default: 1000)
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_timeout_secs")]
    pub business_api_timeout_secs: u64,

    #[serde(default)]
    pub intercept_mode: InterceptMode,

    #[serde(default = "default_response_variable")]
    pub response_variable: String,

    #[serde(default = "default_max_debug_steps")]
    pub max_debug_steps: usize,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_response_variable() -> String {
    "business_response".to_string()
}

fn default_max_debug_steps() -> usize {
    1000
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> OrchestratorResult<Self> {
        dotenvy::dotenv().ok();
        Ok(envy::prefixed("BPMN_").from_env::<EngineConfig>()?)
    }

    /// Business API timeout as a `Duration`.
    pub fn business_api_timeout(&self) -> Duration {
        Duration::from_secs(self.business_api_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            business_api_timeout_secs: default_timeout_secs(),
            intercept_mode: InterceptMode::default(),
            response_variable: default_response_variable(),
            max_debug_steps: default_max_debug_steps(),
        }
    }
}
