//! Configuration for the BPMN orchestrator.
//!
//! Values are read from `BPMN_`-prefixed environment variables using the
//! `envy` crate. A `.env` file is honoured when present.

mod engine;
mod logging;

pub use engine::EngineConfig;
pub use logging::{LogConfig, LogFormat};
