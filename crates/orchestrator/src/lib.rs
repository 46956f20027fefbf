//! BPMN Orchestrator Library
//!
//! Turns BPMN XML into an executable state machine and advances workflow
//! instances one trigger at a time:
//!
//! - **Compilation**: parse and validate BPMN into a [`WorkflowDefinition`]
//! - **Execution**: dispatch nodes, evaluate gateway conditions, call
//!   business APIs for service tasks, and resolve out-of-order triggers with
//!   rollback and skipped-step checks
//! - **Interception**: replay, record or pass through external calls per
//!   instance session
//! - **Drivers**: a breakpoint debugger and a scenario simulator built on the
//!   same step primitives as the engine
//!
//! ## Modules
//!
//! - [`bpmn`]: Graph model and BPMN compiler
//! - [`engine`]: Step primitives, condition evaluator and the live engine
//! - [`intercept`]: Mock sessions, typed mock values and the intercept point
//! - [`store`]: Storage traits with in-memory implementations
//! - [`drivers`]: Debug stepper and mock simulator
//! - [`config`]: Configuration loading from environment variables
//! - [`error`]: Crate-wide error type
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use bpmn_orchestrator::{
//!     config::EngineConfig,
//!     engine::WorkflowEngine,
//!     store::{MemoryWorkflowStore, WorkflowStore},
//! };
//!
//! let store = Arc::new(MemoryWorkflowStore::new());
//! let workflow = store.save_workflow("order", &xml).await?;
//! let engine = WorkflowEngine::new(store, EngineConfig::from_env()?)?;
//! let started = engine.start_instance(&workflow.id, Default::default(), None).await?;
//! ```

pub mod bpmn;
pub mod config;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod intercept;
pub mod result_ext;
pub mod sanitize;
pub mod store;
pub mod telemetry;

pub use bpmn::{compile, Node, NodeType, SequenceFlow, WorkflowDefinition};
pub use engine::{ExecuteResult, WorkflowEngine};
pub use error::{OrchestratorError, OrchestratorResult};
pub use intercept::{InterceptMode, InterceptSession, SessionManager};
