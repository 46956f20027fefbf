//! Execution engine.
//!
//! [`step`] holds the dispatch and advance primitives every driver shares,
//! [`executor`] wires them to persistence, intercept sessions and the
//! business API client.

pub mod business;
pub mod evaluator;
pub mod executor;
pub mod state;
pub mod step;

pub use business::{BusinessCallParams, BusinessClient, BusinessResponse, CALL_BUSINESS_API};
pub use evaluator::ConditionEvaluator;
pub use executor::{EngineResponse, ExecuteResult, LiveCapabilities, WorkflowEngine};
pub use state::{ExecutionStatus, InstanceStatus};
pub use step::{
    advance, dispatch, reconcile_position, step_node, Reposition, StepCapabilities, StepContext,
    StepOutcome, Transition, DEFAULT_RESPONSE_VARIABLE,
};
