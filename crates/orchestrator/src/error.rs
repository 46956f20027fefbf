//! Error types for the BPMN orchestrator.
//!
//! Compiler, engine and intercept failures share one enum so callers can
//! match on a single taxonomy no matter which layer rejected the request.

use thiserror::Error;

/// Errors raised by the compiler, the execution engine and the intercept layer.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// BPMN input was empty after trimming.
    #[error("BPMN input is empty")]
    EmptyInput,

    /// BPMN input is not well-formed XML.
    #[error("Malformed BPMN XML: {0}")]
    MalformedXml(String),

    /// No `process` element with an `id` was found.
    #[error("BPMN document has no process element with an id")]
    MissingProcess,

    /// A sequence flow leaves a user task directly instead of via a boundary event.
    #[error("User task '{user_task}' has direct outgoing flow '{flow}'; user tasks only progress through attached boundary events")]
    DirectUserTaskOutgoing { user_task: String, flow: String },

    /// A boundary event has no `attachedToRef`.
    #[error("Boundary event '{0}' is missing attachedToRef")]
    BoundaryEventMissingAttachment(String),

    /// Trigger node is not part of the workflow definition.
    #[error("Node '{0}' does not exist in the workflow definition")]
    InvalidNodeId(String),

    /// Trigger would jump ahead of unexecuted nodes.
    #[error("Node '{node}' has not been reached yet from current position {current:?}")]
    SkippedStep { node: String, current: Vec<String> },

    /// Rollback target forbids falling back to it.
    #[error("Rollback to node '{0}' is not allowed")]
    FallbackNotAllowed(String),

    /// No outgoing flow of an exclusive gateway matched.
    #[error("No outgoing flow of gateway '{0}' matched")]
    NoMatchingFlow(String),

    /// Condition failed to compile, failed at runtime or was not boolean.
    #[error("Condition '{expression}' could not be evaluated: {reason}")]
    ConditionEvaluation { expression: String, reason: String },

    /// The business API call failed.
    #[error("External call failed: {0}")]
    ExternalCall(String),

    /// The business API call exceeded its hard cutoff.
    #[error("External call timed out after {0} seconds")]
    Timeout(u64),

    /// Service task reached execution without a business API URL.
    #[error("Service task '{0}' has no business API URL")]
    MissingBusinessApiUrl(String),

    /// Stored mock value does not have the shape the caller expects.
    #[error("Mock for '{key}' holds {found} but {expected} was expected")]
    MockTypeMismatch {
        key: String,
        expected: String,
        found: String,
    },

    /// Workflow, instance, execution or session not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Optimistic version check failed.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrchestratorError {
    /// Stable machine-readable code, stored on execution records and log entries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyInput => "EMPTY_INPUT",
            Self::MalformedXml(_) => "MALFORMED_XML",
            Self::MissingProcess => "MISSING_PROCESS",
            Self::DirectUserTaskOutgoing { .. } => "DIRECT_USER_TASK_OUTGOING",
            Self::BoundaryEventMissingAttachment(_) => "BOUNDARY_EVENT_MISSING_ATTACHMENT",
            Self::InvalidNodeId(_) => "INVALID_NODE_ID",
            Self::SkippedStep { .. } => "SKIPPED_STEP",
            Self::FallbackNotAllowed(_) => "FALLBACK_NOT_ALLOWED",
            Self::NoMatchingFlow(_) => "NO_MATCHING_FLOW",
            Self::ConditionEvaluation { .. } => "CONDITION_EVALUATION_ERROR",
            Self::ExternalCall(_) => "EXTERNAL_CALL_ERROR",
            Self::Timeout(_) => "EXTERNAL_CALL_TIMEOUT",
            Self::MissingBusinessApiUrl(_) => "MISSING_BUSINESS_API_URL",
            Self::MockTypeMismatch { .. } => "MOCK_TYPE_MISMATCH",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether the error came from the BPMN compiler.
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyInput
                | Self::MalformedXml(_)
                | Self::MissingProcess
                | Self::DirectUserTaskOutgoing { .. }
                | Self::BoundaryEventMissingAttachment(_)
        )
    }
}

/// Result type alias using OrchestratorError.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl From<envy::Error> for OrchestratorError {
    fn from(err: envy::Error) -> Self {
        OrchestratorError::Config(err.to_string())
    }
}

impl From<quick_xml::Error> for OrchestratorError {
    fn from(err: quick_xml::Error) -> Self {
        OrchestratorError::MalformedXml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for OrchestratorError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        OrchestratorError::MalformedXml(err.to_string())
    }
}
