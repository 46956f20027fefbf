//! Records owned by the persistence collaborator.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::state::{ExecutionStatus, InstanceStatus};

/// A registered BPMN workflow version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub version: i32,
    pub bpmn_xml: String,
    pub created_at: DateTime<Utc>,
}

/// A running (or finished) instance of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub workflow_id: String,
    pub status: InstanceStatus,
    /// More than one entry after a parallel fan-out.
    pub current_node_ids: Vec<String>,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
    /// Bumped by one on every committed update.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Proposed next state of an instance.
#[derive(Debug, Clone)]
pub struct InstanceUpdate {
    pub status: InstanceStatus,
    pub current_node_ids: Vec<String>,
    pub variables: HashMap<String, serde_json::Value>,
}

/// Record of one `execute_from_node` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub instance_id: String,
    pub node_id: String,
    pub status: ExecutionStatus,
    /// Business params with credentials redacted.
    pub input: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Outcome written back to an execution record.
#[derive(Debug, Clone, Default)]
pub struct ExecutionUpdate {
    pub status: ExecutionStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

impl ExecutionUpdate {
    pub fn completed(output: Option<serde_json::Value>) -> Self {
        Self {
            status: ExecutionStatus::Completed,
            output,
            ..Default::default()
        }
    }

    pub fn failed(error: &crate::error::OrchestratorError) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            output: None,
            error: Some(error.to_string()),
            error_code: Some(error.code().to_string()),
        }
    }
}
