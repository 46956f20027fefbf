//! Interactive stepping over a workflow graph.
//!
//! A [`DebugSession`] runs nodes one at a time and pauses at breakpoints and
//! at nodes waiting for an external signal (user tasks, intermediate catch
//! events, event-based gateways). Waiting nodes are released with
//! [`DebugSession::trigger`], which follows the same rollback and skip rules
//! as the engine.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::cursor::Cursor;
use crate::bpmn::{NodeType, WorkflowDefinition};
use crate::config::EngineConfig;
use crate::engine::step::{StepCapabilities, StepOutcome, Transition};
use crate::error::{OrchestratorError, OrchestratorResult};

/// State of a debug session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugStatus {
    /// Nothing executed yet.
    Idle,
    /// Ready for the next step.
    Running,
    /// Stopped at a breakpoint or a waiting node.
    Paused,
    Completed,
    Stopped,
    Failed,
}

impl DebugStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Failed)
    }
}

/// A node entry recorded by the debugger. Frames are only appended, so the
/// call stack is the full trace of the session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStackFrame {
    pub node_id: String,
    pub node_name: String,
    pub node_type: NodeType,
    pub variables: HashMap<String, serde_json::Value>,
    pub entered_at: DateTime<Utc>,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSnapshot {
    pub status: DebugStatus,
    pub current_node_ids: Vec<String>,
    pub variables: HashMap<String, serde_json::Value>,
    pub breakpoints: Vec<String>,
    pub steps: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

pub struct DebugSession<C> {
    cursor: Cursor,
    capabilities: C,
    breakpoints: HashSet<String>,
    call_stack: Vec<CallStackFrame>,
    status: DebugStatus,
    steps: usize,
    max_steps: usize,
    last_error: Option<String>,
}

impl<C: StepCapabilities> DebugSession<C> {
    pub fn new(definition: Arc<WorkflowDefinition>, capabilities: C) -> Self {
        Self {
            cursor: Cursor::new(definition),
            capabilities,
            breakpoints: HashSet::new(),
            call_stack: Vec::new(),
            status: DebugStatus::Idle,
            steps: 0,
            max_steps: EngineConfig::default().max_debug_steps,
            last_error: None,
        }
    }

    /// Take the step limit and response variable from `config`.
    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.max_steps = config.max_debug_steps;
        self.cursor.response_variable = config.response_variable.clone();
        self
    }

    pub fn with_variables(mut self, variables: HashMap<String, serde_json::Value>) -> Self {
        self.cursor.variables = variables;
        self
    }

    pub fn add_breakpoint(&mut self, node_id: impl Into<String>) -> OrchestratorResult<()> {
        let node_id = node_id.into();
        self.cursor.definition.node(&node_id)?;
        self.breakpoints.insert(node_id);
        Ok(())
    }

    pub fn remove_breakpoint(&mut self, node_id: &str) -> bool {
        self.breakpoints.remove(node_id)
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    /// Run the node at the current position, starting at the first start
    /// event when there is none. A waiting node is not run; the session stays
    /// paused on it until it is triggered.
    pub async fn step(&mut self) -> OrchestratorResult<DebugStatus> {
        if self.status.is_finished() {
            return Ok(self.status);
        }

        let node_id = self.cursor.next_node()?;
        let node_type = self.cursor.definition.node(&node_id)?.node_type;
        if node_type.waits_for_signal() {
            debug!(node_id = %node_id, "Waiting for a trigger");
            self.status = DebugStatus::Paused;
            return Ok(self.status);
        }

        self.run_node(&node_id, &serde_json::Value::Null).await
    }

    /// Step until the session pauses, completes, stops or fails.
    pub async fn continue_run(&mut self) -> OrchestratorResult<DebugStatus> {
        let mut budget = self.max_steps;
        loop {
            if budget == 0 {
                warn!(max_steps = self.max_steps, "Step limit reached, pausing");
                self.status = DebugStatus::Paused;
                return Ok(self.status);
            }
            budget -= 1;

            let before = self.steps;
            let status = self.step().await?;
            if status != DebugStatus::Running || self.steps == before {
                return Ok(status);
            }
        }
    }

    /// Fire `node_id` from outside, as the engine's `execute_from_node`
    /// would. Rejected triggers leave the session untouched.
    pub async fn trigger(
        &mut self,
        node_id: &str,
        params: serde_json::Value,
    ) -> OrchestratorResult<DebugStatus> {
        if self.status == DebugStatus::Stopped {
            return Err(OrchestratorError::Conflict("debug session is stopped".to_string()));
        }

        if self.cursor.reposition(node_id)? {
            info!(node_id, "Debugger rolled back");
        }
        self.run_node(node_id, &params).await
    }

    pub fn stop(&mut self) {
        self.status = DebugStatus::Stopped;
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.cursor.variables.insert(name.into(), value);
    }

    pub fn variables(&self) -> &HashMap<String, serde_json::Value> {
        &self.cursor.variables
    }

    pub fn current_node_ids(&self) -> &[String] {
        &self.cursor.current_node_ids
    }

    pub fn call_stack(&self) -> &[CallStackFrame] {
        &self.call_stack
    }

    pub fn status(&self) -> DebugStatus {
        self.status
    }

    pub fn snapshot(&self) -> DebugSnapshot {
        let mut breakpoints: Vec<String> = self.breakpoints.iter().cloned().collect();
        breakpoints.sort();
        DebugSnapshot {
            status: self.status,
            current_node_ids: self.cursor.current_node_ids.clone(),
            variables: self.cursor.variables.clone(),
            breakpoints,
            steps: self.steps,
            last_error: self.last_error.clone(),
        }
    }

    async fn run_node(
        &mut self,
        node_id: &str,
        params: &serde_json::Value,
    ) -> OrchestratorResult<DebugStatus> {
        let node = self.cursor.definition.node(node_id)?;
        self.call_stack.push(CallStackFrame {
            node_id: node.id.clone(),
            node_name: node.label().to_string(),
            node_type: node.node_type,
            variables: self.cursor.variables.clone(),
            entered_at: Utc::now(),
        });
        self.steps += 1;

        match self.cursor.execute(&self.capabilities, node_id, params).await {
            Ok(outcome) => {
                self.last_error = None;
                self.status = self.classify(&outcome);
                Ok(self.status)
            }
            Err(err) => {
                warn!(node_id, error = %err, "Debug step failed");
                self.status = DebugStatus::Failed;
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn classify(&self, outcome: &StepOutcome) -> DebugStatus {
        match outcome.transition {
            Transition::Completed => DebugStatus::Completed,
            Transition::Waiting => DebugStatus::Paused,
            Transition::Advanced => {
                let halts = outcome.next_node_ids.iter().any(|id| {
                    self.breakpoints.contains(id)
                        || self
                            .cursor
                            .definition
                            .nodes
                            .get(id)
                            .is_some_and(|n| n.node_type.waits_for_signal())
                });
                if halts {
                    DebugStatus::Paused
                } else {
                    DebugStatus::Running
                }
            }
        }
    }
}
