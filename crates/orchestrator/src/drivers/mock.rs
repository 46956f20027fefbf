//! Scenario-driven simulation of a workflow without a business API.
//!
//! A [`MockScenario`] supplies canned service task responses, forced
//! failures and delays, and forced gateway paths. [`MockSimulator`] free-runs
//! the graph with those capabilities until it completes, waits for a signal
//! or fails.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::cursor::Cursor;
use crate::bpmn::{Node, NodeType, SequenceFlow, WorkflowDefinition};
use crate::config::EngineConfig;
use crate::engine::evaluator::ConditionEvaluator;
use crate::engine::step::{StepCapabilities, Transition};
use crate::error::{OrchestratorError, OrchestratorResult};

/// Canned behaviour of one service task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    /// Fail the call with this message instead of responding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_with: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

impl NodeMock {
    pub fn respond(response: serde_json::Value) -> Self {
        Self {
            response: Some(response),
            ..Default::default()
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }
}

/// Inputs of a simulation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockScenario {
    #[serde(default)]
    pub node_mocks: HashMap<String, NodeMock>,
    /// Gateway id to the target node it must take.
    #[serde(default)]
    pub gateway_paths: HashMap<String, String>,
    #[serde(default)]
    pub variables: HashMap<String, serde_json::Value>,
}

impl MockScenario {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node_id: impl Into<String>, mock: NodeMock) -> Self {
        self.node_mocks.insert(node_id.into(), mock);
        self
    }

    pub fn with_gateway_path(
        mut self,
        gateway_id: impl Into<String>,
        target_node_id: impl Into<String>,
    ) -> Self {
        self.gateway_paths
            .insert(gateway_id.into(), target_node_id.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }
}

/// [`StepCapabilities`] answering from a [`MockScenario`].
///
/// Service tasks without a node mock respond with
/// `{"mocked": true, "nodeId": ...}`. Gateways without a forced path
/// evaluate their conditions normally.
pub struct MockCapabilities {
    scenario: Arc<MockScenario>,
    evaluator: ConditionEvaluator,
}

impl MockCapabilities {
    pub fn new(scenario: Arc<MockScenario>) -> Self {
        Self {
            scenario,
            evaluator: ConditionEvaluator::new(),
        }
    }
}

#[async_trait]
impl StepCapabilities for MockCapabilities {
    async fn call_external(
        &self,
        node: &Node,
        _params: &serde_json::Value,
        _variables: &HashMap<String, serde_json::Value>,
    ) -> OrchestratorResult<serde_json::Value> {
        let Some(mock) = self.scenario.node_mocks.get(&node.id) else {
            return Ok(serde_json::json!({"mocked": true, "nodeId": node.id}));
        };

        if let Some(delay_ms) = mock.delay_ms {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if let Some(message) = &mock.fail_with {
            return Err(OrchestratorError::ExternalCall(message.clone()));
        }
        Ok(mock.response.clone().unwrap_or(serde_json::Value::Null))
    }

    async fn evaluate_condition(
        &self,
        flow: &SequenceFlow,
        variables: &HashMap<String, serde_json::Value>,
    ) -> OrchestratorResult<bool> {
        match self.scenario.gateway_paths.get(&flow.source_node_id) {
            Some(target) => Ok(&flow.target_node_id == target),
            None => self.evaluator.evaluate(&flow.condition_expression, variables),
        }
    }
}

/// How a simulation run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    Completed,
    /// Stopped at a node that needs a trigger.
    Waiting,
    Failed,
    /// The step limit was hit, usually a loop in the graph.
    StepLimit,
}

/// One executed node.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEntry {
    pub node_id: String,
    pub node_type: NodeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    pub next_node_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub trace: Vec<TraceEntry>,
    pub current_node_ids: Vec<String>,
    pub status: SimulationStatus,
    pub variables: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SimulationReport {
    /// Ids of the executed nodes, in order.
    pub fn visited(&self) -> Vec<&str> {
        self.trace.iter().map(|t| t.node_id.as_str()).collect()
    }
}

pub struct MockSimulator {
    cursor: Cursor,
    capabilities: MockCapabilities,
    trace: Vec<TraceEntry>,
    max_steps: usize,
    completed: bool,
}

impl MockSimulator {
    pub fn new(definition: Arc<WorkflowDefinition>, scenario: MockScenario) -> Self {
        let mut cursor = Cursor::new(definition);
        cursor.variables = scenario.variables.clone();
        Self {
            cursor,
            capabilities: MockCapabilities::new(Arc::new(scenario)),
            trace: Vec::new(),
            max_steps: EngineConfig::default().max_debug_steps,
            completed: false,
        }
    }

    pub fn with_config(mut self, config: &EngineConfig) -> Self {
        self.max_steps = config.max_debug_steps;
        self.cursor.response_variable = config.response_variable.clone();
        self
    }

    /// Free-run from the current position, or from the first start event.
    pub async fn run(&mut self) -> SimulationReport {
        let mut budget = self.max_steps;

        while !self.completed {
            if budget == 0 {
                warn!(max_steps = self.max_steps, "Simulation step limit reached");
                return self.report(SimulationStatus::StepLimit, None);
            }
            budget -= 1;

            let node_id = match self.cursor.next_node() {
                Ok(node_id) => node_id,
                Err(err) => return self.report(SimulationStatus::Failed, Some(err)),
            };
            let waits = self
                .cursor
                .definition
                .nodes
                .get(&node_id)
                .is_some_and(|n| n.node_type.waits_for_signal());
            if waits {
                debug!(node_id = %node_id, "Simulation waiting for a trigger");
                return self.report(SimulationStatus::Waiting, None);
            }

            if let Err(err) = self.execute(&node_id, &serde_json::Value::Null).await {
                return self.report(SimulationStatus::Failed, Some(err));
            }
        }

        info!(steps = self.trace.len(), "Simulation completed");
        self.report(SimulationStatus::Completed, None)
    }

    /// Fire `node_id` with the engine's trigger rules, then keep running.
    pub async fn trigger(
        &mut self,
        node_id: &str,
        params: serde_json::Value,
    ) -> OrchestratorResult<SimulationReport> {
        if self.cursor.reposition(node_id)? {
            info!(node_id, "Simulation rolled back");
        }
        self.completed = false;

        if let Err(err) = self.execute(node_id, &params).await {
            return Ok(self.report(SimulationStatus::Failed, Some(err)));
        }
        Ok(self.run().await)
    }

    async fn execute(&mut self, node_id: &str, params: &serde_json::Value) -> OrchestratorResult<()> {
        let node_type = self.cursor.definition.node(node_id)?.node_type;
        let outcome = self.cursor.execute(&self.capabilities, node_id, params).await?;

        self.completed = outcome.transition == Transition::Completed;
        self.trace.push(TraceEntry {
            node_id: outcome.node_id,
            node_type,
            response: outcome.response,
            next_node_ids: outcome.next_node_ids,
        });
        Ok(())
    }

    fn report(&self, status: SimulationStatus, error: Option<OrchestratorError>) -> SimulationReport {
        SimulationReport {
            trace: self.trace.clone(),
            current_node_ids: self.cursor.current_node_ids.clone(),
            status,
            variables: self.cursor.variables.clone(),
            error: error.map(|e| e.to_string()),
        }
    }
}
