//! Single-step primitives shared by the engine and the step drivers.
//!
//! A step is: reconcile the caller's trigger against the current position,
//! dispatch the triggered node, then advance across one outgoing flow. The
//! only driver-specific part is [`StepCapabilities`], which decides how the
//! external call and condition checks are carried out.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::bpmn::{Node, NodeType, SequenceFlow, WorkflowDefinition};
use crate::error::{OrchestratorError, OrchestratorResult};

/// Default variable the service task response is stored under.
pub const DEFAULT_RESPONSE_VARIABLE: &str = "business_response";

/// How a step performs its externally observable work.
#[async_trait]
pub trait StepCapabilities: Send + Sync {
    /// Call the business API behind a service task.
    async fn call_external(
        &self,
        node: &Node,
        params: &serde_json::Value,
        variables: &HashMap<String, serde_json::Value>,
    ) -> OrchestratorResult<serde_json::Value>;

    /// Decide whether `flow` may be taken out of an exclusive gateway.
    async fn evaluate_condition(
        &self,
        flow: &SequenceFlow,
        variables: &HashMap<String, serde_json::Value>,
    ) -> OrchestratorResult<bool>;
}

/// Everything a step needs besides the instance state.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub definition: &'a WorkflowDefinition,
    pub capabilities: &'a dyn StepCapabilities,
    pub response_variable: &'a str,
}

impl<'a> StepContext<'a> {
    pub fn new(definition: &'a WorkflowDefinition, capabilities: &'a dyn StepCapabilities) -> Self {
        Self {
            definition,
            capabilities,
            response_variable: DEFAULT_RESPONSE_VARIABLE,
        }
    }

    pub fn with_response_variable(mut self, response_variable: &'a str) -> Self {
        self.response_variable = response_variable;
        self
    }
}

/// Result of reconciling a trigger with the current position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reposition {
    /// Keep the current position.
    Stay,
    /// Reset the position backwards, discarding forward progress.
    Rollback(Vec<String>),
}

impl Reposition {
    pub fn is_rollback(&self) -> bool {
        matches!(self, Self::Rollback(_))
    }

    /// Position to dispatch from.
    pub fn apply(self, current: &[String]) -> Vec<String> {
        match self {
            Self::Stay => current.to_vec(),
            Self::Rollback(target) => target,
        }
    }
}

/// Where the position goes after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The node holds the position until an explicit signal arrives.
    Waiting,
    /// The position moved to the next nodes.
    Advanced,
    /// An end event was selected or there is nowhere left to go.
    Completed,
}

/// Outcome of one dispatch and advance.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub node_id: String,
    pub response: Option<serde_json::Value>,
    pub next_node_ids: Vec<String>,
    pub transition: Transition,
}

impl StepOutcome {
    /// Position after the step.
    pub fn position(&self) -> Vec<String> {
        match self.transition {
            Transition::Waiting => vec![self.node_id.clone()],
            Transition::Advanced => self.next_node_ids.clone(),
            Transition::Completed => Vec::new(),
        }
    }
}

/// Compare a trigger against the current position.
///
/// Rules, first match wins:
/// 1. `from_node_id` is current: stay.
/// 2. Boundary event: stay if its attached node is current, else roll back
///    to the attached node.
/// 3. Intermediate catch event, or a node behind a current event-based
///    gateway: stay.
/// 4. Ancestor of a current node: roll back to `from_node_id`.
/// 5. Descendant of a current node: `SkippedStep`.
/// 6. No relation: stay.
///
/// A rollback to a node with `can_fallback == false` fails with
/// `FallbackNotAllowed`.
pub fn reconcile_position(
    definition: &WorkflowDefinition,
    current_node_ids: &[String],
    from_node_id: &str,
) -> OrchestratorResult<Reposition> {
    let node = definition.node(from_node_id)?;
    let is_current = |id: &str| current_node_ids.iter().any(|c| c == id);

    if is_current(from_node_id) {
        return Ok(Reposition::Stay);
    }

    let target = match node.node_type {
        NodeType::BoundaryEvent => {
            let attached = node.attached_node_id.as_deref().ok_or_else(|| {
                OrchestratorError::BoundaryEventMissingAttachment(node.id.clone())
            })?;
            if is_current(attached) {
                debug!(node_id = from_node_id, attached, "Boundary event fires in place");
                return Ok(Reposition::Stay);
            }
            attached
        }
        NodeType::IntermediateCatchEvent => return Ok(Reposition::Stay),
        _ if behind_current_event_gateway(definition, from_node_id, &is_current) => {
            return Ok(Reposition::Stay);
        }
        _ => {
            if current_node_ids
                .iter()
                .any(|c| definition.is_ancestor(from_node_id, c))
            {
                from_node_id
            } else if current_node_ids
                .iter()
                .any(|c| definition.is_descendant(from_node_id, c))
            {
                warn!(node_id = from_node_id, current = ?current_node_ids, "Rejected trigger ahead of current position");
                return Err(OrchestratorError::SkippedStep {
                    node: from_node_id.to_string(),
                    current: current_node_ids.to_vec(),
                });
            } else {
                return Ok(Reposition::Stay);
            }
        }
    };

    let target_node = definition.node(target)?;
    if !target_node.can_fallback {
        warn!(node_id = target, "Rollback target does not allow fallback");
        return Err(OrchestratorError::FallbackNotAllowed(target.to_string()));
    }

    info!(from = ?current_node_ids, to = target, "Rolling back position");
    Ok(Reposition::Rollback(vec![target.to_string()]))
}

fn behind_current_event_gateway(
    definition: &WorkflowDefinition,
    node_id: &str,
    is_current: &dyn Fn(&str) -> bool,
) -> bool {
    definition.predecessors(node_id).iter().any(|p| {
        is_current(p)
            && definition
                .nodes
                .get(p)
                .is_some_and(|n| n.node_type == NodeType::EventBasedGateway)
    })
}

/// Run the node's own work. Only service tasks do anything here: the
/// business call runs through the capabilities and its response is stored
/// under the response variable.
pub async fn dispatch(
    ctx: StepContext<'_>,
    node: &Node,
    params: &serde_json::Value,
    variables: &mut HashMap<String, serde_json::Value>,
) -> OrchestratorResult<Option<serde_json::Value>> {
    debug!(node_id = %node.id, node_type = %node.node_type, "Dispatching node");

    match node.node_type {
        NodeType::ServiceTask => {
            let response = ctx
                .capabilities
                .call_external(node, params, variables)
                .await?;
            variables.insert(ctx.response_variable.to_string(), response.clone());
            Ok(Some(response))
        }
        _ => Ok(None),
    }
}

/// Pick the next node(s) out of `node`.
///
/// No outgoing flows yields an empty set. An exclusive gateway takes the
/// first flow, in declared order, that the capabilities accept, and fails
/// with `NoMatchingFlow` when none does. Every other node takes its first
/// outgoing flow without looking at conditions.
pub async fn advance(
    ctx: StepContext<'_>,
    node: &Node,
    variables: &HashMap<String, serde_json::Value>,
) -> OrchestratorResult<Vec<String>> {
    let flows = ctx.definition.outgoing_flows(&node.id);
    let Some(first) = flows.first() else {
        return Ok(Vec::new());
    };

    if node.node_type != NodeType::ExclusiveGateway {
        return Ok(vec![first.target_node_id.clone()]);
    }

    for flow in &flows {
        if ctx.capabilities.evaluate_condition(flow, variables).await? {
            debug!(gateway = %node.id, flow = %flow.id, target = %flow.target_node_id, "Gateway flow selected");
            return Ok(vec![flow.target_node_id.clone()]);
        }
    }

    Err(OrchestratorError::NoMatchingFlow(node.id.clone()))
}

/// Dispatch `node_id` and advance out of it.
///
/// Object-valued `params` are merged into `variables` first. User tasks and
/// event-based gateways hold the position; they only move on through their
/// boundary events or the events behind them.
pub async fn step_node(
    ctx: StepContext<'_>,
    node_id: &str,
    params: &serde_json::Value,
    variables: &mut HashMap<String, serde_json::Value>,
) -> OrchestratorResult<StepOutcome> {
    let node = ctx.definition.node(node_id)?;

    if let serde_json::Value::Object(map) = params {
        variables.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    let response = dispatch(ctx, node, params, variables).await?;

    if holds_position(node.node_type) {
        return Ok(StepOutcome {
            node_id: node.id.clone(),
            response,
            next_node_ids: Vec::new(),
            transition: Transition::Waiting,
        });
    }

    let next_node_ids = advance(ctx, node, variables).await?;
    let reaches_end = next_node_ids.iter().any(|id| {
        ctx.definition
            .nodes
            .get(id)
            .is_some_and(|n| n.node_type == NodeType::EndEvent)
    });

    let transition = if next_node_ids.is_empty() || reaches_end {
        Transition::Completed
    } else {
        Transition::Advanced
    };

    Ok(StepOutcome {
        node_id: node.id.clone(),
        response,
        next_node_ids,
        transition,
    })
}

fn holds_position(node_type: NodeType) -> bool {
    matches!(node_type, NodeType::UserTask | NodeType::EventBasedGateway)
}
