//! Graph model of a compiled BPMN process.
//!
//! A `WorkflowDefinition` is built once per workflow version and is never
//! mutated after `build_adjacency_lists` has run. Engine state refers to
//! nodes by id only.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, OrchestratorResult};

/// Supported BPMN element kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    StartEvent,
    EndEvent,
    Task,
    UserTask,
    ServiceTask,
    ExclusiveGateway,
    ParallelGateway,
    EventBasedGateway,
    SubProcess,
    IntermediateCatchEvent,
    BoundaryEvent,
}

impl NodeType {
    /// Map a BPMN element local name to a node type.
    pub fn from_element(local_name: &str) -> Option<Self> {
        let node_type = match local_name {
            "startEvent" => Self::StartEvent,
            "endEvent" => Self::EndEvent,
            "task" => Self::Task,
            "userTask" => Self::UserTask,
            "serviceTask" => Self::ServiceTask,
            "exclusiveGateway" => Self::ExclusiveGateway,
            "parallelGateway" => Self::ParallelGateway,
            "eventBasedGateway" => Self::EventBasedGateway,
            "subProcess" => Self::SubProcess,
            "intermediateCatchEvent" => Self::IntermediateCatchEvent,
            "boundaryEvent" => Self::BoundaryEvent,
            _ => return None,
        };
        Some(node_type)
    }

    /// Node types that wait for an explicit external trigger instead of
    /// advancing on their own.
    pub fn waits_for_signal(&self) -> bool {
        matches!(
            self,
            Self::UserTask | Self::IntermediateCatchEvent | Self::EventBasedGateway
        )
    }

    pub fn is_gateway(&self) -> bool {
        matches!(
            self,
            Self::ExclusiveGateway | Self::ParallelGateway | Self::EventBasedGateway
        )
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::StartEvent => "startEvent",
            Self::EndEvent => "endEvent",
            Self::Task => "task",
            Self::UserTask => "userTask",
            Self::ServiceTask => "serviceTask",
            Self::ExclusiveGateway => "exclusiveGateway",
            Self::ParallelGateway => "parallelGateway",
            Self::EventBasedGateway => "eventBasedGateway",
            Self::SubProcess => "subProcess",
            Self::IntermediateCatchEvent => "intermediateCatchEvent",
            Self::BoundaryEvent => "boundaryEvent",
        };
        f.write_str(name)
    }
}

/// A node of the process graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub incoming_flow_ids: Vec<String>,
    #[serde(default)]
    pub outgoing_flow_ids: Vec<String>,
    /// Node a boundary event interrupts or observes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attached_node_id: Option<String>,
    /// Whether the boundary event cancels the activity it is attached to.
    #[serde(default = "default_true")]
    pub cancel_activity: bool,
    /// Endpoint called when a service task runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_api_url: Option<String>,
    /// Whether an out-of-order trigger may roll the instance back to this node.
    #[serde(default = "default_true")]
    pub can_fallback: bool,
    /// Position of the element in the document.
    #[serde(default)]
    pub declaration_index: usize,
}

fn default_true() -> bool {
    true
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_type,
            incoming_flow_ids: Vec::new(),
            outgoing_flow_ids: Vec::new(),
            attached_node_id: None,
            cancel_activity: true,
            business_api_url: None,
            can_fallback: true,
            declaration_index: 0,
        }
    }

    /// Display label: the name, or the id when the name is empty.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// A directed, optionally conditioned edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceFlow {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub source_node_id: String,
    pub target_node_id: String,
    /// Empty means unconditional (default) flow.
    #[serde(default)]
    pub condition_expression: String,
    /// Explicit `priority` attribute. Informational only; gateways always
    /// try flows in declaration order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// Position of the flow in the document.
    pub declaration_index: usize,
}

impl SequenceFlow {
    pub fn is_conditional(&self) -> bool {
        !self.condition_expression.trim().is_empty()
    }
}

/// A `message` definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub name: String,
}

/// Compiled process graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub process_id: String,
    pub process_name: String,
    pub nodes: HashMap<String, Node>,
    pub sequence_flows: HashMap<String, SequenceFlow>,
    pub messages: HashMap<String, Message>,
    pub start_events: Vec<String>,
    pub end_events: Vec<String>,
    pub adjacency: HashMap<String, Vec<String>>,
    pub reverse_adjacency: HashMap<String, Vec<String>>,
}

impl WorkflowDefinition {
    pub fn new(process_id: impl Into<String>, process_name: impl Into<String>) -> Self {
        Self {
            process_id: process_id.into(),
            process_name: process_name.into(),
            ..Default::default()
        }
    }

    /// Look up a node, failing with `InvalidNodeId` when it is unknown.
    pub fn node(&self, node_id: &str) -> OrchestratorResult<&Node> {
        self.nodes
            .get(node_id)
            .ok_or_else(|| OrchestratorError::InvalidNodeId(node_id.to_string()))
    }

    pub fn contains_node(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// First start event in document order.
    pub fn first_start_event(&self) -> Option<&str> {
        self.start_events.first().map(String::as_str)
    }

    /// Flows leaving `node_id`, in declaration order.
    ///
    /// Flows whose target is unknown are left out, matching the adjacency index.
    pub fn outgoing_flows(&self, node_id: &str) -> Vec<&SequenceFlow> {
        let mut flows: Vec<&SequenceFlow> = self
            .sequence_flows
            .values()
            .filter(|f| f.source_node_id == node_id && self.nodes.contains_key(&f.target_node_id))
            .collect();
        flows.sort_by_key(|f| f.declaration_index);
        flows
    }

    pub fn successors(&self, node_id: &str) -> &[String] {
        self.adjacency.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessors(&self, node_id: &str) -> &[String] {
        self.reverse_adjacency
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Boundary events attached to `node_id`.
    pub fn boundary_events_of(&self, node_id: &str) -> Vec<&Node> {
        let mut events: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| {
                n.node_type == NodeType::BoundaryEvent
                    && n.attached_node_id.as_deref() == Some(node_id)
            })
            .collect();
        events.sort_by(|a, b| a.id.cmp(&b.id));
        events
    }

    /// Rebuild the adjacency indexes and start/end sets from nodes and flows.
    ///
    /// Flows referencing unknown nodes stay in `sequence_flows` but are not
    /// indexed. Each (source, target) pair is indexed once.
    pub fn build_adjacency_lists(&mut self) {
        self.adjacency.clear();
        self.reverse_adjacency.clear();

        let mut flows: Vec<&SequenceFlow> = self.sequence_flows.values().collect();
        flows.sort_by_key(|f| f.declaration_index);

        for flow in flows {
            if !self.nodes.contains_key(&flow.source_node_id)
                || !self.nodes.contains_key(&flow.target_node_id)
            {
                continue;
            }

            let targets = self.adjacency.entry(flow.source_node_id.clone()).or_default();
            if !targets.contains(&flow.target_node_id) {
                targets.push(flow.target_node_id.clone());
            }

            let sources = self
                .reverse_adjacency
                .entry(flow.target_node_id.clone())
                .or_default();
            if !sources.contains(&flow.source_node_id) {
                sources.push(flow.source_node_id.clone());
            }
        }

        let mut ordered: Vec<&Node> = self.nodes.values().collect();
        ordered.sort_by(|a, b| (a.declaration_index, &a.id).cmp(&(b.declaration_index, &b.id)));
        self.start_events = ordered
            .iter()
            .filter(|n| n.node_type == NodeType::StartEvent)
            .map(|n| n.id.clone())
            .collect();
        self.end_events = ordered
            .iter()
            .filter(|n| n.node_type == NodeType::EndEvent)
            .map(|n| n.id.clone())
            .collect();
    }

    /// Whether `ancestor` can reach `node_id` by walking flows backwards.
    ///
    /// A boundary event counts as a successor of the node it is attached to.
    /// A node is not its own ancestor unless it sits on a cycle.
    pub fn is_ancestor(&self, ancestor: &str, node_id: &str) -> bool {
        self.search(node_id, ancestor, |n| self.upstream(n))
    }

    /// Whether `descendant` is reachable from `node_id` by walking flows forwards.
    pub fn is_descendant(&self, descendant: &str, node_id: &str) -> bool {
        self.search(node_id, descendant, |n| self.downstream(n))
    }

    fn upstream<'a>(&'a self, node_id: &str) -> Vec<&'a str> {
        let mut nodes: Vec<&str> = self.predecessors(node_id).iter().map(String::as_str).collect();
        if let Some(attached) = self
            .nodes
            .get(node_id)
            .and_then(|n| n.attached_node_id.as_deref())
        {
            nodes.push(attached);
        }
        nodes
    }

    fn downstream<'a>(&'a self, node_id: &str) -> Vec<&'a str> {
        let mut nodes: Vec<&str> = self.successors(node_id).iter().map(String::as_str).collect();
        nodes.extend(self.boundary_events_of(node_id).into_iter().map(|n| n.id.as_str()));
        nodes
    }

    fn search<'a, F>(&'a self, from: &'a str, wanted: &str, next: F) -> bool
    where
        F: Fn(&'a str) -> Vec<&'a str>,
    {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = next(from).into_iter().collect();

        while let Some(current) = queue.pop_front() {
            if current == wanted {
                return true;
            }
            if visited.insert(current) {
                queue.extend(next(current));
            }
        }
        false
    }
}
