//! BPMN XML compiler.
//!
//! Streams the document with `quick-xml` and builds a [`WorkflowDefinition`]:
//! - only the first `process` element is compiled
//! - only direct children of the process become nodes and flows; the
//!   inside of a `subProcess` is opaque
//! - element and attribute prefixes are ignored (`bpmn:`, `bpmn2:`, none)
//! - service task URLs come from `extensionElements`, matched by element
//!   name or by an extension namespace ending in a business suffix
//!
//! Structural rules enforced after parsing:
//! - every boundary event names the node it is attached to
//! - user tasks never own an outgoing flow; they progress only through
//!   boundary events attached to them

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use tracing::debug;

use crate::error::{OrchestratorError, OrchestratorResult};

use super::types::{Message, Node, NodeType, SequenceFlow, WorkflowDefinition};

/// Extension element names that carry a service task endpoint.
const URL_ELEMENTS: &[&str] = &["url", "businessapiurl", "businessurl", "apiurl"];

/// Namespace suffixes whose text-valued extension elements carry a service
/// task endpoint, e.g. `xmlns:biz="http://example.com/schema/bpmn/business"`.
const URL_NAMESPACE_SUFFIXES: &[&str] = &["/business", "/businessapi", "/business-api"];

/// Compile BPMN XML into a validated workflow definition.
pub fn compile(xml: &str) -> OrchestratorResult<WorkflowDefinition> {
    if xml.trim().is_empty() {
        return Err(OrchestratorError::EmptyInput);
    }

    let document = parse_document(xml)?;
    let process_id = document
        .process_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .ok_or(OrchestratorError::MissingProcess)?;

    let mut definition = WorkflowDefinition::new(process_id, document.process_name.clone());
    for node in document.nodes {
        definition.nodes.insert(node.id.clone(), node);
    }
    for message in document.messages {
        definition.messages.insert(message.id.clone(), message);
    }

    link_flows(&mut definition, document.flows);
    validate_boundary_events(&definition)?;
    validate_user_tasks(&definition)?;
    definition.build_adjacency_lists();

    debug!(
        process_id = %definition.process_id,
        nodes = definition.nodes.len(),
        flows = definition.sequence_flows.len(),
        "Compiled BPMN process"
    );

    Ok(definition)
}

/// Raw result of the streaming pass.
#[derive(Default)]
struct ParsedDocument {
    process_id: Option<String>,
    process_name: String,
    nodes: Vec<Node>,
    flows: Vec<SequenceFlow>,
    messages: Vec<Message>,
}

/// Element whose text content is being collected.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Capture {
    Incoming,
    Outgoing,
    Condition,
    ExtensionUrl,
    NamespacedUrl,
    ExtensionFallback,
}

#[derive(Default)]
struct DocumentBuilder {
    doc: ParsedDocument,
    process_seen: bool,
    process_depth: Option<usize>,
    current_node: Option<Node>,
    current_flow: Option<SequenceFlow>,
    in_extension: bool,
    capture: Option<(Capture, usize)>,
    text: String,
}

impl DocumentBuilder {
    fn open(
        &mut self,
        e: &BytesStart<'_>,
        namespace: Option<&str>,
        depth: usize,
    ) -> OrchestratorResult<()> {
        let name = local_name(e)?;
        let attrs = attributes(e)?;

        if name == "process" && !self.process_seen {
            self.process_seen = true;
            self.doc.process_id = attrs.get("id").cloned();
            self.doc.process_name = attrs.get("name").cloned().unwrap_or_default();
            self.process_depth = Some(depth);
            return Ok(());
        }

        if name == "message" && self.current_node.is_none() {
            if let Some(id) = attrs.get("id") {
                self.doc.messages.push(Message {
                    id: id.clone(),
                    name: attrs.get("name").cloned().unwrap_or_default(),
                });
            }
            return Ok(());
        }

        let Some(process_depth) = self.process_depth else {
            return Ok(());
        };

        if depth == process_depth + 1 {
            if let Some(node_type) = NodeType::from_element(&name) {
                self.current_node = Some(new_node(node_type, &attrs, self.doc.nodes.len())?);
            } else if name == "sequenceFlow" {
                self.current_flow = Some(new_flow(&attrs, self.doc.flows.len())?);
            }
        } else if depth == process_depth + 2 {
            if self.current_node.is_some() {
                match name.as_str() {
                    "incoming" => self.start_capture(Capture::Incoming, depth),
                    "outgoing" => self.start_capture(Capture::Outgoing, depth),
                    "extensionElements" => self.in_extension = true,
                    _ => {}
                }
            } else if self.current_flow.is_some() && name == "conditionExpression" {
                self.start_capture(Capture::Condition, depth);
            }
        } else if self.in_extension && depth > process_depth + 2 {
            self.open_extension(&name, namespace, &attrs, depth);
        }

        Ok(())
    }

    fn open_extension(
        &mut self,
        name: &str,
        namespace: Option<&str>,
        attrs: &HashMap<String, String>,
        depth: usize,
    ) {
        let Some(node) = self.current_node.as_mut() else {
            return;
        };
        let lower = name.to_ascii_lowercase();

        if lower == "canfallback" {
            match attrs.get("value") {
                Some(value) => node.can_fallback = parse_bool(value, true),
                None => self.start_capture(Capture::ExtensionFallback, depth),
            }
            return;
        }

        if node.node_type != NodeType::ServiceTask || node.business_api_url.is_some() {
            return;
        }

        // <x:url>...</x:url>, <x:url value="..."/>
        if URL_ELEMENTS.contains(&lower.as_str()) {
            match attrs.get("value").or_else(|| attrs.get("url")) {
                Some(value) => node.business_api_url = Some(value.trim().to_string()),
                None => self.start_capture(Capture::ExtensionUrl, depth),
            }
            return;
        }

        // <camunda:property name="url" value="..."/>
        if let (Some(prop), Some(value)) = (attrs.get("name"), attrs.get("value")) {
            if URL_ELEMENTS.contains(&prop.to_ascii_lowercase().as_str()) {
                node.business_api_url = Some(value.trim().to_string());
                return;
            }
        }

        // <x:endpoint url="..."/>
        if let Some(value) = attrs
            .iter()
            .find(|(k, _)| URL_ELEMENTS.contains(&k.to_ascii_lowercase().as_str()))
            .map(|(_, v)| v)
        {
            node.business_api_url = Some(value.trim().to_string());
            return;
        }

        // <biz:endpoint>http://...</biz:endpoint> under a business namespace
        if namespace.is_some_and(is_business_namespace) {
            self.start_capture(Capture::NamespacedUrl, depth);
        }
    }

    fn close(&mut self, name: &str, depth: usize) {
        if let Some((capture, capture_depth)) = self.capture {
            if capture_depth == depth {
                self.finish_capture(capture);
            }
        }

        let Some(process_depth) = self.process_depth else {
            return;
        };

        if depth == process_depth {
            if name == "process" {
                self.process_depth = None;
            }
        } else if depth == process_depth + 1 {
            if let Some(node) = self.current_node.take() {
                self.doc.nodes.push(node);
            }
            if let Some(flow) = self.current_flow.take() {
                self.doc.flows.push(flow);
            }
            self.in_extension = false;
        } else if depth == process_depth + 2 && name == "extensionElements" {
            self.in_extension = false;
        }
    }

    fn start_capture(&mut self, capture: Capture, depth: usize) {
        self.capture = Some((capture, depth));
        self.text.clear();
    }

    fn finish_capture(&mut self, capture: Capture) {
        self.capture = None;
        let text = std::mem::take(&mut self.text);
        let value = text.trim();

        match capture {
            Capture::Incoming | Capture::Outgoing => {
                if let (Some(node), false) = (self.current_node.as_mut(), value.is_empty()) {
                    let list = if capture == Capture::Incoming {
                        &mut node.incoming_flow_ids
                    } else {
                        &mut node.outgoing_flow_ids
                    };
                    if !list.iter().any(|id| id == value) {
                        list.push(value.to_string());
                    }
                }
            }
            Capture::Condition => {
                if let Some(flow) = self.current_flow.as_mut() {
                    flow.condition_expression = value.to_string();
                }
            }
            Capture::ExtensionUrl => {
                if let (Some(node), false) = (self.current_node.as_mut(), value.is_empty()) {
                    node.business_api_url = Some(value.to_string());
                }
            }
            Capture::NamespacedUrl => {
                if let (Some(node), true) = (self.current_node.as_mut(), looks_like_url(value)) {
                    if node.business_api_url.is_none() {
                        node.business_api_url = Some(value.to_string());
                    }
                }
            }
            Capture::ExtensionFallback => {
                if let Some(node) = self.current_node.as_mut() {
                    node.can_fallback = parse_bool(value, true);
                }
            }
        }
    }

    fn text(&mut self, content: &str) {
        if self.capture.is_some() {
            self.text.push_str(content);
        }
    }
}

fn parse_document(xml: &str) -> OrchestratorResult<ParsedDocument> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut builder = DocumentBuilder::default();
    let mut depth = 0usize;
    let mut saw_element = false;

    loop {
        let (resolved, event) = reader.read_resolved_event()?;
        match event {
            Event::Start(e) => {
                saw_element = true;
                builder.open(&e, namespace_uri(&resolved)?, depth)?;
                depth += 1;
            }
            Event::Empty(e) => {
                saw_element = true;
                builder.open(&e, namespace_uri(&resolved)?, depth)?;
                builder.close(&local_name(&e)?, depth);
            }
            Event::End(e) => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    OrchestratorError::MalformedXml("unexpected closing tag".to_string())
                })?;
                let name = std::str::from_utf8(e.local_name().as_ref())
                    .map_err(|err| OrchestratorError::MalformedXml(err.to_string()))?
                    .to_string();
                builder.close(&name, depth);
            }
            Event::Text(t) => {
                let content = t.unescape()?;
                builder.text(&content);
            }
            Event::CData(c) => {
                let content = String::from_utf8_lossy(&c).into_owned();
                builder.text(&content);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(OrchestratorError::MalformedXml(
            "document ended before all elements were closed".to_string(),
        ));
    }
    if !saw_element {
        return Err(OrchestratorError::MalformedXml(
            "document contains no elements".to_string(),
        ));
    }

    Ok(builder.doc)
}

fn namespace_uri<'a>(resolved: &'a ResolveResult<'_>) -> OrchestratorResult<Option<&'a str>> {
    match resolved {
        ResolveResult::Bound(ns) => std::str::from_utf8(ns.as_ref())
            .map(Some)
            .map_err(|err| OrchestratorError::MalformedXml(err.to_string())),
        // Undeclared vendor prefixes are tolerated and matched by local name.
        ResolveResult::Unbound | ResolveResult::Unknown(_) => Ok(None),
    }
}

fn is_business_namespace(uri: &str) -> bool {
    let uri = uri.trim_end_matches('/').to_ascii_lowercase();
    URL_NAMESPACE_SUFFIXES.iter().any(|suffix| uri.ends_with(suffix))
}

fn looks_like_url(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn local_name(e: &BytesStart<'_>) -> OrchestratorResult<String> {
    std::str::from_utf8(e.local_name().as_ref())
        .map(str::to_string)
        .map_err(|err| OrchestratorError::MalformedXml(err.to_string()))
}

/// Attributes keyed by local name.
fn attributes(e: &BytesStart<'_>) -> OrchestratorResult<HashMap<String, String>> {
    let mut attrs = HashMap::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.local_name().as_ref())
            .map_err(|err| OrchestratorError::MalformedXml(err.to_string()))?
            .to_string();
        let value = attr.unescape_value()?.into_owned();
        attrs.insert(key, value);
    }
    Ok(attrs)
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => true,
        "false" | "0" | "no" => false,
        _ => default,
    }
}

fn required_id(attrs: &HashMap<String, String>, element: &str) -> OrchestratorResult<String> {
    attrs
        .get("id")
        .filter(|id| !id.trim().is_empty())
        .cloned()
        .ok_or_else(|| OrchestratorError::MalformedXml(format!("{} element without id", element)))
}

fn new_node(
    node_type: NodeType,
    attrs: &HashMap<String, String>,
    index: usize,
) -> OrchestratorResult<Node> {
    let id = required_id(attrs, &node_type.to_string())?;
    let mut node = Node::new(id, attrs.get("name").cloned().unwrap_or_default(), node_type);
    node.declaration_index = index;

    if let Some(value) = attrs.get("canFallback") {
        node.can_fallback = parse_bool(value, true);
    }
    if node_type == NodeType::ServiceTask {
        node.business_api_url = attrs
            .iter()
            .find(|(k, _)| URL_ELEMENTS.contains(&k.to_ascii_lowercase().as_str()))
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty());
    }
    if node_type == NodeType::BoundaryEvent {
        node.attached_node_id = attrs
            .get("attachedToRef")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        node.cancel_activity = attrs
            .get("cancelActivity")
            .map(|v| parse_bool(v, true))
            .unwrap_or(true);
    }
    Ok(node)
}

fn new_flow(attrs: &HashMap<String, String>, index: usize) -> OrchestratorResult<SequenceFlow> {
    Ok(SequenceFlow {
        id: required_id(attrs, "sequenceFlow")?,
        name: attrs.get("name").cloned().unwrap_or_default(),
        source_node_id: attrs.get("sourceRef").cloned().unwrap_or_default(),
        target_node_id: attrs.get("targetRef").cloned().unwrap_or_default(),
        condition_expression: String::new(),
        priority: attrs
            .get("priority")
            .and_then(|p| p.trim().parse::<i32>().ok()),
        declaration_index: index,
    })
}

/// Register every flow and make sure its endpoints list it, even when the
/// document omitted the `incoming`/`outgoing` children.
fn link_flows(definition: &mut WorkflowDefinition, flows: Vec<SequenceFlow>) {
    for flow in flows {
        if let Some(source) = definition.nodes.get_mut(&flow.source_node_id) {
            if !source.outgoing_flow_ids.contains(&flow.id) {
                source.outgoing_flow_ids.push(flow.id.clone());
            }
        }
        if let Some(target) = definition.nodes.get_mut(&flow.target_node_id) {
            if !target.incoming_flow_ids.contains(&flow.id) {
                target.incoming_flow_ids.push(flow.id.clone());
            }
        }
        definition.sequence_flows.insert(flow.id.clone(), flow);
    }
}

fn nodes_in_order(definition: &WorkflowDefinition, node_type: NodeType) -> Vec<&Node> {
    let mut nodes: Vec<&Node> = definition
        .nodes
        .values()
        .filter(|n| n.node_type == node_type)
        .collect();
    nodes.sort_by_key(|n| n.declaration_index);
    nodes
}

fn validate_boundary_events(definition: &WorkflowDefinition) -> OrchestratorResult<()> {
    for event in nodes_in_order(definition, NodeType::BoundaryEvent) {
        if event.attached_node_id.is_none() {
            return Err(OrchestratorError::BoundaryEventMissingAttachment(
                event.id.clone(),
            ));
        }
    }
    Ok(())
}

fn validate_user_tasks(definition: &WorkflowDefinition) -> OrchestratorResult<()> {
    for task in nodes_in_order(definition, NodeType::UserTask) {
        for flow_id in &task.outgoing_flow_ids {
            let Some(flow) = definition.sequence_flows.get(flow_id) else {
                continue;
            };
            let via_boundary = definition
                .nodes
                .get(&flow.source_node_id)
                .map(|source| {
                    source.node_type == NodeType::BoundaryEvent
                        && source.attached_node_id.as_deref() == Some(task.id.as_str())
                })
                .unwrap_or(false);

            if !via_boundary {
                return Err(OrchestratorError::DirectUserTaskOutgoing {
                    user_task: task.id.clone(),
                    flow: flow.id.clone(),
                });
            }
        }
    }
    Ok(())
}
