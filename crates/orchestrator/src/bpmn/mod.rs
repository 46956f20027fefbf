//! BPMN process graphs.
//!
//! - [`types`]: the immutable graph model (nodes, flows, adjacency indexes)
//! - [`parser`]: the XML compiler producing it

pub mod parser;
pub mod types;

pub use parser::compile;
pub use types::{Message, Node, NodeType, SequenceFlow, WorkflowDefinition};
