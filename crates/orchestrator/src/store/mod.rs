//! Persistence collaborator.
//!
//! The engine reads definitions and instance state through [`WorkflowStore`]
//! and writes instance positions and execution records back through it.

pub mod kv;
pub mod memory;
pub mod models;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bpmn::WorkflowDefinition;
use crate::error::OrchestratorResult;

pub use kv::{KeyValueStore, MemoryKeyValueStore};
pub use memory::MemoryWorkflowStore;
pub use models::{Execution, ExecutionUpdate, Instance, InstanceUpdate, Workflow};

/// Storage for workflows, instances and execution records.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Compile and register a BPMN document. Compile errors are returned
    /// unchanged and nothing is stored.
    async fn save_workflow(&self, name: &str, bpmn_xml: &str) -> OrchestratorResult<Workflow>;

    async fn get_workflow(&self, workflow_id: &str) -> OrchestratorResult<Workflow>;

    async fn get_workflow_definition(
        &self,
        workflow_id: &str,
    ) -> OrchestratorResult<Arc<WorkflowDefinition>>;

    async fn create_instance(
        &self,
        workflow_id: &str,
        variables: HashMap<String, serde_json::Value>,
    ) -> OrchestratorResult<Instance>;

    async fn get_instance(&self, instance_id: &str) -> OrchestratorResult<Instance>;

    /// Commit `update` if the stored version still equals `expected_version`,
    /// otherwise fail with `Conflict`.
    async fn update_instance(
        &self,
        instance_id: &str,
        expected_version: i64,
        update: InstanceUpdate,
    ) -> OrchestratorResult<Instance>;

    async fn create_execution(
        &self,
        instance_id: &str,
        node_id: &str,
        input: serde_json::Value,
    ) -> OrchestratorResult<Execution>;

    async fn update_execution(
        &self,
        execution_id: &str,
        update: ExecutionUpdate,
    ) -> OrchestratorResult<Execution>;

    async fn get_execution(&self, execution_id: &str) -> OrchestratorResult<Execution>;

    /// Executions of an instance, oldest first.
    async fn list_executions(&self, instance_id: &str) -> OrchestratorResult<Vec<Execution>>;
}
