//! In-memory [`WorkflowStore`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::kv::{KeyValueStore, MemoryKeyValueStore};
use super::models::{Execution, ExecutionUpdate, Instance, InstanceUpdate, Workflow};
use super::WorkflowStore;
use crate::bpmn::{compile, WorkflowDefinition};
use crate::engine::state::{ExecutionStatus, InstanceStatus};
use crate::error::{OrchestratorError, OrchestratorResult};

/// Workflow store backed by [`MemoryKeyValueStore`] maps.
#[derive(Default)]
pub struct MemoryWorkflowStore {
    workflows: MemoryKeyValueStore<Workflow>,
    definitions: MemoryKeyValueStore<Arc<WorkflowDefinition>>,
    instances: MemoryKeyValueStore<Instance>,
    executions: MemoryKeyValueStore<Execution>,
    // Execution ids in creation order.
    execution_order: RwLock<Vec<String>>,
    // Serializes read-check-write on instances.
    instance_writes: Mutex<()>,
    // Serializes version assignment on workflows.
    workflow_writes: Mutex<()>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn save_workflow(&self, name: &str, bpmn_xml: &str) -> OrchestratorResult<Workflow> {
        let definition = compile(bpmn_xml)?;

        let _guard = self.workflow_writes.lock().await;
        let mut version = 1;
        for key in self.workflows.keys().await {
            if let Some(existing) = self.workflows.get(&key).await {
                if existing.name == name {
                    version = version.max(existing.version + 1);
                }
            }
        }

        let workflow = Workflow {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            version,
            bpmn_xml: bpmn_xml.to_string(),
            created_at: Utc::now(),
        };

        self.definitions
            .set(&workflow.id, Arc::new(definition))
            .await;
        self.workflows.set(&workflow.id, workflow.clone()).await;

        debug!(workflow_id = %workflow.id, name, version, "Saved workflow");
        Ok(workflow)
    }

    async fn get_workflow(&self, workflow_id: &str) -> OrchestratorResult<Workflow> {
        self.workflows
            .get(workflow_id)
            .await
            .ok_or_else(|| OrchestratorError::NotFound(format!("workflow {}", workflow_id)))
    }

    async fn get_workflow_definition(
        &self,
        workflow_id: &str,
    ) -> OrchestratorResult<Arc<WorkflowDefinition>> {
        self.definitions
            .get(workflow_id)
            .await
            .ok_or_else(|| OrchestratorError::NotFound(format!("workflow {}", workflow_id)))
    }

    async fn create_instance(
        &self,
        workflow_id: &str,
        variables: HashMap<String, serde_json::Value>,
    ) -> OrchestratorResult<Instance> {
        if !self.workflows.exists(workflow_id).await {
            return Err(OrchestratorError::NotFound(format!("workflow {}", workflow_id)));
        }

        let now = Utc::now();
        let instance = Instance {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: workflow_id.to_string(),
            status: InstanceStatus::Pending,
            current_node_ids: Vec::new(),
            variables,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.instances.set(&instance.id, instance.clone()).await;
        Ok(instance)
    }

    async fn get_instance(&self, instance_id: &str) -> OrchestratorResult<Instance> {
        self.instances
            .get(instance_id)
            .await
            .ok_or_else(|| OrchestratorError::NotFound(format!("instance {}", instance_id)))
    }

    async fn update_instance(
        &self,
        instance_id: &str,
        expected_version: i64,
        update: InstanceUpdate,
    ) -> OrchestratorResult<Instance> {
        let _guard = self.instance_writes.lock().await;

        let mut instance = self.get_instance(instance_id).await?;
        if instance.version != expected_version {
            return Err(OrchestratorError::Conflict(format!(
                "instance {} is at version {}, expected {}",
                instance_id, instance.version, expected_version
            )));
        }

        instance.status = update.status;
        instance.current_node_ids = update.current_node_ids;
        instance.variables = update.variables;
        instance.version += 1;
        instance.updated_at = Utc::now();

        self.instances.set(instance_id, instance.clone()).await;
        Ok(instance)
    }

    async fn create_execution(
        &self,
        instance_id: &str,
        node_id: &str,
        input: serde_json::Value,
    ) -> OrchestratorResult<Execution> {
        let execution = Execution {
            id: uuid::Uuid::new_v4().to_string(),
            instance_id: instance_id.to_string(),
            node_id: node_id.to_string(),
            status: ExecutionStatus::Running,
            input,
            output: None,
            error: None,
            error_code: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        self.executions.set(&execution.id, execution.clone()).await;
        self.execution_order.write().await.push(execution.id.clone());
        Ok(execution)
    }

    async fn update_execution(
        &self,
        execution_id: &str,
        update: ExecutionUpdate,
    ) -> OrchestratorResult<Execution> {
        let mut execution = self.get_execution(execution_id).await?;
        execution.status = update.status;
        execution.output = update.output;
        execution.error = update.error;
        execution.error_code = update.error_code;
        if matches!(
            execution.status,
            ExecutionStatus::Completed | ExecutionStatus::Failed
        ) {
            execution.completed_at = Some(Utc::now());
        }
        self.executions.set(execution_id, execution.clone()).await;
        Ok(execution)
    }

    async fn get_execution(&self, execution_id: &str) -> OrchestratorResult<Execution> {
        self.executions
            .get(execution_id)
            .await
            .ok_or_else(|| OrchestratorError::NotFound(format!("execution {}", execution_id)))
    }

    async fn list_executions(&self, instance_id: &str) -> OrchestratorResult<Vec<Execution>> {
        let order = self.execution_order.read().await.clone();
        let mut executions = Vec::new();
        for id in order {
            if let Some(execution) = self.executions.get(&id).await {
                if execution.instance_id == instance_id {
                    executions.push(execution);
                }
            }
        }
        Ok(executions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LINEAR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL">
  <process id="p1" name="Linear">
    <startEvent id="start"/>
    <task id="t1"/>
    <endEvent id="end"/>
    <sequenceFlow id="f1" sourceRef="start" targetRef="t1"/>
    <sequenceFlow id="f2" sourceRef="t1" targetRef="end"/>
  </process>
</definitions>"#;

    #[tokio::test]
    async fn test_save_workflow_compiles_and_versions() {
        let store = MemoryWorkflowStore::new();
        let first = store.save_workflow("linear", LINEAR).await.unwrap();
        let second = store.save_workflow("linear", LINEAR).await.unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);

        let definition = store.get_workflow_definition(&first.id).await.unwrap();
        assert_eq!(definition.process_id, "p1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_get_distinct_versions() {
        let store = Arc::new(MemoryWorkflowStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.save_workflow("linear", LINEAR).await.unwrap().version
            }));
        }

        let mut versions = Vec::new();
        for handle in handles {
            versions.push(handle.await.unwrap());
        }
        versions.sort();
        assert_eq!(versions, (1..=8).collect::<Vec<i32>>());
    }

    #[tokio::test]
    async fn test_save_workflow_rejects_bad_xml() {
        let store = MemoryWorkflowStore::new();
        let err = store.save_workflow("bad", "").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::EmptyInput));
    }

    #[tokio::test]
    async fn test_update_instance_checks_version() {
        let store = MemoryWorkflowStore::new();
        let workflow = store.save_workflow("linear", LINEAR).await.unwrap();
        let instance = store
            .create_instance(&workflow.id, HashMap::new())
            .await
            .unwrap();

        let update = InstanceUpdate {
            status: InstanceStatus::Running,
            current_node_ids: vec!["t1".to_string()],
            variables: HashMap::from([("x".to_string(), json!(1))]),
        };
        let updated = store
            .update_instance(&instance.id, 0, update.clone())
            .await
            .unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.current_node_ids, vec!["t1"]);

        let err = store
            .update_instance(&instance.id, 0, update)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_missing_records_are_not_found() {
        let store = MemoryWorkflowStore::new();
        assert!(matches!(
            store.get_instance("nope").await,
            Err(OrchestratorError::NotFound(_))
        ));
        assert!(matches!(
            store.create_instance("nope", HashMap::new()).await,
            Err(OrchestratorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_execution_lifecycle() {
        let store = MemoryWorkflowStore::new();
        let execution = store
            .create_execution("i-1", "t1", json!({"a": 1}))
            .await
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Running);

        let done = store
            .update_execution(&execution.id, ExecutionUpdate::completed(Some(json!({"ok": true}))))
            .await
            .unwrap();
        assert_eq!(done.status, ExecutionStatus::Completed);
        assert!(done.completed_at.is_some());

        let listed = store.list_executions("i-1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(store.list_executions("i-2").await.unwrap().is_empty());
    }
}
