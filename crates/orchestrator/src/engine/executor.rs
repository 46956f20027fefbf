//! The live execution engine.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::business::{BusinessCallParams, BusinessClient, BusinessResponse, CALL_BUSINESS_API};
use super::evaluator::ConditionEvaluator;
use super::state::InstanceStatus;
use super::step::{reconcile_position, step_node, StepCapabilities, StepContext, Transition};
use crate::bpmn::{Node, SequenceFlow, WorkflowDefinition};
use crate::config::EngineConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::intercept::{intercept, InterceptSession};
use crate::result_ext::ResultExt;
use crate::sanitize::redact_sensitive;
use crate::store::{ExecutionUpdate, Instance, InstanceUpdate, WorkflowStore};

/// Engine half of an [`ExecuteResult`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineResponse {
    pub instance_id: String,
    pub current_node_ids: Vec<String>,
    pub next_node_ids: Vec<String>,
    pub status: InstanceStatus,
    pub execution_id: String,
    pub variables: HashMap<String, serde_json::Value>,
    /// Whether the trigger reset the position backwards.
    pub rolled_back: bool,
}

/// Result of [`WorkflowEngine::execute_from_node`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_response: Option<serde_json::Value>,
    pub engine_response: EngineResponse,
}

/// Capabilities used by the live engine: intercepted HTTP business calls and
/// the condition evaluator.
pub struct LiveCapabilities<'a> {
    pub client: &'a BusinessClient,
    pub evaluator: &'a ConditionEvaluator,
    pub session: Option<&'a InterceptSession>,
    pub instance_id: &'a str,
}

#[async_trait]
impl<'a> StepCapabilities for LiveCapabilities<'a> {
    async fn call_external(
        &self,
        node: &Node,
        params: &serde_json::Value,
        _variables: &HashMap<String, serde_json::Value>,
    ) -> OrchestratorResult<serde_json::Value> {
        let url = node
            .business_api_url
            .as_deref()
            .ok_or_else(|| OrchestratorError::MissingBusinessApiUrl(node.id.clone()))?;

        let call = BusinessCallParams {
            instance_id: self.instance_id,
            node_id: &node.id,
            params,
        };

        let response: BusinessResponse =
            intercept(self.session, CALL_BUSINESS_API, &call, || self.client.call(url, call)).await?;
        Ok(response.body)
    }

    async fn evaluate_condition(
        &self,
        flow: &SequenceFlow,
        variables: &HashMap<String, serde_json::Value>,
    ) -> OrchestratorResult<bool> {
        self.evaluator.evaluate(&flow.condition_expression, variables)
    }
}

/// Drives workflow instances one trigger at a time.
///
/// Calls on the same instance are serialised by a per-instance lock. The
/// store's version check catches writers outside this engine.
pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    config: EngineConfig,
    client: BusinessClient,
    evaluator: ConditionEvaluator,
    instance_locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn WorkflowStore>, config: EngineConfig) -> OrchestratorResult<Self> {
        let client = BusinessClient::new(config.business_api_timeout())?;
        Ok(Self::with_client(store, config, client))
    }

    pub fn with_client(
        store: Arc<dyn WorkflowStore>,
        config: EngineConfig,
        client: BusinessClient,
    ) -> Self {
        Self {
            store,
            config,
            client,
            evaluator: ConditionEvaluator::new(),
            instance_locks: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create an instance of `workflow_id` and trigger its first start event.
    pub async fn start_instance(
        &self,
        workflow_id: &str,
        variables: HashMap<String, serde_json::Value>,
        session: Option<Arc<InterceptSession>>,
    ) -> OrchestratorResult<ExecuteResult> {
        let definition = self.store.get_workflow_definition(workflow_id).await?;
        let start = definition
            .first_start_event()
            .ok_or_else(|| {
                OrchestratorError::NotFound(format!("start event in workflow {}", workflow_id))
            })?
            .to_string();

        let instance = self.store.create_instance(workflow_id, variables).await?;
        info!(instance_id = %instance.id, workflow_id, "Instance created");

        self.execute_from_node(&instance.id, &start, serde_json::Value::Null, session)
            .await
    }

    /// Trigger `from_node_id` on an instance.
    ///
    /// Reconciles the trigger with the current position, dispatches the node,
    /// advances one flow and commits the new position. Every call gets an
    /// execution record, which ends up `Failed` with the error text when the
    /// call fails after the node was resolved.
    pub async fn execute_from_node(
        &self,
        instance_id: &str,
        from_node_id: &str,
        business_params: serde_json::Value,
        session: Option<Arc<InterceptSession>>,
    ) -> OrchestratorResult<ExecuteResult> {
        let lock = self.instance_lock(instance_id).await;
        let _guard = lock.lock().await;

        let instance = self.store.get_instance(instance_id).await?;
        let definition = self
            .store
            .get_workflow_definition(&instance.workflow_id)
            .await?;
        definition
            .node(from_node_id)
            .log(format!("resolving trigger on instance {}", instance_id))?;

        if instance.status == InstanceStatus::Cancelled {
            warn!(instance_id, node_id = from_node_id, "Trigger on cancelled instance");
            return Err(OrchestratorError::Conflict(format!(
                "instance {} is cancelled",
                instance_id
            )));
        }

        let execution = self
            .store
            .create_execution(instance_id, from_node_id, redact_sensitive(&business_params))
            .await?;

        debug!(
            instance_id,
            node_id = from_node_id,
            execution_id = %execution.id,
            "Executing node"
        );

        let result = self
            .run(
                &instance,
                &definition,
                from_node_id,
                &business_params,
                session.as_deref(),
                &execution.id,
            )
            .await
            .log(format!("executing node {} on instance {}", from_node_id, instance_id));

        match result {
            Ok(result) => {
                self.store
                    .update_execution(
                        &execution.id,
                        ExecutionUpdate::completed(result.business_response.clone()),
                    )
                    .await?;
                if result.engine_response.status.is_terminal() {
                    self.release_lock(instance_id, &lock).await;
                }
                Ok(result)
            }
            Err(err) => {
                let _ = self
                    .store
                    .update_execution(&execution.id, ExecutionUpdate::failed(&err))
                    .await
                    .log(format!("recording failure of execution {}", execution.id));
                Err(err)
            }
        }
    }

    /// Mark an instance cancelled and clear its position.
    pub async fn cancel_instance(&self, instance_id: &str) -> OrchestratorResult<Instance> {
        let lock = self.instance_lock(instance_id).await;
        let _guard = lock.lock().await;

        let instance = self.store.get_instance(instance_id).await?;
        let cancelled = self
            .store
            .update_instance(
                instance_id,
                instance.version,
                InstanceUpdate {
                    status: InstanceStatus::Cancelled,
                    current_node_ids: Vec::new(),
                    variables: instance.variables,
                },
            )
            .await?;

        info!(instance_id, "Instance cancelled");
        self.release_lock(instance_id, &lock).await;
        Ok(cancelled)
    }

    async fn run(
        &self,
        instance: &Instance,
        definition: &WorkflowDefinition,
        from_node_id: &str,
        business_params: &serde_json::Value,
        session: Option<&InterceptSession>,
        execution_id: &str,
    ) -> OrchestratorResult<ExecuteResult> {
        let reposition = reconcile_position(definition, &instance.current_node_ids, from_node_id)?;
        let rolled_back = reposition.is_rollback();

        let capabilities = LiveCapabilities {
            client: &self.client,
            evaluator: &self.evaluator,
            session,
            instance_id: &instance.id,
        };
        let ctx = StepContext::new(definition, &capabilities)
            .with_response_variable(&self.config.response_variable);

        let mut variables = instance.variables.clone();
        let outcome = step_node(ctx, from_node_id, business_params, &mut variables).await?;

        let status = match outcome.transition {
            Transition::Completed => InstanceStatus::Completed,
            Transition::Waiting | Transition::Advanced => InstanceStatus::Running,
        };

        let updated = self
            .store
            .update_instance(
                &instance.id,
                instance.version,
                InstanceUpdate {
                    status,
                    current_node_ids: outcome.position(),
                    variables,
                },
            )
            .await?;

        if status == InstanceStatus::Completed {
            info!(instance_id = %instance.id, node_id = from_node_id, "Instance completed");
        }

        Ok(ExecuteResult {
            business_response: outcome.response,
            engine_response: EngineResponse {
                instance_id: updated.id,
                current_node_ids: updated.current_node_ids,
                next_node_ids: outcome.next_node_ids,
                status: updated.status,
                execution_id: execution_id.to_string(),
                variables: updated.variables,
                rolled_back,
            },
        })
    }

    async fn instance_lock(&self, instance_id: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.instance_locks.read().await.get(instance_id) {
            return lock.clone();
        }
        self.instance_locks
            .write()
            .await
            .entry(instance_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the lock entry of a finished instance unless another caller
    /// already holds a handle to it. Holding the map's write lock means no
    /// new handle can be taken while the count is checked.
    async fn release_lock(&self, instance_id: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.instance_locks.write().await;
        let Some(entry) = locks.get(instance_id) else {
            return;
        };
        // One handle in the map, one held by the caller.
        if Arc::ptr_eq(entry, lock) && Arc::strong_count(lock) == 2 {
            locks.remove(instance_id);
        } else {
            debug!(instance_id, "Keeping instance lock for queued callers");
        }
    }
}
