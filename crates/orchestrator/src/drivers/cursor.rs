//! Position and variables of a driver-owned run.

use std::collections::HashMap;
use std::sync::Arc;

use crate::bpmn::WorkflowDefinition;
use crate::engine::step::{
    reconcile_position, step_node, StepCapabilities, StepContext, StepOutcome,
    DEFAULT_RESPONSE_VARIABLE,
};
use crate::error::{OrchestratorError, OrchestratorResult};

/// In-memory counterpart of an instance record, stepped with the same
/// primitives the engine uses.
pub(crate) struct Cursor {
    pub definition: Arc<WorkflowDefinition>,
    pub current_node_ids: Vec<String>,
    pub variables: HashMap<String, serde_json::Value>,
    pub response_variable: String,
}

impl Cursor {
    pub fn new(definition: Arc<WorkflowDefinition>) -> Self {
        Self {
            definition,
            current_node_ids: Vec::new(),
            variables: HashMap::new(),
            response_variable: DEFAULT_RESPONSE_VARIABLE.to_string(),
        }
    }

    /// Node the next step runs, placing the cursor on the first start event
    /// when it has no position.
    pub fn next_node(&mut self) -> OrchestratorResult<String> {
        if let Some(node_id) = self.current_node_ids.first() {
            return Ok(node_id.clone());
        }
        let start = self
            .definition
            .first_start_event()
            .ok_or_else(|| {
                OrchestratorError::NotFound(format!(
                    "start event in process {}",
                    self.definition.process_id
                ))
            })?
            .to_string();
        self.current_node_ids = vec![start.clone()];
        Ok(start)
    }

    /// Apply the trigger rules for `node_id`, returning whether the position
    /// was rolled back.
    pub fn reposition(&mut self, node_id: &str) -> OrchestratorResult<bool> {
        let reposition = reconcile_position(&self.definition, &self.current_node_ids, node_id)?;
        let rolled_back = reposition.is_rollback();
        self.current_node_ids = reposition.apply(&self.current_node_ids);
        Ok(rolled_back)
    }

    pub async fn execute(
        &mut self,
        capabilities: &dyn StepCapabilities,
        node_id: &str,
        params: &serde_json::Value,
    ) -> OrchestratorResult<StepOutcome> {
        let ctx = StepContext::new(&self.definition, capabilities)
            .with_response_variable(&self.response_variable);
        let outcome = step_node(ctx, node_id, params, &mut self.variables).await?;
        self.current_node_ids = outcome.position();
        Ok(outcome)
    }
}
