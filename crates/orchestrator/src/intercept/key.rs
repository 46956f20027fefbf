//! Mock key generation.
//!
//! A key is the operation name followed by the values of the parameter's
//! identifying fields, joined with `:` in field declaration order, e.g.
//! `GetWorkflow:workflow-123`. Parameters without identifying fields map to
//! the bare operation name.

/// Parameters of an interceptable operation.
pub trait MockKey {
    /// Values of the identifying fields, in declaration order.
    fn id_fields(&self) -> Vec<String> {
        Vec::new()
    }
}

impl MockKey for () {}

impl<T: MockKey + ?Sized> MockKey for &T {
    fn id_fields(&self) -> Vec<String> {
        (**self).id_fields()
    }
}

/// Build the mock key for `operation` called with `params`.
pub fn generate_key<P: MockKey + ?Sized>(operation: &str, params: &P) -> String {
    let fields = params.id_fields();
    if fields.is_empty() {
        return operation.to_string();
    }

    let mut key = String::from(operation);
    for field in fields {
        key.push(':');
        key.push_str(&field);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    struct GetWorkflow {
        workflow_id: String,
    }

    impl MockKey for GetWorkflow {
        fn id_fields(&self) -> Vec<String> {
            vec![self.workflow_id.clone()]
        }
    }

    struct UpdateExecution {
        instance_id: String,
        execution_id: String,
    }

    impl MockKey for UpdateExecution {
        fn id_fields(&self) -> Vec<String> {
            vec![self.instance_id.clone(), self.execution_id.clone()]
        }
    }

    #[test]
    fn test_single_field_key() {
        let params = GetWorkflow {
            workflow_id: "workflow-123".to_string(),
        };
        assert_eq!(generate_key("GetWorkflow", &params), "GetWorkflow:workflow-123");
    }

    #[test]
    fn test_fields_keep_declaration_order() {
        let params = UpdateExecution {
            instance_id: "i-1".to_string(),
            execution_id: "e-9".to_string(),
        };
        assert_eq!(generate_key("UpdateExecution", &params), "UpdateExecution:i-1:e-9");
    }

    #[test]
    fn test_no_fields_is_bare_operation() {
        assert_eq!(generate_key("ListWorkflows", &()), "ListWorkflows");
    }
}
