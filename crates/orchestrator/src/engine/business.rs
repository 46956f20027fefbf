//! Business API client used by service tasks.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::intercept::{MockKey, MockKind, MockPayload, MockValue};

/// Operation name business calls are intercepted under.
pub const CALL_BUSINESS_API: &str = "CallBusinessApi";

/// Parameters of a business API call.
#[derive(Debug, Clone, Copy)]
pub struct BusinessCallParams<'a> {
    pub instance_id: &'a str,
    pub node_id: &'a str,
    pub params: &'a serde_json::Value,
}

impl MockKey for BusinessCallParams<'_> {
    fn id_fields(&self) -> Vec<String> {
        vec![self.instance_id.to_string(), self.node_id.to_string()]
    }
}

/// Successful business API response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
}

impl BusinessResponse {
    pub fn ok(body: serde_json::Value) -> Self {
        Self {
            status_code: 200,
            body,
        }
    }
}

impl MockPayload for BusinessResponse {
    fn kind() -> MockKind {
        MockKind::Json
    }

    fn to_mock(&self) -> MockValue {
        MockValue::Json(serde_json::json!({
            "statusCode": self.status_code,
            "body": self.body,
        }))
    }

    /// A JSON mock with `statusCode` and `body` is read as a full response,
    /// any other JSON value as the body of a 200 response.
    fn from_mock(value: &MockValue) -> Option<Self> {
        let MockValue::Json(json) = value else {
            return None;
        };
        if let Ok(response) = serde_json::from_value::<BusinessResponse>(json.clone()) {
            return Some(response);
        }
        Some(Self::ok(json.clone()))
    }
}

/// HTTP client for business APIs.
///
/// Every call is a single JSON `POST` with a hard timeout and no retry.
#[derive(Clone)]
pub struct BusinessClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl BusinessClient {
    pub fn new(timeout: Duration) -> OrchestratorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OrchestratorError::Config(format!("HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    /// Use a preconfigured client. `timeout` is only used for error reporting.
    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// POST `{instanceId, nodeId, params}` to `url`.
    ///
    /// Non-2xx responses fail with `ExternalCall`, an exceeded timeout with
    /// `Timeout`. A non-JSON body is returned as a JSON string.
    pub async fn call(
        &self,
        url: &str,
        call: BusinessCallParams<'_>,
    ) -> OrchestratorResult<BusinessResponse> {
        let payload = serde_json::json!({
            "instanceId": call.instance_id,
            "nodeId": call.node_id,
            "params": call.params,
        });

        debug!(url, node_id = call.node_id, "Calling business API");

        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_error(url, e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_error(url, e))?;

        if !status.is_success() {
            warn!(url, status = status.as_u16(), "Business API returned an error status");
            return Err(OrchestratorError::ExternalCall(format!(
                "HTTP {} from {}: {}",
                status.as_u16(),
                url,
                truncate(&text, 200)
            )));
        }

        let body = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        };

        Ok(BusinessResponse {
            status_code: status.as_u16(),
            body,
        })
    }

    fn map_error(&self, url: &str, error: reqwest::Error) -> OrchestratorError {
        if error.is_timeout() {
            OrchestratorError::Timeout(self.timeout.as_secs())
        } else {
            OrchestratorError::ExternalCall(format!("{}: {}", url, error))
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercept::generate_key;
    use serde_json::json;

    #[test]
    fn test_mock_key_uses_instance_and_node() {
        let params = json!({});
        let call = BusinessCallParams {
            instance_id: "i-1",
            node_id: "task_a",
            params: &params,
        };
        assert_eq!(generate_key(CALL_BUSINESS_API, &call), "CallBusinessApi:i-1:task_a");
    }

    #[test]
    fn test_response_from_plain_json_mock() {
        let response = BusinessResponse::from_mock(&MockValue::Json(json!({"approved": true}))).unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, json!({"approved": true}));

        let full = BusinessResponse {
            status_code: 201,
            body: json!("created"),
        };
        assert_eq!(BusinessResponse::from_mock(&full.to_mock()), Some(full));
        assert_eq!(BusinessResponse::from_mock(&MockValue::Text("x".into())), None);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
