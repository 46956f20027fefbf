//! Redaction of business parameters before they reach logs or execution records.

use serde_json::{Map, Value};

const REDACTED: &str = "[REDACTED]";

const MAX_DEPTH: usize = 16;

/// Key fragments that mark a value as a credential (lowercase).
static SENSITIVE_KEYS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "api_key",
    "apikey",
    "authorization",
    "credential",
    "private_key",
    "passphrase",
];

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase().replace('-', "_");
    SENSITIVE_KEYS.iter().any(|s| key_lower.contains(s))
}

fn is_sensitive_value(value: &str) -> bool {
    let lower = value.to_lowercase();
    if lower.starts_with("bearer ") || lower.starts_with("basic ") {
        return true;
    }

    // JWT: header.payload.signature
    value.starts_with("eyJ") && value.matches('.').count() == 2 && value.len() > 50
}

/// Return a copy of `value` with credential-looking entries replaced.
pub fn redact_sensitive(value: &Value) -> Value {
    redact(value, 0)
}

fn redact(value: &Value, depth: usize) -> Value {
    if depth >= MAX_DEPTH {
        return value.clone();
    }

    match value {
        Value::Object(map) => {
            let mut result = Map::with_capacity(map.len());
            for (key, val) in map {
                let redacted = if is_sensitive_key(key) {
                    Value::String(REDACTED.to_string())
                } else {
                    redact(val, depth + 1)
                };
                result.insert(key.clone(), redacted);
            }
            Value::Object(result)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| redact(v, depth + 1)).collect()),
        Value::String(s) if is_sensitive_value(s) => Value::String(REDACTED.to_string()),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redacts_sensitive_keys() {
        let params = json!({
            "customerId": "c-42",
            "apiToken": "abc",
            "nested": {"db_password": "hunter2", "amount": 10}
        });

        let redacted = redact_sensitive(&params);
        assert_eq!(redacted["customerId"], "c-42");
        assert_eq!(redacted["apiToken"], REDACTED);
        assert_eq!(redacted["nested"]["db_password"], REDACTED);
        assert_eq!(redacted["nested"]["amount"], 10);
    }

    #[test]
    fn test_redacts_bearer_values() {
        let params = json!({"header": "Bearer xyz", "list": ["plain", "basic dXNlcg=="]});
        let redacted = redact_sensitive(&params);
        assert_eq!(redacted["header"], REDACTED);
        assert_eq!(redacted["list"][0], "plain");
        assert_eq!(redacted["list"][1], REDACTED);
    }
}
