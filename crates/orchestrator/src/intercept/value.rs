//! Typed mock payloads.
//!
//! Mock data is stored as a tagged [`MockValue`]. Callers retrieve it through
//! [`MockPayload`], which checks the tag before converting, so a mock of the
//! wrong shape becomes a `MockTypeMismatch` error instead of a bad value.

use serde::{Deserialize, Serialize};

/// Tag of a stored mock value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockKind {
    Null,
    Bool,
    Number,
    Text,
    Json,
}

impl std::fmt::Display for MockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool => write!(f, "bool"),
            Self::Number => write!(f, "number"),
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// A recorded or hand-seeded operation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum MockValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Json(serde_json::Value),
}

impl MockValue {
    pub fn kind(&self) -> MockKind {
        match self {
            Self::Null => MockKind::Null,
            Self::Bool(_) => MockKind::Bool,
            Self::Number(_) => MockKind::Number,
            Self::Text(_) => MockKind::Text,
            Self::Json(_) => MockKind::Json,
        }
    }

    /// Shape of the stored value, for mismatch reports.
    pub fn describe(&self) -> String {
        match self {
            Self::Number(n) if n.fract() != 0.0 => format!("fractional number {}", n),
            other => other.kind().to_string(),
        }
    }
}

impl From<&str> for MockValue {
    fn from(value: &str) -> Self {
        MockValue::Text(value.to_string())
    }
}

impl From<String> for MockValue {
    fn from(value: String) -> Self {
        MockValue::Text(value)
    }
}

impl From<bool> for MockValue {
    fn from(value: bool) -> Self {
        MockValue::Bool(value)
    }
}

impl From<f64> for MockValue {
    fn from(value: f64) -> Self {
        MockValue::Number(value)
    }
}

impl From<i64> for MockValue {
    fn from(value: i64) -> Self {
        MockValue::Number(value as f64)
    }
}

impl From<serde_json::Value> for MockValue {
    fn from(value: serde_json::Value) -> Self {
        MockValue::Json(value)
    }
}

/// A result type that can be recorded into and replayed from a [`MockValue`].
pub trait MockPayload: Sized {
    /// Tag this type is stored under.
    fn kind() -> MockKind;

    /// Shape this type accepts, for mismatch reports.
    fn expected() -> String {
        Self::kind().to_string()
    }

    /// Convert a real result for recording.
    fn to_mock(&self) -> MockValue;

    /// Convert a stored value back, `None` when the shape does not match.
    fn from_mock(value: &MockValue) -> Option<Self>;
}

impl MockPayload for String {
    fn kind() -> MockKind {
        MockKind::Text
    }

    fn to_mock(&self) -> MockValue {
        MockValue::Text(self.clone())
    }

    fn from_mock(value: &MockValue) -> Option<Self> {
        match value {
            MockValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl MockPayload for bool {
    fn kind() -> MockKind {
        MockKind::Bool
    }

    fn to_mock(&self) -> MockValue {
        MockValue::Bool(*self)
    }

    fn from_mock(value: &MockValue) -> Option<Self> {
        match value {
            MockValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl MockPayload for f64 {
    fn kind() -> MockKind {
        MockKind::Number
    }

    fn to_mock(&self) -> MockValue {
        MockValue::Number(*self)
    }

    fn from_mock(value: &MockValue) -> Option<Self> {
        match value {
            MockValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl MockPayload for i64 {
    fn kind() -> MockKind {
        MockKind::Number
    }

    fn expected() -> String {
        "integer number".to_string()
    }

    fn to_mock(&self) -> MockValue {
        MockValue::Number(*self as f64)
    }

    fn from_mock(value: &MockValue) -> Option<Self> {
        match value {
            MockValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }
}

impl MockPayload for serde_json::Value {
    fn kind() -> MockKind {
        MockKind::Json
    }

    fn to_mock(&self) -> MockValue {
        MockValue::Json(self.clone())
    }

    fn from_mock(value: &MockValue) -> Option<Self> {
        match value {
            MockValue::Json(v) => Some(v.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tagged_serialization() {
        let value = MockValue::Text("mocked".to_string());
        assert_eq!(
            serde_json::to_value(&value).unwrap(),
            json!({"type": "text", "value": "mocked"})
        );

        let parsed: MockValue =
            serde_json::from_value(json!({"type": "json", "value": {"ok": true}})).unwrap();
        assert_eq!(parsed.kind(), MockKind::Json);
    }

    #[test]
    fn test_typed_retrieval_checks_tag() {
        let text = MockValue::from("hello");
        assert_eq!(String::from_mock(&text), Some("hello".to_string()));
        assert_eq!(bool::from_mock(&text), None);
        assert_eq!(serde_json::Value::from_mock(&text), None);
    }

    #[test]
    fn test_integer_payload_rejects_fractions() {
        assert_eq!(i64::from_mock(&MockValue::Number(4.0)), Some(4));
        assert_eq!(i64::from_mock(&MockValue::Number(4.5)), None);
        assert_eq!(MockValue::Number(4.5).describe(), "fractional number 4.5");
        assert_eq!(MockValue::Number(4.0).describe(), "number");
        assert_eq!(i64::expected(), "integer number");
    }
}
