//! Normalization of the two status vocabularies used by operation resources.
//!
//! Most endpoint families report `{"status": ..., "error"?: ...}`; others
//! report `{"state": ..., "message"?: ...}`. Both are folded into one
//! [`OperationStatus`] before the poller looks at them.

use serde_json::Value;

pub const SUCCESSFUL: &str = "Successful";
pub const ERROR: &str = "Error";

/// Which field the phase was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusField {
    Status,
    State,
}

impl StatusField {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusField::Status => "status",
            StatusField::State => "state",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationPhase {
    Successful,
    Error,
    /// Any other token; the raw value is kept for logging.
    Pending(String),
}

impl OperationPhase {
    fn from_token(token: &str) -> Self {
        match token {
            SUCCESSFUL => OperationPhase::Successful,
            ERROR => OperationPhase::Error,
            other => OperationPhase::Pending(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationPhase::Pending(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationStatus {
    pub field: StatusField,
    pub phase: OperationPhase,
    /// Human-readable failure text, only meaningful when `phase` is `Error`.
    pub message: Option<String>,
}

impl OperationStatus {
    /// Parse an operation resource. `None` means neither `status` nor `state`
    /// is present, which breaks the gateway contract.
    pub fn parse(body: &Value) -> Option<Self> {
        let (field, raw) = if let Some(v) = body.get("status") {
            (StatusField::Status, v)
        } else if let Some(v) = body.get("state") {
            (StatusField::State, v)
        } else {
            return None;
        };

        let token = match raw {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let phase = OperationPhase::from_token(&token);

        let message = match field {
            StatusField::Status => text(body, "error"),
            StatusField::State => text(body, "message").or_else(|| text(body, "error")),
        };

        Some(Self {
            field,
            phase,
            message,
        })
    }
}

fn text(body: &Value, key: &str) -> Option<String> {
    match body.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_vocabulary() {
        let s = OperationStatus::parse(&json!({"status": "In Progress"})).unwrap();
        assert_eq!(s.field, StatusField::Status);
        assert_eq!(s.phase, OperationPhase::Pending("In Progress".to_string()));
        assert!(!s.phase.is_terminal());

        let s = OperationStatus::parse(&json!({"status": "Successful"})).unwrap();
        assert_eq!(s.phase, OperationPhase::Successful);
        assert!(s.phase.is_terminal());
    }

    #[test]
    fn test_state_vocabulary_with_message() {
        let s = OperationStatus::parse(&json!({
            "state": "Error",
            "message": "Failed to load rxf"
        }))
        .unwrap();
        assert_eq!(s.field, StatusField::State);
        assert_eq!(s.phase, OperationPhase::Error);
        assert_eq!(s.message.as_deref(), Some("Failed to load rxf"));
    }

    #[test]
    fn test_state_falls_back_to_error_field() {
        let s = OperationStatus::parse(&json!({"state": "Error", "error": "boom"})).unwrap();
        assert_eq!(s.message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_status_preferred_over_state() {
        let s = OperationStatus::parse(&json!({
            "status": "Successful",
            "state": "executing"
        }))
        .unwrap();
        assert_eq!(s.field, StatusField::Status);
        assert_eq!(s.phase, OperationPhase::Successful);
    }

    #[test]
    fn test_status_ignores_message_field() {
        let s = OperationStatus::parse(&json!({
            "status": "Error",
            "message": "not read for this vocabulary"
        }))
        .unwrap();
        assert_eq!(s.phase, OperationPhase::Error);
        assert_eq!(s.message, None);
    }

    #[test]
    fn test_missing_fields() {
        assert!(OperationStatus::parse(&json!({"progress": 50})).is_none());
        assert!(OperationStatus::parse(&Value::Null).is_none());
    }

    #[test]
    fn test_terminal_tokens_are_case_sensitive() {
        let s = OperationStatus::parse(&json!({"status": "successful"})).unwrap();
        assert!(!s.phase.is_terminal());
    }
}
