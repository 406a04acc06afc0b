//! JSON-lines envelope exchanged with the native service process.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProcessingError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub command: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcReply {
    pub id: u64,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcReply {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: u64, error: RpcError) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error),
        }
    }
}

impl From<&ProcessingError> for RpcError {
    fn from(err: &ProcessingError) -> Self {
        let (code, pattern) = match err {
            ProcessingError::InvalidPattern { pattern, .. } => ("invalid_pattern", Some(pattern.clone())),
            ProcessingError::MissingInput(_) => ("missing_input", None),
            _ => ("internal", None),
        };
        Self {
            code: code.to_string(),
            message: match err {
                ProcessingError::InvalidPattern { reason, .. } => reason.clone(),
                other => other.to_string(),
            },
            pattern,
        }
    }
}

impl From<RpcError> for ProcessingError {
    fn from(err: RpcError) -> Self {
        match err.code.as_str() {
            "invalid_pattern" => ProcessingError::InvalidPattern {
                pattern: err.pattern.unwrap_or_default(),
                reason: err.message,
            },
            "missing_input" => ProcessingError::MissingInput("rejected by native backend"),
            _ => ProcessingError::TransportFailure(err.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_survives_the_wire() {
        let original = ProcessingError::InvalidPattern {
            pattern: "(".into(),
            reason: "unclosed group".into(),
        };
        let wire = RpcError::from(&original);
        let json = serde_json::to_string(&RpcReply::failure(7, wire)).unwrap();
        let reply: RpcReply = serde_json::from_str(&json).unwrap();
        assert!(!reply.ok);
        assert_eq!(ProcessingError::from(reply.error.unwrap()), original);
    }

    #[test]
    fn test_other_errors_become_transport_failures() {
        let wire = RpcError::from(&ProcessingError::Unknown("boom".into()));
        assert_eq!(
            ProcessingError::from(wire),
            ProcessingError::TransportFailure("boom".into())
        );
    }
}
