//! Typed failures for the memory engine.
//!
//! [`MemoryError::EmbeddingUnavailable`] never reaches callers of the public
//! operations: the recall and write paths catch it and fall back to keyword
//! matching. The remaining variants surface as-is.

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

pub type Result<T, E = MemoryError> = std::result::Result<T, E>;

impl MemoryError {
    pub fn memory_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "memory",
            id: id.into(),
        }
    }

    pub fn edge_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "edge",
            id: id.into(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Stable machine-readable tag for structured error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Storage(_) | Self::Task(_) => "storage_error",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::EmbeddingUnavailable(_) => "embedding_unavailable",
            Self::Serialization(_) => "serialization_error",
        }
    }

    /// Structured form returned to tool and CLI callers.
    pub fn to_payload(&self) -> ErrorPayload {
        ErrorPayload {
            error: ErrorBody {
                kind: self.kind(),
                message: self.to_string(),
            },
        }
    }
}

impl From<tokio::task::JoinError> for MemoryError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_the_id() {
        let err = MemoryError::memory_not_found("abc");
        assert_eq!(err.to_string(), "memory not found: abc");
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn rusqlite_errors_become_storage_errors() {
        let err: MemoryError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.kind(), "storage_error");
    }

    #[test]
    fn payload_serializes_kind_and_message() {
        let err = MemoryError::invalid("weight must be within [0, 1]");
        let json = serde_json::to_value(err.to_payload()).unwrap();
        assert_eq!(json["error"]["kind"], "invalid_argument");
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("weight must be within"));
    }
}
