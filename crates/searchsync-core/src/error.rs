//! Error taxonomy for the search synchronization engine.

use thiserror::Error;

use crate::document::RecordId;
use crate::entity::EntityKind;

/// Errors surfaced by the index client, the indexer facade and the reconciler.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Failure talking to the search engine (network, HTTP status, malformed body).
    #[error("Backend error: {0}")]
    Backend(String),

    /// The engine accepted the operation but reported failure. `code` is the
    /// engine's machine-readable error code, empty when none was given.
    #[error("Task {task_uid} failed: {message}")]
    TaskFailed {
        task_uid: u64,
        code: String,
        message: String,
    },

    /// The operation was canceled by another task or operator.
    #[error("Task {task_uid} canceled by {}", .canceled_by.map(|c| c.to_string()).unwrap_or_else(|| "unknown".into()))]
    TaskCanceled {
        task_uid: u64,
        canceled_by: Option<u64>,
    },

    /// `wait_for` gave up. The task may still complete later.
    #[error("Task {task_uid} did not finish within {timeout_ms}ms")]
    Timeout { task_uid: u64, timeout_ms: u64 },

    /// The engine returned a status this client does not understand.
    #[error("Task {task_uid} reported unknown status '{status}'")]
    UnknownTaskState { task_uid: u64, status: String },

    /// Engine URL or credentials are missing or invalid.
    #[error("Search engine not configured: {0}")]
    NotConfigured(String),

    /// The system of record has no record with this id.
    #[error("{entity} {id} not found in source of record")]
    RecordNotFound { entity: EntityKind, id: RecordId },

    /// Failure reading from the system of record.
    #[error("Source error: {0}")]
    Source(String),

    /// The projector could not turn a record into a document.
    #[error("Projection error: {0}")]
    Projection(String),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Returns `true` if the engine accepted the operation and then reported an
    /// outcome other than success (failed / canceled / unknown).
    pub fn is_task_outcome(&self) -> bool {
        matches!(
            self,
            Self::TaskFailed { .. } | Self::TaskCanceled { .. } | Self::UnknownTaskState { .. }
        )
    }

    /// Index creation lost a race against another creator.
    pub fn is_index_already_exists(&self) -> bool {
        matches!(self, Self::TaskFailed { code, .. } if code == "index_already_exists")
    }

    /// Returns `true` for a wait timeout (the write may still land).
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canceled_message_names_canceler() {
        let e = SyncError::TaskCanceled {
            task_uid: 7,
            canceled_by: Some(12),
        };
        assert_eq!(e.to_string(), "Task 7 canceled by 12");

        let e = SyncError::TaskCanceled {
            task_uid: 7,
            canceled_by: None,
        };
        assert_eq!(e.to_string(), "Task 7 canceled by unknown");
    }

    #[test]
    fn classification() {
        assert!(SyncError::TaskFailed {
            task_uid: 1,
            code: "internal".into(),
            message: "bad".into()
        }
        .is_task_outcome());
        assert!(SyncError::TaskFailed {
            task_uid: 2,
            code: "index_already_exists".into(),
            message: "index `reports-v3` already exists".into()
        }
        .is_index_already_exists());
        assert!(!SyncError::Backend("index_already_exists".into()).is_index_already_exists());
        assert!(!SyncError::Backend("down".into()).is_task_outcome());
        assert!(SyncError::Timeout {
            task_uid: 1,
            timeout_ms: 10
        }
        .is_timeout());
    }
}
