//! Task handles — asynchronous engine operations and their outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an engine task.
///
/// `Enqueued` and `Processing` are non-terminal. Any status string this client
/// does not know is kept verbatim in `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Enqueued,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    Unknown(String),
}

impl TaskStatus {
    /// Statuses a bulk flush may target.
    pub const ALL: [TaskStatus; 5] = [
        Self::Enqueued,
        Self::Processing,
        Self::Succeeded,
        Self::Failed,
        Self::Canceled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Enqueued => "enqueued",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Unknown(s) => s,
        }
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "enqueued" => Self::Enqueued,
            "processing" => Self::Processing,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" => Self::Canceled,
            _ => Self::Unknown(s),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match TaskStatus::from(s.trim().to_ascii_lowercase()) {
            Self::Unknown(other) => Err(format!("unknown task status '{other}'")),
            status => Ok(status),
        }
    }
}

/// Summary returned by every write. Synchronous backends return a handle with
/// no uid whose status is already terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskHandle {
    #[serde(rename = "taskUid", default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_uid: Option<String>,
    pub status: TaskStatus,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enqueued_at: Option<DateTime<Utc>>,
}

impl TaskHandle {
    /// A handle for an operation that completed inline.
    pub fn settled(index_uid: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            uid: None,
            index_uid: Some(index_uid.into()),
            status: TaskStatus::Succeeded,
            kind: kind.into(),
            enqueued_at: None,
        }
    }

    /// Returns `true` if there is nothing to poll for.
    pub fn is_settled(&self) -> bool {
        self.uid.is_none()
    }
}

/// Error object attached to a failed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    pub message: String,
    #[serde(default)]
    pub code: String,
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub link: Option<String>,
}

/// Full task record as returned by task inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub uid: u64,
    #[serde(default)]
    pub index_uid: Option<String>,
    pub status: TaskStatus,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub error: Option<TaskError>,
    #[serde(default)]
    pub canceled_by: Option<u64>,
    #[serde(default)]
    pub enqueued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    /// The task record an already-settled handle stands for.
    pub fn from_settled(handle: &TaskHandle) -> Self {
        Self {
            uid: 0,
            index_uid: handle.index_uid.clone(),
            status: handle.status.clone(),
            kind: handle.kind.clone(),
            error: None,
            canceled_by: None,
            enqueued_at: handle.enqueued_at,
            finished_at: None,
        }
    }
}
