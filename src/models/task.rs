//! Task models

use serde::{Deserialize, Serialize};

/// Asynchronous transfer or delete task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// ACTIVE, INACTIVE, SUCCEEDED or FAILED
    pub status: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub nice_status: Option<String>,
    #[serde(default)]
    pub files: Option<u64>,
    #[serde(default)]
    pub files_transferred: Option<u64>,
}

impl Task {
    pub fn is_finished(&self) -> bool {
        matches!(self.status.as_str(), "SUCCEEDED" | "FAILED")
    }
}
