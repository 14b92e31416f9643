//! Request and result documents for Transfer operations

use serde::{Deserialize, Serialize};

/// How the service decides whether a destination file is already up to date.
/// Sent as the integer level the Transfer API expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(into = "u8")]
pub enum SyncLevel {
    /// Skip files that exist at the destination
    Exists,
    /// Skip files whose size matches
    Size,
    /// Skip files whose modification time is not older than the source
    Mtime,
    /// Skip files whose checksum matches
    Checksum,
}

impl From<SyncLevel> for u8 {
    fn from(level: SyncLevel) -> u8 {
        match level {
            SyncLevel::Exists => 0,
            SyncLevel::Size => 1,
            SyncLevel::Mtime => 2,
            SyncLevel::Checksum => 3,
        }
    }
}

/// Response of `GET /submission_id`
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionId {
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferItem {
    #[serde(rename = "DATA_TYPE")]
    data_type: &'static str,
    pub source_path: String,
    pub destination_path: String,
    pub recursive: bool,
}

/// Body of `POST /transfer`
#[derive(Debug, Clone, Serialize)]
pub struct TransferRequest {
    #[serde(rename = "DATA_TYPE")]
    data_type: &'static str,
    pub submission_id: String,
    pub source_endpoint: String,
    pub destination_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_level: Option<SyncLevel>,
    pub verify_checksum: bool,
    #[serde(rename = "DATA")]
    pub items: Vec<TransferItem>,
}

impl TransferRequest {
    pub fn new(submission_id: String, source_endpoint: &str, destination_endpoint: &str) -> Self {
        Self {
            data_type: "transfer",
            submission_id,
            source_endpoint: source_endpoint.to_string(),
            destination_endpoint: destination_endpoint.to_string(),
            label: None,
            sync_level: None,
            verify_checksum: false,
            items: Vec::new(),
        }
    }

    pub fn add_item(&mut self, source_path: &str, destination_path: &str, recursive: bool) {
        self.items.push(TransferItem {
            data_type: "transfer_item",
            source_path: source_path.to_string(),
            destination_path: destination_path.to_string(),
            recursive,
        });
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteItem {
    #[serde(rename = "DATA_TYPE")]
    data_type: &'static str,
    pub path: String,
}

/// Body of `POST /delete`
#[derive(Debug, Clone, Serialize)]
pub struct DeleteRequest {
    #[serde(rename = "DATA_TYPE")]
    data_type: &'static str,
    pub submission_id: String,
    pub endpoint: String,
    pub recursive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "DATA")]
    pub items: Vec<DeleteItem>,
}

impl DeleteRequest {
    pub fn new(submission_id: String, endpoint: &str, recursive: bool) -> Self {
        Self {
            data_type: "delete",
            submission_id,
            endpoint: endpoint.to_string(),
            recursive,
            label: None,
            items: Vec::new(),
        }
    }

    pub fn add_item(&mut self, path: &str) {
        self.items.push(DeleteItem {
            data_type: "delete_item",
            path: path.to_string(),
        });
    }
}

/// Body of `POST /operation/endpoint/{id}/mkdir`
#[derive(Debug, Clone, Serialize)]
pub struct MkdirRequest {
    #[serde(rename = "DATA_TYPE")]
    data_type: &'static str,
    pub path: String,
}

impl MkdirRequest {
    pub fn new(path: &str) -> Self {
        Self {
            data_type: "mkdir",
            path: path.to_string(),
        }
    }
}

/// Body of `POST /operation/endpoint/{id}/rename`
#[derive(Debug, Clone, Serialize)]
pub struct RenameRequest {
    #[serde(rename = "DATA_TYPE")]
    data_type: &'static str,
    pub old_path: String,
    pub new_path: String,
}

impl RenameRequest {
    pub fn new(old_path: &str, new_path: &str) -> Self {
        Self {
            data_type: "rename",
            old_path: old_path.to_string(),
            new_path: new_path.to_string(),
        }
    }
}

/// Result of a transfer or delete submission
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResult {
    pub task_id: String,
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Generic `result` document returned by mkdir, rename, cancel and
/// autoactivate.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationResult {
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
}
