//! Directory listing models

use serde::{Deserialize, Serialize};

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    /// "file", "dir" or "link"
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == "dir"
    }
}

/// Result of listing one directory
#[derive(Debug, Clone, Deserialize)]
pub struct Listing {
    /// Absolute path that was listed, as resolved by the endpoint
    pub path: String,
    #[serde(rename = "DATA", default)]
    pub data: Vec<DirEntry>,
}
