//! Endpoint models

use serde::{Deserialize, Serialize};

/// Transfer endpoint (collection)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub display_name: Option<String>,
    pub default_directory: Option<String>,
}

/// Page of endpoint search results
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointList {
    #[serde(rename = "DATA", default)]
    pub data: Vec<Endpoint>,
}
