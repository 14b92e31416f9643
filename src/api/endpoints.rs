//! Endpoint lookup

use anyhow::Result;

use super::client::TransferClient;
use crate::models::{Endpoint, EndpointList};

/// Endpoints owned by the authorized user.
pub async fn search_my_endpoints(client: &TransferClient) -> Result<Vec<Endpoint>> {
    let list: EndpointList = client
        .get("/endpoint_search", &[("filter_scope", "my-endpoints")])
        .await?;
    Ok(list.data)
}

pub async fn get_endpoint(client: &TransferClient, endpoint_id: &str) -> Result<Endpoint> {
    client.get(&format!("/endpoint/{}", endpoint_id), &[]).await
}

/// Print the user's endpoints
pub async fn list_endpoints(client: &TransferClient) -> Result<()> {
    let endpoints = search_my_endpoints(client).await?;

    if endpoints.is_empty() {
        println!("No endpoints found.");
        return Ok(());
    }

    println!("My Endpoints:");
    for ep in endpoints {
        println!(
            "[{}] {}  default dir: {}",
            ep.id,
            ep.display_name.as_deref().unwrap_or("(unnamed)"),
            ep.default_directory.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
