//! Transfer API operations
//!
//! Calls against the Transfer service, each authorized through the token
//! lifecycle manager.

pub mod client;
mod endpoints;
mod ls;
mod operations;
pub mod poll;
mod task;

use anyhow::Result;
use std::time::Duration;

pub use client::TransferClient;
pub use operations::TransferOptions;

/// List the user's own endpoints
pub async fn list_endpoints(client: &TransferClient) -> Result<()> {
    endpoints::list_endpoints(client).await
}

/// List a directory, recursing `depth` levels
pub async fn list_files(
    client: &TransferClient,
    endpoint_id: &str,
    path: Option<String>,
    depth: usize,
) -> Result<()> {
    ls::list_files(client, endpoint_id, path, depth).await
}

/// Show a task, optionally waiting for it to finish
pub async fn show_task(
    client: &TransferClient,
    task_id: &str,
    wait: Option<Duration>,
    interval: Duration,
) -> Result<bool> {
    task::show_task(client, task_id, wait, interval).await
}

/// Activate an endpoint with cached or automatic credentials
pub async fn activate_endpoint(client: &TransferClient, endpoint_id: &str) -> Result<()> {
    let result = operations::autoactivate(client, endpoint_id).await?;
    operations::print_result("Activation", &result);
    Ok(())
}

/// Create a directory on an endpoint
pub async fn make_dir(client: &TransferClient, endpoint_id: &str, path: &str) -> Result<()> {
    let result = operations::mkdir(client, endpoint_id, path).await?;
    operations::print_result("mkdir", &result);
    Ok(())
}

/// Rename a file or directory on an endpoint
pub async fn rename_path(
    client: &TransferClient,
    endpoint_id: &str,
    old_path: &str,
    new_path: &str,
) -> Result<()> {
    let result = operations::rename(client, endpoint_id, old_path, new_path).await?;
    operations::print_result("rename", &result);
    Ok(())
}

/// Submit a transfer task. Returns its task id.
pub async fn transfer(
    client: &TransferClient,
    source_endpoint: &str,
    destination_endpoint: &str,
    items: &[(String, String)],
    options: &TransferOptions,
) -> Result<String> {
    let result = operations::submit_transfer(
        client,
        source_endpoint,
        destination_endpoint,
        items,
        options,
    )
    .await?;
    operations::print_submitted("Transfer", &result);
    Ok(result.task_id)
}

/// Submit a delete task. Returns its task id.
pub async fn delete(
    client: &TransferClient,
    endpoint_id: &str,
    paths: &[String],
    recursive: bool,
    label: Option<String>,
) -> Result<String> {
    let result = operations::submit_delete(client, endpoint_id, paths, recursive, label).await?;
    operations::print_submitted("Delete", &result);
    Ok(result.task_id)
}

/// Ask the service to cancel a task
pub async fn cancel_task(client: &TransferClient, task_id: &str) -> Result<()> {
    let result = operations::cancel_task(client, task_id).await?;
    operations::print_result("Cancel", &result);
    Ok(())
}
