//! Endpoint activation, filesystem operations and task submission

use anyhow::Result;

use super::client::TransferClient;
use crate::models::{
    DeleteRequest, MkdirRequest, OperationResult, RenameRequest, SubmissionId, SubmitResult,
    SyncLevel, TransferRequest,
};

/// Options for a transfer submission
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    pub label: Option<String>,
    pub sync_level: Option<SyncLevel>,
    pub verify_checksum: bool,
    pub recursive: bool,
}

pub async fn autoactivate(client: &TransferClient, endpoint_id: &str) -> Result<OperationResult> {
    client
        .post::<(), _>(&format!("/endpoint/{}/autoactivate", endpoint_id), None)
        .await
}

pub async fn mkdir(client: &TransferClient, endpoint_id: &str, path: &str) -> Result<OperationResult> {
    client
        .post(
            &format!("/operation/endpoint/{}/mkdir", endpoint_id),
            Some(&MkdirRequest::new(path)),
        )
        .await
}

pub async fn rename(
    client: &TransferClient,
    endpoint_id: &str,
    old_path: &str,
    new_path: &str,
) -> Result<OperationResult> {
    client
        .post(
            &format!("/operation/endpoint/{}/rename", endpoint_id),
            Some(&RenameRequest::new(old_path, new_path)),
        )
        .await
}

/// Each submission needs a fresh id so a retried POST is not run twice.
async fn submission_id(client: &TransferClient) -> Result<String> {
    let id: SubmissionId = client.get("/submission_id", &[]).await?;
    Ok(id.value)
}

pub fn transfer_request(
    submission_id: String,
    source_endpoint: &str,
    destination_endpoint: &str,
    items: &[(String, String)],
    options: &TransferOptions,
) -> TransferRequest {
    let mut request = TransferRequest::new(submission_id, source_endpoint, destination_endpoint);
    request.label = options.label.clone();
    request.sync_level = options.sync_level;
    request.verify_checksum = options.verify_checksum;
    for (source, destination) in items {
        request.add_item(source, destination, options.recursive);
    }
    request
}

pub async fn submit_transfer(
    client: &TransferClient,
    source_endpoint: &str,
    destination_endpoint: &str,
    items: &[(String, String)],
    options: &TransferOptions,
) -> Result<SubmitResult> {
    let request = transfer_request(
        submission_id(client).await?,
        source_endpoint,
        destination_endpoint,
        items,
        options,
    );
    tracing::debug!(
        "Submitting transfer of {} item(s) from {} to {}",
        request.items.len(),
        source_endpoint,
        destination_endpoint
    );
    client.post("/transfer", Some(&request)).await
}

pub fn delete_request(
    submission_id: String,
    endpoint_id: &str,
    paths: &[String],
    recursive: bool,
    label: Option<String>,
) -> DeleteRequest {
    let mut request = DeleteRequest::new(submission_id, endpoint_id, recursive);
    request.label = label;
    for path in paths {
        request.add_item(path);
    }
    request
}

pub async fn submit_delete(
    client: &TransferClient,
    endpoint_id: &str,
    paths: &[String],
    recursive: bool,
    label: Option<String>,
) -> Result<SubmitResult> {
    let request = delete_request(submission_id(client).await?, endpoint_id, paths, recursive, label);
    tracing::debug!("Submitting delete of {} path(s) on {}", paths.len(), endpoint_id);
    client.post("/delete", Some(&request)).await
}

pub async fn cancel_task(client: &TransferClient, task_id: &str) -> Result<OperationResult> {
    client
        .post::<(), _>(&format!("/task/{}/cancel", task_id), None)
        .await
}

pub fn print_result(what: &str, result: &OperationResult) {
    match result.message.as_deref() {
        Some(message) => println!("{}: {} ({})", what, result.code, message),
        None => println!("{}: {}", what, result.code),
    }
}

pub fn print_submitted(what: &str, result: &SubmitResult) {
    println!("{} submitted: {}", what, result.code);
    if let Some(message) = &result.message {
        println!("  {}", message);
    }
    println!("Task ID: {}", result.task_id);
}
