//! Task status and waiting

use anyhow::Result;
use std::time::Duration;

use super::client::TransferClient;
use super::poll::poll_until;
use crate::models::Task;

pub async fn get_task(client: &TransferClient, task_id: &str) -> Result<Task> {
    client.get(&format!("/task/{}", task_id), &[]).await
}

/// Wait until the task finishes or `timeout` elapses. Returns whether it finished.
pub async fn task_wait(
    client: &TransferClient,
    task_id: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<bool> {
    poll_until(interval, timeout, || async {
        let task = get_task(client, task_id).await?;
        tracing::debug!("Task {} status: {}", task_id, task.status);
        Ok::<_, anyhow::Error>(task.is_finished())
    })
    .await
}

fn print_task(task: &Task) {
    println!("Task {}", task.task_id);
    println!("  type:   {}", task.kind.as_deref().unwrap_or("-"));
    if let Some(label) = task.label.as_deref().filter(|l| !l.is_empty()) {
        println!("  label:  {}", label);
    }
    println!("  status: {}", task.status);
    if let Some(nice) = &task.nice_status {
        println!("  detail: {}", nice);
    }
    if let (Some(done), Some(total)) = (task.files_transferred, task.files) {
        println!("  files:  {}/{}", done, total);
    }
}

/// Print a task, optionally waiting for it first. Returns false if the wait
/// timed out.
pub async fn show_task(
    client: &TransferClient,
    task_id: &str,
    wait: Option<Duration>,
    interval: Duration,
) -> Result<bool> {
    let finished = match wait {
        Some(timeout) => {
            println!(
                "Waiting for task {} (timeout: {}s, polling interval: {}s)",
                task_id,
                timeout.as_secs(),
                interval.as_secs()
            );
            let done = task_wait(client, task_id, timeout, interval).await?;
            if !done {
                println!("Task did not complete.");
            }
            done
        }
        None => true,
    };

    print_task(&get_task(client, task_id).await?);
    Ok(finished)
}
