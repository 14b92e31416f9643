//! Directory listing, flat and recursive

use anyhow::Result;
use std::future::Future;

use super::client::TransferClient;
use super::endpoints::get_endpoint;
use crate::models::Listing;

/// Used when an endpoint has no default directory.
const HOME_DIR: &str = "/~/";

/// Entry found by a recursive listing, named relative to the walk root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub kind: String,
    pub name: String,
}

pub async fn operation_ls(client: &TransferClient, endpoint_id: &str, path: &str) -> Result<Listing> {
    client
        .get(
            &format!("/operation/endpoint/{}/ls", endpoint_id),
            &[("path", path)],
        )
        .await
}

/// Depth-first walk below `root`, descending at most `max_depth` levels.
/// `ls` lists one absolute path.
pub async fn walk<F, Fut>(root: &str, max_depth: usize, mut ls: F) -> Result<Vec<WalkEntry>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Listing>>,
{
    let mut stack = vec![(root.to_string(), String::new(), 0usize)];
    let mut found = Vec::new();

    while let Some((abs_path, rel_path, depth)) = stack.pop() {
        let prefix = if rel_path.is_empty() {
            String::new()
        } else {
            format!("{}/", rel_path)
        };
        let listing = ls(abs_path).await?;

        if depth < max_depth {
            for dir in listing.data.iter().filter(|e| e.is_dir()) {
                stack.push((
                    join_path(&listing.path, &dir.name),
                    format!("{}{}", prefix, dir.name),
                    depth + 1,
                ));
            }
        }

        found.extend(listing.data.into_iter().map(|entry| WalkEntry {
            kind: entry.kind,
            name: format!("{}{}", prefix, entry.name),
        }));
    }

    Ok(found)
}

fn join_path(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Print a directory listing. Without `path` the endpoint's default
/// directory is listed.
pub async fn list_files(
    client: &TransferClient,
    endpoint_id: &str,
    path: Option<String>,
    depth: usize,
) -> Result<()> {
    let path = match path {
        Some(p) => p,
        None => get_endpoint(client, endpoint_id)
            .await?
            .default_directory
            .unwrap_or_else(|| HOME_DIR.to_string()),
    };

    println!("Listing {} on endpoint {}:", path, endpoint_id);

    if depth == 0 {
        let listing = operation_ls(client, endpoint_id, &path).await?;
        if listing.data.is_empty() {
            println!("  (empty)");
        }
        for entry in listing.data {
            match entry.size {
                Some(size) => println!("  {:<5} {:>12}  {}", entry.kind, size, entry.name),
                None => println!("  {:<5} {:>12}  {}", entry.kind, "", entry.name),
            }
        }
        return Ok(());
    }

    let entries = walk(&path, depth, |p| async move {
        operation_ls(client, endpoint_id, &p).await
    })
    .await?;
    tracing::debug!("Recursive listing found {} entries", entries.len());
    for entry in entries {
        println!("  {:<5} {}", entry.kind, entry.name);
    }
    Ok(())
}
