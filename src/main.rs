//! gxfer - Lightweight Globus Transfer client
//!
//! Keeps OAuth2 credentials in a local file and refreshes them
//! transparently before each authorized call.

mod api;
mod auth;
mod config;
mod models;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::fmt::{self, format, MakeWriter};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::models::SyncLevel;

#[derive(Parser)]
#[command(name = "gxfer")]
#[command(about = "Lightweight CLI client for Globus Transfer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured client ID
    #[arg(long, global = true)]
    client_id: Option<String>,

    /// Override the configured credential file
    #[arg(long, global = true)]
    token_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize this client and store tokens
    Login {
        /// Re-authorize even if a credential file exists
        #[arg(short, long)]
        force: bool,
    },

    /// Remove stored credentials
    Logout,

    /// Show stored credentials and their expiry
    Status,

    /// Print a valid access token, refreshing it if needed
    Token {
        /// Resource server, e.g. transfer.api.globus.org
        resource_server: String,
    },

    /// List your endpoints
    Endpoints,

    /// List files on an endpoint
    Ls {
        /// Endpoint ID
        endpoint: String,

        /// Directory to list (defaults to the endpoint's default directory)
        #[arg(short, long)]
        path: Option<String>,

        /// Recurse into subdirectories up to this depth
        #[arg(short, long, default_value = "0")]
        depth: usize,
    },

    /// Activate an endpoint using cached credentials
    Activate {
        /// Endpoint ID
        endpoint: String,
    },

    /// Create a directory on an endpoint
    Mkdir {
        /// Endpoint ID
        endpoint: String,

        /// Directory to create
        path: String,
    },

    /// Rename a file or directory on an endpoint
    Rename {
        /// Endpoint ID
        endpoint: String,

        old_path: String,

        new_path: String,
    },

    /// Submit a transfer between two endpoints
    Transfer {
        /// Source endpoint ID
        source: String,

        /// Destination endpoint ID
        destination: String,

        /// Source and destination path of one item (repeatable)
        #[arg(long = "item", num_args = 2, value_names = ["SRC", "DST"], required = true)]
        items: Vec<String>,

        /// Task label
        #[arg(short, long)]
        label: Option<String>,

        /// Skip files already up to date at the destination
        #[arg(long, value_enum)]
        sync_level: Option<SyncLevel>,

        /// Verify checksums after transfer
        #[arg(long)]
        verify_checksum: bool,

        /// Transfer directories recursively
        #[arg(short, long)]
        recursive: bool,

        /// Wait up to this many seconds for the task to finish
        #[arg(short, long)]
        wait: Option<u64>,
    },

    /// Submit a delete task on an endpoint
    Delete {
        /// Endpoint ID
        endpoint: String,

        /// Paths to delete
        #[arg(required = true)]
        paths: Vec<String>,

        /// Delete directories recursively
        #[arg(short, long)]
        recursive: bool,

        /// Task label
        #[arg(short, long)]
        label: Option<String>,

        /// Wait up to this many seconds for the task to finish
        #[arg(short, long)]
        wait: Option<u64>,
    },

    /// Cancel a task
    Cancel {
        /// Task ID
        task_id: String,
    },

    /// Show a task's status
    Task {
        /// Task ID
        task_id: String,

        /// Wait up to this many seconds for the task to finish
        #[arg(short, long)]
        wait: Option<u64>,

        /// Polling interval in seconds while waiting
        #[arg(short, long, default_value = "2")]
        interval: u64,
    },
}

/// Log output goes to stderr; stdout carries command output such as tokens.
const LOG_WRITER: fn() -> std::io::Stderr = std::io::stderr;

fn log_layer<S, W>(writer: W) -> fmt::Layer<S, format::DefaultFields, format::Format, W>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    fmt::layer().with_target(false).with_writer(writer)
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(log_layer(LOG_WRITER))
        .init();
}

/// Pair up the flat `--item SRC DST` values.
fn item_pairs(values: &[String]) -> Vec<(String, String)> {
    values
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect()
}

/// Optionally wait for a just-submitted task, then show it.
async fn follow_task(client: &api::TransferClient, task_id: &str, wait: Option<u64>) -> Result<()> {
    let Some(secs) = wait else {
        println!("Run 'gxfer task {}' to check its progress.", task_id);
        return Ok(());
    };
    let finished = api::show_task(
        client,
        task_id,
        Some(Duration::from_secs(secs)),
        Duration::from_secs(2),
    )
    .await?;
    if !finished {
        bail!("Task {} did not finish within {}s", task_id, secs);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(client_id) = cli.client_id {
        config.client_id = Some(client_id);
    }
    if let Some(token_file) = cli.token_file {
        config.token_file = Some(token_file);
    }

    match cli.command {
        Commands::Login { force } => {
            tracing::info!("Starting authentication flow...");
            auth::login(&config, force).await?;
        }
        Commands::Logout => {
            auth::logout(&config).await?;
        }
        Commands::Status => {
            auth::status(&config).await?;
        }
        Commands::Token { resource_server } => {
            auth::print_token(&config, &resource_server).await?;
        }
        Commands::Endpoints => {
            let client = api::TransferClient::new(&config)?;
            let result = api::list_endpoints(&client).await;
            client.finish();
            result?;
        }
        Commands::Ls {
            endpoint,
            path,
            depth,
        } => {
            let client = api::TransferClient::new(&config)?;
            let result = api::list_files(&client, &endpoint, path, depth).await;
            client.finish();
            result?;
        }
        Commands::Activate { endpoint } => {
            let client = api::TransferClient::new(&config)?;
            let result = api::activate_endpoint(&client, &endpoint).await;
            client.finish();
            result?;
        }
        Commands::Mkdir { endpoint, path } => {
            let client = api::TransferClient::new(&config)?;
            let result = api::make_dir(&client, &endpoint, &path).await;
            client.finish();
            result?;
        }
        Commands::Rename {
            endpoint,
            old_path,
            new_path,
        } => {
            let client = api::TransferClient::new(&config)?;
            let result = api::rename_path(&client, &endpoint, &old_path, &new_path).await;
            client.finish();
            result?;
        }
        Commands::Transfer {
            source,
            destination,
            items,
            label,
            sync_level,
            verify_checksum,
            recursive,
            wait,
        } => {
            let options = api::TransferOptions {
                label,
                sync_level,
                verify_checksum,
                recursive,
            };
            let client = api::TransferClient::new(&config)?;
            let result = async {
                let task_id =
                    api::transfer(&client, &source, &destination, &item_pairs(&items), &options)
                        .await?;
                follow_task(&client, &task_id, wait).await
            }
            .await;
            client.finish();
            result?;
        }
        Commands::Delete {
            endpoint,
            paths,
            recursive,
            label,
            wait,
        } => {
            let client = api::TransferClient::new(&config)?;
            let result = async {
                let task_id = api::delete(&client, &endpoint, &paths, recursive, label).await?;
                follow_task(&client, &task_id, wait).await
            }
            .await;
            client.finish();
            result?;
        }
        Commands::Cancel { task_id } => {
            let client = api::TransferClient::new(&config)?;
            let result = api::cancel_task(&client, &task_id).await;
            client.finish();
            result?;
        }
        Commands::Task {
            task_id,
            wait,
            interval,
        } => {
            let client = api::TransferClient::new(&config)?;
            let result = api::show_task(
                &client,
                &task_id,
                wait.map(Duration::from_secs),
                Duration::from_secs(interval.max(1)),
            )
            .await;
            client.finish();
            if !result? {
                bail!("Task {} did not finish within {}s", task_id, wait.unwrap_or(0));
            }
        }
    }

    Ok(())
}
