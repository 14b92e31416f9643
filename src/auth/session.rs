//! Login, logout and credential status commands

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};

use super::lifecycle::TokenLifecycleManager;
use super::oauth::{authorize_interactive, NativeAppAuthClient};
use super::store::{self, StoreError};
use super::tokens::{Clock, CredentialSet, SystemClock};
use crate::config::Config;

/// Run the interactive authorization and save the resulting credentials.
pub async fn login(config: &Config, force: bool) -> Result<()> {
    let token_file = config.token_file()?;

    if !force {
        match store::load(&token_file) {
            Ok(existing) if !existing.is_empty() => {
                println!(
                    "Already logged in ({} resource server(s) in {}). Use --force to re-authenticate.",
                    existing.len(),
                    token_file.display()
                );
                return Ok(());
            }
            Ok(_) | Err(StoreError::NotFound(_)) => {}
            Err(e) => {
                tracing::warn!("Existing credential file unusable, replacing it: {}", e);
            }
        }
    }

    let client = NativeAppAuthClient::new(config.client_id()?, &config.auth_base_url)?;
    let credentials = authorize_interactive(&client, &config.scopes).await?;

    store::save(&token_file, &credentials).context("Failed to save credentials")?;

    let missing_refresh: Vec<&str> = credentials
        .iter()
        .filter(|(_, r)| r.refresh_token.is_none())
        .map(|(k, _)| k.as_str())
        .collect();
    if !missing_refresh.is_empty() {
        eprintln!(
            "Warning: no refresh token issued for {}; these will need a new login when they expire.",
            missing_refresh.join(", ")
        );
    }

    println!(
        "Login successful. Saved tokens for {} to {}",
        credentials.keys().cloned().collect::<Vec<_>>().join(", "),
        token_file.display()
    );
    Ok(())
}

/// Remove the credential file
pub async fn logout(config: &Config) -> Result<()> {
    let token_file = config.token_file()?;
    if store::remove(&token_file)? {
        println!("Logged out. Removed {}", token_file.display());
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

fn format_expiry(expires_at: u64) -> String {
    i64::try_from(expires_at)
        .ok()
        .and_then(|secs| Local.timestamp_opt(secs, 0).single())
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| "out of range".to_string())
}

fn render_status(credentials: &CredentialSet, now: u64, skew: u64) -> Vec<String> {
    let mut lines = Vec::new();
    for (server, record) in credentials {
        let state = if record.is_fresh(now, skew) {
            "valid"
        } else {
            "needs refresh"
        };
        lines.push(format!("{}:", server));
        lines.push(format!("  access token:  {}", state));
        lines.push(format!(
            "  expires at:    {} ({})",
            record.expires_at,
            format_expiry(record.expires_at)
        ));
        lines.push(format!(
            "  refresh token: {}",
            if record.refresh_token.is_some() {
                "present"
            } else {
                "none"
            }
        ));
    }
    lines
}

/// Display stored credentials without revealing secrets
pub async fn status(config: &Config) -> Result<()> {
    let token_file = config.token_file()?;
    let credentials = match store::load(&token_file) {
        Ok(c) => c,
        Err(StoreError::NotFound(_)) => {
            println!("No credentials stored.");
            println!("\nRun 'gxfer login' to authenticate.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("Credentials in {}:", token_file.display());
    for line in render_status(&credentials, SystemClock.now(), config.skew_secs) {
        println!("{}", line);
    }
    Ok(())
}

/// Print a valid access token for `resource_server`, refreshing it first if needed.
pub async fn print_token(config: &Config, resource_server: &str) -> Result<()> {
    let auth = NativeAppAuthClient::new(config.client_id()?, &config.auth_base_url)?;
    let manager = TokenLifecycleManager::open(config.lifecycle()?, auth)?;

    if let Some(state) = manager.state(resource_server) {
        tracing::debug!("Token for {} is {}", resource_server, state);
    }
    let result = manager.ensure_valid(resource_server).await;
    if manager.has_unsaved_changes() {
        manager
            .flush()
            .context("Refreshed token could not be saved; the next run may require 'gxfer login'")?;
    }

    println!("{}", result?.access_token);
    Ok(())
}
