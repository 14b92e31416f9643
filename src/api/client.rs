//! Authenticated HTTP client for the Transfer API
//!
//! Wraps reqwest::Client; every request asks the lifecycle manager for a
//! token first, so stale tokens are refreshed (and saved) before use.

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::{NativeAppAuthClient, TokenLifecycleManager};
use crate::config::Config;

/// Transfer API client authorized by a self-refreshing bearer token.
pub struct TransferClient {
    http: reqwest::Client,
    base_url: String,
    resource_server: String,
    tokens: TokenLifecycleManager<NativeAppAuthClient>,
}

impl TransferClient {
    /// Load stored credentials and build the client.
    pub fn new(config: &Config) -> Result<Self> {
        let auth = NativeAppAuthClient::new(config.client_id()?, &config.auth_base_url)?;
        let tokens = TokenLifecycleManager::open(config.lifecycle()?, auth)?;

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: config.transfer_base_url.trim_end_matches('/').to_string(),
            resource_server: config.transfer_resource_server.clone(),
            tokens,
        })
    }

    async fn bearer(&self) -> Result<String> {
        let record = self.tokens.ensure_valid(&self.resource_server).await?;
        Ok(record.access_token)
    }

    /// GET `path` relative to the API base and decode the JSON body.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let token = self.bearer().await?;
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("Transfer GET {}", url);

        let resp = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Transfer GET {} failed", url))?;

        check_response(resp, &url)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    /// POST `body` as JSON to `path` and decode the JSON response.
    /// `None` sends an empty request body.
    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let token = self.bearer().await?;
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("Transfer POST {}", url);

        let mut request = self.http.post(&url).bearer_auth(&token);
        if let Some(body) = body {
            request = request.json(body);
        }
        let resp = request
            .send()
            .await
            .with_context(|| format!("Transfer POST {} failed", url))?;

        check_response(resp, &url)
            .await?
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    /// Persist any credentials a failed save left in memory only.
    pub fn finish(&self) {
        if let Err(e) = self.tokens.flush() {
            tracing::error!("Failed to save refreshed credentials: {}", e);
            eprintln!(
                "WARNING: refreshed credentials could not be saved ({}). \
                 The next run may require 'gxfer login'.",
                e
            );
        }
    }
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        bail!(
            "401 Unauthorized for {}. Token may be revoked -- run 'gxfer login'.",
            url
        );
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("HTTP {} for {}: {}", status.as_u16(), url, body);
    }
    Ok(resp)
}
