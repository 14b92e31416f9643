//! OAuth2 native-app flow against Globus Auth
//!
//! Provides the refresh exchange used by the lifecycle manager and the
//! interactive authorization-code login that seeds the credential file.

use std::future::Future;

use anyhow::{bail, Context, Result};
use oauth2::basic::{
    BasicErrorResponse, BasicErrorResponseType, BasicRevocationErrorResponse,
    BasicTokenIntrospectionResponse, BasicTokenType,
};
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, Client, ClientId, CsrfToken, ExtraTokenFields,
    PkceCodeChallenge, RedirectUrl, RefreshToken, RequestTokenError, Scope,
    StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::tokens::{Clock, CredentialSet, SystemClock, TokenRecord};

/// Redirect target for native apps; Globus shows the code to paste back.
const NATIVE_APP_REDIRECT: &str = "https://auth.globus.org/v2/web/auth-code";

/// Why a refresh exchange did not produce a token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// The authorization server rejected the refresh token.
    #[error("refresh rejected: {0}")]
    Denied(String),
    /// Network or server trouble; the same refresh token may work later.
    #[error("refresh failed: {0}")]
    Transient(String),
}

/// External token endpoint capability.
pub trait AuthorizationService: Send + Sync + 'static {
    /// Exchange `refresh_token` for a new token record.
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenRecord, RefreshError>> + Send;
}

/// Globus-specific token response fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobusTokenFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_server: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_tokens: Vec<OtherToken>,
}

impl ExtraTokenFields for GlobusTokenFields {}

/// Additional token for another resource server, returned alongside the primary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtherToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    pub resource_server: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

type GlobusTokenResponse = StandardTokenResponse<GlobusTokenFields, BasicTokenType>;

type GlobusClient = Client<
    BasicErrorResponse,
    GlobusTokenResponse,
    BasicTokenType,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
>;

type TokenRequestError =
    RequestTokenError<oauth2::reqwest::Error<reqwest::Error>, BasicErrorResponse>;

/// Public (secretless) OAuth2 client for a registered native app.
pub struct NativeAppAuthClient {
    client: GlobusClient,
}

impl NativeAppAuthClient {
    pub fn new(client_id: &str, auth_base_url: &str) -> Result<Self> {
        let base = auth_base_url.trim_end_matches('/');
        let auth_url = AuthUrl::new(format!("{}/v2/oauth2/authorize", base))?;
        let token_url = TokenUrl::new(format!("{}/v2/oauth2/token", base))?;

        let client = GlobusClient::new(
            ClientId::new(client_id.to_string()),
            None,
            auth_url,
            Some(token_url),
        )
        .set_auth_type(AuthType::RequestBody)
        .set_redirect_uri(RedirectUrl::new(NATIVE_APP_REDIRECT.to_string())?);

        Ok(Self { client })
    }
}

impl AuthorizationService for NativeAppAuthClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenRecord, RefreshError> {
        tracing::info!("Refreshing access token...");

        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(oauth2::reqwest::async_http_client)
            .await
            .map_err(classify_refresh_error)?;

        let expires_in = response
            .expires_in()
            .ok_or_else(|| RefreshError::Transient("token response has no expires_in".into()))?;

        let mut record = TokenRecord::from_expires_in(
            response.access_token().secret().to_string(),
            response.refresh_token().map(|t| t.secret().to_string()),
            expires_in.as_secs(),
            SystemClock.now(),
        );
        if let Some(scopes) = response.scopes() {
            record.extra.insert("scope".into(), scope_value(scopes));
        }
        Ok(record)
    }
}

/// A server answer is a rejection; anything else may go away on retry.
fn classify_refresh_error(err: TokenRequestError) -> RefreshError {
    match err {
        RequestTokenError::ServerResponse(resp) => {
            if *resp.error() == BasicErrorResponseType::InvalidGrant {
                tracing::warn!("Refresh token is invalid, expired or revoked");
            }
            RefreshError::Denied(resp.to_string())
        }
        RequestTokenError::Request(e) => RefreshError::Transient(e.to_string()),
        RequestTokenError::Parse(e, _) => {
            RefreshError::Transient(format!("unreadable token response: {}", e))
        }
        RequestTokenError::Other(msg) => RefreshError::Transient(msg),
    }
}

fn scope_value(scopes: &[Scope]) -> serde_json::Value {
    let joined = scopes
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    serde_json::Value::String(joined)
}

/// Split a token response into one record per resource server.
fn by_resource_server(response: &GlobusTokenResponse, now: u64) -> Result<CredentialSet> {
    let extra = response.extra_fields();
    let primary_server = extra
        .resource_server
        .clone()
        .context("Token response did not name its resource server")?;

    // Without a lifetime the token would be saved as already expired
    let expires_in = response
        .expires_in()
        .map(|d| d.as_secs())
        .filter(|secs| *secs > 0)
        .with_context(|| {
            format!(
                "Token response for {} did not include expires_in",
                primary_server
            )
        })?;

    let mut credentials = CredentialSet::new();

    let mut primary = TokenRecord::from_expires_in(
        response.access_token().secret().to_string(),
        response.refresh_token().map(|t| t.secret().to_string()),
        expires_in,
        now,
    );
    if let Some(scopes) = response.scopes() {
        primary.extra.insert("scope".into(), scope_value(scopes));
    }
    credentials.insert(primary_server, primary);

    for other in &extra.other_tokens {
        if other.expires_in == 0 {
            bail!(
                "Token response for {} did not include expires_in",
                other.resource_server
            );
        }
        let mut record = TokenRecord::from_expires_in(
            other.access_token.clone(),
            other.refresh_token.clone(),
            other.expires_in,
            now,
        );
        if let Some(scope) = &other.scope {
            record.extra.insert("scope".into(), scope.clone().into());
        }
        if let Some(token_type) = &other.token_type {
            record
                .extra
                .insert("token_type".into(), token_type.clone().into());
        }
        credentials.insert(other.resource_server.clone(), record);
    }

    Ok(credentials)
}

/// Interactive authorization-code login with PKCE. Returns tokens keyed by
/// resource server, including refresh tokens.
pub async fn authorize_interactive(
    client: &NativeAppAuthClient,
    scopes: &[String],
) -> Result<CredentialSet> {
    let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();

    let mut request = client
        .client
        .authorize_url(CsrfToken::new_random)
        .set_pkce_challenge(challenge)
        .add_extra_param("access_type", "offline");
    for scope in scopes {
        request = request.add_scope(Scope::new(scope.clone()));
    }
    let (authorize_url, _state) = request.url();

    println!();
    println!("Please go to this URL and login:");
    println!("  {}", authorize_url);
    println!();
    print!("Please enter the code you get after login here: ");
    std::io::Write::flush(&mut std::io::stdout()).context("Failed to flush stdout")?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read authorization code")?;
    let code = line.trim();
    if code.is_empty() {
        bail!("No authorization code entered");
    }

    tracing::info!("Exchanging authorization code for tokens...");
    let response = client
        .client
        .exchange_code(AuthorizationCode::new(code.to_string()))
        .set_pkce_verifier(verifier)
        .request_async(oauth2::reqwest::async_http_client)
        .await
        .map_err(|e| anyhow::anyhow!(classify_refresh_error(e)))
        .context("Failed to exchange authorization code for tokens")?;

    by_resource_server(&response, SystemClock.now())
}
