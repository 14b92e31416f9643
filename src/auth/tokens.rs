//! Token records, credential sets and lifecycle state

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Access/refresh token pair issued for one resource server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Absolute expiry of `access_token`, seconds since the Unix epoch.
    #[serde(rename = "expires_at_seconds")]
    pub expires_at: u64,
    /// Fields written by other tools (scope, token_type, ...), kept as-is.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl TokenRecord {
    pub fn new(access_token: String, refresh_token: Option<String>, expires_at: u64) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at,
            extra: BTreeMap::new(),
        }
    }

    /// Build a record from a relative lifetime as returned by a token endpoint.
    pub fn from_expires_in(
        access_token: String,
        refresh_token: Option<String>,
        expires_in_secs: u64,
        now: u64,
    ) -> Self {
        Self::new(access_token, refresh_token, now.saturating_add(expires_in_secs))
    }

    /// Whether the access token may still be handed out at `now` given `skew`.
    pub fn is_fresh(&self, now: u64, skew: u64) -> bool {
        now < self.expires_at.saturating_sub(skew)
    }
}

/// Resource server identifier -> token record. Unit of persistence.
pub type CredentialSet = BTreeMap<String, TokenRecord>;

/// Per-resource-server state tracked by the lifecycle manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Valid,
    NeedsRefresh,
    Refreshing,
    /// Refresh was rejected; terminal until the user logs in again.
    Failed { reason: String },
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Valid => write!(f, "valid"),
            LifecycleState::NeedsRefresh => write!(f, "needs refresh"),
            LifecycleState::Refreshing => write!(f, "refreshing"),
            LifecycleState::Failed { reason } => write!(f, "failed ({})", reason),
        }
    }
}

/// Source of "now" in epoch seconds.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        // A clock set before 1970 is treated as the epoch itself.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_fresh_respects_skew() {
        let record = TokenRecord::new("a".into(), None, 1_000);
        assert!(record.is_fresh(939, 60));
        assert!(!record.is_fresh(940, 60));
        assert!(!record.is_fresh(1_000, 0));
        assert!(record.is_fresh(999, 0));
    }

    #[test]
    fn test_skew_larger_than_expiry_is_stale() {
        let record = TokenRecord::new("a".into(), None, 30);
        assert!(!record.is_fresh(0, 60));
    }

    #[test]
    fn test_from_expires_in() {
        let record = TokenRecord::from_expires_in("a".into(), Some("r".into()), 3600, 100);
        assert_eq!(record.expires_at, 3700);
        assert_eq!(record.refresh_token.as_deref(), Some("r"));
    }

    #[test]
    fn test_record_json_field_names() {
        let record = TokenRecord::new("a1".into(), Some("r1".into()), 42);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"access_token": "a1", "refresh_token": "r1", "expires_at_seconds": 42})
        );
    }

    #[test]
    fn test_record_without_refresh_token() {
        let record: TokenRecord =
            serde_json::from_str(r#"{"access_token":"a","expires_at_seconds":5}"#).unwrap();
        assert!(record.refresh_token.is_none());
        let out = serde_json::to_string(&record).unwrap();
        assert!(!out.contains("refresh_token"));
    }

    #[test]
    fn test_extra_fields_preserved() {
        let input = r#"{"access_token":"a","expires_at_seconds":5,"scope":"all","token_type":"Bearer"}"#;
        let record: TokenRecord = serde_json::from_str(input).unwrap();
        assert_eq!(record.extra.get("scope"), Some(&serde_json::json!("all")));
        let back: TokenRecord =
            serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_state_display() {
        let failed = LifecycleState::Failed {
            reason: "invalid_grant".into(),
        };
        assert_eq!(failed.to_string(), "failed (invalid_grant)");
        assert_eq!(LifecycleState::NeedsRefresh.to_string(), "needs refresh");
    }
}
