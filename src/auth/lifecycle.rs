//! Token lifecycle management
//!
//! Hands out access tokens that are valid at hand-off time. When the held
//! token for a resource server is within `skew` of its expiry, the refresh
//! token is exchanged for a new record, the whole credential set is written
//! back to disk, and only then is the new token returned.
//!
//! Refreshes are serialized per resource server: concurrent callers wait
//! for the in-flight exchange instead of issuing their own. The exchange and
//! the save run in a spawned task, so a caller that stops waiting cannot
//! leave a refresh half applied.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use super::oauth::{AuthorizationService, RefreshError};
use super::store::{self, StoreError};
use super::tokens::{Clock, CredentialSet, LifecycleState, SystemClock, TokenRecord};

/// Refresh this many seconds before the literal expiry by default.
pub const DEFAULT_SKEW_SECS: u64 = 60;

/// Settings for a [`TokenLifecycleManager`].
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Credential file that every refresh is persisted to.
    pub token_file: PathBuf,
    /// Safety margin subtracted from `expires_at`.
    pub skew_secs: u64,
}

impl LifecycleConfig {
    pub fn new(token_file: PathBuf) -> Self {
        Self {
            token_file,
            skew_secs: DEFAULT_SKEW_SECS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("no credentials stored for '{0}'; run 'gxfer login' to authorize")]
    UnknownResourceServer(String),

    #[error(
        "access token for '{0}' has expired and no refresh token is stored; \
         run 'gxfer login' to re-authorize"
    )]
    MissingRefreshToken(String),

    #[error("refresh for '{resource_server}' was denied ({reason}); run 'gxfer login' to re-authorize")]
    RefreshDenied {
        resource_server: String,
        reason: String,
    },

    #[error("refresh for '{resource_server}' failed, try again later: {reason}")]
    TransientRefresh {
        resource_server: String,
        reason: String,
    },

    #[error("refresh task for '{0}' did not complete")]
    RefreshAborted(String),
}

#[derive(Default)]
struct Cache {
    credentials: CredentialSet,
    refreshing: HashSet<String>,
    denied: HashMap<String, String>,
    /// In-memory credentials differ from the file after a failed save.
    unsaved: bool,
}

struct Shared<A, C> {
    config: LifecycleConfig,
    auth: A,
    clock: C,
    cache: Mutex<Cache>,
    flights: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Keeps the access tokens of a credential set usable and durable.
pub struct TokenLifecycleManager<A, C = SystemClock> {
    shared: Arc<Shared<A, C>>,
}

impl<A, C> Clone for TokenLifecycleManager<A, C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<A: AuthorizationService> TokenLifecycleManager<A, SystemClock> {
    /// Load the credential file named by `config` and manage it.
    pub fn open(config: LifecycleConfig, auth: A) -> Result<Self, StoreError> {
        let credentials = store::load(&config.token_file)?;
        Ok(Self::new(config, credentials, auth, SystemClock))
    }
}

impl<A: AuthorizationService, C: Clock> TokenLifecycleManager<A, C> {
    pub fn new(config: LifecycleConfig, credentials: CredentialSet, auth: A, clock: C) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                auth,
                clock,
                cache: Mutex::new(Cache {
                    credentials,
                    ..Cache::default()
                }),
                flights: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Return a record whose access token is usable right now, refreshing
    /// and persisting first if needed.
    pub async fn ensure_valid(&self, resource_server: &str) -> Result<TokenRecord, LifecycleError> {
        if let Some(record) = self.shared.fresh_record(resource_server)? {
            return Ok(record);
        }

        let flight = self.shared.flight(resource_server);
        let guard = flight.lock_owned().await;

        // Another caller may have finished a refresh while we waited
        if let Some(record) = self.shared.fresh_record(resource_server)? {
            return Ok(record);
        }

        let refresh_token = self.shared.begin_refresh(resource_server)?;

        let shared = Arc::clone(&self.shared);
        let id = resource_server.to_string();
        let task = tokio::spawn(async move {
            let _guard = guard;
            shared.refresh(&id, &refresh_token).await
        });

        task.await
            .map_err(|_| LifecycleError::RefreshAborted(resource_server.to_string()))?
    }

    /// Retry persisting after an earlier save failure.
    pub fn flush(&self) -> Result<(), StoreError> {
        let mut cache = self.shared.cache();
        if !cache.unsaved {
            return Ok(());
        }
        store::save(&self.shared.config.token_file, &cache.credentials)?;
        cache.unsaved = false;
        tracing::info!(
            "Credentials saved to {}",
            self.shared.config.token_file.display()
        );
        Ok(())
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.shared.cache().unsaved
    }

    /// Current state for `resource_server`, or `None` if nothing is stored for it.
    pub fn state(&self, resource_server: &str) -> Option<LifecycleState> {
        let cache = self.shared.cache();
        if let Some(reason) = cache.denied.get(resource_server) {
            return Some(LifecycleState::Failed {
                reason: reason.clone(),
            });
        }
        if cache.refreshing.contains(resource_server) {
            return Some(LifecycleState::Refreshing);
        }
        let record = cache.credentials.get(resource_server)?;
        if record.is_fresh(self.shared.clock.now(), self.shared.config.skew_secs) {
            Some(LifecycleState::Valid)
        } else {
            Some(LifecycleState::NeedsRefresh)
        }
    }
}

impl<A: AuthorizationService, C: Clock> Shared<A, C> {
    fn cache(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn flight(&self, resource_server: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(flights.entry(resource_server.to_string()).or_default())
    }

    /// `Some` if the cached record can be used as-is, `None` if it needs a refresh.
    fn fresh_record(&self, resource_server: &str) -> Result<Option<TokenRecord>, LifecycleError> {
        let cache = self.cache();
        if let Some(reason) = cache.denied.get(resource_server) {
            return Err(LifecycleError::RefreshDenied {
                resource_server: resource_server.to_string(),
                reason: reason.clone(),
            });
        }
        let record = cache
            .credentials
            .get(resource_server)
            .ok_or_else(|| LifecycleError::UnknownResourceServer(resource_server.to_string()))?;

        if record.is_fresh(self.clock.now(), self.config.skew_secs) {
            Ok(Some(record.clone()))
        } else {
            Ok(None)
        }
    }

    fn begin_refresh(&self, resource_server: &str) -> Result<String, LifecycleError> {
        let mut cache = self.cache();
        let refresh_token = cache
            .credentials
            .get(resource_server)
            .and_then(|r| r.refresh_token.clone())
            .ok_or_else(|| LifecycleError::MissingRefreshToken(resource_server.to_string()))?;
        cache.refreshing.insert(resource_server.to_string());
        Ok(refresh_token)
    }

    async fn refresh(
        &self,
        resource_server: &str,
        refresh_token: &str,
    ) -> Result<TokenRecord, LifecycleError> {
        tracing::debug!("Access token for {} is stale, refreshing", resource_server);
        let outcome = self.auth.refresh(refresh_token).await;

        let mut cache = self.cache();
        cache.refreshing.remove(resource_server);

        let mut record = match outcome {
            Ok(record) => record,
            Err(RefreshError::Denied(reason)) => {
                tracing::error!("Refresh for {} denied: {}", resource_server, reason);
                cache
                    .denied
                    .insert(resource_server.to_string(), reason.clone());
                return Err(LifecycleError::RefreshDenied {
                    resource_server: resource_server.to_string(),
                    reason,
                });
            }
            Err(RefreshError::Transient(reason)) => {
                tracing::warn!("Refresh for {} failed: {}", resource_server, reason);
                return Err(LifecycleError::TransientRefresh {
                    resource_server: resource_server.to_string(),
                    reason,
                });
            }
        };

        // A token that is already inside the skew window would be refreshed
        // again on the next call, so it is not accepted
        if !record.is_fresh(self.clock.now(), self.config.skew_secs) {
            tracing::warn!(
                "Refresh for {} returned a token expiring at {}, inside the {}s margin",
                resource_server,
                record.expires_at,
                self.config.skew_secs
            );
            return Err(LifecycleError::TransientRefresh {
                resource_server: resource_server.to_string(),
                reason: "authorization service returned a token that is expired or about to expire"
                    .into(),
            });
        }

        // Servers that do not rotate refresh tokens omit them from the response
        if record.refresh_token.is_none() {
            record.refresh_token = Some(refresh_token.to_string());
        }

        if let Some(previous) = cache.credentials.get(resource_server) {
            for (key, value) in &previous.extra {
                record
                    .extra
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }

        if let Err(e) = self.on_refresh(&mut cache, resource_server, record.clone()) {
            tracing::error!(
                "Refreshed token for {} could not be saved, it will be lost on exit: {}",
                resource_server,
                e
            );
        }
        Ok(record)
    }

    /// Refresh hook: install the new record and save the whole set before
    /// the record is handed to anyone. Runs under the cache lock so saves
    /// land in the order the records changed.
    fn on_refresh(
        &self,
        cache: &mut Cache,
        resource_server: &str,
        record: TokenRecord,
    ) -> Result<(), StoreError> {
        let expires_at = record.expires_at;
        cache
            .credentials
            .insert(resource_server.to_string(), record);
        cache.denied.remove(resource_server);

        match store::save(&self.config.token_file, &cache.credentials) {
            Ok(()) => {
                cache.unsaved = false;
                tracing::info!(
                    "Token for {} refreshed, expires at {}",
                    resource_server,
                    expires_at
                );
                Ok(())
            }
            Err(e) => {
                cache.unsaved = true;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tokens::test_clock::ManualClock;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const NOW: u64 = 1_700_000_000;

    /// Authorization service answering from a script.
    #[derive(Clone, Default)]
    struct StubAuth {
        inner: Arc<StubInner>,
    }

    #[derive(Default)]
    struct StubInner {
        responses: Mutex<VecDeque<Result<TokenRecord, RefreshError>>>,
        seen: Mutex<Vec<String>>,
        calls: AtomicUsize,
        delay: Mutex<Option<Duration>>,
    }

    impl StubAuth {
        fn answering(responses: Vec<Result<TokenRecord, RefreshError>>) -> Self {
            let stub = Self::default();
            *stub.inner.responses.lock().unwrap() = responses.into();
            stub
        }

        fn with_delay(self, delay: Duration) -> Self {
            *self.inner.delay.lock().unwrap() = Some(delay);
            self
        }

        fn calls(&self) -> usize {
            self.inner.calls.load(Ordering::SeqCst)
        }

        fn seen(&self) -> Vec<String> {
            self.inner.seen.lock().unwrap().clone()
        }
    }

    impl AuthorizationService for StubAuth {
        async fn refresh(&self, refresh_token: &str) -> Result<TokenRecord, RefreshError> {
            self.inner.calls.fetch_add(1, Ordering::SeqCst);
            self.inner
                .seen
                .lock()
                .unwrap()
                .push(refresh_token.to_string());
            let delay = *self.inner.delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.inner
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RefreshError::Transient("no scripted response".into())))
        }
    }

    fn record(access: &str, refresh: Option<&str>, expires_at: u64) -> TokenRecord {
        TokenRecord::new(access.into(), refresh.map(String::from), expires_at)
    }

    fn manager(
        path: &Path,
        credentials: CredentialSet,
        auth: StubAuth,
    ) -> (TokenLifecycleManager<StubAuth, ManualClock>, ManualClock) {
        let clock = ManualClock::at(NOW);
        let mgr = TokenLifecycleManager::new(
            LifecycleConfig::new(path.to_path_buf()),
            credentials,
            auth,
            clock.clone(),
        );
        (mgr, clock)
    }

    fn expired_svc_a() -> CredentialSet {
        let mut set = CredentialSet::new();
        set.insert("svcA".into(), record("a1", Some("r1"), NOW - 10));
        set
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_and_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tokens.json");
        std::fs::write(
            &path,
            format!(
                r#"{{"svcA": {{"access_token":"a1","refresh_token":"r1","expires_at_seconds": {}}}}}"#,
                NOW - 10
            ),
        )
        .unwrap();

        let auth = StubAuth::answering(vec![Ok(record("a2", Some("r1"), NOW - 10 + 3600))]);
        let (mgr, _clock) = manager(&path, store::load(&path).unwrap(), auth.clone());

        let got = mgr.ensure_valid("svcA").await.unwrap();
        assert_eq!(got.access_token, "a2");
        assert_eq!(got.expires_at, NOW - 10 + 3600);
        assert_eq!(auth.calls(), 1);
        assert_eq!(auth.seen(), vec!["r1"]);

        let on_disk = store::load(&path).unwrap();
        assert_eq!(on_disk["svcA"], got);
        assert_eq!(mgr.state("svcA"), Some(LifecycleState::Valid));
    }

    #[tokio::test]
    async fn test_valid_token_needs_no_io() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tokens.json");
        let mut set = CredentialSet::new();
        set.insert("svcA".into(), record("a1", Some("r1"), NOW + 3600));

        let auth = StubAuth::default();
        let (mgr, _clock) = manager(&path, set, auth.clone());

        let first = mgr.ensure_valid("svcA").await.unwrap();
        let second = mgr.ensure_valid("svcA").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(auth.calls(), 0);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_refresh_inside_skew_window() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tokens.json");
        let mut set = CredentialSet::new();
        set.insert("svcA".into(), record("a1", Some("r1"), NOW + 120));

        let auth = StubAuth::answering(vec![Ok(record("a2", None, NOW + 3600))]);
        let (mgr, clock) = manager(&path, set, auth.clone());

        assert_eq!(mgr.ensure_valid("svcA").await.unwrap().access_token, "a1");
        clock.advance(60);
        assert_eq!(mgr.state("svcA"), Some(LifecycleState::NeedsRefresh));
        assert_eq!(mgr.ensure_valid("svcA").await.unwrap().access_token, "a2");
        assert_eq!(auth.calls(), 1);
    }

    #[tokio::test]
    async fn test_refresh_keeps_other_resource_servers() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tokens.json");
        let mut set = expired_svc_a();
        let mut b = record("b1", Some("rb"), NOW - 100);
        b.extra.insert("scope".into(), serde_json::json!("openid"));
        set.insert("svcB".into(), b.clone());

        let auth = StubAuth::answering(vec![Ok(record("a2", Some("r2"), NOW + 3600))]);
        let (mgr, _clock) = manager(&path, set, auth);

        mgr.ensure_valid("svcA").await.unwrap();

        let on_disk = store::load(&path).unwrap();
        assert_eq!(on_disk.len(), 2);
        assert_eq!(on_disk["svcB"], b);
        assert_eq!(on_disk["svcA"].refresh_token.as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn test_refresh_token_carried_forward_when_not_rotated() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tokens.json");

        let auth = StubAuth::answering(vec![Ok(record("a2", None, NOW + 3600))]);
        let (mgr, _clock) = manager(&path, expired_svc_a(), auth);

        let got = mgr.ensure_valid("svcA").await.unwrap();
        assert_eq!(got.refresh_token.as_deref(), Some("r1"));
        assert_eq!(
            store::load(&path).unwrap()["svcA"].refresh_token.as_deref(),
            Some("r1")
        );
    }

    #[tokio::test]
    async fn test_denial_is_terminal() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tokens.json");
        let mut set = expired_svc_a();
        set.insert("svcB".into(), record("b1", Some("rb"), NOW + 3600));

        let auth = StubAuth::answering(vec![
            Err(RefreshError::Denied("invalid_grant".into())),
            Ok(record("a2", Some("r1"), NOW + 3600)),
        ]);
        let (mgr, _clock) = manager(&path, set, auth.clone());

        for _ in 0..3 {
            match mgr.ensure_valid("svcA").await {
                Err(LifecycleError::RefreshDenied { reason, .. }) => {
                    assert_eq!(reason, "invalid_grant")
                }
                other => panic!("expected denial, got {:?}", other),
            }
        }
        assert_eq!(auth.calls(), 1);
        assert!(matches!(
            mgr.state("svcA"),
            Some(LifecycleState::Failed { .. })
        ));
        // Nothing was written and the other server is unaffected
        assert!(!path.exists());
        assert_eq!(mgr.ensure_valid("svcB").await.unwrap().access_token, "b1");
    }

    #[tokio::test]
    async fn test_denial_message_names_remedy() {
        let tmp = tempfile::tempdir().unwrap();
        let auth = StubAuth::answering(vec![Err(RefreshError::Denied("revoked".into()))]);
        let (mgr, _clock) = manager(&tmp.path().join("t.json"), expired_svc_a(), auth);

        let err = mgr.ensure_valid("svcA").await.unwrap_err();
        assert!(err.to_string().contains("gxfer login"), "{}", err);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retryable() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tokens.json");

        let auth = StubAuth::answering(vec![
            Err(RefreshError::Transient("timeout".into())),
            Ok(record("a2", Some("r1"), NOW + 3600)),
        ]);
        let (mgr, _clock) = manager(&path, expired_svc_a(), auth.clone());

        assert!(matches!(
            mgr.ensure_valid("svcA").await,
            Err(LifecycleError::TransientRefresh { .. })
        ));
        assert_eq!(mgr.state("svcA"), Some(LifecycleState::NeedsRefresh));
        assert!(!path.exists());

        assert_eq!(mgr.ensure_valid("svcA").await.unwrap().access_token, "a2");
        assert_eq!(auth.calls(), 2);
    }

    #[tokio::test]
    async fn test_already_expired_response_not_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tokens.json");

        let auth = StubAuth::answering(vec![Ok(record("a2", Some("r1"), NOW - 1))]);
        let (mgr, _clock) = manager(&path, expired_svc_a(), auth);

        assert!(matches!(
            mgr.ensure_valid("svcA").await,
            Err(LifecycleError::TransientRefresh { .. })
        ));
        assert!(!path.exists());
        assert_eq!(mgr.state("svcA"), Some(LifecycleState::NeedsRefresh));
    }

    #[tokio::test]
    async fn test_response_inside_skew_window_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tokens.json");

        let auth = StubAuth::answering(vec![
            Ok(record("a2", Some("r1"), NOW + 30)),
            Ok(record("a3", Some("r1"), NOW + 3600)),
        ]);
        let (mgr, _clock) = manager(&path, expired_svc_a(), auth.clone());

        assert!(matches!(
            mgr.ensure_valid("svcA").await,
            Err(LifecycleError::TransientRefresh { .. })
        ));
        assert!(!path.exists());
        assert_eq!(mgr.state("svcA"), Some(LifecycleState::NeedsRefresh));

        let got = mgr.ensure_valid("svcA").await.unwrap();
        assert_eq!(got.access_token, "a3");
        assert_eq!(mgr.state("svcA"), Some(LifecycleState::Valid));

        // Valid now: no further exchanges
        mgr.ensure_valid("svcA").await.unwrap();
        assert_eq!(auth.calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_keeps_extra_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tokens.json");
        let mut set = CredentialSet::new();
        let mut old = record("a1", Some("r1"), NOW - 10);
        old.extra
            .insert("token_type".into(), serde_json::json!("Bearer"));
        old.extra.insert("scope".into(), serde_json::json!("old-scope"));
        set.insert("svcA".into(), old);

        let mut fresh = record("a2", None, NOW + 3600);
        fresh
            .extra
            .insert("scope".into(), serde_json::json!("new-scope"));
        let auth = StubAuth::answering(vec![Ok(fresh)]);
        let (mgr, _clock) = manager(&path, set, auth);

        let got = mgr.ensure_valid("svcA").await.unwrap();
        assert_eq!(got.extra.get("token_type"), Some(&serde_json::json!("Bearer")));
        assert_eq!(got.extra.get("scope"), Some(&serde_json::json!("new-scope")));
        assert_eq!(store::load(&path).unwrap()["svcA"], got);
    }

    #[tokio::test]
    async fn test_missing_refresh_token() {
        let tmp = tempfile::tempdir().unwrap();
        let mut set = CredentialSet::new();
        set.insert("svcA".into(), record("a1", None, NOW - 10));

        let auth = StubAuth::default();
        let (mgr, _clock) = manager(&tmp.path().join("t.json"), set, auth.clone());

        assert!(matches!(
            mgr.ensure_valid("svcA").await,
            Err(LifecycleError::MissingRefreshToken(_))
        ));
        assert_eq!(auth.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_resource_server() {
        let tmp = tempfile::tempdir().unwrap();
        let (mgr, _clock) = manager(
            &tmp.path().join("t.json"),
            expired_svc_a(),
            StubAuth::default(),
        );

        assert!(matches!(
            mgr.ensure_valid("nope").await,
            Err(LifecycleError::UnknownResourceServer(_))
        ));
        assert_eq!(mgr.state("nope"), None);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tokens.json");

        let auth = StubAuth::answering(vec![Ok(record("a2", Some("r2"), NOW + 3600))])
            .with_delay(Duration::from_millis(50));
        let (mgr, _clock) = manager(&path, expired_svc_a(), auth.clone());

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let mgr = mgr.clone();
            tasks.spawn(async move { mgr.ensure_valid("svcA").await });
        }

        while let Some(joined) = tasks.join_next().await {
            assert_eq!(joined.unwrap().unwrap().access_token, "a2");
        }
        assert_eq!(auth.calls(), 1);
        assert_eq!(store::load(&path).unwrap()["svcA"].access_token, "a2");
    }

    #[tokio::test]
    async fn test_state_is_refreshing_while_in_flight() {
        let tmp = tempfile::tempdir().unwrap();
        let auth = StubAuth::answering(vec![Ok(record("a2", Some("r1"), NOW + 3600))])
            .with_delay(Duration::from_millis(100));
        let (mgr, _clock) = manager(&tmp.path().join("t.json"), expired_svc_a(), auth);

        let background = mgr.clone();
        let handle = tokio::spawn(async move { background.ensure_valid("svcA").await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(mgr.state("svcA"), Some(LifecycleState::Refreshing));

        handle.await.unwrap().unwrap();
        assert_eq!(mgr.state("svcA"), Some(LifecycleState::Valid));
    }

    #[tokio::test]
    async fn test_abandoned_caller_does_not_cancel_refresh() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tokens.json");

        let auth = StubAuth::answering(vec![Ok(record("a2", Some("r1"), NOW + 3600))])
            .with_delay(Duration::from_millis(100));
        let (mgr, _clock) = manager(&path, expired_svc_a(), auth.clone());

        let abandoned =
            tokio::time::timeout(Duration::from_millis(10), mgr.ensure_valid("svcA")).await;
        assert!(abandoned.is_err());

        // The next caller waits for the in-flight exchange instead of starting one
        let got = mgr.ensure_valid("svcA").await.unwrap();
        assert_eq!(got.access_token, "a2");
        assert_eq!(auth.calls(), 1);
        assert_eq!(store::load(&path).unwrap()["svcA"].access_token, "a2");
    }

    #[tokio::test]
    async fn test_save_failure_keeps_token_usable() {
        let tmp = tempfile::tempdir().unwrap();
        // Parent of the token file is a regular file, so saving fails
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let path = blocker.join("tokens.json");

        let auth = StubAuth::answering(vec![Ok(record("a2", Some("r1"), NOW + 3600))]);
        let (mgr, _clock) = manager(&path, expired_svc_a(), auth);

        let got = mgr.ensure_valid("svcA").await.unwrap();
        assert_eq!(got.access_token, "a2");
        assert!(mgr.has_unsaved_changes());
        assert!(mgr.flush().is_err());

        std::fs::remove_file(&blocker).unwrap();
        mgr.flush().unwrap();
        assert!(!mgr.has_unsaved_changes());
        assert_eq!(store::load(&path).unwrap()["svcA"].access_token, "a2");
    }

    #[test]
    fn test_open_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config = LifecycleConfig::new(tmp.path().join("missing.json"));
        assert!(matches!(
            TokenLifecycleManager::open(config, StubAuth::default()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_flush_without_changes_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tokens.json");
        let (mgr, _clock) = manager(&path, expired_svc_a(), StubAuth::default());

        mgr.flush().unwrap();
        assert!(!path.exists());
    }
}
