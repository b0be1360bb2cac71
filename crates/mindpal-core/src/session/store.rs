use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::record::UserRecord;
use crate::config::{SessionConfig, DEFAULT_MAX_AGE_HOURS};
use crate::error::{Result, SessionError};
use crate::login::LoginResponse;
use crate::navigation::{Navigator, NoopNavigator};
use crate::store::KeyValueStore;

const MILLIS_PER_HOUR: f64 = 60.0 * 60.0 * 1000.0;

/// Outcome of reading the persisted user record.
///
/// Public readers collapse `Absent` and `Corrupt` into "not logged in";
/// the distinction is kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RecordRead {
    Present(UserRecord),
    Absent,
    Corrupt(String),
}

impl RecordRead {
    fn into_record(self) -> Option<UserRecord> {
        match self {
            RecordRead::Present(record) => Some(record),
            RecordRead::Absent | RecordRead::Corrupt(_) => None,
        }
    }
}

/// Session state over a durable and a transient key-value store.
///
/// Holds no session state of its own: every call re-reads the stores, so
/// several `SessionStore`s over the same backends always agree.
pub struct SessionStore<D, T, N = NoopNavigator> {
    durable: D,
    transient: T,
    navigator: N,
    config: SessionConfig,
}

impl<D, T> SessionStore<D, T, NoopNavigator>
where
    D: KeyValueStore,
    T: KeyValueStore,
{
    /// Session store whose navigation side effects go nowhere.
    pub fn headless(durable: D, transient: T) -> Self {
        Self::new(durable, transient, NoopNavigator)
    }
}

impl<D, T, N> SessionStore<D, T, N>
where
    D: KeyValueStore,
    T: KeyValueStore,
    N: Navigator,
{
    pub fn new(durable: D, transient: T, navigator: N) -> Self {
        Self {
            durable,
            transient,
            navigator,
            config: SessionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transient(&self) -> &T {
        &self.transient
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    // ===== State reader =====

    pub(crate) fn read_user_record(&self) -> RecordRead {
        let raw = match self.durable.get(&self.config.user_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return RecordRead::Absent,
            Err(e) => {
                warn!(key = %self.config.user_key, error = %e, "Failed to read user record");
                return RecordRead::Absent;
            }
        };

        match UserRecord::parse(&raw) {
            Ok(record) => RecordRead::Present(record),
            Err(e) => {
                warn!(key = %self.config.user_key, error = %e, "Failed to parse user record");
                RecordRead::Corrupt(e.to_string())
            }
        }
    }

    /// True iff a parseable user record with `isLoggedIn == true` is stored.
    pub fn is_logged_in(&self) -> bool {
        self.current_user()
            .map(|record| record.is_logged_in())
            .unwrap_or(false)
    }

    pub fn current_user(&self) -> Option<UserRecord> {
        self.read_user_record().into_record()
    }

    /// The credential for backend calls.
    ///
    /// A stored token always wins. Without one, a temporary credential is
    /// derived from the current user's phone on every call.
    pub fn auth_token(&self) -> Option<String> {
        match self.durable.get(&self.config.token_key) {
            Ok(Some(token)) if !token.is_empty() => return Some(token),
            Ok(_) => {}
            Err(e) => {
                warn!(key = %self.config.token_key, error = %e, "Failed to read credential");
            }
        }

        let phone = self.current_user()?.phone()?;
        Some(format!("{}{}", self.config.token_prefix, phone))
    }

    // ===== State writer =====

    /// Persist a successful login, replacing any previous user record.
    ///
    /// `token` is stored only when non-empty; otherwise `auth_token` falls
    /// back to the phone-derived credential.
    ///
    /// The token is written before the user record: the record is what marks
    /// the session as logged in, so a failed token write leaves the previous
    /// session state as it was.
    pub fn commit_login(&self, user_data: Map<String, Value>, token: Option<&str>) -> Result<()> {
        let record = UserRecord::committed(user_data, Utc::now());
        let serialized = serde_json::to_string(&record)?;

        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.durable.set(&self.config.token_key, token)?;
        }
        self.durable.set(&self.config.user_key, &serialized)?;

        info!(
            has_phone = record.phone().is_some(),
            has_token = token.is_some_and(|t| !t.is_empty()),
            "Login committed"
        );
        Ok(())
    }

    /// Unpack a backend login reply and commit it.
    pub fn commit_login_response(&self, response: LoginResponse) -> Result<()> {
        let (user, token) = response.into_credentials()?;
        self.commit_login(user, token.as_deref())
    }

    /// Remove every trace of the session and return to the entry view.
    ///
    /// All removals are attempted even if one fails; the first failure is
    /// returned after navigating.
    pub fn clear_session(&self) -> Result<()> {
        let removals = [
            (&self.config.user_key, self.durable.remove(&self.config.user_key)),
            (&self.config.token_key, self.durable.remove(&self.config.token_key)),
            (&self.config.remember_key, self.durable.remove(&self.config.remember_key)),
            (
                &self.config.return_url_key,
                self.transient.remove(&self.config.return_url_key),
            ),
        ];

        let mut first_error = None;
        for (key, result) in removals {
            if let Err(e) = result {
                warn!(key = %key, error = %e, "Failed to clear session key");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        info!("Session cleared");
        self.navigator.navigate_to(&self.config.entry_location);

        match first_error {
            Some(e) => Err(SessionError::Storage(e)),
            None => Ok(()),
        }
    }

    // ===== Access gate =====

    /// Let the caller proceed only when logged in.
    ///
    /// On denial the return destination (if any) is remembered, the user is
    /// notified and sent to the entry view, and `false` is returned. Callers
    /// must stop on `false`.
    pub fn require_login(&self, return_url: Option<&str>) -> bool {
        if self.is_logged_in() {
            return true;
        }

        if let Some(url) = return_url {
            if let Err(e) = self.transient.set(&self.config.return_url_key, url) {
                warn!(error = %e, "Failed to remember return destination");
            }
        }

        debug!(return_url = ?return_url, "Access denied, redirecting to entry view");
        self.navigator.show_notice(&self.config.login_notice);
        self.navigator.navigate_to(&self.config.entry_location);
        false
    }

    /// Take the pending return destination. A second call yields `None`.
    pub fn consume_return_url(&self) -> Option<String> {
        let key = &self.config.return_url_key;
        let url = match self.transient.get(key) {
            Ok(Some(url)) if !url.is_empty() => url,
            Ok(_) => return None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read return destination");
                return None;
            }
        };

        if let Err(e) = self.transient.remove(key) {
            warn!(key = %key, error = %e, "Failed to clear return destination");
        }
        Some(url)
    }

    // ===== Expiry evaluator =====

    /// Expiry check against the default one-week lifetime.
    pub fn is_session_expired(&self) -> bool {
        self.is_session_expired_with(DEFAULT_MAX_AGE_HOURS)
    }

    /// True when there is no session, its login time is missing or
    /// unreadable, or more than `max_age_hours` have elapsed since login.
    /// A NaN threshold counts as expired.
    /// Never clears anything.
    pub fn is_session_expired_with(&self, max_age_hours: f64) -> bool {
        self.is_expired_at(Utc::now(), max_age_hours)
    }

    fn is_expired_at(&self, now: DateTime<Utc>, max_age_hours: f64) -> bool {
        // NaN would compare false against everything and never expire
        if max_age_hours.is_nan() {
            return true;
        }
        let Some(age) = self.current_user().and_then(|record| record.age_at(now)) else {
            return true;
        };
        let elapsed_hours = age.num_milliseconds() as f64 / MILLIS_PER_HOUR;
        elapsed_hours > max_age_hours
    }

    /// Time since login, for display.
    pub fn session_age(&self) -> Option<Duration> {
        self.current_user()?.age()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use chrono::SecondsFormat;
    use serde_json::json;

    use super::*;
    use crate::store::{MemoryStore, StoreError, StoreResult};

    #[derive(Debug, Clone, PartialEq)]
    enum Nav {
        Notice(String),
        Goto(String),
    }

    #[derive(Default)]
    struct RecordingNavigator {
        events: RefCell<Vec<Nav>>,
    }

    impl Navigator for RecordingNavigator {
        fn show_notice(&self, message: &str) {
            self.events.borrow_mut().push(Nav::Notice(message.to_string()));
        }

        fn navigate_to(&self, location: &str) {
            self.events.borrow_mut().push(Nav::Goto(location.to_string()));
        }
    }

    /// Memory store whose writes to the listed keys fail.
    struct FailingStore {
        inner: MemoryStore,
        failing_keys: Vec<String>,
    }

    impl FailingStore {
        fn new(failing_keys: &[&str]) -> Self {
            Self {
                inner: MemoryStore::new(),
                failing_keys: failing_keys.iter().map(|k| k.to_string()).collect(),
            }
        }

        fn check(&self, key: &str) -> StoreResult<()> {
            if self.failing_keys.iter().any(|k| k == key) {
                return Err(StoreError::Io {
                    path: key.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
                });
            }
            Ok(())
        }
    }

    impl KeyValueStore for FailingStore {
        fn get(&self, key: &str) -> StoreResult<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> StoreResult<()> {
            self.check(key)?;
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> StoreResult<()> {
            self.check(key)?;
            self.inner.remove(key)
        }
    }

    struct Fixture {
        durable: MemoryStore,
        transient: MemoryStore,
        nav: RecordingNavigator,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                durable: MemoryStore::new(),
                transient: MemoryStore::new(),
                nav: RecordingNavigator::default(),
            }
        }

        fn store(&self) -> SessionStore<&MemoryStore, &MemoryStore, &RecordingNavigator> {
            SessionStore::new(&self.durable, &self.transient, &self.nav)
        }

        fn nav_events(&self) -> Vec<Nav> {
            self.nav.events.borrow().clone()
        }
    }

    fn user(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn logged_in_at(fixture: &Fixture, login_time: DateTime<Utc>) {
        let record = json!({
            "phone": "555",
            "isLoggedIn": true,
            "loginTime": login_time.to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        fixture
            .durable
            .set("mindpal_user", &record.to_string())
            .unwrap();
    }

    #[test]
    fn test_empty_stores_mean_logged_out() {
        let f = Fixture::new();
        let store = f.store();

        assert!(!store.is_logged_in());
        assert!(store.current_user().is_none());
        assert!(store.auth_token().is_none());
        assert!(store.is_session_expired());
        assert!(store.session_age().is_none());
        assert_eq!(store.read_user_record(), RecordRead::Absent);
    }

    #[test]
    fn test_login_round_trip() {
        let f = Fixture::new();
        let store = f.store();

        store.commit_login(user(json!({"phone": "555"})), None).unwrap();

        assert!(store.is_logged_in());
        let current = store.current_user().unwrap();
        assert_eq!(current.get("phone"), Some(&json!("555")));
        assert_eq!(current.get("isLoggedIn"), Some(&json!(true)));
        assert!(current.login_time().is_some());
        assert_eq!(store.auth_token().as_deref(), Some("temp_555"));
        assert!(!store.is_session_expired());
        assert!(!f.durable.contains_key("mindpal_token"));
    }

    #[test]
    fn test_explicit_token_wins() {
        let f = Fixture::new();
        let store = f.store();

        store
            .commit_login(user(json!({"phone": "555"})), Some("tok-abc"))
            .unwrap();

        assert_eq!(store.auth_token().as_deref(), Some("tok-abc"));
    }

    #[test]
    fn test_empty_token_is_not_stored() {
        let f = Fixture::new();
        let store = f.store();

        store.commit_login(user(json!({"phone": "555"})), Some("")).unwrap();

        assert!(!f.durable.contains_key("mindpal_token"));
        assert_eq!(store.auth_token().as_deref(), Some("temp_555"));
    }

    #[test]
    fn test_fallback_token_tracks_latest_phone() {
        let f = Fixture::new();
        let store = f.store();

        store.commit_login(user(json!({"phone": "555"})), None).unwrap();
        assert_eq!(store.auth_token().as_deref(), Some("temp_555"));

        store.commit_login(user(json!({"phone": 13800138000u64})), None).unwrap();
        assert_eq!(store.auth_token().as_deref(), Some("temp_13800138000"));
    }

    #[test]
    fn test_login_without_phone_has_no_credential() {
        let f = Fixture::new();
        let store = f.store();

        store.commit_login(user(json!({"name": "anon"})), None).unwrap();

        assert!(store.is_logged_in());
        assert!(store.auth_token().is_none());
    }

    #[test]
    fn test_clear_session_removes_everything_and_navigates() {
        let f = Fixture::new();
        let store = f.store();

        store
            .commit_login(user(json!({"phone": "555"})), Some("tok-abc"))
            .unwrap();
        f.durable.set("mindpal_remember", "555").unwrap();
        f.transient.set("mindpal_return_url", "/chat").unwrap();

        store.clear_session().unwrap();

        assert!(!store.is_logged_in());
        assert!(store.current_user().is_none());
        assert!(store.auth_token().is_none());
        assert!(f.durable.is_empty());
        assert!(f.transient.is_empty());
        assert_eq!(f.nav_events(), vec![Nav::Goto("index.html".to_string())]);
    }

    #[test]
    fn test_clear_session_is_idempotent() {
        let f = Fixture::new();
        let store = f.store();

        store.clear_session().unwrap();
        store.clear_session().unwrap();

        assert!(!store.is_logged_in());
        assert_eq!(f.nav_events().len(), 2);
    }

    #[test]
    fn test_corrupt_record_is_treated_as_absent() {
        let f = Fixture::new();
        f.durable.set("mindpal_user", "{not json").unwrap();
        let store = f.store();

        assert!(!store.is_logged_in());
        assert!(store.current_user().is_none());
        assert!(store.auth_token().is_none());
        assert!(store.is_session_expired());
        assert!(matches!(store.read_user_record(), RecordRead::Corrupt(_)));
    }

    #[test]
    fn test_non_object_record_is_corrupt() {
        let f = Fixture::new();
        f.durable.set("mindpal_user", "\"555\"").unwrap();
        let store = f.store();

        assert!(matches!(store.read_user_record(), RecordRead::Corrupt(_)));
        assert!(!store.is_logged_in());
    }

    #[test]
    fn test_record_without_flag_is_not_logged_in() {
        let f = Fixture::new();
        f.durable
            .set("mindpal_user", r#"{"phone": "555", "isLoggedIn": false}"#)
            .unwrap();
        let store = f.store();

        assert!(!store.is_logged_in());
        // Still readable, and still usable for the fallback credential
        assert!(store.current_user().is_some());
        assert_eq!(store.auth_token().as_deref(), Some("temp_555"));
    }

    #[test]
    fn test_return_url_delivered_at_most_once() {
        let f = Fixture::new();
        let store = f.store();

        assert!(!store.require_login(Some("/dashboard")));
        assert_eq!(
            f.transient.get("mindpal_return_url").unwrap().as_deref(),
            Some("/dashboard")
        );
        assert_eq!(
            f.nav_events(),
            vec![
                Nav::Notice("Please log in first".to_string()),
                Nav::Goto("index.html".to_string()),
            ]
        );

        assert_eq!(store.consume_return_url().as_deref(), Some("/dashboard"));
        assert_eq!(store.consume_return_url(), None);
    }

    #[test]
    fn test_denial_overwrites_pending_return_url() {
        let f = Fixture::new();
        let store = f.store();

        store.require_login(Some("/first"));
        store.require_login(Some("/second"));

        assert_eq!(store.consume_return_url().as_deref(), Some("/second"));
    }

    #[test]
    fn test_denial_without_return_url_keeps_pending_one() {
        let f = Fixture::new();
        let store = f.store();

        store.require_login(Some("/first"));
        assert!(!store.require_login(None));

        assert_eq!(store.consume_return_url().as_deref(), Some("/first"));
    }

    #[test]
    fn test_gate_passes_when_logged_in() {
        let f = Fixture::new();
        let store = f.store();
        store.commit_login(user(json!({"phone": "555"})), None).unwrap();

        assert!(store.require_login(None));
        assert!(store.require_login(Some("/dashboard")));

        assert!(f.transient.is_empty());
        assert!(f.nav_events().is_empty());
    }

    #[test]
    fn test_expiry_boundary() {
        let f = Fixture::new();
        let store = f.store();

        logged_in_at(&f, Utc::now() - Duration::hours(168) - Duration::minutes(1));
        assert!(store.is_session_expired());

        logged_in_at(&f, Utc::now() - Duration::hours(167));
        assert!(!store.is_session_expired());
    }

    #[test]
    fn test_expiry_is_strictly_greater_than() {
        let f = Fixture::new();
        let store = f.store();
        let now = Utc::now();

        logged_in_at(&f, now - Duration::hours(2));
        assert!(!store.is_expired_at(now, 2.0));
        assert!(store.is_expired_at(now + Duration::milliseconds(1), 2.0));
    }

    #[test]
    fn test_expiry_with_custom_threshold() {
        let f = Fixture::new();
        let store = f.store();

        logged_in_at(&f, Utc::now() - Duration::minutes(45));
        assert!(store.is_session_expired_with(0.5));
        assert!(!store.is_session_expired_with(1.0));
    }

    #[test]
    fn test_expiry_does_not_clear_session() {
        let f = Fixture::new();
        let store = f.store();

        logged_in_at(&f, Utc::now() - Duration::days(30));
        assert!(store.is_session_expired());
        assert!(store.is_logged_in());
        assert!(f.nav_events().is_empty());
    }

    #[test]
    fn test_missing_or_bad_login_time_is_expired() {
        let f = Fixture::new();
        let store = f.store();

        f.durable
            .set("mindpal_user", r#"{"phone": "555", "isLoggedIn": true}"#)
            .unwrap();
        assert!(store.is_session_expired());

        f.durable
            .set(
                "mindpal_user",
                r#"{"phone": "555", "isLoggedIn": true, "loginTime": "garbage"}"#,
            )
            .unwrap();
        assert!(store.is_session_expired());
    }

    #[test]
    fn test_custom_config_keys() {
        let f = Fixture::new();
        let config = SessionConfig {
            user_key: "u".to_string(),
            token_key: "t".to_string(),
            entry_location: "/login".to_string(),
            token_prefix: "guest-".to_string(),
            ..SessionConfig::default()
        };
        let store = f.store().with_config(config);

        store.commit_login(user(json!({"phone": "42"})), None).unwrap();
        assert!(f.durable.contains_key("u"));
        assert_eq!(store.auth_token().as_deref(), Some("guest-42"));

        store.clear_session().unwrap();
        assert_eq!(f.nav_events(), vec![Nav::Goto("/login".to_string())]);
    }

    #[test]
    fn test_commit_login_response() {
        let f = Fixture::new();
        let store = f.store();

        let response = LoginResponse::from_json(
            r#"{"success": true, "data": {"token": "jwt.abc", "user": {"id": 1, "phone": "555"}}}"#,
        )
        .unwrap();
        store.commit_login_response(response).unwrap();

        assert!(store.is_logged_in());
        assert_eq!(store.auth_token().as_deref(), Some("jwt.abc"));
    }

    #[test]
    fn test_rejected_login_response_leaves_state_alone() {
        let f = Fixture::new();
        let store = f.store();

        let response =
            LoginResponse::from_json(r#"{"success": false, "error": "user not found"}"#).unwrap();
        assert!(matches!(
            store.commit_login_response(response),
            Err(SessionError::LoginRejected(_))
        ));
        assert!(f.durable.is_empty());
    }

    #[test]
    fn test_file_backed_session_survives_reopen() {
        use crate::store::FileStore;

        let dir = tempfile::tempdir().unwrap();
        let durable_path = dir.path().join("durable.json");
        let transient_path = dir.path().join("transient.json");

        let first = SessionStore::headless(
            FileStore::new(&durable_path),
            FileStore::new(&transient_path),
        );
        first
            .commit_login(user(json!({"phone": "555"})), Some("tok-abc"))
            .unwrap();
        first.require_login(Some("/unused"));

        let second = SessionStore::headless(
            FileStore::new(&durable_path),
            FileStore::new(&transient_path),
        );
        assert!(second.is_logged_in());
        assert_eq!(second.auth_token().as_deref(), Some("tok-abc"));
        // Logged in, so the gate never wrote a destination
        assert_eq!(second.consume_return_url(), None);
    }

    #[test]
    fn test_corrupt_backing_file_does_not_lock_out() {
        use crate::store::FileStore;

        let dir = tempfile::tempdir().unwrap();
        let durable_path = dir.path().join("durable.json");
        // Truncated mid-value
        std::fs::write(&durable_path, r#"{"mindpal_user": "{\"phone\":\"5"#).unwrap();

        let store = SessionStore::headless(
            FileStore::new(&durable_path),
            FileStore::new(dir.path().join("transient.json")),
        );
        assert!(!store.is_logged_in());
        assert!(store.auth_token().is_none());
        assert_eq!(store.read_user_record(), RecordRead::Absent);

        store.clear_session().unwrap();
        store
            .commit_login(user(json!({"phone": "555"})), Some("tok-abc"))
            .unwrap();

        assert!(store.is_logged_in());
        assert_eq!(store.auth_token().as_deref(), Some("tok-abc"));
    }

    #[test]
    fn test_clear_session_keeps_going_after_a_failed_removal() {
        let f = Fixture::new();
        let durable = FailingStore::new(&["mindpal_token"]);
        let store = SessionStore::new(&durable, &f.transient, &f.nav);

        durable.inner.set("mindpal_user", r#"{"isLoggedIn": true}"#).unwrap();
        durable.inner.set("mindpal_token", "tok-abc").unwrap();
        durable.inner.set("mindpal_remember", "555").unwrap();
        f.transient.set("mindpal_return_url", "/chat").unwrap();

        let result = store.clear_session();

        assert!(matches!(result, Err(SessionError::Storage(_))));
        assert!(!durable.inner.contains_key("mindpal_user"));
        assert!(!durable.inner.contains_key("mindpal_remember"));
        assert!(durable.inner.contains_key("mindpal_token"));
        assert!(f.transient.is_empty());
        assert_eq!(f.nav_events(), vec![Nav::Goto("index.html".to_string())]);
        assert!(!store.is_logged_in());
    }

    #[test]
    fn test_failed_token_write_keeps_previous_session() {
        let f = Fixture::new();
        let durable = FailingStore::new(&["mindpal_token"]);
        let store = SessionStore::new(&durable, &f.transient, &f.nav);

        let result = store.commit_login(user(json!({"phone": "555"})), Some("tok-abc"));

        assert!(matches!(result, Err(SessionError::Storage(_))));
        assert!(!store.is_logged_in());
        assert!(durable.inner.is_empty());
    }

    #[test]
    fn test_nan_threshold_is_expired() {
        let f = Fixture::new();
        let store = f.store();

        logged_in_at(&f, Utc::now() - Duration::minutes(5));
        assert!(!store.is_session_expired());
        assert!(store.is_session_expired_with(f64::NAN));
    }
}
