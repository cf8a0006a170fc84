use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::password::Hasher;
use crate::clock::{self, Clock};
use crate::config::CoreConfig;
use crate::error::{SaveError, StoreError, UniqueField};
use crate::identity::IdentityAllocator;
use crate::notify::EventNotifier;
use crate::schedule;
use crate::store::UserStore;
use crate::token::TokenManager;
use crate::user::record::{SaveRequest, UserRecord};

/// Lifecycle pipeline for user records: identity allocation, token
/// issuance, staged-password hashing, derived-schedule recomputation,
/// bounded persist retry and the post-commit announcement.
pub struct UserService {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn Hasher>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn EventNotifier>,
    identity: IdentityAllocator,
    tokens: TokenManager,
    save_attempts: u32,
}

impl UserService {
    pub fn new(
        store: Arc<dyn UserStore>,
        hasher: Arc<dyn Hasher>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn EventNotifier>,
        config: &CoreConfig,
    ) -> Self {
        Self {
            identity: IdentityAllocator::new(store.clone(), config),
            tokens: TokenManager::new(store.clone(), clock.clone(), config),
            save_attempts: config.save_attempts,
            store,
            hasher,
            clock,
            notifier,
        }
    }

    /// Session token manager, for renew/reset flows around login.
    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Persist a record, running the whole pre-persist pipeline.
    ///
    /// A rejected save leaves the previously persisted row untouched; all
    /// mutation up to the store call happens on this request's copy.
    pub async fn save(&self, request: SaveRequest) -> Result<UserRecord, SaveError> {
        let (mut record, pending_password) = request.into_parts();

        if record.user_id.is_none() {
            record.user_id = Some(self.identity.allocate().await?);
        }
        self.tokens.ensure_token(&mut record).await?;

        // Staged plaintext is hashed exactly once and dropped here; a save
        // with nothing staged keeps the stored hash and salt as they are.
        if let Some(plaintext) = pending_password {
            let salt = self.hasher.generate_salt();
            let hash = self.hasher.hash(&plaintext, &salt).map_err(SaveError::Hash)?;
            record.password_salt = Some(salt);
            record.password_hash = Some(hash);
        }

        record.wake_up_utc_seconds =
            schedule::to_utc_seconds_since_midnight(&record.wake_up_local, record.utc_offset_hours)?;
        record.sleep_utc_seconds =
            schedule::to_utc_seconds_since_midnight(&record.sleep_local, record.utc_offset_hours)?;

        let saved = self.persist(record).await?;

        info!(user_id = ?saved.user_id, "user saved");
        self.announce_saved(&saved);
        Ok(saved)
    }

    /// Store writes with bounded regenerate-and-retry on the unique fields.
    async fn persist(&self, mut record: UserRecord) -> Result<UserRecord, SaveError> {
        let mut conflict = UniqueField::UserId;
        for attempt in 1..=self.save_attempts {
            match self.store.save(&record).await {
                Ok(saved) => return Ok(saved),
                Err(StoreError::UniquenessViolation(UniqueField::UserId)) => {
                    warn!(attempt, "store rejected user id, regenerating");
                    conflict = UniqueField::UserId;
                    record.user_id = Some(self.identity.allocate().await?);
                }
                Err(StoreError::UniquenessViolation(UniqueField::AuthToken)) => {
                    warn!(attempt, "store rejected auth token, regenerating");
                    conflict = UniqueField::AuthToken;
                    record.auth_token = None;
                    self.tokens.ensure_token(&mut record).await?;
                }
                Err(e) => return Err(SaveError::Store(e)),
            }
        }
        Err(SaveError::Exhausted {
            field: conflict,
            attempts: self.save_attempts,
        })
    }

    // Post-commit hook, decoupled from the save path. Announcement failures
    // are logged and dropped.
    fn announce_saved(&self, record: &UserRecord) {
        let Some(user_id) = record.user_id else {
            return;
        };
        let notifier = Arc::clone(&self.notifier);
        let payload = serde_json::json!({ "userId": user_id });
        tokio::spawn(async move {
            if let Err(e) = notifier.announce("user_saved", payload).await {
                warn!(error = %e, user_id, "user_saved announcement failed");
            }
        });
    }

    /// All records currently inside their sleep window, the current instant
    /// framed the same way as the stored thresholds.
    pub async fn currently_asleep(&self) -> Result<Vec<UserRecord>, StoreError> {
        let now_secs = clock::seconds_since_midnight(self.clock.now().time());
        self.store.find_asleep_at(now_secs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::Argon2Hasher;
    use crate::auth::service::AuthenticationService;
    use crate::clock::FixedClock;
    use crate::store::MemoryUserStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use time::macros::datetime;
    use time::OffsetDateTime;

    const NOW: OffsetDateTime = datetime!(2026-08-07 12:00 UTC);

    struct RecordingNotifier {
        events: Mutex<Vec<(String, serde_json::Value)>>,
        notify: tokio::sync::Notify,
    }

    impl RecordingNotifier {
        fn new() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                notify: tokio::sync::Notify::new(),
            }
        }
    }

    #[async_trait]
    impl EventNotifier for RecordingNotifier {
        async fn announce(&self, event: &str, payload: serde_json::Value) -> anyhow::Result<()> {
            self.events
                .lock()
                .expect("poisoned")
                .push((event.to_string(), payload));
            self.notify.notify_one();
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl EventNotifier for FailingNotifier {
        async fn announce(&self, _event: &str, _payload: serde_json::Value) -> anyhow::Result<()> {
            anyhow::bail!("notifier down")
        }
    }

    /// Store that rejects the first `rejections` saves with a user-id
    /// uniqueness violation, then delegates.
    struct FlakyStore {
        inner: MemoryUserStore,
        rejections: u32,
        saves: AtomicU32,
    }

    impl FlakyStore {
        fn new(rejections: u32) -> Self {
            Self {
                inner: MemoryUserStore::new(),
                rejections,
                saves: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl UserStore for FlakyStore {
        async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
            self.inner.find_by_email(email).await
        }
        async fn find_by_user_id(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
            self.inner.find_by_user_id(user_id).await
        }
        async fn exists_by_user_id(&self, user_id: i64) -> Result<bool, StoreError> {
            self.inner.exists_by_user_id(user_id).await
        }
        async fn exists_by_auth_token(&self, token: &str) -> Result<bool, StoreError> {
            self.inner.exists_by_auth_token(token).await
        }
        async fn save(&self, record: &UserRecord) -> Result<UserRecord, StoreError> {
            if self.saves.fetch_add(1, Ordering::SeqCst) < self.rejections {
                return Err(StoreError::UniquenessViolation(UniqueField::UserId));
            }
            self.inner.save(record).await
        }
        async fn find_asleep_at(&self, now_secs: i32) -> Result<Vec<UserRecord>, StoreError> {
            self.inner.find_asleep_at(now_secs).await
        }
    }

    fn init_logs() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    fn service(store: Arc<dyn UserStore>, notifier: Arc<dyn EventNotifier>) -> UserService {
        init_logs();
        UserService::new(
            store,
            Arc::new(Argon2Hasher),
            Arc::new(FixedClock(NOW)),
            notifier,
            &CoreConfig::default(),
        )
    }

    #[tokio::test]
    async fn first_save_allocates_identity_and_token_once() {
        let store = Arc::new(MemoryUserStore::new());
        let service = service(store.clone(), Arc::new(RecordingNotifier::new()));

        let record = UserRecord::new("bob@example.com", 0, "07:00", "23:00");
        let saved = service.save(SaveRequest::new(record)).await.expect("save");

        let user_id = saved.user_id.expect("allocated");
        assert_eq!(user_id / 10_i64.pow(10), 880_000);
        let token = saved.auth_token.clone().expect("issued");

        // A second save keeps both.
        let again = service.save(SaveRequest::new(saved)).await.expect("resave");
        assert_eq!(again.user_id, Some(user_id));
        assert_eq!(again.auth_token, Some(token));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn derived_fields_follow_local_times_and_offset() {
        let store = Arc::new(MemoryUserStore::new());
        let service = service(store.clone(), Arc::new(RecordingNotifier::new()));

        let record = UserRecord::new("bob@example.com", 9, "07:00", "23:00");
        let mut saved = service.save(SaveRequest::new(record)).await.expect("save");
        assert_eq!(saved.wake_up_utc_seconds, 79_200); // 22:00 UTC
        assert_eq!(saved.sleep_utc_seconds, 50_400); // 14:00 UTC

        // Moving timezones recomputes both on the next save.
        saved.utc_offset_hours = -2;
        let saved = service.save(SaveRequest::new(saved)).await.expect("resave");
        assert_eq!(saved.wake_up_utc_seconds, 9 * 3600);
        assert_eq!(saved.sleep_utc_seconds, 3_600); // wrapped past midnight
    }

    #[tokio::test]
    async fn malformed_local_time_fails_the_save() {
        let store = Arc::new(MemoryUserStore::new());
        let service = service(store.clone(), Arc::new(RecordingNotifier::new()));

        let record = UserRecord::new("bob@example.com", 0, "25:00", "23:00");
        let err = service
            .save(SaveRequest::new(record))
            .await
            .expect_err("bad time");
        assert!(matches!(err, SaveError::Schedule(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn staged_password_is_hashed_once_and_survives_unrelated_saves() {
        let store = Arc::new(MemoryUserStore::new());
        let service = service(store.clone(), Arc::new(RecordingNotifier::new()));

        let record = UserRecord::new("bob@example.com", 0, "07:00", "23:00");
        let saved = service
            .save(SaveRequest::new(record).with_password("secret"))
            .await
            .expect("save");
        let hash = saved.password_hash.clone().expect("hashed");
        let salt = saved.password_salt.clone().expect("salted");

        // An unrelated save leaves the credential material untouched.
        let mut update = saved;
        update.sleep_local = "22:00".into();
        let saved = service.save(SaveRequest::new(update)).await.expect("resave");
        assert_eq!(saved.password_hash, Some(hash));
        assert_eq!(saved.password_salt, Some(salt));

        // And the staged password authenticates.
        let auth = AuthenticationService::new(store, Arc::new(Argon2Hasher));
        auth.authenticate_by_email_and_password("bob@example.com", "secret")
            .await
            .expect("login with staged password");
    }

    #[tokio::test]
    async fn persist_retries_regenerate_the_conflicting_field() {
        let store = Arc::new(FlakyStore::new(2));
        let service = service(store.clone(), Arc::new(RecordingNotifier::new()));

        let record = UserRecord::new("bob@example.com", 0, "07:00", "23:00");
        let saved = service.save(SaveRequest::new(record)).await.expect("save");
        assert!(saved.user_id.is_some());
        assert_eq!(store.saves.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn persist_retry_budget_is_bounded() {
        let store = Arc::new(FlakyStore::new(u32::MAX));
        let service = service(store.clone(), Arc::new(RecordingNotifier::new()));

        let record = UserRecord::new("bob@example.com", 0, "07:00", "23:00");
        let err = service
            .save(SaveRequest::new(record))
            .await
            .expect_err("exhausted");
        assert!(matches!(
            err,
            SaveError::Exhausted {
                field: UniqueField::UserId,
                attempts: 5,
            }
        ));
        assert_eq!(store.saves.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn successful_save_is_announced() {
        let store = Arc::new(MemoryUserStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let service = service(store, notifier.clone());

        let record = UserRecord::new("bob@example.com", 0, "07:00", "23:00");
        let saved = service.save(SaveRequest::new(record)).await.expect("save");

        tokio::time::timeout(Duration::from_secs(1), notifier.notify.notified())
            .await
            .expect("announcement arrives");
        let events = notifier.events.lock().expect("poisoned").clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "user_saved");
        assert_eq!(
            events[0].1,
            serde_json::json!({ "userId": saved.user_id.expect("id") })
        );
    }

    #[tokio::test]
    async fn notifier_failure_does_not_fail_the_save() {
        let store = Arc::new(MemoryUserStore::new());
        let service = service(store, Arc::new(FailingNotifier));

        let record = UserRecord::new("bob@example.com", 0, "07:00", "23:00");
        service
            .save(SaveRequest::new(record))
            .await
            .expect("save despite notifier");
    }

    #[tokio::test]
    async fn rejected_save_leaves_the_stored_row_untouched() {
        let store = Arc::new(MemoryUserStore::new());
        let service = service(store.clone(), Arc::new(RecordingNotifier::new()));

        let record = UserRecord::new("bob@example.com", 0, "07:00", "23:00");
        let saved = service.save(SaveRequest::new(record)).await.expect("save");

        // A second account trying to take the same email is rejected by the
        // store's unique index and changes nothing.
        let rival = UserRecord::new("Bob@Example.com", 3, "06:00", "22:00");
        let err = service
            .save(SaveRequest::new(rival))
            .await
            .expect_err("email taken");
        assert!(matches!(
            err,
            SaveError::Store(StoreError::UniquenessViolation(UniqueField::Email))
        ));

        let stored = store
            .find_by_email("bob@example.com")
            .await
            .expect("lookup")
            .expect("still there");
        assert_eq!(stored.utc_offset_hours, saved.utc_offset_hours);
        assert_eq!(stored.wake_up_local, saved.wake_up_local);
    }

    #[tokio::test]
    async fn login_renew_save_composes_into_a_live_session() {
        let store = Arc::new(MemoryUserStore::new());
        let service = service(store.clone(), Arc::new(RecordingNotifier::new()));
        let auth = AuthenticationService::new(store.clone(), Arc::new(Argon2Hasher));

        let record = UserRecord::new("bob@example.com", 0, "07:00", "23:00");
        service
            .save(SaveRequest::new(record).with_password("secret"))
            .await
            .expect("create");

        let mut logged_in = auth
            .authenticate_by_email_and_password("bob@example.com", "secret")
            .await
            .expect("login");
        assert!(!service.tokens().is_live(&logged_in, NOW)); // never renewed

        service.tokens().renew(&mut logged_in);
        let saved = service
            .save(SaveRequest::new(logged_in))
            .await
            .expect("persist renewal");
        assert!(service.tokens().is_live(&saved, NOW));

        let mut reset = saved;
        service.tokens().reset(&mut reset);
        assert!(!service.tokens().is_live(&reset, NOW));
    }

    #[tokio::test]
    async fn currently_asleep_frames_now_like_the_thresholds() {
        let store = Arc::new(MemoryUserStore::new());
        // Clock at 23:00 UTC.
        let service = UserService::new(
            store.clone(),
            Arc::new(Argon2Hasher),
            Arc::new(FixedClock(datetime!(2026-08-07 23:00 UTC))),
            Arc::new(RecordingNotifier::new()),
            &CoreConfig::default(),
        );

        // Wake 22:00 UTC / sleep 14:00 UTC after derivation: asleep at 23:00.
        let tokyo = UserRecord::new("tokyo@example.com", 9, "07:00", "23:00");
        service.save(SaveRequest::new(tokyo)).await.expect("save");

        // Wake 23:30 UTC / sleep 13:30 UTC: still awake at 23:00.
        let later = UserRecord::new("later@example.com", 9, "08:30", "22:30");
        service.save(SaveRequest::new(later)).await.expect("save");

        let asleep = service.currently_asleep().await.expect("query");
        assert_eq!(asleep.len(), 1);
        assert_eq!(asleep[0].email, "tokyo@example.com");
    }
}
