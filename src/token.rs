use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::clock::{start_of_day_utc, Clock};
use crate::config::CoreConfig;
use crate::error::{SaveError, UniqueField};
use crate::store::UserStore;
use crate::user::record::UserRecord;

/// Issues and retires the opaque session token carried on a user record.
///
/// Issuance is idempotent: a record that already holds a token keeps it.
/// Expiry is anchored to midnight UTC of the current day; a freshly issued
/// token is not live until [`renew`](TokenManager::renew) stamps an expiry.
pub struct TokenManager {
    store: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
    ttl_days: i64,
    max_attempts: u32,
}

impl TokenManager {
    pub fn new(store: Arc<dyn UserStore>, clock: Arc<dyn Clock>, config: &CoreConfig) -> Self {
        Self {
            store,
            clock,
            ttl_days: config.token_ttl_days,
            max_attempts: config.unique_attempts,
        }
    }

    /// Issue a token if the record has none. Never clobbers an active
    /// session.
    pub async fn ensure_token(&self, record: &mut UserRecord) -> Result<(), SaveError> {
        if record.auth_token.is_some() {
            return Ok(());
        }
        for attempt in 1..=self.max_attempts {
            let token = Uuid::new_v4().simple().to_string();
            if !self.store.exists_by_auth_token(&token).await? {
                debug!(user_id = ?record.user_id, attempt, "auth token issued");
                record.auth_token = Some(token);
                return Ok(());
            }
            warn!(attempt, "auth token collision, regenerating");
        }
        Err(SaveError::Exhausted {
            field: UniqueField::AuthToken,
            attempts: self.max_attempts,
        })
    }

    /// Extend the session: expiry becomes midnight UTC of today plus the
    /// configured TTL. Called on successful login.
    pub fn renew(&self, record: &mut UserRecord) {
        let expiry = start_of_day_utc(self.clock.now()) + Duration::days(self.ttl_days);
        debug!(user_id = ?record.user_id, %expiry, "session renewed");
        record.token_expiry = Some(expiry);
    }

    /// Force the session dead: expiry becomes midnight UTC of yesterday.
    pub fn reset(&self, record: &mut UserRecord) {
        let expiry = start_of_day_utc(self.clock.now()) - Duration::days(1);
        debug!(user_id = ?record.user_id, %expiry, "session reset");
        record.token_expiry = Some(expiry);
    }

    /// Strictly `now < expiry`; an unset expiry is expired.
    pub fn is_live(&self, record: &UserRecord, now: OffsetDateTime) -> bool {
        record.token_expiry.map_or(false, |expiry| now < expiry)
    }
}
