use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::auth::password::Hasher;
use crate::error::{AuthError, AuthFailure};
use crate::store::UserStore;
use crate::user::record::UserRecord;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Canonical form used for lookups: trimmed and lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Snooze pair returned while a snooze window is still open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnoozeStatus {
    pub period: Option<String>,
    pub until: OffsetDateTime,
}

/// Login entry points over the store and the hashing primitive.
pub struct AuthenticationService {
    store: Arc<dyn UserStore>,
    hasher: Arc<dyn Hasher>,
}

impl AuthenticationService {
    pub fn new(store: Arc<dyn UserStore>, hasher: Arc<dyn Hasher>) -> Self {
        Self { store, hasher }
    }

    /// Local-password login. External accounts are refused outright,
    /// whatever the supplied password.
    pub async fn authenticate_by_email_and_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<UserRecord, AuthError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            warn!(email = %email, "malformed login email");
            return Err(AuthFailure::NotLocalAccount.into());
        }

        let record = match self.store.find_by_email(&email).await? {
            Some(r) => r,
            None => {
                warn!(email = %email, "login unknown email");
                return Err(AuthFailure::NotLocalAccount.into());
            }
        };
        if record.is_external_user {
            warn!(email = %email, "password login against external account");
            return Err(AuthFailure::NotLocalAccount.into());
        }

        let (hash, salt) = match (&record.password_hash, &record.password_salt) {
            (Some(h), Some(s)) => (h.clone(), s.clone()),
            _ => {
                warn!(email = %email, "account has no local password");
                return Err(AuthFailure::NoPassword.into());
            }
        };

        let ok = self
            .hasher
            .verify(password, &salt, &hash)
            .map_err(AuthError::Hash)?;
        if !ok {
            warn!(email = %email, "login invalid password");
            return Err(AuthFailure::InvalidCredentials.into());
        }

        debug!(email = %email, user_id = ?record.user_id, "password login ok");
        Ok(record)
    }

    /// Trusted-token path: the session token was already verified upstream,
    /// so this is a lookup with no password check.
    pub async fn authenticate_by_identifier(&self, user_id: i64) -> Result<UserRecord, AuthError> {
        match self.store.find_by_user_id(user_id).await? {
            Some(r) => Ok(r),
            None => {
                warn!(user_id, "identifier login unknown user");
                Err(AuthFailure::NotFound.into())
            }
        }
    }

    /// `Some` strictly while `now < available_from`; at the boundary the
    /// snooze is over.
    pub fn snooze_status(&self, record: &UserRecord, now: OffsetDateTime) -> Option<SnoozeStatus> {
        match record.available_from {
            Some(until) if now < until => Some(SnoozeStatus {
                period: record.snooze_period.clone(),
                until,
            }),
            _ => None,
        }
    }
}
