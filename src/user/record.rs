use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User row as persisted by the store.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRecord {
    pub id: Option<Uuid>,      // store-owned primary key, None until first save
    pub user_id: Option<i64>,  // allocated once, unique, immutable afterwards
    pub email: String,         // matched case-insensitively on login
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // argon2 output, not exposed in JSON
    #[serde(skip_serializing)]
    pub password_salt: Option<String>,
    pub is_external_user: bool, // federated account, no local password auth
    pub auth_token: Option<String>, // opaque session token, unique, set once
    pub token_expiry: Option<OffsetDateTime>,
    pub utc_offset_hours: i32,
    pub wake_up_local: String, // HH:MM, user-editable
    pub sleep_local: String,
    pub wake_up_utc_seconds: i32, // derived on save, [0, 86400)
    pub sleep_utc_seconds: i32,
    pub available_from: Option<OffsetDateTime>, // end of the snooze window
    pub snooze_period: Option<String>,          // label carried with the snooze
    pub created_at: Option<OffsetDateTime>,     // store-owned
}

impl UserRecord {
    /// Fresh record with no identity or session yet; derived fields are
    /// filled in on the first save.
    pub fn new(
        email: impl Into<String>,
        utc_offset_hours: i32,
        wake_up_local: impl Into<String>,
        sleep_local: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            user_id: None,
            email: email.into(),
            password_hash: None,
            password_salt: None,
            is_external_user: false,
            auth_token: None,
            token_expiry: None,
            utc_offset_hours,
            wake_up_local: wake_up_local.into(),
            sleep_local: sleep_local.into(),
            wake_up_utc_seconds: 0,
            sleep_utc_seconds: 0,
            available_from: None,
            snooze_period: None,
            created_at: None,
        }
    }
}

/// Pending changes for one persist call.
///
/// A plaintext password staged here is hashed exactly once at save time and
/// discarded; saves with nothing staged leave the stored hash and salt
/// untouched.
#[derive(Debug)]
pub struct SaveRequest {
    pub record: UserRecord,
    pending_password: Option<String>,
}

impl SaveRequest {
    pub fn new(record: UserRecord) -> Self {
        Self {
            record,
            pending_password: None,
        }
    }

    /// Stage a plaintext password for this save.
    pub fn with_password(mut self, plaintext: impl Into<String>) -> Self {
        self.pending_password = Some(plaintext.into());
        self
    }

    pub fn has_pending_password(&self) -> bool {
        self.pending_password.is_some()
    }

    pub(crate) fn into_parts(self) -> (UserRecord, Option<String>) {
        (self.record, self.pending_password)
    }
}

impl From<UserRecord> for SaveRequest {
    fn from(record: UserRecord) -> Self {
        Self::new(record)
    }
}
