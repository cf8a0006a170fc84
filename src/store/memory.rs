use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{StoreError, UniqueField};
use crate::schedule;
use crate::store::UserStore;
use crate::user::record::UserRecord;

/// In-process store with the same unique indexes as the Postgres schema.
/// Backs tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    rows: Mutex<Vec<UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().expect("store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let rows = self.rows.lock().expect("store poisoned");
        Ok(rows
            .iter()
            .find(|r| r.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_user_id(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
        let rows = self.rows.lock().expect("store poisoned");
        Ok(rows.iter().find(|r| r.user_id == Some(user_id)).cloned())
    }

    async fn exists_by_user_id(&self, user_id: i64) -> Result<bool, StoreError> {
        let rows = self.rows.lock().expect("store poisoned");
        Ok(rows.iter().any(|r| r.user_id == Some(user_id)))
    }

    async fn exists_by_auth_token(&self, token: &str) -> Result<bool, StoreError> {
        let rows = self.rows.lock().expect("store poisoned");
        Ok(rows.iter().any(|r| r.auth_token.as_deref() == Some(token)))
    }

    async fn save(&self, record: &UserRecord) -> Result<UserRecord, StoreError> {
        let mut rows = self.rows.lock().expect("store poisoned");

        let mut stored = record.clone();
        if stored.id.is_none() {
            stored.id = Some(Uuid::new_v4());
        }
        if stored.created_at.is_none() {
            stored.created_at = Some(OffsetDateTime::now_utc());
        }

        // Unique indexes, checked against every other row.
        for other in rows.iter().filter(|r| r.id != stored.id) {
            if stored.user_id.is_some() && other.user_id == stored.user_id {
                return Err(StoreError::UniquenessViolation(UniqueField::UserId));
            }
            if stored.auth_token.is_some() && other.auth_token == stored.auth_token {
                return Err(StoreError::UniquenessViolation(UniqueField::AuthToken));
            }
            if other.email.eq_ignore_ascii_case(&stored.email) {
                return Err(StoreError::UniquenessViolation(UniqueField::Email));
            }
        }

        if let Some(row) = rows.iter_mut().find(|r| r.id == stored.id) {
            *row = stored.clone();
        } else {
            rows.push(stored.clone());
        }
        Ok(stored)
    }

    async fn find_asleep_at(&self, now_secs: i32) -> Result<Vec<UserRecord>, StoreError> {
        let rows = self.rows.lock().expect("store poisoned");
        Ok(rows
            .iter()
            .filter(|r| {
                schedule::in_sleep_window(now_secs, r.wake_up_utc_seconds, r.sleep_utc_seconds)
            })
            .cloned()
            .collect())
    }
}
