use async_trait::async_trait;

use crate::error::StoreError;
use crate::user::record::UserRecord;

pub mod memory;
pub mod postgres;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;

/// Persistence seam for user records.
///
/// `save` must reject duplicates on the unique fields with
/// [`StoreError::UniquenessViolation`]; the in-process collision probes are
/// only an optimization over that constraint.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Exact, case-insensitive email lookup.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_user_id(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError>;

    async fn exists_by_user_id(&self, user_id: i64) -> Result<bool, StoreError>;

    async fn exists_by_auth_token(&self, token: &str) -> Result<bool, StoreError>;

    /// Insert or update, returning the stored row.
    async fn save(&self, record: &UserRecord) -> Result<UserRecord, StoreError>;

    /// Records inside their sleep window at `now_secs` (seconds since
    /// midnight UTC), each evaluated against its own derived thresholds.
    async fn find_asleep_at(&self, now_secs: i32) -> Result<Vec<UserRecord>, StoreError>;
}
