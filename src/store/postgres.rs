use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::{StoreError, UniqueField};
use crate::store::UserStore;
use crate::user::record::UserRecord;

const USER_COLUMNS: &str = r#"
    id, user_id, email, password_hash, password_salt, is_external_user,
    auth_token, token_expiry, utc_offset_hours, wake_up_local, sleep_local,
    wake_up_utc_seconds, sleep_utc_seconds, available_from, snooze_period,
    created_at
"#;

/// Postgres-backed [`UserStore`].
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self::new(pool))
    }

    pub async fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
        Self::connect(&url).await
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a constraint hit on one of the unique indexes; anything else is a
/// backend failure.
fn map_sqlx(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.code().as_deref() == Some("23505") {
            let constraint = db.constraint().unwrap_or_default();
            if constraint.contains("user_id") {
                return StoreError::UniquenessViolation(UniqueField::UserId);
            }
            if constraint.contains("auth_token") {
                return StoreError::UniquenessViolation(UniqueField::AuthToken);
            }
            if constraint.contains("email") {
                return StoreError::UniquenessViolation(UniqueField::Email);
            }
        }
    }
    StoreError::Backend(anyhow::Error::new(e))
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE LOWER(email) = LOWER($1)
            "#,
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(user)
    }

    async fn find_by_user_id(&self, user_id: i64) -> Result<Option<UserRecord>, StoreError> {
        let user = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE user_id = $1
            "#,
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(user)
    }

    async fn exists_by_user_id(&self, user_id: i64) -> Result<bool, StoreError> {
        let exists: (bool,) =
            sqlx::query_as(r#"SELECT EXISTS(SELECT 1 FROM users WHERE user_id = $1)"#)
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)?;
        Ok(exists.0)
    }

    async fn exists_by_auth_token(&self, token: &str) -> Result<bool, StoreError> {
        let exists: (bool,) =
            sqlx::query_as(r#"SELECT EXISTS(SELECT 1 FROM users WHERE auth_token = $1)"#)
                .bind(token)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)?;
        Ok(exists.0)
    }

    async fn save(&self, record: &UserRecord) -> Result<UserRecord, StoreError> {
        let saved = match record.id {
            None => {
                sqlx::query_as::<_, UserRecord>(&format!(
                    r#"
                    INSERT INTO users (
                        user_id, email, password_hash, password_salt,
                        is_external_user, auth_token, token_expiry,
                        utc_offset_hours, wake_up_local, sleep_local,
                        wake_up_utc_seconds, sleep_utc_seconds,
                        available_from, snooze_period
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
                    RETURNING {USER_COLUMNS}
                    "#,
                ))
                .bind(record.user_id)
                .bind(&record.email)
                .bind(&record.password_hash)
                .bind(&record.password_salt)
                .bind(record.is_external_user)
                .bind(&record.auth_token)
                .bind(record.token_expiry)
                .bind(record.utc_offset_hours)
                .bind(&record.wake_up_local)
                .bind(&record.sleep_local)
                .bind(record.wake_up_utc_seconds)
                .bind(record.sleep_utc_seconds)
                .bind(record.available_from)
                .bind(&record.snooze_period)
                .fetch_one(&self.pool)
                .await
            }
            Some(id) => {
                sqlx::query_as::<_, UserRecord>(&format!(
                    r#"
                    UPDATE users SET
                        user_id = $2, email = $3, password_hash = $4,
                        password_salt = $5, is_external_user = $6,
                        auth_token = $7, token_expiry = $8,
                        utc_offset_hours = $9, wake_up_local = $10,
                        sleep_local = $11, wake_up_utc_seconds = $12,
                        sleep_utc_seconds = $13, available_from = $14,
                        snooze_period = $15
                    WHERE id = $1
                    RETURNING {USER_COLUMNS}
                    "#,
                ))
                .bind(id)
                .bind(record.user_id)
                .bind(&record.email)
                .bind(&record.password_hash)
                .bind(&record.password_salt)
                .bind(record.is_external_user)
                .bind(&record.auth_token)
                .bind(record.token_expiry)
                .bind(record.utc_offset_hours)
                .bind(&record.wake_up_local)
                .bind(&record.sleep_local)
                .bind(record.wake_up_utc_seconds)
                .bind(record.sleep_utc_seconds)
                .bind(record.available_from)
                .bind(&record.snooze_period)
                .fetch_one(&self.pool)
                .await
            }
        }
        .map_err(map_sqlx)?;
        Ok(saved)
    }

    async fn find_asleep_at(&self, now_secs: i32) -> Result<Vec<UserRecord>, StoreError> {
        // Window wraps past midnight; each row is tested against its own
        // derived thresholds.
        let rows = sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE $1 <= sleep_utc_seconds OR $1 >= wake_up_utc_seconds
            "#,
        ))
        .bind(now_secs)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(rows)
    }
}
