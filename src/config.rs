use std::str::FromStr;

use serde::Deserialize;

/// Tunables for identifier allocation, token lifetime and persist retries.
#[derive(Debug, Clone, Deserialize)]
pub struct CoreConfig {
    /// Reserved 6-digit namespace prefix for allocated user ids.
    pub id_prefix: i64,
    /// Digits in the random, zero-padded id suffix.
    pub id_suffix_digits: u32,
    /// Session lifetime granted by a renewal, in whole days.
    pub token_ttl_days: i64,
    /// Cap on uniqueness probes when generating an id or token.
    pub unique_attempts: u32,
    /// Cap on persist retries after store-level uniqueness rejections.
    pub save_attempts: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            id_prefix: 880_000,
            id_suffix_digits: 10,
            token_ttl_days: 30,
            unique_attempts: 16,
            save_attempts: 5,
        }
    }
}

impl CoreConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            id_prefix: env_or("WAKEMIND_ID_PREFIX", defaults.id_prefix),
            id_suffix_digits: env_or("WAKEMIND_ID_SUFFIX_DIGITS", defaults.id_suffix_digits),
            token_ttl_days: env_or("WAKEMIND_TOKEN_TTL_DAYS", defaults.token_ttl_days),
            unique_attempts: env_or("WAKEMIND_UNIQUE_ATTEMPTS", defaults.unique_attempts),
            save_attempts: env_or("WAKEMIND_SAVE_ATTEMPTS", defaults.save_attempts),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
