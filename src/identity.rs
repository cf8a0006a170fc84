use std::sync::Arc;

use rand::Rng;
use tracing::{debug, warn};

use crate::config::CoreConfig;
use crate::error::{SaveError, UniqueField};
use crate::store::UserStore;

/// Allocates the unique numeric user identifier: a reserved 6-digit prefix
/// followed by a zero-padded random suffix, probed against the store and
/// regenerated on collision. The store's unique index stays the correctness
/// anchor; the probe only avoids doomed writes.
pub struct IdentityAllocator {
    store: Arc<dyn UserStore>,
    prefix: i64,
    suffix_span: i64,
    max_attempts: u32,
}

impl IdentityAllocator {
    pub fn new(store: Arc<dyn UserStore>, config: &CoreConfig) -> Self {
        debug_assert!((100_000..1_000_000).contains(&config.id_prefix));
        Self {
            store,
            prefix: config.id_prefix,
            suffix_span: 10_i64.pow(config.id_suffix_digits),
            max_attempts: config.unique_attempts,
        }
    }

    // Numeric equivalent of concatenating the prefix with a zero-padded
    // random suffix.
    fn candidate(&self) -> i64 {
        self.prefix * self.suffix_span + rand::thread_rng().gen_range(0..self.suffix_span)
    }

    /// Allocate an identifier not currently present in the store. Called
    /// exactly once per record, before its first persist.
    pub async fn allocate(&self) -> Result<i64, SaveError> {
        for attempt in 1..=self.max_attempts {
            let candidate = self.candidate();
            if !self.store.exists_by_user_id(candidate).await? {
                debug!(user_id = candidate, attempt, "user id allocated");
                return Ok(candidate);
            }
            warn!(user_id = candidate, attempt, "user id collision, regenerating");
        }
        Err(SaveError::Exhausted {
            field: UniqueField::UserId,
            attempts: self.max_attempts,
        })
    }
}
