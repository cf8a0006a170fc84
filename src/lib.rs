//! wakemind - identity, session and availability core for user accounts.
//!
//! This crate owns the pieces of the user model with real invariants:
//! - password-based login against a pluggable store
//! - opaque session-token issuance, renewal and expiry
//! - unique numeric identifier allocation under collision
//! - sleep/wake schedule normalization to seconds-since-midnight UTC,
//!   snooze windows and the "who is asleep right now" batch query
//!
//! Persistence, hashing, time and event announcement are consumed through
//! traits; Postgres, argon2, wall-clock and tracing implementations ship
//! in-crate. Transport and presentation live in the API layer above.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod notify;
pub mod schedule;
pub mod store;
pub mod token;
pub mod user;

pub use auth::password::{Argon2Hasher, Hasher};
pub use auth::service::{AuthenticationService, SnoozeStatus};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::CoreConfig;
pub use error::{AuthError, AuthFailure, SaveError, StoreError, UniqueField};
pub use identity::IdentityAllocator;
pub use notify::{EventNotifier, TracingNotifier};
pub use store::{MemoryUserStore, PgUserStore, UserStore};
pub use token::TokenManager;
pub use user::record::{SaveRequest, UserRecord};
pub use user::service::UserService;
