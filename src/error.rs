use std::fmt;

use thiserror::Error;

/// Recoverable authentication outcomes, returned to the caller as ordinary
/// results rather than infrastructure failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("account is not a local account")]
    NotLocalAccount,
    #[error("account has no local password")]
    NoPassword,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("no such user")]
    NotFound,
}

/// Error type of the authentication entry points. `Failure` is the
/// recoverable branch; the rest propagate infrastructure problems unmodified.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Failure(#[from] AuthFailure),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("password hashing failed: {0}")]
    Hash(#[source] anyhow::Error),
}

impl AuthError {
    /// The recoverable failure, if this is one.
    pub fn failure(&self) -> Option<AuthFailure> {
        match self {
            AuthError::Failure(f) => Some(*f),
            _ => None,
        }
    }
}

/// Field protected by a store-level unique index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    UserId,
    AuthToken,
    Email,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueField::UserId => write!(f, "user_id"),
            UniqueField::AuthToken => write!(f, "auth_token"),
            UniqueField::Email => write!(f, "email"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated on {0}")]
    UniquenessViolation(UniqueField),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Errors surfaced by the save pipeline. `Exhausted` signals a
/// capacity/configuration problem, not a condition the caller can retry away.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("could not obtain a unique {field} after {attempts} attempts")]
    Exhausted { field: UniqueField, attempts: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("password hashing failed: {0}")]
    Hash(#[source] anyhow::Error),
    #[error(transparent)]
    Schedule(#[from] crate::schedule::TimeOfDayError),
}
