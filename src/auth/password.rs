use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, Salt, SaltString},
    Argon2,
};
use subtle::ConstantTimeEq;
use tracing::error;

/// Password hashing primitive. `hash` is deterministic for a given salt;
/// `verify` recomputes over the stored salt and compares in constant time.
pub trait Hasher: Send + Sync {
    fn generate_salt(&self) -> String;

    fn hash(&self, plaintext: &str, salt: &str) -> anyhow::Result<String>;

    fn verify(&self, plaintext: &str, salt: &str, expected: &str) -> anyhow::Result<bool> {
        let computed = self.hash(plaintext, salt)?;
        Ok(computed.as_bytes().ct_eq(expected.as_bytes()).into())
    }
}

/// Argon2 with default parameters, salts in PHC B64 form.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl Hasher for Argon2Hasher {
    fn generate_salt(&self) -> String {
        SaltString::generate(&mut OsRng).as_str().to_owned()
    }

    fn hash(&self, plaintext: &str, salt: &str) -> anyhow::Result<String> {
        let salt = Salt::from_b64(salt).map_err(|e| {
            error!(error = %e, "argon2 salt parse error");
            anyhow::anyhow!(e.to_string())
        })?;
        let hash = Argon2::default()
            .hash_password(plaintext.as_bytes(), salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                anyhow::anyhow!(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }
}
