//! 密码哈希
//!
//! Argon2id with a random per-hash salt embedded in the PHC string.
//! Hashing and verification are CPU-bound and run on the blocking pool.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{self, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordVerifier, Version};
use thiserror::Error;

use crate::AppError;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("hashing primitive failed: {0}")]
    Hashing(String),

    #[error("stored hash is malformed: {0}")]
    MalformedHash(String),

    #[error("hashing task aborted: {0}")]
    Join(String),
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::hashing(err.to_string())
    }
}

/// Password hasher
///
/// Cheap to clone. Verification reads the cost parameters from the stored
/// hash, so changing them only affects newly written hashes.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            params: Params::default(),
        }
    }
}

impl PasswordHasher {
    /// Custom Argon2id cost (memory in KiB, iterations, lanes)
    pub fn with_params(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self, PasswordError> {
        let params = Params::new(m_cost, t_cost, p_cost, None)
            .map_err(|e| PasswordError::Hashing(e.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash synchronously (blocking)
    pub fn hash_blocking(&self, plaintext: &str) -> Result<String, PasswordError> {
        use argon2::PasswordHasher as _;
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hashing(e.to_string()))?;
        Ok(hash.to_string())
    }

    /// Verify synchronously (blocking). A mismatch is `Ok(false)`.
    pub fn verify_blocking(&self, plaintext: &str, hash: &str) -> Result<bool, PasswordError> {
        let parsed =
            PasswordHash::new(hash).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
        match self.argon2().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::Hashing(e.to_string())),
        }
    }

    pub async fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        let hasher = self.clone();
        let plaintext = plaintext.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash_blocking(&plaintext))
            .await
            .map_err(|e| PasswordError::Join(e.to_string()))?
    }

    pub async fn verify(&self, plaintext: &str, hash: &str) -> Result<bool, PasswordError> {
        let hasher = self.clone();
        let plaintext = plaintext.to_owned();
        let hash = hash.to_owned();
        tokio::task::spawn_blocking(move || hasher.verify_blocking(&plaintext, &hash))
            .await
            .map_err(|e| PasswordError::Join(e.to_string()))?
    }
}
