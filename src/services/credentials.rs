//! Credential primitives
//!
//! - Password hashing with Argon2id (PHC strings, random salt per hash)
//! - The password length policy applied at signup
//! - Single-use confirmation tokens: 32 random bytes handed out as hex,
//!   stored only as their SHA-256 digest

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{
        rand_core::{OsRng, RngCore},
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2,
};
use data_encoding::HEXLOWER;
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

/// Hash a password using Argon2id with the crate's default parameters.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("Failed to hash password: {}", e))?;

    Ok(hash.to_string())
}

/// Verify a password against a stored PHC hash.
///
/// A mismatch is `Ok(false)`; a malformed hash is an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| anyhow!("Invalid password hash format: {}", e))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow!("Password verification failed: {}", e)),
    }
}

/// Check a candidate password against the length policy.
///
/// Length is counted in characters, not bytes.
pub fn check_password_policy(password: &str, min_length: usize) -> Result<(), String> {
    if password.chars().count() < min_length {
        return Err(format!(
            "Password must be at least {} characters",
            min_length
        ));
    }
    Ok(())
}

/// A freshly generated confirmation token
#[derive(Debug, Clone)]
pub struct ConfirmationToken {
    /// Sent to the user inside the confirmation link
    pub plain: String,
    /// Persisted for lookup
    pub digest: String,
}

impl ConfirmationToken {
    pub fn generate() -> Result<Self> {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| anyhow!("{}", e))
            .context("Failed to gather randomness for confirmation token")?;
        let plain = HEXLOWER.encode(&bytes);
        let digest = token_digest(&plain);
        Ok(Self { plain, digest })
    }
}

/// SHA-256 hex digest of a presented token
pub fn token_digest(token: &str) -> String {
    HEXLOWER.encode(&Sha256::digest(token.as_bytes()))
}
