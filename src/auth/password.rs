//! Credential hashing collaborator
//!
//! Argon2id with default parameters; hashes are PHC strings carrying their own salt.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::FavorrError;

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, FavorrError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| FavorrError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, hash: &str) -> Result<bool, FavorrError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| FavorrError::Internal(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
