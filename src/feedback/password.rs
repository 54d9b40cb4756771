use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng};
use argon2::Argon2;

use crate::errors::{FeedbackError, FeedbackResult};

/// Hash a password with Argon2 and a fresh random salt (PHC string format).
pub fn hash_password(password: &str) -> FeedbackResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| FeedbackError::Internal(format!("Failed to hash password: {}", e)))
}

/// `Ok(false)` on mismatch. A stored hash that cannot be parsed is an
/// internal error, not a failed login.
pub fn verify_password(password: &str, stored_hash: &str) -> FeedbackResult<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| FeedbackError::Internal(format!("Stored password hash is invalid: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
