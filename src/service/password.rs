use argon2::{
    Argon2,
    password_hash::{
        PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        rand_core::{OsRng, RngCore},
    },
};
use base64::Engine;

use crate::error::LedgerError;

/// Argon2id hash in PHC string form. CPU-bound; call from a blocking task.
pub fn hash_password(password: &str) -> Result<String, LedgerError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| LedgerError::Password(e.to_string()))
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, LedgerError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| LedgerError::Password(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub async fn hash_password_blocking(password: String) -> Result<String, LedgerError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| LedgerError::Password(format!("hash task failed: {e}")))?
}

pub async fn verify_password_blocking(password: String, stored_hash: String) -> Result<bool, LedgerError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| LedgerError::Password(format!("verify task failed: {e}")))?
}

/// Opaque 256-bit session token, URL-safe.
pub fn new_session_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_only_the_original_password() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn garbage_hash_is_an_error() {
        assert!(verify_password("x", "not-a-phc-string").is_err());
    }

    #[test]
    fn session_tokens_are_unique() {
        let a = new_session_token();
        assert_eq!(a.len(), 43);
        assert_ne!(a, new_session_token());
    }
}
