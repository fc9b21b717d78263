use argon2::password_hash::{rand_core::OsRng, PasswordHash, SaltString};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use tokio::task::spawn_blocking;

use crate::error::{CrmError, CrmResult};

/// Argon2id hash with a random salt, computed on the blocking pool.
pub async fn hash_password(password: &str) -> CrmResult<String> {
    let password = password.to_owned();
    spawn_blocking(move || hash_now(&password)).await?
}

/// Checked on the blocking pool; any mismatch or unreadable hash is
/// [`CrmError::InvalidCredentials`].
pub async fn verify_password(password: &str, hash: &str) -> CrmResult<()> {
    let (password, hash) = (password.to_owned(), hash.to_owned());
    spawn_blocking(move || verify_now(&password, &hash)).await?
}

fn hash_now(password: &str) -> CrmResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CrmError::internal(format!("failed to hash password: {}", e)))
}

fn verify_now(password: &str, hash: &str) -> CrmResult<()> {
    let parsed = PasswordHash::new(hash).map_err(|_| CrmError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| CrmError::InvalidCredentials)
}
