//! Password hashing for stored credentials.
//!
//! Hashes are argon2id PHC strings with a per-record random salt. Verification
//! is side-effect free.

use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use tracing::error;

lazy_static! {
    /// Stand-in hash checked when no account matches, so an unknown identity
    /// costs the same argon2 work as a wrong password.
    static ref DUMMY_HASH: Option<String> = hash_password("agil-no-such-account").ok();
}

fn argon2() -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default())
}

fn hash_error(op: &'static str, e: password_hash::Error) -> anyhow::Error {
    error!(error = %e, op, "argon2 error");
    anyhow::anyhow!("{op}: {e}")
}

/// Hash with argon2id and a fresh random salt. Returns a PHC string.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    argon2()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| hash_error("hash password", e))
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash cannot be parsed.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| hash_error("parse stored hash", e))?;
    // The PHC string carries its own algorithm and params.
    Ok(argon2().verify_password(plain.as_bytes(), &parsed).is_ok())
}

/// Burn one verification against [`DUMMY_HASH`]. Always a non-match.
pub fn verify_dummy(plain: &str) {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        let _ = verify_password(plain, hash);
    }
}
