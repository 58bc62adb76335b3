//! Small helpers for secrets, hashing and identifier validation.

use anyhow::{Context, Result};
use base64::Engine;
use rand::{RngCore, rngs::OsRng};
use regex::Regex;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Create a random result-token secret for out-of-band delivery.
pub(crate) fn generate_token_secret() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate result token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Hash a session token so raw values never touch the database.
pub(crate) fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Compare secrets without leaking the mismatch position through timing.
pub(crate) fn secrets_match(submitted: &str, stored: &str) -> bool {
    submitted.as_bytes().ct_eq(stored.as_bytes()).into()
}

/// Public student and class identifiers: short, printable, no separators.
pub(crate) fn valid_public_id(value: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,63}$").is_ok_and(|regex| regex.is_match(value))
}
