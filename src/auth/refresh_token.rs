//! Opaque refresh token generation and verification.
//!
//! Only the SHA-256 hash of a refresh secret is ever persisted; the plaintext
//! is handed to the client exactly once at issuance/rotation and is
//! unrecoverable afterwards. Verification recomputes the hash and compares in
//! constant time.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// A freshly issued refresh secret plus the hash the caller should persist.
#[derive(Debug)]
pub struct IssuedRefreshToken {
    pub plaintext: String,
    pub hash: Vec<u8>,
}

/// Generate a new high-entropy refresh secret and its storable hash.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn issue() -> Result<IssuedRefreshToken> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate refresh token")?;
    let plaintext = Base64UrlUnpadded::encode_string(&bytes);
    let hash = hash(&plaintext);
    Ok(IssuedRefreshToken { plaintext, hash })
}

/// Hash a refresh secret so raw values never touch the database.
#[must_use]
pub fn hash(plaintext: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hasher.finalize().to_vec()
}

/// Constant-time check of a presented secret against a stored hash.
#[must_use]
pub fn verify(plaintext: &str, stored_hash: &[u8]) -> bool {
    let computed = hash(plaintext);
    computed.ct_eq(stored_hash).into()
}
