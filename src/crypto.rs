//! Key derivation and password verification.
//!
//! Key derivation: scrypt(password, salt = IV word 0 as 8 big-endian bytes)
//! → 32-byte key.  The default cost is N=2^20, r=8, p=1 — deliberately
//! expensive, around a gigabyte of scratch memory and a noticeable pause.
//!
//! The 32-byte SHA-256 of the password is stored in the plaintext header and
//! compared on open; it verifies the password without touching the key.

use scrypt::{scrypt, Params};
use sha2::{Digest, Sha256};

use crate::transformer::CipherError;

/// scrypt cost parameters.
///
/// Not stored in the image header — a container created with non-default
/// parameters must be opened with the same ones.  [`Default`] is the frozen
/// production cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// log2 of the scrypt N parameter.
    pub log_n: u8,
    pub r:     u32,
    pub p:     u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfParams { log_n: 20, r: 8, p: 1 }
    }
}

/// Derive the 256-bit cipher key from the password and the first IV word.
pub fn derive_key(
    password: &str,
    salt_word: u64,
    params: &KdfParams,
) -> Result<[u8; 32], CipherError> {
    let params = Params::new(params.log_n, params.r, params.p, 32)
        .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;
    let mut key = [0u8; 32];
    scrypt(password.as_bytes(), &salt_word.to_be_bytes(), &params, &mut key)
        .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

/// SHA-256 of the password, as stored at header offset 40.
pub fn hash_password(password: &str) -> [u8; 32] {
    Sha256::digest(password.as_bytes()).into()
}
