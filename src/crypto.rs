//! Token primitives
//!
//! - **Generation**: 32 bytes from the OS CSPRNG, base64url without padding
//! - **Digest**: stores index sessions by SHA-256 of the token so a dump of
//!   the store does not hand out live credentials
//! - **Fingerprint**: a short hex prefix of the digest, safe to log

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Random bytes per session token (256 bits)
pub const TOKEN_BYTES: usize = 32;

/// Length of an encoded token: ceil(32 * 4 / 3) without padding
pub const TOKEN_LEN: usize = 43;

/// SHA-256 digest of a session token
pub type TokenDigest = [u8; 32];

/// Generate a fresh session token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Digest a token for storage and lookup.
pub fn token_digest(token: &str) -> TokenDigest {
    Sha256::digest(token.as_bytes()).into()
}

/// First 8 bytes of the digest as hex, used as a loggable session id.
pub fn fingerprint(digest: &TokenDigest) -> String {
    let mut out = String::with_capacity(16);
    for b in &digest[..8] {
        let _ = write!(out, "{:02x}", b);
    }
    out
}
