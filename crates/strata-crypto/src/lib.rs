//! Session crypto for the framed login handshake.
//!
//! The native dialect requires encryption: the server offers a fresh RSA
//! public key and a random verify token, the client answers with both
//! encrypted, and on a token match the decrypted shared secret keys an
//! AES/CFB8 stream cipher per direction.

use sha2::{Digest, Sha256};
use thiserror::Error;

pub mod keypair;
pub mod stream;

pub use keypair::ServerKeyPair;
pub use stream::StreamCipherPair;

/// Verify token length offered in the encryption request.
pub const VERIFY_TOKEN_LEN: usize = 4;

/// Shared secret / AES key length.
pub const SECRET_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("rsa failure: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("public key encoding failure: {0}")]
    KeyEncoding(#[from] rsa::pkcs8::spki::Error),

    #[error("shared secret is {0} bytes, wanted {SECRET_LEN}")]
    BadSecretLength(usize),

    #[error("verify token mismatch")]
    TokenMismatch,
}

/// Fresh random verify token.
pub fn verify_token() -> [u8; VERIFY_TOKEN_LEN] {
    rand::random()
}

/// Deterministic offline-mode identity for a username.
///
/// Digest of the marked username, truncated to 128 bits with the version
/// and variant bits forced so the result reads as a name-derived UUID.
pub fn offline_uuid(username: &str) -> [u8; 16] {
    let mut hasher = Sha256::new();
    hasher.update(b"OfflinePlayer:");
    hasher.update(username.as_bytes());
    let digest = hasher.finalize();
    let mut raw = [0u8; 16];
    raw.copy_from_slice(&digest[..16]);
    raw[6] = (raw[6] & 0x0F) | 0x30;
    raw[8] = (raw[8] & 0x3F) | 0x80;
    raw
}
