//! Per-login RSA keypair.

use rand::rngs::OsRng;
use rsa::pkcs8::EncodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::CryptoError;

const KEY_BITS: usize = 1024;

/// Server-side RSA keypair offered during the encryption handshake.
///
/// A fresh pair per login attempt; the public half travels as DER so any
/// client generation can parse it.
pub struct ServerKeyPair {
    private: RsaPrivateKey,
    public_der: Vec<u8>,
}

impl ServerKeyPair {
    pub fn generate() -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, KEY_BITS)?;
        let public_der = private.to_public_key().to_public_key_der()?.into_vec();
        Ok(Self {
            private,
            public_der,
        })
    }

    /// X.509 SubjectPublicKeyInfo encoding of the public half.
    pub fn public_key_der(&self) -> &[u8] {
        &self.public_der
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.private.to_public_key()
    }

    /// Decrypt a PKCS#1 v1.5 blob from the client (shared secret or echoed
    /// verify token).
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(self.private.decrypt(Pkcs1v15Encrypt, ciphertext)?)
    }
}
