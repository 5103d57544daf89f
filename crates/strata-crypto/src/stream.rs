//! AES/CFB8 stream ciphers for an established session.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes128;
use cfb8::{Decryptor, Encryptor};

use crate::{CryptoError, SECRET_LEN};

type Aes128Cfb8Enc = Encryptor<Aes128>;
type Aes128Cfb8Dec = Decryptor<Aes128>;

/// Both directions of an encrypted session.
///
/// CFB8 is stateful per byte, so the pair must sit on exactly one
/// connection and see every byte in order. Key and IV are both the shared
/// secret, matching what the clients do.
pub struct StreamCipherPair {
    encryptor: Aes128Cfb8Enc,
    decryptor: Aes128Cfb8Dec,
}

impl StreamCipherPair {
    pub fn new(secret: &[u8; SECRET_LEN]) -> Self {
        Self {
            encryptor: Aes128Cfb8Enc::new(secret.into(), secret.into()),
            decryptor: Aes128Cfb8Dec::new(secret.into(), secret.into()),
        }
    }

    /// Build from the decrypted shared-secret blob, checking its length.
    pub fn from_secret(secret: &[u8]) -> Result<Self, CryptoError> {
        let secret: &[u8; SECRET_LEN] = secret
            .try_into()
            .map_err(|_| CryptoError::BadSecretLength(secret.len()))?;
        Ok(Self::new(secret))
    }

    /// Encrypt outbound bytes in place.
    pub fn encrypt_in_place(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            let mut block = GenericArray::clone_from_slice(std::slice::from_ref(byte));
            self.encryptor.encrypt_block_mut(&mut block);
            *byte = block[0];
        }
    }

    /// Decrypt inbound bytes in place.
    pub fn decrypt_in_place(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            let mut block = GenericArray::clone_from_slice(std::slice::from_ref(byte));
            self.decryptor.decrypt_block_mut(&mut block);
            *byte = block[0];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> [u8; SECRET_LEN] {
        [7u8; SECRET_LEN]
    }

    #[test]
    fn peer_decrypts_what_we_encrypt() {
        let mut server = StreamCipherPair::new(&secret());
        let mut client = StreamCipherPair::new(&secret());

        let mut data = b"hello across the wire".to_vec();
        server.encrypt_in_place(&mut data);
        assert_ne!(&data[..], b"hello across the wire");
        client.decrypt_in_place(&mut data);
        assert_eq!(&data[..], b"hello across the wire");
    }

    #[test]
    fn cipher_state_survives_split_writes() {
        let mut whole = StreamCipherPair::new(&secret());
        let mut split = StreamCipherPair::new(&secret());

        let mut a = b"first half ".to_vec();
        let mut b = b"second half".to_vec();
        let mut joined = b"first half second half".to_vec();

        split.encrypt_in_place(&mut a);
        split.encrypt_in_place(&mut b);
        whole.encrypt_in_place(&mut joined);

        let mut rejoined = a;
        rejoined.extend_from_slice(&b);
        assert_eq!(rejoined, joined);
    }

    #[test]
    fn from_secret_rejects_wrong_length() {
        assert!(matches!(
            StreamCipherPair::from_secret(&[1, 2, 3]),
            Err(CryptoError::BadSecretLength(3))
        ));
        assert!(StreamCipherPair::from_secret(&[0u8; SECRET_LEN]).is_ok());
    }
}
