//! Sealing of device seeds
//!
//! Layout: `version(1) | nonce(12) | ciphertext ‖ tag(16)`. The associated
//! data binds a blob to its wallet and slot, so a blob moved to another slot
//! or wallet fails to open.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

const SEAL_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

fn associated_data(wallet_id: u32, slot: u32) -> Vec<u8> {
    let mut aad = b"coldvault/seed".to_vec();
    aad.extend_from_slice(&wallet_id.to_be_bytes());
    aad.extend_from_slice(&slot.to_be_bytes());
    aad
}

/// Symmetric key that never leaves the device
pub struct VaultKey(Zeroizing<[u8; 32]>);

impl VaultKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        VaultKey(Zeroizing::new(bytes))
    }

    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut bytes[..]);
        VaultKey(bytes)
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0[..]))
    }

    /// Encrypt `seed` for `(wallet_id, slot)`
    pub fn seal(&self, seed: &[u8], wallet_id: u32, slot: u32) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let aad = associated_data(wallet_id, slot);
        let ciphertext = self
            .cipher()
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: seed,
                    aad: &aad,
                },
            )
            .map_err(|_| Error::InvalidDerivation("sealing the seed failed".into()))?;

        let mut out = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        out.push(SEAL_VERSION);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt a blob sealed by this key for `(wallet_id, slot)`
    ///
    /// `None` means the blob belongs to another device, wallet or slot, or
    /// was altered.
    pub fn open(&self, blob: &[u8], wallet_id: u32, slot: u32) -> Option<Zeroizing<Vec<u8>>> {
        if blob.len() < 1 + NONCE_LEN + TAG_LEN || blob[0] != SEAL_VERSION {
            return None;
        }
        let (nonce, ciphertext) = blob[1..].split_at(NONCE_LEN);
        let aad = associated_data(wallet_id, slot);
        self.cipher()
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .ok()
            .map(Zeroizing::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_and_open() {
        let key = VaultKey::generate();
        let blob = key.seal(&[7u8; 64], 1, 2).unwrap();
        assert_eq!(blob.len(), 1 + 12 + 64 + 16);
        assert_eq!(key.open(&blob, 1, 2).unwrap().as_slice(), &[7u8; 64]);
    }

    #[test]
    fn test_binding() {
        let key = VaultKey::generate();
        let blob = key.seal(&[7u8; 64], 1, 2).unwrap();
        assert!(key.open(&blob, 1, 3).is_none());
        assert!(key.open(&blob, 2, 2).is_none());
        assert!(VaultKey::generate().open(&blob, 1, 2).is_none());

        let mut tampered = blob.clone();
        tampered[20] ^= 1;
        assert!(key.open(&tampered, 1, 2).is_none());
        assert!(key.open(&blob[..10], 1, 2).is_none());
    }
}
