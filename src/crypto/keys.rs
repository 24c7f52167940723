//! ECDSA signing and verification over secp256k1
//!
//! Signatures travel as strict DER with a low S value, the form Bitcoin
//! consensus and standardness rules accept inside a witness.

use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

/// Errors that can occur during key operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature encoding")]
    InvalidSignature,
    #[error("Signature is not in low-S form")]
    HighS,
    #[error("Signature verification failed")]
    VerificationFailed,
    #[error("Digest must be 32 bytes, got {0}")]
    InvalidDigest(usize),
}

/// Parse a compressed or uncompressed SEC1 public key
pub fn public_key_from_slice(bytes: &[u8]) -> Result<PublicKey, KeyError> {
    PublicKey::from_slice(bytes).map_err(|_| KeyError::InvalidPublicKey)
}

/// Sign a 32-byte digest, returning a DER encoded low-S signature
pub fn sign_digest(secret_key: &SecretKey, digest: &[u8; 32]) -> Vec<u8> {
    let secp = Secp256k1::new();
    let message = Message::from_digest(*digest);
    let signature = secp.sign_ecdsa(&message, secret_key);
    signature.serialize_der().to_vec()
}

/// Verify a DER signature over a 32-byte digest
///
/// Rejects non-strict DER encodings and high-S signatures before checking the
/// curve equation, so a malleated signature is reported as such.
pub fn verify_der(public_key: &PublicKey, digest: &[u8], der: &[u8]) -> Result<(), KeyError> {
    if digest.len() != 32 {
        return Err(KeyError::InvalidDigest(digest.len()));
    }
    let secp = Secp256k1::verification_only();
    let message =
        Message::from_digest_slice(digest).map_err(|_| KeyError::InvalidDigest(digest.len()))?;
    let signature = Signature::from_der(der).map_err(|_| KeyError::InvalidSignature)?;

    let mut normalized = signature;
    normalized.normalize_s();
    if normalized != signature {
        return Err(KeyError::HighS);
    }

    secp.verify_ecdsa(&message, &signature, public_key)
        .map_err(|_| KeyError::VerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha256;
    use rand::rngs::OsRng;

    #[test]
    fn test_sign_and_verify() {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        let digest = sha256(b"Hello, cold storage!");

        let der = sign_digest(&secret_key, &digest);
        assert!(verify_der(&public_key, &digest, &der).is_ok());

        let other = sha256(b"something else");
        assert_eq!(
            verify_der(&public_key, &other, &der),
            Err(KeyError::VerificationFailed)
        );
    }

    #[test]
    fn test_rejects_high_s() {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        let digest = sha256(b"malleable");
        let der = sign_digest(&secret_key, &digest);

        // Flip S to n - S to produce the high-S twin of a valid signature
        let signature = Signature::from_der(&der).unwrap();
        let compact = signature.serialize_compact();
        let order: [u8; 32] = bitcoin::secp256k1::constants::CURVE_ORDER;
        let mut high_s = [0u8; 32];
        let mut borrow = 0i16;
        for i in (0..32).rev() {
            let diff = order[i] as i16 - compact[32 + i] as i16 - borrow;
            if diff < 0 {
                high_s[i] = (diff + 256) as u8;
                borrow = 1;
            } else {
                high_s[i] = diff as u8;
                borrow = 0;
            }
        }
        let mut twin = [0u8; 64];
        twin[..32].copy_from_slice(&compact[..32]);
        twin[32..].copy_from_slice(&high_s);
        let twin_der = Signature::from_compact(&twin).unwrap().serialize_der().to_vec();

        assert_eq!(
            verify_der(&public_key, &digest, &twin_der),
            Err(KeyError::HighS)
        );
    }

    #[test]
    fn test_rejects_garbage() {
        let secp = Secp256k1::new();
        let (_, public_key) = secp.generate_keypair(&mut OsRng);
        assert_eq!(
            verify_der(&public_key, &[0u8; 32], &[0x30, 0x01, 0x00]),
            Err(KeyError::InvalidSignature)
        );
        assert_eq!(
            verify_der(&public_key, &[0u8; 31], &[]),
            Err(KeyError::InvalidDigest(31))
        );
    }
}
