//! Gateway request signatures
//!
//! The gateway signs every `SignTxRequest` it emits with a long-lived request
//! key. Devices are provisioned with the matching public key and refuse any
//! request whose signature does not verify, so a request altered between the
//! gateway and the device never reaches the operator's approval screen.

use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use rand::rngs::OsRng;
use std::fmt;

use super::message::SignTxRequest;
use crate::crypto::{sha256, sign_digest, verify_der};
use crate::error::{Error, Result};

const DOMAIN: &[u8] = b"coldvault/sign-request";

/// Digest the request signature covers: every field except the signature
pub fn request_digest(wallet_id: u32, req: &SignTxRequest) -> Result<[u8; 32]> {
    let fields = bincode::serde::encode_to_vec(
        (&req.descriptor, &req.gateway, &req.tx, &req.cosigner),
        bincode::config::standard(),
    )
    .map_err(|e| Error::MalformedEnvelope(format!("encoding failed: {}", e)))?;

    let mut data = Vec::with_capacity(DOMAIN.len() + 4 + fields.len());
    data.extend_from_slice(DOMAIN);
    data.extend_from_slice(&wallet_id.to_be_bytes());
    data.extend_from_slice(&fields);
    Ok(sha256(&data))
}

/// Check `req.request_signature` against the gateway's request key
pub fn verify_request(wallet_id: u32, req: &SignTxRequest, key: &PublicKey) -> Result<()> {
    let digest = request_digest(wallet_id, req)?;
    verify_der(key, &digest, &req.request_signature).map_err(|e| Error::SignatureMismatch {
        cosigner: req.cosigner.index,
        input: None,
        reason: format!("gateway request signature: {}", e),
    })
}

/// The gateway's request signing key
#[derive(Clone)]
pub struct RequestSigner {
    secret: SecretKey,
}

impl fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSigner")
            .field("public_key", &self.public_key())
            .finish()
    }
}

impl RequestSigner {
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| Error::Config(format!("invalid request key: {}", e)))?;
        Ok(RequestSigner { secret })
    }

    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| Error::Config(format!("request key is not hex: {}", e)))?;
        RequestSigner::from_secret_bytes(&bytes)
    }

    /// Fresh random key, for one-shot demos
    pub fn generate() -> Self {
        let (secret, _) = Secp256k1::new().generate_keypair(&mut OsRng);
        RequestSigner { secret }
    }

    /// Key devices pin to accept requests from this gateway
    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key(&Secp256k1::signing_only())
    }

    /// DER signature over [`request_digest`]
    pub fn sign(&self, wallet_id: u32, req: &SignTxRequest) -> Result<Vec<u8>> {
        Ok(sign_digest(&self.secret, &request_digest(wallet_id, req)?))
    }

    /// Fill in `req.request_signature`
    pub fn sign_in_place(&self, wallet_id: u32, req: &mut SignTxRequest) -> Result<()> {
        req.request_signature = self.sign(wallet_id, req)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ceremony::fixture::{request_signer, sample_tx, setup, WALLET_ID};
    use crate::transaction::Destination;

    fn signed_request() -> SignTxRequest {
        let fx = setup(2, 3);
        let mut req = SignTxRequest {
            descriptor: fx.descriptor.clone(),
            gateway: fx.gateway,
            tx: sample_tx(),
            cosigner: fx.keys[0].clone(),
            request_signature: Vec::new(),
        };
        request_signer().sign_in_place(WALLET_ID, &mut req).unwrap();
        req
    }

    #[test]
    fn test_signed_request_verifies() {
        let req = signed_request();
        let key = request_signer().public_key();
        assert!(verify_request(WALLET_ID, &req, &key).is_ok());
    }

    #[test]
    fn test_tampered_request_fails() {
        let key = request_signer().public_key();
        let original = signed_request();

        let mut req = original.clone();
        req.tx.outputs[0].amount += 1;
        assert!(matches!(
            verify_request(WALLET_ID, &req, &key),
            Err(Error::SignatureMismatch { input: None, .. })
        ));

        let mut req = original.clone();
        req.tx.outputs[0].destination = Destination::Change;
        assert!(verify_request(WALLET_ID, &req, &key).is_err());

        // Replayed under another wallet id
        assert!(verify_request(WALLET_ID + 1, &original, &key).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let req = signed_request();
        let other = RequestSigner::from_secret_bytes(&[0x25; 32]).unwrap();
        assert!(verify_request(WALLET_ID, &req, &other.public_key()).is_err());
    }

    #[test]
    fn test_key_parsing() {
        let signer = RequestSigner::from_hex(&hex::encode([0x24; 32])).unwrap();
        assert_eq!(signer.public_key(), request_signer().public_key());
        assert!(matches!(RequestSigner::from_hex("zz"), Err(Error::Config(_))));
        assert!(matches!(
            RequestSigner::from_secret_bytes(&[0u8; 32]),
            Err(Error::Config(_))
        ));
        assert!(!format!("{:?}", signer).contains(&hex::encode([0x24; 32])));
    }
}
