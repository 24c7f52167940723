//! Stage messages exchanged between the gateway and the offline devices

use crate::crypto::{Network, Xpub};
use crate::error::{Error, Result};
use crate::script::validate_threshold;
use crate::transaction::UnsignedTransaction;
use crate::wallet::{CosignerKey, WalletDescriptor};
use serde::{Deserialize, Serialize};

/// Asks the device in `slot` to create its key for a new wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitWalletRequest {
    pub network: Network,
    pub slot: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitWalletResponse {
    pub cosigner: CosignerKey,
}

/// Every cosigner's key, sent back to each device for attestation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeWalletRequest {
    pub network: Network,
    pub threshold: u32,
    pub cosigners: Vec<CosignerKey>,
}

/// A device's signature over the descriptor it rebuilt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeWalletResponse {
    pub cosigner: u32,
    pub xpub: Xpub,
    /// DER signature by the account key over the descriptor digest
    pub attestation: Vec<u8>,
}

/// Everything one device needs to review and sign a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignTxRequest {
    pub descriptor: WalletDescriptor,
    pub gateway: Xpub,
    pub tx: UnsignedTransaction,
    /// The addressed device's own key, carrying its sealed seed
    pub cosigner: CosignerKey,
    /// DER signature by the gateway request key over every other field
    pub request_signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSignature {
    /// DER signature without the sighash byte
    pub der: Vec<u8>,
    /// Digest the device computed, when it reports one
    pub digest: Option<[u8; 32]>,
}

/// One signature per input from a single cosigner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignTxResponse {
    pub cosigner: u32,
    pub signatures: Vec<InputSignature>,
}

/// Stage payload, one variant per request/response kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    InitWalletRequest(InitWalletRequest),
    InitWalletResponse(InitWalletResponse),
    FinalizeWalletRequest(FinalizeWalletRequest),
    FinalizeWalletResponse(FinalizeWalletResponse),
    SignTxRequest(SignTxRequest),
    SignTxResponse(SignTxResponse),
}

impl Body {
    /// Wire tag
    pub fn tag(&self) -> u8 {
        match self {
            Body::InitWalletRequest(_) => 0x01,
            Body::InitWalletResponse(_) => 0x02,
            Body::FinalizeWalletRequest(_) => 0x03,
            Body::FinalizeWalletResponse(_) => 0x04,
            Body::SignTxRequest(_) => 0x05,
            Body::SignTxResponse(_) => 0x06,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Body::InitWalletRequest(_) => "InitWalletRequest",
            Body::InitWalletResponse(_) => "InitWalletResponse",
            Body::FinalizeWalletRequest(_) => "FinalizeWalletRequest",
            Body::FinalizeWalletResponse(_) => "FinalizeWalletResponse",
            Body::SignTxRequest(_) => "SignTxRequest",
            Body::SignTxResponse(_) => "SignTxResponse",
        }
    }
}

/// A stage message bound to a wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub wallet_id: u32,
    /// Opaque caller token echoed by the device
    pub token: Option<String>,
    pub body: Body,
}

fn malformed(message: impl Into<String>) -> Error {
    Error::MalformedEnvelope(message.into())
}

fn check_cosigner_key(key: &CosignerKey, field: &str) -> Result<()> {
    if key.index < 1 {
        return Err(malformed(format!("{}: cosigner index must be at least 1", field)));
    }
    key.xpub()
        .map_err(|e| malformed(format!("{}: {}", field, e)))?;
    if key.encrypted_private_material.is_empty() {
        return Err(malformed(format!("{}: missing encrypted key material", field)));
    }
    Ok(())
}

impl Envelope {
    pub fn new(wallet_id: u32, body: Body) -> Self {
        Envelope {
            wallet_id,
            token: None,
            body,
        }
    }

    /// Field checks beyond what the wire types enforce
    pub fn validate(&self) -> Result<()> {
        match &self.body {
            Body::InitWalletRequest(req) => {
                if req.slot < 1 {
                    return Err(malformed("slot must be at least 1"));
                }
            }
            Body::InitWalletResponse(resp) => check_cosigner_key(&resp.cosigner, "cosigner")?,
            Body::FinalizeWalletRequest(req) => {
                validate_threshold(req.threshold as usize, req.cosigners.len())?;
                for (i, key) in req.cosigners.iter().enumerate() {
                    check_cosigner_key(key, &format!("cosigners[{}]", i))?;
                }
            }
            Body::FinalizeWalletResponse(resp) => {
                if resp.attestation.is_empty() {
                    return Err(malformed("missing attestation"));
                }
            }
            Body::SignTxRequest(req) => {
                req.descriptor.validate()?;
                req.tx.validate()?;
                check_cosigner_key(&req.cosigner, "cosigner")?;
                if req.request_signature.is_empty() {
                    return Err(malformed("missing gateway request signature"));
                }
                if req.descriptor.cosigner(req.cosigner.index).is_none() {
                    return Err(Error::UnknownCosigner(req.cosigner.index));
                }
            }
            Body::SignTxResponse(resp) => {
                if resp.signatures.is_empty() {
                    return Err(malformed("no signatures"));
                }
                if resp.signatures.iter().any(|s| s.der.is_empty()) {
                    return Err(malformed("empty signature"));
                }
            }
        }
        Ok(())
    }
}
