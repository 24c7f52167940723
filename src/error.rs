//! Error taxonomy shared by every ceremony stage
//!
//! Each variant names the offending field, index or input so a failure can be
//! attributed to the cosigner or transaction input that caused it.

use crate::qr::EccLevel;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for coldvault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why a single offered signature was discarded during merge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureRejection {
    /// Transaction input the signature was offered for
    pub input: usize,
    /// Cosigner index the signature claims to come from
    pub cosigner: u32,
    /// Human-readable reason
    pub reason: String,
}

impl std::fmt::Display for SignatureRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "input {} cosigner {}: {}",
            self.input, self.cosigner, self.reason
        )
    }
}

/// Errors raised by the codecs, the key engine and the ceremony stages
#[derive(Debug, Error)]
pub enum Error {
    /// Envelope bytes could not be decoded into a known stage message
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Error correction could not reconstruct a consistent payload
    #[error("Corrupt QR symbol: {0}")]
    CorruptSymbol(String),

    /// Payload does not fit in the largest symbol at the requested level
    #[error("Payload too large: {size} bytes exceeds {max} bytes at ECC level {level:?}")]
    PayloadTooLarge {
        size: usize,
        max: usize,
        level: EccLevel,
    },

    /// Child key derivation failed or the path is out of range
    #[error("Invalid derivation: {0}")]
    InvalidDerivation(String),

    /// Threshold / participant count combination is not expressible
    #[error("Invalid threshold {threshold}-of-{participants}: {reason}")]
    ThresholdInvalid {
        threshold: usize,
        participants: usize,
        reason: String,
    },

    /// Two responses carry the same cosigner key or slot
    #[error("Duplicate cosigner: response {position} repeats cosigner {cosigner}")]
    DuplicateCosigner { position: usize, cosigner: u32 },

    /// Wrong number of artifacts supplied to a stage
    #[error("Expected {expected} {what}, got {actual}")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Fewer than M distinct valid signatures remain for an input
    #[error("Insufficient signatures for input {input}: {valid} valid, {required} required")]
    InsufficientSignatures {
        input: usize,
        valid: usize,
        required: usize,
        rejected: Vec<SignatureRejection>,
    },

    /// A signature or attestation does not match what was recomputed
    #[error("Signature mismatch from cosigner {cosigner}{}: {reason}", .input.map(|i| format!(" on input {i}")).unwrap_or_default())]
    SignatureMismatch {
        cosigner: u32,
        input: Option<usize>,
        reason: String,
    },

    /// An envelope belongs to a different wallet than the stage operates on
    #[error("Wallet mismatch at position {position}: expected wallet {expected}, got {actual}")]
    WalletMismatch {
        position: usize,
        expected: u32,
        actual: u32,
    },

    /// A cosigner index that is not part of the wallet
    #[error("Unknown cosigner index {0}")]
    UnknownCosigner(u32),

    /// Unsigned transaction violates structure or fee policy
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// The device operator refused to approve the transaction
    #[error("Signing declined by operator")]
    SigningDeclined,

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bitcoin::bip32::Error> for Error {
    fn from(err: bitcoin::bip32::Error) -> Self {
        Error::InvalidDerivation(err.to_string())
    }
}

impl Error {
    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MalformedEnvelope(_) => "MalformedEnvelope",
            Error::CorruptSymbol(_) => "CorruptSymbol",
            Error::PayloadTooLarge { .. } => "PayloadTooLarge",
            Error::InvalidDerivation(_) => "InvalidDerivation",
            Error::ThresholdInvalid { .. } => "ThresholdInvalid",
            Error::DuplicateCosigner { .. } => "DuplicateCosigner",
            Error::CountMismatch { .. } => "CountMismatch",
            Error::InsufficientSignatures { .. } => "InsufficientSignatures",
            Error::SignatureMismatch { .. } => "SignatureMismatch",
            Error::WalletMismatch { .. } => "WalletMismatch",
            Error::UnknownCosigner(_) => "UnknownCosigner",
            Error::InvalidTransaction(_) => "InvalidTransaction",
            Error::SigningDeclined => "SigningDeclined",
            Error::Config(_) => "Config",
        }
    }
}
