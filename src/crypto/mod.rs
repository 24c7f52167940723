//! Cryptographic primitives for the key engine
//!
//! This module provides:
//! - SHA-256 for domain-separated digests
//! - ECDSA signing and strict DER verification (secp256k1)
//! - BIP-32 extended keys built on `bitcoin::bip32`

pub mod bip32;
pub mod hash;
pub mod keys;

pub use bip32::{
    account_key, derive_child, derive_path, master_key, neuter, signing_key, Network,
    HARDENED_OFFSET,
};
pub use bitcoin::bip32::{Xpriv, Xpub};
pub use bitcoin::secp256k1::{PublicKey, SecretKey};
pub use hash::sha256;
pub use keys::{public_key_from_slice, sign_digest, verify_der, KeyError};
