//! Wallet descriptor: the public half of an M-of-N vault
//!
//! Cosigners are held in canonical order, sorted by the 33-byte compressed
//! encoding of their account public key. At every derivation path the child
//! keys are sorted again by their own compressed encoding before the witness
//! script is built, so any party holding the descriptor computes the same
//! script and address.

use bitcoin::secp256k1::PublicKey;
use bitcoin::ScriptBuf;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::crypto::{derive_path, sha256, Network, Xpub, HARDENED_OFFSET};
use crate::error::{Error, Result};
use crate::script::{build_multisig_script, compute_address, validate_threshold};

/// Derivation below the account key: `change / index`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    /// Internal (change) chain when true, receive chain otherwise
    pub change: bool,
    /// Non-hardened child index
    pub index: u32,
}

impl Path {
    pub fn new(change: bool, index: u32) -> Result<Self> {
        let path = Path { change, index };
        path.validate()?;
        Ok(path)
    }

    pub fn receive(index: u32) -> Result<Self> {
        Path::new(false, index)
    }

    pub fn change(index: u32) -> Result<Self> {
        Path::new(true, index)
    }

    pub fn validate(&self) -> Result<()> {
        if self.index >= HARDENED_OFFSET {
            return Err(Error::InvalidDerivation(format!(
                "child index {} is outside the non-hardened range",
                self.index
            )));
        }
        Ok(())
    }

    /// The two BIP-32 child numbers below the account level
    pub fn segments(&self) -> [u32; 2] {
        [self.change as u32, self.index]
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.change as u32, self.index)
    }
}

/// One cosigner's key as issued by its device at wallet initialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosignerKey {
    /// Slot index, 1..=N
    pub index: u32,
    /// 78-byte BIP-32 serialization of the account-level extended public key
    pub public_key: Vec<u8>,
    /// Seed sealed by the device; opaque to everyone else
    pub encrypted_private_material: Vec<u8>,
}

impl CosignerKey {
    /// Parse the carried extended public key
    pub fn xpub(&self) -> Result<Xpub> {
        Ok(Xpub::decode(&self.public_key)?)
    }

    pub fn public_component(&self) -> Result<Cosigner> {
        Ok(Cosigner {
            index: self.index,
            xpub: self.xpub()?,
        })
    }
}

/// Public component of a cosigner: slot index and account xpub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cosigner {
    pub index: u32,
    pub xpub: Xpub,
}

/// Threshold policy plus the canonically ordered cosigner keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletDescriptor {
    pub network: Network,
    /// M
    pub threshold: usize,
    /// N
    pub participants: usize,
    /// Cosigners sorted by compressed account public key
    pub cosigners: Vec<Cosigner>,
}

impl WalletDescriptor {
    /// Build a descriptor, putting the cosigners into canonical order
    ///
    /// Fails on an invalid threshold, duplicate keys or duplicate slots, and
    /// on slots outside 1..=N.
    pub fn new(network: Network, threshold: usize, mut cosigners: Vec<Cosigner>) -> Result<Self> {
        validate_threshold(threshold, cosigners.len())?;
        check_unique(&cosigners)?;
        cosigners.sort_by_key(|c| c.xpub.public_key.serialize());

        let descriptor = WalletDescriptor {
            network,
            threshold,
            participants: cosigners.len(),
            cosigners,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Check every structural invariant of a descriptor received from elsewhere
    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.threshold, self.participants)?;
        if self.cosigners.len() != self.participants {
            return Err(Error::CountMismatch {
                what: "cosigners",
                expected: self.participants,
                actual: self.cosigners.len(),
            });
        }
        check_unique(&self.cosigners)?;

        for cosigner in &self.cosigners {
            if cosigner.index < 1 || cosigner.index as usize > self.participants {
                return Err(Error::UnknownCosigner(cosigner.index));
            }
            if cosigner.xpub.network != self.network.kind() {
                return Err(Error::InvalidDerivation(format!(
                    "cosigner {} key is for {:?}, wallet is on {}",
                    cosigner.index, cosigner.xpub.network, self.network
                )));
            }
        }

        let in_order = self
            .cosigners
            .windows(2)
            .all(|w| w[0].xpub.public_key.serialize() < w[1].xpub.public_key.serialize());
        if !in_order {
            return Err(Error::MalformedEnvelope(
                "cosigners are not in canonical order".into(),
            ));
        }
        Ok(())
    }

    pub fn cosigner(&self, index: u32) -> Option<&Cosigner> {
        self.cosigners.iter().find(|c| c.index == index)
    }

    /// Child keys at `path` with their cosigner indices, in script order
    pub fn child_keys(&self, path: &Path) -> Result<Vec<(u32, PublicKey)>> {
        path.validate()?;
        let mut keys = self
            .cosigners
            .iter()
            .map(|c| {
                derive_path(&c.xpub, &path.segments()).map(|child| (c.index, child.public_key))
            })
            .collect::<Result<Vec<_>>>()?;
        keys.sort_by_key(|(_, key)| key.serialize());
        Ok(keys)
    }

    /// Witness script at `path`
    pub fn witness_script(&self, path: &Path) -> Result<ScriptBuf> {
        let keys: Vec<PublicKey> = self.child_keys(path)?.into_iter().map(|(_, k)| k).collect();
        build_multisig_script(self.threshold, &keys)
    }

    /// P2SH-P2WSH address at `path`
    pub fn address(&self, path: &Path) -> Result<String> {
        Ok(compute_address(&self.witness_script(path)?, self.network))
    }

    /// Digest cosigners attest to at finalize time
    pub fn digest(&self) -> [u8; 32] {
        let mut data = Vec::with_capacity(16 + self.cosigners.len() * 82);
        data.extend_from_slice(b"coldvault/descriptor");
        data.push(self.network.coin_type() as u8);
        data.extend_from_slice(&(self.threshold as u32).to_be_bytes());
        data.extend_from_slice(&(self.participants as u32).to_be_bytes());
        for cosigner in &self.cosigners {
            data.extend_from_slice(&cosigner.index.to_be_bytes());
            data.extend_from_slice(&cosigner.xpub.encode());
        }
        sha256(&data)
    }
}

fn check_unique(cosigners: &[Cosigner]) -> Result<()> {
    let mut keys = HashSet::new();
    let mut slots = HashSet::new();
    for (position, cosigner) in cosigners.iter().enumerate() {
        if !keys.insert(cosigner.xpub.public_key.serialize()) || !slots.insert(cosigner.index) {
            return Err(Error::DuplicateCosigner {
                position,
                cosigner: cosigner.index,
            });
        }
    }
    Ok(())
}
