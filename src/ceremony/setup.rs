//! Wallet setup stages: init, finalize and reveal/derive

use log::{debug, info};
use serde::Serialize;
use std::collections::HashSet;

use super::{expect_bodies, WalletPolicy};
use crate::crypto::{derive_path, verify_der, Xpub};
use crate::envelope::{Body, Envelope, FinalizeWalletRequest, InitWalletRequest};
use crate::error::{Error, Result};
use crate::wallet::{Cosigner, CosignerKey, Path, WalletDescriptor};

/// One `InitWalletRequest` per slot, 1..=N
pub fn init_wallet(policy: &WalletPolicy, wallet_id: u32) -> Result<Vec<Envelope>> {
    let policy = WalletPolicy::new(policy.network, policy.threshold, policy.participants)?;
    info!(
        "Initializing {}-of-{} wallet {} on {}",
        policy.threshold, policy.participants, wallet_id, policy.network
    );
    Ok((1..=policy.participants as u32)
        .map(|slot| {
            Envelope::new(
                wallet_id,
                Body::InitWalletRequest(InitWalletRequest {
                    network: policy.network,
                    slot,
                }),
            )
        })
        .collect())
}

/// Check slot range, network and uniqueness of submitted keys
fn collect_cosigners(
    policy: &WalletPolicy,
    keys: impl Iterator<Item = (u32, Xpub)>,
) -> Result<Vec<Cosigner>> {
    let mut seen_keys = HashSet::new();
    let mut seen_slots = HashSet::new();
    let mut cosigners = Vec::new();

    for (position, (index, xpub)) in keys.enumerate() {
        if index < 1 || index as usize > policy.participants {
            return Err(Error::UnknownCosigner(index));
        }
        if xpub.network != policy.network.kind() {
            return Err(Error::InvalidDerivation(format!(
                "cosigner {} key is for {:?}, wallet is on {}",
                index, xpub.network, policy.network
            )));
        }
        if !seen_keys.insert(xpub.public_key.serialize()) || !seen_slots.insert(index) {
            return Err(Error::DuplicateCosigner {
                position,
                cosigner: index,
            });
        }
        cosigners.push(Cosigner { index, xpub });
    }
    Ok(cosigners)
}

/// Build the descriptor from N init responses and ask every device to attest it
pub fn finalize_wallet(
    policy: &WalletPolicy,
    wallet_id: u32,
    responses: &[Envelope],
) -> Result<(WalletDescriptor, Vec<Envelope>)> {
    let bodies = expect_bodies(
        responses,
        wallet_id,
        policy.participants,
        "init wallet responses",
        |body| match body {
            Body::InitWalletResponse(resp) => Some(resp),
            _ => None,
        },
    )?;

    let keys: Vec<CosignerKey> = bodies.iter().map(|b| b.cosigner.clone()).collect();
    let parsed = keys
        .iter()
        .map(|k| k.xpub().map(|xpub| (k.index, xpub)))
        .collect::<Result<Vec<_>>>()?;
    let cosigners = collect_cosigners(policy, parsed.into_iter())?;
    let descriptor = WalletDescriptor::new(policy.network, policy.threshold, cosigners)?;

    let mut ordered = keys;
    ordered.sort_by_key(|k| k.index);
    let request = FinalizeWalletRequest {
        network: policy.network,
        threshold: policy.threshold as u32,
        cosigners: ordered,
    };
    let requests = (0..policy.participants)
        .map(|_| Envelope::new(wallet_id, Body::FinalizeWalletRequest(request.clone())))
        .collect();

    info!(
        "Finalized wallet {}: descriptor {}",
        wallet_id,
        hex::encode(descriptor.digest())
    );
    Ok((descriptor, requests))
}

/// Output of the reveal stage
#[derive(Debug, Clone, Serialize)]
pub struct RevealedWallet {
    pub descriptor: WalletDescriptor,
    /// Account xpubs in canonical order
    pub xpubs: Vec<String>,
    /// Address at the requested path, if one was requested
    pub address: Option<String>,
}

/// Rebuild the descriptor from the attestations and verify every one of them
pub fn reveal_wallet(
    policy: &WalletPolicy,
    wallet_id: u32,
    responses: &[Envelope],
    path: Option<Path>,
) -> Result<RevealedWallet> {
    let bodies = expect_bodies(
        responses,
        wallet_id,
        policy.participants,
        "finalize wallet responses",
        |body| match body {
            Body::FinalizeWalletResponse(resp) => Some(resp),
            _ => None,
        },
    )?;

    let cosigners = collect_cosigners(policy, bodies.iter().map(|b| (b.cosigner, b.xpub)))?;
    let descriptor = WalletDescriptor::new(policy.network, policy.threshold, cosigners)?;
    let digest = descriptor.digest();

    for body in &bodies {
        verify_der(&body.xpub.public_key, &digest, &body.attestation).map_err(|e| {
            Error::SignatureMismatch {
                cosigner: body.cosigner,
                input: None,
                reason: format!("attestation does not cover this descriptor: {}", e),
            }
        })?;
        debug!("Attestation from cosigner {} verified", body.cosigner);
    }

    let address = path.map(|p| descriptor.address(&p)).transpose()?;
    let xpubs = descriptor
        .cosigners
        .iter()
        .map(|c| c.xpub.to_string())
        .collect();

    Ok(RevealedWallet {
        descriptor,
        xpubs,
        address,
    })
}

/// P2SH-P2WSH address at `path`; reproducible from the descriptor alone
pub fn derive_address(descriptor: &WalletDescriptor, path: &Path) -> Result<String> {
    descriptor.validate()?;
    descriptor.address(path)
}

/// One cosigner's xpub below its account key
pub fn compute_extended_pubkey(
    descriptor: &WalletDescriptor,
    cosigner: u32,
    path: &[u32],
) -> Result<String> {
    let cosigner = descriptor
        .cosigner(cosigner)
        .ok_or(Error::UnknownCosigner(cosigner))?;
    Ok(derive_path(&cosigner.xpub, path)?.to_string())
}

/// Every cosigner's xpub at `path`, in canonical order
pub fn compute_extended_pubkeys(
    descriptor: &WalletDescriptor,
    path: &[u32],
) -> Result<Vec<String>> {
    descriptor
        .cosigners
        .iter()
        .map(|c| Ok(derive_path(&c.xpub, path)?.to_string()))
        .collect()
}
