//! Sign stage: fan a transaction out to a quorum of devices

use log::info;
use std::collections::HashSet;

use crate::crypto::Xpub;
use crate::envelope::{Body, Envelope, RequestSigner, SignTxRequest};
use crate::error::{Error, Result};
use crate::transaction::UnsignedTransaction;
use crate::wallet::{CosignerKey, WalletDescriptor};

/// One `SignTxRequest` per quorum member
///
/// Each request carries the whole transaction, the descriptor and the gateway
/// key so the device can rebuild and display every destination before it
/// signs, and is signed with the gateway's request key. The quorum needs at
/// least M distinct cosigners of this wallet.
pub fn sign_tx(
    descriptor: &WalletDescriptor,
    gateway: &Xpub,
    signer: &RequestSigner,
    wallet_id: u32,
    tx: &UnsignedTransaction,
    quorum: &[CosignerKey],
) -> Result<Vec<Envelope>> {
    descriptor.validate()?;
    let fee = tx.check_policy()?;

    if quorum.len() < descriptor.threshold {
        return Err(Error::CountMismatch {
            what: "quorum members",
            expected: descriptor.threshold,
            actual: quorum.len(),
        });
    }

    let mut seen = HashSet::new();
    for (position, key) in quorum.iter().enumerate() {
        let known = descriptor
            .cosigner(key.index)
            .ok_or(Error::UnknownCosigner(key.index))?;
        if key.xpub()? != known.xpub {
            return Err(Error::UnknownCosigner(key.index));
        }
        if !seen.insert(key.index) {
            return Err(Error::DuplicateCosigner {
                position,
                cosigner: key.index,
            });
        }
    }

    info!(
        "Requesting signatures from {} cosigners for wallet {}: {} inputs, {} outputs, fee {} sat",
        quorum.len(),
        wallet_id,
        tx.inputs.len(),
        tx.outputs.len(),
        fee
    );

    quorum
        .iter()
        .map(|key| {
            let mut req = SignTxRequest {
                descriptor: descriptor.clone(),
                gateway: *gateway,
                tx: tx.clone(),
                cosigner: key.clone(),
                request_signature: Vec::new(),
            };
            signer.sign_in_place(wallet_id, &mut req)?;
            Ok(Envelope::new(wallet_id, Body::SignTxRequest(req)))
        })
        .collect()
}
