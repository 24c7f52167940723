//! Ceremony state machine
//!
//! Every stage is a pure function of the artifacts passed in; the caller
//! holds the ceremony history between stages.
//!
//! | Stage    | Consumes                         | Produces                          |
//! |----------|----------------------------------|-----------------------------------|
//! | init     | policy, wallet id                | N `InitWalletRequest`s            |
//! | finalize | N `InitWalletResponse`s          | descriptor + N finalize requests  |
//! | reveal   | N `FinalizeWalletResponse`s      | attested descriptor, xpubs, address |
//! | sign     | descriptor, transaction, quorum  | one `SignTxRequest` per member    |
//! | merge    | see [`crate::merge`]             | final transaction                 |

pub mod setup;
pub mod signing;

use serde::{Deserialize, Serialize};

use crate::crypto::Network;
use crate::envelope::{Body, Envelope};
use crate::error::{Error, Result};
use crate::script::validate_threshold;

pub use setup::{
    compute_extended_pubkey, compute_extended_pubkeys, derive_address, finalize_wallet,
    init_wallet, reveal_wallet, RevealedWallet,
};
pub use signing::sign_tx;

/// M-of-N policy on a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletPolicy {
    pub network: Network,
    pub threshold: usize,
    pub participants: usize,
}

impl WalletPolicy {
    pub fn new(network: Network, threshold: usize, participants: usize) -> Result<Self> {
        validate_threshold(threshold, participants)?;
        Ok(WalletPolicy {
            network,
            threshold,
            participants,
        })
    }
}

/// Check count and wallet id of a response batch, returning the bodies
pub(crate) fn expect_bodies<'a, T>(
    envelopes: &'a [Envelope],
    wallet_id: u32,
    expected: usize,
    what: &'static str,
    pick: impl Fn(&'a Body) -> Option<&'a T>,
) -> Result<Vec<&'a T>> {
    if envelopes.len() != expected {
        return Err(Error::CountMismatch {
            what,
            expected,
            actual: envelopes.len(),
        });
    }
    envelopes
        .iter()
        .enumerate()
        .map(|(position, envelope)| {
            check_wallet(envelope, wallet_id, position)?;
            pick(&envelope.body).ok_or_else(|| {
                Error::MalformedEnvelope(format!(
                    "position {}: unexpected {}",
                    position,
                    envelope.body.name()
                ))
            })
        })
        .collect()
}

pub(crate) fn check_wallet(envelope: &Envelope, wallet_id: u32, position: usize) -> Result<()> {
    if envelope.wallet_id != wallet_id {
        return Err(Error::WalletMismatch {
            position,
            expected: wallet_id,
            actual: envelope.wallet_id,
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod fixture;
