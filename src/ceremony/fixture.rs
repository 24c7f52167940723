//! Simulated 2-of-3 style ceremonies shared by unit tests

use super::{finalize_wallet, init_wallet, reveal_wallet, sign_tx, WalletPolicy};
use crate::crypto::{master_key, neuter, Network, Xpub};
use crate::device::Device;
use crate::envelope::{Body, Envelope, RequestSigner};
use crate::transaction::{Destination, TxInput, TxOutput, UnsignedTransaction};
use crate::wallet::{CosignerKey, Path, WalletDescriptor};

pub(crate) const WALLET_ID: u32 = 7;

pub(crate) struct Fixture {
    pub policy: WalletPolicy,
    pub devices: Vec<Device>,
    pub keys: Vec<CosignerKey>,
    pub init_responses: Vec<Envelope>,
    pub finalize_requests: Vec<Envelope>,
    pub finalize_responses: Vec<Envelope>,
    pub descriptor: WalletDescriptor,
    pub gateway: Xpub,
    pub signer: RequestSigner,
}

pub(crate) fn gateway() -> Xpub {
    neuter(&master_key(Network::Testnet, &[0x42; 32]).unwrap())
}

pub(crate) fn request_signer() -> RequestSigner {
    RequestSigner::from_secret_bytes(&[0x24; 32]).unwrap()
}

/// Run init, finalize and reveal against fresh devices
pub(crate) fn setup(threshold: usize, participants: usize) -> Fixture {
    let policy = WalletPolicy::new(Network::Testnet, threshold, participants).unwrap();
    let request_key = request_signer().public_key();
    let mut devices: Vec<Device> = (0..participants)
        .map(|_| Device::new().trust_request_key(request_key))
        .collect();

    let init_responses: Vec<Envelope> = init_wallet(&policy, WALLET_ID)
        .unwrap()
        .iter()
        .zip(devices.iter_mut())
        .map(|(req, device)| device.handle(req).unwrap())
        .collect();
    let mut keys: Vec<CosignerKey> = init_responses
        .iter()
        .map(|env| match &env.body {
            Body::InitWalletResponse(resp) => resp.cosigner.clone(),
            other => panic!("unexpected {}", other.name()),
        })
        .collect();
    keys.sort_by_key(|k| k.index);

    let (descriptor, finalize_requests) =
        finalize_wallet(&policy, WALLET_ID, &init_responses).unwrap();
    let finalize_responses: Vec<Envelope> = finalize_requests
        .iter()
        .zip(devices.iter_mut())
        .map(|(req, device)| device.handle(req).unwrap())
        .collect();
    let revealed = reveal_wallet(&policy, WALLET_ID, &finalize_responses, None).unwrap();
    assert_eq!(revealed.descriptor, descriptor);

    Fixture {
        policy,
        devices,
        keys,
        init_responses,
        finalize_requests,
        finalize_responses,
        descriptor,
        gateway: gateway(),
        signer: request_signer(),
    }
}

/// Two vault inputs paying the gateway with change back into the vault
pub(crate) fn sample_tx() -> UnsignedTransaction {
    UnsignedTransaction {
        inputs: vec![
            TxInput {
                prev_hash: vec![0x11; 32],
                prev_index: 0,
                amount: 40_000_000,
                path: Path::receive(0).unwrap(),
            },
            TxInput {
                prev_hash: vec![0x22; 32],
                prev_index: 3,
                amount: 10_000_000,
                path: Path::change(4).unwrap(),
            },
        ],
        outputs: vec![
            TxOutput {
                amount: 30_000_000,
                destination: Destination::Gateway,
                path: Path::receive(9).unwrap(),
            },
            TxOutput {
                amount: 19_990_000,
                destination: Destination::Change,
                path: Path::change(5).unwrap(),
            },
        ],
        lock_time: 0,
        local_rate: None,
    }
}

impl Fixture {
    /// Sign `tx` with the devices holding `slots`, returning their responses
    pub fn sign(&mut self, tx: &UnsignedTransaction, slots: &[u32]) -> Vec<Envelope> {
        let quorum: Vec<CosignerKey> = slots
            .iter()
            .map(|slot| self.keys[*slot as usize - 1].clone())
            .collect();
        let requests = sign_tx(
            &self.descriptor,
            &self.gateway,
            &self.signer,
            WALLET_ID,
            tx,
            &quorum,
        )
        .unwrap();
        requests
            .iter()
            .zip(slots)
            .map(|(req, slot)| self.devices[*slot as usize - 1].handle(req).unwrap())
            .collect()
    }
}
