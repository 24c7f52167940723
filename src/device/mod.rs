//! Offline cosigner device
//!
//! The device side of every ceremony stage. It keeps nothing between wallets
//! except the descriptors it has attested; its seed for each wallet travels
//! sealed inside the cosigner key blob and is opened only here.

pub mod vault;

use log::{info, warn};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use zeroize::Zeroizing;

use crate::crypto::{
    account_key, neuter, sign_digest, signing_key, Network, PublicKey, Xpriv, Xpub,
};
use crate::envelope::{
    render_sign_request, verify_request, Body, Envelope, FinalizeWalletRequest,
    FinalizeWalletResponse, InitWalletRequest, InitWalletResponse, InputSignature, SignTxRequest,
    SignTxResponse,
};
use crate::error::{Error, Result};
use crate::transaction::SigningContext;
use crate::wallet::{Cosigner, CosignerKey, WalletDescriptor};

pub use vault::VaultKey;

/// Seed length generated at wallet initialization
pub const SEED_LEN: usize = 64;

/// Operator confirmation, shown the review text of a transaction
pub type Approver = Box<dyn Fn(&str) -> bool + Send + Sync>;

pub struct Device {
    vault: VaultKey,
    pinned_gateway: Option<Xpub>,
    request_key: Option<PublicKey>,
    attested: HashMap<u32, [u8; 32]>,
    approver: Approver,
}

impl Device {
    /// Device with a fresh vault key that approves every transaction
    pub fn new() -> Self {
        Device::with_vault_key(VaultKey::generate())
    }

    pub fn with_vault_key(vault: VaultKey) -> Self {
        Device {
            vault,
            pinned_gateway: None,
            request_key: None,
            attested: HashMap::new(),
            approver: Box::new(|_| true),
        }
    }

    /// Refuse sign requests paying any other gateway
    pub fn pin_gateway(mut self, gateway: Xpub) -> Self {
        self.pinned_gateway = Some(gateway);
        self
    }

    /// Accept sign requests signed by this gateway request key
    ///
    /// A device with no request key refuses every sign request.
    pub fn trust_request_key(mut self, key: PublicKey) -> Self {
        self.request_key = Some(key);
        self
    }

    pub fn set_approver(&mut self, approver: Approver) {
        self.approver = approver;
    }

    /// Answer one request envelope
    pub fn handle(&mut self, request: &Envelope) -> Result<Envelope> {
        let wallet_id = request.wallet_id;
        let body = match &request.body {
            Body::InitWalletRequest(req) => Body::InitWalletResponse(self.init(wallet_id, req)?),
            Body::FinalizeWalletRequest(req) => {
                Body::FinalizeWalletResponse(self.finalize(wallet_id, req)?)
            }
            Body::SignTxRequest(req) => Body::SignTxResponse(self.sign(wallet_id, req)?),
            other => {
                return Err(Error::MalformedEnvelope(format!(
                    "device cannot answer a {}",
                    other.name()
                )))
            }
        };
        Ok(Envelope {
            wallet_id,
            token: request.token.clone(),
            body,
        })
    }

    /// Account key `m/coin'` from the seed sealed in `key`
    fn open_account(
        &self,
        wallet_id: u32,
        key: &CosignerKey,
        network: Network,
    ) -> Option<Xpriv> {
        let seed = self
            .vault
            .open(&key.encrypted_private_material, wallet_id, key.index)?;
        let account = account_key(network, &seed).ok()?;
        (neuter(&account).encode().as_slice() == key.public_key.as_slice()).then_some(account)
    }

    fn init(&mut self, wallet_id: u32, req: &InitWalletRequest) -> Result<InitWalletResponse> {
        let mut seed = Zeroizing::new([0u8; SEED_LEN]);
        OsRng.fill_bytes(&mut seed[..]);

        let account = account_key(req.network, &seed[..])?;
        let sealed = self.vault.seal(&seed[..], wallet_id, req.slot)?;

        info!("Created key for wallet {} slot {}", wallet_id, req.slot);
        Ok(InitWalletResponse {
            cosigner: CosignerKey {
                index: req.slot,
                public_key: neuter(&account).encode().to_vec(),
                encrypted_private_material: sealed,
            },
        })
    }

    fn finalize(
        &mut self,
        wallet_id: u32,
        req: &FinalizeWalletRequest,
    ) -> Result<FinalizeWalletResponse> {
        let (own, account) = req
            .cosigners
            .iter()
            .find_map(|key| self.open_account(wallet_id, key, req.network).map(|a| (key, a)))
            .ok_or_else(|| {
                Error::MalformedEnvelope("none of the keys belongs to this device".into())
            })?;

        let cosigners = req
            .cosigners
            .iter()
            .map(|k| k.public_component())
            .collect::<Result<Vec<Cosigner>>>()?;
        let descriptor = WalletDescriptor::new(req.network, req.threshold as usize, cosigners)?;

        let digest = descriptor.digest();
        let attestation = sign_digest(&account.private_key, &digest);
        self.attested.insert(wallet_id, digest);

        info!(
            "Cosigner {} attested wallet {} ({}-of-{})",
            own.index, wallet_id, descriptor.threshold, descriptor.participants
        );
        Ok(FinalizeWalletResponse {
            cosigner: own.index,
            xpub: neuter(&account),
            attestation,
        })
    }

    /// Re-attest a wallet from its finalize request, e.g. after a reset
    pub fn restore(
        &mut self,
        wallet_id: u32,
        req: &FinalizeWalletRequest,
    ) -> Result<FinalizeWalletResponse> {
        self.finalize(wallet_id, req)
    }

    fn sign(&mut self, wallet_id: u32, req: &SignTxRequest) -> Result<SignTxResponse> {
        let index = req.cosigner.index;
        let mismatch = |reason: &str| Error::SignatureMismatch {
            cosigner: index,
            input: None,
            reason: reason.to_string(),
        };

        let request_key = self
            .request_key
            .as_ref()
            .ok_or_else(|| mismatch("no gateway request key is trusted"))?;
        verify_request(wallet_id, req, request_key)?;

        match self.attested.get(&wallet_id) {
            Some(digest) if *digest == req.descriptor.digest() => {}
            Some(_) => {
                return Err(mismatch(
                    "descriptor differs from the one this device attested",
                ))
            }
            None => return Err(mismatch("this device has not attested wallet")),
        }
        if let Some(pinned) = &self.pinned_gateway {
            if *pinned != req.gateway {
                return Err(Error::InvalidTransaction(
                    "gateway key differs from the pinned gateway".into(),
                ));
            }
        }

        let account = self
            .open_account(wallet_id, &req.cosigner, req.descriptor.network)
            .ok_or_else(|| mismatch("sealed key does not open on this device"))?;
        let expected = req
            .descriptor
            .cosigner(index)
            .ok_or(Error::UnknownCosigner(index))?;
        if expected.xpub != neuter(&account) {
            return Err(mismatch("account key is not the descriptor's key for this slot"));
        }

        req.tx.check_policy()?;
        let review = render_sign_request(req);
        if !(self.approver)(&review) {
            warn!("Operator declined to sign for wallet {}", wallet_id);
            return Err(Error::SigningDeclined);
        }

        let context = SigningContext::new(&req.tx, &req.descriptor, &req.gateway)?;
        let signatures = req
            .tx
            .inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                let data = context.input(i)?;
                let secret = signing_key(&account, &input.path.segments())?;
                Ok(InputSignature {
                    der: sign_digest(&secret, &data.digest),
                    digest: Some(data.digest),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Cosigner {} signed {} inputs for wallet {}",
            index,
            signatures.len(),
            wallet_id
        );
        Ok(SignTxResponse {
            cosigner: index,
            signatures,
        })
    }
}

impl Default for Device {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ceremony::fixture::{
        gateway, request_signer, sample_tx, setup, Fixture, WALLET_ID,
    };
    use crate::ceremony::sign_tx;
    use crate::crypto::{master_key, verify_der};
    use crate::envelope::RequestSigner;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    fn sign_requests(fx: &Fixture) -> Vec<Envelope> {
        sign_tx(
            &fx.descriptor,
            &fx.gateway,
            &fx.signer,
            WALLET_ID,
            &sample_tx(),
            &fx.keys[..2],
        )
        .unwrap()
    }

    fn request_mut(envelope: &mut Envelope) -> &mut SignTxRequest {
        match &mut envelope.body {
            Body::SignTxRequest(req) => req,
            other => panic!("unexpected {}", other.name()),
        }
    }

    /// Apply `edit` and sign the result again with the gateway key
    fn resigned(envelope: &Envelope, edit: impl FnOnce(&mut SignTxRequest)) -> Envelope {
        let mut envelope = envelope.clone();
        let wallet_id = envelope.wallet_id;
        let req = request_mut(&mut envelope);
        edit(req);
        request_signer().sign_in_place(wallet_id, req).unwrap();
        envelope
    }

    #[test]
    fn test_signatures_verify_against_child_keys() {
        let mut fx = setup(2, 3);
        let requests = sign_requests(&fx);
        let response = fx.devices[0].handle(&requests[0]).unwrap();
        let Body::SignTxResponse(resp) = response.body else {
            panic!("expected a sign response");
        };
        assert_eq!(resp.cosigner, 1);

        let tx = sample_tx();
        let context = SigningContext::new(&tx, &fx.descriptor, &fx.gateway).unwrap();
        for (i, sig) in resp.signatures.iter().enumerate() {
            let data = context.input(i).unwrap();
            assert_eq!(sig.digest, Some(data.digest));
            let (_, key) = data.keys.iter().find(|(index, _)| *index == 1).unwrap();
            assert!(verify_der(key, &data.digest, &sig.der).is_ok());
        }
    }

    #[test]
    fn test_operator_sees_review_and_can_decline() {
        let mut fx = setup(2, 3);
        let requests = sign_requests(&fx);
        let seen = Arc::new(Mutex::new(String::new()));
        let captured = seen.clone();
        fx.devices[0].set_approver(Box::new(move |review| {
            *captured.lock().unwrap() = review.to_string();
            false
        }));

        assert!(matches!(
            fx.devices[0].handle(&requests[0]),
            Err(Error::SigningDeclined)
        ));
        let review = seen.lock().unwrap();
        assert!(review.contains("cosigner 1"));
        assert!(review.contains("0.30000000 BTC"));
    }

    #[test]
    fn test_refuses_unattested_or_altered_descriptor() {
        let mut fx = setup(2, 3);
        let requests = sign_requests(&fx);

        let mut stranger = Device::new().trust_request_key(request_signer().public_key());
        assert!(matches!(
            stranger.handle(&requests[0]),
            Err(Error::SignatureMismatch { .. })
        ));

        let altered = resigned(&requests[0], |req| req.descriptor.threshold = 3);
        assert!(matches!(
            fx.devices[0].handle(&altered),
            Err(Error::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn test_key_addressed_to_another_device_does_not_open() {
        let mut fx = setup(2, 3);
        let requests = sign_requests(&fx);
        // Request for slot 2 handed to the device holding slot 1
        assert!(matches!(
            fx.devices[0].handle(&requests[1]),
            Err(Error::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn test_pinned_gateway() {
        let mut fx = setup(2, 3);
        let requests = sign_requests(&fx);

        let other = neuter(&master_key(Network::Testnet, &[0x43; 32]).unwrap());
        let mut pinned = std::mem::take(&mut fx.devices[0])
            .trust_request_key(request_signer().public_key())
            .pin_gateway(other);
        assert!(matches!(
            pinned.handle(&requests[0]),
            Err(Error::InvalidTransaction(_))
        ));

        let mut pinned = pinned.pin_gateway(gateway());
        assert!(pinned.handle(&requests[0]).is_ok());
    }

    #[test]
    fn test_fee_policy_enforced_on_device() {
        let mut fx = setup(2, 3);
        // An input far larger than the outputs leaves a huge fee
        let request = resigned(&sign_requests(&fx)[0], |req| {
            req.tx.inputs[0].amount = 500 * crate::transaction::COIN
        });
        assert!(matches!(
            fx.devices[0].handle(&request),
            Err(Error::InvalidTransaction(_))
        ));
    }

    #[test]
    fn test_tampered_request_refused_before_review() {
        let mut fx = setup(2, 3);
        let requests = sign_requests(&fx);
        let reviewed = Arc::new(AtomicBool::new(false));
        let flag = reviewed.clone();
        fx.devices[0].set_approver(Box::new(move |_| {
            flag.store(true, Ordering::SeqCst);
            true
        }));

        // Gateway output redirected after the gateway signed
        let mut tampered = requests[0].clone();
        request_mut(&mut tampered).tx.outputs[0].amount -= 1_000;
        request_mut(&mut tampered).tx.outputs[1].amount += 1_000;
        assert!(matches!(
            fx.devices[0].handle(&tampered),
            Err(Error::SignatureMismatch { cosigner: 1, input: None, .. })
        ));

        let mut swapped = requests[0].clone();
        request_mut(&mut swapped).gateway =
            neuter(&master_key(Network::Testnet, &[0x43; 32]).unwrap());
        assert!(fx.devices[0].handle(&swapped).is_err());
        assert!(!reviewed.load(Ordering::SeqCst));

        assert!(fx.devices[0].handle(&requests[0]).is_ok());
        assert!(reviewed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_request_from_untrusted_gateway_refused() {
        let mut fx = setup(2, 3);
        let mut request = sign_requests(&fx).remove(0);
        let other = RequestSigner::from_secret_bytes(&[0x25; 32]).unwrap();
        other.sign_in_place(WALLET_ID, request_mut(&mut request)).unwrap();
        assert!(matches!(
            fx.devices[0].handle(&request),
            Err(Error::SignatureMismatch { .. })
        ));

        // No trusted key at all
        let requests = sign_requests(&fx);
        let mut untrusting = std::mem::take(&mut fx.devices[0]);
        untrusting.request_key = None;
        assert!(matches!(
            untrusting.handle(&requests[0]),
            Err(Error::SignatureMismatch { reason, .. }) if reason.contains("request key")
        ));
    }

    #[test]
    fn test_restore_reproduces_attestation() {
        let mut fx = setup(2, 3);
        let Body::FinalizeWalletRequest(req) = &fx.finalize_requests[0].body else {
            panic!("expected a finalize request");
        };
        let restored = fx.devices[0].restore(WALLET_ID, req).unwrap();
        assert_eq!(
            Body::FinalizeWalletResponse(restored),
            fx.finalize_responses[0].body
        );
    }

    #[test]
    fn test_rejects_response_envelopes() {
        let mut fx = setup(2, 3);
        let response = fx.init_responses[0].clone();
        assert!(matches!(
            fx.devices[0].handle(&response),
            Err(Error::MalformedEnvelope(_))
        ));
    }
}
