//! Signature merge engine
//!
//! Checks every offered signature per input, reports the ones it discards,
//! and assembles the witness from the first M valid signatures in witness
//! script key order. Re-running a merge on the same responses gives the
//! same transaction.

use bitcoin::Script;
use log::{info, warn};
use serde::Serialize;

use crate::ceremony::check_wallet;
use crate::crypto::{verify_der, Xpub};
use crate::envelope::{Body, Envelope, SignTxResponse};
use crate::error::{Error, Result, SignatureRejection};
use crate::script::parse_multisig_script;
use crate::transaction::{finalize, InputWitness, SigningContext, UnsignedTransaction};
use crate::wallet::WalletDescriptor;

/// A merged, broadcastable transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalTransaction {
    /// Segwit serialization, hex
    pub raw_hex: String,
    pub txid: String,
    /// Cosigners whose signatures went into each input's witness
    pub signers: Vec<Vec<u32>>,
    /// Signatures that were offered but discarded
    pub rejected: Vec<SignatureRejection>,
}

/// Standard CHECKMULTISIG evaluation of `signatures` against `witness_script`
pub fn check_multisig(witness_script: &Script, signatures: &[Vec<u8>], digest: &[u8; 32]) -> bool {
    let Some((threshold, keys)) = parse_multisig_script(witness_script) else {
        return false;
    };
    if signatures.len() != threshold {
        return false;
    }
    let mut keys = keys.iter();
    signatures.iter().all(|sig| {
        keys.by_ref()
            .any(|key| verify_der(key, digest, sig).is_ok())
    })
}

fn responses<'a>(envelopes: &'a [Envelope], wallet_id: u32) -> Result<Vec<&'a SignTxResponse>> {
    envelopes
        .iter()
        .enumerate()
        .map(|(position, envelope)| {
            check_wallet(envelope, wallet_id, position)?;
            match &envelope.body {
                Body::SignTxResponse(resp) => Ok(resp),
                other => Err(Error::MalformedEnvelope(format!(
                    "position {}: unexpected {}",
                    position,
                    other.name()
                ))),
            }
        })
        .collect()
}

/// Merge sign responses into the final transaction
pub fn merge(
    descriptor: &WalletDescriptor,
    gateway: &Xpub,
    wallet_id: u32,
    tx: &UnsignedTransaction,
    envelopes: &[Envelope],
) -> Result<FinalTransaction> {
    descriptor.validate()?;
    tx.validate()?;
    let responses = responses(envelopes, wallet_id)?;

    for resp in &responses {
        if resp.signatures.len() != tx.inputs.len() {
            return Err(Error::SignatureMismatch {
                cosigner: resp.cosigner,
                input: None,
                reason: format!(
                    "{} signatures for {} inputs",
                    resp.signatures.len(),
                    tx.inputs.len()
                ),
            });
        }
    }

    let context = SigningContext::new(tx, descriptor, gateway)?;
    let mut rejected = Vec::new();
    let mut witnesses = Vec::with_capacity(tx.inputs.len());
    let mut signers = Vec::with_capacity(tx.inputs.len());

    for input in 0..tx.inputs.len() {
        let data = context.input(input)?;
        let mut valid: Vec<(u32, &[u8])> = Vec::new();

        for resp in &responses {
            let offered = &resp.signatures[input];
            let mut reject = |reason: String| {
                warn!(
                    "Discarding signature from cosigner {} on input {}: {}",
                    resp.cosigner, input, reason
                );
                rejected.push(SignatureRejection {
                    input,
                    cosigner: resp.cosigner,
                    reason,
                });
            };

            let Some((_, key)) = data.keys.iter().find(|(index, _)| *index == resp.cosigner) else {
                reject("unknown cosigner".to_string());
                continue;
            };
            if valid.iter().any(|(index, _)| *index == resp.cosigner) {
                reject("duplicate signature from this cosigner".to_string());
                continue;
            }
            if let Some(digest) = offered.digest {
                if digest != data.digest {
                    reject(format!(
                        "signed digest {} differs from recomputed {}",
                        hex::encode(digest),
                        hex::encode(data.digest)
                    ));
                    continue;
                }
            }
            if let Err(e) = verify_der(key, &data.digest, &offered.der) {
                reject(e.to_string());
                continue;
            }
            valid.push((resp.cosigner, offered.der.as_slice()));
        }

        if valid.len() < descriptor.threshold {
            return Err(Error::InsufficientSignatures {
                input,
                valid: valid.len(),
                required: descriptor.threshold,
                rejected,
            });
        }

        let (used, signatures): (Vec<u32>, Vec<Vec<u8>>) = data
            .keys
            .iter()
            .filter_map(|(index, _)| {
                valid
                    .iter()
                    .find(|(signer, _)| signer == index)
                    .map(|(signer, der)| (*signer, der.to_vec()))
            })
            .take(descriptor.threshold)
            .unzip();

        if !check_multisig(&data.witness_script, &signatures, &data.digest) {
            return Err(Error::SignatureMismatch {
                cosigner: used.first().copied().unwrap_or_default(),
                input: Some(input),
                reason: "assembled witness fails multisig evaluation".into(),
            });
        }

        witnesses.push(InputWitness {
            signatures,
            witness_script: data.witness_script,
        });
        signers.push(used);
    }

    let signed = finalize(&context.unsigned, &witnesses)?;
    info!(
        "Merged wallet {} transaction {} ({} signatures discarded)",
        wallet_id,
        signed.txid,
        rejected.len()
    );
    Ok(FinalTransaction {
        raw_hex: signed.raw_hex,
        txid: signed.txid,
        signers,
        rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ceremony::fixture::{sample_tx, setup, WALLET_ID};

    fn response_mut(envelope: &mut Envelope) -> &mut SignTxResponse {
        match &mut envelope.body {
            Body::SignTxResponse(resp) => resp,
            other => panic!("unexpected {}", other.name()),
        }
    }

    #[test]
    fn test_merge_quorum() {
        let mut fx = setup(2, 3);
        let tx = sample_tx();
        let responses = fx.sign(&tx, &[3, 2]);

        let merged = merge(&fx.descriptor, &fx.gateway, WALLET_ID, &tx, &responses).unwrap();
        assert!(merged.rejected.is_empty());
        assert_eq!(merged.txid.len(), 64);
        for used in &merged.signers {
            let mut sorted = used.clone();
            sorted.sort();
            assert_eq!(sorted, vec![2, 3]);
        }

        // Response order does not change the result
        let reversed: Vec<Envelope> = responses.iter().rev().cloned().collect();
        let again = merge(&fx.descriptor, &fx.gateway, WALLET_ID, &tx, &reversed).unwrap();
        assert_eq!(again, merged);
    }

    #[test]
    fn test_surplus_signatures_use_script_order() {
        let mut fx = setup(2, 3);
        let tx = sample_tx();
        let responses = fx.sign(&tx, &[1, 2, 3]);

        let merged = merge(&fx.descriptor, &fx.gateway, WALLET_ID, &tx, &responses).unwrap();
        let context = SigningContext::new(&tx, &fx.descriptor, &fx.gateway).unwrap();
        for (i, used) in merged.signers.iter().enumerate() {
            let keys = context.input(i).unwrap().keys;
            let first_two: Vec<u32> = keys.iter().take(2).map(|(index, _)| *index).collect();
            assert_eq!(*used, first_two);
        }
    }

    #[test]
    fn test_insufficient_signatures() {
        let mut fx = setup(2, 3);
        let tx = sample_tx();
        let mut responses = fx.sign(&tx, &[1, 2]);
        responses.truncate(1);

        match merge(&fx.descriptor, &fx.gateway, WALLET_ID, &tx, &responses) {
            Err(Error::InsufficientSignatures {
                input,
                valid,
                required,
                ..
            }) => {
                assert_eq!((input, valid, required), (0, 1, 2));
            }
            other => panic!("expected InsufficientSignatures, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_signature_is_discarded_when_quorum_remains() {
        let mut fx = setup(2, 3);
        let tx = sample_tx();
        let mut responses = fx.sign(&tx, &[1, 2, 3]);
        let der = &mut response_mut(&mut responses[0]).signatures[1].der;
        let last = der.len() - 1;
        der[last] ^= 0x01;

        let merged = merge(&fx.descriptor, &fx.gateway, WALLET_ID, &tx, &responses).unwrap();
        assert_eq!(merged.rejected.len(), 1);
        assert_eq!(merged.rejected[0].input, 1);
        assert_eq!(merged.rejected[0].cosigner, 1);
        assert!(!merged.signers[1].contains(&1));
    }

    #[test]
    fn test_unknown_and_duplicate_cosigners_rejected() {
        let mut fx = setup(2, 3);
        let tx = sample_tx();
        let responses = fx.sign(&tx, &[1, 2]);

        let mut stranger = responses[1].clone();
        response_mut(&mut stranger).cosigner = 9;
        let batch = vec![responses[0].clone(), responses[0].clone(), stranger];

        match merge(&fx.descriptor, &fx.gateway, WALLET_ID, &tx, &batch) {
            Err(Error::InsufficientSignatures {
                valid, rejected, ..
            }) => {
                assert_eq!(valid, 1);
                assert!(rejected.iter().any(|r| r.reason.contains("duplicate")));
                assert!(rejected
                    .iter()
                    .any(|r| r.cosigner == 9 && r.reason == "unknown cosigner"));
            }
            other => panic!("expected InsufficientSignatures, got {:?}", other),
        }
    }

    #[test]
    fn test_digest_disagreement_is_discarded_when_quorum_remains() {
        let mut fx = setup(2, 3);
        let tx = sample_tx();
        let mut responses = fx.sign(&tx, &[1, 2, 3]);
        response_mut(&mut responses[2]).signatures[0].digest = Some([0u8; 32]);

        let merged = merge(&fx.descriptor, &fx.gateway, WALLET_ID, &tx, &responses).unwrap();
        assert_eq!(merged.rejected.len(), 1);
        let rejection = &merged.rejected[0];
        assert_eq!((rejection.input, rejection.cosigner), (0, 3));
        assert!(rejection.reason.contains("differs from recomputed"));
        assert!(!merged.signers[0].contains(&3));

        // The same responses without the stale one merge to the same transaction
        let clean = merge(&fx.descriptor, &fx.gateway, WALLET_ID, &tx, &responses[..2]);
        assert_eq!(clean.unwrap().txid, merged.txid);
    }

    #[test]
    fn test_digest_disagreement_counts_against_quorum() {
        let mut fx = setup(2, 3);
        let tx = sample_tx();
        let mut responses = fx.sign(&tx, &[1, 2]);
        response_mut(&mut responses[1]).signatures[0].digest = Some([0u8; 32]);

        match merge(&fx.descriptor, &fx.gateway, WALLET_ID, &tx, &responses) {
            Err(Error::InsufficientSignatures {
                input,
                valid,
                rejected,
                ..
            }) => {
                assert_eq!((input, valid), (0, 1));
                assert_eq!(rejected.len(), 1);
                assert_eq!(rejected[0].cosigner, 2);
            }
            other => panic!("expected InsufficientSignatures, got {:?}", other),
        }
    }

    #[test]
    fn test_response_shape_errors() {
        let mut fx = setup(2, 3);
        let tx = sample_tx();
        let responses = fx.sign(&tx, &[1, 2]);

        let mut foreign = responses.clone();
        foreign[1].wallet_id = WALLET_ID + 1;
        assert!(matches!(
            merge(&fx.descriptor, &fx.gateway, WALLET_ID, &tx, &foreign),
            Err(Error::WalletMismatch { position: 1, .. })
        ));

        let mut short = responses.clone();
        response_mut(&mut short[0]).signatures.pop();
        assert!(matches!(
            merge(&fx.descriptor, &fx.gateway, WALLET_ID, &tx, &short),
            Err(Error::SignatureMismatch { input: None, .. })
        ));

        let mut wrong = responses;
        wrong[0] = fx.init_responses[0].clone();
        assert!(matches!(
            merge(&fx.descriptor, &fx.gateway, WALLET_ID, &tx, &wrong),
            Err(Error::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_check_multisig_requires_script_order() {
        let mut fx = setup(2, 3);
        let tx = sample_tx();
        let responses = fx.sign(&tx, &[1, 2, 3]);
        let context = SigningContext::new(&tx, &fx.descriptor, &fx.gateway).unwrap();
        let data = context.input(0).unwrap();

        let by_cosigner = |index: u32| -> Vec<u8> {
            responses
                .iter()
                .find_map(|env| match &env.body {
                    Body::SignTxResponse(resp) if resp.cosigner == index => {
                        Some(resp.signatures[0].der.clone())
                    }
                    _ => None,
                })
                .unwrap()
        };
        let ordered: Vec<Vec<u8>> = data.keys[..2].iter().map(|(i, _)| by_cosigner(*i)).collect();
        assert!(check_multisig(&data.witness_script, &ordered, &data.digest));

        let swapped = vec![ordered[1].clone(), ordered[0].clone()];
        assert!(!check_multisig(&data.witness_script, &swapped, &data.digest));
        assert!(!check_multisig(&data.witness_script, &ordered[..1], &data.digest));
    }
}
