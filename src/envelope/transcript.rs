//! Human-readable rendering of envelopes
//!
//! Used by the pretty-print endpoint and by the device when it shows a
//! transaction to its operator. A sign request renders fully on its own.

use std::fmt::Write;

use super::message::{Body, Envelope, SignTxRequest};
use crate::crypto::derive_path;
use crate::script::p2pkh_address;
use crate::transaction::{Destination, COIN};

fn btc(amount: u64) -> String {
    format!("{}.{:08} BTC", amount / COIN, amount % COIN)
}

fn short_hex(bytes: &[u8]) -> String {
    let full = hex::encode(bytes);
    if full.len() > 16 {
        format!("{}..{}", &full[..8], &full[full.len() - 8..])
    } else {
        full
    }
}

/// Destination address of each output, or why it could not be computed
pub fn output_addresses(req: &SignTxRequest) -> Vec<String> {
    req.tx
        .outputs
        .iter()
        .map(|output| {
            let address = match output.destination {
                Destination::Gateway => derive_path(&req.gateway, &output.path.segments())
                    .map(|k| p2pkh_address(&k.public_key, req.descriptor.network).to_string()),
                Destination::Change => req.descriptor.address(&output.path),
            };
            address.unwrap_or_else(|e| format!("<{}>", e))
        })
        .collect()
}

/// Review text for a sign request: destinations, amounts and fee
pub fn render_sign_request(req: &SignTxRequest) -> String {
    let mut out = String::new();
    let with_local = |amount: u64| match &req.tx.local_rate {
        Some(rate) => format!("{} ({})", btc(amount), rate.format(amount)),
        None => btc(amount),
    };

    let _ = writeln!(
        out,
        "{}-of-{} wallet on {}, signing as cosigner {}",
        req.descriptor.threshold,
        req.descriptor.participants,
        req.descriptor.network,
        req.cosigner.index
    );
    let _ = writeln!(out, "Inputs:");
    for (i, input) in req.tx.inputs.iter().enumerate() {
        let _ = writeln!(
            out,
            "  #{} {}:{} {} at {}",
            i,
            hex::encode(&input.prev_hash),
            input.prev_index,
            btc(input.amount),
            input.path
        );
    }
    let _ = writeln!(out, "Outputs:");
    let addresses = output_addresses(req);
    for ((i, output), address) in req.tx.outputs.iter().enumerate().zip(addresses) {
        let _ = writeln!(
            out,
            "  #{} {} {} -> {}",
            i,
            output.destination,
            with_local(output.amount),
            address
        );
    }
    match req.tx.fee() {
        Ok(fee) => {
            let _ = writeln!(out, "Fee: {}", with_local(fee));
        }
        Err(e) => {
            let _ = writeln!(out, "Fee: {}", e);
        }
    }
    if req.tx.lock_time != 0 {
        let _ = writeln!(out, "Lock time: {}", req.tx.lock_time);
    }
    out
}

/// Multi-line description of any envelope
pub fn transcript(envelope: &Envelope) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} for wallet {}",
        envelope.body.name(),
        envelope.wallet_id
    );
    if let Some(token) = &envelope.token {
        let _ = writeln!(out, "Token: {}", token);
    }

    match &envelope.body {
        Body::InitWalletRequest(req) => {
            let _ = writeln!(out, "Slot {} on {}", req.slot, req.network);
        }
        Body::InitWalletResponse(resp) => {
            let key = &resp.cosigner;
            let _ = writeln!(out, "Cosigner {}", key.index);
            match key.xpub() {
                Ok(xpub) => {
                    let _ = writeln!(out, "  xpub: {}", xpub);
                }
                Err(e) => {
                    let _ = writeln!(out, "  xpub: <{}>", e);
                }
            }
            let _ = writeln!(
                out,
                "  sealed seed: {} bytes",
                key.encrypted_private_material.len()
            );
        }
        Body::FinalizeWalletRequest(req) => {
            let _ = writeln!(
                out,
                "{}-of-{} on {}",
                req.threshold,
                req.cosigners.len(),
                req.network
            );
            for key in &req.cosigners {
                let fingerprint = key
                    .xpub()
                    .map(|x| x.fingerprint().to_string())
                    .unwrap_or_else(|_| "invalid".into());
                let _ = writeln!(out, "  cosigner {} [{}]", key.index, fingerprint);
            }
        }
        Body::FinalizeWalletResponse(resp) => {
            let _ = writeln!(out, "Cosigner {} attests {}", resp.cosigner, resp.xpub);
            let _ = writeln!(out, "  signature: {}", short_hex(&resp.attestation));
        }
        Body::SignTxRequest(req) => {
            out.push_str(&render_sign_request(req));
            let _ = writeln!(
                out,
                "Gateway signature: {}",
                short_hex(&req.request_signature)
            );
        }
        Body::SignTxResponse(resp) => {
            let _ = writeln!(
                out,
                "Cosigner {}: {} signature(s)",
                resp.cosigner,
                resp.signatures.len()
            );
            for (i, sig) in resp.signatures.iter().enumerate() {
                let _ = writeln!(out, "  input {}: {}", i, short_hex(&sig.der));
            }
        }
    }
    out
}
