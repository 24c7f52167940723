//! CLI commands for the ceremony gateway
//!
//! Implements all command handlers for the CLI interface.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Deserialize;
use std::fs;
use std::path::Path as FsPath;

use crate::api::{create_router, ApiState};
use crate::ceremony::{finalize_wallet, init_wallet, reveal_wallet, sign_tx};
use crate::config::GatewayConfig;
use crate::crypto::{master_key, neuter, Xpub};
use crate::device::Device;
use crate::envelope::{self, Body, Envelope, RequestSigner};
use crate::merge::merge;
use crate::qr;
use crate::transaction::{Destination, TxInput, TxOutput, UnsignedTransaction, COIN};
use crate::wallet::{CosignerKey, Path};

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Start the HTTP gateway
pub fn cmd_serve(config: GatewayConfig) -> CliResult<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let addr = format!("0.0.0.0:{}", config.port);
        println!(
            "🚀 Gateway for {}-of-{} {} wallets on http://localhost:{}",
            config.threshold, config.participants, config.network, config.port
        );
        if config.gateway_xpub.is_none() {
            println!("   ⚠️  No gateway xpub configured, sign and merge are disabled");
        }
        if config.request_key.is_none() {
            println!("   ⚠️  No request key configured, sign requests are disabled");
        }

        let app = create_router(ApiState::new(config));
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    })
}

/// Show the active configuration
pub fn cmd_constants(config: &GatewayConfig) -> CliResult<()> {
    println!("🔧 Wallet policy");
    println!("   ├─ M: {}", config.threshold);
    println!("   ├─ N: {}", config.participants);
    println!("   ├─ Network: {}", config.network);
    println!(
        "   ├─ Gateway: {}",
        config.gateway_xpub.as_deref().unwrap_or("-")
    );
    let request_key = config
        .request_signer()?
        .map(|signer| hex::encode(signer.public_key().serialize()));
    println!(
        "   ├─ Request key: {}",
        request_key.as_deref().unwrap_or("-")
    );
    println!(
        "   └─ QR level: {} (up to {} bytes)",
        config.ecc_level,
        config.ecc_level.max_payload()
    );
    Ok(())
}

fn decode_envelope(data: &str) -> CliResult<Envelope> {
    let bytes = STANDARD.decode(data.trim())?;
    Ok(envelope::decode(&bytes)?)
}

/// Render a base64 envelope as a QR symbol in the terminal
pub fn cmd_print_qr(config: &GatewayConfig, data: &str) -> CliResult<()> {
    let envelope = decode_envelope(data)?;
    let bytes = envelope::encode(&envelope)?;
    let code = qr::encode(&bytes, config.ecc_level)?;

    println!("{}", code.render_terminal());
    println!(
        "{} for wallet {} (version {}, level {}, {} bytes)",
        envelope.body.name(),
        envelope.wallet_id,
        code.version,
        code.level,
        bytes.len()
    );
    Ok(())
}

/// Print the transcript of a base64 envelope
pub fn cmd_pretty_print(data: &str) -> CliResult<()> {
    let envelope = decode_envelope(data)?;
    println!("{}", envelope::transcript(&envelope));
    Ok(())
}

#[derive(Deserialize)]
struct ScannedSymbol {
    size: usize,
    pixels: Vec<bool>,
}

/// Decode a scanned symbol from a JSON file of `{size, pixels}`
pub fn cmd_scan(file: &FsPath) -> CliResult<()> {
    let scanned: ScannedSymbol = serde_json::from_str(&fs::read_to_string(file)?)?;
    let bytes = qr::decode(scanned.size, &scanned.pixels)?;
    let envelope = envelope::decode(&bytes)?;

    println!("📷 {}", envelope.body.name());
    println!("{}", STANDARD.encode(&bytes));
    println!();
    println!("{}", envelope::transcript(&envelope));
    Ok(())
}

/// Carry an envelope through a symbol and back, as the air gap would
fn transport(envelope: &Envelope, level: qr::EccLevel) -> CliResult<Envelope> {
    let bytes = envelope::encode(envelope)?;
    let code = qr::encode(&bytes, level)?;
    let scanned = qr::decode(code.size, &code.modules)?;
    println!(
        "   ├─ {} → QR v{} ({}×{})",
        envelope.body.name(),
        code.version,
        code.size,
        code.size
    );
    Ok(envelope::decode(&scanned)?)
}

fn handle_all(
    devices: &mut [Device],
    requests: &[Envelope],
    level: qr::EccLevel,
) -> CliResult<Vec<Envelope>> {
    requests
        .iter()
        .zip(devices.iter_mut())
        .map(|(request, device)| {
            let received = transport(request, level)?;
            let response = device.handle(&received)?;
            transport(&response, level)
        })
        .collect()
}

/// Run a whole ceremony against simulated devices
pub fn cmd_demo(config: &GatewayConfig, wallet_id: u32) -> CliResult<()> {
    let policy = config.policy()?;
    let level = config.ecc_level;
    let gateway: Xpub = match config.gateway()? {
        Some(gateway) => gateway,
        None => {
            let mut seed = [0u8; 32];
            OsRng.fill_bytes(&mut seed);
            println!("⚠️  No gateway xpub configured, using a throwaway one");
            neuter(&master_key(policy.network, &seed)?)
        }
    };
    let signer = match config.request_signer()? {
        Some(signer) => signer,
        None => {
            println!("⚠️  No request key configured, using a throwaway one");
            RequestSigner::generate()
        }
    };
    let request_key = signer.public_key();
    let mut devices: Vec<Device> = (0..policy.participants)
        .map(|_| Device::new().trust_request_key(request_key))
        .collect();

    println!(
        "🔐 Wallet {}: {}-of-{} on {}",
        wallet_id, policy.threshold, policy.participants, policy.network
    );

    println!("\n1. Init");
    let requests = init_wallet(&policy, wallet_id)?;
    let init_responses = handle_all(&mut devices, &requests, level)?;
    let mut keys: Vec<CosignerKey> = init_responses
        .iter()
        .filter_map(|e| match &e.body {
            Body::InitWalletResponse(resp) => Some(resp.cosigner.clone()),
            _ => None,
        })
        .collect();
    keys.sort_by_key(|k| k.index);

    println!("\n2. Finalize");
    let (descriptor, requests) = finalize_wallet(&policy, wallet_id, &init_responses)?;
    let finalize_responses = handle_all(&mut devices, &requests, level)?;

    println!("\n3. Reveal");
    let receive = Path::receive(0)?;
    let revealed = reveal_wallet(&policy, wallet_id, &finalize_responses, Some(receive))?;
    for xpub in &revealed.xpubs {
        println!("   ├─ {}", xpub);
    }
    let address = revealed.address.unwrap_or_default();
    println!("   └─ Deposit address {}: {}", receive, address);

    println!("\n4. Sign");
    let mut prev_hash = vec![0u8; 32];
    OsRng.fill_bytes(&mut prev_hash);
    let tx = UnsignedTransaction {
        inputs: vec![TxInput {
            prev_hash,
            prev_index: 0,
            amount: COIN,
            path: receive,
        }],
        outputs: vec![
            TxOutput {
                amount: 60_000_000,
                destination: Destination::Gateway,
                path: Path::receive(0)?,
            },
            TxOutput {
                amount: 39_990_000,
                destination: Destination::Change,
                path: Path::change(0)?,
            },
        ],
        lock_time: 0,
        local_rate: None,
    };
    let quorum = &keys[..policy.threshold];
    let requests = sign_tx(&descriptor, &gateway, &signer, wallet_id, &tx, quorum)?;
    let mut signers: Vec<Device> = Vec::with_capacity(quorum.len());
    for key in quorum {
        signers.push(std::mem::take(&mut devices[key.index as usize - 1]));
    }
    let sign_responses = handle_all(&mut signers, &requests, level)?;

    println!("\n5. Merge");
    let merged = merge(&descriptor, &gateway, wallet_id, &tx, &sign_responses)?;
    println!("   ├─ txid: {}", merged.txid);
    println!("   └─ raw: {}", merged.raw_hex);
    Ok(())
}
