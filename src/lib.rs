//! Coldvault: air-gapped M-of-N Bitcoin cold storage
//!
//! This crate provides the protocol for a vault whose keys live on offline
//! devices that only talk to the online gateway through QR codes:
//! - Versioned, self-describing envelopes for every ceremony stage
//! - A QR transport codec with Reed-Solomon error correction
//! - BIP-32 public derivation and P2SH-P2WSH multisig addresses
//! - A stateless ceremony: init, finalize, reveal, sign
//! - A merge engine that turns device signatures into a final transaction
//! - Simulated devices, an HTTP gateway and a CLI
//!
//! # Example
//!
//! ```rust
//! use coldvault::ceremony::{finalize_wallet, init_wallet, reveal_wallet, WalletPolicy};
//! use coldvault::crypto::Network;
//! use coldvault::device::Device;
//! use coldvault::wallet::Path;
//!
//! let policy = WalletPolicy::new(Network::Testnet, 2, 3).unwrap();
//! let mut devices: Vec<Device> = (0..3).map(|_| Device::new()).collect();
//!
//! let init: Vec<_> = init_wallet(&policy, 1)
//!     .unwrap()
//!     .iter()
//!     .zip(devices.iter_mut())
//!     .map(|(req, device)| device.handle(req).unwrap())
//!     .collect();
//! let (_descriptor, requests) = finalize_wallet(&policy, 1, &init).unwrap();
//! let attested: Vec<_> = requests
//!     .iter()
//!     .zip(devices.iter_mut())
//!     .map(|(req, device)| device.handle(req).unwrap())
//!     .collect();
//!
//! let wallet = reveal_wallet(&policy, 1, &attested, Some(Path::receive(0).unwrap())).unwrap();
//! println!("Deposit to {}", wallet.address.unwrap());
//! ```

pub mod api;
pub mod ceremony;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod device;
pub mod envelope;
pub mod error;
pub mod merge;
pub mod qr;
pub mod script;
pub mod transaction;
pub mod wallet;

// Re-export commonly used types
pub use api::{create_router, ApiState};
pub use ceremony::{
    derive_address, finalize_wallet, init_wallet, reveal_wallet, sign_tx, WalletPolicy,
};
pub use config::GatewayConfig;
pub use crypto::{Network, Xpub};
pub use device::Device;
pub use envelope::{Body, Envelope};
pub use error::{Error, Result};
pub use merge::{merge, FinalTransaction};
pub use qr::{EccLevel, QrCode};
pub use transaction::UnsignedTransaction;
pub use wallet::{Path, WalletDescriptor};
