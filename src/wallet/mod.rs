//! Wallet descriptors and derivation paths

pub mod descriptor;

pub use descriptor::{Cosigner, CosignerKey, Path, WalletDescriptor};
