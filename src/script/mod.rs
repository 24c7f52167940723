//! Multisig scripts and addresses
//!
//! This module provides:
//! - Canonical M-of-N witness scripts
//! - P2SH-P2WSH and P2PKH addresses

pub mod address;
pub mod multisig;

pub use address::{compute_address, p2pkh_address, p2shwsh_address};
pub use multisig::{
    build_multisig_script, parse_multisig_script, sort_public_keys, validate_threshold,
    MAX_PARTICIPANTS,
};
