//! Vault transactions
//!
//! This module provides:
//! - The unsigned transaction model and its policy checks
//! - BIP-143 digests for P2SH-P2WSH inputs
//! - Segwit serialization and txid of the merged transaction via `bitcoin`

pub mod model;
pub mod sighash;
pub mod signed;

pub use model::{
    Destination, ExchangeRate, TxInput, TxOutput, UnsignedTransaction, COIN, MAX_INPUTS,
    MAX_OUTPUTS,
};
pub use sighash::{
    build_transaction, outpoint, output_script, InputSigningData, SigningContext, SIGHASH_TYPE,
};
pub use signed::{finalize, InputWitness, SignedTransaction};
