//! Unsigned transaction model and policy checks
//!
//! The gateway builds an [`UnsignedTransaction`] from caller-supplied fields
//! and every signing device re-validates it before showing it to a human.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::wallet::Path;

// =============================================================================
// Constants
// =============================================================================

/// Satoshis per bitcoin
pub const COIN: u64 = 100_000_000;

/// Maximum inputs a device will sign in one transaction
pub const MAX_INPUTS: usize = 128;

/// Maximum outputs a device will sign in one transaction
pub const MAX_OUTPUTS: usize = 128;

/// Length of a previous transaction hash
pub const PREV_HASH_LEN: usize = 32;

/// Fees below this are always acceptable
pub const ABSOLUTE_FEE_LIMIT: u64 = COIN;

/// Otherwise the fee must stay under 1/FEE_RATIO_LIMIT of the gateway total
pub const FEE_RATIO_LIMIT: u64 = 10;

// =============================================================================
// Inputs and outputs
// =============================================================================

/// A vault UTXO being spent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Previous txid in display (big-endian) byte order
    pub prev_hash: Vec<u8>,
    pub prev_index: u32,
    /// Value of the spent output; committed to by the BIP-143 digest
    pub amount: u64,
    /// Where the spent output's script was derived
    pub path: Path,
}

/// Where an output's value goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destination {
    /// P2PKH address of the gateway at the output's path
    Gateway,
    /// Back into the vault on the change chain
    Change,
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Gateway => write!(f, "gateway"),
            Destination::Change => write!(f, "change"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub amount: u64,
    pub destination: Destination,
    pub path: Path,
}

/// Display-only conversion rate shown next to amounts on the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// ISO currency code, e.g. "USD"
    pub currency: String,
    /// Price of one bitcoin in hundredths of the currency
    pub cents_per_btc: u64,
}

impl ExchangeRate {
    /// Render `amount` satoshis in the local currency, e.g. "1234.56 USD"
    pub fn format(&self, amount: u64) -> String {
        let cents = amount as u128 * self.cents_per_btc as u128 / COIN as u128;
        format!("{}.{:02} {}", cents / 100, cents % 100, self.currency)
    }
}

// =============================================================================
// Unsigned Transaction
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
    #[serde(default)]
    pub local_rate: Option<ExchangeRate>,
}

impl UnsignedTransaction {
    /// Structural checks: counts, hash lengths, paths and destinations
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(Error::InvalidTransaction("no inputs".into()));
        }
        if self.inputs.len() > MAX_INPUTS {
            return Err(Error::InvalidTransaction(format!(
                "{} inputs exceeds the limit of {}",
                self.inputs.len(),
                MAX_INPUTS
            )));
        }
        if self.outputs.is_empty() {
            return Err(Error::InvalidTransaction("no outputs".into()));
        }
        if self.outputs.len() > MAX_OUTPUTS {
            return Err(Error::InvalidTransaction(format!(
                "{} outputs exceeds the limit of {}",
                self.outputs.len(),
                MAX_OUTPUTS
            )));
        }

        for (i, input) in self.inputs.iter().enumerate() {
            if input.prev_hash.len() != PREV_HASH_LEN {
                return Err(Error::InvalidTransaction(format!(
                    "input {}: prev_hash must be {} bytes, got {}",
                    i,
                    PREV_HASH_LEN,
                    input.prev_hash.len()
                )));
            }
            input.path.validate()?;
        }

        for (i, output) in self.outputs.iter().enumerate() {
            output.path.validate()?;
            let consistent = match output.destination {
                Destination::Change => output.path.change,
                Destination::Gateway => !output.path.change,
            };
            if !consistent {
                return Err(Error::InvalidTransaction(format!(
                    "output {}: {} destination with {} path {}",
                    i,
                    output.destination,
                    if output.path.change { "change" } else { "receive" },
                    output.path
                )));
            }
        }

        self.total_in()?;
        self.total_out()?;
        Ok(())
    }

    pub fn total_in(&self) -> Result<u64> {
        checked_sum(self.inputs.iter().map(|i| i.amount), "input")
    }

    pub fn total_out(&self) -> Result<u64> {
        checked_sum(self.outputs.iter().map(|o| o.amount), "output")
    }

    /// Total sent to the gateway
    pub fn gateway_total(&self) -> Result<u64> {
        checked_sum(
            self.outputs
                .iter()
                .filter(|o| o.destination == Destination::Gateway)
                .map(|o| o.amount),
            "gateway",
        )
    }

    /// Inputs minus outputs; a transaction that creates value is rejected
    pub fn fee(&self) -> Result<u64> {
        let total_in = self.total_in()?;
        let total_out = self.total_out()?;
        total_in.checked_sub(total_out).ok_or_else(|| {
            Error::InvalidTransaction(format!(
                "outputs ({}) exceed inputs ({})",
                total_out, total_in
            ))
        })
    }

    /// Full validation plus fee policy, returning the fee
    ///
    /// The fee must be below one bitcoin, or below a tenth of what is sent to
    /// the gateway.
    pub fn check_policy(&self) -> Result<u64> {
        self.validate()?;
        let fee = self.fee()?;
        let gateway = self.gateway_total()?;
        let ratio_ok = fee
            .checked_mul(FEE_RATIO_LIMIT)
            .map(|scaled| scaled < gateway)
            .unwrap_or(false);
        if fee >= ABSOLUTE_FEE_LIMIT && !ratio_ok {
            return Err(Error::InvalidTransaction(format!(
                "fee of {} sat is too high for {} sat sent to the gateway",
                fee, gateway
            )));
        }
        Ok(fee)
    }
}

fn checked_sum(mut amounts: impl Iterator<Item = u64>, what: &str) -> Result<u64> {
    amounts.try_fold(0u64, |acc, amount| {
        acc.checked_add(amount)
            .ok_or_else(|| Error::InvalidTransaction(format!("{} total overflows", what)))
    })
}
