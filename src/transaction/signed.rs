//! Final segwit serialization and txid

use bitcoin::consensus::encode::serialize_hex;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::{ScriptBuf, Transaction, Witness};
use serde::{Deserialize, Serialize};

use super::sighash::SIGHASH_TYPE;
use crate::error::{Error, Result};

/// Witness data for one input: M signatures in script order plus the script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputWitness {
    /// DER signatures without the sighash byte
    pub signatures: Vec<Vec<u8>>,
    pub witness_script: ScriptBuf,
}

impl InputWitness {
    /// Stack items: the CHECKMULTISIG dummy, each signature, the script
    pub fn stack(&self) -> Vec<Vec<u8>> {
        let mut items = Vec::with_capacity(self.signatures.len() + 2);
        items.push(Vec::new());
        for der in &self.signatures {
            let mut sig = der.clone();
            sig.push(SIGHASH_TYPE.to_u32() as u8);
            items.push(sig);
        }
        items.push(self.witness_script.to_bytes());
        items
    }

    /// scriptSig pushing the P2WSH redeem script
    pub fn script_sig(&self) -> Result<ScriptBuf> {
        let redeem = ScriptBuf::new_p2wsh(&self.witness_script.wscript_hash());
        let push = PushBytesBuf::try_from(redeem.into_bytes())
            .map_err(|e| Error::InvalidTransaction(e.to_string()))?;
        Ok(Builder::new().push_slice(push).into_script())
    }
}

/// A fully signed transaction ready to broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Segwit serialization, hex
    pub raw_hex: String,
    /// Transaction id in display order, hex
    pub txid: String,
}

/// Attach scriptSigs and witnesses, then serialize
///
/// `witnesses` holds one entry per input, in input order.
pub fn finalize(unsigned: &Transaction, witnesses: &[InputWitness]) -> Result<SignedTransaction> {
    if witnesses.len() != unsigned.input.len() {
        return Err(Error::InvalidTransaction(format!(
            "{} witnesses for {} inputs",
            witnesses.len(),
            unsigned.input.len()
        )));
    }

    let mut tx = unsigned.clone();
    for (input, witness) in tx.input.iter_mut().zip(witnesses) {
        input.script_sig = witness.script_sig()?;
        input.witness = Witness::from_slice(&witness.stack());
    }

    Ok(SignedTransaction {
        raw_hex: serialize_hex(&tx),
        txid: tx.compute_txid().to_string(),
    })
}
