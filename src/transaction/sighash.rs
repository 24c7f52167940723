//! BIP-143 signature digests for P2SH-P2WSH vault inputs

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::PublicKey;
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};

use super::model::{Destination, TxInput, TxOutput, UnsignedTransaction};
use crate::crypto::{derive_path, Xpub};
use crate::error::{Error, Result};
use crate::script::{p2pkh_address, p2shwsh_address};
use crate::wallet::WalletDescriptor;

/// Transaction version written by the vault
pub const TX_VERSION: Version = Version::ONE;

/// nSequence of every input: final for RBF purposes, lock_time enabled
pub const SEQUENCE: Sequence = Sequence::ENABLE_LOCKTIME_NO_RBF;

pub const SIGHASH_TYPE: EcdsaSighashType = EcdsaSighashType::All;

/// scriptPubKey an output pays to
pub fn output_script(
    output: &TxOutput,
    descriptor: &WalletDescriptor,
    gateway: &Xpub,
) -> Result<ScriptBuf> {
    match output.destination {
        Destination::Gateway => {
            let key = derive_path(gateway, &output.path.segments())?.public_key;
            Ok(p2pkh_address(&key, descriptor.network).script_pubkey())
        }
        Destination::Change => {
            let witness_script = descriptor.witness_script(&output.path)?;
            Ok(p2shwsh_address(&witness_script, descriptor.network).script_pubkey())
        }
    }
}

/// Outpoint of a vault input; `prev_hash` is in display order
pub fn outpoint(input: &TxInput) -> Result<OutPoint> {
    let mut internal: [u8; 32] = input.prev_hash.as_slice().try_into().map_err(|_| {
        Error::InvalidTransaction(format!(
            "previous hash must be 32 bytes, got {}",
            input.prev_hash.len()
        ))
    })?;
    internal.reverse();
    Ok(OutPoint {
        txid: Txid::from_byte_array(internal),
        vout: input.prev_index,
    })
}

/// The unsigned transaction in consensus form, witnesses empty
pub fn build_transaction(
    tx: &UnsignedTransaction,
    descriptor: &WalletDescriptor,
    gateway: &Xpub,
) -> Result<Transaction> {
    let input = tx
        .inputs
        .iter()
        .map(|input| {
            Ok(TxIn {
                previous_output: outpoint(input)?,
                script_sig: ScriptBuf::new(),
                sequence: SEQUENCE,
                witness: Witness::new(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let output = tx
        .outputs
        .iter()
        .map(|output| {
            Ok(TxOut {
                value: Amount::from_sat(output.amount),
                script_pubkey: output_script(output, descriptor, gateway)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Transaction {
        version: TX_VERSION,
        lock_time: LockTime::from_consensus(tx.lock_time),
        input,
        output,
    })
}

/// Per-input signing material
#[derive(Debug, Clone)]
pub struct InputSigningData {
    pub digest: [u8; 32],
    pub witness_script: ScriptBuf,
    /// Cosigner index and child key, in witness script order
    pub keys: Vec<(u32, PublicKey)>,
}

/// A transaction bound to its wallet, with every input's digest computed
#[derive(Debug, Clone)]
pub struct SigningContext<'a> {
    pub tx: &'a UnsignedTransaction,
    pub descriptor: &'a WalletDescriptor,
    pub unsigned: Transaction,
    inputs: Vec<InputSigningData>,
}

impl<'a> SigningContext<'a> {
    pub fn new(
        tx: &'a UnsignedTransaction,
        descriptor: &'a WalletDescriptor,
        gateway: &Xpub,
    ) -> Result<Self> {
        let unsigned = build_transaction(tx, descriptor, gateway)?;

        let mut cache = SighashCache::new(&unsigned);
        let mut inputs = Vec::with_capacity(tx.inputs.len());
        for (index, input) in tx.inputs.iter().enumerate() {
            let witness_script = descriptor.witness_script(&input.path)?;
            let digest = cache
                .p2wsh_signature_hash(
                    index,
                    &witness_script,
                    Amount::from_sat(input.amount),
                    SIGHASH_TYPE,
                )
                .map_err(|e| Error::InvalidTransaction(e.to_string()))?;
            inputs.push(InputSigningData {
                digest: digest.to_byte_array(),
                witness_script,
                keys: descriptor.child_keys(&input.path)?,
            });
        }

        Ok(SigningContext {
            tx,
            descriptor,
            unsigned,
            inputs,
        })
    }

    /// Digest, witness script and ordered child keys for input `index`
    pub fn input(&self, index: usize) -> Result<InputSigningData> {
        self.inputs
            .get(index)
            .cloned()
            .ok_or_else(|| Error::InvalidTransaction(format!("no input {}", index)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Path;

    fn input(prev_hash: Vec<u8>) -> TxInput {
        TxInput {
            prev_hash,
            prev_index: 2,
            amount: 0,
            path: Path::receive(0).unwrap(),
        }
    }

    #[test]
    fn test_outpoint_reverses_hash() {
        let mut hash = vec![0u8; 32];
        hash[0] = 0xaa;
        hash[31] = 0xbb;
        let point = outpoint(&input(hash.clone())).unwrap();
        let internal = point.txid.to_byte_array();
        assert_eq!(internal[0], 0xbb);
        assert_eq!(internal[31], 0xaa);
        assert_eq!(point.vout, 2);
        // Txid displays in the order the caller supplied
        assert_eq!(point.txid.to_string(), hex::encode(&hash));
    }

    #[test]
    fn test_outpoint_rejects_short_hash() {
        assert!(matches!(
            outpoint(&input(vec![0u8; 31])),
            Err(Error::InvalidTransaction(_))
        ));
    }

    #[test]
    fn test_sighash_constants() {
        assert_eq!(TX_VERSION.0, 1);
        assert_eq!(SEQUENCE.0, 0xffff_fffe);
        assert_eq!(SIGHASH_TYPE.to_u32(), 0x01);
    }
}
