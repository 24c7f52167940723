//! Addresses for the two output kinds the vault produces

use bitcoin::secp256k1::PublicKey;
use bitcoin::{Address, Script};

use crate::crypto::Network;

/// P2SH-P2WSH address of a witness script
pub fn p2shwsh_address(witness_script: &Script, network: Network) -> Address {
    Address::p2shwsh(witness_script, network.to_bitcoin())
}

/// P2PKH address of a single key (gateway outputs)
pub fn p2pkh_address(public_key: &PublicKey, network: Network) -> Address {
    let key = bitcoin::PublicKey::new(*public_key);
    Address::p2pkh(key.pubkey_hash(), network.to_bitcoin())
}

/// Encoded P2SH-P2WSH address string
pub fn compute_address(witness_script: &Script, network: Network) -> String {
    p2shwsh_address(witness_script, network).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::build_multisig_script;
    use bitcoin::ScriptBuf;

    const GENERATOR: &str = "0279BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798";

    fn generator() -> PublicKey {
        PublicKey::from_slice(&hex::decode(GENERATOR).unwrap()).unwrap()
    }

    #[test]
    fn test_p2pkh_vector() {
        let key = generator();
        assert_eq!(
            p2pkh_address(&key, Network::Mainnet).to_string(),
            "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH"
        );
        assert!(p2pkh_address(&key, Network::Testnet)
            .to_string()
            .starts_with(['m', 'n']));
    }

    #[test]
    fn test_p2sh_prefixes() {
        let script = build_multisig_script(1, &[generator()]).unwrap();
        let mainnet = compute_address(&script, Network::Mainnet);
        let testnet = compute_address(&script, Network::Testnet);
        assert!(mainnet.starts_with('3'));
        assert!(testnet.starts_with('2'));
        assert_eq!(mainnet, compute_address(&script, Network::Mainnet));
    }

    #[test]
    fn test_nested_segwit_script_pubkey() {
        let script = build_multisig_script(1, &[generator()]).unwrap();
        let redeem = ScriptBuf::new_p2wsh(&script.wscript_hash());
        let spk = p2shwsh_address(&script, Network::Mainnet).script_pubkey();
        assert!(spk.is_p2sh());
        assert_eq!(spk, ScriptBuf::new_p2sh(&redeem.script_hash()));
    }
}
