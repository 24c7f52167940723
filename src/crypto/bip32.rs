//! BIP-32 hierarchical deterministic keys
//!
//! The gateway only ever holds extended *public* keys and can therefore only
//! walk non-hardened paths. Extended private keys exist for the offline
//! cosigner device, which derives its account key `m/coin'` and signs at
//! `m/coin'/change/index`.

use bitcoin::bip32::{ChildNumber, Xpriv, Xpub};
use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::NetworkKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// First hardened child index
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// Bitcoin network the vault runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn to_bitcoin(self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
        }
    }

    /// Version-byte family of keys and addresses on this network
    pub fn kind(self) -> NetworkKind {
        NetworkKind::from(self.to_bitcoin())
    }

    /// SLIP-44 coin type used as the hardened account level
    pub fn coin_type(&self) -> u32 {
        match self {
            Network::Mainnet => 0,
            Network::Testnet => 1,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "bitcoin" => Ok(Network::Mainnet),
            "testnet" | "testnet3" => Ok(Network::Testnet),
            other => Err(Error::Config(format!("unknown network: {}", other))),
        }
    }
}

fn normal_path(path: &[u32]) -> Result<Vec<ChildNumber>> {
    path.iter()
        .map(|&index| {
            ChildNumber::from_normal_idx(index).map_err(|_| {
                Error::InvalidDerivation(format!(
                    "index {} is hardened; public derivation needs index < 2^31",
                    index
                ))
            })
        })
        .collect()
}

/// Non-hardened public child derivation
pub fn derive_child(parent: &Xpub, index: u32) -> Result<Xpub> {
    derive_path(parent, &[index])
}

/// Derive along a sequence of non-hardened indices
pub fn derive_path(parent: &Xpub, path: &[u32]) -> Result<Xpub> {
    let secp = Secp256k1::verification_only();
    Ok(parent.derive_pub(&secp, &normal_path(path)?)?)
}

/// Master key from a seed
pub fn master_key(network: Network, seed: &[u8]) -> Result<Xpriv> {
    Ok(Xpriv::new_master(network.to_bitcoin(), seed)?)
}

/// Account key `m/coin'` a cosigner derives from its seed
pub fn account_key(network: Network, seed: &[u8]) -> Result<Xpriv> {
    let secp = Secp256k1::signing_only();
    let account = ChildNumber::Hardened {
        index: network.coin_type(),
    };
    Ok(master_key(network, seed)?.derive_priv(&secp, &[account])?)
}

/// Neuter into the matching extended public key
pub fn neuter(key: &Xpriv) -> Xpub {
    Xpub::from_priv(&Secp256k1::signing_only(), key)
}

/// Secret key at a non-hardened `path` below `account`
pub fn signing_key(account: &Xpriv, path: &[u32]) -> Result<SecretKey> {
    let secp = Secp256k1::signing_only();
    Ok(account.derive_priv(&secp, &normal_path(path)?)?.private_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    // BIP-32 test vector 1
    const SEED: &str = "000102030405060708090a0b0c0d0e0f";
    const M_XPUB: &str = "xpub661MyMwAqRbcFtXgS5sYJABqqG9YLmC4Q1Rdap9gSE8NqtwybGhePY2gZ29ESFjqJoCu1Rupje8YtGqsefD265TMg7usUDFdp6W1EGMcet8";
    const M_XPRV: &str = "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi";
    const M_0H_XPUB: &str = "xpub68Gmy5EdvgibQVfPdqkBBCHxA5htiqg55crXYuXoQRKfDBFA1WEjWgP6LHhwBZeNK1VTsfTFUHCdrfp1bgwQ9xv5ski8PX9rL2dZXvgGDnw";
    const M_0H_1_XPUB: &str = "xpub6ASuArnXKPbfEwhqN6e3mwBcDTgzisQN1wXN9BJcM47sSikHjJf3UFHKkNAWbWMiGj7Wf5uMash7SyYq527Hqck2AxYysAA7xmALppuCkwQ";

    fn master() -> Xpriv {
        master_key(Network::Mainnet, &hex::decode(SEED).unwrap()).unwrap()
    }

    #[test]
    fn test_master_from_seed() {
        let master = master();
        assert_eq!(master.to_string(), M_XPRV);
        assert_eq!(neuter(&master).to_string(), M_XPUB);
    }

    #[test]
    fn test_account_key_is_hardened_coin_type() {
        // Mainnet coin type 0 makes the account key m/0'
        let seed = hex::decode(SEED).unwrap();
        let account = account_key(Network::Mainnet, &seed).unwrap();
        assert_eq!(neuter(&account).to_string(), M_0H_XPUB);

        let child = derive_child(&neuter(&account), 1).unwrap();
        assert_eq!(child.to_string(), M_0H_1_XPUB);

        // Private derivation of m/0'/1 matches the public one
        let secret = signing_key(&account, &[1]).unwrap();
        let secp = Secp256k1::new();
        assert_eq!(secret.public_key(&secp), child.public_key);
    }

    #[test]
    fn test_hardened_public_derivation_rejected() {
        let xpub: Xpub = M_XPUB.parse().unwrap();
        assert!(matches!(
            derive_child(&xpub, HARDENED_OFFSET),
            Err(Error::InvalidDerivation(_))
        ));
        assert!(matches!(
            signing_key(&master(), &[0, HARDENED_OFFSET + 1]),
            Err(Error::InvalidDerivation(_))
        ));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let xpub: Xpub = M_0H_XPUB.parse().unwrap();
        let a = derive_path(&xpub, &[1, 7]).unwrap();
        let b = derive_path(&xpub, &[1, 7]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.depth, 3);
        assert_ne!(a, derive_path(&xpub, &[0, 7]).unwrap());
        assert_eq!(derive_path(&xpub, &[]).unwrap(), xpub);
    }

    #[test]
    fn test_testnet_keys() {
        let xpub = neuter(&master_key(Network::Testnet, &[7u8; 32]).unwrap());
        let encoded = xpub.to_string();
        assert!(encoded.starts_with("tpub"));
        assert_eq!(xpub.network, Network::Testnet.kind());
        assert_ne!(xpub.network, Network::Mainnet.kind());
        assert_eq!(encoded.parse::<Xpub>().unwrap(), xpub);
    }

    #[test]
    fn test_serde_forms() {
        let xpub: Xpub = M_0H_XPUB.parse().unwrap();
        let json = serde_json::to_string(&xpub).unwrap();
        assert_eq!(json, format!("\"{}\"", M_0H_XPUB));
        assert_eq!(serde_json::from_str::<Xpub>(&json).unwrap(), xpub);

        let config = bincode::config::standard();
        let bytes = bincode::serde::encode_to_vec(xpub, config).unwrap();
        let (decoded, _): (Xpub, usize) =
            bincode::serde::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(decoded, xpub);
    }

    #[test]
    fn test_network_names() {
        assert_eq!("Bitcoin".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert!(matches!("regtest".parse::<Network>(), Err(Error::Config(_))));
        assert_eq!(Network::Testnet.to_string(), "testnet");
    }
}
