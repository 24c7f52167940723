//! Gateway configuration
//!
//! Loaded from a JSON file when one is given, then overridden by command-line
//! flags. Every field has a default so a partial file is enough.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::ceremony::WalletPolicy;
use crate::crypto::{Network, Xpub};
use crate::envelope::RequestSigner;
use crate::error::{Error, Result};
use crate::qr::EccLevel;

/// Settings shared by the HTTP gateway and the CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub network: Network,
    /// Signatures required (M)
    pub threshold: usize,
    /// Cosigners in the wallet (N)
    pub participants: usize,
    /// Account xpub of the gateway that receives withdrawals
    pub gateway_xpub: Option<String>,
    /// Hex secret of the key that signs every sign request
    pub request_key: Option<String>,
    pub ecc_level: EccLevel,
    /// HTTP port for `serve`
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            network: Network::Testnet,
            threshold: 2,
            participants: 3,
            gateway_xpub: None,
            request_key: None,
            ecc_level: EccLevel::Medium,
            port: 3000,
        }
    }
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub network: Option<Network>,
    pub threshold: Option<usize>,
    pub participants: Option<usize>,
    pub gateway_xpub: Option<String>,
    pub request_key: Option<String>,
    pub ecc_level: Option<EccLevel>,
    pub port: Option<u16>,
}

impl GatewayConfig {
    /// Read a JSON config file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config: GatewayConfig = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Defaults, then the file if any, then the flags
    pub fn resolve(path: Option<&Path>, overrides: Overrides) -> Result<Self> {
        let base = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        let config = base.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(network) = overrides.network {
            self.network = network;
        }
        if let Some(threshold) = overrides.threshold {
            self.threshold = threshold;
        }
        if let Some(participants) = overrides.participants {
            self.participants = participants;
        }
        if overrides.gateway_xpub.is_some() {
            self.gateway_xpub = overrides.gateway_xpub;
        }
        if overrides.request_key.is_some() {
            self.request_key = overrides.request_key;
        }
        if let Some(level) = overrides.ecc_level {
            self.ecc_level = level;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.policy()?;
        self.gateway()?;
        self.request_signer()?;
        Ok(())
    }

    pub fn policy(&self) -> Result<WalletPolicy> {
        WalletPolicy::new(self.network, self.threshold, self.participants)
    }

    /// Parsed gateway xpub; it must belong to the configured network
    pub fn gateway(&self) -> Result<Option<Xpub>> {
        let Some(encoded) = &self.gateway_xpub else {
            return Ok(None);
        };
        let xpub: Xpub = encoded
            .parse()
            .map_err(|e| Error::Config(format!("gateway_xpub: {}", e)))?;
        if xpub.network != self.network.kind() {
            return Err(Error::Config(format!(
                "gateway_xpub is for {:?}, configured network is {}",
                xpub.network, self.network
            )));
        }
        Ok(Some(xpub))
    }

    /// Gateway xpub, failing when none is configured
    pub fn require_gateway(&self) -> Result<Xpub> {
        self.gateway()?
            .ok_or_else(|| Error::Config("no gateway_xpub configured".into()))
    }

    /// Parsed request signing key
    pub fn request_signer(&self) -> Result<Option<RequestSigner>> {
        self.request_key
            .as_deref()
            .map(RequestSigner::from_hex)
            .transpose()
    }

    /// Request signing key, failing when none is configured
    pub fn require_request_signer(&self) -> Result<RequestSigner> {
        self.request_signer()?
            .ok_or_else(|| Error::Config("no request_key configured".into()))
    }
}
