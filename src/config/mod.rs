//! Configuration for the wallet core

pub mod rpc;

use crate::keystore::ScryptConfig;
use crate::{Error, Result};
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// Re-export RPC config
pub use rpc::RpcConfig;

/// Environment variable holding the keystore passphrase for the CLI
pub const PASSPHRASE_ENV: &str = "WALLET_PASSPHRASE";

/// Supported networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Sepolia,
    Holesky,
}

impl Network {
    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => rpc::chains::MAINNET,
            Network::Sepolia => rpc::chains::SEPOLIA,
            Network::Holesky => rpc::chains::HOLESKY,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Sepolia => "sepolia",
            Network::Holesky => "holesky",
        }
    }
}

impl std::str::FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "ethereum" => Ok(Network::Mainnet),
            "sepolia" => Ok(Network::Sepolia),
            "holesky" => Ok(Network::Holesky),
            other => Err(Error::Config(format!("Unknown network: {}", other))),
        }
    }
}

/// Gas defaults for transactions built by the wallet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasConfig {
    /// Gas price for every transaction (gwei)
    pub gas_price_gwei: u64,
    /// Gas limit for plain value transfers
    pub transfer_gas_limit: u64,
    /// Gas limit for contract calls when not estimating
    pub contract_gas_limit: u64,
    /// Ask the node (`eth_estimateGas`) instead of using `contract_gas_limit`
    #[serde(default)]
    pub estimate_contract_gas: bool,
}

impl GasConfig {
    /// Gas price in wei
    pub fn gas_price_wei(&self) -> U256 {
        U256::from(self.gas_price_gwei) * U256::from(1_000_000_000u64)
    }
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            gas_price_gwei: 11,
            transfer_gas_limit: 21_000,
            contract_gas_limit: 180_000,
            estimate_contract_gas: false,
        }
    }
}

/// A contract added to the registry from configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractEntry {
    /// Registry identifier used on the command line
    pub name: String,
    /// Deployed address (0x-prefixed hex)
    pub address: String,
    /// Path to the contract's JSON ABI
    pub abi_path: PathBuf,
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network to sign for and talk to
    #[serde(default)]
    pub network: Network,
    /// Explicit RPC endpoint; resolved from the environment when absent
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// Directory holding the encrypted account record
    pub keystore_dir: PathBuf,
    /// Scrypt work factor for newly written records
    #[serde(default)]
    pub scrypt: ScryptConfig,
    /// Gas defaults
    #[serde(default)]
    pub gas: GasConfig,
    /// Timeout applied to every node request (seconds)
    pub rpc_timeout_secs: u64,
    /// Extra contracts for the registry
    #[serde(default)]
    pub contracts: Vec<ContractEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: Network::default(),
            rpc_url: None,
            keystore_dir: PathBuf::from("KeyStore"),
            scrypt: ScryptConfig::default(),
            gas: GasConfig::default(),
            rpc_timeout_secs: 30,
            contracts: Vec::new(),
        }
    }
}

impl Config {
    /// Load a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_timeout_secs == 0 {
            return Err(Error::Config("rpc_timeout_secs must be positive".to_string()));
        }
        if self.gas.gas_price_gwei == 0 {
            return Err(Error::Config("gas_price_gwei must be positive".to_string()));
        }
        if self.gas.transfer_gas_limit < 21_000 {
            return Err(Error::Config(
                "transfer_gas_limit must be at least 21000".to_string(),
            ));
        }
        self.scrypt.check_bounds().map_err(Error::Config)?;
        if let Some(url) = &self.rpc_url {
            parse_endpoint(url)?;
        }
        Ok(())
    }

    pub fn chain_id(&self) -> u64 {
        self.network.chain_id()
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// The endpoint to use: `rpc_url` if set, otherwise the environment
    pub fn rpc_endpoint(&self) -> Result<url::Url> {
        self.rpc_endpoint_with(&RpcConfig::from_env())
    }

    pub fn rpc_endpoint_with(&self, rpc: &RpcConfig) -> Result<url::Url> {
        if let Some(url) = &self.rpc_url {
            return parse_endpoint(url);
        }
        let url = rpc.get(self.chain_id()).ok_or_else(|| {
            Error::Config(format!("No RPC endpoint for {}", self.network.name()))
        })?;
        parse_endpoint(url)
    }
}

fn parse_endpoint(raw: &str) -> Result<url::Url> {
    let url = url::Url::parse(raw)
        .map_err(|e| Error::Config(format!("Invalid RPC URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(Error::Config(format!(
            "Unsupported RPC URL scheme '{}'",
            other
        ))),
    }
}
