//! Registry of callable smart contracts
//!
//! Each entry pairs a deployed address with its JSON ABI under a short name
//! used by callers (`"bbi"`, or names from the config file). The registry is
//! assembled once at startup and is read-only afterwards.

use crate::config::ContractEntry;
use crate::{Error, Result};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::{address, Address};
use std::collections::HashMap;
use std::str::FromStr;

/// ERC-20 subset ABI: balanceOf, transfer, decimals, totalSupply
pub const ERC20_ABI: &str = include_str!("../abi/erc20.json");

/// Built-in contracts
pub mod builtin {
    use super::*;

    pub const BBI_NAME: &str = "bbi";
    pub const BBI_ADDRESS: Address = address!("37d40510a2f5bc98aa7a0f7bf4b3453bcfb90ac1");
}

/// A contract the wallet can call
#[derive(Debug, Clone)]
pub struct ContractDescriptor {
    pub name: String,
    pub address: Address,
    pub abi: JsonAbi,
}

impl ContractDescriptor {
    /// Parse an ABI document into a descriptor
    pub fn from_abi_json(name: impl Into<String>, address: Address, abi_json: &str) -> Result<Self> {
        let name = name.into();
        let abi: JsonAbi = serde_json::from_str(abi_json)
            .map_err(|e| Error::Config(format!("Invalid ABI for contract '{}': {}", name, e)))?;
        Ok(Self { name, address, abi })
    }

    /// All overloads of `method`
    pub fn functions(&self, method: &str) -> Result<&[Function]> {
        self.abi
            .function(method)
            .map(|overloads| overloads.as_slice())
            .ok_or_else(|| Error::UnknownMethod {
                contract: self.name.clone(),
                method: method.to_string(),
            })
    }
}

/// Contracts by registry name
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    contracts: HashMap<String, ContractDescriptor>,
}

impl ContractRegistry {
    /// Registry with the built-in contracts only
    pub fn builtin() -> Result<Self> {
        let bbi =
            ContractDescriptor::from_abi_json(builtin::BBI_NAME, builtin::BBI_ADDRESS, ERC20_ABI)?;
        Ok(Self::from_descriptors([bbi]))
    }

    /// Registry from explicit descriptors. Later entries replace earlier ones
    /// with the same name.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ContractDescriptor>) -> Self {
        let contracts = descriptors
            .into_iter()
            .map(|descriptor| (descriptor.name.clone(), descriptor))
            .collect();
        Self { contracts }
    }

    /// Built-in contracts plus config entries, reading each ABI file
    pub fn from_config(entries: &[ContractEntry]) -> Result<Self> {
        let mut descriptors: Vec<ContractDescriptor> =
            Self::builtin()?.contracts.into_values().collect();

        for entry in entries {
            let address = Address::from_str(&entry.address).map_err(|e| {
                Error::Config(format!(
                    "Invalid address for contract '{}': {}",
                    entry.name, e
                ))
            })?;
            let abi_json = std::fs::read_to_string(&entry.abi_path).map_err(|e| {
                Error::Config(format!(
                    "Failed to read ABI {}: {}",
                    entry.abi_path.display(),
                    e
                ))
            })?;
            tracing::debug!(name = %entry.name, %address, "Registering contract");
            descriptors.push(ContractDescriptor::from_abi_json(
                entry.name.clone(),
                address,
                &abi_json,
            )?);
        }

        Ok(Self::from_descriptors(descriptors))
    }

    /// Look up a contract by name
    pub fn get(&self, name: &str) -> Result<&ContractDescriptor> {
        self.contracts
            .get(name)
            .ok_or_else(|| Error::ContractNotFound(name.to_string()))
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.contracts.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
