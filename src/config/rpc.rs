//! RPC endpoint configuration
//!
//! Supports multiple configuration methods following Ethereum ecosystem conventions:
//! 1. Per-chain env vars (ETH_RPC_URL, SEPOLIA_RPC_URL, HOLESKY_RPC_URL) - highest priority
//! 2. Provider API keys (ALCHEMY_API_KEY, INFURA_API_KEY) - builds URLs automatically
//! 3. Public RPC fallbacks - for testing only
//!
//! # Examples
//!
//! ```bash
//! # Option 1: Per-chain URLs (recommended for production)
//! export ETH_RPC_URL="https://eth-mainnet.g.alchemy.com/v2/YOUR_KEY"
//! export SEPOLIA_RPC_URL="https://eth-sepolia.g.alchemy.com/v2/YOUR_KEY"
//!
//! # Option 2: Single provider API key
//! export INFURA_API_KEY="YOUR_KEY"
//!
//! # Option 3: No env vars - uses public RPCs (rate limited, for testing only)
//! ```
//!
//! An explicit `rpc_url` in the config file overrides all of this.

use std::collections::HashMap;

/// RPC configuration for multiple chains
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// RPC URLs indexed by chain ID
    urls: HashMap<u64, String>,
}

/// Chain ID constants
pub mod chains {
    pub const MAINNET: u64 = 1;
    pub const SEPOLIA: u64 = 11_155_111;
    pub const HOLESKY: u64 = 17_000;
}

/// Environment variable names
pub mod env_vars {
    // Per-chain URLs (highest priority)
    pub const ETH_RPC_URL: &str = "ETH_RPC_URL";
    pub const SEPOLIA_RPC_URL: &str = "SEPOLIA_RPC_URL";
    pub const HOLESKY_RPC_URL: &str = "HOLESKY_RPC_URL";

    // Provider API keys
    pub const ALCHEMY_API_KEY: &str = "ALCHEMY_API_KEY";
    pub const INFURA_API_KEY: &str = "INFURA_API_KEY";
}

/// Public RPC endpoints (rate limited, for testing only)
mod public_rpcs {
    pub const MAINNET: &str = "https://eth.llamarpc.com";
    pub const SEPOLIA: &str = "https://ethereum-sepolia-rpc.publicnode.com";
    pub const HOLESKY: &str = "https://ethereum-holesky-rpc.publicnode.com";
}

const PER_CHAIN_VARS: [(u64, &str); 3] = [
    (chains::MAINNET, env_vars::ETH_RPC_URL),
    (chains::SEPOLIA, env_vars::SEPOLIA_RPC_URL),
    (chains::HOLESKY, env_vars::HOLESKY_RPC_URL),
];

impl RpcConfig {
    /// Create RPC config from environment variables
    ///
    /// Priority:
    /// 1. Per-chain env vars (ETH_RPC_URL, SEPOLIA_RPC_URL, HOLESKY_RPC_URL)
    /// 2. ALCHEMY_API_KEY - builds URLs for all chains
    /// 3. INFURA_API_KEY - builds URLs for all chains
    /// 4. Public RPC fallbacks (for testing only)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same resolution as [`RpcConfig::from_env`] over an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut urls = HashMap::new();

        // Priority 1: Check per-chain env vars
        for (chain_id, var) in PER_CHAIN_VARS {
            if let Some(url) = lookup(var).filter(|v| !v.is_empty()) {
                tracing::debug!(chain_id, var, "Using per-chain RPC URL");
                urls.insert(chain_id, url);
            }
        }

        // Priority 2: If no per-chain vars, try ALCHEMY_API_KEY
        if urls.is_empty() {
            if let Some(key) = lookup(env_vars::ALCHEMY_API_KEY) {
                tracing::info!("Building RPC URLs from ALCHEMY_API_KEY");
                urls.insert(
                    chains::MAINNET,
                    format!("https://eth-mainnet.g.alchemy.com/v2/{}", key),
                );
                urls.insert(
                    chains::SEPOLIA,
                    format!("https://eth-sepolia.g.alchemy.com/v2/{}", key),
                );
                urls.insert(
                    chains::HOLESKY,
                    format!("https://eth-holesky.g.alchemy.com/v2/{}", key),
                );
            }
        }

        // Priority 3: If no Alchemy, try INFURA_API_KEY
        if urls.is_empty() {
            if let Some(key) = lookup(env_vars::INFURA_API_KEY) {
                tracing::info!("Building RPC URLs from INFURA_API_KEY");
                urls.insert(
                    chains::MAINNET,
                    format!("https://mainnet.infura.io/v3/{}", key),
                );
                urls.insert(
                    chains::SEPOLIA,
                    format!("https://sepolia.infura.io/v3/{}", key),
                );
                urls.insert(
                    chains::HOLESKY,
                    format!("https://holesky.infura.io/v3/{}", key),
                );
            }
        }

        // Priority 4: Fall back to public RPCs for any missing chains
        if !urls.contains_key(&chains::MAINNET) {
            tracing::warn!("No RPC configured for mainnet, using public RPC (rate limited)");
        }
        urls.entry(chains::MAINNET)
            .or_insert_with(|| public_rpcs::MAINNET.to_string());
        urls.entry(chains::SEPOLIA)
            .or_insert_with(|| public_rpcs::SEPOLIA.to_string());
        urls.entry(chains::HOLESKY)
            .or_insert_with(|| public_rpcs::HOLESKY.to_string());

        Self { urls }
    }

    /// Create with explicit RPC URLs
    pub fn with_urls(urls: HashMap<u64, String>) -> Self {
        Self { urls }
    }

    /// Get RPC URL for a chain
    pub fn get(&self, chain_id: u64) -> Option<&str> {
        self.urls.get(&chain_id).map(|s| s.as_str())
    }

    /// Check if a chain is configured
    pub fn has_chain(&self, chain_id: u64) -> bool {
        self.urls.contains_key(&chain_id)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
