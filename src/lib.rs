//! Ethereum Wallet Core
//!
//! A single-account Ethereum wallet:
//! - Imports or generates a private key and keeps it in a V3 keystore
//! - Signs value transfers and contract calls (legacy, EIP-155)
//! - Broadcasts through any [`chain::ChainClient`]
//! - Reads token balances with `eth_call`
//!
//! # Security Model
//!
//! - Private keys are encrypted at rest (scrypt + AES-128-CTR)
//! - Decrypted keys exist only for one signing or export operation and are
//!   zeroized on drop
//! - Passphrases travel as `SecretString` and are never logged
//! - One send at a time per account, so nonces are never reused

pub mod account;
pub mod chain;
pub mod config;
pub mod contract_caller;
pub mod contracts;
pub mod key_material;
pub mod keystore;
pub mod transaction;
pub mod units;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use account::AccountManager;
pub use chain::{ChainClient, ChainError, RpcChainClient};
pub use config::{Config, GasConfig, Network, RpcConfig};
pub use contract_caller::ContractCaller;
pub use contracts::{ContractDescriptor, ContractRegistry};
pub use error::{Error, ErrorKind, Result};
pub use key_material::{KeyFormat, PrivateKey};
pub use keystore::{Account, ImportPolicy, Keystore, KeystoreRecord, ScryptConfig};
pub use transaction::{AbiValue, ContractCallSpec, TransactionBuilder, UnsignedTransaction};
pub use wallet::SignedTransaction;
