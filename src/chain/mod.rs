//! Gateway to an Ethereum node
//!
//! The wallet talks to the chain only through [`ChainClient`]. The default
//! [`RpcChainClient`] speaks JSON-RPC over HTTP via alloy; tests substitute a
//! scripted implementation.
//!
//! SECURITY NOTE: nothing here ever sees key material. Signed transactions
//! arrive as opaque raw bytes.

mod rpc;

pub use rpc::RpcChainClient;

use alloy::hex;
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;

/// Error type for node interaction
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    #[error("Invalid RPC URL: {0}")]
    InvalidUrl(String),

    #[error("Execution reverted: {0}")]
    Reverted(String),

    #[error("{0}")]
    Rpc(String),
}

impl ChainError {
    /// Classify a node or transport error by its message
    pub fn from_node_message(message: impl std::fmt::Display) -> Self {
        let message = message.to_string();
        if message.contains("execution reverted") {
            ChainError::Reverted(parse_revert_reason(&message))
        } else {
            ChainError::Rpc(message)
        }
    }
}

/// JSON-RPC operations the wallet needs from a node
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// `eth_getBalance` at the latest block, in wei
    async fn get_balance(&self, address: Address) -> Result<U256, ChainError>;

    /// `eth_getTransactionCount`: the next nonce for `address`
    async fn get_transaction_count(&self, address: Address) -> Result<u64, ChainError>;

    /// `eth_estimateGas`
    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, ChainError>;

    /// `eth_sendRawTransaction`
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, ChainError>;

    /// `eth_call` at the latest block
    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes, ChainError>;
}

/// `Error(string)` selector
const ERROR_STRING_SELECTOR: &str = "08c379a0";

/// Extract a readable revert reason from an RPC error message
pub fn parse_revert_reason(error: &str) -> String {
    // Common patterns for revert reasons in RPC errors
    if !error.contains("execution reverted") {
        return error.to_string();
    }

    // Geth style: "execution reverted: <reason>"
    if let Some(start) = error.find("execution reverted: ") {
        let reason = error[start + 20..].trim().trim_matches('"');
        let reason = reason.strip_prefix("revert: ").unwrap_or(reason);
        if !reason.is_empty() && !reason.starts_with("0x") {
            return reason.to_string();
        }
    }

    // Otherwise look for ABI-encoded revert data
    if let Some(start) = error.find("0x") {
        let hex_data = &error[start + 2..];
        let end = hex_data
            .find(|c: char| !c.is_ascii_hexdigit())
            .unwrap_or(hex_data.len());
        let data = &hex_data[..end];
        if !data.is_empty() {
            if let Some(reason) = decode_error_string(data) {
                return reason;
            }
            return format!("Reverted with data: 0x{}", data);
        }
    }

    "execution reverted".to_string()
}

/// Decode `Error(string)` revert data (hex without prefix)
fn decode_error_string(data: &str) -> Option<String> {
    let payload = data.strip_prefix(ERROR_STRING_SELECTOR)?;
    let bytes = hex::decode(payload).ok()?;
    // offset word, length word, then the string bytes
    if bytes.len() < 64 {
        return None;
    }
    let len = U256::from_be_slice(&bytes[32..64]);
    let len = usize::try_from(len).ok()?;
    let text = bytes.get(64..64usize.checked_add(len)?)?;
    String::from_utf8(text.to_vec()).ok()
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted in-memory node for unit tests

    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeChain {
        pub balance: Mutex<U256>,
        pub nonce: Mutex<u64>,
        pub call_result: Mutex<Option<Result<Bytes, ChainError>>>,
        pub send_error: Mutex<Option<ChainError>>,
        pub estimate: Mutex<u64>,
        pub sent: Mutex<Vec<Vec<u8>>>,
        pub calls: Mutex<Vec<TransactionRequest>>,
    }

    #[async_trait]
    impl ChainClient for FakeChain {
        async fn get_balance(&self, _address: Address) -> Result<U256, ChainError> {
            Ok(*self.balance.lock().unwrap())
        }

        async fn get_transaction_count(&self, _address: Address) -> Result<u64, ChainError> {
            Ok(*self.nonce.lock().unwrap())
        }

        async fn estimate_gas(&self, _tx: &TransactionRequest) -> Result<u64, ChainError> {
            Ok(*self.estimate.lock().unwrap())
        }

        async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, ChainError> {
            if let Some(err) = self.send_error.lock().unwrap().clone() {
                return Err(err);
            }
            self.sent.lock().unwrap().push(raw.to_vec());
            *self.nonce.lock().unwrap() += 1;
            Ok(alloy::primitives::keccak256(raw))
        }

        async fn call(&self, tx: &TransactionRequest) -> Result<Bytes, ChainError> {
            self.calls.lock().unwrap().push(tx.clone());
            self.call_result
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Ok(Bytes::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_revert_reason() {
        // Test simple revert message
        let error = "server returned an error response: error code 3: execution reverted: ERC20: transfer amount exceeds balance";
        assert_eq!(
            parse_revert_reason(error),
            "ERC20: transfer amount exceeds balance"
        );

        // Test execution reverted without message
        assert_eq!(parse_revert_reason("execution reverted"), "execution reverted");

        // Test unknown error
        assert_eq!(parse_revert_reason("some other error"), "some other error");
    }

    #[test]
    fn test_parse_abi_encoded_revert() {
        // Error("Nope")
        let data = concat!(
            "08c379a0",
            "0000000000000000000000000000000000000000000000000000000000000020",
            "0000000000000000000000000000000000000000000000000000000000000004",
            "4e6f706500000000000000000000000000000000000000000000000000000000"
        );
        let error = format!("execution reverted, data: \"0x{}\"", data);
        assert_eq!(parse_revert_reason(&error), "Nope");

        let custom = "execution reverted, data: \"0xdeadbeef\"";
        assert_eq!(
            parse_revert_reason(custom),
            "Reverted with data: 0xdeadbeef"
        );
    }

    #[test]
    fn test_classify_node_messages() {
        assert!(matches!(
            ChainError::from_node_message("execution reverted: paused"),
            ChainError::Reverted(reason) if reason == "paused"
        ));
        assert!(matches!(
            ChainError::from_node_message("nonce too low"),
            ChainError::Rpc(msg) if msg == "nonce too low"
        ));
    }
}
