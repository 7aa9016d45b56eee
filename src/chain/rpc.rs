//! JSON-RPC chain client over HTTP

use super::{ChainClient, ChainError};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;

/// [`ChainClient`] backed by alloy's HTTP provider
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    url: url::Url,
}

impl RpcChainClient {
    pub fn new(url: url::Url) -> Self {
        Self { url }
    }

    /// Parse `rpc_url` and build a client for it
    pub fn from_url_str(rpc_url: &str) -> Result<Self, ChainError> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| ChainError::InvalidUrl(format!("{}", e)))?;
        Ok(Self::new(url))
    }

    pub fn url(&self) -> &url::Url {
        &self.url
    }

    fn provider(&self) -> impl Provider {
        ProviderBuilder::new().connect_http(self.url.clone())
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn get_balance(&self, address: Address) -> Result<U256, ChainError> {
        tracing::debug!(%address, "eth_getBalance");
        self.provider()
            .get_balance(address)
            .await
            .map_err(ChainError::from_node_message)
    }

    async fn get_transaction_count(&self, address: Address) -> Result<u64, ChainError> {
        tracing::debug!(%address, "eth_getTransactionCount");
        self.provider()
            .get_transaction_count(address)
            .await
            .map_err(ChainError::from_node_message)
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, ChainError> {
        tracing::debug!(to = ?tx.to, "eth_estimateGas");
        self.provider()
            .estimate_gas(tx.clone())
            .await
            .map_err(ChainError::from_node_message)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<TxHash, ChainError> {
        tracing::debug!(bytes = raw.len(), "eth_sendRawTransaction");
        let pending = self
            .provider()
            .send_raw_transaction(raw)
            .await
            .map_err(ChainError::from_node_message)?;
        Ok(*pending.tx_hash())
    }

    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes, ChainError> {
        tracing::debug!(to = ?tx.to, "eth_call");
        self.provider()
            .call(tx.clone())
            .await
            .map_err(ChainError::from_node_message)
    }
}
