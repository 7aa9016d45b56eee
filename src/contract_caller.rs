//! Calls against registry contracts
//!
//! State-changing calls are signed and broadcast through the
//! [`AccountManager`] send path. Read-only calls go out as `eth_call` and
//! decode a leading `uintN` return slot.

use crate::account::{AccountManager, Outgoing};
use crate::transaction::{uint_bits, ContractCallSpec};
use crate::units;
use crate::{Error, Result};
use alloy::primitives::{Address, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use secrecy::SecretString;
use std::sync::Arc;

/// Contract front end for one account
#[derive(Debug, Clone)]
pub struct ContractCaller {
    accounts: Arc<AccountManager>,
}

impl ContractCaller {
    pub fn new(accounts: Arc<AccountManager>) -> Self {
        Self { accounts }
    }

    /// Sign and broadcast a state-changing call, returning the tx hash
    pub async fn send(
        &self,
        spec: &ContractCallSpec,
        value: U256,
        passphrase: &SecretString,
    ) -> Result<TxHash> {
        tracing::debug!(contract = %spec.contract, method = %spec.method, "Contract send");
        self.accounts
            .submit(Outgoing::Contract { spec, value }, passphrase)
            .await
    }

    /// `eth_call` the method and decode its first output when it is `uintN`.
    ///
    /// Returns `None` when the method declares no unsigned first output or the
    /// node returned less than one word. Node errors are
    /// [`Error::ContractCallFailure`], never a zero value.
    pub async fn read_only_call(&self, spec: &ContractCallSpec) -> Result<Option<U256>> {
        let call = self.accounts.builder().encode_call(spec)?;

        let mut request = TransactionRequest::default()
            .to(call.contract.address)
            .input(call.data.clone().into());
        if let Some(from) = self.accounts.keystore().account()?.map(|a| a.address) {
            request = request.from(from);
        }

        tracing::debug!(contract = %spec.contract, method = %spec.method, "Contract read");
        let output = self.accounts.read(self.accounts.chain().call(&request)).await?;

        let returns_uint = call
            .function
            .outputs
            .first()
            .is_some_and(|param| uint_bits(&param.ty).is_some());
        if !returns_uint || output.len() < 32 {
            return Ok(None);
        }
        Ok(Some(U256::from_be_slice(&output[..32])))
    }

    /// ERC-20 `balanceOf` for the active account, in base units
    pub async fn token_balance(&self, contract: &str) -> Result<U256> {
        let owner = self.accounts.address()?;
        self.read_only_call(&ContractCallSpec::balance_of(contract, owner))
            .await?
            .ok_or_else(|| {
                Error::ContractCallFailure(format!(
                    "{}.balanceOf returned no value",
                    contract
                ))
            })
    }

    /// ERC-20 `decimals`, if the contract reports a usable one
    pub async fn token_decimals(&self, contract: &str) -> Result<Option<u32>> {
        let decimals = self
            .read_only_call(&ContractCallSpec::new(contract, "decimals", vec![]))
            .await?;
        Ok(decimals
            .and_then(|d| u32::try_from(d).ok())
            .filter(|d| *d <= units::MAX_DECIMALS))
    }

    /// ERC-20 `transfer` of `amount` (decimal, scaled by `decimals`)
    pub async fn token_transfer(
        &self,
        contract: &str,
        to: Address,
        amount: &str,
        decimals: u32,
        passphrase: &SecretString,
    ) -> Result<TxHash> {
        let raw_amount = units::parse_units(amount, decimals)?;
        let spec = ContractCallSpec::transfer(contract, to, raw_amount);
        self.send(&spec, U256::ZERO, passphrase).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::fake::FakeChain;
    use crate::chain::ChainError;
    use crate::config::GasConfig;
    use crate::contracts::ContractRegistry;
    use crate::keystore::{ImportPolicy, Keystore, ScryptConfig};
    use crate::transaction::TransactionBuilder;
    use alloy::primitives::Bytes;
    use std::time::Duration;

    const FAST: ScryptConfig = ScryptConfig {
        log_n: 4,
        r: 8,
        p: 1,
    };
    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn caller(chain: Arc<FakeChain>, with_account: bool) -> ContractCaller {
        let registry = Arc::new(ContractRegistry::builtin().unwrap());
        let manager = AccountManager::new(
            Keystore::in_memory(FAST),
            chain,
            TransactionBuilder::new(registry, GasConfig::default(), 1),
            Duration::from_secs(5),
        );
        if with_account {
            manager
                .import_private_key(
                    TEST_KEY,
                    &SecretString::from("p".to_string()),
                    ImportPolicy::default(),
                )
                .unwrap();
        }
        ContractCaller::new(Arc::new(manager))
    }

    fn word(value: u64) -> Bytes {
        Bytes::from(U256::from(value).to_be_bytes::<32>().to_vec())
    }

    #[tokio::test]
    async fn test_read_only_call_decodes_uint() {
        let chain = Arc::new(FakeChain::default());
        *chain.call_result.lock().unwrap() = Some(Ok(word(1234)));
        let c = caller(chain.clone(), true);

        assert_eq!(c.token_balance("bbi").await.unwrap(), U256::from(1234u64));

        // from is set to the account address
        let calls = chain.calls.lock().unwrap();
        assert!(calls[0].from.is_some());
    }

    #[tokio::test]
    async fn test_read_only_call_without_account_has_no_from() {
        let chain = Arc::new(FakeChain::default());
        *chain.call_result.lock().unwrap() = Some(Ok(word(1)));
        let c = caller(chain.clone(), false);

        let spec = ContractCallSpec::new("bbi", "totalSupply", vec![]);
        assert_eq!(c.read_only_call(&spec).await.unwrap(), Some(U256::from(1u64)));
        assert!(chain.calls.lock().unwrap()[0].from.is_none());
    }

    #[tokio::test]
    async fn test_short_or_non_uint_output_is_none() {
        let chain = Arc::new(FakeChain::default());
        *chain.call_result.lock().unwrap() = Some(Ok(Bytes::from(vec![1u8; 8])));
        let c = caller(chain.clone(), true);
        let spec = ContractCallSpec::new("bbi", "totalSupply", vec![]);
        assert_eq!(c.read_only_call(&spec).await.unwrap(), None);

        // transfer returns bool
        *chain.call_result.lock().unwrap() = Some(Ok(word(1)));
        let spec = ContractCallSpec::transfer("bbi", Address::ZERO, U256::from(1u64));
        assert_eq!(c.read_only_call(&spec).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_node_error_is_contract_call_failure() {
        let chain = Arc::new(FakeChain::default());
        *chain.call_result.lock().unwrap() =
            Some(Err(ChainError::Reverted("paused".to_string())));
        let c = caller(chain, true);

        let err = c.token_balance("bbi").await.unwrap_err();
        assert!(matches!(&err, Error::ContractCallFailure(msg) if msg.contains("paused")));
    }

    #[tokio::test]
    async fn test_unknown_method_makes_no_call() {
        let chain = Arc::new(FakeChain::default());
        let c = caller(chain.clone(), true);
        let spec = ContractCallSpec::new("bbi", "mint", vec![]);
        assert!(matches!(
            c.read_only_call(&spec).await,
            Err(Error::UnknownMethod { .. })
        ));
        assert!(chain.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_token_decimals() {
        let chain = Arc::new(FakeChain::default());
        *chain.call_result.lock().unwrap() = Some(Ok(word(6)));
        let c = caller(chain, false);
        assert_eq!(c.token_decimals("bbi").await.unwrap(), Some(6));
    }

    #[tokio::test]
    async fn test_unusable_token_decimals_are_none() {
        let chain = Arc::new(FakeChain::default());
        let c = caller(chain.clone(), false);
        for reported in [78u64, 256, u64::from(u32::MAX) + 1] {
            *chain.call_result.lock().unwrap() = Some(Ok(word(reported)));
            assert_eq!(c.token_decimals("bbi").await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_token_transfer_rejects_oversized_decimals() {
        let chain = Arc::new(FakeChain::default());
        let c = caller(chain.clone(), true);
        let err = c
            .token_transfer(
                "bbi",
                Address::repeat_byte(0x11),
                "1",
                256,
                &SecretString::from("p".to_string()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(chain.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_token_transfer_broadcasts() {
        let chain = Arc::new(FakeChain::default());
        let c = caller(chain.clone(), true);
        c.token_transfer(
            "bbi",
            Address::repeat_byte(0x11),
            "2.5",
            18,
            &SecretString::from("p".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(chain.sent.lock().unwrap().len(), 1);
    }
}
