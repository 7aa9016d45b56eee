//! The active account and everything done with it
//!
//! [`AccountManager`] owns the keystore, the chain client and the transaction
//! builder. It is the only path to signing: every send goes through one
//! critical section (fetch nonce, build, decrypt, sign, broadcast) guarded by
//! a per-account lock, so concurrent sends never reuse a nonce.
//!
//! Decryption and signing run on tokio's blocking pool while the lock is held,
//! so scrypt never stalls an async worker.
//!
//! SECURITY NOTE:
//! - Decrypted keys live only inside that critical section
//! - Passphrases are taken as `SecretString` and never logged

use crate::chain::{ChainClient, ChainError};
use crate::config::Config;
use crate::contracts::ContractRegistry;
use crate::keystore::{Account, ImportPolicy, Keystore, KeystoreRecord};
use crate::transaction::{ContractCallSpec, TransactionBuilder, UnsignedTransaction};
use crate::units;
use crate::wallet::{self, SignedTransaction};
use crate::{Error, Result};
use alloy::primitives::{Address, TxHash, U256};
use secrecy::{ExposeSecret, SecretString};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

/// What a send should put on chain
#[derive(Debug, Clone)]
pub(crate) enum Outgoing<'a> {
    /// Native value transfer, amount in decimal ether
    Transfer { to: Address, amount_eth: &'a str },
    /// Contract method invocation
    Contract {
        spec: &'a ContractCallSpec,
        value: U256,
    },
}

/// Owns zero or one account and signs on its behalf
pub struct AccountManager {
    keystore: Keystore,
    chain: Arc<dyn ChainClient>,
    builder: TransactionBuilder,
    rpc_timeout: Duration,
    /// Serializes nonce-fetch through broadcast
    send_lock: Mutex<()>,
}

impl AccountManager {
    pub fn new(
        keystore: Keystore,
        chain: Arc<dyn ChainClient>,
        builder: TransactionBuilder,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            keystore,
            chain,
            builder,
            rpc_timeout,
            send_lock: Mutex::new(()),
        }
    }

    /// Wire up a manager from configuration with a filesystem keystore
    pub fn from_config(
        config: &Config,
        chain: Arc<dyn ChainClient>,
        registry: Arc<ContractRegistry>,
    ) -> Self {
        let keystore = Keystore::open(&config.keystore_dir, config.scrypt);
        let builder = TransactionBuilder::new(registry, config.gas.clone(), config.chain_id());
        Self::new(keystore, chain, builder, config.rpc_timeout())
    }

    pub fn keystore(&self) -> &Keystore {
        &self.keystore
    }

    pub fn builder(&self) -> &TransactionBuilder {
        &self.builder
    }

    pub fn has_account(&self) -> Result<bool> {
        self.keystore.has_account()
    }

    /// Address of the account, [`Error::NoAccount`] if none
    pub fn address(&self) -> Result<Address> {
        self.keystore
            .account()?
            .map(|account| account.address)
            .ok_or(Error::NoAccount)
    }

    pub fn list_addresses(&self) -> Result<Vec<Address>> {
        self.keystore.list_addresses()
    }

    /// Balance in wei, `None` without an account
    pub async fn balance_wei(&self) -> Result<Option<U256>> {
        let Some(account) = self.keystore.account()? else {
            return Ok(None);
        };
        let wei = self
            .read(self.chain.get_balance(account.address))
            .await?;
        Ok(Some(wei))
    }

    /// Balance in ether with 8 decimals, `None` without an account
    pub async fn balance(&self) -> Result<Option<String>> {
        self.balance_wei()
            .await?
            .map(units::format_balance)
            .transpose()
    }

    pub fn create(&self, passphrase: &SecretString) -> Result<Account> {
        self.keystore.create(passphrase)
    }

    pub fn import_private_key(
        &self,
        raw: &str,
        passphrase: &SecretString,
        policy: ImportPolicy,
    ) -> Result<Account> {
        self.keystore
            .import_from_private_key(raw, passphrase, policy)
    }

    pub fn import_mnemonic<S: AsRef<str>>(
        &self,
        words: &[S],
        passphrase: &SecretString,
    ) -> Result<Account> {
        self.keystore.import_from_mnemonic(words, passphrase)
    }

    pub fn import_keystore(
        &self,
        json: &str,
        passphrase: &SecretString,
        policy: ImportPolicy,
    ) -> Result<Account> {
        self.keystore.import_record(json, passphrase, policy)
    }

    pub fn export_keystore(&self) -> Result<String> {
        self.keystore.export_record()
    }

    /// The decrypted key as 64 hex chars, wiped when dropped
    pub fn export_private_key(&self, passphrase: &SecretString) -> Result<Zeroizing<String>> {
        let key = self.keystore.decrypt(passphrase)?;
        tracing::warn!(address = %key.address()?, "Private key exported");
        Ok(key.to_hex())
    }

    pub fn delete(&self) -> Result<()> {
        self.keystore.delete()
    }

    /// Send `amount_eth` (decimal ether) to `to`
    pub async fn send_value(
        &self,
        to: Address,
        amount_eth: &str,
        passphrase: &SecretString,
    ) -> Result<TxHash> {
        self.submit(Outgoing::Transfer { to, amount_eth }, passphrase)
            .await
    }

    /// The send critical section
    pub(crate) async fn submit(
        &self,
        outgoing: Outgoing<'_>,
        passphrase: &SecretString,
    ) -> Result<TxHash> {
        let _guard = self.send_lock.lock().await;

        let account = self.keystore.account()?.ok_or(Error::NoAccount)?;
        let from = account.address;
        let nonce = self
            .write(self.chain.get_transaction_count(from))
            .await?;

        let tx = self.build(from, nonce, &outgoing).await?;
        let signed = sign_blocking(account.record, passphrase, tx).await?;

        tracing::info!(
            from = %from,
            to = %signed.tx.to,
            nonce,
            value = %signed.tx.value,
            "Submitting transaction"
        );

        tokio::time::timeout(self.rpc_timeout, wallet::broadcast(self.chain.as_ref(), &signed))
            .await
            .map_err(|_| Error::BroadcastFailure(self.timeout_message()))?
    }

    async fn build(
        &self,
        from: Address,
        nonce: u64,
        outgoing: &Outgoing<'_>,
    ) -> Result<UnsignedTransaction> {
        match outgoing {
            Outgoing::Transfer { to, amount_eth } => {
                self.builder.build_transfer(from, *to, amount_eth, nonce)
            }
            Outgoing::Contract { spec, value } => {
                let mut tx =
                    self.builder
                        .build_contract_call(from, spec, *value, nonce, None, None)?;
                if self.builder.gas().estimate_contract_gas {
                    let estimate = self
                        .write(self.chain.estimate_gas(&tx.to_request()))
                        .await?;
                    tracing::debug!(estimate, "Using estimated gas limit");
                    tx.gas_limit = U256::from(estimate);
                }
                Ok(tx)
            }
        }
    }

    /// Run a read-path chain call: failures are [`Error::ContractCallFailure`]
    pub(crate) async fn read<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, ChainError>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.rpc_timeout, call).await {
            Ok(result) => result.map_err(|e| Error::ContractCallFailure(e.to_string())),
            Err(_) => Err(Error::ContractCallFailure(self.timeout_message())),
        }
    }

    /// Run a send-path chain call: failures are [`Error::BroadcastFailure`]
    async fn write<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, ChainError>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.rpc_timeout, call).await {
            Ok(result) => result.map_err(|e| Error::BroadcastFailure(e.to_string())),
            Err(_) => Err(Error::BroadcastFailure(self.timeout_message())),
        }
    }

    pub(crate) fn chain(&self) -> &dyn ChainClient {
        self.chain.as_ref()
    }

    fn timeout_message(&self) -> String {
        format!("node did not respond within {:?}", self.rpc_timeout)
    }
}

/// Decrypt `record` and sign `tx` on the blocking pool
async fn sign_blocking(
    record: KeystoreRecord,
    passphrase: &SecretString,
    tx: UnsignedTransaction,
) -> Result<SignedTransaction> {
    let passphrase = SecretString::from(passphrase.expose_secret().to_owned());
    tokio::task::spawn_blocking(move || {
        let key = record.decrypt(&passphrase)?;
        wallet::sign(&tx, &key)
    })
    .await
    .map_err(|e| Error::SigningFailure(format!("signing task failed: {}", e)))?
}

impl std::fmt::Debug for AccountManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountManager")
            .field("keystore", &self.keystore)
            .field("chain_id", &self.builder.chain_id())
            .field("rpc_timeout", &self.rpc_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::fake::FakeChain;
    use crate::config::GasConfig;
    use crate::keystore::ScryptConfig;
    use alloy::consensus::TxEnvelope;
    use alloy::eips::eip2718::Decodable2718;

    const FAST: ScryptConfig = ScryptConfig {
        log_n: 4,
        r: 8,
        p: 1,
    };

    // Anvil/Hardhat account #0, DO NOT use with real funds
    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn pass(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    fn manager(chain: Arc<FakeChain>) -> AccountManager {
        let registry = Arc::new(ContractRegistry::builtin().unwrap());
        AccountManager::new(
            Keystore::in_memory(FAST),
            chain,
            TransactionBuilder::new(registry, GasConfig::default(), 1),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_no_account_queries() {
        let m = manager(Arc::new(FakeChain::default()));
        assert!(!m.has_account().unwrap());
        assert!(matches!(m.address(), Err(Error::NoAccount)));
        assert_eq!(m.balance().await.unwrap(), None);
        assert!(matches!(
            m.send_value(Address::ZERO, "1", &pass("p")).await,
            Err(Error::NoAccount)
        ));
    }

    #[tokio::test]
    async fn test_balance_formatting() {
        let chain = Arc::new(FakeChain::default());
        *chain.balance.lock().unwrap() = U256::from(1_500_000_000_000_000_000u128);
        let m = manager(chain);
        m.import_private_key(TEST_KEY, &pass("p"), ImportPolicy::default())
            .unwrap();

        assert_eq!(m.balance().await.unwrap().as_deref(), Some("1.50000000"));
    }

    #[tokio::test]
    async fn test_send_value_signs_with_chain_nonce() {
        let chain = Arc::new(FakeChain::default());
        *chain.nonce.lock().unwrap() = 4;
        let m = manager(chain.clone());
        m.import_private_key(TEST_KEY, &pass("p"), ImportPolicy::default())
            .unwrap();

        let to = Address::repeat_byte(0x35);
        let hash = m.send_value(to, "0.5", &pass("p")).await.unwrap();

        let sent = chain.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        let envelope = TxEnvelope::decode_2718(&mut sent[0].as_slice()).unwrap();
        let legacy = envelope.as_legacy().unwrap();
        assert_eq!(legacy.tx().nonce, 4);
        assert_eq!(legacy.tx().gas_limit, 21_000);
        assert_eq!(legacy.tx().value, U256::from(500_000_000_000_000_000u128));
        assert_eq!(*legacy.hash(), hash);
    }

    #[tokio::test]
    async fn test_wrong_passphrase_broadcasts_nothing() {
        let chain = Arc::new(FakeChain::default());
        let m = manager(chain.clone());
        m.import_private_key(TEST_KEY, &pass("p"), ImportPolicy::default())
            .unwrap();

        assert!(matches!(
            m.send_value(Address::ZERO, "1", &pass("wrong")).await,
            Err(Error::WrongPassphrase)
        ));
        assert!(chain.sent.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_signing_leaves_runtime_free() {
        use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

        let chain = Arc::new(FakeChain::default());
        let m = manager(chain.clone());
        m.import_private_key(TEST_KEY, &pass("p"), ImportPolicy::default())
            .unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let ticks = Arc::new(AtomicU64::new(0));
        let ticker = {
            let done = done.clone();
            let ticks = ticks.clone();
            tokio::spawn(async move {
                while !done.load(Ordering::SeqCst) {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                }
            })
        };

        // The fake chain answers without yielding, so the ticker only runs
        // if the send hands the runtime back while it decrypts and signs
        m.send_value(Address::repeat_byte(1), "1", &pass("p"))
            .await
            .unwrap();
        done.store(true, Ordering::SeqCst);
        ticker.await.unwrap();

        assert!(ticks.load(Ordering::SeqCst) > 0);
        assert_eq!(chain.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_export_private_key() {
        let m = manager(Arc::new(FakeChain::default()));
        m.import_private_key(&format!("0x{}", TEST_KEY), &pass("p"), ImportPolicy::default())
            .unwrap();
        assert_eq!(m.export_private_key(&pass("p")).unwrap().as_str(), TEST_KEY);
        assert!(matches!(
            m.export_private_key(&pass("x")),
            Err(Error::WrongPassphrase)
        ));
    }

    #[tokio::test]
    async fn test_contract_send_uses_estimate_when_enabled() {
        let chain = Arc::new(FakeChain::default());
        *chain.estimate.lock().unwrap() = 51_234;
        let registry = Arc::new(ContractRegistry::builtin().unwrap());
        let gas = GasConfig {
            estimate_contract_gas: true,
            ..GasConfig::default()
        };
        let m = AccountManager::new(
            Keystore::in_memory(FAST),
            chain.clone(),
            TransactionBuilder::new(registry, gas, 1),
            Duration::from_secs(5),
        );
        m.import_private_key(TEST_KEY, &pass("p"), ImportPolicy::default())
            .unwrap();

        let spec = ContractCallSpec::transfer("bbi", Address::repeat_byte(1), U256::from(10u64));
        m.submit(
            Outgoing::Contract {
                spec: &spec,
                value: U256::ZERO,
            },
            &pass("p"),
        )
        .await
        .unwrap();

        let sent = chain.sent.lock().unwrap().clone();
        let envelope = TxEnvelope::decode_2718(&mut sent[0].as_slice()).unwrap();
        assert_eq!(envelope.as_legacy().unwrap().tx().gas_limit, 51_234);
    }
}
