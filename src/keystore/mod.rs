//! Encrypted single-account keystore
//!
//! SECURITY NOTE: the private key only ever touches the blob store inside an
//! encrypted V3 record. Plaintext keys are produced by [`Keystore::decrypt`] as
//! a [`PrivateKey`] that zeroizes on drop, and are never cached here.
//!
//! The keystore holds zero or one account, persisted under [`ACCOUNT_KEY`].
//! Every operation that can fail validates its input before touching the
//! store, and the store writes atomically, so a failure leaves the previous
//! record in place. Writes are serialized: the single-account check and the
//! write that follows it happen under one lock.

mod record;
mod store;

pub use record::{CipherParams, CryptoJson, KdfParams, KeystoreRecord, ScryptConfig};
pub use store::{BlobStore, FsBlobStore, MemoryBlobStore, StoreError};

use crate::key_material::{self, PrivateKey};
use crate::{Error, Result};
use alloy::primitives::Address;
use alloy::signers::local::coins_bip39::English;
use alloy::signers::local::MnemonicBuilder;
use secrecy::SecretString;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use zeroize::{Zeroize, Zeroizing};

/// Blob key of the persisted account record
pub const ACCOUNT_KEY: &str = "Account.json";

/// BIP-44 path of the first Ethereum account
pub const DEFAULT_DERIVATION_PATH: &str = "m/44'/60'/0'/0/0";

/// Word counts accepted for a BIP-39 mnemonic
const MNEMONIC_WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];

/// What to do when importing over an existing account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImportPolicy {
    /// Fail with [`Error::AccountAlreadyExists`]
    #[default]
    RejectExisting,
    /// Replace the stored account
    Overwrite,
}

/// The persisted account: its public address and encrypted key
#[derive(Debug, Clone)]
pub struct Account {
    pub address: Address,
    pub record: KeystoreRecord,
}

impl Account {
    fn from_record(record: KeystoreRecord) -> Result<Self> {
        let address = record.address()?.ok_or_else(|| {
            Error::StorageFailure("Keystore record has no address field".to_string())
        })?;
        Ok(Self { address, record })
    }
}

/// Passphrase-protected keystore over a [`BlobStore`]
pub struct Keystore {
    store: Arc<dyn BlobStore>,
    scrypt: ScryptConfig,
    write_lock: Mutex<()>,
}

impl Keystore {
    pub fn new(store: Arc<dyn BlobStore>, scrypt: ScryptConfig) -> Self {
        Self {
            store,
            scrypt,
            write_lock: Mutex::new(()),
        }
    }

    /// Keystore backed by a directory, created on first write
    pub fn open(dir: impl Into<PathBuf>, scrypt: ScryptConfig) -> Self {
        Self::new(Arc::new(FsBlobStore::new(dir)), scrypt)
    }

    /// Keystore that lives only in memory
    pub fn in_memory(scrypt: ScryptConfig) -> Self {
        Self::new(Arc::new(MemoryBlobStore::new()), scrypt)
    }

    /// The stored account, if any
    pub fn account(&self) -> Result<Option<Account>> {
        match self.load_record()? {
            Some(record) => Account::from_record(record).map(Some),
            None => Ok(None),
        }
    }

    /// Whether a readable account is stored
    pub fn has_account(&self) -> Result<bool> {
        Ok(!self.list_addresses()?.is_empty())
    }

    /// Generate a new random key and persist it.
    ///
    /// Fails with [`Error::AccountAlreadyExists`] if an account is stored.
    pub fn create(&self, passphrase: &SecretString) -> Result<Account> {
        let _guard = self.lock_writes()?;
        self.ensure_empty()?;
        let key = PrivateKey::random();
        let account = self.persist(&key, passphrase)?;
        tracing::info!(address = %account.address, "Created new account");
        Ok(account)
    }

    /// Import a raw private key written in decimal or hex (optional `0x`)
    pub fn import_from_private_key(
        &self,
        raw: &str,
        passphrase: &SecretString,
        policy: ImportPolicy,
    ) -> Result<Account> {
        let key = key_material::parse(raw)?;
        let _guard = self.lock_writes()?;
        self.check_policy(policy)?;
        let account = self.persist(&key, passphrase)?;
        tracing::info!(address = %account.address, ?policy, "Imported private key");
        Ok(account)
    }

    /// Import the first account of a BIP-39 mnemonic (path
    /// [`DEFAULT_DERIVATION_PATH`], empty mnemonic password).
    ///
    /// Only succeeds when no account exists.
    pub fn import_from_mnemonic<S: AsRef<str>>(
        &self,
        words: &[S],
        passphrase: &SecretString,
    ) -> Result<Account> {
        let key = derive_from_mnemonic(words)?;
        let _guard = self.lock_writes()?;
        self.ensure_empty()?;
        let account = self.persist(&key, passphrase)?;
        tracing::info!(address = %account.address, words = words.len(), "Imported mnemonic");
        Ok(account)
    }

    /// Import an existing V3 keystore document.
    ///
    /// The document is decrypted with `passphrase` before anything is stored,
    /// so an unreadable record or a wrong passphrase never replaces the
    /// current account. The original KDF settings are kept.
    pub fn import_record(
        &self,
        json: &str,
        passphrase: &SecretString,
        policy: ImportPolicy,
    ) -> Result<Account> {
        let mut record = KeystoreRecord::from_json(json)?;
        let key = record.decrypt(passphrase)?;
        let address = key.address()?;
        drop(key);

        if record.address.is_none() {
            record.address = Some(alloy::hex::encode(address.as_slice()));
        }

        let _guard = self.lock_writes()?;
        self.check_policy(policy)?;
        self.store.put(ACCOUNT_KEY, record.to_json()?.as_bytes())?;
        tracing::info!(address = %address, ?policy, "Imported keystore record");
        Ok(Account { address, record })
    }

    /// Decrypt the stored key
    pub fn decrypt(&self, passphrase: &SecretString) -> Result<PrivateKey> {
        let record = self.load_record()?.ok_or(Error::NoAccount)?;
        record.decrypt(passphrase)
    }

    /// Addresses of stored accounts: zero or one entries
    pub fn list_addresses(&self) -> Result<Vec<Address>> {
        Ok(self
            .account()?
            .map(|account| vec![account.address])
            .unwrap_or_default())
    }

    /// The stored record as V3 JSON
    pub fn export_record(&self) -> Result<String> {
        let record = self.load_record()?.ok_or(Error::NoAccount)?;
        record.to_json()
    }

    /// Remove the stored account. No-op if absent.
    pub fn delete(&self) -> Result<()> {
        let _guard = self.lock_writes()?;
        self.store.delete(ACCOUNT_KEY)?;
        tracing::info!("Deleted account");
        Ok(())
    }

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| Error::StorageFailure("Keystore write lock poisoned".to_string()))
    }

    fn load_record(&self) -> Result<Option<KeystoreRecord>> {
        let Some(blob) = self.store.get(ACCOUNT_KEY)? else {
            return Ok(None);
        };
        let json = std::str::from_utf8(&blob)
            .map_err(|_| Error::StorageFailure("Keystore record is not UTF-8".to_string()))?;
        KeystoreRecord::from_json(json).map(Some)
    }

    fn ensure_empty(&self) -> Result<()> {
        match self.account()? {
            Some(existing) => Err(Error::AccountAlreadyExists(existing.address.to_string())),
            None => Ok(()),
        }
    }

    fn check_policy(&self, policy: ImportPolicy) -> Result<()> {
        match policy {
            ImportPolicy::RejectExisting => self.ensure_empty(),
            ImportPolicy::Overwrite => Ok(()),
        }
    }

    fn persist(&self, key: &PrivateKey, passphrase: &SecretString) -> Result<Account> {
        let record = KeystoreRecord::encrypt(key, passphrase, &self.scrypt)?;
        self.store.put(ACCOUNT_KEY, record.to_json()?.as_bytes())?;
        Account::from_record(record)
    }
}

impl std::fmt::Debug for Keystore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keystore")
            .field("scrypt", &self.scrypt)
            .finish_non_exhaustive()
    }
}

/// Structural checks, then BIP-39 seed and BIP-32 derivation
fn derive_from_mnemonic<S: AsRef<str>>(words: &[S]) -> Result<PrivateKey> {
    if !MNEMONIC_WORD_COUNTS.contains(&words.len()) {
        return Err(Error::InvalidMnemonic(format!(
            "expected 12, 15, 18, 21 or 24 words, got {}",
            words.len()
        )));
    }

    let mut phrase = Zeroizing::new(String::new());
    for (i, word) in words.iter().enumerate() {
        let word = word.as_ref().trim();
        if word.is_empty() || !word.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(Error::InvalidMnemonic(format!(
                "word {} is not alphabetic",
                i + 1
            )));
        }
        if i > 0 {
            phrase.push(' ');
        }
        phrase.push_str(&word.to_ascii_lowercase());
    }

    let signer = MnemonicBuilder::<English>::default()
        .phrase(phrase.as_str())
        .derivation_path(DEFAULT_DERIVATION_PATH)
        .map_err(|e| Error::InvalidMnemonic(e.to_string()))?
        .build()
        .map_err(|e| Error::InvalidMnemonic(e.to_string()))?;

    let mut bytes = signer.to_bytes();
    let key = PrivateKey::from_slice(bytes.as_slice());
    bytes.0.zeroize();
    key
}
