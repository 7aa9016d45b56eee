//! Transaction signing and broadcast
//!
//! SECURITY: This is the ONLY place where a decrypted key is used.
//! - Keys are held in alloy's PrivateKeySigner for the duration of one signing
//! - Keys are never serialized to JSON
//! - Keys are never logged
//!
//! Transactions are legacy (type 0) with EIP-155 replay protection when a
//! chain id is set. Signatures are RFC 6979 deterministic, so the same key and
//! transaction always produce the same bytes.

use crate::chain::ChainClient;
use crate::key_material::PrivateKey;
use crate::transaction::UnsignedTransaction;
use crate::{Error, Result};
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::hex;
use alloy::primitives::{Address, Bytes, Signature, TxHash, TxKind, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use serde::Serialize;

/// A signed transaction ready for broadcast
#[derive(Debug, Clone, Serialize)]
pub struct SignedTransaction {
    pub tx: UnsignedTransaction,
    pub r: U256,
    pub s: U256,
    /// `35 + 2 * chain_id + parity` with a chain id, else `27 + parity`
    pub v: u64,
    pub hash: TxHash,
    /// RLP encoding for `eth_sendRawTransaction`
    pub raw: Bytes,
}

impl SignedTransaction {
    /// 0x-prefixed raw transaction
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }
}

/// Signs with a single key
///
/// The key is:
/// - Stored in alloy's PrivateKeySigner (zeroized when dropped)
/// - Never serialized (no Serialize impl)
/// - Only accessible via signing operations
pub struct TransactionSigner {
    signer: PrivateKeySigner,
    address: Address,
}

impl TransactionSigner {
    pub fn new(key: &PrivateKey) -> Result<Self> {
        let signer = key.signer()?;
        let address = signer.address();
        Ok(Self { signer, address })
    }

    /// Get the public address (safe to share)
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte digest
    pub fn sign_hash(&self, hash: &B256) -> Result<Signature> {
        self.signer
            .sign_hash_sync(hash)
            .map_err(|e| Error::SigningFailure(e.to_string()))
    }

    /// Sign `tx` as a legacy transaction
    pub fn sign_transaction(&self, tx: &UnsignedTransaction) -> Result<SignedTransaction> {
        if tx.from != self.address {
            return Err(Error::SigningFailure(format!(
                "Transaction sender {} does not match signing key {}",
                tx.from, self.address
            )));
        }

        let legacy = to_legacy(tx)?;
        let signature = self.sign_hash(&legacy.signature_hash())?;
        let v = eip155_v(signature.v(), tx.chain_id)?;

        let signed = legacy.into_signed(signature);
        let hash = *signed.hash();
        let raw = TxEnvelope::from(signed).encoded_2718();

        tracing::debug!(
            from = %self.address,
            to = %tx.to,
            nonce = tx.nonce,
            tx_hash = %hash,
            "Signed transaction"
        );

        Ok(SignedTransaction {
            tx: tx.clone(),
            r: signature.r(),
            s: signature.s(),
            v,
            hash,
            raw: Bytes::from(raw),
        })
    }
}

// Implement Debug manually to avoid exposing the signer
impl std::fmt::Debug for TransactionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSigner")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}

/// Sign `tx` with `key`
pub fn sign(tx: &UnsignedTransaction, key: &PrivateKey) -> Result<SignedTransaction> {
    TransactionSigner::new(key)?.sign_transaction(tx)
}

/// Submit a signed transaction. Node rejections keep the node's message.
pub async fn broadcast(client: &dyn ChainClient, signed: &SignedTransaction) -> Result<TxHash> {
    let hash = client
        .send_raw_transaction(&signed.raw)
        .await
        .map_err(|e| Error::BroadcastFailure(e.to_string()))?;

    if hash != signed.hash {
        tracing::warn!(
            expected = %signed.hash,
            reported = %hash,
            "Node reported a different transaction hash"
        );
    }
    tracing::info!(tx_hash = %hash, nonce = signed.tx.nonce, "Transaction broadcast");
    Ok(hash)
}

fn to_legacy(tx: &UnsignedTransaction) -> Result<TxLegacy> {
    let gas_price = u128::try_from(tx.gas_price)
        .map_err(|_| Error::SigningFailure(format!("Gas price {} exceeds 128 bits", tx.gas_price)))?;
    let gas_limit = u64::try_from(tx.gas_limit)
        .map_err(|_| Error::SigningFailure(format!("Gas limit {} exceeds 64 bits", tx.gas_limit)))?;

    Ok(TxLegacy {
        chain_id: tx.chain_id,
        nonce: tx.nonce,
        gas_price,
        gas_limit,
        to: TxKind::Call(tx.to),
        value: tx.value,
        input: tx.data.clone(),
    })
}

fn eip155_v(parity: bool, chain_id: Option<u64>) -> Result<u64> {
    let parity = u64::from(parity);
    match chain_id {
        None => Ok(27 + parity),
        Some(id) => id
            .checked_mul(2)
            .and_then(|v| v.checked_add(35 + parity))
            .ok_or_else(|| Error::SigningFailure(format!("Chain id {} too large", id))),
    }
}
