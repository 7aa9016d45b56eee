//! Transaction signing
//!
//! Decrypted keys are handed to this module for exactly one signing
//! operation and are NEVER retained here.

mod signer;

pub use signer::{broadcast, sign, SignedTransaction, TransactionSigner};
