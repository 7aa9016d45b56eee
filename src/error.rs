//! Error types for the wallet core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("No account exists in the keystore")]
    NoAccount,

    #[error("An account already exists: {0}")]
    AccountAlreadyExists(String),

    #[error("Wrong passphrase")]
    WrongPassphrase,

    #[error("Storage failure: {0}")]
    StorageFailure(String),

    #[error("Unknown method '{method}' on contract '{contract}'")]
    UnknownMethod { contract: String, method: String },

    #[error("Contract not found: {0}")]
    ContractNotFound(String),

    #[error("Signing failed: {0}")]
    SigningFailure(String),

    #[error("Broadcast failed: {0}")]
    BroadcastFailure(String),

    #[error("Contract call failed: {0}")]
    ContractCallFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stable discriminant for front ends that need to branch on the failure kind
/// without matching on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidPrivateKey,
    InvalidMnemonic,
    NoAccount,
    AccountAlreadyExists,
    WrongPassphrase,
    StorageFailure,
    UnknownMethod,
    ContractNotFound,
    SigningFailure,
    BroadcastFailure,
    ContractCallFailure,
    Config,
    InvalidArgument,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidPrivateKey => ErrorKind::InvalidPrivateKey,
            Error::InvalidMnemonic(_) => ErrorKind::InvalidMnemonic,
            Error::NoAccount => ErrorKind::NoAccount,
            Error::AccountAlreadyExists(_) => ErrorKind::AccountAlreadyExists,
            Error::WrongPassphrase => ErrorKind::WrongPassphrase,
            Error::StorageFailure(_) | Error::Json(_) => ErrorKind::StorageFailure,
            Error::UnknownMethod { .. } => ErrorKind::UnknownMethod,
            Error::ContractNotFound(_) => ErrorKind::ContractNotFound,
            Error::SigningFailure(_) => ErrorKind::SigningFailure,
            Error::BroadcastFailure(_) => ErrorKind::BroadcastFailure,
            Error::ContractCallFailure(_) => ErrorKind::ContractCallFailure,
            Error::Config(_) => ErrorKind::Config,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
