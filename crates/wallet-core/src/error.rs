use chain_btc::error::BtcError;
use chain_btc::provider::ProviderError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Invalid private key encoding: {0}")]
    InvalidPrivateKeyEncoding(String),

    #[error("Insufficient funds: have {available} sat, need {required} sat")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("Chain data provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Signing failed: {0}")]
    SigningError(String),

    #[error("Signature validation failed for input {input}: {reason}")]
    SignatureValidationFailed { input: usize, reason: String },

    #[error("Serialization failed: {0}")]
    SerializationError(String),

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid script type: {0}")]
    InvalidScriptType(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Transaction build failed: {0}")]
    TransactionFailed(String),
}

impl From<BtcError> for WalletError {
    fn from(e: BtcError) -> Self {
        match e {
            BtcError::InvalidPrivateKeyEncoding(m) => WalletError::InvalidPrivateKeyEncoding(m),
            BtcError::InvalidPublicKey(m) => WalletError::DerivationFailed(m),
            BtcError::InvalidAddress(m) | BtcError::InvalidNetwork(m) => {
                WalletError::InvalidAddress(m)
            }
            BtcError::InvalidScriptType(m) => WalletError::InvalidScriptType(m),
            BtcError::InvalidAmount(m) => WalletError::InvalidAmount(m),
            BtcError::InsufficientFunds {
                available,
                required,
            } => WalletError::InsufficientFunds {
                available,
                required,
            },
            BtcError::SigningError(m) => WalletError::SigningError(m),
            BtcError::SignatureValidationFailed { input, reason } => {
                WalletError::SignatureValidationFailed { input, reason }
            }
            BtcError::SerializationError(m) => WalletError::SerializationError(m),
            e @ (BtcError::MissingPreviousTransaction { .. }
            | BtcError::PreviousTransactionMismatch(_)
            | BtcError::TransactionBuildError(_)) => WalletError::TransactionFailed(e.to_string()),
        }
    }
}

impl From<ProviderError> for WalletError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Unavailable(m) => WalletError::ProviderUnavailable(m),
            ProviderError::NotFound(m) => WalletError::NotFound(m),
            ProviderError::InvalidResponse(m) => {
                WalletError::ProviderUnavailable(format!("invalid response: {m}"))
            }
        }
    }
}
