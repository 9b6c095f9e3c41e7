use thiserror::Error;

/// Bitcoin chain operation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BtcError {
    #[error("invalid private key encoding: {0}")]
    InvalidPrivateKeyEncoding(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("insufficient funds: have {available} sat, need {required} sat")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("previous transaction {txid} is required to spend a legacy input")]
    MissingPreviousTransaction { txid: String },

    #[error("previous transaction mismatch: {0}")]
    PreviousTransactionMismatch(String),

    #[error("transaction build error: {0}")]
    TransactionBuildError(String),

    #[error("signing error: {0}")]
    SigningError(String),

    #[error("signature validation failed for input {input}: {reason}")]
    SignatureValidationFailed { input: usize, reason: String },

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("invalid network: {0}")]
    InvalidNetwork(String),

    #[error("unknown script type: {0} (expected legacy or segwit)")]
    InvalidScriptType(String),
}
