//! Chain data access.
//!
//! Balance, UTXO and broadcast queries go through [`ChainDataProvider`] so the
//! signing pipeline can run against an in-memory set as easily as a live
//! indexer. Implementations must not retry internally.

use async_trait::async_trait;
use thiserror::Error;

use crate::utxo::Utxo;

/// Failures reported by a chain data provider.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Transport failure, timeout, or a server-side error.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The provider answered with something that could not be parsed.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait ChainDataProvider: Send + Sync {
    /// Confirmed balance of `address` in satoshis.
    async fn get_balance(&self, address: &str) -> Result<u64, ProviderError>;

    /// Unspent outputs paying to `address`, in the provider's order.
    async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, ProviderError>;

    /// Raw consensus bytes of transaction `txid`.
    async fn get_transaction_hex(&self, txid: &str) -> Result<Vec<u8>, ProviderError>;

    /// Submit a serialized transaction and return the txid the network reports.
    async fn broadcast(&self, tx_bytes: &[u8]) -> Result<String, ProviderError>;
}
