//! Bitcoin transaction construction for the wallet.
//!
//! Covers P2PKH and P2WPKH addresses, WIF keys, first-fit coin selection,
//! unsigned transaction assembly, signing with post-sign validation, and
//! final consensus serialization. Chain queries sit behind
//! [`provider::ChainDataProvider`].

pub mod address;
pub mod error;
pub mod keys;
pub mod network;
pub mod provider;
pub mod serializer;
pub mod signer;
pub mod transaction;
pub mod utxo;

pub use address::ScriptType;
pub use error::BtcError;
pub use keys::KeyPair;
pub use network::BtcNetwork;
pub use provider::{ChainDataProvider, ProviderError};
pub use serializer::FinalizedTransaction;
pub use signer::SignedTransaction;
pub use transaction::UnsignedTransaction;
pub use utxo::{CoinSelection, Utxo};
