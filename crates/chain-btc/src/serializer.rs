use bitcoin::{consensus, Transaction, Txid, Wtxid};
use tracing::debug;

use crate::error::BtcError;
use crate::signer::SignedTransaction;

/// Broadcast-ready encoding of a signed transaction plus its identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedTransaction {
    /// Consensus encoding, including witness data when any input has one.
    pub bytes: Vec<u8>,
    /// Hash of the witness-stripped encoding.
    pub txid: Txid,
    pub wtxid: Wtxid,
}

impl FinalizedTransaction {
    /// Lowercase hex of [`bytes`](Self::bytes), as expected by broadcast endpoints.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Virtual size in vbytes.
    pub fn vsize(&self) -> usize {
        // `bytes` was produced by `consensus::serialize`, so it always decodes.
        decode(&self.bytes).map(|tx| tx.vsize()).unwrap_or(self.bytes.len())
    }
}

/// Encode a signed transaction and compute its txid / wtxid.
pub fn finalize(signed: &SignedTransaction) -> FinalizedTransaction {
    let tx = signed.tx();
    let finalized = FinalizedTransaction {
        bytes: consensus::serialize(tx),
        txid: tx.compute_txid(),
        wtxid: tx.compute_wtxid(),
    };
    debug!(txid = %finalized.txid, size = finalized.bytes.len(), "transaction finalized");
    finalized
}

/// Decode consensus-encoded transaction bytes.
pub fn decode(bytes: &[u8]) -> Result<Transaction, BtcError> {
    consensus::deserialize(bytes)
        .map_err(|e| BtcError::SerializationError(format!("failed to decode transaction: {e}")))
}

/// Decode a hex-encoded transaction.
pub fn decode_hex(tx_hex: &str) -> Result<Transaction, BtcError> {
    let bytes = hex::decode(tx_hex.trim())
        .map_err(|e| BtcError::SerializationError(format!("invalid transaction hex: {e}")))?;
    decode(&bytes)
}
