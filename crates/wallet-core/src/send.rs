//! Fetch, select, build, sign, finalize and broadcast.

use chain_btc::address::ScriptType;
use chain_btc::keys::KeyPair;
use chain_btc::provider::ChainDataProvider;
use chain_btc::serializer::{self, FinalizedTransaction};
use chain_btc::utxo::{self, CoinSelection, Utxo};
use chain_btc::{signer, transaction};
use tracing::{debug, info, warn};

use crate::error::WalletError;

/// How the fee for a send is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePolicy {
    /// A flat fee in satoshis, regardless of transaction size.
    Fixed(u64),
    /// Sat/vbyte; the fee is re-estimated as inputs are added.
    Rate(u64),
}

impl Default for FeePolicy {
    fn default() -> Self {
        FeePolicy::Fixed(1_000)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub destination: String,
    pub amount_sat: u64,
    pub fee: FeePolicy,
}

/// A signed transaction that has not been broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSend {
    pub transaction: FinalizedTransaction,
    pub selection: CoinSelection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub txid: String,
    pub tx_hex: String,
    pub fee_sat: u64,
    pub change_sat: u64,
    pub input_count: usize,
}

/// Confirmed balance of `address`, in satoshis.
pub async fn get_balance<P>(provider: &P, address: &str) -> Result<u64, WalletError>
where
    P: ChainDataProvider + ?Sized,
{
    Ok(provider.get_balance(address).await?)
}

/// Build and sign a transaction paying `request.destination` from `key`'s
/// `script_type` address. Nothing is broadcast.
///
/// Change goes back to the sending address.
pub async fn prepare_send<P>(
    provider: &P,
    key: &KeyPair,
    script_type: ScriptType,
    request: &SendRequest,
) -> Result<PreparedSend, WalletError>
where
    P: ChainDataProvider + ?Sized,
{
    let own_address = key.address(script_type).to_string();
    let utxos = provider.get_utxos(&own_address).await?;
    debug!(address = %own_address, count = utxos.len(), "fetched utxos");

    let selection = match request.fee {
        FeePolicy::Fixed(fee_sat) => utxo::select_utxos(&utxos, request.amount_sat, fee_sat)?,
        FeePolicy::Rate(rate) => {
            utxo::select_with_fee_rate(&utxos, request.amount_sat, rate, script_type)?
        }
    };

    let selection = match script_type {
        ScriptType::P2pkh => attach_previous_transactions(provider, selection).await?,
        ScriptType::P2wpkh => selection,
    };

    let unsigned = transaction::build_from_selection(
        &selection,
        &request.destination,
        request.amount_sat,
        &own_address,
        key.network(),
    )?;
    let signed = signer::sign_all(&unsigned, key)?;
    let transaction = serializer::finalize(&signed);

    Ok(PreparedSend {
        transaction,
        selection,
    })
}

/// Prepare, then broadcast. Broadcasting cannot be undone.
pub async fn send<P>(
    provider: &P,
    key: &KeyPair,
    script_type: ScriptType,
    request: &SendRequest,
) -> Result<SendReceipt, WalletError>
where
    P: ChainDataProvider + ?Sized,
{
    let prepared = prepare_send(provider, key, script_type, request).await?;
    broadcast(provider, prepared).await
}

/// Submit an already prepared transaction.
pub async fn broadcast<P>(provider: &P, prepared: PreparedSend) -> Result<SendReceipt, WalletError>
where
    P: ChainDataProvider + ?Sized,
{
    let local_txid = prepared.transaction.txid.to_string();

    let reported = provider.broadcast(&prepared.transaction.bytes).await?;
    if reported.trim() != local_txid {
        warn!(local = %local_txid, reported = %reported.trim(), "provider reported a different txid");
    }
    info!(
        txid = %local_txid,
        fee_sat = prepared.selection.fee_sat,
        inputs = prepared.selection.selected.len(),
        "broadcast transaction"
    );

    Ok(SendReceipt {
        txid: local_txid,
        tx_hex: prepared.transaction.to_hex(),
        fee_sat: prepared.selection.fee_sat,
        change_sat: prepared.selection.change_sat,
        input_count: prepared.selection.selected.len(),
    })
}

/// Legacy sighashes need the funding transactions; fetch them one by one.
async fn attach_previous_transactions<P>(
    provider: &P,
    selection: CoinSelection,
) -> Result<CoinSelection, WalletError>
where
    P: ChainDataProvider + ?Sized,
{
    let mut selected = Vec::with_capacity(selection.selected.len());
    for utxo in selection.selected {
        let utxo = match utxo.prev_tx {
            Some(_) => utxo,
            None => {
                let prev_tx = provider.get_transaction_hex(&utxo.txid).await?;
                Utxo {
                    prev_tx: Some(prev_tx),
                    ..utxo
                }
            }
        };
        selected.push(utxo);
    }
    Ok(CoinSelection {
        selected,
        ..selection
    })
}
