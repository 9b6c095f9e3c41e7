use tracing::debug;

use crate::address::ScriptType;
use crate::error::BtcError;

/// Outputs below this value cost more to spend later than they are worth.
/// Change under the threshold is added to the fee instead of creating an output.
pub const DUST_THRESHOLD_SAT: u64 = 546;

/// A single unspent transaction output (UTXO).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    /// Transaction ID as a hex string (big-endian / display order).
    pub txid: String,
    /// Output index within the transaction.
    pub vout: u32,
    /// Value in satoshis.
    pub amount_sat: u64,
    /// The locking script (scriptPubKey) serialized bytes.
    pub script_pubkey: Vec<u8>,
    /// Full serialized transaction that created this output.
    /// Required for legacy (P2PKH) inputs, ignored for SegWit ones.
    pub prev_tx: Option<Vec<u8>>,
}

/// Result of UTXO selection: the chosen UTXOs and how their value is split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinSelection {
    /// The selected UTXOs, in candidate order.
    pub selected: Vec<Utxo>,
    /// Total value of the selected UTXOs in satoshis.
    pub total_sat: u64,
    /// Value returned to the sender. Zero means no change output.
    pub change_sat: u64,
    /// Fee actually paid: the requested fee plus any change folded in as dust.
    pub fee_sat: u64,
}

impl CoinSelection {
    fn settle(selected: Vec<Utxo>, total_sat: u64, amount_sat: u64, fee_sat: u64) -> Self {
        let change = total_sat - amount_sat - fee_sat;
        let (change_sat, fee_sat) = if change < DUST_THRESHOLD_SAT {
            (0, fee_sat + change)
        } else {
            (change, fee_sat)
        };
        Self {
            selected,
            total_sat,
            change_sat,
            fee_sat,
        }
    }
}

fn required_total(amount_sat: u64, fee_sat: u64) -> Result<u64, BtcError> {
    amount_sat
        .checked_add(fee_sat)
        .ok_or_else(|| BtcError::InvalidAmount("amount + fee overflows".into()))
}

/// Select UTXOs to cover `amount_sat + fee_sat` with a fixed, caller-supplied fee.
///
/// First-fit: candidates are taken in the order given (the provider's order)
/// and accumulation stops as soon as the running total covers the target.
/// If the whole set is not enough, nothing is selected.
pub fn select_utxos(
    utxos: &[Utxo],
    amount_sat: u64,
    fee_sat: u64,
) -> Result<CoinSelection, BtcError> {
    if amount_sat == 0 {
        return Err(BtcError::InvalidAmount("amount must be greater than zero".into()));
    }
    if fee_sat == 0 {
        return Err(BtcError::InvalidAmount("fee must be greater than zero".into()));
    }
    let required = required_total(amount_sat, fee_sat)?;

    let mut selected = Vec::new();
    let mut total_sat: u64 = 0;

    for utxo in utxos {
        if total_sat >= required {
            break;
        }
        selected.push(utxo.clone());
        total_sat = total_sat.saturating_add(utxo.amount_sat);
    }

    if total_sat < required {
        return Err(BtcError::InsufficientFunds {
            available: total_sat,
            required,
        });
    }

    let selection = CoinSelection::settle(selected, total_sat, amount_sat, fee_sat);
    debug!(
        inputs = selection.selected.len(),
        total_sat = selection.total_sat,
        change_sat = selection.change_sat,
        fee_sat = selection.fee_sat,
        "selected coins"
    );
    Ok(selection)
}

/// Select UTXOs with a fee that grows with each input added.
///
/// Same first-fit walk as [`select_utxos`], but the fee is re-estimated from
/// the transaction size after every input, assuming two outputs.
pub fn select_with_fee_rate(
    utxos: &[Utxo],
    amount_sat: u64,
    fee_rate_sat_vbyte: u64,
    script_type: ScriptType,
) -> Result<CoinSelection, BtcError> {
    if amount_sat == 0 {
        return Err(BtcError::InvalidAmount("amount must be greater than zero".into()));
    }
    if fee_rate_sat_vbyte == 0 {
        return Err(BtcError::InvalidAmount("fee rate must be greater than zero".into()));
    }

    let mut selected: Vec<Utxo> = Vec::new();
    let mut total_sat: u64 = 0;

    for utxo in utxos {
        selected.push(utxo.clone());
        total_sat = total_sat.saturating_add(utxo.amount_sat);

        let fee = crate::transaction::estimate_fee(
            script_type,
            selected.len(),
            2,
            fee_rate_sat_vbyte,
        )?;
        if total_sat >= required_total(amount_sat, fee)? {
            let selection = CoinSelection::settle(selected, total_sat, amount_sat, fee);
            debug!(
                inputs = selection.selected.len(),
                fee_sat = selection.fee_sat,
                fee_rate_sat_vbyte,
                "selected coins at fee rate"
            );
            return Ok(selection);
        }
    }

    let fee = crate::transaction::estimate_fee(
        script_type,
        selected.len().max(1),
        2,
        fee_rate_sat_vbyte,
    )?;
    Err(BtcError::InsufficientFunds {
        available: total_sat,
        required: required_total(amount_sat, fee)?,
    })
}
