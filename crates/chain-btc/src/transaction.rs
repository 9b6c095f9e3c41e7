use bitcoin::absolute::LockTime;
use bitcoin::script::ScriptBuf;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use tracing::debug;

use crate::address::{parse_address, ScriptType};
use crate::error::BtcError;
use crate::network::BtcNetwork;
use crate::utxo::{CoinSelection, Utxo, DUST_THRESHOLD_SAT};

/// Estimated virtual size of a P2WPKH input (in vbytes).
/// Breakdown: 41 bytes non-witness + ~27 witness bytes / 4 = ~68 vbytes per input.
const P2WPKH_INPUT_VBYTES: u64 = 68;

/// Estimated size of a P2PKH input: outpoint, sequence and a ~107-byte scriptSig.
const P2PKH_INPUT_VBYTES: u64 = 148;

/// Estimated virtual size of any output (in vbytes).
const OUTPUT_VBYTES: u64 = 31;

/// Fixed transaction overhead (in vbytes): version + locktime + segwit marker/flag + counts.
const TX_OVERHEAD_VBYTES: u64 = 11;

/// Estimate the fee for a transaction whose inputs all use `script_type`.
///
/// Fails with `InvalidAmount` when the size or fee does not fit in a `u64`.
pub fn estimate_fee(
    script_type: ScriptType,
    num_inputs: usize,
    num_outputs: usize,
    fee_rate_sat_vbyte: u64,
) -> Result<u64, BtcError> {
    let input_vbytes = match script_type {
        ScriptType::P2pkh => P2PKH_INPUT_VBYTES,
        ScriptType::P2wpkh => P2WPKH_INPUT_VBYTES,
    };
    (num_inputs as u64)
        .checked_mul(input_vbytes)
        .and_then(|inputs| {
            (num_outputs as u64)
                .checked_mul(OUTPUT_VBYTES)
                .and_then(|outputs| inputs.checked_add(outputs))
        })
        .and_then(|vsize| vsize.checked_add(TX_OVERHEAD_VBYTES))
        .and_then(|vsize| vsize.checked_mul(fee_rate_sat_vbyte))
        .ok_or_else(|| {
            BtcError::InvalidAmount(format!(
                "fee for {num_inputs} inputs at {fee_rate_sat_vbyte} sat/vB overflows"
            ))
        })
}

/// Sum of satoshi values, or `InvalidAmount` on overflow.
fn checked_total(values: impl IntoIterator<Item = Amount>, what: &str) -> Result<u64, BtcError> {
    values
        .into_iter()
        .try_fold(0u64, |total, value| total.checked_add(value.to_sat()))
        .ok_or_else(|| BtcError::InvalidAmount(format!("{what} total overflows")))
}

/// Fee paid by spending `inputs` into `outputs`.
///
/// Rejects transactions with no inputs and ones whose outputs exceed their
/// inputs.
pub(crate) fn balance_fee(inputs: &[SpendInput], outputs: &[TxOut]) -> Result<u64, BtcError> {
    if inputs.is_empty() {
        return Err(BtcError::TransactionBuildError("transaction has no inputs".into()));
    }
    let input_total = checked_total(inputs.iter().map(|i| i.prevout.value), "input")?;
    let output_total = checked_total(outputs.iter().map(|o| o.value), "output")?;
    input_total.checked_sub(output_total).ok_or_else(|| {
        BtcError::TransactionBuildError(format!(
            "outputs ({output_total} sat) exceed inputs ({input_total} sat)"
        ))
    })
}

/// Everything the signer needs to know about one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendInput {
    pub outpoint: OutPoint,
    /// The output being spent (value + locking script).
    pub prevout: TxOut,
    pub script_type: ScriptType,
    /// The full funding transaction. Always present for P2PKH inputs.
    pub prev_tx: Option<Transaction>,
}

impl SpendInput {
    /// Turn a provider-supplied UTXO into a spendable input.
    ///
    /// The script type is read from the UTXO's locking script. Legacy inputs
    /// must carry the funding transaction, which has to hash to the UTXO's
    /// txid and contain the referenced output with the same value and script.
    pub fn from_utxo(utxo: &Utxo) -> Result<Self, BtcError> {
        let txid: Txid = utxo
            .txid
            .parse()
            .map_err(|e| BtcError::TransactionBuildError(format!("invalid txid: {e}")))?;
        let outpoint = OutPoint::new(txid, utxo.vout);

        let prevout = TxOut {
            value: Amount::from_sat(utxo.amount_sat),
            script_pubkey: ScriptBuf::from(utxo.script_pubkey.clone()),
        };

        let script_type = ScriptType::from_script(&prevout.script_pubkey).ok_or_else(|| {
            BtcError::TransactionBuildError(format!(
                "unsupported locking script for {}:{}",
                utxo.txid, utxo.vout
            ))
        })?;

        let prev_tx = match (script_type, &utxo.prev_tx) {
            (ScriptType::P2pkh, None) => {
                return Err(BtcError::MissingPreviousTransaction {
                    txid: utxo.txid.clone(),
                })
            }
            (_, Some(bytes)) => Some(check_previous_transaction(bytes, &outpoint, &prevout)?),
            (ScriptType::P2wpkh, None) => None,
        };

        Ok(Self {
            outpoint,
            prevout,
            script_type,
            prev_tx,
        })
    }
}

fn check_previous_transaction(
    bytes: &[u8],
    outpoint: &OutPoint,
    prevout: &TxOut,
) -> Result<Transaction, BtcError> {
    let prev_tx: Transaction = bitcoin::consensus::deserialize(bytes).map_err(|e| {
        BtcError::PreviousTransactionMismatch(format!("cannot decode {}: {e}", outpoint.txid))
    })?;

    let actual = prev_tx.compute_txid();
    if actual != outpoint.txid {
        return Err(BtcError::PreviousTransactionMismatch(format!(
            "expected {}, got {actual}",
            outpoint.txid
        )));
    }

    let funded = prev_tx.output.get(outpoint.vout as usize).ok_or_else(|| {
        BtcError::PreviousTransactionMismatch(format!("{outpoint} has no such output"))
    })?;
    if funded != prevout {
        return Err(BtcError::PreviousTransactionMismatch(format!(
            "{outpoint} pays {} to a different script or value than reported",
            funded.value
        )));
    }

    Ok(prev_tx)
}

/// An unsigned Bitcoin transaction ready for signing.
///
/// Built by value: each `with_*` step consumes the transaction and returns the
/// extended one, so inputs and outputs end up exactly in the order added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    tx: Transaction,
    inputs: Vec<SpendInput>,
}

impl Default for UnsignedTransaction {
    fn default() -> Self {
        Self::new()
    }
}

impl UnsignedTransaction {
    /// Empty version-2 transaction with no locktime.
    pub fn new() -> Self {
        Self {
            tx: Transaction {
                version: Version::TWO,
                lock_time: LockTime::ZERO,
                input: Vec::new(),
                output: Vec::new(),
            },
            inputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, input: SpendInput) -> Self {
        self.tx.input.push(TxIn {
            previous_output: input.outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::default(),
        });
        self.inputs.push(input);
        self
    }

    pub fn with_output(mut self, output: TxOut) -> Self {
        self.tx.output.push(output);
        self
    }

    /// The transaction skeleton with empty scriptSigs and witnesses.
    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    /// Spend context for each input, in input order.
    pub fn inputs(&self) -> &[SpendInput] {
        &self.inputs
    }

    pub fn input_total_sat(&self) -> Result<u64, BtcError> {
        checked_total(self.inputs.iter().map(|i| i.prevout.value), "input")
    }

    pub fn output_total_sat(&self) -> Result<u64, BtcError> {
        checked_total(self.tx.output.iter().map(|o| o.value), "output")
    }

    /// Implied fee: inputs minus outputs. Errors if the transaction has no
    /// inputs or spends more than it has.
    pub fn fee_sat(&self) -> Result<u64, BtcError> {
        balance_fee(&self.inputs, &self.tx.output)
    }
}

/// Assemble an unsigned transaction from already-chosen UTXOs.
///
/// Inputs keep the caller's order. Outputs are the destination first, then a
/// change output back to `change_address` when `change_sat` is non-zero.
pub fn build_transaction(
    chosen: &[Utxo],
    destination: &str,
    amount_sat: u64,
    change_address: &str,
    change_sat: u64,
    network: BtcNetwork,
) -> Result<UnsignedTransaction, BtcError> {
    if chosen.is_empty() {
        return Err(BtcError::TransactionBuildError("no inputs chosen".into()));
    }
    if amount_sat == 0 {
        return Err(BtcError::InvalidAmount("amount must be greater than zero".into()));
    }
    if amount_sat < DUST_THRESHOLD_SAT {
        return Err(BtcError::InvalidAmount(format!(
            "amount {amount_sat} sat is below the {DUST_THRESHOLD_SAT} sat dust limit"
        )));
    }

    let destination_addr = parse_address(destination, network)?;
    let change_addr = parse_address(change_address, network)?;

    let mut unsigned = chosen
        .iter()
        .map(SpendInput::from_utxo)
        .try_fold(UnsignedTransaction::new(), |tx, input| {
            input.map(|input| tx.with_input(input))
        })?
        .with_output(TxOut {
            value: Amount::from_sat(amount_sat),
            script_pubkey: destination_addr.script_pubkey(),
        });

    if change_sat > 0 {
        unsigned = unsigned.with_output(TxOut {
            value: Amount::from_sat(change_sat),
            script_pubkey: change_addr.script_pubkey(),
        });
    }

    let fee_sat = unsigned.fee_sat()?;

    debug!(
        inputs = unsigned.inputs().len(),
        outputs = unsigned.tx().output.len(),
        fee_sat,
        "built unsigned transaction"
    );
    Ok(unsigned)
}

/// Assemble an unsigned transaction from a coin selection.
pub fn build_from_selection(
    selection: &CoinSelection,
    destination: &str,
    amount_sat: u64,
    change_address: &str,
    network: BtcNetwork,
) -> Result<UnsignedTransaction, BtcError> {
    build_transaction(
        &selection.selected,
        destination,
        amount_sat,
        change_address,
        selection.change_sat,
        network,
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::keys::KeyPair;

    const DEST: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";

    pub(crate) fn make_segwit_utxo(txid: &str, vout: u32, amount_sat: u64, key: &KeyPair) -> Utxo {
        Utxo {
            txid: txid.to_string(),
            vout,
            amount_sat,
            script_pubkey: ScriptType::P2wpkh.script_pubkey(key.public_key()).to_bytes(),
            prev_tx: None,
        }
    }

    /// A fake funding transaction paying `amount_sat` to `key` at output `vout`.
    pub(crate) fn make_legacy_utxo(vout: u32, amount_sat: u64, key: &KeyPair) -> Utxo {
        let script = ScriptType::P2pkh.script_pubkey(key.public_key());
        let mut outputs: Vec<TxOut> = (0..vout)
            .map(|_| TxOut {
                value: Amount::from_sat(1_000),
                script_pubkey: ScriptBuf::from(vec![0x6a, 0x00]),
            })
            .collect();
        outputs.push(TxOut {
            value: Amount::from_sat(amount_sat),
            script_pubkey: script.clone(),
        });
        let funding = Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(Txid::from_byte_array([0x11; 32]), amount_sat as u32),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::default(),
            }],
            output: outputs,
        };
        Utxo {
            txid: funding.compute_txid().to_string(),
            vout,
            amount_sat,
            script_pubkey: script.to_bytes(),
            prev_tx: Some(bitcoin::consensus::serialize(&funding)),
        }
    }

    pub(crate) fn test_key() -> KeyPair {
        KeyPair::from_secret_bytes(&[0xcd; 32], BtcNetwork::Mainnet).unwrap()
    }

    use bitcoin::hashes::Hash;

    #[test]
    fn estimate_fee_basic() {
        // 1 input, 2 outputs: 11 + 68 + 62 = 141 vbytes at 1 sat/vbyte = 141
        assert_eq!(estimate_fee(ScriptType::P2wpkh, 1, 2, 1).unwrap(), 141);
        // 11 + 148 + 62 = 221
        assert_eq!(estimate_fee(ScriptType::P2pkh, 1, 2, 1).unwrap(), 221);
    }

    #[test]
    fn estimate_fee_scales_with_inputs() {
        let fee_1 = estimate_fee(ScriptType::P2wpkh, 1, 2, 10).unwrap();
        let fee_2 = estimate_fee(ScriptType::P2wpkh, 2, 2, 10).unwrap();
        assert_eq!(fee_2 - fee_1, P2WPKH_INPUT_VBYTES * 10);
    }

    #[test]
    fn estimate_fee_zero_rate() {
        assert_eq!(estimate_fee(ScriptType::P2pkh, 5, 5, 0).unwrap(), 0);
    }

    #[test]
    fn estimate_fee_overflow_is_an_error() {
        assert!(matches!(
            estimate_fee(ScriptType::P2wpkh, 1, 2, u64::MAX / 100),
            Err(BtcError::InvalidAmount(_))
        ));
        assert!(matches!(
            estimate_fee(ScriptType::P2pkh, usize::MAX, 2, 1),
            Err(BtcError::InvalidAmount(_))
        ));
    }

    #[test]
    fn build_keeps_input_order_and_puts_destination_first() {
        let key = test_key();
        let change = key.address(ScriptType::P2wpkh).to_string();
        let utxos = vec![
            make_segwit_utxo(&"a".repeat(64), 0, 50_000, &key),
            make_segwit_utxo(&"b".repeat(64), 3, 30_000, &key),
        ];

        let unsigned = build_transaction(&utxos, DEST, 60_000, &change, 19_000, BtcNetwork::Mainnet)
            .unwrap();

        let tx = unsigned.tx();
        assert_eq!(tx.input.len(), 2);
        assert_eq!(tx.input[0].previous_output.txid.to_string(), "a".repeat(64));
        assert_eq!(tx.input[1].previous_output.vout, 3);
        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[0].value.to_sat(), 60_000);
        assert_eq!(tx.output[1].value.to_sat(), 19_000);
        assert_eq!(tx.output[1].script_pubkey, key.address(ScriptType::P2wpkh).script_pubkey());
        assert_eq!(unsigned.fee_sat().unwrap(), 1_000);
        assert!(tx.input.iter().all(|i| i.script_sig.is_empty() && i.witness.is_empty()));
    }

    #[test]
    fn build_without_change_has_single_output() {
        let key = test_key();
        let change = key.address(ScriptType::P2wpkh).to_string();
        let utxos = vec![make_segwit_utxo(&"c".repeat(64), 0, 100_000, &key)];
        let unsigned = build_transaction(&utxos, DEST, 99_000, &change, 0, BtcNetwork::Mainnet)
            .unwrap();
        assert_eq!(unsigned.tx().output.len(), 1);
    }

    #[test]
    fn build_rejects_overspend() {
        let key = test_key();
        let change = key.address(ScriptType::P2wpkh).to_string();
        let utxos = vec![make_segwit_utxo(&"d".repeat(64), 0, 10_000, &key)];
        let result = build_transaction(&utxos, DEST, 9_000, &change, 2_000, BtcNetwork::Mainnet);
        assert!(matches!(result, Err(BtcError::TransactionBuildError(_))));
    }

    #[test]
    fn build_transaction_invalid_recipient() {
        let key = test_key();
        let change = key.address(ScriptType::P2wpkh).to_string();
        let utxos = vec![make_segwit_utxo(&"d".repeat(64), 0, 100_000, &key)];
        let result =
            build_transaction(&utxos, "not_a_valid_address", 50_000, &change, 0, BtcNetwork::Mainnet);
        assert!(matches!(result, Err(BtcError::InvalidAddress(_))));
    }

    #[test]
    fn build_transaction_wrong_network() {
        let key = test_key();
        let utxos = vec![make_segwit_utxo(&"e".repeat(64), 0, 100_000, &key)];
        let result = build_transaction(&utxos, DEST, 50_000, DEST, 0, BtcNetwork::Testnet);
        assert!(matches!(result, Err(BtcError::InvalidAddress(_))));
    }

    #[test]
    fn build_rejects_empty_inputs_and_zero_amount() {
        let key = test_key();
        let utxos = vec![make_segwit_utxo(&"e".repeat(64), 0, 100_000, &key)];
        assert!(build_transaction(&[], DEST, 1_000, DEST, 0, BtcNetwork::Mainnet).is_err());
        assert!(matches!(
            build_transaction(&utxos, DEST, 0, DEST, 0, BtcNetwork::Mainnet),
            Err(BtcError::InvalidAmount(_))
        ));
    }

    #[test]
    fn build_rejects_dust_destination() {
        let key = test_key();
        let change = key.address(ScriptType::P2wpkh).to_string();
        let utxos = vec![make_segwit_utxo(&"e".repeat(64), 0, 100_000, &key)];
        assert!(matches!(
            build_transaction(&utxos, DEST, DUST_THRESHOLD_SAT - 1, &change, 90_000, BtcNetwork::Mainnet),
            Err(BtcError::InvalidAmount(_))
        ));
        assert!(
            build_transaction(&utxos, DEST, DUST_THRESHOLD_SAT, &change, 90_000, BtcNetwork::Mainnet)
                .is_ok()
        );
    }

    #[test]
    fn legacy_input_requires_previous_transaction() {
        let key = test_key();
        let mut utxo = make_legacy_utxo(0, 40_000, &key);
        utxo.prev_tx = None;
        assert!(matches!(
            SpendInput::from_utxo(&utxo),
            Err(BtcError::MissingPreviousTransaction { .. })
        ));
    }

    #[test]
    fn legacy_input_decodes_previous_transaction() {
        let key = test_key();
        let utxo = make_legacy_utxo(2, 40_000, &key);
        let input = SpendInput::from_utxo(&utxo).unwrap();
        assert_eq!(input.script_type, ScriptType::P2pkh);
        assert_eq!(input.outpoint.vout, 2);
        assert_eq!(input.prev_tx.unwrap().output.len(), 3);
    }

    #[test]
    fn legacy_input_rejects_wrong_value() {
        let key = test_key();
        let mut utxo = make_legacy_utxo(0, 40_000, &key);
        utxo.amount_sat = 45_000;
        assert!(matches!(
            SpendInput::from_utxo(&utxo),
            Err(BtcError::PreviousTransactionMismatch(_))
        ));
    }

    #[test]
    fn legacy_input_rejects_foreign_transaction() {
        let key = test_key();
        let mut utxo = make_legacy_utxo(0, 40_000, &key);
        utxo.txid = "f".repeat(64);
        assert!(matches!(
            SpendInput::from_utxo(&utxo),
            Err(BtcError::PreviousTransactionMismatch(_))
        ));
    }

    #[test]
    fn legacy_input_rejects_garbage_bytes() {
        let key = test_key();
        let mut utxo = make_legacy_utxo(0, 40_000, &key);
        utxo.prev_tx = Some(vec![0xde, 0xad]);
        assert!(matches!(
            SpendInput::from_utxo(&utxo),
            Err(BtcError::PreviousTransactionMismatch(_))
        ));
    }

    #[test]
    fn unsupported_script_rejected() {
        let utxo = Utxo {
            txid: "a".repeat(64),
            vout: 0,
            amount_sat: 10_000,
            script_pubkey: vec![0x6a],
            prev_tx: None,
        };
        assert!(matches!(
            SpendInput::from_utxo(&utxo),
            Err(BtcError::TransactionBuildError(_))
        ));
    }

    #[test]
    fn builder_steps_return_new_values() {
        let key = test_key();
        let input = SpendInput::from_utxo(&make_segwit_utxo(&"a".repeat(64), 0, 5_000, &key)).unwrap();
        let empty = UnsignedTransaction::new();
        let one = empty.clone().with_input(input);
        assert!(empty.inputs().is_empty());
        assert_eq!(one.inputs().len(), 1);
        assert_eq!(one.input_total_sat().unwrap(), 5_000);
    }

    #[test]
    fn fee_requires_inputs_covering_outputs() {
        let key = test_key();
        let input = SpendInput::from_utxo(&make_segwit_utxo(&"a".repeat(64), 0, 10_000, &key)).unwrap();
        let pay = |sat| TxOut {
            value: Amount::from_sat(sat),
            script_pubkey: key.address(ScriptType::P2wpkh).script_pubkey(),
        };

        assert!(matches!(
            UnsignedTransaction::new().with_output(pay(1_000)).fee_sat(),
            Err(BtcError::TransactionBuildError(_))
        ));
        let overspend = UnsignedTransaction::new().with_input(input.clone()).with_output(pay(50_000));
        assert!(matches!(overspend.fee_sat(), Err(BtcError::TransactionBuildError(_))));
        let balanced = UnsignedTransaction::new().with_input(input).with_output(pay(9_000));
        assert_eq!(balanced.fee_sat().unwrap(), 1_000);
    }

    #[test]
    fn output_total_overflow_is_an_error() {
        let key = test_key();
        let input = SpendInput::from_utxo(&make_segwit_utxo(&"a".repeat(64), 0, 10_000, &key)).unwrap();
        let huge = TxOut {
            value: Amount::from_sat(u64::MAX),
            script_pubkey: key.address(ScriptType::P2wpkh).script_pubkey(),
        };
        let unsigned = UnsignedTransaction::new()
            .with_input(input)
            .with_output(huge.clone())
            .with_output(huge);
        assert!(matches!(unsigned.output_total_sat(), Err(BtcError::InvalidAmount(_))));
        assert!(matches!(unsigned.fee_sat(), Err(BtcError::InvalidAmount(_))));
    }
}
