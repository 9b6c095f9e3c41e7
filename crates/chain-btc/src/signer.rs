use bitcoin::hashes::Hash;
use bitcoin::script::{Instruction, PushBytesBuf};
use bitcoin::secp256k1::{Message, Secp256k1, Signing, Verification};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{ecdsa, CompressedPublicKey, PublicKey, ScriptBuf, Transaction, Witness};
use tracing::debug;

use crate::address::ScriptType;
use crate::error::BtcError;
use crate::keys::KeyPair;
use crate::transaction::{balance_fee, SpendInput, UnsignedTransaction};

/// A transaction part-way through signing.
///
/// Inputs are signed one at a time with [`sign_input`](Self::sign_input). It
/// only becomes a [`SignedTransaction`] once every input carries a signature
/// that passes validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartiallySignedTransaction {
    tx: Transaction,
    inputs: Vec<SpendInput>,
    signed: Vec<bool>,
}

impl From<&UnsignedTransaction> for PartiallySignedTransaction {
    fn from(unsigned: &UnsignedTransaction) -> Self {
        Self {
            tx: unsigned.tx().clone(),
            inputs: unsigned.inputs().to_vec(),
            signed: vec![false; unsigned.inputs().len()],
        }
    }
}

impl PartiallySignedTransaction {
    /// Sign input `index` with `key`, returning the updated transaction.
    pub fn sign_input(mut self, index: usize, key: &KeyPair) -> Result<Self, BtcError> {
        let secp = Secp256k1::signing_only();
        let input = self
            .inputs
            .get(index)
            .ok_or_else(|| BtcError::SigningError(format!("no input at index {index}")))?;

        if input.script_type.script_pubkey(key.public_key()) != input.prevout.script_pubkey {
            return Err(BtcError::SigningError(format!(
                "key does not control input {index} ({})",
                input.outpoint
            )));
        }

        let msg = sighash_message(&self.tx, index, input)
            .map_err(|e| BtcError::SigningError(format!("input {index}: {e}")))?;
        let signature = sign_message(&secp, &msg, key);
        let sig_bytes = signature.to_vec();

        match input.script_type {
            ScriptType::P2pkh => {
                let push = PushBytesBuf::try_from(sig_bytes)
                    .map_err(|e| BtcError::SigningError(format!("signature push: {e}")))?;
                self.tx.input[index].script_sig = ScriptBuf::builder()
                    .push_slice(push)
                    .push_key(&PublicKey::from(*key.public_key()))
                    .into_script();
            }
            ScriptType::P2wpkh => {
                // Witness: [signature, pubkey].
                let mut witness = Witness::new();
                witness.push(&sig_bytes);
                witness.push(key.public_key().to_bytes());
                self.tx.input[index].witness = witness;
            }
        }

        self.signed[index] = true;
        debug!(input = index, script_type = %input.script_type, "signed input");
        Ok(self)
    }

    pub fn is_fully_signed(&self) -> bool {
        self.signed.iter().all(|s| *s)
    }

    /// Number of inputs that have been signed so far.
    pub fn signed_count(&self) -> usize {
        self.signed.iter().filter(|s| **s).count()
    }

    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    /// Check every input's signature against its public key, recomputed
    /// sighash and previous output script.
    pub fn validate(&self) -> Result<(), BtcError> {
        let secp = Secp256k1::verification_only();
        for (index, input) in self.inputs.iter().enumerate() {
            validate_input(&secp, &self.tx, index, input).map_err(|reason| {
                BtcError::SignatureValidationFailed {
                    input: index,
                    reason,
                }
            })?;
        }
        Ok(())
    }

    /// Validate and seal the transaction.
    ///
    /// Fails if there are no inputs, if outputs exceed inputs, or if any input
    /// is unsigned or carries a signature that does not verify.
    pub fn into_signed(self) -> Result<SignedTransaction, BtcError> {
        let fee_sat = balance_fee(&self.inputs, &self.tx.output)?;
        if let Some(index) = self.signed.iter().position(|s| !s) {
            return Err(BtcError::SignatureValidationFailed {
                input: index,
                reason: "input is not signed".into(),
            });
        }
        self.validate()?;
        Ok(SignedTransaction {
            tx: self.tx,
            inputs: self.inputs,
            fee_sat,
        })
    }
}

/// A fully signed transaction whose signatures have all been validated.
///
/// There are no mutators; the only way forward is serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    tx: Transaction,
    inputs: Vec<SpendInput>,
    fee_sat: u64,
}

impl SignedTransaction {
    pub fn tx(&self) -> &Transaction {
        &self.tx
    }

    pub fn inputs(&self) -> &[SpendInput] {
        &self.inputs
    }

    /// Inputs minus outputs, fixed when the transaction was sealed.
    pub fn fee_sat(&self) -> u64 {
        self.fee_sat
    }
}

/// Sign every input of `unsigned` with `key` and validate the result.
///
/// Either all inputs end up signed and verified, or an error is returned and
/// no transaction comes out.
pub fn sign_all(unsigned: &UnsignedTransaction, key: &KeyPair) -> Result<SignedTransaction, BtcError> {
    let partial = (0..unsigned.inputs().len()).try_fold(
        PartiallySignedTransaction::from(unsigned),
        |partial, index| partial.sign_input(index, key),
    )?;
    let signed = partial.into_signed()?;
    debug!(inputs = signed.inputs().len(), fee_sat = signed.fee_sat(), "transaction signed");
    Ok(signed)
}

fn sighash_message(tx: &Transaction, index: usize, input: &SpendInput) -> Result<Message, String> {
    let mut cache = SighashCache::new(tx);
    let digest = match input.script_type {
        ScriptType::P2pkh => cache
            .legacy_signature_hash(
                index,
                &input.prevout.script_pubkey,
                EcdsaSighashType::All.to_u32(),
            )
            .map_err(|e| format!("legacy sighash failed: {e}"))?
            .to_byte_array(),
        ScriptType::P2wpkh => cache
            .p2wpkh_signature_hash(
                index,
                &input.prevout.script_pubkey,
                input.prevout.value,
                EcdsaSighashType::All,
            )
            .map_err(|e| format!("segwit sighash failed: {e}"))?
            .to_byte_array(),
    };
    Ok(Message::from_digest(digest))
}

fn sign_message<C: Signing>(secp: &Secp256k1<C>, msg: &Message, key: &KeyPair) -> ecdsa::Signature {
    // RFC 6979 nonces; libsecp256k1 always emits low-S.
    ecdsa::Signature::sighash_all(secp.sign_ecdsa(msg, key.secret_key()))
}

/// Pull `(signature, pubkey)` back out of a signed input.
fn extract_proof(tx: &Transaction, index: usize, script_type: ScriptType) -> Result<(Vec<u8>, Vec<u8>), String> {
    let txin = &tx.input[index];
    match script_type {
        ScriptType::P2pkh => {
            let pushes = txin
                .script_sig
                .instructions()
                .map(|ins| match ins {
                    Ok(Instruction::PushBytes(bytes)) => Ok(bytes.as_bytes().to_vec()),
                    Ok(Instruction::Op(op)) => Err(format!("unexpected opcode {op} in scriptSig")),
                    Err(e) => Err(format!("malformed scriptSig: {e}")),
                })
                .collect::<Result<Vec<_>, _>>()?;
            match <[Vec<u8>; 2]>::try_from(pushes) {
                Ok([sig, pubkey]) => Ok((sig, pubkey)),
                Err(pushes) => Err(format!("scriptSig has {} pushes, expected 2", pushes.len())),
            }
        }
        ScriptType::P2wpkh => {
            if !txin.script_sig.is_empty() {
                return Err("native segwit input has a scriptSig".into());
            }
            match (txin.witness.len(), txin.witness.nth(0), txin.witness.nth(1)) {
                (2, Some(sig), Some(pubkey)) => Ok((sig.to_vec(), pubkey.to_vec())),
                (n, _, _) => Err(format!("witness has {n} items, expected 2")),
            }
        }
    }
}

fn validate_input<C: Verification>(
    secp: &Secp256k1<C>,
    tx: &Transaction,
    index: usize,
    input: &SpendInput,
) -> Result<(), String> {
    let (sig_bytes, pubkey_bytes) = extract_proof(tx, index, input.script_type)?;

    let signature =
        ecdsa::Signature::from_slice(&sig_bytes).map_err(|e| format!("bad signature encoding: {e}"))?;
    if signature.sighash_type != EcdsaSighashType::All {
        return Err(format!("unexpected sighash type {}", signature.sighash_type));
    }
    let mut normalized = signature.signature;
    normalized.normalize_s();
    if normalized != signature.signature {
        return Err("signature is not low-S".into());
    }

    let pubkey = CompressedPublicKey::from_slice(&pubkey_bytes)
        .map_err(|e| format!("bad public key: {e}"))?;
    if input.script_type.script_pubkey(&pubkey) != input.prevout.script_pubkey {
        return Err("public key does not match previous output script".into());
    }

    let msg = sighash_message(tx, index, input)?;
    secp.verify_ecdsa(&msg, &signature.signature, &pubkey.0)
        .map_err(|e| format!("signature does not verify: {e}"))
}
