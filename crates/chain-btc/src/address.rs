use std::str::FromStr;

use bitcoin::address::{Address, NetworkUnchecked};
use bitcoin::{CompressedPublicKey, ScriptBuf};

use crate::error::BtcError;
use crate::network::BtcNetwork;

/// The locking-script template an address (and the outputs it receives) uses.
///
/// Spending an output requires knowing which template locked it, so the same
/// `ScriptType` must be used when generating an address and when signing for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptType {
    /// Legacy pay-to-pubkey-hash (`1...` / `m...`, `n...`).
    P2pkh,
    /// Native SegWit v0 pay-to-witness-pubkey-hash (`bc1q...` / `tb1q...`).
    #[default]
    P2wpkh,
}

impl ScriptType {
    /// BIP-43 purpose used in the derivation path for this script type.
    pub fn purpose(self) -> u32 {
        match self {
            ScriptType::P2pkh => 44,
            ScriptType::P2wpkh => 84,
        }
    }

    /// Locking script paying to `pubkey` under this template.
    pub fn script_pubkey(self, pubkey: &CompressedPublicKey) -> ScriptBuf {
        match self {
            ScriptType::P2pkh => ScriptBuf::new_p2pkh(&pubkey.pubkey_hash()),
            ScriptType::P2wpkh => ScriptBuf::new_p2wpkh(&pubkey.wpubkey_hash()),
        }
    }

    /// Classify a locking script, if it is one of the supported templates.
    pub fn from_script(script: &bitcoin::Script) -> Option<Self> {
        if script.is_p2pkh() {
            Some(ScriptType::P2pkh)
        } else if script.is_p2wpkh() {
            Some(ScriptType::P2wpkh)
        } else {
            None
        }
    }
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptType::P2pkh => write!(f, "legacy"),
            ScriptType::P2wpkh => write!(f, "segwit"),
        }
    }
}

impl FromStr for ScriptType {
    type Err = BtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" | "p2pkh" => Ok(ScriptType::P2pkh),
            "segwit" | "p2wpkh" => Ok(ScriptType::P2wpkh),
            other => Err(BtcError::InvalidScriptType(other.to_string())),
        }
    }
}

/// Derive an address from a compressed public key under the given script type.
///
/// P2WPKH gives a bech32 `bc1q...` (mainnet) or `tb1q...` (testnet/signet);
/// P2PKH gives a base58 `1...` (mainnet) or `m...`/`n...` (test networks).
pub fn pubkey_to_address(
    pubkey: &CompressedPublicKey,
    script_type: ScriptType,
    network: BtcNetwork,
) -> Address {
    match script_type {
        ScriptType::P2pkh => Address::p2pkh(pubkey.pubkey_hash(), network.kind()),
        ScriptType::P2wpkh => Address::p2wpkh(pubkey, network.to_bitcoin_network()),
    }
}

/// Derive a P2WPKH (native SegWit bech32) address from 33 compressed public key bytes.
pub fn pubkey_to_p2wpkh_address(
    pubkey_bytes: &[u8; 33],
    network: BtcNetwork,
) -> Result<String, BtcError> {
    let compressed_pk = CompressedPublicKey::from_slice(pubkey_bytes).map_err(|e| {
        BtcError::InvalidPublicKey(format!("failed to parse compressed public key: {e}"))
    })?;

    Ok(pubkey_to_address(&compressed_pk, ScriptType::P2wpkh, network).to_string())
}

/// Parse an address string and require it to belong to `network`.
pub fn parse_address(address: &str, network: BtcNetwork) -> Result<Address, BtcError> {
    address
        .trim()
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| BtcError::InvalidAddress(format!("failed to parse address: {e}")))?
        .require_network(network.to_bitcoin_network())
        .map_err(|e| BtcError::InvalidAddress(format!("address is for another network: {e}")))
}

/// Validate a Bitcoin address string for the given network.
///
/// Supports P2PKH, P2SH, P2WPKH, P2WSH, and P2TR address formats.
/// Returns `true` if the address is valid for the specified network,
/// `false` if it is valid but for a different network.
pub fn validate_address(address: &str, network: BtcNetwork) -> Result<bool, BtcError> {
    let parsed = address
        .trim()
        .parse::<Address<NetworkUnchecked>>()
        .map_err(|e| BtcError::InvalidAddress(format!("failed to parse address: {e}")))?;

    Ok(parsed.is_valid_for_network(network.to_bitcoin_network()))
}
