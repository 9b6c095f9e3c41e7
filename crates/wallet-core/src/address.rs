use chain_btc::address::ScriptType;
use chain_btc::keys::KeyPair;
use chain_btc::network::BtcNetwork;

use crate::error::WalletError;
use crate::hd_derivation::{self, DerivationPath};
use crate::types::DerivedAddress;

/// Derive the key pair at `m/purpose'/coin'/account'/0/index`.
pub fn derive_key_pair(
    seed: &[u8],
    script_type: ScriptType,
    network: BtcNetwork,
    account: u32,
    index: u32,
) -> Result<(KeyPair, DerivationPath), WalletError> {
    let path = DerivationPath::for_wallet(script_type, network, account, index);
    let key = hd_derivation::derive_key_pair(seed, &path, network)?;
    Ok((key, path))
}

/// Derive a receive address from seed bytes
pub fn derive_address(
    seed: &[u8],
    script_type: ScriptType,
    network: BtcNetwork,
    account: u32,
    index: u32,
) -> Result<DerivedAddress, WalletError> {
    let (key, path) = derive_key_pair(seed, script_type, network, account, index)?;
    Ok(describe(&key, script_type, Some(path.to_string())))
}

/// Derive `count` consecutive receive addresses starting at index 0.
pub fn derive_addresses(
    seed: &[u8],
    script_type: ScriptType,
    network: BtcNetwork,
    account: u32,
    count: u32,
) -> Result<Vec<DerivedAddress>, WalletError> {
    (0..count)
        .map(|index| derive_address(seed, script_type, network, account, index))
        .collect()
}

/// Address description for a key, under the given script type.
pub fn describe(key: &KeyPair, script_type: ScriptType, derivation_path: Option<String>) -> DerivedAddress {
    DerivedAddress::new(
        key.address(script_type).to_string(),
        script_type,
        key.network(),
        key.public_key().to_bytes(),
        derivation_path,
    )
}

/// Validate an address for a given network
pub fn validate_address(addr: &str, network: BtcNetwork) -> Result<bool, WalletError> {
    Ok(chain_btc::address::validate_address(addr, network)?)
}
