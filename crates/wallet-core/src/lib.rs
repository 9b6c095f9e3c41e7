pub mod address;
pub mod error;
pub mod hd_derivation;
pub mod mnemonic;
pub mod send;
pub mod types;

pub use chain_btc::address::ScriptType;
pub use chain_btc::keys::KeyPair;
pub use chain_btc::network::BtcNetwork;
pub use chain_btc::serializer::FinalizedTransaction;
pub use chain_btc::utxo::Utxo;
pub use error::WalletError;
pub use send::{FeePolicy, SendReceipt, SendRequest};
pub use types::{DerivedAddress, GeneratedWallet, SeedSource};

use chain_btc::{serializer, signer, transaction, utxo};
use secrecy::SecretString;

/// Generate a new mnemonic and its first receive address.
pub fn generate_wallet(
    word_count: usize,
    script_type: ScriptType,
    network: BtcNetwork,
) -> Result<GeneratedWallet, WalletError> {
    let phrase = mnemonic::generate_mnemonic(word_count)?;
    let seed = mnemonic::mnemonic_to_seed(&phrase, "")?;
    let (key, path) = address::derive_key_pair(&*seed, script_type, network, 0, 0)?;
    Ok(GeneratedWallet {
        mnemonic: SecretString::from(phrase),
        wif: export_wif(&key),
        address: address::describe(&key, script_type, Some(path.to_string())),
    })
}

/// Validate a mnemonic phrase
pub fn validate_mnemonic(phrase: &str) -> bool {
    mnemonic::validate_mnemonic(phrase)
}

/// Key pair at `m/purpose'/coin'/account'/0/index` for a seed source.
pub fn derive_key_pair(
    source: &SeedSource,
    script_type: ScriptType,
    network: BtcNetwork,
    account: u32,
    index: u32,
) -> Result<KeyPair, WalletError> {
    let seed = source.to_seed()?;
    let (key, _) = address::derive_key_pair(&seed, script_type, network, account, index)?;
    Ok(key)
}

/// Derive a receive address from a mnemonic.
pub fn derive_address_from_mnemonic(
    phrase: &str,
    passphrase: &str,
    script_type: ScriptType,
    network: BtcNetwork,
    account: u32,
    index: u32,
) -> Result<DerivedAddress, WalletError> {
    let seed = mnemonic::mnemonic_to_seed(phrase, passphrase)?;
    address::derive_address(&*seed, script_type, network, account, index)
}

/// Import a WIF private key and describe its address under `script_type`.
pub fn import_wif(
    wif: &str,
    script_type: ScriptType,
    network: BtcNetwork,
) -> Result<(KeyPair, DerivedAddress), WalletError> {
    let key = KeyPair::from_wif(wif, network)?;
    let described = address::describe(&key, script_type, None);
    Ok((key, described))
}

/// Export a key as WIF. This is the only way the private scalar leaves the core.
pub fn export_wif(key: &KeyPair) -> SecretString {
    SecretString::from(key.to_wif())
}

/// Validate an address for a given network
pub fn validate_address(addr: &str, network: BtcNetwork) -> Result<bool, WalletError> {
    address::validate_address(addr, network)
}

/// Sign a payment offline from caller-supplied UTXOs.
///
/// Legacy UTXOs must already carry their funding transaction. Change goes
/// back to the signing key's own address.
pub fn sign_btc_transaction(
    key: &KeyPair,
    script_type: ScriptType,
    utxos: &[Utxo],
    recipient_address: &str,
    amount_sat: u64,
    fee: FeePolicy,
) -> Result<FinalizedTransaction, WalletError> {
    let selection = match fee {
        FeePolicy::Fixed(fee_sat) => utxo::select_utxos(utxos, amount_sat, fee_sat)?,
        FeePolicy::Rate(rate) => utxo::select_with_fee_rate(utxos, amount_sat, rate, script_type)?,
    };
    let change_address = key.address(script_type).to_string();
    let unsigned = transaction::build_from_selection(
        &selection,
        recipient_address,
        amount_sat,
        &change_address,
        key.network(),
    )?;
    let signed = signer::sign_all(&unsigned, key)?;
    Ok(serializer::finalize(&signed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn generate_wallet_roundtrips_through_mnemonic() {
        let wallet = generate_wallet(12, ScriptType::P2wpkh, BtcNetwork::Testnet).unwrap();
        let phrase = wallet.mnemonic.expose_secret();
        assert_eq!(phrase.split_whitespace().count(), 12);

        let again = derive_address_from_mnemonic(
            phrase,
            "",
            ScriptType::P2wpkh,
            BtcNetwork::Testnet,
            0,
            0,
        )
        .unwrap();
        assert_eq!(again, wallet.address);
        assert!(again.address.starts_with("tb1q"));

        let (_, imported) =
            import_wif(wallet.wif.expose_secret(), ScriptType::P2wpkh, BtcNetwork::Testnet).unwrap();
        assert_eq!(imported.address, wallet.address.address);
    }

    #[test]
    fn generated_wallet_debug_hides_mnemonic() {
        let wallet = generate_wallet(12, ScriptType::P2wpkh, BtcNetwork::Mainnet).unwrap();
        let debug = format!("{wallet:?}");
        let first_word = wallet.mnemonic.expose_secret().split_whitespace().next().unwrap().to_string();
        assert!(!debug.contains(&format!("{first_word} ")));
    }

    #[test]
    fn wif_export_import_roundtrip() {
        let source = SeedSource::mnemonic(TEST_MNEMONIC, "");
        let key = derive_key_pair(&source, ScriptType::P2wpkh, BtcNetwork::Mainnet, 0, 0).unwrap();
        let wif = export_wif(&key);
        assert_eq!(
            wif.expose_secret(),
            "KyZpNDKnfs94vbrwhJneDi77V6jF64PWPF8x5cdJb8ifgg2DUc9d"
        );

        let (imported, described) =
            import_wif(wif.expose_secret(), ScriptType::P2wpkh, BtcNetwork::Mainnet).unwrap();
        assert_eq!(imported.public_key(), key.public_key());
        assert_eq!(described.address, "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu");
        assert_eq!(described.derivation_path, None);
    }

    #[test]
    fn import_wif_rejects_garbage() {
        assert!(matches!(
            import_wif("not-a-wif", ScriptType::P2pkh, BtcNetwork::Mainnet),
            Err(WalletError::InvalidPrivateKeyEncoding(_))
        ));
    }

    #[test]
    fn invalid_mnemonic_rejected() {
        let result = derive_address_from_mnemonic(
            "abandon abandon abandon",
            "",
            ScriptType::P2wpkh,
            BtcNetwork::Mainnet,
            0,
            0,
        );
        assert!(matches!(result, Err(WalletError::InvalidMnemonic(_))));
    }

    #[test]
    fn offline_sign_insufficient_funds_returns_no_transaction() {
        let source = SeedSource::mnemonic(TEST_MNEMONIC, "");
        let key = derive_key_pair(&source, ScriptType::P2wpkh, BtcNetwork::Mainnet, 0, 0).unwrap();
        let utxos = vec![Utxo {
            txid: "a".repeat(64),
            vout: 0,
            amount_sat: 10_000,
            script_pubkey: key.address(ScriptType::P2wpkh).script_pubkey().to_bytes(),
            prev_tx: None,
        }];
        let result = sign_btc_transaction(
            &key,
            ScriptType::P2wpkh,
            &utxos,
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
            20_000,
            FeePolicy::Fixed(1_000),
        );
        assert_eq!(
            result.unwrap_err(),
            WalletError::InsufficientFunds {
                available: 10_000,
                required: 21_000
            }
        );
    }
}
