use chain_btc::address::ScriptType;
use chain_btc::network::BtcNetwork;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::WalletError;
use crate::mnemonic;

/// Where key material comes from.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub enum SeedSource {
    /// BIP-39 phrase plus optional passphrase (empty string for none).
    Mnemonic { phrase: String, passphrase: String },
    /// A raw BIP-32 seed of 16 to 64 bytes.
    RawSeed(Vec<u8>),
}

impl SeedSource {
    pub fn mnemonic(phrase: impl Into<String>, passphrase: impl Into<String>) -> Self {
        SeedSource::Mnemonic {
            phrase: phrase.into(),
            passphrase: passphrase.into(),
        }
    }

    /// Stretch into seed bytes. The result is wiped when dropped.
    pub fn to_seed(&self) -> Result<Zeroizing<Vec<u8>>, WalletError> {
        match self {
            SeedSource::Mnemonic { phrase, passphrase } => {
                let seed = mnemonic::mnemonic_to_seed(phrase, passphrase)?;
                Ok(Zeroizing::new(seed.to_vec()))
            }
            SeedSource::RawSeed(bytes) => {
                if !(16..=64).contains(&bytes.len()) {
                    return Err(WalletError::InvalidSeed(format!(
                        "seed must be 16 to 64 bytes, got {}",
                        bytes.len()
                    )));
                }
                Ok(Zeroizing::new(bytes.clone()))
            }
        }
    }
}

impl std::fmt::Debug for SeedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeedSource::Mnemonic { .. } => f.write_str("SeedSource::Mnemonic(..)"),
            SeedSource::RawSeed(bytes) => write!(f, "SeedSource::RawSeed({} bytes)", bytes.len()),
        }
    }
}

/// A receive address and how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedAddress {
    pub address: String,
    /// `legacy` or `segwit`.
    pub script_type: String,
    pub network: String,
    /// Hex of the 33-byte compressed public key.
    pub public_key: String,
    /// `None` for keys imported from WIF.
    pub derivation_path: Option<String>,
}

impl DerivedAddress {
    pub(crate) fn new(
        address: String,
        script_type: ScriptType,
        network: BtcNetwork,
        public_key: [u8; 33],
        derivation_path: Option<String>,
    ) -> Self {
        Self {
            address,
            script_type: script_type.to_string(),
            network: network.to_string(),
            public_key: hex::encode(public_key),
            derivation_path,
        }
    }
}

/// A freshly generated wallet. The mnemonic is meant to be shown once.
#[derive(Debug)]
pub struct GeneratedWallet {
    pub mnemonic: SecretString,
    pub wif: SecretString,
    pub address: DerivedAddress,
}
