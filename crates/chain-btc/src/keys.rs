use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use bitcoin::{Address, CompressedPublicKey, PrivateKey};

use crate::address::{pubkey_to_address, ScriptType};
use crate::error::BtcError;
use crate::network::BtcNetwork;

/// A secp256k1 signing key and its compressed public key, bound to a network.
///
/// The secret is erased when the pair is dropped and never appears in `Debug`
/// output. The only way to get it back out as text is [`KeyPair::to_wif`].
pub struct KeyPair {
    secret_key: SecretKey,
    public_key: CompressedPublicKey,
    network: BtcNetwork,
}

impl KeyPair {
    /// Build a key pair from a raw 32-byte secret scalar.
    pub fn from_secret_bytes(secret: &[u8; 32], network: BtcNetwork) -> Result<Self, BtcError> {
        let secret_key = SecretKey::from_slice(secret)
            .map_err(|e| BtcError::InvalidPrivateKeyEncoding(format!("invalid secret key: {e}")))?;
        Ok(Self::from_secret_key(secret_key, network))
    }

    fn from_secret_key(secret_key: SecretKey, network: BtcNetwork) -> Self {
        let secp = Secp256k1::signing_only();
        let public_key = CompressedPublicKey(PublicKey::from_secret_key(&secp, &secret_key));
        Self {
            secret_key,
            public_key,
            network,
        }
    }

    /// Decode a WIF private key.
    ///
    /// The key must be encoded for `network` (mainnet vs. test networks) and
    /// flagged as compressed; uncompressed keys cannot back a P2WPKH address and
    /// are rejected for both script types so that one key maps to one pubkey.
    pub fn from_wif(wif: &str, network: BtcNetwork) -> Result<Self, BtcError> {
        let private_key = PrivateKey::from_wif(wif.trim())
            .map_err(|e| BtcError::InvalidPrivateKeyEncoding(format!("malformed WIF: {e}")))?;

        if private_key.network != network.kind() {
            return Err(BtcError::InvalidPrivateKeyEncoding(format!(
                "WIF is not encoded for {network}"
            )));
        }
        if !private_key.compressed {
            return Err(BtcError::InvalidPrivateKeyEncoding(
                "uncompressed WIF keys are not supported".into(),
            ));
        }

        Ok(Self::from_secret_key(private_key.inner, network))
    }

    /// Export the secret as a compressed WIF string for this key's network.
    pub fn to_wif(&self) -> String {
        PrivateKey::new(self.secret_key, self.network.kind()).to_wif()
    }

    pub fn public_key(&self) -> &CompressedPublicKey {
        &self.public_key
    }

    pub fn network(&self) -> BtcNetwork {
        self.network
    }

    /// Address for this key under the given script template.
    pub fn address(&self, script_type: ScriptType) -> Address {
        pubkey_to_address(&self.public_key, script_type, self.network)
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key.to_string())
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.secret_key.non_secure_erase();
    }
}
