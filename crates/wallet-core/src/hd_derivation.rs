use std::fmt;
use std::str::FromStr;

use bip32::{ChildNumber, Prefix, XPrv, XPub};
use chain_btc::address::ScriptType;
use chain_btc::keys::KeyPair;
use chain_btc::network::BtcNetwork;
use zeroize::Zeroize;

use crate::error::WalletError;

/// Hardened child indices start here.
const HARDENED_OFFSET: u32 = 0x8000_0000;

/// One level of a BIP-32 derivation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PathStep {
    pub index: u32,
    pub hardened: bool,
}

impl PathStep {
    pub fn normal(index: u32) -> Self {
        Self {
            index,
            hardened: false,
        }
    }

    pub fn hardened(index: u32) -> Self {
        Self {
            index,
            hardened: true,
        }
    }

    fn child_number(self) -> Result<ChildNumber, WalletError> {
        ChildNumber::new(self.index, self.hardened)
            .map_err(|e| WalletError::DerivationFailed(format!("invalid child index {self}: {e}")))
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hardened {
            write!(f, "{}'", self.index)
        } else {
            write!(f, "{}", self.index)
        }
    }
}

/// Ordered list of steps from the master key, e.g. `m/84'/0'/0'/0/0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DerivationPath(Vec<PathStep>);

impl DerivationPath {
    pub fn new(steps: Vec<PathStep>) -> Self {
        Self(steps)
    }

    /// BIP-44 / BIP-84 receive path: `m/purpose'/coin'/account'/0/index`.
    ///
    /// Purpose follows the script type (44 legacy, 84 native SegWit) and the
    /// coin type follows the network (0 mainnet, 1 test networks).
    pub fn for_wallet(
        script_type: ScriptType,
        network: BtcNetwork,
        account: u32,
        index: u32,
    ) -> Self {
        Self(vec![
            PathStep::hardened(script_type.purpose()),
            PathStep::hardened(network.coin_type()),
            PathStep::hardened(account),
            PathStep::normal(0),
            PathStep::normal(index),
        ])
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.0
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for step in &self.0 {
            write!(f, "/{step}")?;
        }
        Ok(())
    }
}

impl FromStr for DerivationPath {
    type Err = WalletError;

    /// Parse "m/44'/0'/0'/0/0". Both `'` and `h` mark a hardened step.
    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let rest = match path.trim() {
            "m" => return Ok(Self::default()),
            p => p
                .strip_prefix("m/")
                .ok_or_else(|| WalletError::DerivationFailed("Path must start with m/".into()))?,
        };

        rest.split('/')
            .map(|component| {
                let (num_str, hardened) = match component
                    .strip_suffix('\'')
                    .or_else(|| component.strip_suffix('h'))
                {
                    Some(stripped) => (stripped, true),
                    None => (component, false),
                };
                let index = num_str.parse::<u32>().map_err(|e| {
                    WalletError::DerivationFailed(format!("Invalid path component {component:?}: {e}"))
                })?;
                if index >= HARDENED_OFFSET {
                    return Err(WalletError::DerivationFailed(format!(
                        "Path component {component:?} out of range"
                    )));
                }
                Ok(PathStep { index, hardened })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

/// A BIP-32 extended private key (secret scalar + chain code + position).
#[derive(Clone)]
pub struct ExtendedKey {
    xprv: XPrv,
}

impl ExtendedKey {
    /// Master key from a BIP-39 (or raw) seed of 16 to 64 bytes.
    pub fn from_seed(seed: &[u8]) -> Result<Self, WalletError> {
        if !(16..=64).contains(&seed.len()) {
            return Err(WalletError::InvalidSeed(format!(
                "seed must be 16 to 64 bytes, got {}",
                seed.len()
            )));
        }
        let xprv = XPrv::new(seed).map_err(|e| WalletError::InvalidSeed(e.to_string()))?;
        Ok(Self { xprv })
    }

    /// Derive a single child. Pure: the parent is left untouched.
    pub fn derive_child(&self, step: PathStep) -> Result<Self, WalletError> {
        let xprv = self
            .xprv
            .derive_child(step.child_number()?)
            .map_err(|e| WalletError::DerivationFailed(format!("step {step}: {e}")))?;
        Ok(Self { xprv })
    }

    /// Derive along a whole path by folding [`derive_child`](Self::derive_child).
    pub fn derive_path(&self, path: &DerivationPath) -> Result<Self, WalletError> {
        path.steps()
            .iter()
            .try_fold(self.clone(), |key, step| key.derive_child(*step))
    }

    pub fn depth(&self) -> u8 {
        self.xprv.attrs().depth
    }

    pub fn chain_code(&self) -> [u8; 32] {
        self.xprv.attrs().chain_code
    }

    pub fn parent_fingerprint(&self) -> [u8; 4] {
        self.xprv.attrs().parent_fingerprint
    }

    /// The step this key was derived at; `normal(0)` for the master key.
    pub fn child_number(&self) -> PathStep {
        let child = self.xprv.attrs().child_number;
        PathStep {
            index: child.index(),
            hardened: child.is_hardened(),
        }
    }

    /// Drop the private half.
    pub fn neuter(&self) -> ExtendedPublicKey {
        ExtendedPublicKey {
            xpub: self.xprv.public_key(),
        }
    }

    /// The key pair at this node, bound to `network`.
    pub fn to_key_pair(&self, network: BtcNetwork) -> Result<KeyPair, WalletError> {
        let mut secret: [u8; 32] = self.xprv.to_bytes().into();
        let key_pair = KeyPair::from_secret_bytes(&secret, network);
        secret.zeroize();
        Ok(key_pair?)
    }
}

impl fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedKey")
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

/// A BIP-32 extended public key. Can only derive non-hardened children.
#[derive(Clone)]
pub struct ExtendedPublicKey {
    xpub: XPub,
}

impl ExtendedPublicKey {
    pub fn derive_child(&self, step: PathStep) -> Result<Self, WalletError> {
        if step.hardened {
            return Err(WalletError::DerivationFailed(format!(
                "cannot derive hardened step {step} from a public key"
            )));
        }
        let xpub = self
            .xpub
            .derive_child(step.child_number()?)
            .map_err(|e| WalletError::DerivationFailed(format!("step {step}: {e}")))?;
        Ok(Self { xpub })
    }

    /// Compressed SEC1 public key.
    pub fn public_key_bytes(&self) -> [u8; 33] {
        self.xpub.to_bytes()
    }

    pub fn depth(&self) -> u8 {
        self.xpub.attrs().depth
    }

    /// Base58 `xpub...` (mainnet) or `tpub...` (test networks).
    pub fn to_extended_string(&self, network: BtcNetwork) -> String {
        let prefix = match network {
            BtcNetwork::Mainnet => Prefix::XPUB,
            BtcNetwork::Testnet | BtcNetwork::Signet => Prefix::TPUB,
        };
        self.xpub.to_string(prefix)
    }
}

impl fmt::Debug for ExtendedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedPublicKey")
            .field("depth", &self.depth())
            .field("public_key", &hex::encode(self.public_key_bytes()))
            .finish()
    }
}

/// Derive the key pair at `path` from a seed.
pub fn derive_key_pair(
    seed: &[u8],
    path: &DerivationPath,
    network: BtcNetwork,
) -> Result<KeyPair, WalletError> {
    ExtendedKey::from_seed(seed)?
        .derive_path(path)?
        .to_key_pair(network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mnemonic::mnemonic_to_seed;

    // BIP-39 test vector: "abandon" x11 + "about"
    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn test_seed() -> [u8; 64] {
        *mnemonic_to_seed(TEST_MNEMONIC, "").unwrap()
    }

    #[test]
    fn test_wallet_paths() {
        assert_eq!(
            DerivationPath::for_wallet(ScriptType::P2wpkh, BtcNetwork::Mainnet, 0, 0).to_string(),
            "m/84'/0'/0'/0/0"
        );
        assert_eq!(
            DerivationPath::for_wallet(ScriptType::P2pkh, BtcNetwork::Testnet, 2, 7).to_string(),
            "m/44'/1'/2'/0/7"
        );
    }

    #[test]
    fn test_parse_derivation_path() {
        let path: DerivationPath = "m/44'/60h/0'/0/5".parse().unwrap();
        assert_eq!(
            path.steps(),
            &[
                PathStep::hardened(44),
                PathStep::hardened(60),
                PathStep::hardened(0),
                PathStep::normal(0),
                PathStep::normal(5),
            ]
        );
        assert_eq!(path.to_string(), "m/44'/60'/0'/0/5");
    }

    #[test]
    fn test_parse_rejects_bad_paths() {
        for bad in ["44'/0'", "m/abc", "m/", "m/2147483648", "m//0"] {
            assert!(bad.parse::<DerivationPath>().is_err(), "accepted {bad:?}");
        }
        assert!("m".parse::<DerivationPath>().unwrap().steps().is_empty());
    }

    #[test]
    fn test_bip84_vector() {
        let path = DerivationPath::for_wallet(ScriptType::P2wpkh, BtcNetwork::Mainnet, 0, 0);
        let kp = derive_key_pair(&test_seed(), &path, BtcNetwork::Mainnet).unwrap();
        assert_eq!(
            kp.address(ScriptType::P2wpkh).to_string(),
            "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu"
        );
        assert_eq!(kp.to_wif(), "KyZpNDKnfs94vbrwhJneDi77V6jF64PWPF8x5cdJb8ifgg2DUc9d");
    }

    #[test]
    fn test_bip44_vector() {
        let path = DerivationPath::for_wallet(ScriptType::P2pkh, BtcNetwork::Mainnet, 0, 0);
        let kp = derive_key_pair(&test_seed(), &path, BtcNetwork::Mainnet).unwrap();
        assert_eq!(
            kp.address(ScriptType::P2pkh).to_string(),
            "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA"
        );
    }

    #[test]
    fn test_child_number_tracks_last_step() {
        let master = ExtendedKey::from_seed(&test_seed()).unwrap();
        assert_eq!(master.child_number(), PathStep::normal(0));

        let account = master.derive_child(PathStep::hardened(84)).unwrap();
        assert_eq!(account.child_number(), PathStep::hardened(84));

        let path = DerivationPath::for_wallet(ScriptType::P2wpkh, BtcNetwork::Mainnet, 0, 5);
        let leaf = master.derive_path(&path).unwrap();
        assert_eq!(leaf.child_number(), PathStep::normal(5));
        assert_eq!(leaf.depth(), 5);
    }

    #[test]
    fn test_derivation_deterministic() {
        let path = DerivationPath::for_wallet(ScriptType::P2wpkh, BtcNetwork::Mainnet, 0, 3);
        let a = derive_key_pair(&test_seed(), &path, BtcNetwork::Mainnet).unwrap();
        let b = derive_key_pair(&test_seed(), &path, BtcNetwork::Mainnet).unwrap();
        assert_eq!(a.public_key(), b.public_key());
        assert_eq!(a.to_wif(), b.to_wif());
    }

    #[test]
    fn test_different_accounts_different_keys() {
        let seed = test_seed();
        let a = derive_key_pair(
            &seed,
            &DerivationPath::for_wallet(ScriptType::P2wpkh, BtcNetwork::Mainnet, 0, 0),
            BtcNetwork::Mainnet,
        )
        .unwrap();
        let b = derive_key_pair(
            &seed,
            &DerivationPath::for_wallet(ScriptType::P2wpkh, BtcNetwork::Mainnet, 1, 0),
            BtcNetwork::Mainnet,
        )
        .unwrap();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_derive_path_matches_stepwise() {
        let master = ExtendedKey::from_seed(&test_seed()).unwrap();
        let path: DerivationPath = "m/84'/0'/0'".parse().unwrap();
        let folded = master.derive_path(&path).unwrap();
        let stepwise = master
            .derive_child(PathStep::hardened(84))
            .unwrap()
            .derive_child(PathStep::hardened(0))
            .unwrap()
            .derive_child(PathStep::hardened(0))
            .unwrap();
        assert_eq!(folded.chain_code(), stepwise.chain_code());
        assert_eq!(folded.depth(), 3);
        assert_eq!(master.depth(), 0);
    }

    #[test]
    fn test_public_derivation_matches_private() {
        let account = ExtendedKey::from_seed(&test_seed())
            .unwrap()
            .derive_path(&"m/84'/0'/0'".parse().unwrap())
            .unwrap();
        let from_private = account
            .derive_child(PathStep::normal(0))
            .unwrap()
            .derive_child(PathStep::normal(4))
            .unwrap()
            .neuter();
        let from_public = account
            .neuter()
            .derive_child(PathStep::normal(0))
            .unwrap()
            .derive_child(PathStep::normal(4))
            .unwrap();
        assert_eq!(from_private.public_key_bytes(), from_public.public_key_bytes());
    }

    #[test]
    fn test_public_hardened_derivation_rejected() {
        let master = ExtendedKey::from_seed(&test_seed()).unwrap();
        let result = master.neuter().derive_child(PathStep::hardened(0));
        assert!(matches!(result, Err(WalletError::DerivationFailed(_))));
    }

    #[test]
    fn test_account_xpub_prefix() {
        let account = ExtendedKey::from_seed(&test_seed())
            .unwrap()
            .derive_path(&"m/84'/0'/0'".parse().unwrap())
            .unwrap();
        assert!(account.neuter().to_extended_string(BtcNetwork::Mainnet).starts_with("xpub"));
        assert!(account.neuter().to_extended_string(BtcNetwork::Testnet).starts_with("tpub"));
    }

    #[test]
    fn test_seed_length_checked() {
        assert!(matches!(ExtendedKey::from_seed(&[1u8; 15]), Err(WalletError::InvalidSeed(_))));
        assert!(matches!(ExtendedKey::from_seed(&[1u8; 65]), Err(WalletError::InvalidSeed(_))));
        assert!(ExtendedKey::from_seed(&[1u8; 16]).is_ok());
    }

    #[test]
    fn test_debug_hides_secret() {
        let master = ExtendedKey::from_seed(&test_seed()).unwrap();
        let debug = format!("{master:?}");
        assert!(!debug.contains(&hex::encode(master.chain_code())));
    }
}
