//! CLI configuration loaded from environment variables.
//!
//! Command-line flags take precedence over everything read here.

use std::time::Duration;

use anyhow::{Context, Result};
use chain_btc::network::BtcNetwork;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Network the wallet operates on.
    pub network: BtcNetwork,
    /// Explicit Esplora base URL. `None` means the network's default.
    pub esplora_url: Option<String>,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// - `BTC_NETWORK`: mainnet, testnet or signet (default mainnet)
    /// - `ESPLORA_URL`: Esplora API base URL (default per network)
    /// - `BTC_HTTP_TIMEOUT_SECS`: request timeout in seconds (default 30)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let network = match get("BTC_NETWORK") {
            Some(raw) => raw
                .parse::<BtcNetwork>()
                .context("BTC_NETWORK must be mainnet, testnet or signet")?,
            None => BtcNetwork::default(),
        };

        let esplora_url = get("ESPLORA_URL").filter(|url| !url.trim().is_empty());

        let timeout_secs: u64 = get("BTC_HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|| "30".to_string())
            .parse()
            .context("BTC_HTTP_TIMEOUT_SECS must be a positive integer")?;
        if timeout_secs == 0 {
            anyhow::bail!("BTC_HTTP_TIMEOUT_SECS must be greater than zero");
        }

        Ok(Config {
            network,
            esplora_url,
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, network: Option<BtcNetwork>, esplora_url: Option<String>) -> Self {
        if let Some(network) = network {
            self.network = network;
        }
        if let Some(url) = esplora_url {
            self.esplora_url = Some(url);
        }
        self
    }

    /// Esplora base URL without a trailing slash.
    pub fn esplora_base(&self) -> String {
        self.esplora_url
            .as_deref()
            .unwrap_or(self.network.default_rpc_url())
            .trim_end_matches('/')
            .to_string()
    }
}
