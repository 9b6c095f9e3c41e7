//! Esplora REST client (blockstream.info / mempool.space compatible).

use std::time::Duration;

use async_trait::async_trait;
use chain_btc::address::parse_address;
use chain_btc::network::BtcNetwork;
use chain_btc::provider::{ChainDataProvider, ProviderError};
use chain_btc::utxo::Utxo;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct AddressInfo {
    chain_stats: ChainStats,
}

#[derive(Debug, Deserialize)]
struct ChainStats {
    funded_txo_sum: u64,
    spent_txo_sum: u64,
}

#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
}

pub struct EsploraClient {
    client: Client,
    base_url: String,
    network: BtcNetwork,
}

impl EsploraClient {
    pub fn new(base_url: &str, network: BtcNetwork, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            network,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_text(&self, path: &str) -> Result<String, ProviderError> {
        let url = self.url(path);
        debug!(%url, "esplora GET");
        let response = self.client.get(&url).send().await.map_err(transport_error)?;
        read_body(response, path).await
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    ProviderError::Unavailable(e.to_string())
}

async fn read_body(response: Response, what: &str) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(status_error(status, what, &body))
    }
}

fn status_error(status: StatusCode, what: &str, body: &str) -> ProviderError {
    if status == StatusCode::NOT_FOUND {
        ProviderError::NotFound(what.to_string())
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::Unavailable(format!("{what}: HTTP {status}"))
    } else {
        ProviderError::InvalidResponse(format!("{what}: HTTP {status}: {}", body.trim()))
    }
}

fn parse_balance(body: &str) -> Result<u64, ProviderError> {
    let info: AddressInfo = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("address stats: {e}")))?;
    Ok(info
        .chain_stats
        .funded_txo_sum
        .saturating_sub(info.chain_stats.spent_txo_sum))
}

/// Esplora does not return scripts; every UTXO of an address pays to that
/// address's script.
fn parse_utxos(body: &str, script_pubkey: &[u8]) -> Result<Vec<Utxo>, ProviderError> {
    let utxos: Vec<EsploraUtxo> = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("utxo list: {e}")))?;
    Ok(utxos
        .into_iter()
        .map(|u| Utxo {
            txid: u.txid,
            vout: u.vout,
            amount_sat: u.value,
            script_pubkey: script_pubkey.to_vec(),
            prev_tx: None,
        })
        .collect())
}

fn parse_tx_hex(body: &str) -> Result<Vec<u8>, ProviderError> {
    hex::decode(body.trim()).map_err(|e| ProviderError::InvalidResponse(format!("tx hex: {e}")))
}

#[async_trait]
impl ChainDataProvider for EsploraClient {
    async fn get_balance(&self, address: &str) -> Result<u64, ProviderError> {
        let body = self.get_text(&format!("address/{address}")).await?;
        parse_balance(&body)
    }

    async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, ProviderError> {
        let script_pubkey = parse_address(address, self.network)
            .map_err(|e| ProviderError::NotFound(e.to_string()))?
            .script_pubkey();
        let body = self.get_text(&format!("address/{address}/utxo")).await?;
        parse_utxos(&body, script_pubkey.as_bytes())
    }

    async fn get_transaction_hex(&self, txid: &str) -> Result<Vec<u8>, ProviderError> {
        let body = self.get_text(&format!("tx/{txid}/hex")).await?;
        parse_tx_hex(&body)
    }

    async fn broadcast(&self, tx_bytes: &[u8]) -> Result<String, ProviderError> {
        let url = self.url("tx");
        debug!(%url, size = tx_bytes.len(), "esplora POST");
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "text/plain")
            .body(hex::encode(tx_bytes))
            .send()
            .await
            .map_err(transport_error)?;
        Ok(read_body(response, "tx").await?.trim().to_string())
    }
}
