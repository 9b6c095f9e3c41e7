//! btc-cli: single-user Bitcoin wallet on the command line.
//!
//! Generates and restores BIP-39 wallets, queries balances through an
//! Esplora indexer, and builds, signs and broadcasts payments.

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use wallet_core::hd_derivation::DerivationPath;
use wallet_core::send::{self, FeePolicy, SendRequest};
use wallet_core::{BtcNetwork, KeyPair, ScriptType, SeedSource};

mod config;
mod esplora;

use config::Config;
use esplora::EsploraClient;

/// Bitcoin command-line wallet.
#[derive(Parser)]
#[command(name = "btc-cli")]
#[command(version, about = "Single-user Bitcoin wallet")]
struct Cli {
    /// Network (mainnet, testnet, signet). Overrides BTC_NETWORK.
    #[arg(short, long, global = true)]
    network: Option<BtcNetwork>,

    /// Esplora API base URL. Overrides ESPLORA_URL.
    #[arg(long, global = true)]
    esplora_url: Option<String>,

    /// Address type: segwit (P2WPKH) or legacy (P2PKH).
    #[arg(short = 't', long, global = true, default_value = "segwit")]
    script_type: ScriptType,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new wallet and show its mnemonic once.
    Generate(GenerateArgs),
    /// Show receive addresses for a wallet.
    Address(AddressArgs),
    /// Query the confirmed balance.
    Balance(BalanceArgs),
    /// Send a payment.
    Send(SendArgs),
    /// Export the wallet's private key as WIF.
    Export(KeyArgs),
}

#[derive(Args)]
struct GenerateArgs {
    /// Number of mnemonic words (12, 15, 18, 21 or 24).
    #[arg(short, long, default_value_t = 12)]
    words: usize,
}

/// Where the signing key comes from. Secrets are always prompted for, never
/// taken from the command line.
#[derive(Args)]
struct KeyArgs {
    /// Prompt for a WIF private key instead of a mnemonic.
    #[arg(long)]
    wif: bool,

    /// Also prompt for a BIP-39 passphrase.
    #[arg(long, conflicts_with = "wif")]
    passphrase: bool,

    /// BIP-44 account index.
    #[arg(long, default_value_t = 0)]
    account: u32,

    /// Address index within the account.
    #[arg(long, default_value_t = 0)]
    index: u32,
}

#[derive(Args)]
struct AddressArgs {
    #[command(flatten)]
    key: KeyArgs,

    /// Number of consecutive addresses to show, starting at --index.
    #[arg(short, long, default_value_t = 1)]
    count: u32,
}

#[derive(Args)]
struct BalanceArgs {
    /// Address to query. Without it the wallet's own address is used.
    address: Option<String>,

    #[command(flatten)]
    key: KeyArgs,
}

#[derive(Args)]
struct SendArgs {
    /// Destination address.
    #[arg(long)]
    to: String,

    /// Amount in satoshis.
    #[arg(long)]
    amount: u64,

    /// Flat fee in satoshis.
    #[arg(long, default_value_t = 1_000, conflicts_with = "fee_rate")]
    fee: u64,

    /// Fee rate in sat/vbyte, re-estimated per input.
    #[arg(long)]
    fee_rate: Option<u64>,

    /// Build and sign, print the hex, but do not broadcast.
    #[arg(long)]
    dry_run: bool,

    /// Broadcast without asking for confirmation.
    #[arg(short, long)]
    yes: bool,

    #[command(flatten)]
    key: KeyArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()
        .context("Failed to load configuration")?
        .with_overrides(cli.network, cli.esplora_url.clone());

    match cli.command {
        Commands::Generate(args) => generate(&config, cli.script_type, args),
        Commands::Address(args) => show_addresses(&config, cli.script_type, args),
        Commands::Balance(args) => balance(&config, cli.script_type, args).await,
        Commands::Send(args) => send_payment(&config, cli.script_type, args).await,
        Commands::Export(args) => export(&config, cli.script_type, args),
    }
}

fn generate(config: &Config, script_type: ScriptType, args: GenerateArgs) -> Result<()> {
    let wallet = wallet_core::generate_wallet(args.words, script_type, config.network)
        .context("Failed to generate wallet")?;

    println!("\n=== WALLET CREATED ===");
    println!("Network: {}", config.network);
    println!("\nMNEMONIC ({} WORDS):", args.words);
    println!("  {}", wallet.mnemonic.expose_secret());
    println!("\nWARNING: This mnemonic will NOT be shown again.");
    println!("Anyone with it can spend your funds.");
    println!("\nAddress: {}", wallet.address.address);
    if let Some(path) = &wallet.address.derivation_path {
        println!("Path:    {path}");
    }
    println!("WIF:     {}", wallet.wif.expose_secret());
    Ok(())
}

fn show_addresses(config: &Config, script_type: ScriptType, args: AddressArgs) -> Result<()> {
    if args.key.wif {
        let key = load_key(config, script_type, &args.key)?;
        println!("{}", key.address(script_type));
        return Ok(());
    }

    let source = prompt_seed_source(&args.key)?;
    for index in args.key.index..args.key.index.saturating_add(args.count) {
        let key = wallet_core::derive_key_pair(&source, script_type, config.network, args.key.account, index)
            .context("Failed to derive key")?;
        let path = DerivationPath::for_wallet(script_type, config.network, args.key.account, index);
        println!("{:<20} {}", path.to_string(), key.address(script_type));
    }
    Ok(())
}

async fn balance(config: &Config, script_type: ScriptType, args: BalanceArgs) -> Result<()> {
    let address = match args.address {
        Some(address) => {
            if !wallet_core::validate_address(&address, config.network)? {
                bail!("{address} is not a {} address", config.network);
            }
            address
        }
        None => load_key(config, script_type, &args.key)?
            .address(script_type)
            .to_string(),
    };

    let provider = provider(config)?;
    let balance = send::get_balance(&provider, &address)
        .await
        .context("Failed to fetch balance")?;

    println!("Address: {address}");
    println!("Balance: {} sat ({:.8} BTC)", balance, balance as f64 / 100_000_000.0);
    Ok(())
}

async fn send_payment(config: &Config, script_type: ScriptType, args: SendArgs) -> Result<()> {
    if !wallet_core::validate_address(&args.to, config.network)? {
        bail!("{} is not a {} address", args.to, config.network);
    }
    let key = load_key(config, script_type, &args.key)?;
    let provider = provider(config)?;

    let fee = match args.fee_rate {
        Some(rate) => FeePolicy::Rate(rate),
        None => FeePolicy::Fixed(args.fee),
    };
    let request = SendRequest {
        destination: args.to.clone(),
        amount_sat: args.amount,
        fee,
    };

    let prepared = send::prepare_send(&provider, &key, script_type, &request)
        .await
        .context("Failed to build transaction")?;

    println!("\n=== TRANSACTION READY ===");
    println!("From:   {}", key.address(script_type));
    println!("To:     {}", args.to);
    println!("Amount: {} sat", args.amount);
    println!("Fee:    {} sat", prepared.selection.fee_sat);
    if prepared.selection.change_sat > 0 {
        println!("Change: {} sat", prepared.selection.change_sat);
    }
    println!("Inputs: {}", prepared.selection.selected.len());
    println!("TxID:   {}", prepared.transaction.txid);

    if args.dry_run {
        println!("\n{}", prepared.transaction.to_hex());
        return Ok(());
    }
    if !args.yes && !confirm("Broadcast this transaction?")? {
        println!("Aborted.");
        return Ok(());
    }

    let receipt = send::broadcast(&provider, prepared)
        .await
        .context("Failed to broadcast transaction")?;

    println!("\n=== TRANSACTION SENT ===");
    println!("TxID: {}", receipt.txid);
    Ok(())
}

fn export(config: &Config, script_type: ScriptType, args: KeyArgs) -> Result<()> {
    let key = load_key(config, script_type, &args)?;
    let wif = wallet_core::export_wif(&key);
    println!("Address: {}", key.address(script_type));
    println!("WIF:     {}", wif.expose_secret());
    Ok(())
}

fn provider(config: &Config) -> Result<EsploraClient> {
    EsploraClient::new(&config.esplora_base(), config.network, config.http_timeout)
        .context("Failed to create Esplora client")
}

fn load_key(config: &Config, script_type: ScriptType, args: &KeyArgs) -> Result<KeyPair> {
    if args.wif {
        let wif = prompt_secret("WIF private key")?;
        let (key, _) = wallet_core::import_wif(wif.expose_secret(), script_type, config.network)
            .context("Failed to import WIF")?;
        return Ok(key);
    }

    let source = prompt_seed_source(args)?;
    wallet_core::derive_key_pair(&source, script_type, config.network, args.account, args.index)
        .context("Failed to derive key")
}

fn prompt_seed_source(args: &KeyArgs) -> Result<SeedSource> {
    let phrase = prompt_secret("Mnemonic")?;
    let passphrase = if args.passphrase {
        prompt_secret("BIP-39 passphrase")?
    } else {
        SecretString::from(String::new())
    };
    if !wallet_core::validate_mnemonic(phrase.expose_secret().trim()) {
        bail!("Invalid mnemonic: unknown word or bad checksum");
    }
    Ok(SeedSource::mnemonic(
        phrase.expose_secret().trim(),
        passphrase.expose_secret(),
    ))
}

/// Prompt for a secret without echo.
fn prompt_secret(prompt: &str) -> Result<SecretString> {
    rpassword::prompt_password(format!("{prompt}: "))
        .map(SecretString::from)
        .with_context(|| format!("Failed to read {prompt}"))
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
