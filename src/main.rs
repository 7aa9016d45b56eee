//! Ethereum wallet CLI
//!
//! Command-line front end over the wallet core: manage the keystore account,
//! send ether and interact with registry contracts.

use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use eth_wallet_core::config::PASSPHRASE_ENV;
use eth_wallet_core::units::format_units;
use eth_wallet_core::{
    AccountManager, Config, ContractCaller, ContractRegistry, Error, ImportPolicy, Network,
    Result, RpcChainClient,
};
use secrecy::SecretString;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "wallet")]
#[command(about = "Single-account Ethereum wallet")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured network (mainnet, sepolia, holesky)
    #[arg(short, long, global = true)]
    network: Option<String>,

    /// Keystore passphrase
    #[arg(long, global = true, env = PASSPHRASE_ENV, hide_env_values = true)]
    passphrase: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new account
    Create,

    /// Import a private key (hex with optional 0x, or decimal)
    ImportKey {
        key: String,

        /// Replace an existing account
        #[arg(long)]
        overwrite: bool,
    },

    /// Import the first account of a BIP-39 mnemonic
    ImportMnemonic {
        #[arg(required = true, num_args = 1..)]
        words: Vec<String>,
    },

    /// Import a V3 keystore JSON file
    ImportKeystore {
        path: PathBuf,

        /// Replace an existing account
        #[arg(long)]
        overwrite: bool,
    },

    /// Show the account address
    Address,

    /// Show the account balance in ether
    Balance,

    /// Send ether
    Send {
        /// Recipient address
        #[arg(long)]
        to: String,

        /// Amount in ether (e.g. 0.25)
        #[arg(long)]
        amount: String,
    },

    /// Show a token balance
    TokenBalance {
        /// Registry contract name
        #[arg(long, default_value = "bbi")]
        contract: String,

        /// Token decimals (queried from the contract when omitted)
        #[arg(long)]
        decimals: Option<u32>,
    },

    /// Transfer tokens
    TokenTransfer {
        /// Registry contract name
        #[arg(long, default_value = "bbi")]
        contract: String,

        /// Recipient address
        #[arg(long)]
        to: String,

        /// Amount in whole tokens (e.g. 12.5)
        #[arg(long)]
        amount: String,

        /// Token decimals (queried from the contract when omitted)
        #[arg(long)]
        decimals: Option<u32>,
    },

    /// Print the decrypted private key
    ExportKey,

    /// Print the V3 keystore JSON, or write it to a file
    ExportKeystore {
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Delete the account
    Delete {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore if not found)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    // Load config
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(network) = &cli.network {
        config.network = Network::from_str(network)?;
    }

    if let Commands::Config = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let passphrase = cli.passphrase.map(SecretString::from);
    let registry = Arc::new(ContractRegistry::from_config(&config.contracts)?);
    let chain = Arc::new(RpcChainClient::new(config.rpc_endpoint()?));
    let accounts = Arc::new(AccountManager::from_config(&config, chain, registry));

    tracing::debug!(
        network = config.network.name(),
        chain_id = config.chain_id(),
        keystore = %config.keystore_dir.display(),
        "Wallet ready"
    );

    run(cli.command, accounts, passphrase.as_ref()).await
}

async fn run(
    command: Commands,
    accounts: Arc<AccountManager>,
    passphrase: Option<&SecretString>,
) -> Result<()> {
    let contracts = ContractCaller::new(accounts.clone());

    match command {
        Commands::Create => {
            let account = accounts.create(require(passphrase)?)?;
            println!("{}", account.address);
        }
        Commands::ImportKey { key, overwrite } => {
            let account = accounts.import_private_key(&key, require(passphrase)?, policy(overwrite))?;
            println!("{}", account.address);
        }
        Commands::ImportMnemonic { words } => {
            // Accept the phrase as one quoted argument or as separate words
            let words: Vec<&str> = words.iter().flat_map(|w| w.split_whitespace()).collect();
            let account = accounts.import_mnemonic(&words, require(passphrase)?)?;
            println!("{}", account.address);
        }
        Commands::ImportKeystore { path, overwrite } => {
            let json = std::fs::read_to_string(&path).map_err(|e| {
                Error::InvalidArgument(format!("Failed to read {}: {}", path.display(), e))
            })?;
            let account =
                accounts.import_keystore(&json, require(passphrase)?, policy(overwrite))?;
            println!("{}", account.address);
        }
        Commands::Address => {
            println!("{}", accounts.address()?);
        }
        Commands::Balance => match accounts.balance().await? {
            Some(balance) => println!("{} ETH", balance),
            None => return Err(Error::NoAccount),
        },
        Commands::Send { to, amount } => {
            let hash = accounts
                .send_value(parse_address(&to)?, &amount, require(passphrase)?)
                .await?;
            println!("{}", hash);
        }
        Commands::TokenBalance { contract, decimals } => {
            let balance = contracts.token_balance(&contract).await?;
            let decimals = match decimals {
                Some(d) => d,
                None => contracts.token_decimals(&contract).await?.unwrap_or(18),
            };
            println!("{}", format_units(balance, decimals)?);
        }
        Commands::TokenTransfer {
            contract,
            to,
            amount,
            decimals,
        } => {
            let to = parse_address(&to)?;
            let decimals = match decimals {
                Some(d) => d,
                None => contracts.token_decimals(&contract).await?.unwrap_or(18),
            };
            let hash = contracts
                .token_transfer(&contract, to, &amount, decimals, require(passphrase)?)
                .await?;
            println!("{}", hash);
        }
        Commands::ExportKey => {
            let key = accounts.export_private_key(require(passphrase)?)?;
            println!("0x{}", key.as_str());
        }
        Commands::ExportKeystore { out } => {
            let json = accounts.export_keystore()?;
            match out {
                Some(path) => {
                    std::fs::write(&path, json).map_err(|e| {
                        Error::StorageFailure(format!("Failed to write {}: {}", path.display(), e))
                    })?;
                    tracing::info!(path = %path.display(), "Keystore exported");
                }
                None => println!("{}", json),
            }
        }
        Commands::Delete { yes } => {
            if !yes {
                return Err(Error::InvalidArgument(
                    "Refusing to delete the account without --yes".to_string(),
                ));
            }
            accounts.delete()?;
        }
        Commands::Config => {}
    }

    Ok(())
}

fn require(passphrase: Option<&SecretString>) -> Result<&SecretString> {
    passphrase.ok_or_else(|| {
        Error::InvalidArgument(format!(
            "A passphrase is required: pass --passphrase or set {}",
            PASSPHRASE_ENV
        ))
    })
}

fn policy(overwrite: bool) -> ImportPolicy {
    if overwrite {
        ImportPolicy::Overwrite
    } else {
        ImportPolicy::RejectExisting
    }
}

fn parse_address(raw: &str) -> Result<Address> {
    Address::from_str(raw.trim())
        .map_err(|e| Error::InvalidArgument(format!("Invalid address '{}': {}", raw, e)))
}
