//! Spore Demo CLI.
//!
//! Drives the orchestration core against a devnet persisted to a JSON file.
//!
//! ```text
//! spore-demo address
//! spore-demo create-cluster "My cluster" "Things I made" [--public]
//! spore-demo mint "Hello" [--content-type text/plain] [--cluster 0x..] [--margin]
//! spore-demo test-mint
//! spore-demo transfer 0x<tx_hash>:<index> ckt1... [--fee-from-margin]
//! spore-demo list [ckt1...]
//! spore-demo mine
//! spore-demo check-config
//! ```

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use spore_demo::chain::types::{OutPoint, H256};
use spore_demo::config::{load_config, validation::validate_config, SporeConfig};
use spore_demo::notify::{MemoryNotifier, Severity};
use spore_demo::observability::init_logging;
use spore_demo::orchestrator::{CreateClusterIntent, MintIntent, Orchestrator, TransactionBuilder, TransferIntent};
use spore_demo::query::{QueryCache, QueryKey, ReadModel};
use spore_demo::wallet::{Connector, KeyConnector};
use spore_demo::Devnet;

/// Cluster used by the test mint.
const TEST_CLUSTER_ID: &str = "0x263c43cc9f3969564a5e6f381665c9f38210820af3b03b861dfdcdf464559900";
/// Fee recipient used by the test mint.
const TEST_FEE_RECIPIENT: &str =
    "ckt1qzda0cr08m85hc8jlnfp3zer7xulejywt49kt2rr0vthywaa50xwsqt7flvttxlkc6demckpu7waxp7ped6ekaga6suuq";
/// 100 CKB.
const TEST_FEE_AMOUNT: u64 = 10_000_000_000;

#[derive(Parser)]
#[command(name = "spore-demo")]
#[command(about = "Mint and transfer spores on a local devnet", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults to the devnet preset)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Private key; falls back to SPORE_DEMO_PRIVATE_KEY
    #[arg(short = 'k', long)]
    private_key: Option<String>,

    /// Devnet state file (defaults to devnet.state_path)
    #[arg(short, long)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the wallet address and balance
    Address,
    /// Create a cluster
    CreateCluster {
        name: String,
        description: String,
        /// Lock with anyone-can-pay so anyone may mint into it
        #[arg(long)]
        public: bool,
    },
    /// Mint a spore
    Mint {
        content: String,
        #[arg(long, default_value = "text/plain")]
        content_type: String,
        #[arg(long)]
        cluster: Option<H256>,
        /// Keep one extra CKB in the spore to pay future transfer fees
        #[arg(long)]
        margin: bool,
        /// Recipient address (defaults to the wallet)
        #[arg(long)]
        to: Option<String>,
    },
    /// Mint "Hello, Spore!" with a 100 CKB fee payment
    TestMint,
    /// Transfer a spore
    Transfer {
        out_point: OutPoint,
        to: String,
        /// Pay the fee from the spore's capacity margin
        #[arg(long)]
        fee_from_margin: bool,
    },
    /// List spores and clusters of an address (defaults to the wallet)
    List { address: Option<String> },
    /// Commit pending transactions in a new block
    Mine,
    /// Validate the configuration and exit
    CheckConfig,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => SporeConfig::devnet(),
    };
    init_logging(&config.observability);

    if let Commands::CheckConfig = cli.command {
        return match validate_config(&config) {
            Ok(()) => {
                println!("Configuration OK (network: {})", config.network.name);
                Ok(())
            }
            Err(errors) => {
                for error in &errors {
                    eprintln!("  {}", error);
                }
                Err(format!("{} configuration error(s)", errors.len()).into())
            }
        };
    }

    let config = Arc::new(config);
    let state_path = cli
        .state
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.devnet.state_path));
    let devnet = Arc::new(Devnet::load_from_file(&state_path, config.clone())?);

    let wallet = Arc::new(match &cli.private_key {
        Some(key) => KeyConnector::from_private_key(key, config.clone())?,
        None => KeyConnector::from_env(config.clone())?,
    });
    let session = wallet.connect()?;
    if devnet.balance(&session.lock).await == 0 {
        devnet.fund_genesis(&session.lock).await;
    }

    let cache = Arc::new(QueryCache::new(config.clone()));
    let notifier = MemoryNotifier::new();
    let orchestrator = Orchestrator::new(
        TransactionBuilder::new(devnet.clone(), config.clone()),
        wallet.clone(),
        devnet.clone(),
        cache.clone(),
        Arc::new(notifier.clone()),
    );

    let outcome: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Commands::Address => {
            println!("{}", session.address);
            println!("balance: {} shannons", devnet.balance(&session.lock).await);
            Ok(())
        }
        Commands::CreateCluster { name, description, public } => {
            let intent = CreateClusterIntent { public, ..CreateClusterIntent::new(name, description, &session.address) };
            orchestrator
                .create_cluster(&intent)
                .await
                .map_err(Into::into)
                .and_then(|receipt| print_json(&receipt))
        }
        Commands::Mint { content, content_type, cluster, margin, to } => {
            let owner = to.unwrap_or_else(|| session.address.clone());
            let mut intent = MintIntent::new(content_type, content.into_bytes(), owner);
            intent.from_infos = vec![session.address.clone()];
            intent.cluster_id = cluster;
            if margin {
                intent.capacity_margin = config.fees.capacity_margin;
            }
            orchestrator
                .mint_spore(&intent)
                .await
                .map_err(Into::into)
                .and_then(|receipt| print_json(&receipt))
        }
        Commands::TestMint => {
            let mut intent = MintIntent::new("text/plain", b"Hello, Spore!".to_vec(), &session.address)
                .with_fee_payment(TEST_FEE_AMOUNT, TEST_FEE_RECIPIENT);
            let cluster_id: H256 = TEST_CLUSTER_ID.parse()?;
            if devnet.cluster(&cluster_id).await.is_some() {
                intent.cluster_id = Some(cluster_id);
            } else {
                tracing::warn!(cluster_id = %cluster_id, "Test cluster not on this chain, minting without it");
            }
            orchestrator
                .mint_spore(&intent)
                .await
                .map_err(Into::into)
                .and_then(|receipt| print_json(&receipt))
        }
        Commands::Transfer { out_point, to, fee_from_margin } => {
            let intent = TransferIntent {
                out_point,
                to,
                from_infos: vec![session.address.clone()],
                fee_from_margin,
            };
            orchestrator
                .transfer_spore(&intent)
                .await
                .map_err(Into::into)
                .and_then(|receipt| print_json(&receipt))
        }
        Commands::List { address } => {
            let address = address.unwrap_or_else(|| session.address.clone());
            let spores = cache.fetch(&QueryKey::SporesByAddress(address.clone()), devnet.as_ref()).await?;
            let clusters = cache.fetch(&QueryKey::ClustersByAddress(address), devnet.as_ref()).await?;
            print_json(&serde_json::json!({ "spores": spores, "clusters": clusters }))
        }
        Commands::Mine => {
            println!("block {}", devnet.mine_block().await);
            Ok(())
        }
        Commands::CheckConfig => Ok(()),
    };

    for notice in notifier.notices() {
        let marker = match notice.severity {
            Severity::Success => "✓",
            Severity::Warning => "!",
            Severity::Error => "✗",
        };
        match notice.link {
            Some(link) => eprintln!("{} {}: {} ({})", marker, notice.title, notice.message, link),
            None => eprintln!("{} {}: {}", marker, notice.title, notice.message),
        }
    }

    devnet.save_to_file(&state_path).await?;
    outcome
}
