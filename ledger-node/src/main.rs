use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use weave_common::{Share, Transaction};
use weave_node::{ConfigOverrides, LedgerNode, NodeConfig};

#[derive(Parser)]
#[command(name = "weave-node")]
#[command(about = "DAG ledger node with Merkle commitments and threshold key sharing")]
struct Args {
    /// TOML configuration file; missing files fall back to defaults
    #[arg(short, long, default_value = "weave.toml")]
    config: PathBuf,

    /// Overrides RUST_LOG and the configured filter
    #[arg(long)]
    log_filter: Option<String>,

    /// Collections to host, comma separated
    #[arg(long, value_delimiter = ',')]
    collections: Option<Vec<String>>,

    /// Use proof-of-work consensus with this difficulty
    #[arg(long)]
    difficulty: Option<usize>,

    #[arg(long)]
    threshold: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Queue a JSON array of transactions on a ledger and drain the mempool
    Ingest {
        #[arg(long)]
        transactions: PathBuf,
        /// Defaults to the first configured collection
        #[arg(long)]
        ledger: Option<String>,
    },
    /// Split a decimal secret into shares
    Split {
        #[arg(long)]
        secret: String,
        #[arg(long)]
        shares: u32,
    },
    /// Reconstruct a secret from a JSON array of shares
    Combine {
        #[arg(long)]
        shares: PathBuf,
    },
}

/// Ingest input: a transaction plus the ids it should be linked under
#[derive(Deserialize)]
struct IngestRecord {
    #[serde(flatten)]
    transaction: Transaction,
    #[serde(default)]
    parents: Vec<String>,
}

/// Shares travel as decimal strings
#[derive(Serialize, Deserialize)]
struct ShareRecord {
    index: u32,
    value: String,
}

fn init_logging(cli_filter: Option<&str>, config: &NodeConfig) {
    let filter = match cli_filter {
        Some(filter) => EnvFilter::new(filter),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = NodeConfig::load(
        Some(args.config.as_path()),
        ConfigOverrides {
            collections: args.collections,
            difficulty: args.difficulty,
            threshold: args.threshold,
            log_filter: None,
        },
    )?;
    init_logging(args.log_filter.as_deref(), &config);

    let mut node = LedgerNode::from_config(config)?;
    info!(ledgers = ?node.ledger_names().collect::<Vec<_>>(), "starting weave node");

    match args.command {
        Command::Ingest { transactions, ledger } => {
            let raw = std::fs::read_to_string(&transactions)
                .with_context(|| format!("failed to read {}", transactions.display()))?;
            let records: Vec<IngestRecord> = serde_json::from_str(&raw).context("invalid transaction JSON")?;

            let ledger_name = match ledger.or_else(|| node.default_ledger_name().map(str::to_string)) {
                Some(name) => name,
                None => bail!("no ledger configured"),
            };

            let mut links = Vec::new();
            let mut queued = Vec::with_capacity(records.len());
            for record in records {
                for parent in record.parents {
                    links.push((parent, record.transaction.id().to_string()));
                }
                queued.push(record.transaction);
            }

            let report = node.ingest(&ledger_name, queued).await?;

            // Admission resets parent sets, so links are recorded afterwards
            let graph = node.ledger_mut(&ledger_name)?;
            for (parent, child) in &links {
                if graph.get_transaction(child).is_some() {
                    graph.add_parent_child(parent, child);
                }
            }
            let graph = node.ledger(&ledger_name)?;
            let output = serde_json::json!({
                "ledger": ledger_name,
                "admitted": report.admitted,
                "rejected": report.rejected,
                "dead_lettered": report.dead_lettered,
                "dropped": report.dropped,
                "valid": graph.is_valid(),
                "local_root": graph.commitment_tree().read().root_hash(),
                "global_root": node.global_root_hash(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Split { secret, shares } => {
            let secret = BigUint::parse_bytes(secret.as_bytes(), 10).context("secret must be a decimal integer")?;
            let shares = node.key_manager().distribute_key(&secret, shares)?;
            let records: Vec<ShareRecord> = shares
                .into_iter()
                .map(|share| ShareRecord {
                    index: share.index,
                    value: share.value.to_str_radix(10),
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Combine { shares } => {
            let raw = std::fs::read_to_string(&shares)
                .with_context(|| format!("failed to read {}", shares.display()))?;
            let records: Vec<ShareRecord> = serde_json::from_str(&raw).context("invalid share JSON")?;
            let shares = records
                .into_iter()
                .map(|record| {
                    BigUint::parse_bytes(record.value.as_bytes(), 10)
                        .map(|value| Share::new(record.index, value))
                        .with_context(|| format!("share {} is not a decimal integer", record.index))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            let secret = node.key_manager().reconstruct_key(&shares)?;
            println!("{}", secret);
        }
    }

    Ok(())
}
