//! Relay Submit - operator CLI for the cession relay
//!
//! Publishes contract submissions, offers and eligibility verdicts onto the
//! contracts exchange, dispatches attachment updates and prints a contract's
//! history.
//!
//! Usage:
//!   relay-submit insert --cedente bankA contract.json
//!   relay-submit offer --cedente bankB offer.json
//!   relay-submit eligibility --contract 123 --ccb 456 --assignee bankB --eligible true
//!   relay-submit attachments <duplicity-hash> attachments.json
//!   relay-submit history <duplicity-hash>

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cession_relay::{
    config::NatsArgs,
    db::{MongoClient, MongoHistoryLog},
    domain::{ContractDocument, ContractNumber, EligibilityVerdict},
    ledger::HistoryLog,
    logging::PipelineLogger,
    nats::{JetStreamTransport, NatsClient},
    pipeline::{AttachmentFanout, ContractSubmitter},
};

#[derive(Parser, Debug)]
#[command(name = "relay-submit")]
#[command(about = "Submit contracts and inspect their history")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    nats: NatsArgs,

    /// MongoDB connection URI (attachments and history)
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "cession_relay")]
    mongodb_db: String,

    /// Timeout for every store and broker call, in milliseconds
    #[arg(long, env = "OPERATION_TIMEOUT_MS", default_value = "10000")]
    operation_timeout_ms: u64,

    /// How long the router, attachments and dead-letter streams keep messages, in seconds
    #[arg(long, env = "STREAM_MAX_AGE_SECS", default_value = "604800")]
    stream_max_age_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a new contract
    Insert {
        /// Party submitting the contract
        #[arg(long)]
        cedente: String,
        /// Contract document (JSON)
        file: PathBuf,
    },
    /// Offer a held contract to the document's `cessionario`
    Offer {
        /// Current holder making the offer
        #[arg(long)]
        cedente: String,
        /// Contract document (JSON)
        file: PathBuf,
    },
    /// Publish an eligibility verdict
    Eligibility {
        #[arg(long)]
        contract: String,
        #[arg(long)]
        ccb: String,
        #[arg(long)]
        assignee: String,
        #[arg(long, action = clap::ArgAction::Set)]
        eligible: bool,
    },
    /// Send attachment updates to every party that received a contract
    Attachments {
        duplicity_hash: String,
        /// Attachment payload (JSON with an `anexos` array)
        file: PathBuf,
    },
    /// Print the history of a contract
    History { duplicity_hash: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_millis(cli.operation_timeout_ms);

    match cli.command {
        Command::Insert { ref cedente, ref file } => {
            let submitter = submitter(&cli, timeout).await?;
            let hashes = submitter.submit_insert(read_document(file)?, cedente).await?;
            submitter.close().await?;
            info!("Submitted insert");
            println!("{}", hashes.duplicity);
        }
        Command::Offer { ref cedente, ref file } => {
            let submitter = submitter(&cli, timeout).await?;
            let hashes = submitter.submit_offer(read_document(file)?, cedente).await?;
            submitter.close().await?;
            info!("Submitted offer");
            println!("{}", hashes.duplicity);
        }
        Command::Eligibility {
            ref contract,
            ref ccb,
            ref assignee,
            eligible,
        } => {
            let verdict = EligibilityVerdict {
                contract_number: ContractNumber::from(contract.as_str()),
                ccb_number: ContractNumber::from(ccb.as_str()),
                assignee: assignee.clone(),
                eligible,
            };
            let submitter = submitter(&cli, timeout).await?;
            submitter.submit_eligibility(&verdict).await?;
            submitter.close().await?;
            println!("{}", verdict.duplicity_hash());
        }
        Command::Attachments {
            ref duplicity_hash,
            ref file,
        } => {
            let payload = read_json(file)?;
            let history = history_log(&cli, timeout).await?;
            let nats = nats_client(&cli, timeout).await?;

            let fanout = AttachmentFanout::new(
                history,
                Arc::new(JetStreamTransport::new(nats.clone())),
                PipelineLogger::new("relay-submit"),
            );
            for party in fanout.dispatch(duplicity_hash, payload).await? {
                println!("{}", party);
            }
            nats.flush().await?;
        }
        Command::History { ref duplicity_hash } => {
            let history = history_log(&cli, timeout).await?;
            let entries = history.history(duplicity_hash).await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }

    Ok(())
}

async fn nats_client(cli: &Cli, timeout: Duration) -> anyhow::Result<NatsClient> {
    let client = NatsClient::new(&cli.nats, "relay-submit")
        .await?
        .with_timeout(timeout)
        .with_stream_max_age(Duration::from_secs(cli.stream_max_age_secs));
    client.ensure_streams().await?;
    Ok(client)
}

async fn submitter(cli: &Cli, timeout: Duration) -> anyhow::Result<ContractSubmitter> {
    let client = nats_client(cli, timeout).await?;
    Ok(ContractSubmitter::new(Arc::new(JetStreamTransport::new(client))))
}

async fn history_log(cli: &Cli, timeout: Duration) -> anyhow::Result<Arc<dyn HistoryLog>> {
    let client = MongoClient::new(&cli.mongodb_uri, &cli.mongodb_db, timeout).await?;
    Ok(Arc::new(MongoHistoryLog::new(&client).await?))
}

fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn read_document(path: &Path) -> anyhow::Result<ContractDocument> {
    Ok(ContractDocument::from_value(read_json(path)?)?)
}
