//! Cession relay daemon
//!
//! Connects to MongoDB and NATS, then drains the contract queues until
//! interrupted.

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cession_relay::{
    config::Args,
    db::{MongoClient, MongoDedupLedger, MongoHistoryLog, MongoOwnershipLedger},
    logging::PipelineLogger,
    messaging::{MessagePublisher, MessageRouter, DEAD_LETTER_EXCHANGE},
    nats::{JetStreamTransport, NatsClient},
    pipeline::{ContractOrchestrator, Ledgers},
    worker::{ContractConsumer, Dispatcher},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("cession_relay={},info", args.log_level).into());
    tracing_subscriber::registry()
        .with(filter)
        .with(args.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.log_json).then(tracing_subscriber::fmt::layer))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let resolver = Arc::new(args.resolver());
    let mut destinations: Vec<&str> = resolver.destinations().collect();
    destinations.sort_unstable();

    info!("======================================");
    info!("  Cession Relay");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("NATS: {}", args.nats.nats_url);
    info!("MongoDB: {}", args.mongodb_uri);
    info!(
        "Routing keys: {} (fallback: {})",
        destinations.join(", "),
        resolver.fallback()
    );
    info!(
        "Retry: max {} deliveries, {}ms delay",
        args.max_deliver, args.retry_delay_ms
    );
    info!("Stream retention: {}s", args.stream_max_age_secs);
    info!("======================================");

    let logger = PipelineLogger::new(args.node_id.to_string());
    if let Some(ref path) = args.pipeline_log_path {
        if let Err(e) = logger.init_file(path.clone()).await {
            warn!("Pipeline event log disabled: {}", e);
        }
    }

    let ledgers = match connect_ledgers(&args).await {
        Ok(ledgers) => {
            info!("MongoDB connected successfully");
            ledgers
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, using in-memory ledgers): {}", e);
                Ledgers::in_memory()
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let nats = match NatsClient::new(&args.nats, &format!("cession-relay-{}", args.node_id)).await
    {
        Ok(client) => client
            .with_timeout(args.operation_timeout())
            .with_stream_max_age(args.stream_max_age()),
        Err(e) => {
            error!("NATS connection failed: {}", e);
            std::process::exit(1);
        }
    };
    nats.ensure_streams().await?;
    info!("NATS client {} ready", nats.name());

    let transport = Arc::new(JetStreamTransport::new(nats.clone()));
    let router = MessageRouter::new(transport.clone(), resolver);
    let orchestrator = Arc::new(ContractOrchestrator::new(ledgers, router, logger.clone()));

    let dead_letters = MessagePublisher::new(transport, DEAD_LETTER_EXCHANGE);
    info!("Dead letters go to the {} exchange", dead_letters.exchange());

    let consumer = ContractConsumer::new(
        args.consumer_config(),
        nats.jetstream().clone(),
        Arc::new(Dispatcher::new(orchestrator)),
        dead_letters,
        logger,
    );

    let runner = consumer.clone();
    let mut consumer_handle = tokio::spawn(async move {
        if let Err(e) = runner.run().await {
            error!("Consumer error: {}", e);
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            consumer.stop().await;
            if let Err(e) = (&mut consumer_handle).await {
                error!("Consumer task error: {}", e);
            }
        }
        result = &mut consumer_handle => {
            if let Err(e) = result {
                error!("Consumer task error: {}", e);
            }
        }
    }

    if let Err(e) = nats.flush().await {
        warn!("Failed to flush NATS connection: {}", e);
    }

    info!("Relay shut down");
    Ok(())
}

async fn connect_ledgers(args: &Args) -> cession_relay::Result<Ledgers> {
    let client = MongoClient::new(&args.mongodb_uri, &args.mongodb_db, args.operation_timeout()).await?;
    info!("Using MongoDB database {}", client.db_name());

    Ok(Ledgers {
        dedup: Arc::new(MongoDedupLedger::new(&client).await?),
        ownership: Arc::new(MongoOwnershipLedger::new(&client).await?),
        history: Arc::new(MongoHistoryLog::new(&client).await?),
    })
}
