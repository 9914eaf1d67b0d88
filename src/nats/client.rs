//! NATS JetStream client wrapper
//!
//! Connection management plus the durable streams that back each exchange.

use async_nats::jetstream::{self, stream::RetentionPolicy, stream::StorageType};
use async_nats::{Client, ConnectOptions};
use std::time::Duration;
use tracing::info;

use crate::config::NatsArgs;
use crate::messaging::{
    ATTACHMENTS_EXCHANGE, CONTRACTS_EXCHANGE, DEAD_LETTER_EXCHANGE, ROUTER_EXCHANGE,
};
use crate::types::{RelayError, Result};

/// Default timeout for broker operations
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Default age after which routed, attachment and dead-lettered messages expire
pub const DEFAULT_STREAM_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default ping interval for keep-alive
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

/// Durable stream backing one exchange
#[derive(Debug, Clone, Copy)]
pub struct StreamDef {
    pub name: &'static str,
    pub exchange: &'static str,
    /// Work-queue streams drop a message once it is acked
    pub work_queue: bool,
}

impl StreamDef {
    /// Server-side configuration for this stream
    ///
    /// Work-queue streams are bounded by acks; every other stream keeps
    /// messages for at most `max_age`.
    pub fn config(&self, max_age: Duration) -> jetstream::stream::Config {
        let (retention, max_age) = if self.work_queue {
            (RetentionPolicy::WorkQueue, Duration::ZERO)
        } else {
            (RetentionPolicy::Limits, max_age)
        };

        jetstream::stream::Config {
            name: self.name.to_string(),
            subjects: vec![format!("{}.>", self.exchange)],
            retention,
            max_age,
            storage: StorageType::File,
            ..Default::default()
        }
    }
}

/// Stream holding the inbound contract queues
pub const CONTRACTS_STREAM: &str = "CONTRACTS";

pub const STREAMS: [StreamDef; 4] = [
    StreamDef {
        name: CONTRACTS_STREAM,
        exchange: CONTRACTS_EXCHANGE,
        work_queue: true,
    },
    StreamDef {
        name: "ROUTER",
        exchange: ROUTER_EXCHANGE,
        work_queue: false,
    },
    StreamDef {
        name: "ATTACHMENTS",
        exchange: ATTACHMENTS_EXCHANGE,
        work_queue: false,
    },
    StreamDef {
        name: "DEAD_LETTER",
        exchange: DEAD_LETTER_EXCHANGE,
        work_queue: false,
    },
];

/// NATS client wrapper with JetStream support
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
    jetstream: jetstream::Context,
    /// Timeout applied to publishes and stream management
    operation_timeout: Duration,
    /// Retention bound for the non-work-queue streams
    stream_max_age: Duration,
    /// Client name for logging
    name: String,
}

impl NatsClient {
    /// Connect to the server named in `args`
    pub async fn new(args: &NatsArgs, name: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", args.nats_url);

        let mut options = ConnectOptions::new()
            .name(name)
            .ping_interval(DEFAULT_PING_INTERVAL)
            .connection_timeout(Duration::from_secs(5));

        if let (Some(user), Some(pass)) = (&args.nats_user, &args.nats_password) {
            options = options.user_and_password(user.clone(), pass.clone());
        }

        let client = options
            .connect(&args.nats_url)
            .await
            .map_err(|e| RelayError::Transport(format!("Failed to connect: {}", e)))?;

        info!("Connected to NATS at {}", args.nats_url);

        let jetstream = jetstream::new(client.clone());
        Ok(Self {
            client,
            jetstream,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            stream_max_age: DEFAULT_STREAM_MAX_AGE,
            name: name.to_string(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_stream_max_age(mut self, max_age: Duration) -> Self {
        self.stream_max_age = max_age;
        self
    }

    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// Create every exchange stream that does not exist yet
    pub async fn ensure_streams(&self) -> Result<()> {
        for stream in STREAMS {
            self.ensure_stream(stream).await?;
        }
        Ok(())
    }

    async fn ensure_stream(&self, def: StreamDef) -> Result<jetstream::stream::Stream> {
        let stream = tokio::time::timeout(
            self.operation_timeout,
            self.jetstream
                .get_or_create_stream(def.config(self.stream_max_age)),
        )
        .await
        .map_err(|_| RelayError::Transport(format!("Creating stream {} timed out", def.name)))?
        .map_err(|e| RelayError::Transport(format!("Failed to create stream {}: {}", def.name, e)))?;

        info!("Using stream {} with subjects {}.>", def.name, def.exchange);
        Ok(stream)
    }

    /// Flush pending messages
    pub async fn flush(&self) -> Result<()> {
        self.client
            .flush()
            .await
            .map_err(|e| RelayError::Transport(format!("Flush failed: {}", e)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
