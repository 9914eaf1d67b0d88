//! Configuration for the relay
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Args as ClapArgs, Parser};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::routing::{is_valid_subject_token, RoutingKeyResolver, DEFAULT_FALLBACK_ROUTING_KEY};
use crate::worker::ConsumerConfig;

/// Cession relay - contract dedup, ownership and routing over NATS
#[derive(Parser, Debug, Clone)]
#[command(name = "cession-relay")]
#[command(about = "Consumes contract submissions, enforces dedup and ownership, routes to parties")]
pub struct Args {
    /// Unique identifier for this relay instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Enable development mode (in-memory ledgers when MongoDB is unreachable)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "cession_relay")]
    pub mongodb_db: String,

    /// Comma-separated list of recognized destination parties
    /// e.g. "bankA,bankB,bankC"
    #[arg(long, env = "ROUTING_KEYS", default_value = "")]
    pub routing_keys: String,

    /// Routing key used for destinations outside the allow-list
    #[arg(long, env = "FALLBACK_ROUTING_KEY", default_value = DEFAULT_FALLBACK_ROUTING_KEY)]
    pub fallback_routing_key: String,

    /// Durable consumer name prefix (shared by replicas of the same relay)
    #[arg(long, env = "CONSUMER_NAME", default_value = "cession_relay")]
    pub consumer_name: String,

    /// Deliveries after which a failing message is dead-lettered
    #[arg(long, env = "MAX_DELIVER", default_value = "5")]
    pub max_deliver: i64,

    /// Delay before a failed message is redelivered, in milliseconds
    #[arg(long, env = "RETRY_DELAY_MS", default_value = "5000")]
    pub retry_delay_ms: u64,

    /// Messages fetched per pull
    #[arg(long, env = "FETCH_BATCH", default_value = "10")]
    pub fetch_batch: usize,

    /// Timeout for every store and broker call, in milliseconds
    #[arg(long, env = "OPERATION_TIMEOUT_MS", default_value = "10000")]
    pub operation_timeout_ms: u64,

    /// How long the router, attachments and dead-letter streams keep messages, in seconds
    #[arg(long, env = "STREAM_MAX_AGE_SECS", default_value = "604800")]
    pub stream_max_age_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Append pipeline events to this JSONL file
    #[arg(long, env = "PIPELINE_LOG_PATH")]
    pub pipeline_log_path: Option<PathBuf>,
}

/// NATS connection configuration
#[derive(ClapArgs, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,
}

impl Args {
    /// Parsed routing allow-list, blanks removed
    pub fn routing_key_list(&self) -> Vec<String> {
        self.routing_keys
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn resolver(&self) -> RoutingKeyResolver {
        RoutingKeyResolver::new(self.routing_key_list(), self.fallback_routing_key.clone())
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn stream_max_age(&self) -> Duration {
        Duration::from_secs(self.stream_max_age_secs)
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            consumer_name: self.consumer_name.clone(),
            max_deliver: self.max_deliver,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            fetch_batch: self.fetch_batch,
            ..Default::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let keys = self.routing_key_list();
        if keys.is_empty() {
            return Err("ROUTING_KEYS must name at least one destination".to_string());
        }

        if let Some(bad) = keys.iter().find(|k| !is_valid_subject_token(k)) {
            return Err(format!("ROUTING_KEYS entry {:?} is not a valid routing key", bad));
        }

        if !is_valid_subject_token(&self.fallback_routing_key) {
            return Err(format!(
                "FALLBACK_ROUTING_KEY {:?} is not a valid routing key",
                self.fallback_routing_key
            ));
        }

        if !is_valid_subject_token(&self.consumer_name) {
            return Err("CONSUMER_NAME must not contain '.', '*', '>' or whitespace".to_string());
        }

        if self.max_deliver < 1 {
            return Err("MAX_DELIVER must be at least 1".to_string());
        }

        if self.fetch_batch == 0 {
            return Err("FETCH_BATCH must be at least 1".to_string());
        }

        if self.stream_max_age_secs == 0 {
            return Err("STREAM_MAX_AGE_SECS must be at least 1".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["cession-relay"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_routing_key_list() {
        let args = parse(&["--routing-keys", " bankA, ,bankB,"]);
        assert_eq!(args.routing_key_list(), vec!["bankA", "bankB"]);

        let resolver = args.resolver();
        assert_eq!(resolver.resolve("bankA"), "bankA");
        assert_eq!(resolver.resolve("bankZ"), args.fallback_routing_key);
    }

    #[test]
    fn test_validate() {
        assert!(parse(&["--routing-keys", "bankA,bankB"]).validate().is_ok());
        assert!(parse(&["--routing-keys", ""]).validate().is_err());
        assert!(parse(&["--routing-keys", "bank.A"]).validate().is_err());
        assert!(parse(&["--routing-keys", "bankA", "--max-deliver", "0"])
            .validate()
            .is_err());
        assert!(parse(&["--routing-keys", "bankA", "--fallback-routing-key", "a b"])
            .validate()
            .is_err());
        assert!(parse(&["--routing-keys", "bankA", "--stream-max-age-secs", "0"])
            .validate()
            .is_err());
    }

    #[test]
    fn test_stream_max_age() {
        let args = parse(&["--routing-keys", "bankA", "--stream-max-age-secs", "3600"]);
        assert_eq!(args.stream_max_age(), Duration::from_secs(3600));
    }

    #[test]
    fn test_consumer_config() {
        let args = parse(&["--routing-keys", "bankA", "--retry-delay-ms", "250"]);
        let config = args.consumer_config();
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.consumer_name, args.consumer_name);
    }
}
