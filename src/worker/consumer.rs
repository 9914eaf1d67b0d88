//! JetStream contract consumer
//!
//! One durable pull consumer and one loop task per queue. A delivery is only
//! acknowledged after its handler finished; failures are redelivered with a
//! delay and eventually parked on the dead-letter queue.

use async_nats::jetstream::{self, consumer::PullConsumer, stream::Stream, AckKind};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{Dispatcher, Disposition};
use crate::domain::{DeadLetter, DUPLICATE_CONTRACT_QUEUE, VALIDATE_ELIGIBILITY_QUEUE};
use crate::logging::{PipelineEventType, PipelineLogger};
use crate::messaging::{subject, MessagePublisher, CONTRACTS_EXCHANGE};
use crate::nats::CONTRACTS_STREAM;
use crate::types::{RelayError, Result};

/// Queues drained by the relay
pub const CONSUMED_QUEUES: [&str; 2] = [DUPLICATE_CONTRACT_QUEUE, VALIDATE_ELIGIBILITY_QUEUE];

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Durable consumer name prefix, shared by relay replicas
    pub consumer_name: String,
    /// Deliveries after which a retried message is dead-lettered
    pub max_deliver: i64,
    /// Delay before a retried message is redelivered
    pub retry_delay: Duration,
    pub fetch_batch: usize,
    pub fetch_expiry: Duration,
    /// How long the server waits for an ack before redelivering
    pub ack_wait: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            consumer_name: "cession_relay".to_string(),
            max_deliver: 5,
            retry_delay: Duration::from_millis(5000),
            fetch_batch: 10,
            fetch_expiry: Duration::from_secs(5),
            ack_wait: Duration::from_secs(60),
        }
    }
}

/// How a delivery is settled with the server
#[derive(Debug, Clone, PartialEq, Eq)]
enum Settlement {
    Ack,
    Nak,
    DeadLetter(String),
}

fn settle(disposition: Disposition, deliveries: i64, max_deliver: i64) -> Settlement {
    match disposition {
        Disposition::Ack => Settlement::Ack,
        Disposition::Retry(_) if deliveries < max_deliver => Settlement::Nak,
        Disposition::Retry(reason) => {
            Settlement::DeadLetter(format!("retries exhausted after {}: {}", deliveries, reason))
        }
        Disposition::DeadLetter(reason) => Settlement::DeadLetter(reason),
    }
}

#[derive(Clone)]
pub struct ContractConsumer {
    config: Arc<ConsumerConfig>,
    jetstream: jetstream::Context,
    dispatcher: Arc<Dispatcher>,
    dead_letters: MessagePublisher,
    logger: PipelineLogger,
    running: Arc<RwLock<bool>>,
}

impl ContractConsumer {
    pub fn new(
        config: ConsumerConfig,
        jetstream: jetstream::Context,
        dispatcher: Arc<Dispatcher>,
        dead_letters: MessagePublisher,
        logger: PipelineLogger,
    ) -> Self {
        Self {
            config: Arc::new(config),
            jetstream,
            dispatcher,
            dead_letters,
            logger,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Run one loop per queue until [`stop`](Self::stop) is called
    pub async fn run(&self) -> Result<()> {
        *self.running.write().await = true;

        let stream = self
            .jetstream
            .get_stream(CONTRACTS_STREAM)
            .await
            .map_err(|e| RelayError::Transport(format!("Failed to open stream: {}", e)))?;

        let mut loops = Vec::with_capacity(CONSUMED_QUEUES.len());
        for queue in CONSUMED_QUEUES {
            let consumer = self.ensure_consumer(&stream, queue).await?;
            let worker = self.clone();
            loops.push(tokio::spawn(async move {
                worker.consume_queue(queue, consumer).await
            }));
        }

        for handle in futures::future::join_all(loops).await {
            if let Err(e) = handle {
                error!("Consume loop aborted: {}", e);
            }
        }
        Ok(())
    }

    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    async fn ensure_consumer(&self, stream: &Stream, queue: &str) -> Result<PullConsumer> {
        let durable = format!("{}_{}", self.config.consumer_name, queue);

        let consumer = stream
            .get_or_create_consumer(
                &durable,
                jetstream::consumer::pull::Config {
                    durable_name: Some(durable.clone()),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ack_wait: self.config.ack_wait,
                    filter_subject: subject(CONTRACTS_EXCHANGE, queue),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| RelayError::Transport(format!("Failed to create consumer: {}", e)))?;

        info!("Using consumer {} for {}", durable, queue);
        Ok(consumer)
    }

    async fn consume_queue(&self, queue: &'static str, consumer: PullConsumer) {
        info!(%queue, "Waiting for messages");

        while *self.running.read().await {
            match self.process_batch(queue, &consumer).await {
                Ok(count) => {
                    if count > 0 {
                        debug!(%queue, "Processed {} messages", count);
                    }
                }
                Err(e) => {
                    error!(%queue, "Error processing batch: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!(%queue, "Consume loop stopped");
    }

    async fn process_batch(&self, queue: &str, consumer: &PullConsumer) -> Result<usize> {
        let mut messages = consumer
            .fetch()
            .max_messages(self.config.fetch_batch)
            .expires(self.config.fetch_expiry)
            .messages()
            .await
            .map_err(|e| RelayError::Transport(format!("Failed to fetch messages: {}", e)))?;

        let mut count = 0;
        while let Some(msg_result) = messages.next().await {
            match msg_result {
                Ok(msg) => {
                    count += 1;
                    self.process_message(queue, msg).await;
                }
                Err(e) => warn!(%queue, "Error receiving message: {}", e),
            }
        }

        Ok(count)
    }

    async fn process_message(&self, queue: &str, msg: jetstream::Message) {
        let deliveries = msg.info().map(|info| info.delivered).unwrap_or(1);
        let disposition = self.dispatcher.dispatch(queue, &msg.payload).await;

        let settled = match settle(disposition, deliveries, self.config.max_deliver) {
            Settlement::Ack => msg.ack().await,
            Settlement::Nak => {
                debug!(%queue, deliveries, "Scheduling redelivery");
                msg.ack_with(AckKind::Nak(Some(self.config.retry_delay)))
                    .await
            }
            Settlement::DeadLetter(reason) => {
                self.dead_letter(queue, &msg, &reason, deliveries).await
            }
        };

        if let Err(e) = settled {
            warn!(%queue, "Failed to ack message: {}", e);
        }
    }

    async fn dead_letter(
        &self,
        queue: &str,
        msg: &jetstream::Message,
        reason: &str,
        deliveries: i64,
    ) -> std::result::Result<(), async_nats::Error> {
        let letter = DeadLetter::new(queue, reason, deliveries, &msg.payload);

        match self.dead_letters.publish(queue, &letter).await {
            Ok(()) => {
                self.logger
                    .log(
                        self.logger
                            .event(PipelineEventType::DeadLettered)
                            .with_queue(queue)
                            .with_detail(reason),
                    )
                    .await;
                msg.ack_with(AckKind::Term).await
            }
            Err(e) => {
                error!(%queue, "Failed to dead-letter message: {}", e);
                msg.ack_with(AckKind::Nak(Some(self.config.retry_delay)))
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_retries_until_bound() {
        let retry = || Disposition::Retry("store unavailable".into());

        assert_eq!(settle(retry(), 1, 5), Settlement::Nak);
        assert_eq!(settle(retry(), 4, 5), Settlement::Nak);
        match settle(retry(), 5, 5) {
            Settlement::DeadLetter(reason) => {
                assert!(reason.contains("retries exhausted after 5"));
                assert!(reason.contains("store unavailable"));
            }
            other => panic!("expected dead letter, got {:?}", other),
        }
    }

    #[test]
    fn test_settle_passes_through_terminal_dispositions() {
        assert_eq!(settle(Disposition::Ack, 9, 5), Settlement::Ack);
        assert_eq!(
            settle(Disposition::DeadLetter("bad body".into()), 1, 5),
            Settlement::DeadLetter("bad body".into())
        );
    }

    #[test]
    fn test_default_config() {
        let config = ConsumerConfig::default();
        assert_eq!(config.max_deliver, 5);
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.fetch_batch, 10);
    }
}
