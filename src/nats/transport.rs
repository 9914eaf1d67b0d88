//! JetStream publish transport
//!
//! Each publish waits for the stream's ack so a returned `Ok` means the
//! message is stored durably.

use async_trait::async_trait;
use bytes::Bytes;

use super::NatsClient;
use crate::messaging::BrokerTransport;
use crate::types::{RelayError, Result};

#[derive(Clone)]
pub struct JetStreamTransport {
    client: NatsClient,
}

impl JetStreamTransport {
    pub fn new(client: NatsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BrokerTransport for JetStreamTransport {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        let timeout = self.client.operation_timeout();

        let publish = async {
            let ack = self
                .client
                .jetstream()
                .publish(subject.to_string(), payload)
                .await
                .map_err(|e| RelayError::Transport(format!("Publish to {} failed: {}", subject, e)))?;
            ack.await.map_err(|e| {
                RelayError::Transport(format!("Publish to {} not acknowledged: {}", subject, e))
            })
        };

        tokio::time::timeout(timeout, publish)
            .await
            .map_err(|_| RelayError::Transport(format!("Publish to {} timed out", subject)))??;
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.client.flush().await
    }
}
