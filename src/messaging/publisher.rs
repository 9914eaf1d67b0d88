//! Direct exchange publisher

use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use super::{subject, BrokerTransport};
use crate::types::{RelayError, Result};

/// Point-to-point publisher bound to one exchange
#[derive(Clone)]
pub struct MessagePublisher {
    transport: Arc<dyn BrokerTransport>,
    exchange: String,
}

impl MessagePublisher {
    pub fn new(transport: Arc<dyn BrokerTransport>, exchange: &str) -> Self {
        Self {
            transport,
            exchange: exchange.to_string(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// Serialize `payload` as JSON and publish it under `routing_key`
    pub async fn publish<T>(&self, routing_key: &str, payload: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let body = serde_json::to_vec(payload)
            .map_err(|e| RelayError::Malformed(format!("Failed to serialize message: {}", e)))?;
        self.publish_bytes(routing_key, body.into()).await
    }

    /// Publish an already encoded body under `routing_key`
    pub async fn publish_bytes(&self, routing_key: &str, body: Bytes) -> Result<()> {
        let subject = subject(&self.exchange, routing_key);
        self.transport.publish(&subject, body).await?;
        debug!(%subject, "message published");
        Ok(())
    }

    /// Flush and release this publisher's handle on the connection
    pub async fn close(self) -> Result<()> {
        self.transport.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{InMemoryTransport, CONTRACTS_EXCHANGE};

    #[tokio::test]
    async fn test_publish_serializes_to_subject() {
        let transport = Arc::new(InMemoryTransport::new());
        let publisher = MessagePublisher::new(transport.clone(), CONTRACTS_EXCHANGE);

        publisher
            .publish("duplicate_contract_queue", &serde_json::json!({"type": "insert"}))
            .await
            .unwrap();
        publisher.close().await.unwrap();

        let sent = transport.published_to("contracts.duplicate_contract_queue").await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].json()["type"], "insert");
    }

    #[tokio::test]
    async fn test_transport_failure_propagates() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.set_offline(true);
        let publisher = MessagePublisher::new(transport, CONTRACTS_EXCHANGE);

        let err = publisher.publish("q", &1).await.unwrap_err();
        assert!(matches!(err, RelayError::Transport(_)));
    }
}
