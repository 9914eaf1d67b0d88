//! Broker transport port
//!
//! The JetStream implementation lives in `crate::nats`. The in-memory
//! transport records what was published and can be told to fail.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::types::{RelayError, Result};

/// Durable publish to a subject
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Publish and wait for the broker to accept the message
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()>;

    /// Flush anything buffered
    async fn flush(&self) -> Result<()>;
}

/// A message captured by [`InMemoryTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub subject: String,
    pub payload: Bytes,
}

impl PublishedMessage {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

/// Transport that keeps published messages in memory
#[derive(Default)]
pub struct InMemoryTransport {
    published: RwLock<Vec<PublishedMessage>>,
    failing_subjects: RwLock<HashSet<String>>,
    offline: AtomicBool,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make publishes to `subject` fail with a transport error
    pub async fn fail_subject(&self, subject: &str) {
        self.failing_subjects.write().await.insert(subject.to_string());
    }

    /// Make every publish fail
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.read().await.clone()
    }

    pub async fn published_to(&self, subject: &str) -> Vec<PublishedMessage> {
        self.published
            .read()
            .await
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BrokerTransport for InMemoryTransport {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RelayError::Transport("broker offline".into()));
        }
        if self.failing_subjects.read().await.contains(subject) {
            return Err(RelayError::Transport(format!("publish to {} rejected", subject)));
        }

        self.published.write().await.push(PublishedMessage {
            subject: subject.to_string(),
            payload,
        });
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
