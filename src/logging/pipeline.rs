//! Pipeline event log
//!
//! Every lifecycle transition of a contract becomes a `PipelineEvent`. Events
//! always go to `tracing`; when a path is configured they are also appended to
//! a JSONL file for offline audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Pipeline event types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEventType {
    InsertAccepted,
    InsertRejected,
    RouteFailed,
    EligibilityApproved,
    EligibilityRemoved,
    EligibilityPending,
    OfferTransferred,
    OfferConflict,
    OfferNotFound,
    OfferUnknownDestination,
    AttachmentsDispatched,
    DeadLettered,
}

impl PipelineEventType {
    /// Events that signal something an operator may need to look at
    fn is_warning(self) -> bool {
        matches!(
            self,
            Self::RouteFailed | Self::OfferUnknownDestination | Self::DeadLettered
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: PipelineEventType,
    /// Relay instance that handled the message
    pub node_id: String,
    pub duplicity_hash: Option<String>,
    pub contract_number: Option<String>,
    /// Party the event concerns (holder, destination or requester)
    pub party: Option<String>,
    pub routing_key: Option<String>,
    pub queue: Option<String>,
    pub detail: Option<String>,
}

impl PipelineEvent {
    pub fn new(event_type: PipelineEventType, node_id: String) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            node_id,
            duplicity_hash: None,
            contract_number: None,
            party: None,
            routing_key: None,
            queue: None,
            detail: None,
        }
    }

    pub fn with_hash(mut self, hash: &str) -> Self {
        self.duplicity_hash = Some(hash.to_string());
        self
    }

    pub fn with_contract(mut self, contract_number: &str) -> Self {
        self.contract_number = Some(contract_number.to_string());
        self
    }

    pub fn with_party(mut self, party: &str) -> Self {
        self.party = Some(party.to_string());
        self
    }

    pub fn with_routing_key(mut self, routing_key: &str) -> Self {
        self.routing_key = Some(routing_key.to_string());
        self
    }

    pub fn with_queue(mut self, queue: &str) -> Self {
        self.queue = Some(queue.to_string());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Cloneable handle recording pipeline events
#[derive(Clone)]
pub struct PipelineLogger {
    inner: Arc<Mutex<PipelineLoggerInner>>,
    node_id: String,
}

struct PipelineLoggerInner {
    writer: Option<BufWriter<File>>,
    path: Option<PathBuf>,
}

impl PipelineLogger {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PipelineLoggerInner {
                writer: None,
                path: None,
            })),
            node_id: node_id.into(),
        }
    }

    /// Also append events to a JSONL file at `path`
    pub async fn init_file(&self, path: PathBuf) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut inner = self.inner.lock().await;
        inner.writer = Some(BufWriter::new(file));
        inner.path = Some(path.clone());

        info!("Pipeline event log initialized to {}", path.display());
        Ok(())
    }

    /// Start an event stamped with this logger's node id
    pub fn event(&self, event_type: PipelineEventType) -> PipelineEvent {
        PipelineEvent::new(event_type, self.node_id.clone())
    }

    pub async fn log(&self, event: PipelineEvent) {
        let event_type = event.event_type;
        let hash = event.duplicity_hash.as_deref().unwrap_or("-");
        let contract = event.contract_number.as_deref().unwrap_or("-");
        let party = event.party.as_deref().unwrap_or("-");
        let detail = event.detail.as_deref().unwrap_or("");

        if event_type.is_warning() {
            warn!(event = ?event_type, %hash, %contract, %party, "{}", detail);
        } else {
            info!(event = ?event_type, %hash, %contract, %party, "{}", detail);
        }

        let jsonl = match event.to_jsonl() {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize pipeline event: {}", e);
                return;
            }
        };

        let mut inner = self.inner.lock().await;
        if let Some(ref mut writer) = inner.writer {
            if let Err(e) = writeln!(writer, "{}", jsonl) {
                error!("Failed to write pipeline event: {}", e);
            }
            if let Err(e) = writer.flush() {
                error!("Failed to flush pipeline log: {}", e);
            }
        }
    }

    pub async fn path(&self) -> Option<PathBuf> {
        self.inner.lock().await.path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_builder() {
        let event = PipelineEvent::new(PipelineEventType::OfferConflict, "node-1".into())
            .with_hash("abc")
            .with_contract("123")
            .with_party("bankB");

        let json: serde_json::Value = serde_json::from_str(&event.to_jsonl().unwrap()).unwrap();
        assert_eq!(json["event_type"], "offer_conflict");
        assert_eq!(json["party"], "bankB");
        assert!(json["routing_key"].is_null());
    }

    #[tokio::test]
    async fn test_logger_appends_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.jsonl");

        let logger = PipelineLogger::new("node-1");
        logger.init_file(path.clone()).await.unwrap();
        assert_eq!(logger.path().await, Some(path.clone()));

        logger
            .log(logger.event(PipelineEventType::InsertAccepted).with_hash("h1"))
            .await;
        logger
            .log(
                logger
                    .event(PipelineEventType::DeadLettered)
                    .with_queue("duplicate_contract_queue")
                    .with_detail("bad body"),
            )
            .await;

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: PipelineEvent = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.event_type, PipelineEventType::DeadLettered);
        assert_eq!(second.node_id, "node-1");
        assert_eq!(second.detail.as_deref(), Some("bad body"));
    }

    #[tokio::test]
    async fn test_logger_without_file_is_silent() {
        let logger = PipelineLogger::new("node-1");
        logger.log(logger.event(PipelineEventType::RouteFailed)).await;
        assert!(logger.path().await.is_none());
    }
}
