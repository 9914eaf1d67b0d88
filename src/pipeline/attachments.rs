//! Attachment fan-out
//!
//! Attachment updates go to every party that has ever received the contract,
//! as recorded in its history.

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::ledger::HistoryLog;
use crate::logging::{PipelineEventType, PipelineLogger};
use crate::messaging::{BrokerTransport, MessagePublisher, ATTACHMENTS_EXCHANGE};
use crate::routing::is_valid_subject_token;
use crate::types::{RelayError, Result};

const ATTACHMENTS_FIELD: &str = "anexos";

pub struct AttachmentFanout {
    history: Arc<dyn HistoryLog>,
    publisher: MessagePublisher,
    logger: PipelineLogger,
}

impl AttachmentFanout {
    pub fn new(
        history: Arc<dyn HistoryLog>,
        transport: Arc<dyn BrokerTransport>,
        logger: PipelineLogger,
    ) -> Self {
        Self {
            history,
            publisher: MessagePublisher::new(transport, ATTACHMENTS_EXCHANGE),
            logger,
        }
    }

    /// Send `payload` to each party in the contract's history
    ///
    /// Returns the parties notified, in the order they first appear. Every
    /// party is attempted even when an earlier publish fails; if any failed,
    /// the result is a transport error naming them. Retrying re-notifies the
    /// parties that already received the update.
    pub async fn dispatch(&self, duplicity_hash: &str, mut payload: Value) -> Result<Vec<String>> {
        let entries = self.history.history(duplicity_hash).await?;
        if entries.is_empty() {
            return Err(RelayError::ContractNotFound(duplicity_hash.to_string()));
        }

        strip_null_attachment_fields(&mut payload)?;

        let mut parties: Vec<&str> = Vec::new();
        for entry in &entries {
            for party in entry.cedente.as_deref().into_iter().chain([entry.assignee.as_str()]) {
                if !parties.contains(&party) {
                    parties.push(party);
                }
            }
        }

        let mut notified = Vec::with_capacity(parties.len());
        let mut failed = Vec::new();
        for party in parties {
            if !is_valid_subject_token(party) {
                warn!(%party, "Skipping party that is not a valid routing key");
                continue;
            }
            match self.publisher.publish(party, &payload).await {
                Ok(()) => notified.push(party.to_string()),
                Err(e) => {
                    warn!(hash = %duplicity_hash, %party, "Attachment publish failed: {}", e);
                    failed.push(party.to_string());
                }
            }
        }

        info!(hash = %duplicity_hash, parties = ?notified, failed = ?failed, "Attachments dispatched");
        let detail = if failed.is_empty() {
            notified.join(",")
        } else {
            format!("{} (failed: {})", notified.join(","), failed.join(","))
        };
        self.logger
            .log(
                self.logger
                    .event(PipelineEventType::AttachmentsDispatched)
                    .with_hash(duplicity_hash)
                    .with_detail(detail),
            )
            .await;

        if !failed.is_empty() {
            return Err(RelayError::Transport(format!(
                "attachments for {} not delivered to {}",
                duplicity_hash,
                failed.join(", ")
            )));
        }

        Ok(notified)
    }
}

/// Remove null-valued fields from every item of the `anexos` array
fn strip_null_attachment_fields(payload: &mut Value) -> Result<()> {
    match payload.get_mut(ATTACHMENTS_FIELD) {
        None | Some(Value::Null) => Ok(()),
        Some(Value::Array(items)) => {
            for item in items.iter_mut() {
                if let Value::Object(fields) = item {
                    fields.retain(|_, v| !v.is_null());
                }
            }
            Ok(())
        }
        Some(other) => Err(RelayError::Malformed(format!(
            "{} must be an array, got {}",
            ATTACHMENTS_FIELD, other
        ))),
    }
}
