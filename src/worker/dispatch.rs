//! Message dispatch
//!
//! Parses a body for the queue it arrived on, runs the matching handler and
//! decides what happens to the delivery.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{
    EligibilityVerdict, InboundEnvelope, DUPLICATE_CONTRACT_QUEUE, VALIDATE_ELIGIBILITY_QUEUE,
};
use crate::pipeline::{ContractOrchestrator, EligibilityDecision};
use crate::types::{RelayError, Result};

/// What to do with a delivery once its handler returned
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Handling is complete, including business refusals
    Ack,
    /// Redeliver later
    Retry(String),
    /// Never going to succeed; park it on the dead-letter queue
    DeadLetter(String),
}

impl Disposition {
    fn from_error(err: RelayError) -> Self {
        if err.is_retryable() {
            return Self::Retry(err.to_string());
        }
        match err {
            RelayError::Malformed(_) | RelayError::Config(_) => Self::DeadLetter(err.to_string()),
            RelayError::Storage(_)
            | RelayError::Transport(_)
            | RelayError::DuplicateSubmission(_)
            | RelayError::OwnershipConflict(_)
            | RelayError::ContractNotFound(_)
            | RelayError::UnknownDestination(_) => Self::Ack,
        }
    }
}

pub struct Dispatcher {
    orchestrator: Arc<ContractOrchestrator>,
}

impl Dispatcher {
    pub fn new(orchestrator: Arc<ContractOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub async fn dispatch(&self, queue: &str, body: &[u8]) -> Disposition {
        let result = match queue {
            DUPLICATE_CONTRACT_QUEUE => self.dispatch_contract(body).await,
            VALIDATE_ELIGIBILITY_QUEUE => self.dispatch_eligibility(body).await,
            other => return Disposition::DeadLetter(format!("no handler for queue {}", other)),
        };

        match result {
            Ok(disposition) => disposition,
            Err(e) => {
                warn!(%queue, "Handler failed: {}", e);
                Disposition::from_error(e)
            }
        }
    }

    async fn dispatch_contract(&self, body: &[u8]) -> Result<Disposition> {
        match InboundEnvelope::from_bytes(body)? {
            InboundEnvelope::Insert(envelope) => {
                let decision = self.orchestrator.handle_insert(&envelope).await?;
                debug!(status = decision.status_code(), "Insert handled");
            }
            InboundEnvelope::Offered(envelope) => {
                let decision = self.orchestrator.handle_offer(&envelope).await?;
                debug!(status = decision.status_code(), "Offer handled");
            }
        }
        Ok(Disposition::Ack)
    }

    async fn dispatch_eligibility(&self, body: &[u8]) -> Result<Disposition> {
        let verdict = EligibilityVerdict::from_bytes(body)?;
        match self.orchestrator.handle_eligibility(&verdict).await? {
            EligibilityDecision::Pending => Ok(Disposition::Retry(format!(
                "no submission recorded for contract {} yet",
                verdict.contract_number
            ))),
            EligibilityDecision::Approved(_) | EligibilityDecision::Removed => Ok(Disposition::Ack),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContractDocument, ContractEnvelope, ContractHashes, DuplicityRecord};
    use crate::ledger::{DedupLedger, InMemoryHistoryLog, InMemoryOwnershipLedger, InsertOutcome};
    use crate::logging::PipelineLogger;
    use crate::messaging::{InMemoryTransport, MessageRouter};
    use crate::pipeline::Ledgers;
    use crate::routing::RoutingKeyResolver;
    use async_trait::async_trait;
    use serde_json::json;

    /// Dedup ledger whose backing store is unreachable
    struct UnreachableDedupLedger;

    #[async_trait]
    impl DedupLedger for UnreachableDedupLedger {
        async fn insert(&self, _: &str, _: &str, _: &str, _: &str) -> Result<InsertOutcome> {
            Err(RelayError::Storage("operation timed out".into()))
        }

        async fn remove(&self, _: &str) -> Result<()> {
            Err(RelayError::Storage("operation timed out".into()))
        }

        async fn find(&self, _: &str) -> Result<Option<DuplicityRecord>> {
            Err(RelayError::Storage("operation timed out".into()))
        }
    }

    fn dispatcher(ledgers: Ledgers) -> Dispatcher {
        let resolver = Arc::new(RoutingKeyResolver::new(["bankB"], "processing"));
        let router = MessageRouter::new(Arc::new(InMemoryTransport::new()), resolver);
        let orchestrator = ContractOrchestrator::new(ledgers, router, PipelineLogger::new("test"));
        Dispatcher::new(Arc::new(orchestrator))
    }

    fn insert_body(kind: &str, assignee: &str) -> Vec<u8> {
        let payload = ContractDocument::from_value(json!({
            "contrato": {"nuContratoCedente": "123", "nuContratoCCB": "456", "dtContrato": "2024-01-15"},
            "cliente": {"nuCpf": "12345678909"},
            "cessionario": assignee,
        }))
        .unwrap();
        let hashes = ContractHashes::for_document(&payload).unwrap();
        let envelope = ContractEnvelope {
            duplicity_hash: hashes.duplicity,
            eligibility_hash: hashes.eligibility,
            cedente: "bankA".into(),
            payload,
        };
        let envelope = match kind {
            "insert" => InboundEnvelope::Insert(envelope),
            _ => InboundEnvelope::Offered(envelope),
        };
        envelope.to_bytes().unwrap().to_vec()
    }

    #[tokio::test]
    async fn test_business_outcomes_are_acked() {
        let d = dispatcher(Ledgers::in_memory());
        let body = insert_body("insert", "bankB");

        assert_eq!(d.dispatch(DUPLICATE_CONTRACT_QUEUE, &body).await, Disposition::Ack);
        // Duplicate
        assert_eq!(d.dispatch(DUPLICATE_CONTRACT_QUEUE, &body).await, Disposition::Ack);
        // Unknown destination
        assert_eq!(
            d.dispatch(DUPLICATE_CONTRACT_QUEUE, &insert_body("offered", "nobody"))
                .await,
            Disposition::Ack
        );
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_dead_lettered() {
        let d = dispatcher(Ledgers::in_memory());

        let not_json = d.dispatch(DUPLICATE_CONTRACT_QUEUE, b"not json").await;
        assert!(matches!(not_json, Disposition::DeadLetter(_)));

        let unknown_type = d
            .dispatch(DUPLICATE_CONTRACT_QUEUE, br#"{"type": "cancel"}"#)
            .await;
        assert!(matches!(unknown_type, Disposition::DeadLetter(_)));

        let missing_status = d
            .dispatch(
                VALIDATE_ELIGIBILITY_QUEUE,
                br#"{"nuContratoFacta": "123", "nuContratoCCB": "456", "cessionario": "bankB"}"#,
            )
            .await;
        assert!(matches!(missing_status, Disposition::DeadLetter(_)));

        let wrong_queue = d.dispatch("other_queue", b"{}").await;
        assert!(matches!(wrong_queue, Disposition::DeadLetter(_)));
    }

    #[test]
    fn test_retry_follows_error_retryability() {
        let errors = [
            RelayError::Storage("down".into()),
            RelayError::Transport("down".into()),
            RelayError::Malformed("bad".into()),
            RelayError::Config("bad".into()),
            RelayError::DuplicateSubmission("h".into()),
            RelayError::OwnershipConflict("h".into()),
            RelayError::ContractNotFound("h".into()),
            RelayError::UnknownDestination("bankZ".into()),
        ];
        for err in errors {
            let retryable = err.is_retryable();
            let disposition = Disposition::from_error(err);
            assert_eq!(matches!(disposition, Disposition::Retry(_)), retryable);
        }
    }

    #[tokio::test]
    async fn test_storage_failure_is_retried() {
        let ledgers = Ledgers {
            dedup: Arc::new(UnreachableDedupLedger),
            ownership: Arc::new(InMemoryOwnershipLedger::new()),
            history: Arc::new(InMemoryHistoryLog::new()),
        };
        let d = dispatcher(ledgers);

        let disposition = d
            .dispatch(DUPLICATE_CONTRACT_QUEUE, &insert_body("insert", "bankB"))
            .await;
        assert!(matches!(disposition, Disposition::Retry(ref r) if r.contains("timed out")));
    }

    #[tokio::test]
    async fn test_early_eligibility_is_retried() {
        let d = dispatcher(Ledgers::in_memory());
        let body = br#"{"nuContratoFacta": "123", "nuContratoCCB": "456", "cessionario": "bankB", "statusElegibilidade": true}"#;

        assert!(matches!(
            d.dispatch(VALIDATE_ELIGIBILITY_QUEUE, body).await,
            Disposition::Retry(_)
        ));

        d.dispatch(DUPLICATE_CONTRACT_QUEUE, &insert_body("insert", "bankB"))
            .await;
        assert_eq!(d.dispatch(VALIDATE_ELIGIBILITY_QUEUE, body).await, Disposition::Ack);
    }
}
