//! Contract orchestrator
//!
//! Drives the per-contract state machine:
//!
//! ```text
//! Unregistered ──insert──► Inserted ──eligible──► Eligible ──offer──► Offered(holder=X) ──offer──► ...
//!                              │
//!                              └──not eligible──► removed (a later insert is accepted again)
//! ```
//!
//! Every transition that mutates a ledger writes one history entry. When the
//! routing publish after a transition fails, the entry carries the happy-path
//! action code plus one.

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::domain::{
    ContractDocument, ContractEnvelope, EligibilityVerdict, HistoryAction, HistoryEntry,
    NewHistoryEntry, OwnershipRecord, RejectedRecord,
};
use crate::ledger::{
    DedupLedger, HistoryLog, InMemoryDedupLedger, InMemoryHistoryLog, InMemoryOwnershipLedger,
    HolderOutcome, InsertOutcome, OwnershipLedger, TransferOutcome,
};
use crate::logging::{PipelineEventType, PipelineLogger};
use crate::messaging::MessageRouter;
use crate::routing::RoutingKeyResolver;
use crate::types::{RelayError, Result};

// ============================================================================
// Types
// ============================================================================

/// The three stores the orchestrator writes to
#[derive(Clone)]
pub struct Ledgers {
    pub dedup: Arc<dyn DedupLedger>,
    pub ownership: Arc<dyn OwnershipLedger>,
    pub history: Arc<dyn HistoryLog>,
}

impl Ledgers {
    /// Process-local ledgers, used in development mode and tests
    pub fn in_memory() -> Self {
        Self {
            dedup: Arc::new(InMemoryDedupLedger::new()),
            ownership: Arc::new(InMemoryOwnershipLedger::new()),
            history: Arc::new(InMemoryHistoryLog::new()),
        }
    }
}

/// Result of handling an insert
#[derive(Debug, Clone, PartialEq)]
pub enum InsertDecision {
    /// First submission; `routing_key` is `None` when routing failed
    Accepted { routing_key: Option<String> },
    /// Resubmission of a known contract
    Rejected(RejectedRecord),
}

impl InsertDecision {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Accepted { .. } => 200,
            Self::Rejected(_) => 409,
        }
    }
}

/// Result of handling an eligibility verdict
#[derive(Debug, Clone, PartialEq)]
pub enum EligibilityDecision {
    /// Ownership established for the assignee
    Approved(OwnershipRecord),
    /// Submission removed from the dedup ledger
    Removed,
    /// The insert for this hash has not been processed yet
    Pending,
}

/// Result of handling an offer
#[derive(Debug, Clone, PartialEq)]
pub enum OfferDecision {
    Transferred {
        previous_holder: String,
        record: OwnershipRecord,
        routing_key: Option<String>,
    },
    Conflict { current_holder: String },
    NotFound,
}

impl OfferDecision {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Transferred { .. } => 200,
            Self::Conflict { .. } => 409,
            Self::NotFound => 400,
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct ContractOrchestrator {
    ledgers: Ledgers,
    router: MessageRouter,
    logger: PipelineLogger,
}

impl ContractOrchestrator {
    pub fn new(ledgers: Ledgers, router: MessageRouter, logger: PipelineLogger) -> Self {
        Self {
            ledgers,
            router,
            logger,
        }
    }

    pub fn resolver(&self) -> &RoutingKeyResolver {
        self.router.resolver()
    }

    /// Register a new submission and route it to the assignee
    pub async fn handle_insert(&self, envelope: &ContractEnvelope) -> Result<InsertDecision> {
        let payload = &envelope.payload;
        let hash = envelope.duplicity_hash.as_str();
        let contract = payload.contract_number();

        info!(%contract, %hash, "Start duplicity validation");

        let outcome = self
            .ledgers
            .dedup
            .insert(hash, &contract, &envelope.cedente, &payload.assignee)
            .await?;

        match outcome {
            InsertOutcome::Rejected(rejected) => {
                self.logger
                    .log(
                        self.logger
                            .event(PipelineEventType::InsertRejected)
                            .with_hash(hash)
                            .with_contract(&contract)
                            .with_party(&envelope.cedente)
                            .with_detail("contract already submitted"),
                    )
                    .await;
                Ok(InsertDecision::Rejected(rejected))
            }
            InsertOutcome::Accepted(_) => {
                let routing_key = self
                    .route_and_record(
                        hash,
                        &contract,
                        Some(&envelope.cedente),
                        &payload.assignee,
                        payload,
                        HistoryAction::Accepted,
                    )
                    .await;

                let mut event = self
                    .logger
                    .event(PipelineEventType::InsertAccepted)
                    .with_hash(hash)
                    .with_contract(&contract)
                    .with_party(&payload.assignee);
                if let Some(ref key) = routing_key {
                    event = event.with_routing_key(key);
                }
                self.logger.log(event).await;

                Ok(InsertDecision::Accepted { routing_key })
            }
        }
    }

    /// Promote or remove a submission according to the verdict
    pub async fn handle_eligibility(
        &self,
        verdict: &EligibilityVerdict,
    ) -> Result<EligibilityDecision> {
        let hash = verdict.duplicity_hash();
        let contract = verdict.contract_number.as_key();
        let existing = self.ledgers.dedup.find(&hash).await?;

        if !verdict.eligible {
            self.ledgers.dedup.remove(&hash).await?;
            self.record(NewHistoryEntry {
                duplicity_hash: hash.clone(),
                contract_number: contract.clone(),
                cedente: existing.map(|r| r.cedente),
                assignee: verdict.assignee.clone(),
                action: HistoryAction::EligibilityRejected,
            })
            .await;

            self.logger
                .log(
                    self.logger
                        .event(PipelineEventType::EligibilityRemoved)
                        .with_hash(&hash)
                        .with_contract(&contract)
                        .with_party(&verdict.assignee),
                )
                .await;
            return Ok(EligibilityDecision::Removed);
        }

        if existing.is_none() {
            self.logger
                .log(
                    self.logger
                        .event(PipelineEventType::EligibilityPending)
                        .with_hash(&hash)
                        .with_contract(&contract)
                        .with_detail("no submission recorded for hash yet"),
                )
                .await;
            return Ok(EligibilityDecision::Pending);
        }

        let record = match self
            .ledgers
            .ownership
            .establish_holder(&hash, &verdict.assignee, &contract)
            .await?
        {
            HolderOutcome::Created(record) => record,
            HolderOutcome::Exists(record) => {
                // A replayed approval must not undo later transfers
                self.logger
                    .log(
                        self.logger
                            .event(PipelineEventType::EligibilityApproved)
                            .with_hash(&hash)
                            .with_contract(&contract)
                            .with_party(&record.holder)
                            .with_detail("holder already established"),
                    )
                    .await;
                return Ok(EligibilityDecision::Approved(record));
            }
        };

        self.record(NewHistoryEntry {
            duplicity_hash: hash.clone(),
            contract_number: contract.clone(),
            cedente: None,
            assignee: verdict.assignee.clone(),
            action: HistoryAction::Accepted,
        })
        .await;

        self.logger
            .log(
                self.logger
                    .event(PipelineEventType::EligibilityApproved)
                    .with_hash(&hash)
                    .with_contract(&contract)
                    .with_party(&record.holder),
            )
            .await;

        Ok(EligibilityDecision::Approved(record))
    }

    /// Transfer ownership from the envelope's cedente to its assignee
    ///
    /// Offers toward a party that is not in the routing allow-list fail with
    /// [`RelayError::UnknownDestination`] before any ledger is touched.
    pub async fn handle_offer(&self, envelope: &ContractEnvelope) -> Result<OfferDecision> {
        let payload = &envelope.payload;
        let hash = envelope.duplicity_hash.as_str();
        let contract = payload.contract_number();
        let new_holder = payload.assignee.as_str();

        if !self.resolver().is_known(new_holder) {
            self.logger
                .log(
                    self.logger
                        .event(PipelineEventType::OfferUnknownDestination)
                        .with_hash(hash)
                        .with_contract(&contract)
                        .with_party(new_holder),
                )
                .await;
            return Err(RelayError::UnknownDestination(new_holder.to_string()));
        }

        let outcome = self
            .ledgers
            .ownership
            .transfer(hash, &envelope.cedente, new_holder, &contract)
            .await?;

        match outcome {
            TransferOutcome::NotFound => {
                self.logger
                    .log(
                        self.logger
                            .event(PipelineEventType::OfferNotFound)
                            .with_hash(hash)
                            .with_contract(&contract)
                            .with_party(&envelope.cedente),
                    )
                    .await;
                Ok(OfferDecision::NotFound)
            }
            TransferOutcome::Conflict { current_holder } => {
                self.logger
                    .log(
                        self.logger
                            .event(PipelineEventType::OfferConflict)
                            .with_hash(hash)
                            .with_contract(&contract)
                            .with_party(&envelope.cedente)
                            .with_detail(format!("current holder is {}", current_holder)),
                    )
                    .await;
                Ok(OfferDecision::Conflict { current_holder })
            }
            TransferOutcome::Transferred {
                previous_holder,
                record,
            } => {
                let mut content = payload.clone();
                if let Some(ref creator) = content.criado_por {
                    content.cedente = Some(creator.clone());
                }

                let routing_key = self
                    .route_and_record(
                        hash,
                        &contract,
                        Some(&envelope.cedente),
                        new_holder,
                        &content,
                        HistoryAction::Offered,
                    )
                    .await;

                let mut event = self
                    .logger
                    .event(PipelineEventType::OfferTransferred)
                    .with_hash(hash)
                    .with_contract(&contract)
                    .with_party(new_holder)
                    .with_detail(format!("from {}", previous_holder));
                if let Some(ref key) = routing_key {
                    event = event.with_routing_key(key);
                }
                self.logger.log(event).await;

                Ok(OfferDecision::Transferred {
                    previous_holder,
                    record,
                    routing_key,
                })
            }
        }
    }

    /// Full history of a contract, oldest first
    pub async fn history(&self, duplicity_hash: &str) -> Result<Vec<HistoryEntry>> {
        self.ledgers.history.history(duplicity_hash).await
    }

    /// Route `content` to `destination` and record the transition
    ///
    /// The ledger mutation has already committed, so neither a routing failure
    /// nor a history failure is returned to the caller.
    async fn route_and_record(
        &self,
        hash: &str,
        contract: &str,
        cedente: Option<&str>,
        destination: &str,
        content: &ContractDocument,
        action: HistoryAction,
    ) -> Option<String> {
        let (action, routing_key) = match self.router.route(destination, content).await {
            Ok(key) => (action, Some(key)),
            Err(e) => {
                error!(%contract, %destination, "Failed to route contract: {}", e);
                self.logger
                    .log(
                        self.logger
                            .event(PipelineEventType::RouteFailed)
                            .with_hash(hash)
                            .with_contract(contract)
                            .with_party(destination)
                            .with_detail(e.to_string()),
                    )
                    .await;
                (action.route_failed(), None)
            }
        };

        self.record(NewHistoryEntry {
            duplicity_hash: hash.to_string(),
            contract_number: contract.to_string(),
            cedente: cedente.map(str::to_string),
            assignee: destination.to_string(),
            action,
        })
        .await;

        routing_key
    }

    async fn record(&self, entry: NewHistoryEntry) {
        let hash = entry.duplicity_hash.clone();
        let code = entry.action.code();
        match self.ledgers.history.append(entry).await {
            Ok(stored) => debug!(%hash, code, id = %stored.id, "History recorded"),
            Err(e) => error!(%hash, code, "Failed to record history: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContractHashes, ContractNumber};
    use crate::messaging::InMemoryTransport;
    use serde_json::json;

    struct Harness {
        orchestrator: ContractOrchestrator,
        transport: Arc<InMemoryTransport>,
        history: Arc<InMemoryHistoryLog>,
    }

    fn harness() -> Harness {
        let transport = Arc::new(InMemoryTransport::new());
        let history = Arc::new(InMemoryHistoryLog::new());
        let ledgers = Ledgers {
            dedup: Arc::new(InMemoryDedupLedger::new()),
            ownership: Arc::new(InMemoryOwnershipLedger::new()),
            history: history.clone(),
        };
        let resolver = Arc::new(RoutingKeyResolver::new(["bankA", "bankB", "bankC"], "processing"));
        let router = MessageRouter::new(transport.clone(), resolver);

        Harness {
            orchestrator: ContractOrchestrator::new(ledgers, router, PipelineLogger::new("test")),
            transport,
            history,
        }
    }

    fn envelope(cedente: &str, assignee: &str, extra: serde_json::Value) -> ContractEnvelope {
        let mut payload = json!({
            "contrato": {"nuContratoCedente": "123", "nuContratoCCB": "456", "dtContrato": "2024-01-15"},
            "cliente": {"nuCpf": "12345678909"},
            "cessionario": assignee,
        });
        if let (Some(target), Some(more)) = (payload.as_object_mut(), extra.as_object()) {
            target.extend(more.clone());
        }
        let payload = ContractDocument::from_value(payload).unwrap();
        let hashes = ContractHashes::for_document(&payload).unwrap();

        ContractEnvelope {
            duplicity_hash: hashes.duplicity,
            eligibility_hash: hashes.eligibility,
            cedente: cedente.to_string(),
            payload,
        }
    }

    fn verdict(eligible: bool) -> EligibilityVerdict {
        EligibilityVerdict {
            contract_number: ContractNumber::from("123"),
            ccb_number: ContractNumber::from("456"),
            assignee: "bankB".into(),
            eligible,
        }
    }

    #[tokio::test]
    async fn test_route_failure_records_incremented_code() {
        let h = harness();
        h.transport.fail_subject("router.bankB").await;

        let decision = h
            .orchestrator
            .handle_insert(&envelope("bankA", "bankB", json!({})))
            .await
            .unwrap();
        assert_eq!(decision, InsertDecision::Accepted { routing_key: None });
        assert_eq!(decision.status_code(), 200);

        let entries = h.history.all().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action.code(), 2);
    }

    #[tokio::test]
    async fn test_eligibility_before_insert_is_pending() {
        let h = harness();

        let decision = h.orchestrator.handle_eligibility(&verdict(true)).await.unwrap();
        assert_eq!(decision, EligibilityDecision::Pending);
        assert!(h.history.all().await.is_empty());
    }

    #[tokio::test]
    async fn test_eligibility_rejection_keeps_cedente_in_history() {
        let h = harness();
        let env = envelope("bankA", "bankB", json!({}));
        h.orchestrator.handle_insert(&env).await.unwrap();

        let decision = h.orchestrator.handle_eligibility(&verdict(false)).await.unwrap();
        assert_eq!(decision, EligibilityDecision::Removed);

        let entries = h.orchestrator.history(&env.duplicity_hash).await.unwrap();
        assert_eq!(entries.last().unwrap().action, HistoryAction::EligibilityRejected);
        assert_eq!(entries.last().unwrap().cedente.as_deref(), Some("bankA"));
    }

    #[tokio::test]
    async fn test_offer_to_unknown_destination_is_refused() {
        let h = harness();
        let env = envelope("bankA", "bankB", json!({}));
        h.orchestrator.handle_insert(&env).await.unwrap();
        h.orchestrator.handle_eligibility(&verdict(true)).await.unwrap();

        let err = h
            .orchestrator
            .handle_offer(&envelope("bankB", "nobody", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::UnknownDestination(ref d) if d == "nobody"));
        assert_eq!(err.status_code(), 400);
        assert!(h.transport.published_to("router.processing").await.is_empty());
    }

    #[tokio::test]
    async fn test_offer_without_holder_is_not_found() {
        let h = harness();
        let decision = h
            .orchestrator
            .handle_offer(&envelope("bankA", "bankC", json!({})))
            .await
            .unwrap();
        assert_eq!(decision, OfferDecision::NotFound);
        assert_eq!(decision.status_code(), 400);
    }

    #[tokio::test]
    async fn test_offer_reattributes_to_creator() {
        let h = harness();
        h.orchestrator
            .handle_insert(&envelope("bankA", "bankB", json!({})))
            .await
            .unwrap();
        h.orchestrator.handle_eligibility(&verdict(true)).await.unwrap();

        let offer = envelope("BANKB", "bankC", json!({"criado_por": "bankB-desk"}));
        let decision = h.orchestrator.handle_offer(&offer).await.unwrap();
        match decision {
            OfferDecision::Transferred {
                ref previous_holder,
                ref record,
                ref routing_key,
            } => {
                assert_eq!(previous_holder, "bankB");
                assert_eq!(record.holder, "bankC");
                assert_eq!(routing_key.as_deref(), Some("bankC"));
            }
            other => panic!("expected transfer, got {:?}", other),
        }

        let routed = h.transport.published_to("router.bankC").await;
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].json()["content"]["cedente"], "bankB-desk");
    }
}
