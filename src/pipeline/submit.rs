//! Producer side of the contract queues

use std::sync::Arc;
use tracing::info;

use crate::domain::{
    ContractDocument, ContractEnvelope, ContractHashes, EligibilityVerdict, InboundEnvelope,
    DUPLICATE_CONTRACT_QUEUE, VALIDATE_ELIGIBILITY_QUEUE,
};
use crate::messaging::{BrokerTransport, MessagePublisher, CONTRACTS_EXCHANGE};
use crate::types::Result;

/// Publishes submissions onto the contracts exchange
pub struct ContractSubmitter {
    publisher: MessagePublisher,
}

impl ContractSubmitter {
    pub fn new(transport: Arc<dyn BrokerTransport>) -> Self {
        Self {
            publisher: MessagePublisher::new(transport, CONTRACTS_EXCHANGE),
        }
    }

    /// Submit a new contract on behalf of `cedente`
    pub async fn submit_insert(
        &self,
        document: ContractDocument,
        cedente: &str,
    ) -> Result<ContractHashes> {
        let (envelope, hashes) = Self::prepare(document, cedente)?;
        self.publish_contract(InboundEnvelope::Insert(envelope)).await?;
        Ok(hashes)
    }

    /// Offer a held contract to the document's assignee
    pub async fn submit_offer(
        &self,
        document: ContractDocument,
        cedente: &str,
    ) -> Result<ContractHashes> {
        let (envelope, hashes) = Self::prepare(document, cedente)?;
        self.publish_contract(InboundEnvelope::Offered(envelope)).await?;
        Ok(hashes)
    }

    pub async fn submit_eligibility(&self, verdict: &EligibilityVerdict) -> Result<()> {
        self.publisher
            .publish(VALIDATE_ELIGIBILITY_QUEUE, verdict)
            .await?;
        info!(contract = %verdict.contract_number, eligible = verdict.eligible, "Eligibility verdict submitted");
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        self.publisher.close().await
    }

    fn prepare(
        mut document: ContractDocument,
        cedente: &str,
    ) -> Result<(ContractEnvelope, ContractHashes)> {
        document.prune_empty_sections();
        let hashes = ContractHashes::for_document(&document)?;

        let envelope = ContractEnvelope {
            duplicity_hash: hashes.duplicity.clone(),
            eligibility_hash: hashes.eligibility.clone(),
            cedente: cedente.to_string(),
            payload: document,
        };
        Ok((envelope, hashes))
    }

    async fn publish_contract(&self, envelope: InboundEnvelope) -> Result<()> {
        let body = envelope.to_bytes()?;
        self.publisher
            .publish_bytes(DUPLICATE_CONTRACT_QUEUE, body)
            .await?;
        info!(
            operation = ?envelope.operation(),
            contract = %envelope.body().payload.contract_number(),
            hash = %envelope.body().duplicity_hash,
            "Contract submitted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{duplicity_hash, ContractNumber, OperationType};
    use crate::messaging::InMemoryTransport;
    use serde_json::json;

    fn document() -> ContractDocument {
        ContractDocument::from_value(json!({
            "contrato": {"nuContratoCedente": "123", "nuContratoCCB": "456", "dtContrato": "2024-01-15"},
            "cliente": {"nuCpf": "12345678909", "empresa": "None"},
            "cessionario": "bankB",
            "anexos": [],
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_insert_prunes_and_hashes() {
        let transport = Arc::new(InMemoryTransport::new());
        let submitter = ContractSubmitter::new(transport.clone());

        let hashes = submitter.submit_insert(document(), "bankA").await.unwrap();
        assert_eq!(hashes.duplicity, duplicity_hash("123", "456"));

        let sent = transport
            .published_to("contracts.duplicate_contract_queue")
            .await;
        assert_eq!(sent.len(), 1);

        let envelope = InboundEnvelope::from_bytes(&sent[0].payload).unwrap();
        assert_eq!(envelope.operation(), OperationType::Insert);
        assert_eq!(envelope.body().cedente, "bankA");
        assert_eq!(envelope.body().eligibility_hash, hashes.eligibility);

        let payload = sent[0].json()["payload"].clone();
        assert!(payload.get("anexos").is_none());
        assert!(payload["cliente"].get("empresa").is_none());
    }

    #[tokio::test]
    async fn test_submit_offer_and_eligibility() {
        let transport = Arc::new(InMemoryTransport::new());
        let submitter = ContractSubmitter::new(transport.clone());

        submitter.submit_offer(document(), "bankB").await.unwrap();
        submitter
            .submit_eligibility(&EligibilityVerdict {
                contract_number: ContractNumber::from("123"),
                ccb_number: ContractNumber::from("456"),
                assignee: "bankB".into(),
                eligible: true,
            })
            .await
            .unwrap();
        submitter.close().await.unwrap();

        let offers = transport
            .published_to("contracts.duplicate_contract_queue")
            .await;
        assert_eq!(offers[0].json()["type"], "offered");

        let verdicts = transport
            .published_to("contracts.validate_eligibility_queue")
            .await;
        assert_eq!(verdicts[0].json()["statusElegibilidade"], true);
        assert_eq!(verdicts[0].json()["nuContratoFacta"], "123");
    }
}
