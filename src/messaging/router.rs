//! Topic exchange router
//!
//! Wraps contract content in a `{destiny, content}` envelope and publishes it
//! under the routing key resolved for the destination.

use std::sync::Arc;
use tracing::info;

use super::{BrokerTransport, MessagePublisher, ROUTER_EXCHANGE};
use crate::domain::{ContractDocument, RoutedEnvelope};
use crate::routing::RoutingKeyResolver;
use crate::types::Result;

#[derive(Clone)]
pub struct MessageRouter {
    publisher: MessagePublisher,
    resolver: Arc<RoutingKeyResolver>,
}

impl MessageRouter {
    pub fn new(transport: Arc<dyn BrokerTransport>, resolver: Arc<RoutingKeyResolver>) -> Self {
        Self {
            publisher: MessagePublisher::new(transport, ROUTER_EXCHANGE),
            resolver,
        }
    }

    pub fn resolver(&self) -> &RoutingKeyResolver {
        &self.resolver
    }

    /// Publish `content` toward `destination`, returning the routing key used
    pub async fn route(&self, destination: &str, content: &ContractDocument) -> Result<String> {
        let routing_key = self.resolver.resolve(destination).to_string();
        let envelope = RoutedEnvelope {
            destiny: destination.to_string(),
            content: content.clone(),
        };

        self.publisher.publish(&routing_key, &envelope).await?;

        info!(
            contract = %content.contract_number(),
            %routing_key,
            "Contract sent with route key {}",
            routing_key
        );
        Ok(routing_key)
    }

    pub async fn close(self) -> Result<()> {
        self.publisher.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryTransport;
    use serde_json::json;

    fn document(assignee: &str) -> ContractDocument {
        ContractDocument::from_value(json!({
            "contrato": {"nuContratoCedente": "123", "nuContratoCCB": "456"},
            "cessionario": assignee
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_route_known_and_fallback() {
        let transport = Arc::new(InMemoryTransport::new());
        let resolver = Arc::new(RoutingKeyResolver::new(["bankB"], "processing"));
        let router = MessageRouter::new(transport.clone(), resolver);

        assert_eq!(router.route("bankB", &document("bankB")).await.unwrap(), "bankB");
        assert_eq!(
            router.route("stranger", &document("stranger")).await.unwrap(),
            "processing"
        );

        let to_bank = transport.published_to("router.bankB").await;
        assert_eq!(to_bank.len(), 1);
        assert_eq!(to_bank[0].json()["destiny"], "bankB");
        assert_eq!(to_bank[0].json()["content"]["contrato"]["nuContratoCCB"], "456");

        let fallback = transport.published_to("router.processing").await;
        assert_eq!(fallback[0].json()["destiny"], "stranger");
    }
}
