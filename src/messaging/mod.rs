//! Message production
//!
//! Exchanges are modelled as subject prefixes: publishing to exchange `e`
//! with routing key `k` sends to subject `e.k`.

pub mod publisher;
pub mod router;
pub mod transport;

pub use publisher::MessagePublisher;
pub use router::MessageRouter;
pub use transport::{BrokerTransport, InMemoryTransport, PublishedMessage};

/// Direct exchange carrying inbound contract queues
pub const CONTRACTS_EXCHANGE: &str = "contracts";

/// Topic exchange fanning contracts out to party queues
pub const ROUTER_EXCHANGE: &str = "router";

/// Direct exchange carrying attachment updates to parties
pub const ATTACHMENTS_EXCHANGE: &str = "attachments";

/// Exchange holding messages that could not be processed
pub const DEAD_LETTER_EXCHANGE: &str = "dead_letter";

/// Subject for a routing key on an exchange
pub fn subject(exchange: &str, routing_key: &str) -> String {
    format!("{}.{}", exchange, routing_key)
}
