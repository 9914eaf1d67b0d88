//! NATS JetStream binding for the broker ports

pub mod client;
pub mod transport;

pub use client::{NatsClient, StreamDef, CONTRACTS_STREAM, STREAMS};
pub use transport::JetStreamTransport;
