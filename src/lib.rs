//! Cession relay - contract assignment pipeline over NATS JetStream
//!
//! Contract submissions arrive on the `contracts` exchange. The relay makes
//! sure each contract is accepted once, tracks which party currently holds
//! it, and routes it to the holder's queue on the `router` exchange.
//!
//! ## Components
//!
//! - **Ledgers**: dedup ledger, ownership ledger and history log (MongoDB or in-memory)
//! - **Routing**: allow-list resolution of party names to routing keys
//! - **Messaging**: publisher and router over a broker transport port
//! - **Pipeline**: the per-contract state machine, attachment fan-out and submitter
//! - **Worker**: durable pull consumers with retry and dead-lettering

pub mod config;
pub mod db;
pub mod domain;
pub mod ledger;
pub mod logging;
pub mod messaging;
pub mod nats;
pub mod pipeline;
pub mod routing;
pub mod types;
pub mod worker;

pub use config::Args;
pub use types::{RelayError, Result};
