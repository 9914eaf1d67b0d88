//! Queue consumption
//!
//! [`Dispatcher`] turns one message body into a [`Disposition`];
//! [`ContractConsumer`] drives the JetStream pull loops and applies it.

pub mod consumer;
pub mod dispatch;

pub use consumer::{ConsumerConfig, ContractConsumer, CONSUMED_QUEUES};
pub use dispatch::{Dispatcher, Disposition};
