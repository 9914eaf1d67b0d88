//! Database layer
//!
//! MongoDB storage for the dedup ledger, rejected submissions, contract
//! holders and the history log.

pub mod ledgers;
pub mod mongo;
pub mod schemas;

pub use ledgers::{MongoDedupLedger, MongoHistoryLog, MongoOwnershipLedger};
pub use mongo::{MongoClient, MongoCollection};
