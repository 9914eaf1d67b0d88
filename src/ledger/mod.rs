//! Ledger ports
//!
//! The dedup ledger, ownership ledger and history log are each backed by an
//! independently keyed remote table. The traits below are what the pipeline
//! depends on; MongoDB and in-memory implementations live in `crate::db` and
//! [`memory`].

pub mod memory;

use async_trait::async_trait;

use crate::domain::{
    DuplicityRecord, HistoryEntry, NewHistoryEntry, OwnershipRecord, RejectedRecord,
};
use crate::types::Result;

pub use memory::{InMemoryDedupLedger, InMemoryHistoryLog, InMemoryOwnershipLedger};

/// Outcome of a conditional insert into the dedup ledger
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// First writer for this hash; the record is persisted
    Accepted(DuplicityRecord),
    /// A record already existed; the attempt was written to the rejected store
    Rejected(RejectedRecord),
}

impl InsertOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// Outcome of an ownership transfer
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    /// Holder changed from `previous_holder` to the record's holder
    Transferred {
        previous_holder: String,
        record: OwnershipRecord,
    },
    /// Requester is not the current holder; nothing changed
    Conflict { current_holder: String },
    /// No ownership record exists for the hash
    NotFound,
}

/// Outcome of establishing initial ownership
#[derive(Debug, Clone, PartialEq)]
pub enum HolderOutcome {
    /// No holder existed; the record was created
    Created(OwnershipRecord),
    /// A holder was already established and is left untouched
    Exists(OwnershipRecord),
}

/// "First writer wins" store keyed by duplicity hash
#[async_trait]
pub trait DedupLedger: Send + Sync {
    /// Atomically create the record for `duplicity_hash` unless one exists
    async fn insert(
        &self,
        duplicity_hash: &str,
        contract_number: &str,
        cedente: &str,
        assignee: &str,
    ) -> Result<InsertOutcome>;

    /// Remove the record; removing an absent hash is not an error
    async fn remove(&self, duplicity_hash: &str) -> Result<()>;

    /// Look up the record for a hash
    async fn find(&self, duplicity_hash: &str) -> Result<Option<DuplicityRecord>>;
}

/// Current holder of each contract
#[async_trait]
pub trait OwnershipLedger: Send + Sync {
    async fn get_holder(&self, duplicity_hash: &str) -> Result<Option<OwnershipRecord>>;

    /// Create the ownership record unless one already exists
    async fn establish_holder(
        &self,
        duplicity_hash: &str,
        holder: &str,
        contract_number: &str,
    ) -> Result<HolderOutcome>;

    /// Unconditional upsert of the holder
    async fn set_holder(
        &self,
        duplicity_hash: &str,
        holder: &str,
        contract_number: &str,
    ) -> Result<OwnershipRecord>;

    /// Move ownership to `new_holder` if `requester` is the current holder
    ///
    /// Two concurrent transfers against the same prior holder never both
    /// succeed.
    async fn transfer(
        &self,
        duplicity_hash: &str,
        requester: &str,
        new_holder: &str,
        contract_number: &str,
    ) -> Result<TransferOutcome>;
}

/// Append-only audit trail
#[async_trait]
pub trait HistoryLog: Send + Sync {
    async fn append(&self, entry: NewHistoryEntry) -> Result<HistoryEntry>;

    /// All entries for a hash, oldest first
    async fn history(&self, duplicity_hash: &str) -> Result<Vec<HistoryEntry>>;
}
