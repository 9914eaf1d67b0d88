//! In-memory ledgers
//!
//! Same atomicity guarantees as the MongoDB ledgers: a `DashMap` entry guard
//! makes check-and-set a single step per key. Used by tests and by dev mode
//! when MongoDB is unreachable.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{
    DedupLedger, HistoryLog, HolderOutcome, InsertOutcome, OwnershipLedger, TransferOutcome,
};
use crate::domain::{
    DuplicityRecord, HistoryEntry, NewHistoryEntry, OwnershipRecord, RejectedRecord,
};
use crate::types::Result;

// ============================================================================
// Dedup ledger
// ============================================================================

#[derive(Default)]
pub struct InMemoryDedupLedger {
    records: DashMap<String, DuplicityRecord>,
    rejected: Arc<RwLock<Vec<RejectedRecord>>>,
}

impl InMemoryDedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejected attempts, in the order they were refused
    pub async fn rejected_records(&self) -> Vec<RejectedRecord> {
        self.rejected.read().await.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl DedupLedger for InMemoryDedupLedger {
    async fn insert(
        &self,
        duplicity_hash: &str,
        contract_number: &str,
        cedente: &str,
        assignee: &str,
    ) -> Result<InsertOutcome> {
        let attempt = DuplicityRecord::new(duplicity_hash, contract_number, cedente, assignee);

        let outcome = match self.records.entry(duplicity_hash.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(attempt.clone());
                InsertOutcome::Accepted(attempt)
            }
            Entry::Occupied(_) => InsertOutcome::Rejected(RejectedRecord::duplicate(&attempt)),
        };

        if let InsertOutcome::Rejected(ref rejected) = outcome {
            self.rejected.write().await.push(rejected.clone());
        }

        Ok(outcome)
    }

    async fn remove(&self, duplicity_hash: &str) -> Result<()> {
        self.records.remove(duplicity_hash);
        Ok(())
    }

    async fn find(&self, duplicity_hash: &str) -> Result<Option<DuplicityRecord>> {
        Ok(self.records.get(duplicity_hash).map(|r| r.value().clone()))
    }
}

// ============================================================================
// Ownership ledger
// ============================================================================

#[derive(Default)]
pub struct InMemoryOwnershipLedger {
    holders: DashMap<String, OwnershipRecord>,
}

impl InMemoryOwnershipLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OwnershipLedger for InMemoryOwnershipLedger {
    async fn get_holder(&self, duplicity_hash: &str) -> Result<Option<OwnershipRecord>> {
        Ok(self.holders.get(duplicity_hash).map(|r| r.value().clone()))
    }

    async fn establish_holder(
        &self,
        duplicity_hash: &str,
        holder: &str,
        contract_number: &str,
    ) -> Result<HolderOutcome> {
        match self.holders.entry(duplicity_hash.to_string()) {
            Entry::Occupied(existing) => Ok(HolderOutcome::Exists(existing.get().clone())),
            Entry::Vacant(slot) => {
                let record = OwnershipRecord {
                    duplicity_hash: duplicity_hash.to_string(),
                    holder: holder.to_string(),
                    contract_number: contract_number.to_string(),
                    updated_at: Utc::now(),
                };
                slot.insert(record.clone());
                Ok(HolderOutcome::Created(record))
            }
        }
    }

    async fn set_holder(
        &self,
        duplicity_hash: &str,
        holder: &str,
        contract_number: &str,
    ) -> Result<OwnershipRecord> {
        let record = OwnershipRecord {
            duplicity_hash: duplicity_hash.to_string(),
            holder: holder.to_string(),
            contract_number: contract_number.to_string(),
            updated_at: Utc::now(),
        };
        self.holders.insert(duplicity_hash.to_string(), record.clone());
        Ok(record)
    }

    async fn transfer(
        &self,
        duplicity_hash: &str,
        requester: &str,
        new_holder: &str,
        contract_number: &str,
    ) -> Result<TransferOutcome> {
        // The write guard spans the compare and the update
        let Some(mut current) = self.holders.get_mut(duplicity_hash) else {
            return Ok(TransferOutcome::NotFound);
        };

        if !current.is_held_by(requester) {
            return Ok(TransferOutcome::Conflict {
                current_holder: current.holder.clone(),
            });
        }

        let previous_holder = std::mem::replace(&mut current.holder, new_holder.to_string());
        current.contract_number = contract_number.to_string();
        current.updated_at = Utc::now();

        Ok(TransferOutcome::Transferred {
            previous_holder,
            record: current.clone(),
        })
    }
}

// ============================================================================
// History log
// ============================================================================

#[derive(Default)]
pub struct InMemoryHistoryLog {
    entries: RwLock<Vec<HistoryEntry>>,
}

impl InMemoryHistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry across all contracts
    pub async fn all(&self) -> Vec<HistoryEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl HistoryLog for InMemoryHistoryLog {
    async fn append(&self, entry: NewHistoryEntry) -> Result<HistoryEntry> {
        let entry = HistoryEntry::stamp(entry);
        self.entries.write().await.push(entry.clone());
        Ok(entry)
    }

    async fn history(&self, duplicity_hash: &str) -> Result<Vec<HistoryEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.duplicity_hash == duplicity_hash)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HistoryAction;

    #[tokio::test]
    async fn test_insert_then_duplicate() {
        let ledger = InMemoryDedupLedger::new();

        let first = ledger.insert("h1", "123", "bankA", "bankB").await.unwrap();
        let second = ledger.insert("h1", "123", "bankA", "bankB").await.unwrap();

        assert!(first.is_accepted());
        assert!(matches!(second, InsertOutcome::Rejected(_)));

        let rejected = ledger.rejected_records().await;
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].duplicity_hash, "h1");
        assert_eq!(rejected[0].reason.code(), 1);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent_and_reopens_hash() {
        let ledger = InMemoryDedupLedger::new();
        ledger.insert("h1", "123", "bankA", "bankB").await.unwrap();

        ledger.remove("h1").await.unwrap();
        ledger.remove("h1").await.unwrap();
        assert!(ledger.find("h1").await.unwrap().is_none());

        let again = ledger.insert("h1", "123", "bankA", "bankB").await.unwrap();
        assert!(again.is_accepted());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_accept_once() {
        let ledger = Arc::new(InMemoryDedupLedger::new());

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                tokio::spawn(async move { ledger.insert("race", "1", "bankA", "bankB").await })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap().is_accepted() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(ledger.rejected_records().await.len(), 31);
    }

    #[tokio::test]
    async fn test_transfer_outcomes() {
        let ledger = InMemoryOwnershipLedger::new();

        assert_eq!(
            ledger.transfer("h1", "bankB", "bankC", "123").await.unwrap(),
            TransferOutcome::NotFound
        );

        ledger.set_holder("h1", "bankB", "123").await.unwrap();

        let conflict = ledger.transfer("h1", "bankC", "bankD", "123").await.unwrap();
        assert_eq!(
            conflict,
            TransferOutcome::Conflict {
                current_holder: "bankB".into()
            }
        );

        let moved = ledger.transfer("h1", "BANKB", "bankC", "123").await.unwrap();
        assert!(matches!(
            moved,
            TransferOutcome::Transferred { ref previous_holder, .. } if previous_holder == "bankB"
        ));
        assert_eq!(ledger.get_holder("h1").await.unwrap().unwrap().holder, "bankC");
    }

    #[tokio::test]
    async fn test_establish_holder_keeps_existing() {
        let ledger = InMemoryOwnershipLedger::new();

        let created = ledger.establish_holder("h1", "bankB", "123").await.unwrap();
        assert!(matches!(created, HolderOutcome::Created(ref r) if r.holder == "bankB"));

        ledger.transfer("h1", "bankB", "bankC", "123").await.unwrap();

        let again = ledger.establish_holder("h1", "bankB", "123").await.unwrap();
        assert!(matches!(again, HolderOutcome::Exists(ref r) if r.holder == "bankC"));
        assert_eq!(ledger.get_holder("h1").await.unwrap().unwrap().holder, "bankC");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_establish_creates_once() {
        let ledger = Arc::new(InMemoryOwnershipLedger::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                tokio::spawn(async move {
                    ledger
                        .establish_holder("h1", &format!("bank-{}", i), "123")
                        .await
                })
            })
            .collect();

        let mut created = 0;
        for handle in handles {
            if let HolderOutcome::Created(_) = handle.await.unwrap().unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_transfers_single_winner() {
        let ledger = Arc::new(InMemoryOwnershipLedger::new());
        ledger.set_holder("h1", "bankB", "123").await.unwrap();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                tokio::spawn(async move {
                    ledger
                        .transfer("h1", "bankB", &format!("bank-{}", i), "123")
                        .await
                })
            })
            .collect();

        let mut transferred = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                TransferOutcome::Transferred { .. } => transferred += 1,
                TransferOutcome::Conflict { .. } => conflicts += 1,
                TransferOutcome::NotFound => panic!("record disappeared"),
            }
        }

        assert_eq!(transferred, 1);
        assert_eq!(conflicts, 15);
    }

    #[tokio::test]
    async fn test_history_filters_by_hash() {
        let log = InMemoryHistoryLog::new();
        for (hash, action) in [
            ("h1", HistoryAction::Accepted),
            ("h2", HistoryAction::Accepted),
            ("h1", HistoryAction::Offered),
        ] {
            log.append(NewHistoryEntry {
                duplicity_hash: hash.into(),
                contract_number: "123".into(),
                cedente: Some("bankA".into()),
                assignee: "bankB".into(),
                action,
            })
            .await
            .unwrap();
        }

        let h1 = log.history("h1").await.unwrap();
        assert_eq!(h1.len(), 2);
        assert_eq!(h1[0].action, HistoryAction::Accepted);
        assert_eq!(h1[1].action, HistoryAction::Offered);
        assert_ne!(h1[0].id, h1[1].id);
    }
}
