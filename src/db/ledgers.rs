//! MongoDB-backed ledgers

use async_trait::async_trait;
use bson::{doc, DateTime};
use tracing::{debug, info, warn};

use super::mongo::{MongoClient, MongoCollection};
use super::schemas::{
    DuplicityDoc, HistoryDoc, HolderDoc, RejectedDoc, DUPLICITY_COLLECTION, HISTORY_COLLECTION,
    HOLDER_COLLECTION, REJECTED_COLLECTION,
};
use crate::domain::{
    DuplicityRecord, HistoryEntry, NewHistoryEntry, OwnershipRecord, RejectedRecord,
};
use crate::ledger::{
    DedupLedger, HistoryLog, HolderOutcome, InsertOutcome, OwnershipLedger, TransferOutcome,
};
use crate::types::{RelayError, Result};

// ============================================================================
// Dedup ledger
// ============================================================================

pub struct MongoDedupLedger {
    records: MongoCollection<DuplicityDoc>,
    rejected: MongoCollection<RejectedDoc>,
}

impl MongoDedupLedger {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            records: client.collection(DUPLICITY_COLLECTION).await?,
            rejected: client.collection(REJECTED_COLLECTION).await?,
        })
    }
}

#[async_trait]
impl DedupLedger for MongoDedupLedger {
    async fn insert(
        &self,
        duplicity_hash: &str,
        contract_number: &str,
        cedente: &str,
        assignee: &str,
    ) -> Result<InsertOutcome> {
        let record = DuplicityRecord::new(duplicity_hash, contract_number, cedente, assignee);

        if self.records.insert_unique(&DuplicityDoc::from(&record)).await? {
            debug!(contract = contract_number, "duplicity record created");
            return Ok(InsertOutcome::Accepted(record));
        }

        let rejected = RejectedRecord::duplicate(&record);
        self.rejected
            .insert_one(&RejectedDoc::from(&rejected))
            .await
            .inspect_err(|e| warn!(contract = contract_number, "Error inserting rejected item: {}", e))?;

        Ok(InsertOutcome::Rejected(rejected))
    }

    async fn remove(&self, duplicity_hash: &str) -> Result<()> {
        let result = self.records.delete_one(doc! { "_id": duplicity_hash }).await?;
        debug!(hash = duplicity_hash, deleted = result.deleted_count, "duplicity record removed");
        Ok(())
    }

    async fn find(&self, duplicity_hash: &str) -> Result<Option<DuplicityRecord>> {
        Ok(self
            .records
            .find_one(doc! { "_id": duplicity_hash })
            .await?
            .map(Into::into))
    }
}

// ============================================================================
// Ownership ledger
// ============================================================================

pub struct MongoOwnershipLedger {
    holders: MongoCollection<HolderDoc>,
}

impl MongoOwnershipLedger {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            holders: client.collection(HOLDER_COLLECTION).await?,
        })
    }
}

#[async_trait]
impl OwnershipLedger for MongoOwnershipLedger {
    async fn get_holder(&self, duplicity_hash: &str) -> Result<Option<OwnershipRecord>> {
        Ok(self
            .holders
            .find_one(doc! { "_id": duplicity_hash })
            .await?
            .map(Into::into))
    }

    async fn establish_holder(
        &self,
        duplicity_hash: &str,
        holder: &str,
        contract_number: &str,
    ) -> Result<HolderOutcome> {
        let record = OwnershipRecord {
            duplicity_hash: duplicity_hash.to_string(),
            holder: holder.to_string(),
            contract_number: contract_number.to_string(),
            updated_at: chrono::Utc::now(),
        };

        if self.holders.insert_unique(&HolderDoc::from(&record)).await? {
            info!(contract = contract_number, holder, "contract holder saved");
            return Ok(HolderOutcome::Created(record));
        }

        // Holder records are never deleted, so the duplicate is still there
        let existing = self.get_holder(duplicity_hash).await?.ok_or_else(|| {
            RelayError::Storage(format!("holder for {} missing after duplicate key", duplicity_hash))
        })?;
        debug!(contract = contract_number, holder = %existing.holder, "contract holder already established");
        Ok(HolderOutcome::Exists(existing))
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
            updated_at: chrono::Utc::now(),
        };

        self.holders
            .upsert_one(doc! { "_id": duplicity_hash }, &HolderDoc::from(&record))
            .await?;

        info!(contract = contract_number, holder, "contract holder saved");
        Ok(record)
    }

    async fn transfer(
        &self,
        duplicity_hash: &str,
        requester: &str,
        new_holder: &str,
        contract_number: &str,
    ) -> Result<TransferOutcome> {
        let Some(current) = self.get_holder(duplicity_hash).await? else {
            return Ok(TransferOutcome::NotFound);
        };

        if !current.is_held_by(requester) {
            return Ok(TransferOutcome::Conflict {
                current_holder: current.holder,
            });
        }

        // Match on the exact stored holder so a concurrent transfer that
        // already moved the contract leaves this update with nothing to match
        let now = DateTime::now();
        let result = self
            .holders
            .update_one(
                doc! { "_id": duplicity_hash, "holder": current.holder.as_str() },
                doc! {
                    "$set": {
                        "holder": new_holder,
                        "contract_number": contract_number,
                        "updated_at": now,
                    }
                },
            )
            .await?;

        if result.matched_count == 0 {
            debug!(hash = duplicity_hash, "transfer lost race against concurrent writer");
            return Ok(match self.get_holder(duplicity_hash).await? {
                Some(latest) => TransferOutcome::Conflict {
                    current_holder: latest.holder,
                },
                None => TransferOutcome::NotFound,
            });
        }

        Ok(TransferOutcome::Transferred {
            previous_holder: current.holder,
            record: OwnershipRecord {
                duplicity_hash: duplicity_hash.to_string(),
                holder: new_holder.to_string(),
                contract_number: contract_number.to_string(),
                updated_at: now.to_chrono(),
            },
        })
    }
}

// ============================================================================
// History log
// ============================================================================

pub struct MongoHistoryLog {
    entries: MongoCollection<HistoryDoc>,
}

impl MongoHistoryLog {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            entries: client.collection(HISTORY_COLLECTION).await?,
        })
    }
}

#[async_trait]
impl HistoryLog for MongoHistoryLog {
    async fn append(&self, entry: NewHistoryEntry) -> Result<HistoryEntry> {
        let entry = HistoryEntry::stamp(entry);
        self.entries.insert_one(&HistoryDoc::from(&entry)).await?;
        Ok(entry)
    }

    async fn history(&self, duplicity_hash: &str) -> Result<Vec<HistoryEntry>> {
        self.entries
            .find_many(
                doc! { "duplicity_hash": duplicity_hash },
                doc! { "occurred_at": 1 },
            )
            .await?
            .into_iter()
            .map(HistoryEntry::try_from)
            .collect()
    }
}
