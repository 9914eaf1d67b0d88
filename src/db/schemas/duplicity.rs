//! Dedup ledger document schema
//!
//! One document per accepted submission. The duplicity hash is the `_id`, so
//! the primary key index is the dedup gate.

use bson::{DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::domain::DuplicityRecord;

/// Collection name for accepted submissions
pub const DUPLICITY_COLLECTION: &str = "duplicity_records";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DuplicityDoc {
    /// Duplicity hash
    #[serde(rename = "_id")]
    pub duplicity_hash: String,

    pub contract_number: String,

    pub cedente: String,

    pub assignee: String,

    pub inserted_at: DateTime,

    #[serde(default)]
    pub updated_at: Option<DateTime>,
}

impl From<&DuplicityRecord> for DuplicityDoc {
    fn from(record: &DuplicityRecord) -> Self {
        Self {
            duplicity_hash: record.duplicity_hash.clone(),
            contract_number: record.contract_number.clone(),
            cedente: record.cedente.clone(),
            assignee: record.assignee.clone(),
            inserted_at: DateTime::from_chrono(record.inserted_at),
            updated_at: record.updated_at.map(DateTime::from_chrono),
        }
    }
}

impl From<DuplicityDoc> for DuplicityRecord {
    fn from(doc: DuplicityDoc) -> Self {
        Self {
            duplicity_hash: doc.duplicity_hash,
            contract_number: doc.contract_number,
            cedente: doc.cedente,
            assignee: doc.assignee,
            inserted_at: doc.inserted_at.to_chrono(),
            updated_at: doc.updated_at.map(|d| d.to_chrono()),
        }
    }
}

impl IntoIndexes for DuplicityDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        // _id is the only key needed
        vec![]
    }
}
