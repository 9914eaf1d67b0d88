//! Rejected submission document schema

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::domain::RejectedRecord;

/// Collection name for rejected submissions
pub const REJECTED_COLLECTION: &str = "rejected_contracts";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RejectedDoc {
    /// Generated UUID
    #[serde(rename = "_id")]
    pub id: String,

    pub duplicity_hash: String,

    pub contract_number: String,

    pub cedente: String,

    pub assignee: String,

    pub reason_code: i32,

    pub rejected_at: DateTime,
}

impl From<&RejectedRecord> for RejectedDoc {
    fn from(record: &RejectedRecord) -> Self {
        Self {
            id: record.id.to_string(),
            duplicity_hash: record.duplicity_hash.clone(),
            contract_number: record.contract_number.clone(),
            cedente: record.cedente.clone(),
            assignee: record.assignee.clone(),
            reason_code: record.reason.code(),
            rejected_at: DateTime::from_chrono(record.rejected_at),
        }
    }
}

impl IntoIndexes for RejectedDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "duplicity_hash": 1 },
            Some(
                IndexOptions::builder()
                    .name("duplicity_hash_index".to_string())
                    .build(),
            ),
        )]
    }
}
