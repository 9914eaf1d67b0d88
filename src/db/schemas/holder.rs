//! Contract holder document schema
//!
//! Keyed by duplicity hash. Transfers are conditional updates filtered on the
//! holder value that was read, so a stale writer matches nothing.

use bson::{DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::domain::OwnershipRecord;

/// Collection name for contract holders
pub const HOLDER_COLLECTION: &str = "contract_holders";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HolderDoc {
    /// Duplicity hash
    #[serde(rename = "_id")]
    pub duplicity_hash: String,

    pub holder: String,

    pub contract_number: String,

    pub updated_at: DateTime,
}

impl From<&OwnershipRecord> for HolderDoc {
    fn from(record: &OwnershipRecord) -> Self {
        Self {
            duplicity_hash: record.duplicity_hash.clone(),
            holder: record.holder.clone(),
            contract_number: record.contract_number.clone(),
            updated_at: DateTime::from_chrono(record.updated_at),
        }
    }
}

impl From<HolderDoc> for OwnershipRecord {
    fn from(doc: HolderDoc) -> Self {
        Self {
            duplicity_hash: doc.duplicity_hash,
            holder: doc.holder,
            contract_number: doc.contract_number,
            updated_at: doc.updated_at.to_chrono(),
        }
    }
}

impl IntoIndexes for HolderDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![]
    }
}
