//! History log document schema

use bson::{doc, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::mongo::IntoIndexes;
use crate::domain::{HistoryAction, HistoryEntry};
use crate::types::RelayError;

/// Collection name for the history log
pub const HISTORY_COLLECTION: &str = "contract_history";

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HistoryDoc {
    /// Generated UUID
    #[serde(rename = "_id")]
    pub id: String,

    pub duplicity_hash: String,

    pub contract_number: String,

    #[serde(default)]
    pub cedente: Option<String>,

    pub assignee: String,

    pub action_code: i32,

    pub occurred_at: DateTime,
}

impl From<&HistoryEntry> for HistoryDoc {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            duplicity_hash: entry.duplicity_hash.clone(),
            contract_number: entry.contract_number.clone(),
            cedente: entry.cedente.clone(),
            assignee: entry.assignee.clone(),
            action_code: entry.action.code(),
            occurred_at: DateTime::from_chrono(entry.occurred_at),
        }
    }
}

impl TryFrom<HistoryDoc> for HistoryEntry {
    type Error = RelayError;

    fn try_from(doc: HistoryDoc) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&doc.id)
            .map_err(|e| RelayError::Storage(format!("history id {}: {}", doc.id, e)))?;

        Ok(Self {
            id,
            duplicity_hash: doc.duplicity_hash,
            contract_number: doc.contract_number,
            cedente: doc.cedente,
            assignee: doc.assignee,
            action: HistoryAction::from_code(doc.action_code),
            occurred_at: doc.occurred_at.to_chrono(),
        })
    }
}

impl IntoIndexes for HistoryDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "duplicity_hash": 1, "occurred_at": 1 },
            Some(
                IndexOptions::builder()
                    .name("duplicity_hash_occurred_at".to_string())
                    .build(),
            ),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewHistoryEntry;

    #[test]
    fn test_history_doc_conversion() {
        let entry = HistoryEntry::stamp(NewHistoryEntry {
            duplicity_hash: "h1".into(),
            contract_number: "123".into(),
            cedente: None,
            assignee: "bankB".into(),
            action: HistoryAction::EligibilityRejected,
        });

        let doc = HistoryDoc::from(&entry);
        assert_eq!(doc.action_code, 3);
        assert_eq!(doc.id, entry.id.to_string());

        let back = HistoryEntry::try_from(doc).unwrap();
        assert_eq!(back.id, entry.id);
        assert_eq!(back.action, HistoryAction::EligibilityRejected);
        assert_eq!(back.occurred_at.timestamp_millis(), entry.occurred_at.timestamp_millis());
    }

    #[test]
    fn test_bad_id_is_storage_error() {
        let doc = HistoryDoc {
            id: "not-a-uuid".into(),
            duplicity_hash: "h1".into(),
            contract_number: "123".into(),
            cedente: None,
            assignee: "bankB".into(),
            action_code: 1,
            occurred_at: DateTime::now(),
        };
        assert!(matches!(
            HistoryEntry::try_from(doc),
            Err(RelayError::Storage(_))
        ));
    }
}
