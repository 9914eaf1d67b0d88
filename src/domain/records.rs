//! Ledger records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One accepted submission, keyed by duplicity hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicityRecord {
    pub duplicity_hash: String,
    pub contract_number: String,
    pub cedente: String,
    pub assignee: String,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DuplicityRecord {
    pub fn new(duplicity_hash: &str, contract_number: &str, cedente: &str, assignee: &str) -> Self {
        Self {
            duplicity_hash: duplicity_hash.to_string(),
            contract_number: contract_number.to_string(),
            cedente: cedente.to_string(),
            assignee: assignee.to_string(),
            inserted_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// Why a submission was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// A record already exists for the duplicity hash
    Duplicate,
}

impl RejectionReason {
    pub fn code(self) -> i32 {
        match self {
            Self::Duplicate => 1,
        }
    }
}

/// Audit copy of a refused submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub id: Uuid,
    pub duplicity_hash: String,
    pub contract_number: String,
    pub cedente: String,
    pub assignee: String,
    pub reason: RejectionReason,
    pub rejected_at: DateTime<Utc>,
}

impl RejectedRecord {
    pub fn duplicate(record: &DuplicityRecord) -> Self {
        Self {
            id: Uuid::new_v4(),
            duplicity_hash: record.duplicity_hash.clone(),
            contract_number: record.contract_number.clone(),
            cedente: record.cedente.clone(),
            assignee: record.assignee.clone(),
            reason: RejectionReason::Duplicate,
            rejected_at: Utc::now(),
        }
    }
}

/// Current holder of a contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub duplicity_hash: String,
    pub holder: String,
    pub contract_number: String,
    pub updated_at: DateTime<Utc>,
}

impl OwnershipRecord {
    /// Whether `party` is the holder, ignoring case
    pub fn is_held_by(&self, party: &str) -> bool {
        self.holder.to_lowercase() == party.to_lowercase()
    }
}

/// Lifecycle transition recorded in the history log
///
/// Codes are shared with other consumers of the history table. A routing
/// failure is recorded as the happy-path code plus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryAction {
    /// Insert accepted and routed, or eligibility approved
    Accepted,
    /// Insert accepted but routing to the assignee failed
    AcceptedRouteFailed,
    /// Eligibility check failed and the submission was removed
    EligibilityRejected,
    /// Offer transferred and routed to the new holder
    Offered,
    /// Offer transferred but routing to the new holder failed
    OfferedRouteFailed,
    /// Code written by another system
    Other(i32),
}

impl HistoryAction {
    pub fn code(self) -> i32 {
        match self {
            Self::Accepted => 1,
            Self::AcceptedRouteFailed => 2,
            Self::EligibilityRejected => 3,
            Self::Offered => 6,
            Self::OfferedRouteFailed => 7,
            Self::Other(code) => code,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Accepted,
            2 => Self::AcceptedRouteFailed,
            3 => Self::EligibilityRejected,
            6 => Self::Offered,
            7 => Self::OfferedRouteFailed,
            other => Self::Other(other),
        }
    }

    /// Action to record when routing after this action failed
    pub fn route_failed(self) -> Self {
        match self {
            Self::Accepted => Self::AcceptedRouteFailed,
            Self::Offered => Self::OfferedRouteFailed,
            other => other,
        }
    }
}

impl Serialize for HistoryAction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for HistoryAction {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i32::deserialize(deserializer).map(Self::from_code)
    }
}

/// Fields supplied by callers when appending to the history log
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
    pub duplicity_hash: String,
    pub contract_number: String,
    pub cedente: Option<String>,
    pub assignee: String,
    pub action: HistoryAction,
}

/// Immutable history log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub duplicity_hash: String,
    pub contract_number: String,
    pub cedente: Option<String>,
    pub assignee: String,
    pub action: HistoryAction,
    pub occurred_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Stamp a new entry with a fresh id and the current time
    pub fn stamp(entry: NewHistoryEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            duplicity_hash: entry.duplicity_hash,
            contract_number: entry.contract_number,
            cedente: entry.cedente,
            assignee: entry.assignee,
            action: entry.action,
            occurred_at: Utc::now(),
        }
    }
}
