//! Contract domain: submitted documents, content hashing, ledger records and
//! the messages that travel over the broker.

pub mod document;
pub mod hash;
pub mod messages;
pub mod records;

pub use document::{ClientSection, ContractDocument, ContractNumber, ContractSection, Installment};
pub use hash::{duplicity_hash, eligibility_hash, ContractHashes};
pub use messages::{
    ContractEnvelope, DeadLetter, EligibilityVerdict, InboundEnvelope, OperationType, RoutedEnvelope,
    DUPLICATE_CONTRACT_QUEUE, VALIDATE_ELIGIBILITY_QUEUE,
};
pub use records::{
    DuplicityRecord, HistoryAction, HistoryEntry, NewHistoryEntry, OwnershipRecord,
    RejectedRecord, RejectionReason,
};
