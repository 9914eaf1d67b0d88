//! Contract assignment pipeline

pub mod attachments;
pub mod orchestrator;
pub mod submit;

pub use attachments::AttachmentFanout;
pub use orchestrator::{
    ContractOrchestrator, EligibilityDecision, InsertDecision, Ledgers, OfferDecision,
};
pub use submit::ContractSubmitter;
