//! Database schemas
//!
//! MongoDB document structures for the four relay collections.

mod duplicity;
mod history;
mod holder;
mod rejected;

pub use duplicity::{DuplicityDoc, DUPLICITY_COLLECTION};
pub use history::{HistoryDoc, HISTORY_COLLECTION};
pub use holder::{HolderDoc, HOLDER_COLLECTION};
pub use rejected::{RejectedDoc, REJECTED_COLLECTION};
