//! Structured pipeline event logging

pub mod pipeline;

pub use pipeline::{PipelineEvent, PipelineEventType, PipelineLogger};
