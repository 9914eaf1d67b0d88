//! Broker message types
//!
//! Inbound bodies are parsed into typed variants with explicit required
//! fields. Anything that does not parse is malformed and gets dead-lettered.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::{ContractDocument, ContractNumber};
use super::hash::duplicity_hash;
use crate::types::{RelayError, Result};

/// Queue receiving insert and offer envelopes
pub const DUPLICATE_CONTRACT_QUEUE: &str = "duplicate_contract_queue";

/// Queue receiving eligibility verdicts
pub const VALIDATE_ELIGIBILITY_QUEUE: &str = "validate_eligibility_queue";

/// Operation carried by an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Insert,
    Offered,
}

/// Body shared by insert and offer envelopes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractEnvelope {
    #[serde(rename = "hash_duplicidade")]
    pub duplicity_hash: String,

    #[serde(rename = "hash_elegibilidade")]
    pub eligibility_hash: String,

    /// Submitting party (insert) or claimed current holder (offer)
    pub cedente: String,

    pub payload: ContractDocument,
}

/// Message consumed from the contract queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundEnvelope {
    Insert(ContractEnvelope),
    Offered(ContractEnvelope),
}

impl InboundEnvelope {
    pub fn operation(&self) -> OperationType {
        match self {
            Self::Insert(_) => OperationType::Insert,
            Self::Offered(_) => OperationType::Offered,
        }
    }

    pub fn body(&self) -> &ContractEnvelope {
        match self {
            Self::Insert(body) | Self::Offered(body) => body,
        }
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| RelayError::Malformed(format!("contract envelope: {}", e)))
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(serde_json::to_vec(self)?.into())
    }
}

/// Verdict published by the external eligibility validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityVerdict {
    #[serde(rename = "nuContratoFacta")]
    pub contract_number: ContractNumber,

    #[serde(rename = "nuContratoCCB")]
    pub ccb_number: ContractNumber,

    #[serde(rename = "cessionario")]
    pub assignee: String,

    #[serde(rename = "statusElegibilidade")]
    pub eligible: bool,
}

impl EligibilityVerdict {
    /// Duplicity hash of the contract this verdict refers to
    pub fn duplicity_hash(&self) -> String {
        duplicity_hash(&self.contract_number.as_key(), &self.ccb_number.as_key())
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| RelayError::Malformed(format!("eligibility verdict: {}", e)))
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        Ok(serde_json::to_vec(self)?.into())
    }
}

/// Message published on the topic exchange to a party's queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedEnvelope {
    /// Logical destination as requested, before routing key resolution
    pub destiny: String,
    pub content: ContractDocument,
}

/// Record published to the dead-letter queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub queue: String,
    pub reason: String,
    pub deliveries: i64,
    pub dead_lettered_at: DateTime<Utc>,
    /// Original body, lossily decoded as UTF-8
    pub body: String,
}

impl DeadLetter {
    pub fn new(queue: &str, reason: &str, deliveries: i64, body: &[u8]) -> Self {
        Self {
            queue: queue.to_string(),
            reason: reason.to_string(),
            deliveries,
            dead_lettered_at: Utc::now(),
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }
}
