//! Contract submission document
//!
//! Only the fields the relay reasons about are typed. Everything else is kept
//! in flattened maps so a routed document carries exactly what was submitted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::types::{RelayError, Result};

/// Optional top-level sections dropped when empty before publishing
const PRUNABLE_SECTIONS: &[&str] = &[
    "representante",
    "beneficio",
    "contratosOrigem",
    "dadosBancariosSacado",
    "anexos",
    "retornoFGTS",
];

/// Contract identifier as sent by producers (JSON string or number)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContractNumber {
    Number(serde_json::Number),
    Text(String),
}

impl ContractNumber {
    /// String form used in hashes and ledger records
    pub fn as_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ContractNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ContractNumber {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// The `contrato` section of a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractSection {
    /// Contract number assigned by the originator
    #[serde(rename = "nuContratoCedente")]
    pub contract_number: ContractNumber,

    /// CCB instrument number
    #[serde(rename = "nuContratoCCB")]
    pub ccb_number: ContractNumber,

    /// Contract date, as submitted
    #[serde(rename = "dtContrato", default, skip_serializing_if = "Option::is_none")]
    pub contract_date: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The `cliente` section (borrower)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientSection(pub Map<String, Value>);

impl ClientSection {
    /// Borrower CPF
    pub fn cpf(&self) -> Option<&str> {
        self.0.get("nuCpf").and_then(Value::as_str)
    }
}

/// One entry of the `parcela` list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Installment(pub Map<String, Value>);

impl Installment {
    /// Installment amount; missing, null and empty values count as zero
    pub fn amount(&self) -> Result<f64> {
        match self.0.get("vrParcela") {
            None | Some(Value::Null) => Ok(0.0),
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| RelayError::Malformed(format!("vrParcela out of range: {}", n))),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(0.0),
            Some(Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| RelayError::Malformed(format!("vrParcela is not a number: {:?}", s))),
            Some(other) => Err(RelayError::Malformed(format!(
                "vrParcela has unexpected type: {}",
                other
            ))),
        }
    }
}

/// A contract submission as carried in message payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDocument {
    #[serde(rename = "contrato")]
    pub contract: ContractSection,

    /// Party the contract is being assigned to
    #[serde(rename = "cessionario")]
    pub assignee: String,

    #[serde(rename = "cliente", default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ClientSection>,

    #[serde(rename = "parcela", default, skip_serializing_if = "Option::is_none")]
    pub installments: Option<Vec<Installment>>,

    /// Party that created the offer, set as `cedente` when an offer is routed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criado_por: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cedente: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContractDocument {
    /// Parse a document from a JSON value
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| RelayError::Malformed(format!("payload: {}", e)))
    }

    /// Contract number as a ledger key
    pub fn contract_number(&self) -> String {
        self.contract.contract_number.as_key()
    }

    /// Installments, empty when the section is absent
    pub fn installments(&self) -> &[Installment] {
        self.installments.as_deref().unwrap_or(&[])
    }

    /// Sum of all installment amounts
    pub fn total_installment_amount(&self) -> Result<f64> {
        self.installments()
            .iter()
            .try_fold(0.0, |total, installment| Ok(total + installment.amount()?))
    }

    /// Drop optional sections that carry no data
    pub fn prune_empty_sections(&mut self) {
        self.extra.retain(|key, value| {
            !(PRUNABLE_SECTIONS.contains(&key.as_str()) && is_empty_value(value))
        });

        if let Some(client) = self.client.as_mut() {
            let drop_company = match client.0.get("empresa") {
                Some(Value::Null) => true,
                Some(Value::String(s)) => s == "None",
                _ => false,
            };
            if drop_company {
                client.0.remove("empresa");
            }
        }
    }

    /// Serialize back to a JSON value
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| RelayError::Malformed(format!("payload: {}", e)))
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "contrato": {
                "nuContratoCedente": 123,
                "nuContratoCCB": "456",
                "dtContrato": "2024-01-15",
                "vrContrato": "1500.50"
            },
            "cessionario": "bankB",
            "cliente": {"nuCpf": "12345678909", "empresa": "None"},
            "parcela": [
                {"nuParcela": 1, "vrParcela": "500.25"},
                {"nuParcela": 2, "vrParcela": 500.25},
                {"nuParcela": 3, "vrParcela": ""},
                {"nuParcela": 4, "vrParcela": null},
                {"nuParcela": 5}
            ],
            "representante": {},
            "anexos": [],
            "beneficio": {"nuBeneficio": "99"}
        })
    }

    #[test]
    fn test_parse_keeps_unknown_fields() {
        let doc = ContractDocument::from_value(sample()).unwrap();
        assert_eq!(doc.contract_number(), "123");
        assert_eq!(doc.contract.ccb_number.as_key(), "456");
        assert_eq!(doc.assignee, "bankB");
        assert_eq!(doc.contract.extra["vrContrato"], "1500.50");

        let back = doc.to_value().unwrap();
        assert_eq!(back["contrato"]["nuContratoCedente"], 123);
        assert_eq!(back["beneficio"]["nuBeneficio"], "99");
    }

    #[test]
    fn test_total_treats_missing_amounts_as_zero() {
        let doc = ContractDocument::from_value(sample()).unwrap();
        assert_eq!(doc.installments().len(), 5);
        assert_eq!(doc.total_installment_amount().unwrap(), 1000.5);
    }

    #[test]
    fn test_non_numeric_amount_is_malformed() {
        let mut value = sample();
        value["parcela"][0]["vrParcela"] = json!("abc");
        let doc = ContractDocument::from_value(value).unwrap();
        assert!(matches!(
            doc.total_installment_amount(),
            Err(RelayError::Malformed(_))
        ));
    }

    #[test]
    fn test_missing_assignee_is_malformed() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("cessionario");
        assert!(matches!(
            ContractDocument::from_value(value),
            Err(RelayError::Malformed(_))
        ));
    }

    #[test]
    fn test_prune_empty_sections() {
        let mut doc = ContractDocument::from_value(sample()).unwrap();
        doc.prune_empty_sections();

        assert!(!doc.extra.contains_key("representante"));
        assert!(!doc.extra.contains_key("anexos"));
        assert!(doc.extra.contains_key("beneficio"));
        assert!(!doc.client.as_ref().unwrap().0.contains_key("empresa"));
        assert_eq!(doc.client.as_ref().unwrap().cpf(), Some("12345678909"));
    }
}
