//! Content hashing for deduplication and eligibility correlation
//!
//! Fields are serialized as key-sorted JSON using `", "` and `": "` separators
//! and `\uXXXX` escapes for non-ASCII text, then digested with SHA-256. Floats
//! are written in their shortest round-trip form with Python-style exponents
//! (`1e+16`, `1.5e-05`). The byte layout matches what upstream producers
//! already store, so hashes stay comparable across both sides of the broker.

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io;

use super::document::ContractDocument;
use crate::types::{RelayError, Result};

/// Duplicity and eligibility fingerprints of one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractHashes {
    pub duplicity: String,
    pub eligibility: String,
}

impl ContractHashes {
    /// Derive both hashes from a submitted document
    pub fn for_document(doc: &ContractDocument) -> Result<Self> {
        let cpf = doc
            .client
            .as_ref()
            .and_then(|c| c.cpf())
            .ok_or_else(|| RelayError::Malformed("cliente.nuCpf is required".into()))?;
        let contract_date = doc
            .contract
            .contract_date
            .as_deref()
            .ok_or_else(|| RelayError::Malformed("contrato.dtContrato is required".into()))?;

        Ok(Self {
            duplicity: duplicity_hash(
                &doc.contract.contract_number.as_key(),
                &doc.contract.ccb_number.as_key(),
            ),
            eligibility: eligibility_hash(
                cpf,
                contract_date,
                doc.total_installment_amount()?,
                doc.installments().len(),
            ),
        })
    }
}

/// Fingerprint of `(contract number, CCB number)`
pub fn duplicity_hash(contract_number: &str, ccb_number: &str) -> String {
    let mut fields = BTreeMap::new();
    fields.insert("nuContratoFacta", Value::from(contract_number));
    fields.insert("nuContratoCCB", Value::from(ccb_number));
    digest(&fields)
}

/// Fingerprint of the borrower and financial facts of a submission
pub fn eligibility_hash(
    cpf: &str,
    contract_date: &str,
    total_installment_amount: f64,
    installment_count: usize,
) -> String {
    // An empty installment list totals the integer 0, not 0.0
    let total = if installment_count == 0 {
        Value::from(0)
    } else {
        Value::from(total_installment_amount)
    };

    let mut fields = BTreeMap::new();
    fields.insert("nuCpf", Value::from(cpf));
    fields.insert("dtContrato", Value::from(contract_date));
    fields.insert("vrTotal", total);
    fields.insert("prazo", Value::from(installment_count));
    digest(&fields)
}

fn digest(fields: &BTreeMap<&str, Value>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(fields));
    hex::encode(hasher.finalize())
}

fn canonical_json(fields: &BTreeMap<&str, Value>) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, CanonicalFormatter);
    fields
        .serialize(&mut serializer)
        .expect("string-keyed maps always serialize into a Vec");
    buf
}

/// JSON formatter producing the canonical separators and ASCII-only output
struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(float_repr(value).as_bytes())
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Shortest round-trip rendering of a finite float, switching to exponent
/// notation below 1e-4 and from 1e16 upwards
fn float_repr(value: f64) -> String {
    let scientific = format!("{:e}", value);
    let (mantissa, exponent) = scientific
        .split_once('e')
        .unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if mantissa.starts_with('-') { "-" } else { "" };
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();

    if (-4..16).contains(&exponent) {
        let point = exponent + 1;
        if point <= 0 {
            return format!("{sign}0.{}{digits}", "0".repeat(point.unsigned_abs() as usize));
        }
        let point = point as usize;
        if digits.len() <= point {
            format!("{sign}{digits}{}.0", "0".repeat(point - digits.len()))
        } else {
            format!("{sign}{}.{}", &digits[..point], &digits[point..])
        }
    } else {
        let (head, tail) = digits.split_at(1);
        let fraction = if tail.is_empty() {
            String::new()
        } else {
            format!(".{tail}")
        };
        let exponent_sign = if exponent < 0 { '-' } else { '+' };
        format!("{sign}{head}{fraction}e{exponent_sign}{:02}", exponent.unsigned_abs())
    }
}
