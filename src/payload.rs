//! Block payloads and their canonical encoding
//!
//! Every block carries a [`BlockData`]: either the fixed genesis marker or an
//! application payload implementing [`Payload`]. A payload names the key the
//! ledger indexes it under and produces the canonical bytes its fingerprint is
//! computed over.

use crate::error::{ChainError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

const AADHAR_DIGITS: usize = 12;
const MAX_AGE: u8 = 150;

/// Application data that can be recorded on the ledger.
pub trait Payload: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    /// Key the ledger groups this payload under.
    fn index_key(&self) -> Result<String>;

    /// Bytes the block fingerprint is computed over.
    fn canonical_bytes(&self) -> Result<Vec<u8>> {
        canonical_json(self)
    }
}

/// Encodes `value` as JSON with object keys sorted.
///
/// Going through `serde_json::Value` (a `BTreeMap` for objects) makes the
/// output independent of struct field order and map iteration order.
pub fn canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let value = serde_json::to_value(value)
        .map_err(|e| ChainError::InvalidPayload(format!("Failed to serialize payload: {}", e)))?;
    serde_json::to_vec(&value)
        .map_err(|e| ChainError::InvalidPayload(format!("Failed to encode payload: {}", e)))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum BlockData<P> {
    Genesis(String),
    Entry(P),
}

impl<P: Payload> BlockData<P> {
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        match self {
            BlockData::Genesis(marker) => canonical_json(marker),
            BlockData::Entry(payload) => payload.canonical_bytes(),
        }
    }

    pub fn payload(&self) -> Option<&P> {
        match self {
            BlockData::Genesis(_) => None,
            BlockData::Entry(payload) => Some(payload),
        }
    }

    pub fn index_key(&self) -> Result<Option<String>> {
        self.payload().map(Payload::index_key).transpose()
    }
}

/// A patient record as submitted by a hospital.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicalRecord {
    /// 12-digit Aadhar number; spaces are allowed and ignored.
    pub aadhar_number: String,
    pub patient_name: String,
    pub patient_uid: String,
    pub age: u8,
    pub description: String,
    pub prescription: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Identifier of the submitting hospital.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospital: Option<String>,
}

impl MedicalRecord {
    pub fn validate(&self) -> Result<()> {
        normalize_aadhar(&self.aadhar_number)?;
        if self.patient_name.trim().is_empty() {
            return Err(ChainError::InvalidPayload(
                "Patient name must not be empty".to_string(),
            ));
        }
        if self.age > MAX_AGE {
            return Err(ChainError::InvalidPayload(format!(
                "Age must be between 0 and {}, got {}",
                MAX_AGE, self.age
            )));
        }
        Ok(())
    }
}

impl Payload for MedicalRecord {
    fn index_key(&self) -> Result<String> {
        self.validate()?;
        normalize_aadhar(&self.aadhar_number)
    }
}

/// Strips whitespace from an Aadhar number and checks it is exactly 12 digits.
pub fn normalize_aadhar(raw: &str) -> Result<String> {
    let clean: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if clean.len() != AADHAR_DIGITS || !clean.chars().all(|c| c.is_ascii_digit()) {
        return Err(ChainError::InvalidPayload(format!(
            "Aadhar number must be {} digits, got {:?}",
            AADHAR_DIGITS, raw
        )));
    }
    Ok(clean)
}

/// A free-form JSON value filed under an explicit key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedValue {
    pub key: String,
    pub value: serde_json::Value,
}

impl KeyedValue {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

impl Payload for KeyedValue {
    /// The key verbatim; blank keys are rejected.
    fn index_key(&self) -> Result<String> {
        if self.key.trim().is_empty() {
            return Err(ChainError::InvalidPayload("Key must not be empty".to_string()));
        }
        Ok(self.key.clone())
    }
}
