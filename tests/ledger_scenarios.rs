//! Integration tests for ledger append, lookup and tamper detection

use healthchain::blockchain::{Block, Ledger};
use healthchain::error::ChainError;
use healthchain::payload::{BlockData, KeyedValue, MedicalRecord, Payload};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::json;

fn kv(key: &str, value: i64) -> KeyedValue {
    KeyedValue::new(key, json!(value))
}

/// Builds the ledger from the reference scenario: keys A, A, B at difficulty 1.
fn reference_ledger() -> Result<Ledger<KeyedValue>, Box<dyn std::error::Error>> {
    let mut ledger = Ledger::new(1)?;
    ledger.append(kv("A", 1))?;
    ledger.append(kv("A", 2))?;
    ledger.append(kv("B", 3))?;
    Ok(ledger)
}

#[test]
fn test_reference_scenario() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = reference_ledger()?;

    assert_eq!(ledger.blocks.len(), 4);

    let a = ledger.lookup("A");
    assert_eq!(a.len(), 2);
    assert_eq!(a[0].payload().map(|p| p.value.clone()), Some(json!(1)));
    assert_eq!(a[1].payload().map(|p| p.value.clone()), Some(json!(2)));
    assert_eq!(ledger.lookup("B").len(), 1);
    assert_eq!(ledger.lookup("C").len(), 0);

    assert!(ledger.validate());
    Ok(())
}

#[test]
fn test_reference_scenario_tampering() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = reference_ledger()?;

    ledger.blocks[2].data = BlockData::Entry(kv("A", 99));

    assert!(!ledger.validate());
    assert_eq!(
        ledger.verify(),
        Err(ChainError::FingerprintMismatch { height: 2 })
    );
    Ok(())
}

#[test]
fn test_every_appended_block_meets_difficulty() -> Result<(), Box<dyn std::error::Error>> {
    for difficulty in 0..=2 {
        let mut ledger = Ledger::new(difficulty)?;
        for i in 0..3 {
            let block = ledger.append(kv("A", i))?;
            assert!(block.fingerprint.starts_with(&"0".repeat(difficulty as usize)));
        }
    }
    Ok(())
}

#[test]
fn test_validate_holds_after_each_append() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = Ledger::new(1)?;
    for i in 0..6 {
        let key = if i % 2 == 0 { "even" } else { "odd" };
        ledger.append(kv(key, i))?;
        assert!(ledger.validate());
    }
    Ok(())
}

#[test]
fn test_lookup_is_exact_subsequence() -> Result<(), Box<dyn std::error::Error>> {
    let keys = ["x", "y", "x", "z", "x", "y"];
    let mut ledger = Ledger::new(0)?;
    for (i, key) in keys.iter().enumerate() {
        ledger.append(kv(key, i as i64))?;
    }

    for key in ["x", "y", "z", "w"] {
        let expected: Vec<&Block<KeyedValue>> = ledger.blocks[1..]
            .iter()
            .filter(|b| b.payload().map(|p| p.key.as_str()) == Some(key))
            .collect();
        assert_eq!(ledger.lookup(key), expected);
    }
    Ok(())
}

#[test]
fn test_lookup_matches_keys_verbatim() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger = Ledger::new(0)?;
    ledger.append(kv(" A ", 1))?;
    ledger.append(kv("A", 2))?;

    let padded = ledger.lookup(" A ");
    assert_eq!(padded.len(), 1);
    assert_eq!(padded[0].payload().map(|p| p.value.clone()), Some(json!(1)));

    let plain = ledger.lookup("A");
    assert_eq!(plain.len(), 1);
    assert_eq!(plain[0].payload().map(|p| p.value.clone()), Some(json!(2)));
    Ok(())
}

#[test]
fn test_genesis_stays_first_and_unmined() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = reference_ledger()?;
    let genesis = &ledger.blocks[0];
    assert!(genesis.is_genesis());
    assert_eq!(genesis.nonce, 0);
    assert_eq!(genesis, &Block::genesis()?);
    assert!(ledger.blocks[1..].iter().all(|b| !b.is_genesis()));
    Ok(())
}

#[test]
fn test_any_field_tamper_is_detected() -> Result<(), Box<dyn std::error::Error>> {
    let ledger = reference_ledger()?;

    let mut tampered = ledger.clone();
    tampered.blocks[1].timestamp += 1;
    assert!(!tampered.validate());

    let mut tampered = ledger.clone();
    tampered.blocks[3].nonce += 1;
    assert!(!tampered.validate());

    let mut tampered = ledger.clone();
    tampered.blocks[2].previous_fingerprint = "0".repeat(64);
    assert!(!tampered.validate());

    // Re-fingerprinting a tampered block breaks its successor's link instead.
    let mut tampered = ledger.clone();
    tampered.blocks[1].data = BlockData::Entry(kv("A", 100));
    tampered.blocks[1].recompute_fingerprint()?;
    assert_eq!(
        tampered.verify(),
        Err(ChainError::InvalidBlockLinkage { height: 2 })
    );
    Ok(())
}

#[test]
fn test_medical_records_grouped_by_aadhar() -> Result<(), Box<dyn std::error::Error>> {
    let record = |aadhar: &str, description: &str| MedicalRecord {
        aadhar_number: aadhar.to_string(),
        patient_name: "Ravi Kumar".to_string(),
        patient_uid: "UID-7".to_string(),
        age: 58,
        description: description.to_string(),
        prescription: "Metformin 500mg".to_string(),
        notes: Some("Follow up in 3 months".to_string()),
        hospital: None,
    };

    let mut ledger = Ledger::new(1)?;
    ledger.append(record("1234 5678 9012", "Type 2 diabetes"))?;
    ledger.append(record("123456789012", "HbA1c review"))?;
    ledger.append(record("9999 8888 7777", "Fracture"))?;

    let history = ledger.entries("123456789012");
    let descriptions: Vec<_> = history.iter().map(|r| r.description.as_str()).collect();
    assert_eq!(descriptions, vec!["Type 2 diabetes", "HbA1c review"]);

    let err = ledger
        .append(record("1234", "Invalid Aadhar"))
        .unwrap_err();
    assert!(matches!(err, ChainError::InvalidPayload(_)));
    assert_eq!(ledger.blocks.len(), 4);
    Ok(())
}

/// A payload whose serialization always fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Unencodable {
    key: String,
    #[serde(serialize_with = "refuse")]
    blob: Vec<u8>,
}

fn refuse<S: Serializer>(_: &[u8], _: S) -> Result<S::Ok, S::Error> {
    Err(serde::ser::Error::custom("blob cannot be encoded"))
}

impl Payload for Unencodable {
    fn index_key(&self) -> healthchain::error::Result<String> {
        Ok(self.key.clone())
    }
}

#[test]
fn test_unencodable_payload_leaves_no_block() -> Result<(), Box<dyn std::error::Error>> {
    let mut ledger: Ledger<Unencodable> = Ledger::new(1)?;
    let err = ledger
        .append(Unencodable {
            key: "A".to_string(),
            blob: vec![1, 2, 3],
        })
        .unwrap_err();
    assert!(matches!(err, ChainError::InvalidPayload(_)));
    assert_eq!(ledger.blocks.len(), 1);
    assert!(ledger.lookup("A").is_empty());
    Ok(())
}
