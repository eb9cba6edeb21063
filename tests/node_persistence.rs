//! Integration tests for the persisted ledger node

use healthchain::blockchain::Block;
use healthchain::config::{parse_config, Config};
use healthchain::error::ChainError;
use healthchain::node::LedgerNode;
use healthchain::payload::{BlockData, KeyedValue, MedicalRecord};
use healthchain::persistence::{Database, Persistence};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn on_disk_config(dir: &TempDir, difficulty: u32) -> Result<Config, Box<dyn std::error::Error>> {
    let db_path = dir.path().join("data").join("healthchain.db");
    let source = format!(
        "[ledger]\ndifficulty = {}\n\n[database]\npath = {:?}\n",
        difficulty,
        db_path.to_string_lossy()
    );
    Ok(parse_config(&source)?)
}

fn record(aadhar: &str, description: &str) -> MedicalRecord {
    MedicalRecord {
        aadhar_number: aadhar.to_string(),
        patient_name: "Meera Iyer".to_string(),
        patient_uid: "UID-19".to_string(),
        age: 27,
        description: description.to_string(),
        prescription: "Rest".to_string(),
        notes: None,
        hospital: Some("Apollo".to_string()),
    }
}

#[tokio::test]
async fn test_records_survive_restart() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let config = on_disk_config(&dir, 1)?;

    {
        let node: LedgerNode<MedicalRecord> = LedgerNode::init(config.clone())?;
        node.append(record("1111 2222 3333", "Sprained ankle")).await?;
        node.append(record("1111 2222 3333", "Follow-up")).await?;
        node.append(record("4444 5555 6666", "Checkup")).await?;
    }

    let node: LedgerNode<MedicalRecord> = LedgerNode::init(config)?;
    assert_eq!(node.height().await, 3);
    assert!(node.validate().await);

    let history = node.lookup("111122223333").await;
    let descriptions: Vec<_> = history
        .iter()
        .filter_map(|b| b.payload())
        .map(|r| r.description.clone())
        .collect();
    assert_eq!(descriptions, vec!["Sprained ankle", "Follow-up"]);

    // Appending after a restart extends the stored tail.
    node.append(record("4444 5555 6666", "Vaccination")).await?;
    assert_eq!(node.lookup("444455556666").await.len(), 2);
    assert!(node.validate().await);
    Ok(())
}

#[tokio::test]
async fn test_restart_with_raised_difficulty_keeps_stored_difficulty(
) -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;

    {
        let node: LedgerNode<MedicalRecord> = LedgerNode::init(on_disk_config(&dir, 0)?)?;
        node.append(record("1111 2222 3333", "Sprained ankle")).await?;
        node.append(record("1111 2222 3333", "Follow-up")).await?;
    }

    let node: LedgerNode<MedicalRecord> = LedgerNode::init(on_disk_config(&dir, 3)?)?;
    let difficulty = node.difficulty().await;
    assert_eq!(difficulty, 0);
    assert!(node
        .snapshot()
        .await
        .iter()
        .skip(1)
        .all(|block| block.meets_difficulty(difficulty)));
    Ok(())
}

#[tokio::test]
async fn test_tampered_database_refuses_to_load() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let db_path = dir.path().join("ledger.db");
    let db_path = db_path.to_string_lossy().to_string();

    let mut config = Config::default();
    config.ledger.difficulty = 1;
    config.database.path = db_path.clone();

    {
        let node: LedgerNode<KeyedValue> = LedgerNode::init(config.clone())?;
        node.append(KeyedValue::new("A", json!({"value": 1}))).await?;
        node.append(KeyedValue::new("A", json!({"value": 2}))).await?;
    }

    tamper_stored_payload(&db_path)?;

    let err = LedgerNode::<KeyedValue>::init(config).err();
    assert_eq!(err, Some(ChainError::FingerprintMismatch { height: 1 }));
    Ok(())
}

/// Rewrites block 1's payload in place, keeping its stored fingerprint.
fn tamper_stored_payload(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open(path)?;
    let mut blocks: Vec<Block<KeyedValue>> = db.load_blocks()?;
    blocks[1].data = BlockData::Entry(KeyedValue::new("A", json!({"value": 99})));
    db.save_block(1, &blocks[1])?;
    Ok(())
}

#[tokio::test]
async fn test_shared_store_between_nodes() -> Result<(), Box<dyn std::error::Error>> {
    let store: Arc<dyn Persistence<KeyedValue>> = Arc::new(Database::open_in_memory()?);
    let mut config = Config::default();
    config.ledger.difficulty = 1;

    let writer = LedgerNode::with_persistence(config.clone(), store.clone())?;
    writer.append(KeyedValue::new("B", json!(3))).await?;

    let reader = LedgerNode::with_persistence(config, store)?;
    assert_eq!(reader.snapshot().await, writer.snapshot().await);
    Ok(())
}
