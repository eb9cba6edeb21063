#![forbid(unsafe_code)]
//! HealthChain CLI - add and query patient records on the local ledger

use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color as TableColor, ContentArrangement, Table};
use healthchain::blockchain::Block;
use healthchain::cli::{format_timestamp, load_node_from_config, short_fingerprint};
use healthchain::config::DEFAULT_CONFIG_PATH;
use healthchain::node::LedgerNode;
use healthchain::payload::{normalize_aadhar, MedicalRecord, Payload};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mines a new medical record onto the ledger
    Add {
        /// 12-digit Aadhar number (spaces allowed)
        #[arg(long)]
        aadhar: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        uid: String,
        #[arg(long)]
        age: u8,
        #[arg(long)]
        description: String,
        #[arg(long)]
        prescription: String,
        #[arg(long)]
        notes: Option<String>,
        /// Submitting hospital
        #[arg(long)]
        hospital: Option<String>,
    },
    /// Lists the records stored for a patient
    Records {
        /// 12-digit Aadhar number (spaces allowed)
        aadhar: String,
    },
    /// Lists every block on the ledger
    Chain,
    /// Checks every link and fingerprint on the ledger
    Verify,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let (_config, node) = load_node_from_config::<MedicalRecord>(&cli.config)?;

    match cli.command {
        Commands::Add {
            aadhar,
            name,
            uid,
            age,
            description,
            prescription,
            notes,
            hospital,
        } => {
            let record = MedicalRecord {
                aadhar_number: aadhar,
                patient_name: name,
                patient_uid: uid,
                age,
                description,
                prescription,
                notes,
                hospital,
            };
            add(&node, record).await?;
        }
        Commands::Records { aadhar } => records(&node, &aadhar).await?,
        Commands::Chain => chain(&node).await,
        Commands::Verify => {
            if !verify(&node).await {
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn add(
    node: &LedgerNode<MedicalRecord>,
    record: MedicalRecord,
) -> Result<(), Box<dyn std::error::Error>> {
    let key = record.index_key()?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
    spinner.set_message(format!(
        "Mining record at difficulty {}...",
        node.difficulty().await
    ));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let started = Instant::now();
    let result = node.append(record).await;
    spinner.finish_and_clear();
    let block = result?;

    println!("{}", "✅ Record mined and stored".bright_green().bold());
    println!("  {:<14} {}", "Patient:".cyan(), key);
    println!("  {:<14} {}", "Fingerprint:".cyan(), block.fingerprint);
    println!("  {:<14} {}", "Previous:".cyan(), block.previous_fingerprint);
    println!("  {:<14} {}", "Nonce:".cyan(), block.nonce);
    println!("  {:<14} {}", "Timestamp:".cyan(), format_timestamp(block.timestamp));
    println!(
        "  {:<14} {}",
        "Mining time:".cyan(),
        humantime::format_duration(Duration::from_millis(started.elapsed().as_millis() as u64))
    );
    Ok(())
}

async fn records(
    node: &LedgerNode<MedicalRecord>,
    aadhar: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let key = normalize_aadhar(aadhar)?;
    let blocks = node.lookup(&key).await;

    if blocks.is_empty() {
        println!("{}", format!("No records found for {}", key).yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            header("Date"),
            header("Patient"),
            header("Age"),
            header("Description"),
            header("Prescription"),
            header("Notes"),
            header("Hospital"),
        ]);

    for block in &blocks {
        if let Some(record) = block.payload() {
            table.add_row(vec![
                Cell::new(format_timestamp(block.timestamp)),
                Cell::new(format!("{} ({})", record.patient_name, record.patient_uid)),
                Cell::new(record.age),
                Cell::new(&record.description),
                Cell::new(&record.prescription),
                Cell::new(record.notes.as_deref().unwrap_or("-")),
                Cell::new(record.hospital.as_deref().unwrap_or("-")),
            ]);
        }
    }

    println!(
        "{}",
        format!("📋 {} record(s) for {}", blocks.len(), key)
            .bright_cyan()
            .bold()
    );
    println!("{table}");
    Ok(())
}

async fn chain(node: &LedgerNode<MedicalRecord>) {
    let blocks = node.snapshot().await;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            header("Height"),
            header("Timestamp"),
            header("Key"),
            header("Nonce"),
            header("Fingerprint"),
            header("Previous"),
        ]);

    for (height, block) in blocks.iter().enumerate() {
        table.add_row(vec![
            Cell::new(height),
            Cell::new(format_timestamp(block.timestamp)),
            Cell::new(key_label(block)),
            Cell::new(block.nonce),
            Cell::new(short_fingerprint(&block.fingerprint, 8)),
            Cell::new(short_fingerprint(&block.previous_fingerprint, 8)),
        ]);
    }

    println!("{}", format!("⛓️  {} block(s)", blocks.len()).bright_cyan().bold());
    println!("{table}");
}

async fn verify(node: &LedgerNode<MedicalRecord>) -> bool {
    match node.verify().await {
        Ok(()) => {
            println!(
                "{}",
                format!("✅ Chain is valid ({} records)", node.height().await)
                    .bright_green()
                    .bold()
            );
            true
        }
        Err(e) => {
            eprintln!("{}", format!("❌ Chain is INVALID: {}", e).red().bold());
            false
        }
    }
}

fn header(title: &str) -> Cell {
    Cell::new(title)
        .add_attribute(Attribute::Bold)
        .fg(TableColor::Cyan)
}

fn key_label(block: &Block<MedicalRecord>) -> String {
    match block.index_key() {
        Ok(Some(key)) => key,
        Ok(None) => "genesis".to_string(),
        Err(_) => "invalid".to_string(),
    }
}
