//! `custody`: operate a local custody ledger backed by sled
use anyhow::Context;
use clap::{Parser, Subcommand};
use custody_ledger::config::LedgerConfig;
use custody_ledger::context::InvocationHeader;
use custody_ledger::contract::Operation;
use custody_ledger::evidence::{EvidenceStore, SledEvidenceStore};
use custody_ledger::ledger::Transaction;
use custody_ledger::logger::init_logger;
use custody_ledger::medicine::{MEDICINE_PREFIX, Medicine, MedicineDetail};
use custody_ledger::order::{ORDER_PREFIX, Order};
use custody_ledger::service::{LedgerBackend, LedgerService, SledBackend};
use custody_ledger::transfer::HmacTagVerifier;
use custody_ledger::types::ContentHash;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "custody")]
#[command(about = "Tamper-evident custody ledger for medicine supply chains")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a contract operation as `caller` and commit it
    Invoke {
        /// Operation name, e.g. RegisterMedicine
        operation: String,
        args: Vec<String>,
        #[arg(long)]
        caller: String,
    },
    /// Put a file into the evidence store and print its hash
    StoreEvidence { file: PathBuf },
    /// Fetch evidence by hash
    RetrieveEvidence {
        hash: String,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write a credential for `holder` against an order's current custody hash
    IssueCredential { order_id: String, holder: String },
    /// Print every committed record
    Dump,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = LedgerConfig::from_env();
    init_logger(&config.log_level, config.log_json)?;

    if config.uses_dev_secret() {
        tracing::warn!("CUSTODY_TAG_SECRET is unset, using the development secret");
    }

    let backend = SledBackend::open(&config.db_path)
        .with_context(|| format!("opening ledger at {}", config.db_path.display()))?;
    let evidence = SledEvidenceStore::open(backend.db())?;
    let verifier = HmacTagVerifier::new(config.tag_secret.as_bytes());
    let mut service = LedgerService::new(backend, verifier);

    match cli.command {
        Command::Invoke {
            operation,
            args,
            caller,
        } => {
            let header = InvocationHeader::issue(caller)?;
            let invocation_id = header.invocation_id.clone();
            // queries have nothing to commit
            let payload = if Operation::parse(&operation, &args)?.is_query() {
                service.simulate(header, &operation, &args).map(|e| e.payload)
            } else {
                service.submit(header, &operation, &args)
            }
            .with_context(|| format!("{operation} failed ({invocation_id})"))?;
            print_payload(&operation, &payload)?;
        }
        Command::StoreEvidence { file } => {
            let content =
                std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            println!("{}", evidence.store(&content)?);
        }
        Command::RetrieveEvidence { hash, output } => {
            let content = evidence.retrieve(&ContentHash::parse(&hash)?)?;
            match output {
                Some(path) => std::fs::write(&path, content)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{}", String::from_utf8_lossy(&content)),
            }
        }
        Command::IssueCredential { order_id, holder } => {
            let header = InvocationHeader::issue(holder.clone())?;
            let endorsement = service.simulate(header, "GetOrderDetail", &[order_id])?;
            let order: Order = minicbor::decode(&endorsement.payload)?;
            let credential = service
                .contract()
                .verifier()
                .issue(&order.current_hash, &holder)
                .context("tag secret cannot key the credential mac")?;
            println!("{credential}");
        }
        Command::Dump => {
            for (key, value) in service.backend().entries()? {
                if key.starts_with(MEDICINE_PREFIX) {
                    let medicine: Medicine = minicbor::decode(&value)?;
                    println!("{key} {medicine:?}");
                } else if key.starts_with(ORDER_PREFIX) {
                    let order: Order = minicbor::decode(&value)?;
                    println!("{key} {order:?}");
                } else {
                    println!("{key} {} bytes", value.len());
                }
            }
        }
    }

    Ok(())
}

fn print_payload(operation: &str, payload: &[u8]) -> anyhow::Result<()> {
    match operation {
        "GetMedicineDetail" => {
            let detail: MedicineDetail = minicbor::decode(payload)?;
            println!("{detail:#?}");
        }
        "GetOrderDetail" => {
            let order: Order = minicbor::decode(payload)?;
            println!("{order:#?}");
        }
        "ListTransactions" => {
            let transactions: Vec<Transaction> = minicbor::decode(payload)?;
            println!("{transactions:#?}");
        }
        _ if payload.is_empty() => {}
        _ => match std::str::from_utf8(payload) {
            Ok(text) => println!("{text}"),
            Err(_) => println!("{}", hex::encode(payload)),
        },
    }
    Ok(())
}
