use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use mpesa_core::application::engine::{PaymentEngine, Stores};
use mpesa_core::application::events::{SaleEventWorker, sale_event_channel};
use mpesa_core::application::initiator::PaymentRequest;
use mpesa_core::config::{GatewayConfig, PaymentSettings};
use mpesa_core::gateway::daraja::DarajaClient;
use mpesa_core::infrastructure::in_memory::{
    InMemoryPaymentStore, InMemoryProductStore, InMemorySaleStore,
};
#[cfg(feature = "storage-rocksdb")]
use mpesa_core::infrastructure::rocksdb::RocksDBStore;
use mpesa_core::interfaces::csv::payment_writer::PaymentWriter;
use mpesa_core::interfaces::csv::product_reader::ProductReader;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const SALE_EVENT_CAPACITY: usize = 256;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send an STK push to the customer's phone
    Initiate {
        #[arg(long)]
        shop_id: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        product_id: Option<String>,
        #[arg(long, default_value = "")]
        account_reference: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Apply a gateway callback payload read from a file, or stdin with `-`
    Callback { payload: PathBuf },
    /// Re-send the push for a pending payment
    Retry { payment_id: Uuid },
    Cancel {
        payment_id: Uuid,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Ask the gateway for the status of a pending payment
    Verify { payment_id: Uuid },
    /// Record the sale for a completed payment that has none yet
    Reconcile { payment_id: Uuid },
    /// Time out expired pending payments
    Reap {
        /// Sweep once and exit instead of running until interrupted
        #[arg(long)]
        once: bool,
    },
    /// Load a product catalogue CSV
    ImportProducts { input: PathBuf },
    /// Write every payment to stdout as CSV
    Export,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let stores = open_stores(cli.db_path)?;

    let gateway = GatewayConfig::from_env();
    let settings = PaymentSettings::from_env();
    let transport = Arc::new(DarajaClient::new(&gateway).into_diagnostic()?);

    let (events, receiver) = sale_event_channel(SALE_EVENT_CAPACITY);
    let worker = tokio::spawn(SaleEventWorker::new(receiver).run());
    let engine = PaymentEngine::new(gateway, settings, transport, stores, Some(events));

    let outcome = run(&engine, cli.command).await;

    // The worker drains once the engine, and with it the last sender, is gone.
    drop(engine);
    if let Ok(handled) = worker.await {
        tracing::debug!(handled, "sale event worker finished");
    }
    outcome
}

async fn run(engine: &PaymentEngine, command: Command) -> Result<()> {
    match command {
        Command::Initiate {
            shop_id,
            amount,
            phone,
            product_id,
            account_reference,
            description,
        } => {
            let initiation = engine
                .initiate(PaymentRequest {
                    shop_id,
                    product_id,
                    amount,
                    phone,
                    account_reference,
                    description,
                })
                .await
                .into_diagnostic()?;
            print_json(&initiation.payment)?;
            initiation.outcome.into_diagnostic()?;
        }
        Command::Callback { payload } => {
            let raw = read_input(&payload)?;
            let payment = engine.process_callback(&raw).await.into_diagnostic()?;
            print_json(&payment)?;
        }
        Command::Retry { payment_id } => {
            let initiation = engine.retry_payment(payment_id).await.into_diagnostic()?;
            print_json(&initiation.payment)?;
            initiation.outcome.into_diagnostic()?;
        }
        Command::Cancel { payment_id, reason } => {
            let payment = engine
                .cancel_payment(payment_id, reason)
                .await
                .into_diagnostic()?;
            print_json(&payment)?;
        }
        Command::Verify { payment_id } => {
            let payment = engine.verify_payment(payment_id).await.into_diagnostic()?;
            print_json(&payment)?;
        }
        Command::Reconcile { payment_id } => {
            let outcome = engine.reconcile(payment_id).await.into_diagnostic()?;
            println!("{:?}", outcome);
        }
        Command::Reap { once: true } => {
            let timed_out = engine.sweep_expired().await.into_diagnostic()?;
            println!("{} payments timed out", timed_out);
        }
        Command::Reap { once: false } => {
            let (stop, shutdown) = watch::channel(false);
            let reaper = engine.spawn_reaper(shutdown);
            tokio::signal::ctrl_c().await.into_diagnostic()?;
            let _ = stop.send(true);
            reaper.await.into_diagnostic()?;
        }
        Command::ImportProducts { input } => {
            let file = File::open(input).into_diagnostic()?;
            let mut imported = 0usize;
            for product in ProductReader::new(file).products() {
                match product {
                    Ok(product) => {
                        engine
                            .stores()
                            .products
                            .store(product)
                            .await
                            .into_diagnostic()?;
                        imported += 1;
                    }
                    Err(e) => tracing::warn!("skipping product row: {}", e),
                }
            }
            println!("{} products imported", imported);
        }
        Command::Export => {
            let payments = engine.stores().payments.all().await.into_diagnostic()?;
            let stdout = io::stdout();
            let mut writer = PaymentWriter::new(stdout.lock());
            writer.write_payments(&payments).into_diagnostic()?;
        }
    }
    Ok(())
}

fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = Arc::new(RocksDBStore::open(path).into_diagnostic()?);
            Ok(Stores {
                payments: store.clone(),
                products: store.clone(),
                sales: store,
            })
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(in_memory_stores())
        }
        None => Ok(in_memory_stores()),
    }
}

fn in_memory_stores() -> Stores {
    Stores {
        payments: Arc::new(InMemoryPaymentStore::new()),
        products: Arc::new(InMemoryProductStore::new()),
        sales: Arc::new(InMemorySaleStore::new()),
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    let mut raw = Vec::new();
    if path.as_os_str() == "-" {
        io::stdin().read_to_end(&mut raw).into_diagnostic()?;
    } else {
        File::open(path)
            .into_diagnostic()?
            .read_to_end(&mut raw)
            .into_diagnostic()?;
    }
    Ok(raw)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}
