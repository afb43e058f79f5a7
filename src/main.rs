use clap::Parser;
use miette::{IntoDiagnostic, Result};
use paygate::application::gateway::{PaymentGateway, PaymentOutcome};
use paygate::application::registry::MethodRegistry;
use paygate::config::GatewayConfig;
use paygate::domain::ports::{NotifierRef, RailClientRef, TransactionStoreBox};
use paygate::infrastructure::in_memory::InMemoryTransactionStore;
use paygate::infrastructure::methods::{RailClients, register_builtin};
use paygate::infrastructure::notifier::LogNotifier;
#[cfg(feature = "storage-rocksdb")]
use paygate::infrastructure::rocksdb::RocksDbTransactionStore;
use paygate::infrastructure::simulated_rail::{RailBehavior, SimulatedRail};
use paygate::interfaces::csv::outcome_writer::OutcomeWriter;
use paygate::interfaces::csv::request_reader::PaymentRequestReader;
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input payment requests CSV file
    input: PathBuf,

    /// JSON file with retry policies per payment method.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Maximum number of payments processed at once.
    #[arg(long, default_value_t = 8)]
    concurrency: usize,

    /// Simulated rail timeouts before each operation succeeds.
    #[arg(long, default_value_t = 0)]
    flaky_attempts: u32,

    /// Simulated rails decline authorizations above this amount.
    #[arg(long)]
    decline_above: Option<Decimal>,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn open_store(db_path: Option<PathBuf>) -> Result<TransactionStoreBox> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = RocksDbTransactionStore::open(path).into_diagnostic()?;
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            tracing::warn!(
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
            );
            Ok(Box::new(InMemoryTransactionStore::new()))
        }
        None => Ok(Box::new(InMemoryTransactionStore::new())),
    }
}

fn simulated_rails(cli: &Cli) -> RailClients {
    let behavior = RailBehavior {
        transient_failures: cli.flaky_attempts,
        decline_above: cli.decline_above,
        ..Default::default()
    };
    let rail = |name: &str| -> RailClientRef {
        Arc::new(SimulatedRail::with_behavior(name, behavior.clone()))
    };
    RailClients {
        upi: rail("upi-switch"),
        card: rail("card-network"),
        bank_transfer: rail("bank-rail"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => GatewayConfig::load(path).into_diagnostic()?,
        None => GatewayConfig::default(),
    };
    let policies = config.policies().into_diagnostic()?;

    let registry = Arc::new(MethodRegistry::new());
    register_builtin(&registry, &simulated_rails(&cli)).into_diagnostic()?;

    let store = open_store(cli.db_path.clone())?;
    let notifier: NotifierRef = Arc::new(LogNotifier);
    let gateway = Arc::new(
        PaymentGateway::new(registry, policies, store, notifier)
            .with_replay_capacity(config.replay_capacity),
    );

    let limit = Arc::new(Semaphore::new(cli.concurrency.max(1)));
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = PaymentRequestReader::new(file);
    let mut pending = Vec::new();
    for request in reader.requests() {
        match request {
            Ok(request) => {
                let permit = Arc::clone(&limit).acquire_owned().await.into_diagnostic()?;
                let gateway = Arc::clone(&gateway);
                pending.push(tokio::spawn(async move {
                    let outcome = gateway.process_payment(request).await;
                    drop(permit);
                    outcome
                }));
            }
            Err(e) => {
                tracing::error!(error = %e, "Error reading payment request");
            }
        }
    }

    // Outcomes are reported in input order.
    let mut outcomes: Vec<PaymentOutcome> = Vec::with_capacity(pending.len());
    for handle in pending {
        let outcome = handle.await.into_diagnostic()?;
        for warning in &outcome.warnings {
            tracing::warn!(transaction_id = %outcome.transaction_id, "{warning}");
        }
        outcomes.push(outcome);
    }

    let stdout = io::stdout();
    let mut writer = OutcomeWriter::new(stdout.lock());
    writer.write_outcomes(&outcomes).into_diagnostic()?;

    Ok(())
}
