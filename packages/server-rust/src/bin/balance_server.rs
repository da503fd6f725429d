//! Balance server: hosts the customer service on an in-process bus backed
//! by a redb balance table.
//!
//! `serve` reads one request body per stdin line, sends it to the
//! `customer.balance` endpoint, and prints the reply (or error signal) as a
//! JSON line. Notifications are logged as they are broadcast.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use balance_core::subject::BALANCE_NOTIFICATION_PREFIX;
use balance_server::bus::{MemoryBus, Reply};
use balance_server::service::{start_service, DeliveryMode, ServiceSettings};
use balance_server::storage::RedbBalanceStore;
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, env = "BALANCE_LOG_FORMAT", default_value = "pretty")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve balance requests read from stdin
    Serve {
        /// redb database holding balance tables
        #[arg(long, env = "BALANCE_DB_PATH", default_value = "balances.redb")]
        db_path: PathBuf,

        /// Table to read balances from
        #[arg(long, env = "BALANCE_TABLE", default_value = "balances")]
        table: String,

        /// Version reported in service info
        #[arg(long, default_value = "0.0.1")]
        service_version: String,

        /// Upper bound for a single request in milliseconds
        #[arg(long, default_value_t = 30_000)]
        request_timeout_ms: u64,

        /// Requests processed at once before new ones are shed
        #[arg(long, default_value_t = 1000)]
        max_concurrent: u32,

        /// Ordering of the notification publish and the reply
        #[arg(long, value_enum, default_value = "coupled")]
        delivery_mode: DeliveryMode,

        /// How long shutdown waits for in-flight requests in milliseconds
        #[arg(long, default_value_t = 5_000)]
        drain_timeout_ms: u64,
    },
    /// Record a customer's balance
    SetBalance {
        #[arg(long, env = "BALANCE_DB_PATH", default_value = "balances.redb")]
        db_path: PathBuf,

        #[arg(long, env = "BALANCE_TABLE", default_value = "balances")]
        table: String,

        customer_id: String,

        #[arg(allow_negative_numbers = true)]
        balance: i64,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Pretty => builder.with_target(false).init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Serve {
            db_path,
            table,
            service_version,
            request_timeout_ms,
            max_concurrent,
            delivery_mode,
            drain_timeout_ms,
        } => {
            let settings = ServiceSettings {
                version: service_version,
                table_name: table,
                default_request_timeout_ms: request_timeout_ms,
                max_concurrent_requests: max_concurrent,
                delivery_mode,
                ..ServiceSettings::default()
            };
            serve(db_path, settings, Duration::from_millis(drain_timeout_ms)).await
        }
        Command::SetBalance {
            db_path,
            table,
            customer_id,
            balance,
        } => {
            let store = RedbBalanceStore::open(&db_path)?;
            let previous = store.set_balance(&table, &customer_id, balance).await?;
            info!(
                table = %table,
                customer_id = %customer_id,
                balance,
                ?previous,
                "balance recorded"
            );
            Ok(())
        }
    }
}

async fn serve(
    db_path: PathBuf,
    settings: ServiceSettings,
    drain_timeout: Duration,
) -> anyhow::Result<()> {
    let store = RedbBalanceStore::open(&db_path)
        .with_context(|| format!("opening balance database {}", db_path.display()))?;
    let bus = Arc::new(MemoryBus::new());

    let mut notifications = bus.subscribe(&format!("{BALANCE_NOTIFICATION_PREFIX}.>"))?;
    let tap = tokio::spawn(async move {
        while let Some(msg) = notifications.next().await {
            info!(
                subject = %msg.subject,
                payload = %String::from_utf8_lossy(&msg.payload),
                "notification"
            );
        }
    });

    let timeout = Duration::from_millis(settings.default_request_timeout_ms);
    let running = start_service(bus.clone(), Arc::new(store), settings).await?;
    let subject = running.endpoint_subject().to_string();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let output = match bus.request(&subject, Bytes::from(line), timeout).await {
                    Ok(Reply::Data(body)) => String::from_utf8_lossy(&body).into_owned(),
                    Ok(Reply::Error(signal)) => serde_json::to_string(&signal)?,
                    Err(e) => {
                        warn!(error = %e, "request failed");
                        serde_json::json!({ "error": e.to_string() }).to_string()
                    }
                };
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{output}")?;
                stdout.flush()?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received");
                break;
            }
        }
    }

    let drained = running.shutdown(drain_timeout).await;
    bus.close();
    // The tap ends once the bus closes.
    let _ = tap.await;
    info!(drained, "balance server stopped");
    Ok(())
}
