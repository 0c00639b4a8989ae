use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use msgpool::config::{ClusterConfig, SignalPolicy};
use msgpool::coordination::maintenance;
use msgpool::coordination::types::ProcessName;
use msgpool::coordination::worker::Worker;
use msgpool::signals;
use msgpool::store::SharedStore;
use msgpool::store::client::RemoteStore;
use msgpool::store::handlers::router;
use msgpool::store::memory::MemoryStore;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Self-healing single-writer message generation over a shared store
#[derive(Parser, Debug)]
#[command(name = "msgpool", version)]
struct Cli {
    /// Base URL of the shared store server
    #[arg(long = "store", global = true, default_value = "http://127.0.0.1:6390")]
    store_url: String,

    /// Use a private in-process store instead (single-process runs)
    #[arg(long, global = true, conflicts_with = "store_url")]
    in_memory: bool,

    /// Maximum log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Join the pool: consume messages, take over generation when it stalls
    Worker(WorkerArgs),
    /// Drain and print the errors list
    Errors,
    /// Delete every protocol key
    Clean,
    /// Print a JSON snapshot of the protocol keys
    Status,
    /// Serve a shared in-memory store over HTTP
    Store {
        #[arg(long, default_value = "127.0.0.1:6390")]
        bind: SocketAddr,
    },
}

#[derive(Args, Debug)]
struct WorkerArgs {
    /// Cadence between two emissions, in milliseconds
    #[arg(short, long, default_value_t = 500)]
    interval_ms: u64,

    /// Lag after which the generator is judged stale, in milliseconds
    #[arg(short, long, default_value_t = 900)]
    max_interval_ms: u64,

    /// Number of messages in the sequence
    #[arg(short = 'n', long, default_value_t = 100)]
    count: u64,

    /// Bounded wait of a single queue pop, in milliseconds
    #[arg(long, default_value_t = 250)]
    poll_ms: u64,

    /// Bounded wait when acquiring a lock, in milliseconds
    #[arg(long, default_value_t = 500)]
    lock_wait_ms: u64,

    /// Expiry of a held lock, in milliseconds
    #[arg(long, default_value_t = 5000)]
    lock_ttl_ms: u64,

    /// Log and ignore termination signals (and Ctrl-Z) instead of shutting down
    #[arg(long)]
    ignore_signals: bool,
}

impl WorkerArgs {
    fn config(&self) -> ClusterConfig {
        ClusterConfig {
            interval: Duration::from_millis(self.interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
            message_count: self.count,
            poll_timeout: Duration::from_millis(self.poll_ms),
            lock_wait: Duration::from_millis(self.lock_wait_ms),
            lock_ttl: Duration::from_millis(self.lock_ttl_ms),
            signal_policy: if self.ignore_signals {
                SignalPolicy::Ignore
            } else {
                SignalPolicy::Graceful
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Stdout is reserved for command output (`errors`, `status`).
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Command::Store { bind } => {
            if cli.in_memory {
                bail!("--in-memory makes no sense for the store server");
            }
            serve_store(*bind).await
        }
        Command::Worker(args) => {
            let config = args.config();
            config.validate().context("Invalid worker configuration")?;

            let store = open_store(&cli);
            let name = ProcessName::current();
            let shutdown = signals::install(config.signal_policy);

            let report = Worker::new(store, name, config, shutdown).run().await?;
            tracing::info!("Consumed indices: {:?}", report.consumed);
            Ok(())
        }
        Command::Errors => {
            let store = open_store(&cli);
            for entry in maintenance::drain_errors(store.as_ref()).await? {
                println!("{}", entry);
            }
            Ok(())
        }
        Command::Clean => {
            let store = open_store(&cli);
            maintenance::clean(store.as_ref()).await?;
            Ok(())
        }
        Command::Status => {
            let store = open_store(&cli);
            let status = maintenance::status(store.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(())
        }
    }
}

fn open_store(cli: &Cli) -> Arc<dyn SharedStore> {
    if cli.in_memory {
        tracing::info!("Using a private in-memory store");
        Arc::new(MemoryStore::new())
    } else {
        tracing::info!("Using shared store at {}", cli.store_url);
        Arc::new(RemoteStore::new(&cli.store_url))
    }
}

async fn serve_store(bind: SocketAddr) -> Result<()> {
    let app = router(Arc::new(MemoryStore::new()));

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind store server to {}", bind))?;
    tracing::info!("Store server listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Store server shutting down");
        })
        .await?;

    Ok(())
}
