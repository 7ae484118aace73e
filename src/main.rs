use clap::{Parser, Subcommand};
use loanrecon::application::engine::{Action, ReconEngine};
use loanrecon::config::EngineConfig;
use loanrecon::domain::ports::{LedgerRepository, LedgerStoreRef, SmsGatewayRef};
use loanrecon::infrastructure::in_memory::InMemoryLedgerStore;
use loanrecon::infrastructure::sms_http::HttpSmsGateway;
use loanrecon::interfaces::csv::transaction_reader::TransactionReader;
use loanrecon::interfaces::http;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON ledger snapshot. Loaded if present, written back afterwards.
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    /// Notifications CSV to ingest as pending transactions first
    #[arg(long, global = true)]
    import: Option<PathBuf>,

    /// Identity recorded on claims (default: worker-<uuid>)
    #[arg(long, global = true, env = "RECON_WORKER_ID")]
    worker_id: Option<String>,

    #[arg(long, global = true, env = "RECON_RETRY_BACKOFF_SECS", default_value_t = 30)]
    retry_backoff_secs: u64,

    #[arg(long, global = true, env = "RECON_STUCK_TIMEOUT_SECS", default_value_t = 300)]
    stuck_timeout_secs: u64,

    /// Default limit for process-pending and process-queue
    #[arg(long, global = true, env = "RECON_BATCH_LIMIT", default_value_t = 50)]
    batch_limit: usize,

    /// Retry budget for jobs enqueued by this worker
    #[arg(long, global = true, env = "RECON_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    #[arg(long, global = true, env = "RECON_SMS_TIMEOUT_SECS", default_value_t = 10)]
    sms_timeout_secs: u64,

    /// Do not enqueue a payment SMS after applied transactions
    #[arg(long, global = true)]
    no_notify: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process pending transactions directly, oldest first
    ProcessPending {
        #[arg(long)]
        tenant_id: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Process one transaction by id
    ProcessSingle { transaction_id: String },
    /// Drain the job queue
    ProcessQueue {
        #[arg(long)]
        tenant_id: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Requeue jobs stuck in processing
    RecoverStuck,
    /// Serve the action endpoint over HTTP
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: IpAddr,
        #[arg(long, env = "RECON_PORT", default_value_t = 8080)]
        port: u16,
    },
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        let config = EngineConfig {
            retry_backoff: Duration::from_secs(self.retry_backoff_secs),
            stuck_timeout: Duration::from_secs(self.stuck_timeout_secs),
            default_batch_limit: self.batch_limit,
            default_max_attempts: self.max_attempts,
            notify_on_apply: !self.no_notify,
            sms_timeout: Duration::from_secs(self.sms_timeout_secs),
            ..EngineConfig::default()
        };
        match &self.worker_id {
            Some(worker_id) => config.with_worker_id(worker_id),
            None => config,
        }
    }
}

async fn import_notifications(store: &InMemoryLedgerStore, path: &Path) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    let (mut imported, mut duplicates, mut rejected) = (0usize, 0usize, 0usize);
    for tx_result in TransactionReader::new(file).transactions() {
        match tx_result {
            Ok(tx) => {
                let id = tx.id.clone();
                if store.insert_transaction(tx).await.into_diagnostic()? {
                    imported += 1;
                } else {
                    warn!(transaction_id = %id, "Duplicate transaction id, ignored");
                    duplicates += 1;
                }
            }
            Err(e) => {
                eprintln!("Error reading transaction: {}", e);
                rejected += 1;
            }
        }
    }
    info!(imported, duplicates, rejected, "Notifications imported");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("loanrecon=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.engine_config();

    let store = match &cli.state {
        Some(path) => InMemoryLedgerStore::load(path).await.into_diagnostic()?,
        None => InMemoryLedgerStore::new(),
    };
    if let Some(path) = &cli.import {
        import_notifications(&store, path).await?;
    }

    let shared: LedgerStoreRef = Arc::new(store.clone());
    let gateway: SmsGatewayRef = Arc::new(HttpSmsGateway::new(config.sms_timeout).into_diagnostic()?);
    let engine = ReconEngine::new(shared, gateway, config);

    let action = match cli.command {
        Command::ProcessPending { tenant_id, limit } => Action::ProcessPending { tenant_id, limit },
        Command::ProcessSingle { transaction_id } => Action::ProcessSingle { transaction_id },
        Command::ProcessQueue { tenant_id, limit } => Action::ProcessQueue { tenant_id, limit },
        Command::RecoverStuck => Action::RecoverStuck,
        Command::Serve { host, port } => {
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Could not listen for shutdown signal");
                    std::future::pending::<()>().await;
                }
            };
            http::serve(engine, SocketAddr::new(host, port), shutdown)
                .await
                .into_diagnostic()?;
            if let Some(path) = &cli.state {
                store.save(path).await.into_diagnostic()?;
            }
            return Ok(());
        }
    };

    let response = engine.handle(action).await.into_diagnostic()?;
    println!("{}", serde_json::to_string_pretty(&response).into_diagnostic()?);

    if let Some(path) = &cli.state {
        store.save(path).await.into_diagnostic()?;
    }
    Ok(())
}
