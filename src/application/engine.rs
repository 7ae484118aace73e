use super::processor::{ProcessedItem, TransactionProcessor};
use super::queue::{DrainSummary, QueueDrainer, RetryPolicy};
use super::recovery::StuckJobRecovery;
use super::scanner::BatchScanner;
use super::sms::SmsJobHandler;
use crate::config::EngineConfig;
use crate::domain::ports::{LedgerStoreRef, SmsGatewayRef};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One invocation of the engine, as received over HTTP or the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Action {
    ProcessPending {
        #[serde(default)]
        tenant_id: Option<String>,
        #[serde(default)]
        limit: Option<usize>,
    },
    ProcessSingle {
        transaction_id: String,
    },
    ProcessQueue {
        #[serde(default)]
        tenant_id: Option<String>,
        #[serde(default)]
        limit: Option<usize>,
    },
    RecoverStuck,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::ProcessPending { .. } => "process-pending",
            Action::ProcessSingle { .. } => "process-single",
            Action::ProcessQueue { .. } => "process-queue",
            Action::RecoverStuck => "recover-stuck",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActionResponse {
    Batch {
        processed: usize,
        results: Vec<ProcessedItem>,
    },
    Single(ProcessedItem),
    Queue(DrainSummary),
    Recovered {
        recovered: u64,
    },
}

/// The main entry point of the reconciliation engine.
///
/// `ReconEngine` wires every component onto one shared ledger store and
/// dispatches the four actions. Several engines may share a store; they
/// coordinate only through its atomic primitives.
#[derive(Clone)]
pub struct ReconEngine {
    processor: TransactionProcessor,
    scanner: BatchScanner,
    drainer: QueueDrainer,
    recovery: StuckJobRecovery,
    config: EngineConfig,
}

impl ReconEngine {
    /// Creates a new `ReconEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `store` - The ledger store shared with other workers.
    /// * `sms_gateway` - Delivery channel for payment receipts.
    /// * `config` - Worker identity, retry and batch tunables.
    pub fn new(store: LedgerStoreRef, sms_gateway: SmsGatewayRef, config: EngineConfig) -> Self {
        let processor = TransactionProcessor::new(store.clone(), &config);
        let drainer = QueueDrainer::new(
            store.clone(),
            processor.clone(),
            SmsJobHandler::new(store.clone(), sms_gateway),
            RetryPolicy::new(config.retry_backoff_chrono()),
        );
        Self {
            scanner: BatchScanner::new(store.clone(), processor.clone()),
            recovery: StuckJobRecovery::new(store, config.stuck_timeout_chrono()),
            processor,
            drainer,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs one action. Item-level failures are reported inside the
    /// response; only store failures surface as `Err`.
    pub async fn handle(&self, action: Action) -> Result<ActionResponse> {
        info!(action = action.name(), worker_id = %self.config.worker_id, "Handling action");
        match action {
            Action::ProcessPending { tenant_id, limit } => {
                let limit = limit.unwrap_or(self.config.default_batch_limit);
                let results = self.scanner.scan(tenant_id.as_deref(), limit).await?;
                Ok(ActionResponse::Batch {
                    processed: results.len(),
                    results,
                })
            }
            Action::ProcessSingle { transaction_id } => Ok(ActionResponse::Single(
                self.processor.process_item(&transaction_id).await,
            )),
            Action::ProcessQueue { tenant_id, limit } => {
                let limit = limit.unwrap_or(self.config.default_batch_limit);
                let summary = self.drainer.drain(tenant_id.as_deref(), limit).await?;
                Ok(ActionResponse::Queue(summary))
            }
            Action::RecoverStuck => Ok(ActionResponse::Recovered {
                recovered: self.recovery.recover().await?,
            }),
        }
    }
}
