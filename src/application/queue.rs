use super::processor::{ProcessOutcome, TransactionProcessor};
use super::sms::SmsJobHandler;
use crate::domain::loan::DisbursementResult;
use crate::domain::ports::LedgerStoreRef;
use crate::domain::queue::{JobType, QueueJob};
use crate::domain::transaction::TransactionStatus;
use crate::error::{ReconError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

const TRANSACTION_ID: &str = "transaction_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DrainSummary {
    pub processed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { at: DateTime<Utc> },
    Dead,
}

/// Fixed-backoff retry budget. The claim already counted the attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    backoff: chrono::Duration,
}

impl RetryPolicy {
    pub fn new(backoff: chrono::Duration) -> Self {
        Self { backoff }
    }

    pub fn decide(&self, job: &QueueJob, error: &ReconError, now: DateTime<Utc>) -> RetryDecision {
        if error.is_permanent() || job.attempts >= job.max_attempts {
            RetryDecision::Dead
        } else {
            RetryDecision::Retry {
                at: now + self.backoff,
            }
        }
    }
}

/// Applies provider callbacks for loan disbursements.
#[derive(Clone)]
pub struct DisbursementResultHandler {
    store: LedgerStoreRef,
}

impl DisbursementResultHandler {
    pub fn new(store: LedgerStoreRef) -> Self {
        Self { store }
    }

    pub async fn handle(&self, job: &QueueJob) -> Result<()> {
        let result: DisbursementResult = serde_json::from_value(job.payload.clone())
            .map_err(|e| ReconError::PayloadMalformed(format!("disbursement result: {e}")))?;
        self.store.apply_disbursement_result(&result).await?;
        info!(
            job_id = job.id,
            loan_id = %result.loan_id,
            result_code = result.result_code,
            success = result.succeeded(),
            "Disbursement result applied"
        );
        Ok(())
    }
}

/// Claims and runs queued jobs until the queue is empty or the limit is hit.
#[derive(Clone)]
pub struct QueueDrainer {
    store: LedgerStoreRef,
    processor: TransactionProcessor,
    sms: SmsJobHandler,
    disbursements: DisbursementResultHandler,
    policy: RetryPolicy,
}

impl QueueDrainer {
    pub fn new(
        store: LedgerStoreRef,
        processor: TransactionProcessor,
        sms: SmsJobHandler,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            disbursements: DisbursementResultHandler::new(store.clone()),
            store,
            processor,
            sms,
            policy,
        }
    }

    pub async fn drain(&self, tenant_filter: Option<&str>, limit: usize) -> Result<DrainSummary> {
        let worker_id = self.processor.worker_id();
        let mut summary = DrainSummary::default();

        for _ in 0..limit {
            let Some(job) = self
                .store
                .claim_queue_job(worker_id, &JobType::ACCEPTED)
                .await?
            else {
                break;
            };

            if let Some(tenant) = tenant_filter
                && job.tenant_id.as_deref() != Some(tenant)
            {
                self.store.release_job(job.id).await?;
                debug!(job_id = job.id, tenant_id = tenant, "Job belongs to another tenant, stopping");
                break;
            }

            match self.run(&job).await {
                Ok(()) => match self.store.complete_job(job.id).await {
                    Ok(()) => summary.processed += 1,
                    Err(e) => {
                        error!(job_id = job.id, error = %e, "Could not complete job");
                        summary.failed += 1;
                    }
                },
                Err(e) => {
                    self.fail(&job, &e).await;
                    summary.failed += 1;
                }
            }
        }

        info!(
            worker_id,
            processed = summary.processed,
            failed = summary.failed,
            "Queue drained"
        );
        Ok(summary)
    }

    async fn run(&self, job: &QueueJob) -> Result<()> {
        match job.job_type {
            JobType::DisbursementResult => self.disbursements.handle(job).await,
            JobType::Sms => {
                let transaction_id = required_transaction_id(job)?;
                self.sms
                    .handle(transaction_id, job.tenant_id.as_deref())
                    .await
                    .map(|_| ())
            }
            JobType::Repayment | JobType::Registration | JobType::Processing => {
                let transaction_id = required_transaction_id(job)?;
                match self.processor.process_job(transaction_id).await {
                    ProcessOutcome::Failed { error } => Err(ReconError::Handler(error)),
                    ProcessOutcome::Skipped => self.check_not_failed(transaction_id).await,
                    outcome => {
                        debug!(job_id = job.id, transaction_id, ?outcome, "Job handled");
                        Ok(())
                    }
                }
            }
        }
    }

    /// A skipped transaction only completes its job if it is not left failed.
    async fn check_not_failed(&self, transaction_id: &str) -> Result<()> {
        match self.store.transaction(transaction_id).await? {
            Some(tx) if tx.status == TransactionStatus::Failed => Err(ReconError::Handler(
                tx.result
                    .unwrap_or_else(|| format!("Transaction {transaction_id} failed")),
            )),
            _ => Ok(()),
        }
    }

    async fn fail(&self, job: &QueueJob, err: &ReconError) {
        let message = err.to_string();
        let bookkeeping = match self.policy.decide(job, err, Utc::now()) {
            RetryDecision::Dead => {
                warn!(job_id = job.id, attempts = job.attempts, error = %message, "Job dead-lettered");
                self.store.dead_letter_job(job.id, &message).await
            }
            RetryDecision::Retry { at } => {
                warn!(job_id = job.id, attempts = job.attempts, retry_at = %at, error = %message, "Job scheduled for retry");
                self.store.retry_job(job.id, &message, at).await
            }
        };
        if let Err(e) = bookkeeping {
            error!(job_id = job.id, error = %e, "Could not record job failure");
        }
    }
}

fn required_transaction_id(job: &QueueJob) -> Result<&str> {
    job.payload_str(TRANSACTION_ID)
        .ok_or_else(|| ReconError::PayloadMalformed(format!("job {} has no {TRANSACTION_ID}", job.id)))
}
