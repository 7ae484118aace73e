use super::loan::{
    Customer, DisbursementResult, Installment, InstallmentPosting, Loan, LoanPayment,
    PostedInstallment, RepaymentState,
};
use super::queue::{JobType, NewJob, QueueJob};
use super::sms::{SmsLogEntry, SmsProviderConfig};
use super::transaction::{Completion, SuspenseRecord, Transaction};
use super::wallet::WalletEntry;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// The serialization points of the engine.
///
/// Every method must be atomic with respect to concurrent callers: two
/// workers can never both claim the same transaction or job, and two drains
/// of the same wallet can never both observe the same balance.
#[async_trait]
pub trait AtomicStore: Send + Sync {
    /// `pending -> processing`. `None` when already claimed or unknown.
    async fn claim_transaction(
        &self,
        transaction_id: &str,
        worker_id: &str,
    ) -> Result<Option<Transaction>>;

    /// `failed -> processing`, for queue retries of a failed transaction.
    /// `None` unless the transaction is currently failed.
    async fn reclaim_failed_transaction(
        &self,
        transaction_id: &str,
        worker_id: &str,
    ) -> Result<Option<Transaction>>;

    async fn wallet_transact(&self, entry: WalletEntry) -> Result<()>;

    /// Debits the whole wallet balance and returns the amount debited.
    async fn drain_wallet_for_repayment(
        &self,
        tenant_id: &str,
        customer_id: &str,
        reference: &str,
    ) -> Result<Decimal>;

    /// Claims the oldest due job of one of `job_types`, bumping its attempts.
    async fn claim_queue_job(
        &self,
        worker_id: &str,
        job_types: &[JobType],
    ) -> Result<Option<QueueJob>>;

    /// Requeues jobs left in `processing` for longer than `stale_after`.
    async fn recover_stuck_queue_jobs(&self, stale_after: chrono::Duration) -> Result<u64>;
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn transaction(&self, id: &str) -> Result<Option<Transaction>>;
    /// Oldest first. A tenant filter matches the stored tenant exactly, so
    /// rows whose tenant is not yet resolved only show up in unfiltered scans.
    async fn pending_transactions(
        &self,
        tenant_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Transaction>>;
    /// Inserts a new pending transaction; `false` if the id already exists.
    async fn insert_transaction(&self, tx: Transaction) -> Result<bool>;
    /// Writes the outcome only while `worker_id` still owns the claim.
    async fn complete_transaction(
        &self,
        id: &str,
        worker_id: &str,
        completion: Completion,
    ) -> Result<bool>;
    async fn mark_sms_sent(&self, id: &str) -> Result<()>;

    async fn customer(&self, tenant_id: &str, customer_id: &str) -> Result<Option<Customer>>;
    async fn customer_by_national_id(
        &self,
        tenant_id: &str,
        national_id: &str,
    ) -> Result<Option<Customer>>;
    /// First customer whose mobile matches any variant, optionally within a tenant.
    async fn customer_by_phone(
        &self,
        tenant_id: Option<&str>,
        variants: &[String],
    ) -> Result<Option<Customer>>;
    async fn clear_new_customer_flag(&self, customer_id: &str) -> Result<()>;

    async fn loan(&self, tenant_id: &str, loan_id: &str) -> Result<Option<Loan>>;
    /// Newest loan that is neither rejected nor disbursed.
    async fn latest_fee_loan(&self, tenant_id: &str, customer_id: &str) -> Result<Option<Loan>>;
    /// Newest repayable loan.
    async fn active_loan(&self, tenant_id: &str, customer_id: &str) -> Result<Option<Loan>>;
    async fn set_repayment_state(&self, loan_id: &str, state: RepaymentState) -> Result<()>;
    /// Inserts a fee ledger row and sets the matching paid flag, unless the
    /// flag is already set. Returns whether the fee was charged.
    async fn charge_fee(&self, payment: LoanPayment) -> Result<bool>;
    async fn apply_disbursement_result(&self, result: &DisbursementResult) -> Result<()>;

    /// Unpaid installments in ascending installment number.
    async fn open_installments(&self, loan_id: &str) -> Result<Vec<Installment>>;
    /// Sum of `penalty` ledger rows for an installment.
    async fn penalty_paid(&self, installment_id: &str) -> Result<Decimal>;
    /// Atomically clamps the split to what is still unpaid, writes the
    /// ledger rows and updates the installment.
    async fn post_installment_payment(&self, posting: InstallmentPosting)
    -> Result<PostedInstallment>;
    async fn loan_payments_for_source(&self, source_ref: &str) -> Result<Vec<LoanPayment>>;
    async fn loan_payments_total(&self, loan_id: &str) -> Result<Decimal>;

    async fn wallet_balance(&self, tenant_id: &str, customer_id: &str) -> Result<Decimal>;

    async fn upsert_suspense(&self, record: SuspenseRecord) -> Result<()>;

    async fn enqueue_job(&self, job: NewJob) -> Result<u64>;
    async fn complete_job(&self, id: u64) -> Result<()>;
    async fn retry_job(&self, id: u64, error: &str, scheduled_at: DateTime<Utc>) -> Result<()>;
    async fn dead_letter_job(&self, id: u64, error: &str) -> Result<()>;
    /// Reverts a claim without counting it as an attempt.
    async fn release_job(&self, id: u64) -> Result<()>;

    async fn sms_config(&self, tenant_id: &str) -> Result<Option<SmsProviderConfig>>;
    async fn log_sms(&self, entry: SmsLogEntry) -> Result<()>;
}

/// Everything the engine needs from storage.
pub trait LedgerStore: AtomicStore + LedgerRepository {}

impl<T: AtomicStore + LedgerRepository + ?Sized> LedgerStore for T {}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;

#[async_trait]
pub trait SmsGateway: Send + Sync {
    async fn send(&self, config: &SmsProviderConfig, recipient: &str, message: &str)
    -> Result<()>;
}

pub type SmsGatewayRef = Arc<dyn SmsGateway>;
