use crate::domain::loan::{
    Buckets, Customer, Disbursement, DisbursementResult, DisbursementStatus, Installment,
    InstallmentPosting, Loan, LoanPayment, LoanStatus, PaymentType, PostedInstallment,
    RepaymentState, ledger_rows,
};
use crate::domain::ports::{AtomicStore, LedgerRepository};
use crate::domain::queue::{JobStatus, JobType, NewJob, QueueJob};
use crate::domain::sms::{SmsLogEntry, SmsProviderConfig};
use crate::domain::transaction::{Completion, SuspenseRecord, Transaction, TransactionStatus};
use crate::domain::wallet::{self, Direction, RefType, WalletEntry, WalletTransaction};
use crate::error::{ReconError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Every table the engine touches, as plain collections.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerState {
    pub customers: BTreeMap<String, Customer>,
    pub loans: BTreeMap<String, Loan>,
    pub installments: BTreeMap<String, Installment>,
    pub loan_payments: Vec<LoanPayment>,
    pub wallet_transactions: Vec<WalletTransaction>,
    pub transactions: BTreeMap<String, Transaction>,
    pub queue_jobs: BTreeMap<u64, QueueJob>,
    pub suspense: BTreeMap<String, SuspenseRecord>,
    pub disbursements: BTreeMap<String, Disbursement>,
    pub sms_configs: BTreeMap<String, SmsProviderConfig>,
    pub sms_log: Vec<SmsLogEntry>,
    pub next_job_id: u64,
}

impl LedgerState {
    pub fn wallet_balance(&self, tenant_id: &str, customer_id: &str) -> Decimal {
        wallet::balance(
            self.wallet_transactions
                .iter()
                .filter(|w| w.tenant_id == tenant_id && w.customer_id == customer_id),
        )
    }

    pub fn payments_for_transaction(&self, source_ref: &str) -> Vec<&LoanPayment> {
        self.loan_payments
            .iter()
            .filter(|p| p.source_ref == source_ref)
            .collect()
    }
}

fn penalty_paid(payments: &[LoanPayment], installment_id: &str) -> Decimal {
    payments
        .iter()
        .filter(|p| {
            p.payment_type == PaymentType::Penalty
                && p.installment_id.as_deref() == Some(installment_id)
        })
        .map(|p| p.amount)
        .sum()
}

fn claim_from(
    state: &mut LedgerState,
    transaction_id: &str,
    worker_id: &str,
    from: TransactionStatus,
) -> Option<Transaction> {
    let tx = state
        .transactions
        .get_mut(transaction_id)
        .filter(|tx| tx.status == from)?;
    tx.status = TransactionStatus::Processing;
    tx.claimed_by = Some(worker_id.to_string());
    tx.claimed_at = Some(Utc::now());
    Some(tx.clone())
}

fn not_found(what: &str, id: impl std::fmt::Display) -> ReconError {
    ReconError::NotFound(format!("{what} {id}"))
}

/// A thread-safe in-memory ledger store.
///
/// Every mutating primitive runs under the single write guard of
/// `Arc<RwLock<LedgerState>>`, which gives the claim, wallet and queue
/// operations true mutual exclusion across concurrent workers sharing the
/// store. State can be loaded from and saved to a JSON snapshot.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: LedgerState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Loads a JSON snapshot, or starts empty when the file does not exist.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        match tokio::fs::read(path.as_ref()).await {
            Ok(bytes) => Ok(Self::from_state(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&*self.state.read().await)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    /// A point-in-time copy of every table.
    pub async fn snapshot(&self) -> LedgerState {
        self.state.read().await.clone()
    }

    pub async fn insert_customer(&self, customer: Customer) {
        let mut state = self.state.write().await;
        state.customers.insert(customer.id.clone(), customer);
    }

    pub async fn insert_loan(&self, loan: Loan) {
        let mut state = self.state.write().await;
        state.loans.insert(loan.id.clone(), loan);
    }

    pub async fn insert_installment(&self, installment: Installment) {
        let mut state = self.state.write().await;
        state
            .installments
            .insert(installment.id.clone(), installment);
    }

    pub async fn insert_disbursement(&self, disbursement: Disbursement) {
        let mut state = self.state.write().await;
        state
            .disbursements
            .insert(disbursement.id.clone(), disbursement);
    }

    pub async fn insert_sms_config(&self, config: SmsProviderConfig) {
        let mut state = self.state.write().await;
        state.sms_configs.insert(config.tenant_id.clone(), config);
    }
}

#[async_trait]
impl AtomicStore for InMemoryLedgerStore {
    async fn claim_transaction(
        &self,
        transaction_id: &str,
        worker_id: &str,
    ) -> Result<Option<Transaction>> {
        let mut state = self.state.write().await;
        Ok(claim_from(&mut state, transaction_id, worker_id, TransactionStatus::Pending))
    }

    async fn reclaim_failed_transaction(
        &self,
        transaction_id: &str,
        worker_id: &str,
    ) -> Result<Option<Transaction>> {
        let mut state = self.state.write().await;
        Ok(claim_from(&mut state, transaction_id, worker_id, TransactionStatus::Failed))
    }

    async fn wallet_transact(&self, entry: WalletEntry) -> Result<()> {
        if entry.amount <= Decimal::ZERO {
            return Err(ReconError::Validation(
                "Wallet amount must be positive".to_string(),
            ));
        }
        let mut state = self.state.write().await;
        if entry.direction == Direction::Debit
            && state.wallet_balance(&entry.tenant_id, &entry.customer_id) < entry.amount
        {
            return Err(ReconError::Validation(
                "Insufficient wallet balance".to_string(),
            ));
        }
        state.wallet_transactions.push(WalletTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: entry.tenant_id,
            customer_id: entry.customer_id,
            direction: entry.direction,
            amount: entry.amount,
            narration: entry.narration,
            reference: entry.reference,
            ref_type: entry.ref_type,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn drain_wallet_for_repayment(
        &self,
        tenant_id: &str,
        customer_id: &str,
        reference: &str,
    ) -> Result<Decimal> {
        let mut state = self.state.write().await;
        let balance = state.wallet_balance(tenant_id, customer_id);
        if balance <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }
        state.wallet_transactions.push(WalletTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            customer_id: customer_id.to_string(),
            direction: Direction::Debit,
            amount: balance,
            narration: "Applied to loan repayment".to_string(),
            reference: reference.to_string(),
            ref_type: RefType::Repayment,
            created_at: Utc::now(),
        });
        Ok(balance)
    }

    async fn claim_queue_job(
        &self,
        worker_id: &str,
        job_types: &[JobType],
    ) -> Result<Option<QueueJob>> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let next = state
            .queue_jobs
            .values()
            .filter(|job| job.is_claimable(now) && job_types.contains(&job.job_type))
            .min_by_key(|job| (job.scheduled_at, job.id))
            .map(|job| job.id);

        let Some(id) = next else {
            return Ok(None);
        };
        let job = state
            .queue_jobs
            .get_mut(&id)
            .ok_or_else(|| not_found("job", id))?;
        job.status = JobStatus::Processing;
        job.attempts += 1;
        job.claimed_by = Some(worker_id.to_string());
        job.claimed_at = Some(now);
        Ok(Some(job.clone()))
    }

    async fn recover_stuck_queue_jobs(&self, stale_after: chrono::Duration) -> Result<u64> {
        let cutoff = Utc::now() - stale_after;
        let mut state = self.state.write().await;
        let mut recovered = 0;
        for job in state.queue_jobs.values_mut() {
            let stale = job.claimed_at.is_none_or(|at| at < cutoff);
            if job.status == JobStatus::Processing && stale {
                job.status = JobStatus::Queued;
                job.claimed_by = None;
                job.claimed_at = None;
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerStore {
    async fn transaction(&self, id: &str) -> Result<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state.transactions.get(id).cloned())
    }

    async fn pending_transactions(
        &self,
        tenant_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Transaction>> {
        let state = self.state.read().await;
        let mut pending: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|tx| tx.status == TransactionStatus::Pending)
            .filter(|tx| tenant_id.is_none() || tx.tenant_id.as_deref() == tenant_id)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn insert_transaction(&self, tx: Transaction) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.transactions.contains_key(&tx.id) {
            return Ok(false);
        }
        state.transactions.insert(tx.id.clone(), tx);
        Ok(true)
    }

    async fn complete_transaction(
        &self,
        id: &str,
        worker_id: &str,
        completion: Completion,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(tx) = state.transactions.get_mut(id) else {
            return Ok(false);
        };
        if tx.status != TransactionStatus::Processing
            || tx.claimed_by.as_deref() != Some(worker_id)
        {
            return Ok(false);
        }
        tx.status = completion.status;
        tx.result = Some(completion.result);
        if completion.tenant_id.is_some() {
            tx.tenant_id = completion.tenant_id;
        }
        if completion.customer_id.is_some() {
            tx.customer_id = completion.customer_id;
        }
        tx.processed_at = Some(Utc::now());
        Ok(true)
    }

    async fn mark_sms_sent(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let tx = state
            .transactions
            .get_mut(id)
            .ok_or_else(|| not_found("transaction", id))?;
        tx.payment_sms_sent = true;
        Ok(())
    }

    async fn customer(&self, tenant_id: &str, customer_id: &str) -> Result<Option<Customer>> {
        let state = self.state.read().await;
        Ok(state
            .customers
            .get(customer_id)
            .filter(|c| c.tenant_id == tenant_id)
            .cloned())
    }

    async fn customer_by_national_id(
        &self,
        tenant_id: &str,
        national_id: &str,
    ) -> Result<Option<Customer>> {
        let state = self.state.read().await;
        Ok(state
            .customers
            .values()
            .find(|c| c.tenant_id == tenant_id && c.national_id.as_deref() == Some(national_id))
            .cloned())
    }

    async fn customer_by_phone(
        &self,
        tenant_id: Option<&str>,
        variants: &[String],
    ) -> Result<Option<Customer>> {
        let state = self.state.read().await;
        Ok(state
            .customers
            .values()
            .filter(|c| tenant_id.is_none_or(|t| c.tenant_id == t))
            .find(|c| variants.contains(&c.mobile))
            .cloned())
    }

    async fn clear_new_customer_flag(&self, customer_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let customer = state
            .customers
            .get_mut(customer_id)
            .ok_or_else(|| not_found("customer", customer_id))?;
        customer.is_new = false;
        Ok(())
    }

    async fn loan(&self, tenant_id: &str, loan_id: &str) -> Result<Option<Loan>> {
        let state = self.state.read().await;
        Ok(state
            .loans
            .get(loan_id)
            .filter(|l| l.tenant_id == tenant_id)
            .cloned())
    }

    async fn latest_fee_loan(&self, tenant_id: &str, customer_id: &str) -> Result<Option<Loan>> {
        let state = self.state.read().await;
        Ok(state
            .loans
            .values()
            .filter(|l| l.tenant_id == tenant_id && l.customer_id == customer_id)
            .filter(|l| l.accepts_fees())
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .cloned())
    }

    async fn active_loan(&self, tenant_id: &str, customer_id: &str) -> Result<Option<Loan>> {
        let state = self.state.read().await;
        Ok(state
            .loans
            .values()
            .filter(|l| l.tenant_id == tenant_id && l.customer_id == customer_id)
            .filter(|l| l.is_repayable())
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
            .cloned())
    }

    async fn set_repayment_state(&self, loan_id: &str, repayment: RepaymentState) -> Result<()> {
        let mut state = self.state.write().await;
        let loan = state
            .loans
            .get_mut(loan_id)
            .ok_or_else(|| not_found("loan", loan_id))?;
        loan.repayment_state = repayment;
        Ok(())
    }

    async fn charge_fee(&self, payment: LoanPayment) -> Result<bool> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let loan = state
            .loans
            .get_mut(&payment.loan_id)
            .ok_or_else(|| not_found("loan", &payment.loan_id))?;
        let flag = match payment.payment_type {
            PaymentType::Registration => &mut loan.registration_fee_paid,
            PaymentType::Processing => &mut loan.processing_fee_paid,
            other => {
                return Err(ReconError::Validation(format!(
                    "{other:?} is not a fee"
                )));
            }
        };
        if *flag {
            return Ok(false);
        }
        *flag = true;
        if payment.amount > Decimal::ZERO {
            state.loan_payments.push(payment);
        }
        Ok(true)
    }

    async fn apply_disbursement_result(&self, result: &DisbursementResult) -> Result<()> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let loan = state
            .loans
            .get_mut(&result.loan_id)
            .ok_or_else(|| not_found("loan", &result.loan_id))?;

        let outcome = if result.succeeded() {
            loan.status = LoanStatus::Disbursed;
            loan.disbursed_at = Some(Utc::now());
            DisbursementStatus::Success
        } else {
            loan.status = LoanStatus::ReadyForDisbursement;
            DisbursementStatus::Failed
        };

        let existing = match &result.disbursement_id {
            Some(id) => state.disbursements.get_mut(id),
            None => state
                .disbursements
                .values_mut()
                .find(|d| d.loan_id == result.loan_id && d.status == DisbursementStatus::Pending),
        };
        match existing {
            Some(disbursement) => {
                disbursement.status = outcome;
                disbursement.result_code = Some(result.result_code);
                disbursement.result_desc = result.result_desc.clone();
                disbursement.receipt = result.receipt.clone();
            }
            None => {
                let id = result
                    .disbursement_id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                state.disbursements.insert(
                    id.clone(),
                    Disbursement {
                        id,
                        loan_id: result.loan_id.clone(),
                        status: outcome,
                        result_code: Some(result.result_code),
                        result_desc: result.result_desc.clone(),
                        receipt: result.receipt.clone(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn open_installments(&self, loan_id: &str) -> Result<Vec<Installment>> {
        let state = self.state.read().await;
        let mut open: Vec<Installment> = state
            .installments
            .values()
            .filter(|i| i.loan_id == loan_id && i.status.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|i| i.number);
        Ok(open)
    }

    async fn penalty_paid(&self, installment_id: &str) -> Result<Decimal> {
        let state = self.state.read().await;
        Ok(penalty_paid(&state.loan_payments, installment_id))
    }

    async fn post_installment_payment(
        &self,
        posting: InstallmentPosting,
    ) -> Result<PostedInstallment> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let collected_penalty = penalty_paid(&state.loan_payments, &posting.installment_id);
        let installment = state
            .installments
            .get_mut(&posting.installment_id)
            .ok_or_else(|| not_found("installment", &posting.installment_id))?;

        // Another worker may have paid part of this installment since the
        // caller read it; only what is still unpaid can be posted.
        let unpaid = installment.unpaid(collected_penalty);
        let applied: Buckets = unpaid.waterfall(posting.split.total());
        let payments = ledger_rows(
            &InstallmentPosting {
                split: applied,
                ..posting
            },
            unpaid.total(),
        );

        installment.apply(&applied);
        let status = installment.status;
        state.loan_payments.extend(payments.iter().cloned());

        Ok(PostedInstallment {
            applied,
            status,
            payments,
        })
    }

    async fn loan_payments_for_source(&self, source_ref: &str) -> Result<Vec<LoanPayment>> {
        let state = self.state.read().await;
        Ok(state
            .payments_for_transaction(source_ref)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn loan_payments_total(&self, loan_id: &str) -> Result<Decimal> {
        let state = self.state.read().await;
        Ok(state
            .loan_payments
            .iter()
            .filter(|p| p.loan_id == loan_id)
            .map(|p| p.amount)
            .sum())
    }

    async fn wallet_balance(&self, tenant_id: &str, customer_id: &str) -> Result<Decimal> {
        let state = self.state.read().await;
        Ok(state.wallet_balance(tenant_id, customer_id))
    }

    async fn upsert_suspense(&self, record: SuspenseRecord) -> Result<()> {
        let mut state = self.state.write().await;
        match state.suspense.get_mut(&record.transaction_id) {
            Some(existing) => {
                let created_at = existing.created_at;
                *existing = SuspenseRecord {
                    created_at,
                    ..record
                };
            }
            None => {
                state
                    .suspense
                    .insert(record.transaction_id.clone(), record);
            }
        }
        Ok(())
    }

    async fn enqueue_job(&self, job: NewJob) -> Result<u64> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        state.next_job_id += 1;
        let id = state.next_job_id;
        state.queue_jobs.insert(
            id,
            QueueJob {
                id,
                job_type: job.job_type,
                tenant_id: job.tenant_id,
                payload: job.payload,
                status: JobStatus::Queued,
                attempts: 0,
                max_attempts: job.max_attempts,
                claimed_by: None,
                claimed_at: None,
                scheduled_at: now,
                last_error: None,
                created_at: now,
                completed_at: None,
            },
        );
        Ok(id)
    }

    async fn complete_job(&self, id: u64) -> Result<()> {
        let mut state = self.state.write().await;
        let job = state
            .queue_jobs
            .get_mut(&id)
            .ok_or_else(|| not_found("job", id))?;
        job.status = JobStatus::Completed;
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn retry_job(&self, id: u64, error: &str, scheduled_at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        let job = state
            .queue_jobs
            .get_mut(&id)
            .ok_or_else(|| not_found("job", id))?;
        job.status = JobStatus::Queued;
        job.last_error = Some(error.to_string());
        job.scheduled_at = scheduled_at;
        job.claimed_by = None;
        job.claimed_at = None;
        Ok(())
    }

    async fn dead_letter_job(&self, id: u64, error: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let job = state
            .queue_jobs
            .get_mut(&id)
            .ok_or_else(|| not_found("job", id))?;
        job.status = JobStatus::Dead;
        job.last_error = Some(error.to_string());
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn release_job(&self, id: u64) -> Result<()> {
        let mut state = self.state.write().await;
        let job = state
            .queue_jobs
            .get_mut(&id)
            .ok_or_else(|| not_found("job", id))?;
        job.status = JobStatus::Queued;
        job.attempts = job.attempts.saturating_sub(1);
        job.claimed_by = None;
        job.claimed_at = None;
        Ok(())
    }

    async fn sms_config(&self, tenant_id: &str) -> Result<Option<SmsProviderConfig>> {
        let state = self.state.read().await;
        Ok(state.sms_configs.get(tenant_id).cloned())
    }

    async fn log_sms(&self, entry: SmsLogEntry) -> Result<()> {
        let mut state = self.state.write().await;
        state.sms_log.push(entry);
        Ok(())
    }
}
