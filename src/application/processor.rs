use super::PaymentContext;
use super::allocator::RepaymentAllocator;
use super::fees::{ProcessingFeeHandler, RegistrationFeeHandler};
use super::resolver::Resolver;
use super::suspense::SuspenseHandler;
use super::wallet::WalletLedger;
use crate::config::EngineConfig;
use crate::domain::intent::PaymentIntent;
use crate::domain::ports::LedgerStoreRef;
use crate::domain::queue::{JobType, NewJob};
use crate::domain::transaction::{Completion, Transaction, TransactionStatus};
use crate::error::{ReconError, Result};
use serde::Serialize;
use tracing::{debug, error, info, warn};

pub const OWNERSHIP_LOST: &str = "Transaction is no longer owned by this worker";

/// Result of one processing attempt. Never an error: failures are data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Claimed by someone else, already terminal, or unknown.
    Skipped,
    Applied {
        result: String,
        #[serde(skip_serializing)]
        customer_id: String,
    },
    Suspense {
        reason: String,
    },
    Failed {
        error: String,
    },
}

impl ProcessOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ProcessOutcome::Failed { .. })
    }
}

/// Per-transaction entry of a batch response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedItem {
    pub transaction_id: String,
    #[serde(flatten)]
    pub outcome: ProcessOutcome,
}

enum Settled {
    Applied {
        tenant_id: String,
        customer_id: String,
        result: String,
    },
    Suspense {
        tenant_id: Option<String>,
        reason: String,
    },
}

/// Claims one transaction and carries it to a terminal status.
#[derive(Clone)]
pub struct TransactionProcessor {
    store: LedgerStoreRef,
    resolver: Resolver,
    registration: RegistrationFeeHandler,
    processing: ProcessingFeeHandler,
    allocator: RepaymentAllocator,
    suspense: SuspenseHandler,
    worker_id: String,
    notify_on_apply: bool,
    max_attempts: u32,
}

impl TransactionProcessor {
    pub fn new(store: LedgerStoreRef, config: &EngineConfig) -> Self {
        let wallet = WalletLedger::new(store.clone());
        Self {
            resolver: Resolver::new(store.clone()),
            registration: RegistrationFeeHandler::new(store.clone(), wallet.clone()),
            processing: ProcessingFeeHandler::new(store.clone(), wallet.clone()),
            allocator: RepaymentAllocator::new(store.clone(), wallet),
            suspense: SuspenseHandler::new(store.clone()),
            store,
            worker_id: config.worker_id.clone(),
            notify_on_apply: config.notify_on_apply,
            max_attempts: config.default_max_attempts,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub async fn process_item(&self, transaction_id: &str) -> ProcessedItem {
        ProcessedItem {
            transaction_id: transaction_id.to_string(),
            outcome: self.process(transaction_id).await,
        }
    }

    /// Claims a pending transaction and carries it to a terminal status.
    pub async fn process(&self, transaction_id: &str) -> ProcessOutcome {
        let claim = self
            .store
            .claim_transaction(transaction_id, &self.worker_id)
            .await;
        self.process_claim(transaction_id, claim).await
    }

    /// Like [`process`](Self::process), but a transaction left `failed` by an
    /// earlier attempt is reclaimed and run again. Used by queue retries.
    pub async fn process_job(&self, transaction_id: &str) -> ProcessOutcome {
        let claim = match self
            .store
            .claim_transaction(transaction_id, &self.worker_id)
            .await
        {
            Ok(None) => {
                self.store
                    .reclaim_failed_transaction(transaction_id, &self.worker_id)
                    .await
            }
            claim => claim,
        };
        self.process_claim(transaction_id, claim).await
    }

    async fn process_claim(
        &self,
        transaction_id: &str,
        claim: Result<Option<Transaction>>,
    ) -> ProcessOutcome {
        let tx = match claim {
            Ok(Some(tx)) => tx,
            Ok(None) => {
                debug!(transaction_id, worker_id = %self.worker_id, "Claim not acquired, skipping");
                return ProcessOutcome::Skipped;
            }
            Err(e) => {
                error!(transaction_id, error = %e, "Claim failed");
                return ProcessOutcome::Failed {
                    error: e.to_string(),
                };
            }
        };

        let intent = PaymentIntent::classify(tx.billref.as_deref());
        debug!(transaction_id, intent = intent.label(), amount = %tx.amount, "Transaction claimed");

        match self.settle(&tx, &intent).await {
            Ok(Settled::Applied {
                tenant_id,
                customer_id,
                result,
            }) => {
                let completion = Completion {
                    status: TransactionStatus::Applied,
                    result: result.clone(),
                    tenant_id: Some(tenant_id.clone()),
                    customer_id: Some(customer_id.clone()),
                };
                if let Err(outcome) = self.complete(&tx.id, completion).await {
                    return outcome;
                }
                info!(transaction_id, tenant_id = %tenant_id, customer_id = %customer_id, result = %result, "Transaction applied");
                if self.notify_on_apply {
                    self.enqueue_receipt(&tx.id, &tenant_id).await;
                }
                ProcessOutcome::Applied {
                    result,
                    customer_id,
                }
            }
            Ok(Settled::Suspense { tenant_id, reason }) => {
                let completion = Completion {
                    status: TransactionStatus::Suspense,
                    result: reason.clone(),
                    tenant_id,
                    customer_id: None,
                };
                if let Err(outcome) = self.complete(&tx.id, completion).await {
                    return outcome;
                }
                ProcessOutcome::Suspense { reason }
            }
            Err(e) => {
                let message = e.to_string();
                error!(transaction_id, error = %message, "Transaction failed");
                let completion = Completion {
                    status: TransactionStatus::Failed,
                    result: message.clone(),
                    tenant_id: None,
                    customer_id: None,
                };
                if let Err(outcome) = self.complete(&tx.id, completion).await {
                    return outcome;
                }
                ProcessOutcome::Failed { error: message }
            }
        }
    }

    async fn settle(&self, tx: &Transaction, intent: &PaymentIntent) -> Result<Settled> {
        let resolution = match self.resolver.resolve(tx, intent).await {
            Ok(resolution) => resolution,
            Err(ReconError::TenantUnresolved(reason)) => {
                self.suspense.park(tx, None, &reason).await?;
                return Ok(Settled::Suspense {
                    tenant_id: None,
                    reason,
                });
            }
            Err(ReconError::CustomerUnresolved(reason)) => {
                let tenant_id = tx.tenant_id.clone();
                self.suspense.park(tx, tenant_id.as_deref(), &reason).await?;
                return Ok(Settled::Suspense { tenant_id, reason });
            }
            Err(e) => return Err(e),
        };

        let ctx = PaymentContext {
            transaction_id: tx.id.clone(),
            tenant_id: resolution.tenant_id,
            customer: resolution.customer,
            amount: tx.amount,
        };
        let result = match intent {
            PaymentIntent::Registration { .. } => self.registration.handle(&ctx).await?,
            PaymentIntent::Processing { loan_id } => self.processing.handle(&ctx, loan_id).await?,
            PaymentIntent::Repayment { .. } => self.allocator.allocate(&ctx).await?.describe(),
        };
        Ok(Settled::Applied {
            tenant_id: ctx.tenant_id,
            customer_id: ctx.customer.id,
            result,
        })
    }

    /// Guarded completion write. `Err` carries the outcome to report instead.
    async fn complete(
        &self,
        transaction_id: &str,
        completion: Completion,
    ) -> std::result::Result<(), ProcessOutcome> {
        match self
            .store
            .complete_transaction(transaction_id, &self.worker_id, completion)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!(transaction_id, worker_id = %self.worker_id, "Completion rejected, claim lost");
                Err(ProcessOutcome::Failed {
                    error: OWNERSHIP_LOST.to_string(),
                })
            }
            Err(e) => {
                error!(transaction_id, error = %e, "Completion write failed");
                Err(ProcessOutcome::Failed {
                    error: e.to_string(),
                })
            }
        }
    }

    async fn enqueue_receipt(&self, transaction_id: &str, tenant_id: &str) {
        let job = NewJob::for_transaction(
            JobType::Sms,
            Some(tenant_id.to_string()),
            transaction_id,
            self.max_attempts,
        );
        if let Err(e) = self.store.enqueue_job(job).await {
            warn!(transaction_id, error = %e, "Could not enqueue payment SMS");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::resolver::CUSTOMER_NOT_FOUND;
    use crate::domain::loan::{
        Customer, Installment, InstallmentStatus, Loan, LoanStatus, RepaymentState,
    };
    use crate::domain::ports::{AtomicStore, LedgerRepository};
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::Arc;

    fn config(worker: &str) -> EngineConfig {
        EngineConfig::default().with_worker_id(worker)
    }

    async fn seeded_store() -> InMemoryLedgerStore {
        let store = InMemoryLedgerStore::new();
        store
            .insert_customer(Customer {
                id: "c1".into(),
                tenant_id: "t1".into(),
                national_id: Some("12345678".into()),
                mobile: "0712345678".into(),
                name: Some("Jane".into()),
                is_new: false,
            })
            .await;
        store
            .insert_loan(Loan {
                id: "l1".into(),
                tenant_id: "t1".into(),
                customer_id: "c1".into(),
                status: LoanStatus::Disbursed,
                repayment_state: RepaymentState::Ongoing,
                registration_fee: Decimal::ZERO,
                registration_fee_paid: true,
                processing_fee: Decimal::ZERO,
                processing_fee_paid: true,
                total_payable: dec!(1000),
                created_at: Utc::now(),
                disbursed_at: Some(Utc::now()),
            })
            .await;
        store
            .insert_installment(Installment {
                id: "i1".into(),
                loan_id: "l1".into(),
                number: 1,
                principal_due: dec!(900),
                interest_due: dec!(100),
                penalty_due: Decimal::ZERO,
                principal_paid: Decimal::ZERO,
                interest_paid: Decimal::ZERO,
                total_paid: Decimal::ZERO,
                status: InstallmentStatus::Pending,
            })
            .await;
        store
    }

    #[tokio::test]
    async fn test_repayment_is_applied_and_receipt_enqueued() {
        let store = seeded_store().await;
        store
            .insert_transaction(Transaction::pending("TX1", "254712345678", dec!(1000)))
            .await
            .unwrap();
        let processor = TransactionProcessor::new(Arc::new(store.clone()), &config("w1"));

        let outcome = processor.process("TX1").await;
        let ProcessOutcome::Applied {
            result,
            customer_id,
        } = outcome
        else {
            panic!("expected applied, got {outcome:?}");
        };
        assert_eq!(customer_id, "c1");
        assert!(result.starts_with("Applied KES 1000.00 to loan l1"));

        let state = store.snapshot().await;
        let tx = &state.transactions["TX1"];
        assert_eq!(tx.status, TransactionStatus::Applied);
        assert_eq!(tx.tenant_id.as_deref(), Some("t1"));
        assert_eq!(tx.customer_id.as_deref(), Some("c1"));
        assert!(tx.processed_at.is_some());

        let jobs: Vec<_> = state.queue_jobs.values().collect();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_type, JobType::Sms);
        assert_eq!(jobs[0].payload, json!({"transaction_id": "TX1"}));
    }

    #[tokio::test]
    async fn test_unknown_payer_goes_to_suspense() {
        let store = seeded_store().await;
        store
            .insert_transaction(Transaction::pending("TX9", "0700000000", dec!(300)).with_tenant("t1"))
            .await
            .unwrap();
        let processor = TransactionProcessor::new(Arc::new(store.clone()), &config("w1"));

        assert_eq!(
            processor.process("TX9").await,
            ProcessOutcome::Suspense {
                reason: CUSTOMER_NOT_FOUND.to_string()
            }
        );

        let state = store.snapshot().await;
        assert_eq!(state.transactions["TX9"].status, TransactionStatus::Suspense);
        assert_eq!(state.suspense["TX9"].reason, CUSTOMER_NOT_FOUND);
        assert_eq!(state.suspense["TX9"].amount, dec!(300));
        assert!(state.loan_payments.is_empty());
        assert!(state.wallet_transactions.is_empty());
        assert!(state.queue_jobs.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_payer_without_tenant_hint_goes_to_suspense() {
        let store = seeded_store().await;
        store
            .insert_transaction(Transaction::pending("TX9", "0799999999", dec!(300)))
            .await
            .unwrap();
        let processor = TransactionProcessor::new(Arc::new(store.clone()), &config("w1"));

        assert_eq!(
            processor.process("TX9").await,
            ProcessOutcome::Suspense {
                reason: CUSTOMER_NOT_FOUND.to_string()
            }
        );

        let state = store.snapshot().await;
        assert_eq!(state.transactions["TX9"].status, TransactionStatus::Suspense);
        assert_eq!(state.suspense["TX9"].reason, CUSTOMER_NOT_FOUND);
        assert!(state.suspense["TX9"].tenant_id.is_none());
    }

    #[tokio::test]
    async fn test_handler_error_marks_failed() {
        let store = seeded_store().await;
        store
            .insert_transaction(
                Transaction::pending("TX2", "0712345678", dec!(200)).with_billref("processing-missing"),
            )
            .await
            .unwrap();
        let processor = TransactionProcessor::new(Arc::new(store.clone()), &config("w1"));

        let outcome = processor.process("TX2").await;
        assert_eq!(
            outcome,
            ProcessOutcome::Failed {
                error: "Loan missing not found".to_string()
            }
        );
        let tx = store.transaction("TX2").await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Failed);
        assert_eq!(tx.result.as_deref(), Some("Loan missing not found"));
    }

    #[tokio::test]
    async fn test_job_processing_reruns_failed_transaction() {
        let store = seeded_store().await;
        store
            .insert_transaction(
                Transaction::pending("TX2", "0712345678", dec!(200)).with_billref("processing-l9"),
            )
            .await
            .unwrap();
        let processor = TransactionProcessor::new(Arc::new(store.clone()), &config("w1"));
        assert!(processor.process_job("TX2").await.is_failed());

        // A plain run leaves failed transactions alone.
        assert_eq!(processor.process("TX2").await, ProcessOutcome::Skipped);

        store
            .insert_loan(Loan {
                id: "l9".into(),
                tenant_id: "t1".into(),
                customer_id: "c1".into(),
                status: LoanStatus::Approved,
                repayment_state: RepaymentState::Ongoing,
                registration_fee: Decimal::ZERO,
                registration_fee_paid: true,
                processing_fee: dec!(200),
                processing_fee_paid: false,
                total_payable: dec!(2000),
                created_at: Utc::now(),
                disbursed_at: None,
            })
            .await;
        assert!(matches!(
            processor.process_job("TX2").await,
            ProcessOutcome::Applied { .. }
        ));
        let state = store.snapshot().await;
        assert_eq!(state.transactions["TX2"].status, TransactionStatus::Applied);
        assert!(state.loans["l9"].processing_fee_paid);
    }

    #[tokio::test]
    async fn test_concurrent_processing_applies_once() {
        let store = seeded_store().await;
        store
            .insert_transaction(Transaction::pending("TX1", "0712345678", dec!(500)))
            .await
            .unwrap();
        let shared: LedgerStoreRef = Arc::new(store.clone());
        let a = TransactionProcessor::new(shared.clone(), &config("w1"));
        let b = TransactionProcessor::new(shared, &config("w2"));

        let (first, second) = tokio::join!(a.process("TX1"), b.process("TX1"));
        let outcomes = [first, second];
        assert_eq!(
            outcomes.iter().filter(|o| **o == ProcessOutcome::Skipped).count(),
            1
        );
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, ProcessOutcome::Applied { .. }))
                .count(),
            1
        );

        let paid: Decimal = store
            .snapshot()
            .await
            .loan_payments
            .iter()
            .map(|p| p.amount)
            .sum();
        assert_eq!(paid, dec!(500));
    }

    #[tokio::test]
    async fn test_completion_requires_ownership() {
        let store = seeded_store().await;
        store
            .insert_transaction(Transaction::pending("TX1", "0712345678", dec!(10)))
            .await
            .unwrap();
        store.claim_transaction("TX1", "w1").await.unwrap().unwrap();

        let processor = TransactionProcessor::new(Arc::new(store.clone()), &config("w2"));
        assert_eq!(processor.process("TX1").await, ProcessOutcome::Skipped);

        let foreign = Completion {
            status: TransactionStatus::Failed,
            result: "boom".into(),
            tenant_id: None,
            customer_id: None,
        };
        assert!(!store.complete_transaction("TX1", "w2", foreign).await.unwrap());
        let tx = store.transaction("TX1").await.unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Processing);
        assert_eq!(tx.claimed_by.as_deref(), Some("w1"));
    }

    #[test]
    fn test_item_serialization() {
        let item = ProcessedItem {
            transaction_id: "TX1".into(),
            outcome: ProcessOutcome::Applied {
                result: "ok".into(),
                customer_id: "c1".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({"transaction_id": "TX1", "status": "applied", "result": "ok"})
        );
        let item = ProcessedItem {
            transaction_id: "TX2".into(),
            outcome: ProcessOutcome::Skipped,
        };
        assert_eq!(
            serde_json::to_value(&item).unwrap(),
            json!({"transaction_id": "TX2", "status": "skipped"})
        );
    }
}
