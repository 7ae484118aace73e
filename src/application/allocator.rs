use super::PaymentContext;
use super::wallet::WalletLedger;
use crate::domain::loan::{InstallmentPosting, InstallmentStatus, RepaymentState};
use crate::domain::money::is_material;
use crate::domain::ports::LedgerStoreRef;
use crate::domain::wallet::RefType;
use crate::error::Result;
use rust_decimal::Decimal;
use tracing::{debug, info};

/// What one allocation call did with the money it was given.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AllocationSummary {
    pub loan_id: Option<String>,
    pub drained_from_wallet: Decimal,
    pub applied: Decimal,
    pub credited_to_wallet: Decimal,
    pub ledger_rows: usize,
    pub installments_paid: usize,
}

impl AllocationSummary {
    pub fn describe(&self) -> String {
        match &self.loan_id {
            None => format!(
                "No active loan; KES {:.2} credited to wallet",
                self.credited_to_wallet
            ),
            Some(loan_id) => {
                let mut text = format!("Applied KES {:.2} to loan {loan_id}", self.applied);
                if self.drained_from_wallet > Decimal::ZERO {
                    text.push_str(&format!(
                        " (including KES {:.2} from wallet)",
                        self.drained_from_wallet
                    ));
                }
                if self.credited_to_wallet > Decimal::ZERO {
                    text.push_str(&format!(
                        "; KES {:.2} overpayment credited to wallet",
                        self.credited_to_wallet
                    ));
                }
                text
            }
        }
    }
}

/// Applies repayments across a loan's unpaid installments, oldest first,
/// filling penalty, then interest, then principal on each.
#[derive(Clone)]
pub struct RepaymentAllocator {
    store: LedgerStoreRef,
    wallet: WalletLedger,
}

impl RepaymentAllocator {
    pub fn new(store: LedgerStoreRef, wallet: WalletLedger) -> Self {
        Self { store, wallet }
    }

    pub async fn allocate(&self, ctx: &PaymentContext) -> Result<AllocationSummary> {
        let customer_id = ctx.customer.id.as_str();
        let Some(loan) = self.store.active_loan(&ctx.tenant_id, customer_id).await? else {
            let credited = self
                .wallet
                .credit(
                    &ctx.tenant_id,
                    customer_id,
                    ctx.amount,
                    "No active loan",
                    &ctx.transaction_id,
                    RefType::Mpesa,
                )
                .await?;
            return Ok(AllocationSummary {
                credited_to_wallet: credited,
                ..AllocationSummary::default()
            });
        };

        let drained = self
            .wallet
            .drain(&ctx.tenant_id, customer_id, &ctx.transaction_id)
            .await?;
        let mut pool = ctx.amount + drained;
        let mut summary = AllocationSummary {
            loan_id: Some(loan.id.clone()),
            drained_from_wallet: drained,
            ..AllocationSummary::default()
        };

        let installments = self.store.open_installments(&loan.id).await?;
        for installment in &installments {
            if !is_material(pool) {
                break;
            }
            let penalty_paid = self.store.penalty_paid(&installment.id).await?;
            let split = installment.unpaid(penalty_paid).waterfall(pool);
            if split.total() <= Decimal::ZERO {
                continue;
            }

            let posted = self
                .store
                .post_installment_payment(InstallmentPosting {
                    tenant_id: ctx.tenant_id.clone(),
                    customer_id: customer_id.to_string(),
                    loan_id: loan.id.clone(),
                    installment_id: installment.id.clone(),
                    source_ref: ctx.transaction_id.clone(),
                    split,
                })
                .await?;

            pool -= posted.applied.total();
            summary.applied += posted.applied.total();
            summary.ledger_rows += posted.payments.len();
            if posted.status == InstallmentStatus::Paid {
                summary.installments_paid += 1;
            }
            debug!(
                transaction_id = %ctx.transaction_id,
                installment = installment.number,
                applied = %posted.applied.total(),
                status = ?posted.status,
                "Installment posted"
            );
        }

        if self.store.open_installments(&loan.id).await?.is_empty() {
            self.store
                .set_repayment_state(&loan.id, RepaymentState::Completed)
                .await?;
        }

        if pool > Decimal::ZERO {
            summary.credited_to_wallet = self
                .wallet
                .credit(
                    &ctx.tenant_id,
                    customer_id,
                    pool,
                    "Overpayment",
                    &ctx.transaction_id,
                    RefType::Overpayment,
                )
                .await?;
        }

        info!(
            transaction_id = %ctx.transaction_id,
            loan_id = %loan.id,
            applied = %summary.applied,
            drained = %summary.drained_from_wallet,
            overpayment = %summary.credited_to_wallet,
            "Repayment allocated"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::loan::{Customer, Installment, Loan, LoanStatus, PaymentType};
    use crate::domain::ports::{AtomicStore, LedgerRepository};
    use crate::domain::wallet::{Direction, WalletEntry};
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn customer() -> Customer {
        Customer {
            id: "c1".into(),
            tenant_id: "t1".into(),
            national_id: Some("12345678".into()),
            mobile: "0712345678".into(),
            name: None,
            is_new: false,
        }
    }

    fn installment(number: u32, principal: Decimal, interest: Decimal, penalty: Decimal) -> Installment {
        Installment {
            id: format!("i{number}"),
            loan_id: "l1".into(),
            number,
            principal_due: principal,
            interest_due: interest,
            penalty_due: penalty,
            principal_paid: Decimal::ZERO,
            interest_paid: Decimal::ZERO,
            total_paid: Decimal::ZERO,
            status: InstallmentStatus::Pending,
        }
    }

    async fn setup(installments: Vec<Installment>) -> (InMemoryLedgerStore, RepaymentAllocator) {
        let store = InMemoryLedgerStore::new();
        store.insert_customer(customer()).await;
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
                total_payable: dec!(2000),
                created_at: Utc::now(),
                disbursed_at: Some(Utc::now()),
            })
            .await;
        for i in installments {
            store.insert_installment(i).await;
        }
        let shared = Arc::new(store.clone());
        let allocator = RepaymentAllocator::new(shared.clone(), WalletLedger::new(shared));
        (store, allocator)
    }

    fn ctx(tx: &str, amount: Decimal) -> PaymentContext {
        PaymentContext {
            transaction_id: tx.into(),
            tenant_id: "t1".into(),
            customer: customer(),
            amount,
        }
    }

    #[tokio::test]
    async fn test_exact_payment_settles_installment() {
        let (store, allocator) =
            setup(vec![installment(1, dec!(900), dec!(100), Decimal::ZERO)]).await;

        let summary = allocator.allocate(&ctx("TX1", dec!(1000))).await.unwrap();
        assert_eq!(summary.applied, dec!(1000));
        assert_eq!(summary.credited_to_wallet, Decimal::ZERO);

        let state = store.snapshot().await;
        let rows: Vec<_> = state
            .loan_payments
            .iter()
            .map(|p| (p.payment_type, p.amount))
            .collect();
        assert_eq!(
            rows,
            vec![
                (PaymentType::Interest, dec!(100)),
                (PaymentType::Principal, dec!(900))
            ]
        );
        assert_eq!(state.installments["i1"].status, InstallmentStatus::Paid);
        assert!(state.wallet_transactions.is_empty());
        assert_eq!(state.loans["l1"].repayment_state, RepaymentState::Completed);
    }

    #[tokio::test]
    async fn test_active_loan_is_chosen_by_repayment_state() {
        let (store, allocator) =
            setup(vec![installment(1, dec!(900), dec!(100), Decimal::ZERO)]).await;
        let loan = store.loan("t1", "l1").await.unwrap().unwrap();
        store
            .insert_loan(Loan {
                status: LoanStatus::Approved,
                disbursed_at: None,
                ..loan
            })
            .await;

        let summary = allocator.allocate(&ctx("TX1", dec!(1000))).await.unwrap();
        assert_eq!(summary.applied, dec!(1000));

        let state = store.snapshot().await;
        assert_eq!(state.loan_payments.len(), 2);
        assert_eq!(state.installments["i1"].status, InstallmentStatus::Paid);
        assert!(state.wallet_transactions.is_empty());
    }

    #[tokio::test]
    async fn test_partial_payment() {
        let (store, allocator) =
            setup(vec![installment(1, dec!(900), dec!(100), Decimal::ZERO)]).await;

        allocator.allocate(&ctx("TX1", dec!(500))).await.unwrap();

        let state = store.snapshot().await;
        let rows: Vec<_> = state
            .loan_payments
            .iter()
            .map(|p| (p.payment_type, p.amount))
            .collect();
        assert_eq!(
            rows,
            vec![
                (PaymentType::Interest, dec!(100)),
                (PaymentType::Principal, dec!(400))
            ]
        );
        assert_eq!(state.installments["i1"].status, InstallmentStatus::Partial);
        assert!(state.wallet_transactions.is_empty());
        assert_eq!(state.loans["l1"].repayment_state, RepaymentState::Ongoing);
    }

    #[tokio::test]
    async fn test_spills_into_next_installment_in_order() {
        let (store, allocator) = setup(vec![
            installment(2, dec!(450), dec!(50), Decimal::ZERO),
            installment(1, dec!(450), dec!(50), dec!(20)),
        ])
        .await;

        allocator.allocate(&ctx("TX1", dec!(600))).await.unwrap();

        let state = store.snapshot().await;
        assert_eq!(state.installments["i1"].status, InstallmentStatus::Paid);
        assert_eq!(state.installments["i1"].total_paid, dec!(520));
        assert_eq!(state.installments["i2"].status, InstallmentStatus::Partial);
        assert_eq!(state.installments["i2"].interest_paid, dec!(50));
        assert_eq!(state.installments["i2"].principal_paid, dec!(30));

        let first = &state.loan_payments[0];
        assert_eq!(first.payment_type, PaymentType::Penalty);
        assert_eq!(first.installment_id.as_deref(), Some("i1"));
        assert_eq!(first.balance_before, dec!(520));
        assert_eq!(first.balance_after, dec!(500));
    }

    #[tokio::test]
    async fn test_wallet_drained_and_overpayment_returned() {
        let (store, allocator) =
            setup(vec![installment(1, dec!(900), dec!(100), Decimal::ZERO)]).await;
        store
            .wallet_transact(WalletEntry {
                tenant_id: "t1".into(),
                customer_id: "c1".into(),
                amount: dec!(300),
                direction: Direction::Credit,
                narration: "Excess after fees".into(),
                reference: "TX0".into(),
                ref_type: RefType::Registration,
            })
            .await
            .unwrap();

        let summary = allocator.allocate(&ctx("TX1", dec!(800))).await.unwrap();
        assert_eq!(summary.drained_from_wallet, dec!(300));
        assert_eq!(summary.applied, dec!(1000));
        assert_eq!(summary.credited_to_wallet, dec!(100));

        let state = store.snapshot().await;
        assert_eq!(state.wallet_balance("t1", "c1"), dec!(100));
        let last = state.wallet_transactions.last().unwrap();
        assert_eq!(last.ref_type, RefType::Overpayment);
    }

    #[tokio::test]
    async fn test_no_active_loan_goes_to_wallet() {
        let (store, allocator) = setup(Vec::new()).await;
        // Completed loans are not repayable.
        store
            .set_repayment_state("l1", RepaymentState::Completed)
            .await
            .unwrap();

        let summary = allocator.allocate(&ctx("TX1", dec!(250))).await.unwrap();
        assert_eq!(summary.loan_id, None);
        assert_eq!(summary.describe(), "No active loan; KES 250.00 credited to wallet");

        let state = store.snapshot().await;
        assert_eq!(state.wallet_balance("t1", "c1"), dec!(250));
        assert_eq!(state.wallet_transactions[0].ref_type, RefType::Mpesa);
    }

    #[tokio::test]
    async fn test_nothing_owed_routes_everything_to_wallet() {
        let (store, allocator) = setup(Vec::new()).await;

        let summary = allocator.allocate(&ctx("TX1", dec!(250))).await.unwrap();
        assert_eq!(summary.applied, Decimal::ZERO);
        assert_eq!(summary.credited_to_wallet, dec!(250));
        assert!(store.snapshot().await.loan_payments.is_empty());
    }

    #[tokio::test]
    async fn test_random_payments_conserve_money() {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        for _ in 0..20 {
            let (store, allocator) = setup(vec![
                installment(1, dec!(300), dec!(45.50), dec!(12.25)),
                installment(2, dec!(300), dec!(45.50), Decimal::ZERO),
                installment(3, dec!(300), dec!(45.50), Decimal::ZERO),
            ])
            .await;

            let mut incoming = Decimal::ZERO;
            for n in 0..3 {
                let amount = Decimal::new(rng.gen_range(1..60_000), 2);
                incoming += amount;
                allocator
                    .allocate(&ctx(&format!("TX{n}"), amount))
                    .await
                    .unwrap();
            }

            let state = store.snapshot().await;
            let posted: Decimal = state.loan_payments.iter().map(|p| p.amount).sum();
            assert_eq!(posted + state.wallet_balance("t1", "c1"), incoming);
            for inst in state.installments.values() {
                assert!(inst.total_paid <= inst.total_due() + crate::domain::money::EPSILON);
            }
        }
    }
}
