#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use loanrecon::application::engine::ReconEngine;
use loanrecon::config::EngineConfig;
use loanrecon::domain::loan::{
    Customer, Installment, InstallmentStatus, Loan, LoanStatus, RepaymentState,
};
use loanrecon::domain::ports::{LedgerStoreRef, SmsGateway};
use loanrecon::domain::sms::SmsProviderConfig;
use loanrecon::domain::transaction::Transaction;
use loanrecon::error::Result;
use loanrecon::infrastructure::in_memory::{InMemoryLedgerStore, LedgerState};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};

pub const TENANT: &str = "t1";

pub fn customer(id: &str, national_id: &str, mobile: &str, is_new: bool) -> Customer {
    Customer {
        id: id.to_string(),
        tenant_id: TENANT.to_string(),
        national_id: Some(national_id.to_string()),
        mobile: mobile.to_string(),
        name: None,
        is_new,
    }
}

pub fn loan(id: &str, customer_id: &str, status: LoanStatus) -> Loan {
    Loan {
        id: id.to_string(),
        tenant_id: TENANT.to_string(),
        customer_id: customer_id.to_string(),
        status,
        repayment_state: RepaymentState::Ongoing,
        registration_fee: dec!(500),
        registration_fee_paid: status == LoanStatus::Disbursed,
        processing_fee: dec!(200),
        processing_fee_paid: status == LoanStatus::Disbursed,
        total_payable: dec!(2050),
        created_at: Utc::now() - Duration::days(30),
        disbursed_at: (status == LoanStatus::Disbursed).then(Utc::now),
    }
}

pub fn installment(
    loan_id: &str,
    number: u32,
    principal: Decimal,
    interest: Decimal,
    penalty: Decimal,
) -> Installment {
    Installment {
        id: format!("{loan_id}-i{number}"),
        loan_id: loan_id.to_string(),
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

pub fn sms_config() -> SmsProviderConfig {
    SmsProviderConfig {
        tenant_id: TENANT.to_string(),
        endpoint: "http://127.0.0.1:9/sms".to_string(),
        api_key: "secret".to_string(),
        partner_id: "1234".to_string(),
        sender_id: "LENDER".to_string(),
    }
}

/// Ledger with one borrower `c1` (national id 12345678, phone 0712345678)
/// holding disbursed loan `l1`:
/// - installment 1: principal 900, interest 100
/// - installment 2: principal 900, interest 100, penalty 50
///
/// and one new applicant `c2` (national id 87654321, phone 0722000000) with
/// approved loan `l2` whose fees are unpaid.
pub fn seeded_state() -> LedgerState {
    let mut state = LedgerState::default();
    for c in [
        customer("c1", "12345678", "0712345678", false),
        customer("c2", "87654321", "254722000000", true),
    ] {
        state.customers.insert(c.id.clone(), c);
    }
    for l in [
        loan("l1", "c1", LoanStatus::Disbursed),
        loan("l2", "c2", LoanStatus::Approved),
    ] {
        state.loans.insert(l.id.clone(), l);
    }
    for i in [
        installment("l1", 1, dec!(900), dec!(100), Decimal::ZERO),
        installment("l1", 2, dec!(900), dec!(100), dec!(50)),
    ] {
        state.installments.insert(i.id.clone(), i);
    }
    state
}

pub async fn seeded_store() -> InMemoryLedgerStore {
    InMemoryLedgerStore::from_state(seeded_state())
}

pub fn payment(id: &str, phone: &str, amount: Decimal, billref: Option<&str>) -> Transaction {
    let tx = Transaction::pending(id, phone, amount);
    match billref {
        Some(billref) => tx.with_billref(billref),
        None => tx,
    }
}

/// Captures messages instead of sending them.
#[derive(Default)]
pub struct RecordingGateway {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingGateway {
    pub fn messages(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsGateway for RecordingGateway {
    async fn send(&self, _config: &SmsProviderConfig, recipient: &str, message: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.to_string()));
        Ok(())
    }
}

pub fn engine(store: &InMemoryLedgerStore, gateway: Arc<RecordingGateway>, worker: &str) -> ReconEngine {
    let shared: LedgerStoreRef = Arc::new(store.clone());
    ReconEngine::new(shared, gateway, EngineConfig::default().with_worker_id(worker))
}
