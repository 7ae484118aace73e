use super::money::{is_settled, saturating_sub};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Customer {
    pub id: String,
    pub tenant_id: String,
    pub national_id: Option<String>,
    pub mobile: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Cleared once the registration fee has been charged.
    #[serde(default)]
    pub is_new: bool,
}

/// Origination lifecycle of a loan.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Pending,
    Approved,
    ReadyForDisbursement,
    Disbursed,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum RepaymentState {
    Ongoing,
    Partial,
    Overdue,
    Completed,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Loan {
    pub id: String,
    pub tenant_id: String,
    pub customer_id: String,
    pub status: LoanStatus,
    pub repayment_state: RepaymentState,
    pub registration_fee: Decimal,
    #[serde(default)]
    pub registration_fee_paid: bool,
    pub processing_fee: Decimal,
    #[serde(default)]
    pub processing_fee_paid: bool,
    pub total_payable: Decimal,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub disbursed_at: Option<DateTime<Utc>>,
}

impl Loan {
    /// Loans that upfront fees can still be charged against.
    pub fn accepts_fees(&self) -> bool {
        !matches!(self.status, LoanStatus::Rejected | LoanStatus::Disbursed)
    }

    /// Loans with an open repayment schedule, whatever their origination status.
    pub fn is_repayable(&self) -> bool {
        matches!(
            self.repayment_state,
            RepaymentState::Ongoing | RepaymentState::Partial | RepaymentState::Overdue
        )
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Pending,
    Partial,
    Overdue,
    Paid,
}

impl InstallmentStatus {
    pub fn is_open(&self) -> bool {
        !matches!(self, InstallmentStatus::Paid)
    }
}

/// Ledger bucket of a [`LoanPayment`].
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Penalty,
    Interest,
    Principal,
    Registration,
    Processing,
}

/// Amounts per repayment bucket, used both for what is owed and what is paid.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Buckets {
    pub penalty: Decimal,
    pub interest: Decimal,
    pub principal: Decimal,
}

impl Buckets {
    /// Order in which funds are applied.
    pub const WATERFALL: [PaymentType; 3] = [
        PaymentType::Penalty,
        PaymentType::Interest,
        PaymentType::Principal,
    ];

    pub fn total(&self) -> Decimal {
        self.penalty + self.interest + self.principal
    }

    pub fn get(&self, bucket: PaymentType) -> Decimal {
        match bucket {
            PaymentType::Penalty => self.penalty,
            PaymentType::Interest => self.interest,
            PaymentType::Principal => self.principal,
            PaymentType::Registration | PaymentType::Processing => Decimal::ZERO,
        }
    }

    fn slot(&mut self, bucket: PaymentType) -> Option<&mut Decimal> {
        match bucket {
            PaymentType::Penalty => Some(&mut self.penalty),
            PaymentType::Interest => Some(&mut self.interest),
            PaymentType::Principal => Some(&mut self.principal),
            PaymentType::Registration | PaymentType::Processing => None,
        }
    }

    /// Splits `funds` across `self` (the unpaid amounts) penalty first, then
    /// interest, then principal. Each bucket is capped at its unpaid amount.
    pub fn waterfall(&self, funds: Decimal) -> Buckets {
        let mut remaining = funds.max(Decimal::ZERO);
        let mut split = Buckets::default();
        for bucket in Self::WATERFALL {
            let take = self.get(bucket).max(Decimal::ZERO).min(remaining);
            if let Some(slot) = split.slot(bucket) {
                *slot = take;
            }
            remaining -= take;
        }
        split
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Installment {
    pub id: String,
    pub loan_id: String,
    pub number: u32,
    pub principal_due: Decimal,
    pub interest_due: Decimal,
    #[serde(default)]
    pub penalty_due: Decimal,
    #[serde(default)]
    pub principal_paid: Decimal,
    #[serde(default)]
    pub interest_paid: Decimal,
    /// Includes penalty, which has no column of its own.
    #[serde(default)]
    pub total_paid: Decimal,
    pub status: InstallmentStatus,
}

impl Installment {
    pub fn total_due(&self) -> Decimal {
        self.principal_due + self.interest_due + self.penalty_due
    }

    /// What is still owed, given the penalty already collected on the ledger.
    pub fn unpaid(&self, penalty_paid: Decimal) -> Buckets {
        Buckets {
            penalty: saturating_sub(self.penalty_due, penalty_paid),
            interest: saturating_sub(self.interest_due, self.interest_paid),
            principal: saturating_sub(self.principal_due, self.principal_paid),
        }
    }

    /// Records a posted split and moves the status forward.
    pub fn apply(&mut self, split: &Buckets) {
        self.interest_paid += split.interest;
        self.principal_paid += split.principal;
        self.total_paid += split.total();

        if is_settled(self.total_paid, self.total_due()) {
            self.status = InstallmentStatus::Paid;
        } else if split.total() > Decimal::ZERO {
            self.status = InstallmentStatus::Partial;
        }
    }
}

/// One allocation event on the loan ledger. Never edited after insert.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct LoanPayment {
    pub id: String,
    pub tenant_id: String,
    pub loan_id: String,
    pub customer_id: String,
    pub installment_id: Option<String>,
    pub payment_type: PaymentType,
    pub amount: Decimal,
    /// Transaction id the funds came from.
    pub source_ref: String,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

/// A request to post funds against one installment. The store re-runs the
/// waterfall on `split.total()` against what is unpaid at posting time.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallmentPosting {
    pub tenant_id: String,
    pub customer_id: String,
    pub loan_id: String,
    pub installment_id: String,
    pub source_ref: String,
    pub split: Buckets,
}

/// What the store actually posted, after re-checking unpaid amounts.
#[derive(Debug, Clone, PartialEq)]
pub struct PostedInstallment {
    pub applied: Buckets,
    pub status: InstallmentStatus,
    pub payments: Vec<LoanPayment>,
}

/// Builds one ledger row per non-zero bucket, walking the balance down from
/// `unpaid_total`.
pub fn ledger_rows(posting: &InstallmentPosting, unpaid_total: Decimal) -> Vec<LoanPayment> {
    let now = Utc::now();
    let mut balance = unpaid_total;
    Buckets::WATERFALL
        .into_iter()
        .filter_map(|bucket| {
            let amount = posting.split.get(bucket);
            if amount <= Decimal::ZERO {
                return None;
            }
            let before = balance;
            balance -= amount;
            Some(LoanPayment {
                id: uuid::Uuid::new_v4().to_string(),
                tenant_id: posting.tenant_id.clone(),
                loan_id: posting.loan_id.clone(),
                customer_id: posting.customer_id.clone(),
                installment_id: Some(posting.installment_id.clone()),
                payment_type: bucket,
                amount,
                source_ref: posting.source_ref.clone(),
                balance_before: before,
                balance_after: balance,
                created_at: now,
            })
        })
        .collect()
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum DisbursementStatus {
    Pending,
    Success,
    Failed,
}

/// Outbound payout of a loan to the customer.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Disbursement {
    pub id: String,
    pub loan_id: String,
    pub status: DisbursementStatus,
    #[serde(default)]
    pub result_code: Option<i64>,
    #[serde(default)]
    pub result_desc: Option<String>,
    #[serde(default)]
    pub receipt: Option<String>,
}

/// Provider callback for a disbursement, as carried on a queue job.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct DisbursementResult {
    pub loan_id: String,
    #[serde(default)]
    pub disbursement_id: Option<String>,
    pub result_code: i64,
    #[serde(default)]
    pub result_desc: Option<String>,
    #[serde(default)]
    pub receipt: Option<String>,
}

impl DisbursementResult {
    pub fn succeeded(&self) -> bool {
        self.result_code == 0
    }
}
