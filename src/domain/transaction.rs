use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Processing,
    Applied,
    Suspense,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Applied | TransactionStatus::Suspense | TransactionStatus::Failed
        )
    }
}

/// An inbound mobile-money payment notification.
///
/// The transaction id doubles as the idempotency key for everything the
/// engine posts on its behalf.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: String,
    pub tenant_id: Option<String>,
    pub customer_id: Option<String>,
    pub phone: String,
    #[serde(default)]
    pub payer_name: Option<String>,
    pub amount: Decimal,
    #[serde(default)]
    pub billref: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: TransactionStatus,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub claimed_by: Option<String>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment_sms_sent: bool,
}

impl Transaction {
    pub fn pending(id: impl Into<String>, phone: impl Into<String>, amount: Decimal) -> Self {
        Self {
            id: id.into(),
            tenant_id: None,
            customer_id: None,
            phone: phone.into(),
            payer_name: None,
            amount,
            billref: None,
            timestamp: Utc::now(),
            status: TransactionStatus::Pending,
            result: None,
            claimed_by: None,
            claimed_at: None,
            processed_at: None,
            payment_sms_sent: false,
        }
    }

    pub fn with_billref(mut self, billref: impl Into<String>) -> Self {
        self.billref = Some(billref.into());
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

/// Final state written back to a claimed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub status: TransactionStatus,
    pub result: String,
    pub tenant_id: Option<String>,
    pub customer_id: Option<String>,
}

/// A transaction parked for manual review, keyed by transaction id.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct SuspenseRecord {
    pub transaction_id: String,
    pub tenant_id: Option<String>,
    pub payer_name: Option<String>,
    pub phone: String,
    pub amount: Decimal,
    pub billref: Option<String>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
