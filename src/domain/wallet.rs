use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

/// Why funds moved in or out of a wallet.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum RefType {
    Registration,
    Fee,
    Overpayment,
    Mpesa,
    Repayment,
}

/// Immutable wallet ledger row. Balances are always the signed sum of these.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct WalletTransaction {
    pub id: String,
    pub tenant_id: String,
    pub customer_id: String,
    pub direction: Direction,
    pub amount: Decimal,
    pub narration: String,
    pub reference: String,
    pub ref_type: RefType,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }
}

/// Arguments of the atomic wallet primitive.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletEntry {
    pub tenant_id: String,
    pub customer_id: String,
    pub amount: Decimal,
    pub direction: Direction,
    pub narration: String,
    pub reference: String,
    pub ref_type: RefType,
}

/// Signed balance of a set of wallet rows.
pub fn balance<'a>(rows: impl IntoIterator<Item = &'a WalletTransaction>) -> Decimal {
    rows.into_iter().map(WalletTransaction::signed_amount).sum()
}
