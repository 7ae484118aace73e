use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-tenant credentials for the bulk SMS provider.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct SmsProviderConfig {
    pub tenant_id: String,
    pub endpoint: String,
    pub api_key: String,
    pub partner_id: String,
    pub sender_id: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct SmsLogEntry {
    pub tenant_id: String,
    pub transaction_id: String,
    pub recipient: String,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

/// Payment receipt sent after a repayment lands.
pub fn payment_receipt(amount: Decimal, balance: Decimal) -> String {
    format!(
        "Dear Customer,\nWe have received your payment of KES {:.2}.\nYour outstanding loan balance is KES {:.2}.\nThank you for being our valued client.",
        amount, balance
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_payment_receipt_template() {
        assert_eq!(
            payment_receipt(dec!(500), dec!(1250.5)),
            "Dear Customer,\nWe have received your payment of KES 500.00.\nYour outstanding loan balance is KES 1250.50.\nThank you for being our valued client."
        );
    }
}
