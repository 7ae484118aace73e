use crate::domain::money::Amount;
use crate::domain::transaction::Transaction;
use crate::error::{ReconError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One row of a mobile-money notification export.
#[derive(Debug, Deserialize)]
struct NotificationRecord {
    transaction_id: String,
    tenant_id: Option<String>,
    phone: String,
    payer_name: Option<String>,
    amount: Decimal,
    billref: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<NotificationRecord> for Transaction {
    type Error = ReconError;

    fn try_from(record: NotificationRecord) -> Result<Self> {
        if record.transaction_id.is_empty() {
            return Err(ReconError::Validation("transaction_id is empty".to_string()));
        }
        let amount = Amount::try_from(record.amount)?;
        let mut tx = Transaction::pending(record.transaction_id, record.phone, amount.value());
        tx.tenant_id = record.tenant_id;
        tx.payer_name = record.payer_name;
        tx.billref = record.billref;
        if let Some(timestamp) = record.timestamp {
            tx.timestamp = timestamp;
        }
        Ok(tx)
    }
}

/// Reads pending transactions from a CSV notification file.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<Transaction>`.
/// It handles whitespace trimming and flexible record lengths automatically.
pub struct TransactionReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> TransactionReader<R> {
    /// Creates a new `TransactionReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and validates transactions.
    /// A bad row yields an `Err` item and does not stop the stream.
    pub fn transactions(self) -> impl Iterator<Item = Result<Transaction>> {
        self.reader
            .into_deserialize::<NotificationRecord>()
            .map(|result| result.map_err(ReconError::from).and_then(Transaction::try_from))
    }
}
