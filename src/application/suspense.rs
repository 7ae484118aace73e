use crate::domain::ports::LedgerStoreRef;
use crate::domain::transaction::{SuspenseRecord, Transaction};
use crate::error::Result;
use chrono::Utc;
use tracing::warn;

/// Parks transactions that cannot be attributed to a customer.
#[derive(Clone)]
pub struct SuspenseHandler {
    store: LedgerStoreRef,
}

impl SuspenseHandler {
    pub fn new(store: LedgerStoreRef) -> Self {
        Self { store }
    }

    /// Upserts the suspense record for `tx`. Safe to call repeatedly.
    pub async fn park(&self, tx: &Transaction, tenant_id: Option<&str>, reason: &str) -> Result<()> {
        let now = Utc::now();
        self.store
            .upsert_suspense(SuspenseRecord {
                transaction_id: tx.id.clone(),
                tenant_id: tenant_id.map(str::to_string).or_else(|| tx.tenant_id.clone()),
                payer_name: tx.payer_name.clone(),
                phone: tx.phone.clone(),
                amount: tx.amount,
                billref: tx.billref.clone(),
                reason: reason.to_string(),
                created_at: now,
                updated_at: now,
            })
            .await?;
        warn!(transaction_id = %tx.id, phone = %tx.phone, reason, "Transaction parked in suspense");
        Ok(())
    }
}
