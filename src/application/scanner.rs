use super::processor::{ProcessedItem, TransactionProcessor};
use crate::domain::ports::LedgerStoreRef;
use crate::error::Result;
use tracing::info;

/// Processes pending transactions straight from the ledger, bypassing the
/// queue. Used for backfills and ad-hoc runs.
#[derive(Clone)]
pub struct BatchScanner {
    store: LedgerStoreRef,
    processor: TransactionProcessor,
}

impl BatchScanner {
    pub fn new(store: LedgerStoreRef, processor: TransactionProcessor) -> Self {
        Self { store, processor }
    }

    /// Oldest first. Per-item failures are reported in the items, never raised.
    /// With a tenant, transactions still missing a tenant are left for an
    /// unfiltered scan.
    pub async fn scan(&self, tenant_id: Option<&str>, limit: usize) -> Result<Vec<ProcessedItem>> {
        let pending = self.store.pending_transactions(tenant_id, limit).await?;
        let mut items = Vec::with_capacity(pending.len());
        for tx in pending {
            items.push(self.processor.process_item(&tx.id).await);
        }
        info!(tenant_id = ?tenant_id, scanned = items.len(), "Pending transactions scanned");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::ports::LedgerRepository;
    use crate::domain::transaction::Transaction;
    use crate::application::processor::ProcessOutcome;
    use crate::infrastructure::in_memory::InMemoryLedgerStore;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_scan_isolates_items_and_respects_limit() {
        let store = InMemoryLedgerStore::new();
        let base = Utc::now();
        for (i, tenant) in ["t1", "t1", "t2", "t1"].into_iter().enumerate() {
            let mut tx = Transaction::pending(format!("TX{i}"), "0700000000", dec!(10)).with_tenant(tenant);
            tx.timestamp = base + Duration::seconds(i as i64);
            store.insert_transaction(tx).await.unwrap();
        }
        let shared: LedgerStoreRef = Arc::new(store.clone());
        let processor = TransactionProcessor::new(shared.clone(), &EngineConfig::default());
        let scanner = BatchScanner::new(shared, processor);

        let items = scanner.scan(Some("t1"), 2).await.unwrap();
        let ids: Vec<_> = items.iter().map(|i| i.transaction_id.as_str()).collect();
        assert_eq!(ids, ["TX0", "TX1"]);
        assert!(items
            .iter()
            .all(|i| matches!(i.outcome, ProcessOutcome::Suspense { .. })));

        // Already processed transactions are no longer pending.
        let rest = scanner.scan(None, 50).await.unwrap();
        let ids: Vec<_> = rest.iter().map(|i| i.transaction_id.as_str()).collect();
        assert_eq!(ids, ["TX2", "TX3"]);
    }

    #[tokio::test]
    async fn test_unattributed_transactions_need_unfiltered_scan() {
        let store = InMemoryLedgerStore::new();
        store
            .insert_transaction(Transaction::pending("TX1", "0700000000", dec!(10)))
            .await
            .unwrap();
        let shared: LedgerStoreRef = Arc::new(store.clone());
        let processor = TransactionProcessor::new(shared.clone(), &EngineConfig::default());
        let scanner = BatchScanner::new(shared, processor);

        assert!(scanner.scan(Some("t1"), 50).await.unwrap().is_empty());
        let items = scanner.scan(None, 50).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].transaction_id, "TX1");
    }
}
