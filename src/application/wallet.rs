use crate::domain::ports::LedgerStoreRef;
use crate::domain::wallet::{Direction, RefType, WalletEntry};
use crate::error::Result;
use rust_decimal::Decimal;
use tracing::debug;

/// Bookkeeping wrapper around the store's atomic wallet primitives.
#[derive(Clone)]
pub struct WalletLedger {
    store: LedgerStoreRef,
}

impl WalletLedger {
    pub fn new(store: LedgerStoreRef) -> Self {
        Self { store }
    }

    /// Credits `amount` to the customer's wallet and returns what was
    /// credited. Nothing is written for a zero amount.
    pub async fn credit(
        &self,
        tenant_id: &str,
        customer_id: &str,
        amount: Decimal,
        narration: &str,
        reference: &str,
        ref_type: RefType,
    ) -> Result<Decimal> {
        if amount <= Decimal::ZERO {
            return Ok(Decimal::ZERO);
        }
        self.store
            .wallet_transact(WalletEntry {
                tenant_id: tenant_id.to_string(),
                customer_id: customer_id.to_string(),
                amount,
                direction: Direction::Credit,
                narration: narration.to_string(),
                reference: reference.to_string(),
                ref_type,
            })
            .await?;
        debug!(tenant_id, customer_id, %amount, reference, narration, "Wallet credited");
        Ok(amount)
    }

    /// Moves the whole wallet balance into a repayment.
    pub async fn drain(&self, tenant_id: &str, customer_id: &str, reference: &str) -> Result<Decimal> {
        let drained = self
            .store
            .drain_wallet_for_repayment(tenant_id, customer_id, reference)
            .await?;
        if drained > Decimal::ZERO {
            debug!(tenant_id, customer_id, %drained, reference, "Wallet drained");
        }
        Ok(drained)
    }

    pub async fn balance(&self, tenant_id: &str, customer_id: &str) -> Result<Decimal> {
        self.store.wallet_balance(tenant_id, customer_id).await
    }
}
