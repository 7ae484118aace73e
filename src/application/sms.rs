use crate::domain::money::saturating_sub;
use crate::domain::phone;
use crate::domain::ports::{LedgerStoreRef, SmsGatewayRef};
use crate::domain::sms::{SmsLogEntry, payment_receipt};
use crate::domain::transaction::Transaction;
use crate::error::{ReconError, Result};
use chrono::Utc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsOutcome {
    AlreadySent,
    /// Wallet-only payment; marked sent without a message.
    NoLoan,
    Sent { recipient: String },
}

/// Sends the payment receipt for one transaction, at most once.
#[derive(Clone)]
pub struct SmsJobHandler {
    store: LedgerStoreRef,
    gateway: SmsGatewayRef,
}

impl SmsJobHandler {
    pub fn new(store: LedgerStoreRef, gateway: SmsGatewayRef) -> Self {
        Self { store, gateway }
    }

    pub async fn handle(&self, transaction_id: &str, tenant_id: Option<&str>) -> Result<SmsOutcome> {
        let tx = self
            .store
            .transaction(transaction_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("transaction {transaction_id}")))?;
        if tx.payment_sms_sent {
            debug!(transaction_id, "Payment SMS already sent");
            return Ok(SmsOutcome::AlreadySent);
        }

        let payments = self.store.loan_payments_for_source(transaction_id).await?;
        let Some(first) = payments.first() else {
            self.store.mark_sms_sent(transaction_id).await?;
            debug!(transaction_id, "No loan payment for transaction, SMS skipped");
            return Ok(SmsOutcome::NoLoan);
        };

        let tenant_id = tenant_id
            .map(str::to_string)
            .or_else(|| tx.tenant_id.clone())
            .unwrap_or_else(|| first.tenant_id.clone());
        let loan = self
            .store
            .loan(&tenant_id, &first.loan_id)
            .await?
            .ok_or_else(|| ReconError::NotFound(format!("loan {}", first.loan_id)))?;

        let mobile = self.recipient(&tenant_id, &tx).await?;
        let recipient = phone::to_international(&mobile).unwrap_or(mobile);
        let paid = self.store.loan_payments_total(&loan.id).await?;
        let message = payment_receipt(tx.amount, saturating_sub(loan.total_payable, paid));

        let config = self.store.sms_config(&tenant_id).await?.ok_or_else(|| {
            ReconError::ConfigMissing(format!("No SMS provider configured for tenant {tenant_id}"))
        })?;
        self.gateway.send(&config, &recipient, &message).await?;

        self.store
            .log_sms(SmsLogEntry {
                tenant_id: tenant_id.clone(),
                transaction_id: transaction_id.to_string(),
                recipient: recipient.clone(),
                message,
                sent_at: Utc::now(),
            })
            .await?;
        self.store.mark_sms_sent(transaction_id).await?;
        info!(transaction_id, tenant_id = %tenant_id, recipient = %recipient, "Payment SMS sent");
        Ok(SmsOutcome::Sent { recipient })
    }

    /// Stored customer first, then any customer sharing the payer's number,
    /// then the payer's number itself.
    async fn recipient(&self, tenant_id: &str, tx: &Transaction) -> Result<String> {
        if let Some(customer_id) = &tx.customer_id
            && let Some(customer) = self.store.customer(tenant_id, customer_id).await?
        {
            return Ok(customer.mobile);
        }
        let variants = phone::variants(&tx.phone);
        if !variants.is_empty()
            && let Some(customer) = self.store.customer_by_phone(Some(tenant_id), &variants).await?
        {
            return Ok(customer.mobile);
        }
        Ok(tx.phone.clone())
    }
}
