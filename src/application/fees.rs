//! Upfront fee handling. A fee is charged in full or not at all; whatever
//! cannot be charged is parked in the customer's wallet.

use super::PaymentContext;
use super::wallet::WalletLedger;
use crate::domain::loan::{Loan, LoanPayment, PaymentType};
use crate::domain::money::saturating_sub;
use crate::domain::ports::LedgerStoreRef;
use crate::domain::wallet::RefType;
use crate::error::{ReconError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;

fn fee_row(ctx: &PaymentContext, loan: &Loan, payment_type: PaymentType, fee: Decimal) -> LoanPayment {
    LoanPayment {
        id: uuid::Uuid::new_v4().to_string(),
        tenant_id: ctx.tenant_id.clone(),
        loan_id: loan.id.clone(),
        customer_id: loan.customer_id.clone(),
        installment_id: None,
        payment_type,
        amount: fee,
        source_ref: ctx.transaction_id.clone(),
        balance_before: fee,
        balance_after: Decimal::ZERO,
        created_at: Utc::now(),
    }
}

/// Charges registration and processing fees from a `registration` payment.
#[derive(Clone)]
pub struct RegistrationFeeHandler {
    store: LedgerStoreRef,
    wallet: WalletLedger,
}

impl RegistrationFeeHandler {
    pub fn new(store: LedgerStoreRef, wallet: WalletLedger) -> Self {
        Self { store, wallet }
    }

    pub async fn handle(&self, ctx: &PaymentContext) -> Result<String> {
        let customer = &ctx.customer;
        let Some(loan) = self
            .store
            .latest_fee_loan(&ctx.tenant_id, &customer.id)
            .await?
        else {
            self.wallet
                .credit(
                    &ctx.tenant_id,
                    &customer.id,
                    ctx.amount,
                    "No pending loan",
                    &ctx.transaction_id,
                    RefType::Registration,
                )
                .await?;
            return Ok(format!(
                "No pending loan; KES {:.2} credited to wallet",
                ctx.amount
            ));
        };

        let mut remaining = ctx.amount;
        let mut charged = Vec::new();

        if customer.is_new && !loan.registration_fee_paid {
            if remaining < loan.registration_fee {
                self.wallet
                    .credit(
                        &ctx.tenant_id,
                        &customer.id,
                        ctx.amount,
                        "Insufficient for registration fee",
                        &ctx.transaction_id,
                        RefType::Registration,
                    )
                    .await?;
                return Ok(format!(
                    "Insufficient for registration fee of KES {:.2}; KES {:.2} credited to wallet",
                    loan.registration_fee, ctx.amount
                ));
            }
            let row = fee_row(ctx, &loan, PaymentType::Registration, loan.registration_fee);
            if self.store.charge_fee(row).await? {
                remaining -= loan.registration_fee;
                charged.push(format!("registration fee KES {:.2}", loan.registration_fee));
            }
            self.store.clear_new_customer_flag(&customer.id).await?;
        }

        if !loan.processing_fee_paid && remaining >= loan.processing_fee {
            let row = fee_row(ctx, &loan, PaymentType::Processing, loan.processing_fee);
            if self.store.charge_fee(row).await? {
                remaining -= loan.processing_fee;
                charged.push(format!("processing fee KES {:.2}", loan.processing_fee));
            }
        }

        let mut result = if charged.is_empty() {
            "No fees due".to_string()
        } else {
            format!("Deducted {}", charged.join(" and "))
        };
        if remaining > Decimal::ZERO {
            self.wallet
                .credit(
                    &ctx.tenant_id,
                    &customer.id,
                    remaining,
                    "Excess after fees",
                    &ctx.transaction_id,
                    RefType::Registration,
                )
                .await?;
            result.push_str(&format!("; KES {remaining:.2} credited to wallet"));
        }

        info!(
            transaction_id = %ctx.transaction_id,
            loan_id = %loan.id,
            result = %result,
            "Registration payment handled"
        );
        Ok(result)
    }
}

/// Charges the processing fee of a specific loan (`processing-<loanId>`).
#[derive(Clone)]
pub struct ProcessingFeeHandler {
    store: LedgerStoreRef,
    wallet: WalletLedger,
}

impl ProcessingFeeHandler {
    pub fn new(store: LedgerStoreRef, wallet: WalletLedger) -> Self {
        Self { store, wallet }
    }

    pub async fn handle(&self, ctx: &PaymentContext, loan_id: &str) -> Result<String> {
        let loan = self
            .store
            .loan(&ctx.tenant_id, loan_id)
            .await?
            .ok_or_else(|| ReconError::Handler(format!("Loan {loan_id} not found")))?;

        // The payment is left untouched; no wallet credit either.
        if loan.processing_fee_paid {
            return Ok("Processing fee already paid".to_string());
        }

        if ctx.amount < loan.processing_fee {
            self.wallet
                .credit(
                    &ctx.tenant_id,
                    &ctx.customer.id,
                    ctx.amount,
                    "Insufficient for processing fee",
                    &ctx.transaction_id,
                    RefType::Fee,
                )
                .await?;
            return Ok(format!(
                "Insufficient for processing fee of KES {:.2}; KES {:.2} credited to wallet",
                loan.processing_fee, ctx.amount
            ));
        }

        let row = fee_row(ctx, &loan, PaymentType::Processing, loan.processing_fee);
        if !self.store.charge_fee(row).await? {
            return Ok("Processing fee already paid".to_string());
        }

        let excess = saturating_sub(ctx.amount, loan.processing_fee);
        let mut result = format!("Deducted processing fee KES {:.2}", loan.processing_fee);
        if excess > Decimal::ZERO {
            self.wallet
                .credit(
                    &ctx.tenant_id,
                    &ctx.customer.id,
                    excess,
                    "Excess after fees",
                    &ctx.transaction_id,
                    RefType::Fee,
                )
                .await?;
            result.push_str(&format!("; KES {excess:.2} credited to wallet"));
        }

        info!(
            transaction_id = %ctx.transaction_id,
            loan_id,
            result = %result,
            "Processing fee handled"
        );
        Ok(result)
    }
}
