use crate::domain::intent::PaymentIntent;
use crate::domain::loan::Customer;
use crate::domain::phone;
use crate::domain::ports::LedgerStoreRef;
use crate::domain::transaction::Transaction;
use crate::error::{ReconError, Result};

pub const TENANT_NOT_FOUND: &str = "Tenant could not be resolved from phone number";
pub const CUSTOMER_NOT_FOUND: &str = "Customer not found in system";

/// Who a transaction belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub tenant_id: String,
    pub customer: Customer,
}

/// Read-only lookup of the owning tenant and customer of a transaction.
#[derive(Clone)]
pub struct Resolver {
    store: LedgerStoreRef,
}

impl Resolver {
    pub fn new(store: LedgerStoreRef) -> Self {
        Self { store }
    }

    /// Resolves tenant first, then customer. A phone number with no digits
    /// leaves the tenant unresolved; a usable number that matches nobody is
    /// an unknown customer. Other errors are store failures.
    pub async fn resolve(&self, tx: &Transaction, intent: &PaymentIntent) -> Result<Resolution> {
        let variants = phone::variants(&tx.phone);

        let tenant_id = match &tx.tenant_id {
            Some(tenant_id) => tenant_id.clone(),
            None if variants.is_empty() => {
                return Err(ReconError::TenantUnresolved(TENANT_NOT_FOUND.to_string()));
            }
            None => match self.store.customer_by_phone(None, &variants).await? {
                Some(customer) => customer.tenant_id,
                None => {
                    return Err(ReconError::CustomerUnresolved(CUSTOMER_NOT_FOUND.to_string()));
                }
            },
        };

        let customer = self.resolve_customer(&tenant_id, intent, &variants).await?;
        match customer {
            Some(customer) => Ok(Resolution {
                tenant_id,
                customer,
            }),
            None => Err(ReconError::CustomerUnresolved(
                CUSTOMER_NOT_FOUND.to_string(),
            )),
        }
    }

    async fn resolve_customer(
        &self,
        tenant_id: &str,
        intent: &PaymentIntent,
        variants: &[String],
    ) -> Result<Option<Customer>> {
        if let Some(national_id) = intent.account_ref()
            && let Some(customer) = self
                .store
                .customer_by_national_id(tenant_id, national_id)
                .await?
        {
            return Ok(Some(customer));
        }
        if let Some(customer_id) = intent.customer_id()
            && let Some(customer) = self.store.customer(tenant_id, customer_id).await?
        {
            return Ok(Some(customer));
        }
        if variants.is_empty() {
            return Ok(None);
        }
        self.store.customer_by_phone(Some(tenant_id), variants).await
    }
}
