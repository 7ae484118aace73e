use serde::{Deserialize, Serialize};

const REGISTRATION_FEE: &str = "registration_fee";
const REGISTRATION_PREFIX: &str = "registration-";
const PROCESSING_PREFIX: &str = "processing-";

/// What the payer meant by a payment, inferred from its billref.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentIntent {
    /// Loan repayment; the account reference is conventionally a national ID.
    Repayment { account_ref: Option<String> },
    Registration { customer_id: Option<String> },
    Processing { loan_id: String },
}

impl PaymentIntent {
    /// Classifies a billref. Never fails: anything unrecognised is a repayment.
    pub fn classify(billref: Option<&str>) -> Self {
        let reference = billref.map(str::trim).unwrap_or_default();
        if reference.is_empty() {
            return PaymentIntent::Repayment { account_ref: None };
        }
        if reference == REGISTRATION_FEE {
            return PaymentIntent::Registration { customer_id: None };
        }
        if let Some(customer_id) = reference.strip_prefix(REGISTRATION_PREFIX) {
            let customer_id = customer_id.trim();
            return PaymentIntent::Registration {
                customer_id: (!customer_id.is_empty()).then(|| customer_id.to_string()),
            };
        }
        if let Some(loan_id) = reference.strip_prefix(PROCESSING_PREFIX)
            && !loan_id.trim().is_empty()
        {
            return PaymentIntent::Processing {
                loan_id: loan_id.trim().to_string(),
            };
        }
        PaymentIntent::Repayment {
            account_ref: Some(reference.to_string()),
        }
    }

    /// National ID to match on, if this is a repayment with a reference.
    pub fn account_ref(&self) -> Option<&str> {
        match self {
            PaymentIntent::Repayment { account_ref } => account_ref.as_deref(),
            _ => None,
        }
    }

    /// Customer id embedded in the billref, if any.
    pub fn customer_id(&self) -> Option<&str> {
        match self {
            PaymentIntent::Registration { customer_id } => customer_id.as_deref(),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaymentIntent::Repayment { .. } => "repayment",
            PaymentIntent::Registration { .. } => "registration",
            PaymentIntent::Processing { .. } => "processing",
        }
    }
}
