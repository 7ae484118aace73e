use thiserror::Error;

/// Errors raised while reconciling payments.
///
/// Claim conflicts and insufficient funds are not represented here: a lost
/// claim is the `Skipped` outcome and a short payment is parked in the wallet.
#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Tenant unresolved: {0}")]
    TenantUnresolved(String),
    #[error("Customer unresolved: {0}")]
    CustomerUnresolved(String),
    #[error("{0}")]
    Handler(String),
    #[error("Configuration missing: {0}")]
    ConfigMissing(String),
    #[error("Malformed payload: {0}")]
    PayloadMalformed(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Store error: {0}")]
    Store(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ReconError {
    /// Permanent failures are dead-lettered without consuming retries.
    pub fn is_permanent(&self) -> bool {
        matches!(self, ReconError::PayloadMalformed(_))
    }
}

pub type Result<T> = std::result::Result<T, ReconError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_malformed_payloads_are_permanent() {
        assert!(ReconError::PayloadMalformed("transaction_id".into()).is_permanent());
        assert!(!ReconError::ConfigMissing("sms".into()).is_permanent());
        assert!(!ReconError::Handler("boom".into()).is_permanent());
    }
}
