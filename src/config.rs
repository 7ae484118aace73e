use std::time::Duration;

/// Tunables shared by every component of the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Identity recorded on every claim made by this process.
    pub worker_id: String,
    /// Delay before a failed job becomes claimable again.
    pub retry_backoff: Duration,
    /// Jobs left in `processing` longer than this are requeued.
    pub stuck_timeout: Duration,
    /// Upper bound on items handled by one scan or drain.
    pub default_batch_limit: usize,
    /// Retry budget given to jobs this engine enqueues.
    pub default_max_attempts: u32,
    /// Enqueue a payment SMS after each applied transaction.
    pub notify_on_apply: bool,
    /// Request timeout for the SMS provider.
    pub sms_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", uuid::Uuid::new_v4()),
            retry_backoff: Duration::from_secs(30),
            stuck_timeout: Duration::from_secs(5 * 60),
            default_batch_limit: 50,
            default_max_attempts: 3,
            notify_on_apply: true,
            sms_timeout: Duration::from_secs(10),
        }
    }
}

impl EngineConfig {
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    pub fn retry_backoff_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.retry_backoff).unwrap_or(chrono::Duration::seconds(30))
    }

    pub fn stuck_timeout_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.stuck_timeout).unwrap_or(chrono::Duration::minutes(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.worker_id.starts_with("worker-"));
        assert_eq!(config.retry_backoff_chrono(), chrono::Duration::seconds(30));
        assert_eq!(config.stuck_timeout_chrono(), chrono::Duration::minutes(5));
        assert_eq!(config.default_max_attempts, 3);
        assert_eq!(config.sms_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_worker_ids_are_unique() {
        assert_ne!(
            EngineConfig::default().worker_id,
            EngineConfig::default().worker_id
        );
    }
}
