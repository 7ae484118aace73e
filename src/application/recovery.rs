use crate::domain::ports::LedgerStoreRef;
use crate::error::Result;
use tracing::{debug, info};

/// Requeues jobs whose worker never finished them.
#[derive(Clone)]
pub struct StuckJobRecovery {
    store: LedgerStoreRef,
    timeout: chrono::Duration,
}

impl StuckJobRecovery {
    pub fn new(store: LedgerStoreRef, timeout: chrono::Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn recover(&self) -> Result<u64> {
        let recovered = self.store.recover_stuck_queue_jobs(self.timeout).await?;
        if recovered > 0 {
            info!(recovered, timeout_secs = self.timeout.num_seconds(), "Stuck jobs requeued");
        } else {
            debug!("No stuck jobs");
        }
        Ok(recovered)
    }
}
