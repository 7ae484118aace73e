use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Repayment,
    Registration,
    Processing,
    DisbursementResult,
    Sms,
}

impl JobType {
    /// Types the drainer knows how to handle.
    pub const ACCEPTED: [JobType; 5] = [
        JobType::Repayment,
        JobType::Registration,
        JobType::Processing,
        JobType::DisbursementResult,
        JobType::Sms,
    ];
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Processing,
    Completed,
    Dead,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct QueueJob {
    pub id: u64,
    pub job_type: JobType,
    pub tenant_id: Option<String>,
    pub payload: Value,
    #[serde(default)]
    pub status: JobStatus,
    /// Incremented by every successful claim.
    #[serde(default)]
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(default)]
    pub claimed_by: Option<String>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueJob {
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Queued && self.scheduled_at <= now
    }

    /// Required string field from the payload.
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload
            .get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// A job as submitted by a producer, before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub job_type: JobType,
    pub tenant_id: Option<String>,
    pub payload: Value,
    pub max_attempts: u32,
}

impl NewJob {
    pub fn for_transaction(
        job_type: JobType,
        tenant_id: Option<String>,
        transaction_id: &str,
        max_attempts: u32,
    ) -> Self {
        Self {
            job_type,
            tenant_id,
            payload: serde_json::json!({ "transaction_id": transaction_id }),
            max_attempts,
        }
    }
}
