use crate::domain::ports::SmsGateway;
use crate::domain::sms::SmsProviderConfig;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Bulk SMS provider reached with a single GET per message.
///
/// The provider's endpoint and credentials come from the tenant's
/// `SmsProviderConfig`; this type only owns the HTTP client.
#[derive(Clone)]
pub struct HttpSmsGateway {
    client: Client,
}

impl HttpSmsGateway {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SmsGateway for HttpSmsGateway {
    async fn send(&self, config: &SmsProviderConfig, recipient: &str, message: &str) -> Result<()> {
        let response = self
            .client
            .get(&config.endpoint)
            .query(&[
                ("apikey", config.api_key.as_str()),
                ("partnerID", config.partner_id.as_str()),
                ("shortcode", config.sender_id.as_str()),
                ("mobile", recipient),
                ("message", message),
            ])
            .send()
            .await?;
        let status = response.status();
        response.error_for_status()?;
        debug!(tenant_id = %config.tenant_id, recipient, %status, "SMS provider accepted message");
        Ok(())
    }
}
