//! Outbound email delivery.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use outreach_types::{OutreachError, Result};

use crate::{Delivery, DeliveryReceipt};

pub const DEFAULT_ALLOWED_SENDER: &str = "info@nofabusinessconsulting.com";
const SENDGRID_BASE_URL: &str = "https://api.sendgrid.com";

// ---------------------------------------------------------------------------
// SendGridDelivery
// ---------------------------------------------------------------------------

/// SendGrid v3 mail-send client. Without an API key every send fails with
/// [`OutreachError::Unconfigured`].
#[derive(Debug)]
pub struct SendGridDelivery {
    client: reqwest::Client,
    api_key: Option<String>,
    allowed_sender: String,
    base_url: String,
}

impl SendGridDelivery {
    pub fn new(api_key: Option<String>, allowed_sender: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            allowed_sender: allowed_sender.into(),
            base_url: SENDGRID_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() && !self.allowed_sender.trim().is_empty()
    }

    fn request_body(&self, to: &str, subject: &str, body: &str, from_name: &str) -> serde_json::Value {
        let mut from = json!({ "email": self.allowed_sender });
        if !from_name.is_empty() {
            from["name"] = json!(from_name);
        }
        json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": from,
            "subject": subject,
            "content": [{ "type": "text/plain", "value": body }],
        })
    }
}

#[async_trait]
impl Delivery for SendGridDelivery {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        from_name: &str,
    ) -> Result<DeliveryReceipt> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(OutreachError::Unconfigured {
                tool: "sendgrid".into(),
                message: "SENDGRID_API_KEY is not set".into(),
            });
        };
        if self.allowed_sender.trim().is_empty() {
            return Err(OutreachError::Unconfigured {
                tool: "sendgrid".into(),
                message: "no allowed sender address".into(),
            });
        }

        let url = format!("{}/v3/mail/send", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&self.request_body(to, subject, body, from_name))
            .send()
            .await
            .map_err(|e| OutreachError::BackendUnavailable(format!("sendgrid: {e}")))?;

        let status = resp.status();
        if status.as_u16() == 200 || status.as_u16() == 202 {
            let message_id = resp
                .headers()
                .get("X-Message-Id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            tracing::info!(to, message_id = ?message_id, "Email sent");
            Ok(DeliveryReceipt::delivered(message_id))
        } else {
            let detail = resp.text().await.unwrap_or_default();
            tracing::error!(to, status = %status, body = %detail, "SendGrid rejected message");
            Ok(DeliveryReceipt::rejected(format!(
                "SendGrid API error: {}",
                status.as_u16()
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingDelivery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub from_name: String,
    pub message_id: String,
}

/// Captures messages instead of sending them. Clones share one outbox.
#[derive(Debug, Clone, Default)]
pub struct RecordingDelivery {
    outbox: Arc<Mutex<Vec<SentMessage>>>,
    reject_with: Option<String>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    /// A delivery that reports every send as failed with `error`.
    pub fn rejecting(error: impl Into<String>) -> Self {
        Self {
            outbox: Arc::default(),
            reject_with: Some(error.into()),
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.outbox.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Delivery for RecordingDelivery {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        from_name: &str,
    ) -> Result<DeliveryReceipt> {
        if let Some(error) = &self.reject_with {
            return Ok(DeliveryReceipt::rejected(error.clone()));
        }
        let mut outbox = self
            .outbox
            .lock()
            .map_err(|_| OutreachError::Other("recording outbox poisoned".into()))?;
        let message_id = format!("rec_{}", outbox.len() + 1);
        outbox.push(SentMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            from_name: from_name.to_string(),
            message_id: message_id.clone(),
        });
        tracing::debug!(to, %message_id, "Recorded outbound email");
        Ok(DeliveryReceipt::delivered(Some(message_id)))
    }
}
