//! Request and response records for the service boundary.
//!
//! Payloads are validated here, before anything reaches the engine.

use serde::{Deserialize, Serialize};

use crate::model::{Campaign, Geo, Job};
use crate::{new_id, OutreachError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignRequest {
    pub name: String,
    #[serde(default)]
    pub preset: Option<String>,
    pub industry: String,
    #[serde(default)]
    pub geo: Geo,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub send_cap_per_run: Option<u32>,
    #[serde(default)]
    pub daily_send_cap: Option<u32>,
}

impl CreateCampaignRequest {
    /// Validate the payload and build a campaign with a fresh id.
    pub fn into_campaign(self) -> Result<Campaign> {
        if self.name.trim().is_empty() {
            return Err(OutreachError::ValidationError(
                "campaign name must not be empty".into(),
            ));
        }
        let keywords: Vec<String> = self
            .keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        let mut campaign = Campaign::new(
            new_id("camp"),
            self.name.trim(),
            self.industry.trim(),
            self.geo,
            keywords,
        );
        if let Some(preset) = self.preset.filter(|p| !p.trim().is_empty()) {
            campaign.preset = preset;
        }
        if let Some(model) = self.model.filter(|m| !m.trim().is_empty()) {
            campaign.model = model;
        }
        if let Some(cap) = self.send_cap_per_run {
            campaign.send_cap_per_run = cap;
        }
        if let Some(cap) = self.daily_send_cap {
            campaign.daily_send_cap = cap;
        }
        campaign.validate()?;
        Ok(campaign)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub campaign_id: String,
    pub planned_count: i64,
}

impl CreateJobRequest {
    /// Validate the payload and build a queued job with a fresh id.
    pub fn into_job(self) -> Result<Job> {
        if self.campaign_id.trim().is_empty() {
            return Err(OutreachError::ValidationError(
                "campaignId must not be empty".into(),
            ));
        }
        let planned = u32::try_from(self.planned_count).map_err(|_| {
            OutreachError::ValidationError(format!(
                "plannedCount must be a non-negative 32-bit integer, got {}",
                self.planned_count
            ))
        })?;
        Ok(Job::queued(new_id("job"), self.campaign_id.trim(), planned))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDraftRequest {
    #[serde(default = "default_reviewer")]
    pub reviewer: String,
}

fn default_reviewer() -> String {
    "system".to_string()
}

impl Default for ReviewDraftRequest {
    fn default() -> Self {
        Self {
            reviewer: default_reviewer(),
        }
    }
}

/// A job as seen from the outside, with the last failure text if it failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    #[serde(flatten)]
    pub job: Job,
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Delivery webhook
// ---------------------------------------------------------------------------

/// One delivery-provider event (SendGrid event webhook shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, rename = "sg_message_id")]
    pub message_id: Option<String>,
}

/// Inbound batch of delivery events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookBatch {
    pub events: Vec<WebhookEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign_request() -> CreateCampaignRequest {
        CreateCampaignRequest {
            name: "Avicenna".into(),
            preset: Some("acupuncture".into()),
            industry: "Acupuncture".into(),
            geo: Geo::new("Potomac", "MD"),
            keywords: vec![" wellness ".into(), "".into()],
            model: None,
            send_cap_per_run: Some(10),
            daily_send_cap: None,
        }
    }

    #[test]
    fn campaign_request_builds_campaign() {
        let c = campaign_request().into_campaign().unwrap();
        assert!(c.campaign_id.starts_with("camp_"));
        assert_eq!(c.preset, "acupuncture");
        assert_eq!(c.keywords, vec!["wellness".to_string()]);
        assert_eq!(c.send_cap_per_run, 10);
        assert_eq!(c.daily_send_cap, 200);
    }

    #[test]
    fn campaign_request_rejects_caps_out_of_order() {
        let mut req = campaign_request();
        req.send_cap_per_run = Some(50);
        req.daily_send_cap = Some(10);
        assert!(matches!(
            req.into_campaign(),
            Err(OutreachError::ValidationError(_))
        ));
    }

    #[test]
    fn job_request_rejects_negative_count() {
        let req = CreateJobRequest {
            campaign_id: "camp_1".into(),
            planned_count: -1,
        };
        assert!(matches!(
            req.into_job(),
            Err(OutreachError::ValidationError(_))
        ));
    }

    #[test]
    fn job_request_parses_camel_case() {
        let req: CreateJobRequest =
            serde_json::from_str(r#"{"campaignId":"camp_1","plannedCount":5}"#).unwrap();
        let job = req.into_job().unwrap();
        assert_eq!(job.planned_count, 5);
        assert_eq!(job.campaign_id, "camp_1");
    }

    #[test]
    fn review_request_defaults_reviewer() {
        let req: ReviewDraftRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.reviewer, "system");
    }

    #[test]
    fn webhook_batch_parses_sendgrid_events() {
        let batch: WebhookBatch = serde_json::from_str(
            r#"{"events":[{"event":"bounce","email":"a@b.com","sg_message_id":"m1"},{"event":"open"}]}"#,
        )
        .unwrap();
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.events[0].message_id.as_deref(), Some("m1"));
    }
}
