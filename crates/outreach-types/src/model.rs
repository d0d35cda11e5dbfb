//! Persisted entities. Each one is a flat keyed record; cross-entity lookups
//! go through foreign id fields (`job_id`, `campaign_id`, `lead_id`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{DraftStatus, JobStatus, PipelineStep};
use crate::{OutreachError, Result};

pub const DEFAULT_UNSUBSCRIBE_TEXT: &str =
    "If you'd prefer not to hear from us again, reply with 'unsubscribe'.";
pub const DEFAULT_LEGAL_ADDRESS: &str = "NOFA Business Consulting, LLC --- Gaithersburg, MD";

// ---------------------------------------------------------------------------
// Campaign
// ---------------------------------------------------------------------------

/// Target geography of a campaign.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geo {
    #[serde(default)]
    pub center_city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

impl Geo {
    pub fn new(center_city: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            center_city: Some(center_city.into()),
            state: Some(state.into()),
        }
    }

    /// `"City, ST"` when both parts are known, `"ST"` with only a state,
    /// otherwise `None`.
    pub fn location(&self) -> Option<String> {
        let city = self.center_city.as_deref().map(str::trim).filter(|c| !c.is_empty());
        let state = self.state.as_deref().map(str::trim).filter(|s| !s.is_empty());
        match (city, state) {
            (Some(city), Some(state)) => Some(format!("{city}, {state}")),
            (_, Some(state)) => Some(state.to_string()),
            _ => None,
        }
    }
}

/// A named outreach configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub campaign_id: String,
    pub name: String,
    pub preset: String,
    pub industry: String,
    #[serde(default)]
    pub geo: Geo,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub model: String,
    pub send_cap_per_run: u32,
    pub daily_send_cap: u32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub const DEFAULT_MODEL: &'static str = "gpt-4o";
    pub const DEFAULT_SEND_CAP_PER_RUN: u32 = 20;
    pub const DEFAULT_DAILY_SEND_CAP: u32 = 200;

    pub fn new(
        campaign_id: impl Into<String>,
        name: impl Into<String>,
        industry: impl Into<String>,
        geo: Geo,
        keywords: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        let name = name.into();
        Self {
            campaign_id: campaign_id.into(),
            preset: name.clone(),
            name,
            industry: industry.into(),
            geo,
            keywords,
            model: Self::DEFAULT_MODEL.to_string(),
            send_cap_per_run: Self::DEFAULT_SEND_CAP_PER_RUN,
            daily_send_cap: Self::DEFAULT_DAILY_SEND_CAP,
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Check the campaign invariants.
    pub fn validate(&self) -> Result<()> {
        if self.campaign_id.trim().is_empty() {
            return Err(OutreachError::ValidationError(
                "campaign id must not be empty".into(),
            ));
        }
        if self.send_cap_per_run > self.daily_send_cap {
            return Err(OutreachError::ValidationError(format!(
                "sendCapPerRun ({}) exceeds dailySendCap ({})",
                self.send_cap_per_run, self.daily_send_cap
            )));
        }
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(OutreachError::ValidationError(
                "campaign needs at least one keyword for term planning".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One execution run against a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: String,
    pub campaign_id: String,
    pub planned_count: u32,
    pub sent_count: u32,
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
    pub status: JobStatus,
    pub current_step: PipelineStep,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A freshly queued job.
    pub fn queued(
        job_id: impl Into<String>,
        campaign_id: impl Into<String>,
        planned_count: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            campaign_id: campaign_id.into(),
            planned_count,
            sent_count: 0,
            cost_usd: 0.0,
            status: JobStatus::Queued,
            current_step: PipelineStep::PlanSearchTerms,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// A discovered and enriched contact candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub lead_id: String,
    pub job_id: String,
    pub campaign_id: String,
    pub company: String,
    pub contact_name: String,
    pub role: String,
    pub email: String,
    pub domain: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub source_url: String,
    pub confidence: f64,
    pub enriched_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Draft
// ---------------------------------------------------------------------------

/// A composed message awaiting review, approval, and send for one lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub draft_id: String,
    pub job_id: String,
    pub lead_id: String,
    pub subject: String,
    pub body: String,
    pub status: DraftStatus,
    #[serde(default)]
    pub reviewer: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Draft {
    pub fn new(
        draft_id: impl Into<String>,
        job_id: impl Into<String>,
        lead_id: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            draft_id: draft_id.into(),
            job_id: job_id.into(),
            lead_id: lead_id.into(),
            subject: subject.into(),
            body: body.into(),
            status: DraftStatus::Draft,
            reviewer: None,
            message_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// RunEvent
// ---------------------------------------------------------------------------

/// Immutable audit record of a pipeline occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    pub run_id: String,
    pub job_id: String,
    pub step: String,
    pub event: String,
    pub data: serde_json::Value,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
}

impl RunEvent {
    pub fn new(
        run_id: impl Into<String>,
        job_id: impl Into<String>,
        step: impl Into<String>,
        event: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            job_id: job_id.into(),
            step: step.into(),
            event: event.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    /// The `error` field of the payload, if this event carries one.
    pub fn error_text(&self) -> Option<&str> {
        self.data.get("error").and_then(|v| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// GlobalSettings
// ---------------------------------------------------------------------------

/// Singleton policy settings shared by every job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    #[serde(default)]
    pub allow_domains: Vec<String>,
    #[serde(default)]
    pub block_domains: Vec<String>,
    pub unsubscribe_text: String,
    pub legal_address: String,
    pub updated_at: DateTime<Utc>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            allow_domains: Vec::new(),
            block_domains: Vec::new(),
            unsubscribe_text: DEFAULT_UNSUBSCRIBE_TEXT.to_string(),
            legal_address: DEFAULT_LEGAL_ADDRESS.to_string(),
            updated_at: Utc::now(),
        }
    }
}
