//! External collaborators of the Outreach engine.
//!
//! Every outside capability the pipeline touches (web search, robots policy,
//! lead enrichment, drafting, delivery) sits behind a narrow async trait.
//! Offline implementations make runs deterministic; HTTP implementations
//! (`HttpRobotsPolicy`, `SendGridDelivery`) talk to the real services.

pub mod delivery;
pub mod drafting;
pub mod enrich;
pub mod robots;
pub mod search;
pub mod templates;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use outreach_types::{Campaign, Lead, Result};

pub use delivery::{RecordingDelivery, SendGridDelivery, SentMessage};
pub use drafting::{FallbackDrafter, TemplateDrafter};
pub use enrich::SnippetEnricher;
pub use robots::{AllowAll, HttpRobotsPolicy, RobotsRules};
pub use search::OfflineSearch;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Enrichment output before it is bound to a job and persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadCandidate {
    pub company: String,
    pub contact_name: String,
    pub role: String,
    pub email: String,
    pub domain: String,
    pub city: String,
    pub state: String,
    pub source_url: String,
    pub confidence: f64,
}

impl LeadCandidate {
    pub fn into_lead(
        self,
        lead_id: impl Into<String>,
        job_id: impl Into<String>,
        campaign_id: impl Into<String>,
    ) -> Lead {
        Lead {
            lead_id: lead_id.into(),
            job_id: job_id.into(),
            campaign_id: campaign_id.into(),
            company: self.company,
            contact_name: self.contact_name,
            role: self.role,
            email: self.email,
            domain: self.domain,
            city: self.city,
            state: self.state,
            source_url: self.source_url,
            confidence: self.confidence.clamp(0.0, 1.0),
            enriched_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftedEmail {
    pub subject: String,
    pub body: String,
    /// Model or template that produced the draft.
    pub model: String,
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReceipt {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl DeliveryReceipt {
    pub fn delivered(message_id: Option<String>) -> Self {
        Self {
            success: true,
            message_id,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SearchTool: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>>;
}

/// Crawl permission check. Never fails: an unreadable policy allows.
#[async_trait]
pub trait RobotsPolicy: Send + Sync {
    async fn can_fetch(&self, url: &str) -> bool;
}

#[async_trait]
pub trait LeadEnricher: Send + Sync {
    async fn enrich(&self, result: &SearchResult, campaign: &Campaign) -> Result<LeadCandidate>;
}

#[async_trait]
pub trait Drafter: Send + Sync {
    async fn draft_email(
        &self,
        lead: &Lead,
        campaign: &Campaign,
        from_name: &str,
    ) -> Result<DraftedEmail>;
}

/// Outbound mail. Provider-side rejections come back as an unsuccessful
/// [`DeliveryReceipt`]; a missing configuration is
/// [`outreach_types::OutreachError::Unconfigured`].
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        from_name: &str,
    ) -> Result<DeliveryReceipt>;
}

// ---------------------------------------------------------------------------
// Toolbox
// ---------------------------------------------------------------------------

/// The set of collaborators a job run uses.
#[derive(Clone)]
pub struct Toolbox {
    pub search: Arc<dyn SearchTool>,
    pub robots: Arc<dyn RobotsPolicy>,
    pub enricher: Arc<dyn LeadEnricher>,
    pub drafter: Arc<dyn Drafter>,
    pub delivery: Arc<dyn Delivery>,
}

impl Toolbox {
    /// Deterministic, network-free collaborators.
    pub fn offline() -> Self {
        Self {
            search: Arc::new(OfflineSearch::new()),
            robots: Arc::new(AllowAll),
            enricher: Arc::new(SnippetEnricher::new()),
            drafter: Arc::new(TemplateDrafter),
            delivery: Arc::new(RecordingDelivery::new()),
        }
    }

    pub fn with_search(mut self, search: Arc<dyn SearchTool>) -> Self {
        self.search = search;
        self
    }

    pub fn with_robots(mut self, robots: Arc<dyn RobotsPolicy>) -> Self {
        self.robots = robots;
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn LeadEnricher>) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn with_drafter(mut self, drafter: Arc<dyn Drafter>) -> Self {
        self.drafter = drafter;
        self
    }

    pub fn with_delivery(mut self, delivery: Arc<dyn Delivery>) -> Self {
        self.delivery = delivery;
        self
    }
}

impl Default for Toolbox {
    fn default() -> Self {
        Self::offline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_into_lead_clamps_confidence() {
        let candidate = LeadCandidate {
            company: "Acme".into(),
            email: "hi@acme.com".into(),
            domain: "acme.com".into(),
            confidence: 1.4,
            ..Default::default()
        };
        let lead = candidate.into_lead("lead_1", "job_1", "camp_1");
        assert_eq!(lead.lead_id, "lead_1");
        assert_eq!(lead.job_id, "job_1");
        assert_eq!(lead.confidence, 1.0);
    }

    #[test]
    fn receipt_constructors() {
        let ok = DeliveryReceipt::delivered(Some("m1".into()));
        assert!(ok.success);
        assert!(ok.error.is_none());
        let bad = DeliveryReceipt::rejected("bounced");
        assert!(!bad.success);
        assert_eq!(bad.error.as_deref(), Some("bounced"));
    }

    #[tokio::test]
    async fn offline_toolbox_searches() {
        let tools = Toolbox::offline();
        let results = tools.search.search("acupuncture Potomac, MD", 5).await.unwrap();
        assert_eq!(results.len(), 5);
        assert!(tools.robots.can_fetch(&results[0].url).await);
    }
}
