//! Drafting collaborators.

use std::sync::Arc;

use async_trait::async_trait;

use outreach_types::{Campaign, Lead, Result};

use crate::{templates, DraftedEmail, Drafter};

pub const TEMPLATE_MODEL: &str = "fallback_template";

/// Picks the industry template; free of cost and never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateDrafter;

impl TemplateDrafter {
    pub fn compose(&self, lead: &Lead, campaign: &Campaign, from_name: &str) -> DraftedEmail {
        let contact = if lead.contact_name.trim().is_empty() {
            "there"
        } else {
            lead.contact_name.trim()
        };
        let company = if lead.company.trim().is_empty() {
            "your company"
        } else {
            lead.company.trim()
        };
        let industry = campaign.industry.trim();

        let (subject, body) = if industry.eq_ignore_ascii_case("acupuncture") {
            templates::acupuncture(contact, company, from_name)
        } else {
            templates::generic_b2b(contact, company, industry, from_name)
        };
        DraftedEmail {
            subject,
            body,
            model: TEMPLATE_MODEL.to_string(),
            cost_usd: 0.0,
        }
    }
}

#[async_trait]
impl Drafter for TemplateDrafter {
    async fn draft_email(
        &self,
        lead: &Lead,
        campaign: &Campaign,
        from_name: &str,
    ) -> Result<DraftedEmail> {
        Ok(self.compose(lead, campaign, from_name))
    }
}

/// Wraps a primary drafter and substitutes the template on any failure or
/// empty result.
pub struct FallbackDrafter {
    primary: Arc<dyn Drafter>,
    fallback: TemplateDrafter,
}

impl FallbackDrafter {
    pub fn new(primary: Arc<dyn Drafter>) -> Self {
        Self {
            primary,
            fallback: TemplateDrafter,
        }
    }
}

#[async_trait]
impl Drafter for FallbackDrafter {
    async fn draft_email(
        &self,
        lead: &Lead,
        campaign: &Campaign,
        from_name: &str,
    ) -> Result<DraftedEmail> {
        match self.primary.draft_email(lead, campaign, from_name).await {
            Ok(drafted) if !drafted.body.trim().is_empty() => Ok(drafted),
            Ok(_) => {
                tracing::warn!(lead_id = %lead.lead_id, "Primary drafter returned an empty body, using template");
                Ok(self.fallback.compose(lead, campaign, from_name))
            }
            Err(e) => {
                tracing::warn!(lead_id = %lead.lead_id, error = %e, "Primary drafter failed, using template");
                Ok(self.fallback.compose(lead, campaign, from_name))
            }
        }
    }
}
