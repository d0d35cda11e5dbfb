//! Send-cap and domain policy, lead validation.

use regex::Regex;
use serde::{Deserialize, Serialize};

use outreach_types::{Campaign, GlobalSettings, Job, Lead, OutreachError, Result};

/// Consumer mailbox providers that are never contacted.
pub const PERSONAL_DOMAINS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "aol.com",
];

pub const LOW_CONFIDENCE_THRESHOLD: f64 = 0.3;

lazy_static::lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid regex");
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Outcome of a policy gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum PolicyDecision {
    Allowed,
    Denied(String),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allowed)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            PolicyDecision::Allowed => None,
            PolicyDecision::Denied(reason) => Some(reason),
        }
    }

    /// `Denied` becomes [`OutreachError::PolicyDenied`].
    pub fn into_result(self) -> Result<()> {
        match self {
            PolicyDecision::Allowed => Ok(()),
            PolicyDecision::Denied(reason) => Err(OutreachError::PolicyDenied(reason)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeadValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Headroom of a job against its campaign caps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCapStatus {
    pub job_id: String,
    pub sent_count: u32,
    pub planned_count: u32,
    pub remaining_in_run: u32,
    pub remaining_daily: u32,
    pub send_cap_per_run: u32,
    pub daily_send_cap: u32,
    pub within_limits: bool,
}

/// Policy gates evaluated against one settings snapshot.
#[derive(Debug, Clone)]
pub struct Guardrails {
    block: Vec<String>,
    allow: Vec<String>,
}

impl Guardrails {
    pub fn new(settings: &GlobalSettings) -> Self {
        let normalize = |domains: &[String]| {
            domains
                .iter()
                .map(|d| d.trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect::<Vec<_>>()
        };
        Self {
            block: normalize(&settings.block_domains),
            allow: normalize(&settings.allow_domains),
        }
    }

    /// Deny when `sent + planned` exceeds the per-run cap, then the daily cap.
    /// The daily figure only counts this job's sends.
    pub fn check_send_limits(&self, job: &Job, campaign: &Campaign, planned: u32) -> PolicyDecision {
        let total = u64::from(job.sent_count) + u64::from(planned);
        if total > u64::from(campaign.send_cap_per_run) {
            return PolicyDecision::Denied(format!(
                "Per-run send cap exceeded: {total} > {}",
                campaign.send_cap_per_run
            ));
        }
        if total > u64::from(campaign.daily_send_cap) {
            return PolicyDecision::Denied(format!(
                "Daily send cap exceeded: {total} > {}",
                campaign.daily_send_cap
            ));
        }
        PolicyDecision::Allowed
    }

    /// Block list, then allow list (closed world when non-empty), then the
    /// built-in personal domains. A block always wins over an allow.
    pub fn check_domain_restrictions(&self, domain: &str) -> PolicyDecision {
        let normalized = domain.trim().to_ascii_lowercase();
        if self.block.iter().any(|d| *d == normalized) {
            return PolicyDecision::Denied(format!("Domain {domain} is in block list"));
        }
        if !self.allow.is_empty() && !self.allow.iter().any(|d| *d == normalized) {
            return PolicyDecision::Denied(format!("Domain {domain} not in allow list"));
        }
        if PERSONAL_DOMAINS.contains(&normalized.as_str()) {
            return PolicyDecision::Denied(format!("Domain {domain} is a personal email domain"));
        }
        PolicyDecision::Allowed
    }

    /// Errors block the lead from the send path; warnings are advisory.
    pub fn validate_lead_data(&self, lead: &Lead) -> LeadValidation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for (field, value) in [
            ("company", &lead.company),
            ("email", &lead.email),
            ("domain", &lead.domain),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("Missing required field: {field}"));
            }
        }

        let email = lead.email.trim();
        if !email.is_empty() && !is_valid_email(email) {
            errors.push(format!("Invalid email format: {email}"));
        }

        let domain = lead.domain.trim();
        if !domain.is_empty() {
            if let PolicyDecision::Denied(reason) = self.check_domain_restrictions(domain) {
                errors.push(reason);
            }
        }

        if lead.confidence < LOW_CONFIDENCE_THRESHOLD {
            warnings.push("Low confidence score for lead data".to_string());
        }
        let company = lead.company.trim();
        if !company.is_empty() && company.chars().count() < 2 {
            warnings.push("Company name seems too short".to_string());
        }

        LeadValidation {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn send_cap_status(&self, job: &Job, campaign: &Campaign) -> SendCapStatus {
        SendCapStatus {
            job_id: job.job_id.clone(),
            sent_count: job.sent_count,
            planned_count: job.planned_count,
            remaining_in_run: campaign.send_cap_per_run.saturating_sub(job.sent_count),
            remaining_daily: campaign.daily_send_cap.saturating_sub(job.sent_count),
            send_cap_per_run: campaign.send_cap_per_run,
            daily_send_cap: campaign.daily_send_cap,
            within_limits: job.sent_count < campaign.send_cap_per_run
                && job.sent_count < campaign.daily_send_cap,
        }
    }
}

impl Default for Guardrails {
    fn default() -> Self {
        Self::new(&GlobalSettings::default())
    }
}
