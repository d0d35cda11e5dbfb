//! Outbound content compliance: disclosure injection and content checks,
//! plus recording of unsubscribe requests and complaints.

use serde::{Deserialize, Serialize};
use serde_json::json;

use outreach_store::Store;
use outreach_types::{
    new_id, GlobalSettings, Result, RunEvent, DEFAULT_LEGAL_ADDRESS, DEFAULT_UNSUBSCRIBE_TEXT,
};

pub const UNSUBSCRIBE_KEYWORDS: &[&str] = &["unsubscribe", "stop", "remove", "opt-out"];

pub const MISLEADING_SUBJECT_PHRASES: &[&str] = &[
    "urgent",
    "immediate action",
    "final notice",
    "you have won",
    "free money",
    "guaranteed",
    "100% free",
    "no cost",
    "prize",
    "winner",
];

pub const SPAM_PHRASES: &[&str] = &[
    "make money fast",
    "work from home",
    "get rich quick",
    "double your",
    "risk-free",
    "lose weight",
    "miracle",
    "once in a lifetime",
];

pub const MISLEADING_CLAIMS: &[&str] = &["guaranteed results", "no risk", "instant", "overnight"];

pub const MAX_SUBJECT_CHARS: usize = 150;

/// More than this many shouted words is an issue.
const MAX_ALL_CAPS_WORDS: usize = 3;

/// Event-log job id for records not tied to a job.
pub const SYSTEM_JOB_ID: &str = "system";
pub const COMPLIANCE_STEP: &str = "compliance";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub compliant: bool,
    pub modified_subject: String,
    pub modified_body: String,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Compliance {
    unsubscribe_text: String,
    legal_address: String,
}

impl Compliance {
    /// Empty values fall back to the defaults.
    pub fn new(unsubscribe_text: impl Into<String>, legal_address: impl Into<String>) -> Self {
        let or_default = |value: String, default: &str| {
            if value.trim().is_empty() {
                default.to_string()
            } else {
                value
            }
        };
        Self {
            unsubscribe_text: or_default(unsubscribe_text.into(), DEFAULT_UNSUBSCRIBE_TEXT),
            legal_address: or_default(legal_address.into(), DEFAULT_LEGAL_ADDRESS),
        }
    }

    pub fn from_settings(settings: &GlobalSettings) -> Self {
        Self::new(
            settings.unsubscribe_text.clone(),
            settings.legal_address.clone(),
        )
    }

    /// Add missing disclosures, then collect subject and body issues.
    /// Running this on its own output changes nothing.
    pub fn ensure_email_compliance(&self, subject: &str, body: &str) -> ComplianceReport {
        let mut body = body.to_string();
        if !self.has_unsubscribe(&body) {
            body = format!("{}\n\n{}", body.trim_end(), self.unsubscribe_text);
        }
        if !body.contains(&self.legal_address) {
            body = format!("{}\n{}", body.trim_end(), self.legal_address);
        }

        let mut issues = subject_issues(subject);
        issues.extend(body_issues(&body));

        ComplianceReport {
            compliant: issues.is_empty(),
            modified_subject: subject.to_string(),
            modified_body: body,
            issues,
        }
    }

    fn has_unsubscribe(&self, body: &str) -> bool {
        let lower = body.to_lowercase();
        lower.contains(&self.unsubscribe_text.to_lowercase())
            || UNSUBSCRIBE_KEYWORDS.iter().any(|k| lower.contains(k))
    }
}

impl Default for Compliance {
    fn default() -> Self {
        Self::new(DEFAULT_UNSUBSCRIBE_TEXT, DEFAULT_LEGAL_ADDRESS)
    }
}

fn subject_issues(subject: &str) -> Vec<String> {
    if subject.trim().is_empty() {
        return vec!["Subject line is empty".to_string()];
    }
    let lower = subject.to_lowercase();
    let mut issues: Vec<String> = MISLEADING_SUBJECT_PHRASES
        .iter()
        .filter(|p| lower.contains(*p))
        .map(|p| format!("Misleading subject phrase: '{p}'"))
        .collect();
    let len = subject.chars().count();
    if len > MAX_SUBJECT_CHARS {
        issues.push(format!(
            "Subject line too long: {len} > {MAX_SUBJECT_CHARS} characters"
        ));
    }
    issues
}

/// Uppercase with at least one cased letter, e.g. `FREE!` but not `---`.
fn is_shouted(word: &str) -> bool {
    word.chars().count() > 2
        && word.chars().any(char::is_uppercase)
        && !word.chars().any(char::is_lowercase)
}

fn body_issues(body: &str) -> Vec<String> {
    let lower = body.to_lowercase();
    let mut issues: Vec<String> = SPAM_PHRASES
        .iter()
        .filter(|p| lower.contains(*p))
        .map(|p| format!("Contains spammy phrase: '{p}'"))
        .collect();

    if body.split_whitespace().filter(|w| is_shouted(w)).count() > MAX_ALL_CAPS_WORDS {
        issues.push("Excessive use of capitalization".to_string());
    }

    issues.extend(
        MISLEADING_CLAIMS
            .iter()
            .filter(|c| lower.contains(*c))
            .map(|c| format!("Potentially misleading claim: '{c}'")),
    );
    issues
}

// ---------------------------------------------------------------------------
// Recipient feedback
// ---------------------------------------------------------------------------

/// Log an unsubscribe request as a system run event.
pub async fn record_unsubscribe(store: &dyn Store, email: &str, reason: &str) -> Result<()> {
    tracing::info!(email, reason, "Unsubscribe request received");
    let event = RunEvent::new(
        new_id("run"),
        SYSTEM_JOB_ID,
        COMPLIANCE_STEP,
        "unsubscribe_request",
        json!({ "email": email, "reason": reason }),
    );
    store.log_run_event(&event).await
}

/// Log a complaint (bounce, spam report, ...) for review.
pub async fn record_complaint(
    store: &dyn Store,
    email: &str,
    complaint_type: &str,
    details: &str,
) -> Result<()> {
    tracing::warn!(email, complaint_type, details, "Complaint received");
    let event = RunEvent::new(
        new_id("run"),
        SYSTEM_JOB_ID,
        COMPLIANCE_STEP,
        "complaint_received",
        json!({
            "email": email,
            "complaintType": complaint_type,
            "details": details,
            "actionTaken": "logged_for_review",
        }),
    );
    store.log_run_event(&event).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use outreach_store::MemoryStore;

    const BODY: &str = "Hello Jane,\n\nI came across Acme and was impressed.\n\nBest regards,\nNOFA BC\n";

    #[test]
    fn appends_disclosures_in_order() {
        let report = Compliance::default().ensure_email_compliance("Hello", BODY);
        let expected = format!(
            "Hello Jane,\n\nI came across Acme and was impressed.\n\nBest regards,\nNOFA BC\n\n{}\n{}",
            DEFAULT_UNSUBSCRIBE_TEXT, DEFAULT_LEGAL_ADDRESS
        );
        assert_eq!(report.modified_body, expected);
        assert!(report.compliant, "issues: {:?}", report.issues);
        assert_eq!(report.modified_body.matches(DEFAULT_UNSUBSCRIBE_TEXT).count(), 1);
        assert_eq!(report.modified_body.matches(DEFAULT_LEGAL_ADDRESS).count(), 1);
    }

    #[test]
    fn idempotent_on_own_output() {
        let c = Compliance::default();
        let once = c.ensure_email_compliance("WINNER of a prize", "MAKE money fast, instant");
        let twice = c.ensure_email_compliance(&once.modified_subject, &once.modified_body);
        assert_eq!(once.modified_body, twice.modified_body);
        assert_eq!(once.issues, twice.issues);
    }

    #[test]
    fn keyword_counts_as_unsubscribe_mechanism() {
        let report = Compliance::default()
            .ensure_email_compliance("Hi", "Reply STOP to opt out of future notes.");
        assert!(!report.modified_body.contains(DEFAULT_UNSUBSCRIBE_TEXT));
        assert!(report.modified_body.ends_with(DEFAULT_LEGAL_ADDRESS));
    }

    #[test]
    fn configured_texts_replace_defaults() {
        let c = Compliance::new("Reply 'no thanks' to opt-out.", "Acme Inc, 1 Main St");
        let report = c.ensure_email_compliance("Hi", "Body");
        assert_eq!(report.modified_body, "Body\n\nReply 'no thanks' to opt-out.\nAcme Inc, 1 Main St");

        let blank = Compliance::new("", "  ");
        let report = blank.ensure_email_compliance("Hi", "Body");
        assert!(report.modified_body.contains(DEFAULT_UNSUBSCRIBE_TEXT));
        assert!(report.modified_body.contains(DEFAULT_LEGAL_ADDRESS));
    }

    #[test]
    fn subject_checks() {
        let c = Compliance::default();
        let report = c.ensure_email_compliance("", "Body");
        assert_eq!(report.issues, vec!["Subject line is empty"]);
        assert!(!report.compliant);

        let report = c.ensure_email_compliance("URGENT: Final Notice", "Body");
        assert_eq!(
            report.issues,
            vec![
                "Misleading subject phrase: 'urgent'",
                "Misleading subject phrase: 'final notice'",
            ]
        );

        let long = "a".repeat(151);
        let report = c.ensure_email_compliance(&long, "Body");
        assert_eq!(report.issues, vec!["Subject line too long: 151 > 150 characters"]);
        assert!(c.ensure_email_compliance(&"a".repeat(150), "Body").compliant);
    }

    #[test]
    fn body_checks() {
        let c = Compliance::default();
        let report = c.ensure_email_compliance(
            "Hello",
            "This MIRACLE offer is BIG NEWS FOR ALL with no risk.",
        );
        assert_eq!(
            report.issues,
            vec![
                "Contains spammy phrase: 'miracle'",
                "Excessive use of capitalization",
                "Potentially misleading claim: 'no risk'",
            ]
        );
    }

    #[test]
    fn three_shouted_words_are_tolerated() {
        // The default legal address already contributes NOFA and LLC.
        let report = Compliance::default().ensure_email_compliance("Hello", "Greetings from NOFA.");
        assert!(report.compliant, "issues: {:?}", report.issues);
        assert!(!is_shouted("MD"));
        assert!(!is_shouted("---"));
        assert!(is_shouted("LLC,"));
    }

    #[tokio::test]
    async fn feedback_is_logged_under_system_job() {
        let store = MemoryStore::new();
        record_unsubscribe(&store, "a@acme.com", "not interested").await.unwrap();
        record_complaint(&store, "b@acme.com", "spamreport", "").await.unwrap();

        let events = store.list_run_events(SYSTEM_JOB_ID).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "unsubscribe_request");
        assert_eq!(events[0].step, COMPLIANCE_STEP);
        assert_eq!(events[1].event, "complaint_received");
        assert_eq!(events[1].data["complaintType"], "spamreport");
    }
}
