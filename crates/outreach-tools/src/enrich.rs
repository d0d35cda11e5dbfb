//! Heuristic lead enrichment from search result text.

use async_trait::async_trait;
use regex::Regex;
use url::Url;

use outreach_types::{Campaign, Result};

use crate::{LeadCandidate, LeadEnricher, SearchResult};

/// Consumer mailbox providers; addresses on these are a last resort.
const CONSUMER_DOMAINS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "aol.com",
];

const UNKNOWN_COMPANY: &str = "Unknown Company";
const DEFAULT_ROLE: &str = "Business Owner";

lazy_static::lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("valid regex");

    static ref CONTACT_RE: Regex = Regex::new(
        r"(?:[Cc]ontact|[Ee]mail|[Cc]all)(?:\s+(?:us|me))?\s*:?\s*([A-Z][a-z]+ [A-Z][a-z]+)",
    )
    .expect("valid regex");

    static ref NAME_LABEL_RE: Regex =
        Regex::new(r"Name:\s*([A-Z][a-z]+ [A-Z][a-z]+)").expect("valid regex");

    static ref COMPANY_RES: Vec<Regex> = [
        r"Welcome to\s+([^.!?]+)",
        r"About\s+([^.!?]+)",
        r"([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)\s+(?:Company|Corp|Inc|LLC)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect();

    static ref ROLE_RES: Vec<(&'static str, Regex)> = [
        ("Owner", r"\b(owner|proprietor|founder)\b"),
        ("Manager", r"\b(manager|director|supervisor)\b"),
        ("Doctor", r"\b(dr|doctor|physician)\b"),
        ("Therapist", r"\b(therapist|practitioner)\b"),
    ]
    .iter()
    .map(|(role, p)| (*role, Regex::new(p).expect("valid regex")))
    .collect();
}

/// Builds a [`LeadCandidate`] from the title, URL and snippet of a search
/// result. Confidence is 0.4 for a company, 0.4 for an email, 0.2 for a
/// contact name.
#[derive(Debug, Clone, Default)]
pub struct SnippetEnricher;

impl SnippetEnricher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LeadEnricher for SnippetEnricher {
    async fn enrich(&self, result: &SearchResult, campaign: &Campaign) -> Result<LeadCandidate> {
        let host = host_of(&result.url);
        let content = format!("{}. {}", result.title, result.snippet);

        let company = extract_company(&host, &content);
        let contact_name = extract_contact_name(&content);
        let email = pick_email(&content);
        // The mailbox domain is what delivery policy cares about.
        let domain = email
            .split_once('@')
            .map(|(_, d)| d.to_ascii_lowercase())
            .unwrap_or_else(|| host.clone());
        let (city, state) = extract_location(&content, campaign);
        let role = infer_role(&contact_name, &content);
        let confidence = confidence(&company, &email, &contact_name);

        tracing::debug!(url = %result.url, %company, %email, confidence, "Enriched search result");
        Ok(LeadCandidate {
            company,
            contact_name,
            role,
            email,
            domain,
            city,
            state,
            source_url: result.url.clone(),
            confidence,
        })
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_ascii_lowercase()))
        .unwrap_or_default()
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn extract_company(host: &str, content: &str) -> String {
    if !host.is_empty() && !CONSUMER_DOMAINS.contains(&host) {
        let stem = host
            .trim_end_matches(".com")
            .trim_end_matches(".org")
            .trim_end_matches(".net");
        let name = stem
            .split(|c: char| !c.is_ascii_alphabetic())
            .filter(|w| !w.is_empty())
            .map(title_case)
            .collect::<Vec<_>>()
            .join(" ");
        if name.len() > 3 {
            return name;
        }
    }

    let head: String = content.chars().take(1000).collect();
    COMPANY_RES
        .iter()
        .find_map(|re| re.captures(&head).map(|c| c[1].trim().to_string()))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| UNKNOWN_COMPANY.to_string())
}

fn extract_contact_name(content: &str) -> String {
    CONTACT_RE
        .captures(content)
        .or_else(|| NAME_LABEL_RE.captures(content))
        .map(|c| c[1].to_string())
        .unwrap_or_default()
}

/// First business address, else the first address of any kind.
fn pick_email(content: &str) -> String {
    let emails: Vec<&str> = EMAIL_RE.find_iter(content).map(|m| m.as_str()).collect();
    emails
        .iter()
        .find(|e| {
            e.split_once('@')
                .is_some_and(|(_, d)| !CONSUMER_DOMAINS.contains(&d.to_ascii_lowercase().as_str()))
        })
        .or_else(|| emails.first())
        .map(|e| e.to_string())
        .unwrap_or_default()
}

/// The campaign city when the text mentions it, else the campaign state.
fn extract_location(content: &str, campaign: &Campaign) -> (String, String) {
    let lower = content.to_lowercase();
    let state = campaign.geo.state.clone().unwrap_or_default();
    match campaign.geo.center_city.as_deref() {
        Some(city) if !city.is_empty() && lower.contains(&city.to_lowercase()) => {
            (city.to_string(), state)
        }
        _ => (String::new(), state),
    }
}

fn infer_role(contact_name: &str, content: &str) -> String {
    if contact_name.is_empty() {
        return DEFAULT_ROLE.to_string();
    }
    let lower = content.to_lowercase();
    ROLE_RES
        .iter()
        .find(|(_, re)| re.is_match(&lower))
        .map(|(role, _)| role.to_string())
        .unwrap_or_else(|| DEFAULT_ROLE.to_string())
}

fn confidence(company: &str, email: &str, contact: &str) -> f64 {
    let mut score = 0.0;
    if !company.is_empty() && company != UNKNOWN_COMPANY {
        score += 0.4;
    }
    if !email.is_empty() {
        score += 0.4;
    }
    if !contact.is_empty() {
        score += 0.2;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use outreach_types::Geo;

    fn campaign() -> Campaign {
        Campaign::new(
            "camp_1",
            "Avicenna",
            "Acupuncture",
            Geo::new("Potomac", "MD"),
            vec!["wellness".into()],
        )
    }

    fn result(url: &str, title: &str, snippet: &str) -> SearchResult {
        SearchResult {
            title: title.into(),
            url: url.into(),
            snippet: snippet.into(),
        }
    }

    #[tokio::test]
    async fn enriches_full_record() {
        let r = result(
            "https://www.harmonyhealing.com/about",
            "Harmony Healing",
            "Family clinic in Potomac. Contact: Jane Smith, owner. Email jane@harmonyhealing.com",
        );
        let lead = SnippetEnricher::new().enrich(&r, &campaign()).await.unwrap();
        assert_eq!(lead.company, "Harmonyhealing");
        assert_eq!(lead.contact_name, "Jane Smith");
        assert_eq!(lead.role, "Owner");
        assert_eq!(lead.email, "jane@harmonyhealing.com");
        assert_eq!(lead.domain, "harmonyhealing.com");
        assert_eq!(lead.city, "Potomac");
        assert_eq!(lead.state, "MD");
        assert!((lead.confidence - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn consumer_mailbox_sets_domain() {
        let r = result(
            "https://smallshop.net",
            "Small Shop",
            "Reach the owner at smallshop@yahoo.com",
        );
        let lead = SnippetEnricher::new().enrich(&r, &campaign()).await.unwrap();
        assert_eq!(lead.email, "smallshop@yahoo.com");
        assert_eq!(lead.domain, "yahoo.com");
    }

    #[tokio::test]
    async fn missing_email_falls_back_to_host() {
        let r = result("https://acme-widgets.com", "Acme", "We make widgets.");
        let lead = SnippetEnricher::new().enrich(&r, &campaign()).await.unwrap();
        assert_eq!(lead.company, "Acme Widgets");
        assert_eq!(lead.email, "");
        assert_eq!(lead.domain, "acme-widgets.com");
        assert_eq!(lead.role, "Business Owner");
        assert!((lead.confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn company_from_content_when_host_is_short() {
        assert_eq!(
            extract_company("ab.com", "Welcome to Blue Lotus Spa. We heal."),
            "Blue Lotus Spa"
        );
        assert_eq!(extract_company("", "nothing useful"), UNKNOWN_COMPANY);
    }

    #[test]
    fn prefers_business_email() {
        assert_eq!(
            pick_email("a@gmail.com or office@clinic.org"),
            "office@clinic.org"
        );
        assert_eq!(pick_email("only a@gmail.com"), "a@gmail.com");
        assert_eq!(pick_email("none here"), "");
    }
}
