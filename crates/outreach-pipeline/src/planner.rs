//! Search-term synthesis and step sequencing.
//!
//! Everything here is pure. The step cursor itself lives on the persisted
//! [`Job`](outreach_types::Job) as `current_step`, so one run never depends on
//! in-memory planner state.

use outreach_types::{Campaign, JobStatus, PipelineStep};

pub const MAX_SEARCH_TERMS: usize = 10;

/// Join the non-empty parts with single spaces.
fn join_terms(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deterministic search terms for a campaign, at most [`MAX_SEARCH_TERMS`].
pub fn plan_search_terms(campaign: &Campaign) -> Vec<String> {
    let industry = campaign.industry.trim();
    let location = campaign.geo.location();
    let mut terms = Vec::new();

    for keyword in campaign.keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
        match location.as_deref() {
            Some(loc) => {
                terms.push(join_terms(&[keyword, loc]));
                terms.push(join_terms(&[industry, keyword, loc]));
            }
            None => terms.push(join_terms(&[industry, keyword])),
        }
    }

    if let Some(loc) = location.as_deref() {
        if !industry.is_empty() {
            terms.push(format!("{industry} services {loc}"));
            terms.push(format!("{industry} clinic {loc}"));
        }
    }

    terms.truncate(MAX_SEARCH_TERMS);
    terms
}

/// The step that follows `current`. Terminal jobs are always `done`.
pub fn get_next_step(current: PipelineStep, status: JobStatus) -> PipelineStep {
    if status.is_terminal() {
        return PipelineStep::Done;
    }
    current.next()
}

/// Whether another discovery batch is worth running.
pub fn should_continue(planned_count: u32, sent_count: u32, staged_leads: usize) -> bool {
    if sent_count >= planned_count {
        return false;
    }
    staged_leads < planned_count as usize
}
