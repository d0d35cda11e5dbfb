//! Lifecycle state machines for jobs, drafts, and the pipeline cursor.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::OutreachError;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Status of a job run.
///
/// `queued -> running -> {done, failed}`. `paused` is only ever set from the
/// outside; the orchestrator never enters it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Paused,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Failed)
                | (Queued, Paused)
                | (Running, Done)
                | (Running, Failed)
                | (Running, Paused)
                | (Paused, Running)
                | (Paused, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = OutreachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "paused" => Ok(JobStatus::Paused),
            "done" => Ok(JobStatus::Done),
            "failed" => Ok(JobStatus::Failed),
            other => Err(OutreachError::ValidationError(format!(
                "unknown job status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// DraftStatus
// ---------------------------------------------------------------------------

/// Status of a drafted message: `draft -> {approved, rejected}`,
/// `approved -> {sent, failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Draft,
    Approved,
    Rejected,
    Sent,
    Failed,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Draft => "draft",
            DraftStatus::Approved => "approved",
            DraftStatus::Rejected => "rejected",
            DraftStatus::Sent => "sent",
            DraftStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DraftStatus::Rejected | DraftStatus::Sent | DraftStatus::Failed
        )
    }

    pub fn can_transition_to(&self, next: DraftStatus) -> bool {
        use DraftStatus::*;
        matches!(
            (self, next),
            (Draft, Approved) | (Draft, Rejected) | (Approved, Sent) | (Approved, Failed)
        )
    }
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DraftStatus {
    type Err = OutreachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(DraftStatus::Draft),
            "approved" => Ok(DraftStatus::Approved),
            "rejected" => Ok(DraftStatus::Rejected),
            "sent" => Ok(DraftStatus::Sent),
            "failed" => Ok(DraftStatus::Failed),
            other => Err(OutreachError::ValidationError(format!(
                "unknown draft status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineStep
// ---------------------------------------------------------------------------

/// The fixed, linear step sequence of a job. Persisted on the job as its
/// cursor so that no planner instance has to remember where a run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    PlanSearchTerms,
    WebSearch,
    EnrichLeads,
    DraftEmails,
    AwaitApproval,
    SendEmails,
    Done,
}

impl PipelineStep {
    pub const SEQUENCE: [PipelineStep; 7] = [
        PipelineStep::PlanSearchTerms,
        PipelineStep::WebSearch,
        PipelineStep::EnrichLeads,
        PipelineStep::DraftEmails,
        PipelineStep::AwaitApproval,
        PipelineStep::SendEmails,
        PipelineStep::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::PlanSearchTerms => "plan_search_terms",
            PipelineStep::WebSearch => "web_search",
            PipelineStep::EnrichLeads => "enrich_leads",
            PipelineStep::DraftEmails => "draft_emails",
            PipelineStep::AwaitApproval => "await_approval",
            PipelineStep::SendEmails => "send_emails",
            PipelineStep::Done => "done",
        }
    }

    /// The step after this one. `Done` is absorbing.
    pub fn next(&self) -> PipelineStep {
        let idx = Self::SEQUENCE
            .iter()
            .position(|s| s == self)
            .unwrap_or(Self::SEQUENCE.len() - 1);
        Self::SEQUENCE
            .get(idx + 1)
            .copied()
            .unwrap_or(PipelineStep::Done)
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStep {
    type Err = OutreachError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PipelineStep::SEQUENCE
            .iter()
            .find(|step| step.as_str() == s)
            .copied()
            .ok_or_else(|| OutreachError::ValidationError(format!("unknown pipeline step '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_terminal_states_accept_nothing() {
        let all = [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Paused,
            JobStatus::Done,
            JobStatus::Failed,
        ];
        for terminal in [JobStatus::Done, JobStatus::Failed] {
            for next in all {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} -> {next} must be rejected"
                );
            }
        }
    }

    #[test]
    fn job_happy_path_transitions() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Done));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Done));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Queued));
    }

    #[test]
    fn draft_cannot_skip_approval() {
        assert!(!DraftStatus::Draft.can_transition_to(DraftStatus::Sent));
        assert!(DraftStatus::Draft.can_transition_to(DraftStatus::Approved));
        assert!(DraftStatus::Approved.can_transition_to(DraftStatus::Sent));
        assert!(DraftStatus::Approved.can_transition_to(DraftStatus::Failed));
        assert!(!DraftStatus::Rejected.can_transition_to(DraftStatus::Approved));
        assert!(!DraftStatus::Sent.can_transition_to(DraftStatus::Failed));
    }

    #[test]
    fn statuses_serialize_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(
            serde_json::to_string(&DraftStatus::Approved).unwrap(),
            "\"approved\""
        );
        assert_eq!(
            serde_json::to_string(&PipelineStep::PlanSearchTerms).unwrap(),
            "\"plan_search_terms\""
        );
    }

    #[test]
    fn status_strings_parse_back() {
        for status in [JobStatus::Queued, JobStatus::Paused, JobStatus::Failed] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert_eq!("sent".parse::<DraftStatus>().unwrap(), DraftStatus::Sent);
        assert!("shipped".parse::<DraftStatus>().is_err());
    }

    #[test]
    fn pipeline_steps_advance_linearly() {
        let mut step = PipelineStep::PlanSearchTerms;
        let mut seen = vec![step];
        while step != PipelineStep::Done {
            step = step.next();
            seen.push(step);
        }
        assert_eq!(seen, PipelineStep::SEQUENCE.to_vec());
        assert_eq!(PipelineStep::Done.next(), PipelineStep::Done);
        assert_eq!(
            "enrich_leads".parse::<PipelineStep>().unwrap(),
            PipelineStep::EnrichLeads
        );
    }
}
