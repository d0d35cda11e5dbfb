//! Persistence abstraction for the Outreach engine.
//!
//! The engine only ever talks to [`Store`]; callers hold an `Arc<dyn Store>`
//! handle and never mutate a cached entity in place. Two backends are
//! provided: [`MemoryStore`] for tests and dry runs, and [`SqliteStore`] for
//! durable local storage.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use outreach_types::{
    Campaign, Draft, DraftStatus, GlobalSettings, Job, JobStatus, Lead, OutreachError,
    PipelineStep, Result, RunEvent,
};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Async CRUD over every entity type.
///
/// `create_*` fails with [`OutreachError::AlreadyExists`] when the id is
/// taken; `get_*` returns `Ok(None)` when absent. Status updates are partial
/// and validated against the entity's state machine. Every method fails with
/// [`OutreachError::BackendUnavailable`] when the backend cannot be reached.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_campaign(&self, campaign: &Campaign) -> Result<()>;
    async fn get_campaign(&self, campaign_id: &str) -> Result<Option<Campaign>>;

    async fn create_job(&self, job: &Job) -> Result<()>;
    async fn get_job(&self, job_id: &str) -> Result<Option<Job>>;
    async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<Job>>;
    /// Set a new status plus optional counters, stamping `updated_at`.
    async fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        sent_count: Option<u32>,
        cost_usd: Option<f64>,
    ) -> Result<()>;
    /// Persist the pipeline cursor of a job.
    async fn update_job_step(&self, job_id: &str, step: PipelineStep) -> Result<()>;

    async fn create_lead(&self, lead: &Lead) -> Result<()>;
    async fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>>;
    async fn list_leads_by_job(&self, job_id: &str) -> Result<Vec<Lead>>;

    async fn create_draft(&self, draft: &Draft) -> Result<()>;
    async fn get_draft(&self, draft_id: &str) -> Result<Option<Draft>>;
    /// Drafts of a job in creation order, optionally filtered by status.
    async fn list_drafts_by_job(
        &self,
        job_id: &str,
        status: Option<DraftStatus>,
    ) -> Result<Vec<Draft>>;
    async fn update_draft_status(
        &self,
        draft_id: &str,
        status: DraftStatus,
        reviewer: Option<&str>,
        message_id: Option<&str>,
    ) -> Result<()>;

    /// Append an immutable run event.
    async fn log_run_event(&self, event: &RunEvent) -> Result<()>;
    /// Events of a job in insertion order.
    async fn list_run_events(&self, job_id: &str) -> Result<Vec<RunEvent>>;

    /// Existing settings, or freshly persisted defaults on first access.
    async fn get_global_settings(&self) -> Result<GlobalSettings>;
}

pub(crate) fn job_transition_error(job_id: &str, from: JobStatus, to: JobStatus) -> OutreachError {
    OutreachError::InvalidTransition {
        entity: "job",
        id: job_id.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    }
}

pub(crate) fn draft_transition_error(
    draft_id: &str,
    from: DraftStatus,
    to: DraftStatus,
) -> OutreachError {
    OutreachError::InvalidTransition {
        entity: "draft",
        id: draft_id.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    }
}

pub(crate) fn not_found(entity: &'static str, id: &str) -> OutreachError {
    OutreachError::NotFound {
        entity,
        id: id.to_string(),
    }
}

pub(crate) fn already_exists(entity: &'static str, id: &str) -> OutreachError {
    OutreachError::AlreadyExists {
        entity,
        id: id.to_string(),
    }
}
