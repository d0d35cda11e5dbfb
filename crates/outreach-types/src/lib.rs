//! Shared types, errors, and state machines for the Outreach engine.
//!
//! This crate provides the foundational types used across all other Outreach crates:
//! - `OutreachError`: unified error taxonomy
//! - `Campaign`, `Job`, `Lead`, `Draft`, `RunEvent`, `GlobalSettings`: persisted entities
//! - `JobStatus`, `DraftStatus`, `PipelineStep`: lifecycle state machines
//! - request/response records validated at the service boundary

pub mod model;
pub mod requests;
pub mod status;

pub use model::{
    Campaign, Draft, GlobalSettings, Geo, Job, Lead, RunEvent, DEFAULT_LEGAL_ADDRESS,
    DEFAULT_UNSUBSCRIBE_TEXT,
};
pub use requests::{
    CreateCampaignRequest, CreateJobRequest, JobView, ReviewDraftRequest, WebhookAck,
    WebhookBatch, WebhookEvent,
};
pub use status::{DraftStatus, JobStatus, PipelineStep};

/// Unified error type for all Outreach subsystems.
#[derive(Debug, thiserror::Error)]
pub enum OutreachError {
    // === Store Errors ===
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} '{id}' already exists")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    // === State Machine Errors ===
    #[error("Invalid {entity} transition for '{id}': {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        from: String,
        to: String,
    },

    // === Policy Errors ===
    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Policy denied: {0}")]
    PolicyDenied(String),

    // === Collaborator Errors ===
    #[error("Tool '{tool}' is not configured: {message}")]
    Unconfigured { tool: String, message: String },

    // === Run Control ===
    #[error("Job '{0}' already has an active run")]
    JobBusy(String),

    #[error("Job '{0}' was cancelled")]
    Cancelled(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl OutreachError {
    /// Returns `true` for errors scoped to a single lead or draft. These block
    /// the item but must not abort the surrounding job run.
    pub fn is_item_scoped(&self) -> bool {
        matches!(
            self,
            OutreachError::ValidationError(_)
                | OutreachError::PolicyDenied(_)
                | OutreachError::NotFound { .. }
        )
    }

    /// Collapse `Unconfigured` into `BackendUnavailable` for callers that have
    /// no fallback for the missing collaborator.
    pub fn without_fallback(self) -> Self {
        match self {
            OutreachError::Unconfigured { tool, message } => {
                OutreachError::BackendUnavailable(format!("{tool}: {message}"))
            }
            other => other,
        }
    }

    /// Maps the error to an HTTP status code for a server boundary.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            OutreachError::NotFound { .. } => Some(404),
            OutreachError::AlreadyExists { .. }
            | OutreachError::InvalidTransition { .. }
            | OutreachError::JobBusy(_) => Some(409),
            OutreachError::ValidationError(_) => Some(400),
            OutreachError::PolicyDenied(_) => Some(403),
            OutreachError::BackendUnavailable(_) | OutreachError::Unconfigured { .. } => {
                Some(503)
            }
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, OutreachError>`.
pub type Result<T> = std::result::Result<T, OutreachError>;

/// Generate a prefixed unique identifier, e.g. `job_5f0c...`.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}
