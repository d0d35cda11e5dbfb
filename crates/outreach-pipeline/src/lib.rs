//! Outreach campaign engine.
//!
//! - [`planner`]: search-term synthesis and step sequencing
//! - [`guardrails`]: send caps, domain policy, lead validation
//! - [`compliance`]: disclosures, content checks, recipient feedback
//! - [`orchestrator`]: the job run loop
//! - [`dispatch`]: draft review and the guarded send path
//! - [`supervisor`]: one cancellable task per job
//! - [`service`]: the facade used by the CLI and any server boundary

pub mod compliance;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod guardrails;
pub mod orchestrator;
pub mod planner;
pub mod service;
pub mod supervisor;
pub mod webhook;

pub use compliance::{Compliance, ComplianceReport};
pub use config::RunnerConfig;
pub use dispatch::{DispatchReport, DraftDispatcher, SendOutcome};
pub use events::{EventEmitter, PipelineEvent};
pub use guardrails::{Guardrails, LeadValidation, PolicyDecision, SendCapStatus};
pub use orchestrator::{JobRunner, RunSummary};
pub use planner::{get_next_step, plan_search_terms, should_continue};
pub use service::OutreachService;
pub use supervisor::{JobSupervisor, RunHandle};
pub use webhook::handle_delivery_webhook;
