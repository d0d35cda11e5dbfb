//! Service facade: the boundary an HTTP layer or the CLI talks to.

use std::sync::Arc;

use tokio::sync::broadcast;

use outreach_store::Store;
use outreach_tools::Toolbox;
use outreach_types::{
    Campaign, CreateCampaignRequest, CreateJobRequest, Draft, DraftStatus, Job, JobStatus,
    JobView, OutreachError, Result, ReviewDraftRequest, WebhookAck, WebhookBatch,
};

use crate::config::RunnerConfig;
use crate::dispatch::{DispatchReport, DraftDispatcher, SendOutcome};
use crate::events::{EventEmitter, PipelineEvent};
use crate::guardrails::{Guardrails, SendCapStatus};
use crate::orchestrator::{JobRunner, RunSummary};
use crate::supervisor::{JobSupervisor, RunHandle};
use crate::webhook::handle_delivery_webhook;

/// RunEvents whose `error` field explains a failed job.
const FAILURE_EVENTS: &[&str] = &["job_failed", "job_orphaned"];

pub struct OutreachService {
    store: Arc<dyn Store>,
    supervisor: JobSupervisor,
    dispatcher: DraftDispatcher,
    events: EventEmitter,
}

impl OutreachService {
    pub fn new(store: Arc<dyn Store>, tools: Toolbox, config: RunnerConfig) -> Self {
        let events = EventEmitter::default();
        let dispatcher =
            DraftDispatcher::new(Arc::clone(&store), Arc::clone(&tools.delivery), events.clone());
        let runner = JobRunner::new(Arc::clone(&store), tools, events.clone(), config);
        Self {
            store,
            supervisor: JobSupervisor::new(Arc::new(runner)),
            dispatcher,
            events,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn supervisor(&self) -> &JobSupervisor {
        &self.supervisor
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    fn from_name(&self) -> &str {
        &self.supervisor.runner().config().from_name
    }

    // ---- campaigns ----

    pub async fn create_campaign(&self, request: CreateCampaignRequest) -> Result<Campaign> {
        let campaign = request.into_campaign()?;
        self.store.create_campaign(&campaign).await?;
        tracing::info!(campaign_id = %campaign.campaign_id, name = %campaign.name, "Campaign created");
        Ok(campaign)
    }

    pub async fn get_campaign(&self, campaign_id: &str) -> Result<Campaign> {
        self.store
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| OutreachError::NotFound {
                entity: "campaign",
                id: campaign_id.to_string(),
            })
    }

    // ---- jobs ----

    /// Persist a queued job and launch it in the background.
    pub async fn create_job(&self, request: CreateJobRequest) -> Result<Job> {
        let (job, _handle) = self.submit_job(request).await?;
        Ok(job)
    }

    /// Like [`create_job`](Self::create_job), returning the run handle.
    pub async fn submit_job(&self, request: CreateJobRequest) -> Result<(Job, RunHandle)> {
        let job = request.into_job()?;
        self.get_campaign(&job.campaign_id).await?;
        self.store.create_job(&job).await?;
        tracing::info!(job_id = %job.job_id, campaign_id = %job.campaign_id, planned = job.planned_count, "Job queued");
        let handle = self.supervisor.launch(&job.job_id)?;
        Ok((job, handle))
    }

    /// Create a job and wait for its run to end.
    pub async fn run_job(&self, request: CreateJobRequest) -> Result<RunSummary> {
        let (_, handle) = self.submit_job(request).await?;
        handle.wait().await
    }

    pub async fn job_view(&self, job_id: &str) -> Result<JobView> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| OutreachError::NotFound {
                entity: "job",
                id: job_id.to_string(),
            })?;
        let last_error = if job.status == JobStatus::Failed {
            self.store
                .list_run_events(job_id)
                .await?
                .iter()
                .rev()
                .find(|e| FAILURE_EVENTS.contains(&e.event.as_str()))
                .and_then(|e| e.error_text().map(str::to_string))
        } else {
            None
        };
        Ok(JobView { job, last_error })
    }

    pub fn cancel_job(&self, job_id: &str) -> bool {
        self.supervisor.cancel(job_id)
    }

    pub async fn recover_orphans(&self) -> Result<Vec<String>> {
        self.supervisor.recover_orphans().await
    }

    /// Headroom against the campaign caps, counting drafts actually sent.
    pub async fn send_cap_status(&self, job_id: &str) -> Result<SendCapStatus> {
        let view = self.job_view(job_id).await?;
        let campaign = self.get_campaign(&view.job.campaign_id).await?;
        let settings = self.store.get_global_settings().await?;
        let sent = self
            .store
            .list_drafts_by_job(job_id, Some(DraftStatus::Sent))
            .await?
            .len();
        let mut job = view.job;
        job.sent_count = u32::try_from(sent).unwrap_or(u32::MAX);
        Ok(Guardrails::new(&settings).send_cap_status(&job, &campaign))
    }

    // ---- drafts ----

    pub async fn list_drafts(&self, job_id: &str, status: Option<DraftStatus>) -> Result<Vec<Draft>> {
        self.store.list_drafts_by_job(job_id, status).await
    }

    pub async fn approve_draft(&self, draft_id: &str, request: ReviewDraftRequest) -> Result<Draft> {
        self.dispatcher.approve(draft_id, &request.reviewer).await
    }

    pub async fn reject_draft(&self, draft_id: &str, request: ReviewDraftRequest) -> Result<Draft> {
        self.dispatcher.reject(draft_id, &request.reviewer).await
    }

    pub async fn send_draft(&self, draft_id: &str) -> Result<SendOutcome> {
        self.dispatcher.send(draft_id, self.from_name()).await
    }

    pub async fn send_approved(&self, job_id: &str) -> Result<DispatchReport> {
        self.dispatcher.send_approved(job_id, self.from_name()).await
    }

    // ---- webhook ----

    pub async fn handle_webhook(&self, batch: &WebhookBatch) -> Result<WebhookAck> {
        handle_delivery_webhook(self.store.as_ref(), batch).await
    }
}
