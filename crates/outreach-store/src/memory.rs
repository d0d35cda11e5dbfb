//! In-memory [`Store`] backend.
//!
//! State lives behind a `tokio::sync::RwLock` owned by the store handle;
//! each lock is held for the duration of one call only. Cloning a
//! `MemoryStore` yields another handle to the same state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use outreach_types::{
    Campaign, Draft, DraftStatus, GlobalSettings, Job, JobStatus, Lead, OutreachError,
    PipelineStep, Result, RunEvent,
};

use crate::{already_exists, draft_transition_error, job_transition_error, not_found, Store};

#[derive(Default)]
struct Inner {
    campaigns: HashMap<String, Campaign>,
    jobs: HashMap<String, Job>,
    leads: HashMap<String, Lead>,
    lead_order: Vec<String>,
    drafts: HashMap<String, Draft>,
    draft_order: Vec<String>,
    events: Vec<RunEvent>,
    settings: Option<GlobalSettings>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the given settings instead of the lazily created defaults.
    pub fn with_settings(settings: GlobalSettings) -> Self {
        let store = Self::default();
        if let Ok(mut guard) = store.inner.try_write() {
            guard.settings = Some(settings);
        }
        store
    }

    /// Simulate a lost backend: every subsequent call fails with
    /// [`OutreachError::BackendUnavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(OutreachError::BackendUnavailable(
                "memory store marked unavailable".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_campaign(&self, campaign: &Campaign) -> Result<()> {
        self.ensure_available()?;
        let mut guard = self.inner.write().await;
        if guard.campaigns.contains_key(&campaign.campaign_id) {
            return Err(already_exists("campaign", &campaign.campaign_id));
        }
        guard
            .campaigns
            .insert(campaign.campaign_id.clone(), campaign.clone());
        Ok(())
    }

    async fn get_campaign(&self, campaign_id: &str) -> Result<Option<Campaign>> {
        self.ensure_available()?;
        Ok(self.inner.read().await.campaigns.get(campaign_id).cloned())
    }

    async fn create_job(&self, job: &Job) -> Result<()> {
        self.ensure_available()?;
        let mut guard = self.inner.write().await;
        if guard.jobs.contains_key(&job.job_id) {
            return Err(already_exists("job", &job.job_id));
        }
        guard.jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        self.ensure_available()?;
        Ok(self.inner.read().await.jobs.get(job_id).cloned())
    }

    async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        self.ensure_available()?;
        let guard = self.inner.read().await;
        let mut jobs: Vec<Job> = guard
            .jobs
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(jobs)
    }

    async fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        sent_count: Option<u32>,
        cost_usd: Option<f64>,
    ) -> Result<()> {
        self.ensure_available()?;
        let mut guard = self.inner.write().await;
        let job = guard
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| not_found("job", job_id))?;
        if !job.status.can_transition_to(status) {
            return Err(job_transition_error(job_id, job.status, status));
        }
        job.status = status;
        if let Some(sent) = sent_count {
            job.sent_count = sent;
        }
        if let Some(cost) = cost_usd {
            job.cost_usd = cost;
        }
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn update_job_step(&self, job_id: &str, step: PipelineStep) -> Result<()> {
        self.ensure_available()?;
        let mut guard = self.inner.write().await;
        let job = guard
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| not_found("job", job_id))?;
        job.current_step = step;
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn create_lead(&self, lead: &Lead) -> Result<()> {
        self.ensure_available()?;
        let mut guard = self.inner.write().await;
        if guard.leads.contains_key(&lead.lead_id) {
            return Err(already_exists("lead", &lead.lead_id));
        }
        guard.leads.insert(lead.lead_id.clone(), lead.clone());
        guard.lead_order.push(lead.lead_id.clone());
        Ok(())
    }

    async fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>> {
        self.ensure_available()?;
        Ok(self.inner.read().await.leads.get(lead_id).cloned())
    }

    async fn list_leads_by_job(&self, job_id: &str) -> Result<Vec<Lead>> {
        self.ensure_available()?;
        let guard = self.inner.read().await;
        Ok(guard
            .lead_order
            .iter()
            .filter_map(|id| guard.leads.get(id))
            .filter(|l| l.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn create_draft(&self, draft: &Draft) -> Result<()> {
        self.ensure_available()?;
        let mut guard = self.inner.write().await;
        if guard.drafts.contains_key(&draft.draft_id) {
            return Err(already_exists("draft", &draft.draft_id));
        }
        guard.drafts.insert(draft.draft_id.clone(), draft.clone());
        guard.draft_order.push(draft.draft_id.clone());
        Ok(())
    }

    async fn get_draft(&self, draft_id: &str) -> Result<Option<Draft>> {
        self.ensure_available()?;
        Ok(self.inner.read().await.drafts.get(draft_id).cloned())
    }

    async fn list_drafts_by_job(
        &self,
        job_id: &str,
        status: Option<DraftStatus>,
    ) -> Result<Vec<Draft>> {
        self.ensure_available()?;
        let guard = self.inner.read().await;
        Ok(guard
            .draft_order
            .iter()
            .filter_map(|id| guard.drafts.get(id))
            .filter(|d| d.job_id == job_id && status.map_or(true, |s| d.status == s))
            .cloned()
            .collect())
    }

    async fn update_draft_status(
        &self,
        draft_id: &str,
        status: DraftStatus,
        reviewer: Option<&str>,
        message_id: Option<&str>,
    ) -> Result<()> {
        self.ensure_available()?;
        let mut guard = self.inner.write().await;
        let draft = guard
            .drafts
            .get_mut(draft_id)
            .ok_or_else(|| not_found("draft", draft_id))?;
        if !draft.status.can_transition_to(status) {
            return Err(draft_transition_error(draft_id, draft.status, status));
        }
        draft.status = status;
        if let Some(reviewer) = reviewer {
            draft.reviewer = Some(reviewer.to_string());
        }
        if let Some(message_id) = message_id {
            draft.message_id = Some(message_id.to_string());
        }
        draft.updated_at = Utc::now();
        Ok(())
    }

    async fn log_run_event(&self, event: &RunEvent) -> Result<()> {
        self.ensure_available()?;
        self.inner.write().await.events.push(event.clone());
        Ok(())
    }

    async fn list_run_events(&self, job_id: &str) -> Result<Vec<RunEvent>> {
        self.ensure_available()?;
        Ok(self
            .inner
            .read()
            .await
            .events
            .iter()
            .filter(|e| e.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn get_global_settings(&self) -> Result<GlobalSettings> {
        self.ensure_available()?;
        let mut guard = self.inner.write().await;
        Ok(guard
            .settings
            .get_or_insert_with(GlobalSettings::default)
            .clone())
    }
}
