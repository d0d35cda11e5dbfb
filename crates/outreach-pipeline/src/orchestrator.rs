//! Job run loop.
//!
//! Walks a job through `plan_search_terms → web_search → enrich_leads →
//! draft_emails → await_approval`. Search and enrichment repeat in rounds
//! until enough leads are staged or the search terms run out. The cursor is
//! persisted on the job before each step, every step boundary is logged as a
//! `RunEvent`, and the cancellation token is checked between steps. A
//! step-level failure marks the job `failed` without rolling back what was
//! already persisted.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use outreach_store::Store;
use outreach_tools::{SearchResult, Toolbox};
use outreach_types::{
    new_id, Campaign, Draft, Job, JobStatus, Lead, OutreachError, PipelineStep, Result, RunEvent,
};

use crate::config::RunnerConfig;
use crate::events::{EventEmitter, PipelineEvent};
use crate::guardrails::Guardrails;
use crate::planner::{get_next_step, plan_search_terms, should_continue};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Drives one job from `queued` to `done` or `failed`.
pub struct JobRunner {
    store: Arc<dyn Store>,
    tools: Toolbox,
    events: EventEmitter,
    config: RunnerConfig,
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub job_id: String,
    pub run_id: String,
    pub status: JobStatus,
    pub search_terms: Vec<String>,
    pub results_found: usize,
    pub leads_staged: usize,
    pub leads_skipped: usize,
    pub drafts_created: usize,
    #[serde(rename = "costUSD")]
    pub cost_usd: f64,
}

/// Working set of one run.
struct RunState {
    run_id: String,
    job: Job,
    campaign: Option<Campaign>,
    step: PipelineStep,
    terms: Vec<String>,
    /// Index of the next search term to try.
    next_term: usize,
    results: Vec<SearchResult>,
    /// Results before this index have been through enrichment.
    enriched: usize,
    seen_urls: HashSet<String>,
    seen_emails: HashSet<String>,
    leads: Vec<Lead>,
    skipped: usize,
    drafts: Vec<String>,
    cost_usd: f64,
}

impl RunState {
    fn campaign(&self) -> Result<&Campaign> {
        self.campaign.as_ref().ok_or_else(|| {
            OutreachError::Other(format!("campaign for job '{}' not loaded", self.job.job_id))
        })
    }

    fn wants_leads(&self, staged: usize) -> bool {
        should_continue(self.job.planned_count, self.job.sent_count, staged)
    }

    fn pending(&self) -> usize {
        self.results.len() - self.enriched
    }

    /// Another search round is due when leads are still short and terms remain.
    fn needs_another_round(&self) -> bool {
        self.wants_leads(self.leads.len()) && self.next_term < self.terms.len()
    }
}

// ---------------------------------------------------------------------------
// JobRunner
// ---------------------------------------------------------------------------

impl JobRunner {
    pub fn new(
        store: Arc<dyn Store>,
        tools: Toolbox,
        events: EventEmitter,
        config: RunnerConfig,
    ) -> Self {
        Self {
            store,
            tools,
            events,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run a queued job to completion.
    ///
    /// Fails without touching the job when it does not exist or is not
    /// `queued`. Once the job is `running`, any error marks it `failed` and is
    /// returned.
    pub async fn run(&self, job_id: &str, cancel: CancellationToken) -> Result<RunSummary> {
        let job = self.store.get_job(job_id).await?.ok_or_else(|| OutreachError::NotFound {
            entity: "job",
            id: job_id.to_string(),
        })?;
        if job.status != JobStatus::Queued {
            return Err(OutreachError::InvalidTransition {
                entity: "job",
                id: job_id.to_string(),
                from: job.status.to_string(),
                to: JobStatus::Running.to_string(),
            });
        }
        self.store
            .update_job_status(job_id, JobStatus::Running, None, None)
            .await?;

        let run_id = new_id("run");
        tracing::info!(job_id, run_id = %run_id, planned = job.planned_count, "Job started");
        self.events.emit(PipelineEvent::JobStarted {
            job_id: job_id.to_string(),
            run_id: run_id.clone(),
            planned_count: job.planned_count,
        });

        let started = Instant::now();
        let mut state = RunState {
            run_id,
            job,
            campaign: None,
            step: PipelineStep::PlanSearchTerms,
            terms: Vec::new(),
            next_term: 0,
            results: Vec::new(),
            enriched: 0,
            seen_urls: HashSet::new(),
            seen_emails: HashSet::new(),
            leads: Vec::new(),
            skipped: 0,
            drafts: Vec::new(),
            cost_usd: 0.0,
        };

        match self.execute(&mut state, &cancel).await {
            Ok(()) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                tracing::info!(
                    job_id,
                    drafts = state.drafts.len(),
                    cost_usd = state.cost_usd,
                    duration_ms,
                    "Job completed"
                );
                self.events.emit(PipelineEvent::JobCompleted {
                    job_id: job_id.to_string(),
                    drafts_created: state.drafts.len(),
                    cost_usd: state.cost_usd,
                    duration_ms,
                });
                Ok(RunSummary {
                    job_id: job_id.to_string(),
                    run_id: state.run_id,
                    status: JobStatus::Done,
                    search_terms: state.terms,
                    results_found: state.results.len(),
                    leads_staged: state.leads.len(),
                    leads_skipped: state.skipped,
                    drafts_created: state.drafts.len(),
                    cost_usd: state.cost_usd,
                })
            }
            Err(err) => {
                self.fail_job(&state, &err).await;
                Err(err)
            }
        }
    }

    async fn execute(&self, state: &mut RunState, cancel: &CancellationToken) -> Result<()> {
        let job_id = state.job.job_id.clone();
        let campaign = self
            .store
            .get_campaign(&state.job.campaign_id)
            .await?
            .ok_or_else(|| OutreachError::NotFound {
                entity: "campaign",
                id: state.job.campaign_id.clone(),
            })?;
        state.campaign = Some(campaign);
        let guardrails = Guardrails::new(&self.store.get_global_settings().await?);

        loop {
            let step = state.step;
            if matches!(step, PipelineStep::SendEmails | PipelineStep::Done) {
                break;
            }
            self.store.update_job_step(&job_id, step).await?;
            if cancel.is_cancelled() {
                return Err(OutreachError::Cancelled(job_id));
            }
            self.log_event(state, "step_started", json!({})).await?;
            self.events.emit(PipelineEvent::StepStarted {
                job_id: job_id.clone(),
                step,
            });
            tracing::info!(job_id = %job_id, step = %step, "Step started");
            let step_started = Instant::now();

            let data = match step {
                PipelineStep::PlanSearchTerms => self.plan(state)?,
                PipelineStep::WebSearch => self.web_search(state, cancel).await?,
                PipelineStep::EnrichLeads => self.enrich_leads(state, &guardrails).await?,
                PipelineStep::DraftEmails => self.draft_emails(state).await?,
                PipelineStep::AwaitApproval => self.finish(state).await?,
                PipelineStep::SendEmails | PipelineStep::Done => json!({}),
            };

            let duration_ms = step_started.elapsed().as_millis() as u64;
            self.log_event(state, "step_completed", data).await?;
            self.events.emit(PipelineEvent::StepCompleted {
                job_id: job_id.clone(),
                step,
                duration_ms,
            });
            tracing::info!(job_id = %job_id, step = %step, duration_ms, "Step completed");

            if step == PipelineStep::AwaitApproval {
                // Sending is driven by review, not by this run.
                break;
            }
            state.step = if step == PipelineStep::EnrichLeads && state.needs_another_round() {
                PipelineStep::WebSearch
            } else {
                get_next_step(step, JobStatus::Running)
            };
        }
        Ok(())
    }

    // ---- plan_search_terms ----

    fn plan(&self, state: &mut RunState) -> Result<serde_json::Value> {
        state.terms = plan_search_terms(state.campaign()?);
        tracing::debug!(job_id = %state.job.job_id, terms = ?state.terms, "Planned search terms");
        Ok(json!({ "terms": state.terms }))
    }

    // ---- web_search ----

    /// Search the next terms until the unenriched results could cover the
    /// leads still missing.
    async fn web_search(
        &self,
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value> {
        let mut searched = 0usize;

        while state.next_term < state.terms.len()
            && state.wants_leads(state.leads.len() + state.pending())
        {
            if cancel.is_cancelled() {
                return Err(OutreachError::Cancelled(state.job.job_id.clone()));
            }
            let term = state.terms[state.next_term].clone();
            state.next_term += 1;
            let batch = self
                .tools
                .search
                .search(&term, self.config.max_results_per_query)
                .await?;
            searched += 1;
            tracing::debug!(job_id = %state.job.job_id, term = %term, results = batch.len(), "Search batch");
            for result in batch {
                if state.seen_urls.insert(result.url.clone()) {
                    state.results.push(result);
                }
            }
        }
        Ok(json!({
            "queries": searched,
            "results": state.results.len(),
            "termsLeft": state.terms.len() - state.next_term,
        }))
    }

    // ---- enrich_leads ----

    async fn enrich_leads(
        &self,
        state: &mut RunState,
        guardrails: &Guardrails,
    ) -> Result<serde_json::Value> {
        let batch = state.results[state.enriched..].to_vec();
        state.enriched = state.results.len();

        for result in &batch {
            if !state.wants_leads(state.leads.len()) {
                break;
            }
            match self.stage_lead(state, guardrails, result).await {
                Ok(Some(lead)) => {
                    self.events.emit(PipelineEvent::LeadStaged {
                        job_id: state.job.job_id.clone(),
                        lead_id: lead.lead_id.clone(),
                        email: lead.email.clone(),
                    });
                    state.leads.push(lead);
                }
                Ok(None) => state.skipped += 1,
                Err(e) if e.is_item_scoped() => {
                    self.skip(state, &result.url, &e.to_string());
                    state.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(json!({ "staged": state.leads.len(), "skipped": state.skipped }))
    }

    /// Enrich, validate and persist one result. `Ok(None)` means the result
    /// was skipped by policy.
    async fn stage_lead(
        &self,
        state: &mut RunState,
        guardrails: &Guardrails,
        result: &SearchResult,
    ) -> Result<Option<Lead>> {
        if self.config.robots_respect && !self.tools.robots.can_fetch(&result.url).await {
            self.skip(state, &result.url, "disallowed by robots.txt");
            return Ok(None);
        }

        let campaign = state.campaign()?;
        let candidate = self.tools.enricher.enrich(result, campaign).await?;
        let lead = candidate.into_lead(new_id("lead"), &state.job.job_id, &campaign.campaign_id);

        let validation = guardrails.validate_lead_data(&lead);
        for warning in &validation.warnings {
            tracing::debug!(job_id = %state.job.job_id, url = %result.url, warning = %warning, "Lead warning");
        }
        if !validation.valid {
            self.skip(state, &result.url, &validation.errors.join("; "));
            return Ok(None);
        }
        if !state.seen_emails.insert(lead.email.to_ascii_lowercase()) {
            self.skip(state, &result.url, "duplicate email");
            return Ok(None);
        }

        self.store.create_lead(&lead).await?;
        Ok(Some(lead))
    }

    fn skip(&self, state: &RunState, url: &str, reason: &str) {
        tracing::warn!(job_id = %state.job.job_id, url, reason, "Lead skipped");
        self.events.emit(PipelineEvent::LeadSkipped {
            job_id: state.job.job_id.clone(),
            source_url: url.to_string(),
            reason: reason.to_string(),
        });
    }

    // ---- draft_emails ----

    async fn draft_emails(&self, state: &mut RunState) -> Result<serde_json::Value> {
        let campaign = state.campaign()?.clone();
        for lead in state.leads.clone() {
            let drafted = match self
                .tools
                .drafter
                .draft_email(&lead, &campaign, &self.config.from_name)
                .await
            {
                Ok(drafted) => drafted,
                Err(e) if e.is_item_scoped() => {
                    tracing::warn!(job_id = %state.job.job_id, lead_id = %lead.lead_id, error = %e, "Draft skipped");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let draft = Draft::new(
                new_id("draft"),
                &state.job.job_id,
                &lead.lead_id,
                drafted.subject,
                drafted.body,
            );
            self.store.create_draft(&draft).await?;
            state.cost_usd += drafted.cost_usd.max(0.0);
            self.events.emit(PipelineEvent::DraftCreated {
                job_id: state.job.job_id.clone(),
                draft_id: draft.draft_id.clone(),
            });
            state.drafts.push(draft.draft_id);
        }
        Ok(json!({ "drafts": state.drafts.len(), "costUSD": state.cost_usd }))
    }

    // ---- await_approval ----

    async fn finish(&self, state: &mut RunState) -> Result<serde_json::Value> {
        let created = u32::try_from(state.drafts.len()).unwrap_or(u32::MAX);
        self.store
            .update_job_status(
                &state.job.job_id,
                JobStatus::Done,
                Some(created),
                Some(state.cost_usd),
            )
            .await?;
        state.job.status = JobStatus::Done;
        state.job.sent_count = created;
        state.job.cost_usd = state.cost_usd;
        Ok(json!({ "sentCount": created, "costUSD": state.cost_usd }))
    }

    // ---- failure ----

    async fn log_event(
        &self,
        state: &RunState,
        event: &str,
        data: serde_json::Value,
    ) -> Result<()> {
        let event = RunEvent::new(
            &state.run_id,
            &state.job.job_id,
            state.step.as_str(),
            event,
            data,
        );
        self.store.log_run_event(&event).await
    }

    /// Best effort: the step error is what the caller sees.
    async fn fail_job(&self, state: &RunState, err: &OutreachError) {
        let job_id = &state.job.job_id;
        tracing::error!(job_id = %job_id, step = %state.step, error = %err, "Job failed");

        if let Err(e) = self
            .store
            .update_job_status(job_id, JobStatus::Failed, None, None)
            .await
        {
            tracing::error!(job_id = %job_id, error = %e, "Could not mark job failed");
        }
        let data = json!({ "error": err.to_string(), "step": state.step.as_str() });
        if let Err(e) = self.log_event(state, "job_failed", data).await {
            tracing::error!(job_id = %job_id, error = %e, "Could not record job failure");
        }
        self.events.emit(PipelineEvent::JobFailed {
            job_id: job_id.clone(),
            step: state.step,
            error: err.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use outreach_store::MemoryStore;
    use outreach_tools::SearchTool;
    use outreach_types::{DraftStatus, Geo};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DownSearch;

    #[async_trait]
    impl SearchTool for DownSearch {
        fn name(&self) -> &str {
            "down"
        }
        async fn search(&self, _query: &str, _max: usize) -> Result<Vec<SearchResult>> {
            Err(OutreachError::BackendUnavailable("search backend down".into()))
        }
    }

    async fn seeded(store: &MemoryStore, planned: u32) -> String {
        let campaign = Campaign::new(
            "camp_1",
            "Avicenna",
            "Acupuncture",
            Geo::new("Potomac", "MD"),
            vec!["wellness".into()],
        );
        store.create_campaign(&campaign).await.unwrap();
        store
            .create_job(&Job::queued("job_1", "camp_1", planned))
            .await
            .unwrap();
        "job_1".to_string()
    }

    fn runner(store: &MemoryStore, tools: Toolbox) -> JobRunner {
        JobRunner::new(
            Arc::new(store.clone()),
            tools,
            EventEmitter::default(),
            RunnerConfig::default(),
        )
    }

    #[tokio::test]
    async fn run_creates_planned_drafts() {
        let store = MemoryStore::new();
        let job_id = seeded(&store, 3).await;
        let summary = runner(&store, Toolbox::offline())
            .run(&job_id, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.drafts_created, 3);
        assert_eq!(summary.leads_staged, 3);
        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.sent_count, 3);
        assert_eq!(job.current_step, PipelineStep::AwaitApproval);
        let drafts = store
            .list_drafts_by_job(&job_id, Some(DraftStatus::Draft))
            .await
            .unwrap();
        assert_eq!(drafts.len(), 3);
    }

    #[tokio::test]
    async fn zero_planned_finishes_empty() {
        let store = MemoryStore::new();
        let job_id = seeded(&store, 0).await;
        let summary = runner(&store, Toolbox::offline())
            .run(&job_id, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary.drafts_created, 0);
        assert_eq!(summary.results_found, 0);
        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Done);
    }

    #[tokio::test]
    async fn search_outage_fails_job_with_event() {
        let store = MemoryStore::new();
        let job_id = seeded(&store, 3).await;
        let tools = Toolbox::offline().with_search(Arc::new(DownSearch));
        let err = runner(&store, tools)
            .run(&job_id, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OutreachError::BackendUnavailable(_)));

        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.current_step, PipelineStep::WebSearch);
        let events = store.list_run_events(&job_id).await.unwrap();
        let failed = events.last().unwrap();
        assert_eq!(failed.event, "job_failed");
        assert_eq!(failed.step, "web_search");
        assert!(failed.error_text().unwrap().contains("search backend down"));
    }

    #[tokio::test]
    async fn cancelled_before_start_fails_job() {
        let store = MemoryStore::new();
        let job_id = seeded(&store, 3).await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = runner(&store, Toolbox::offline())
            .run(&job_id, cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, OutreachError::Cancelled(_)));
        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(store.list_drafts_by_job(&job_id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_job_is_not_found_and_rerun_is_rejected() {
        let store = MemoryStore::new();
        let r = runner(&store, Toolbox::offline());
        let err = r.run("nope", CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, OutreachError::NotFound { entity: "job", .. }));

        let job_id = seeded(&store, 1).await;
        r.run(&job_id, CancellationToken::new()).await.unwrap();
        let err = r.run(&job_id, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, OutreachError::InvalidTransition { .. }));
        // The finished job is untouched by the rejected rerun.
        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Done);
    }

    #[tokio::test]
    async fn paused_job_is_not_run() {
        let store = MemoryStore::new();
        let job_id = seeded(&store, 3).await;
        store
            .update_job_status(&job_id, JobStatus::Paused, None, None)
            .await
            .unwrap();

        let err = runner(&store, Toolbox::offline())
            .run(&job_id, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OutreachError::InvalidTransition { entity: "job", .. }));
        let job = store.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Paused);
        assert!(store.list_leads_by_job(&job_id).await.unwrap().is_empty());
        assert!(store.list_run_events(&job_id).await.unwrap().is_empty());
    }

    /// The first query only yields personal mailboxes; later ones yield businesses.
    #[derive(Default)]
    struct PersonalFirst {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SearchTool for PersonalFirst {
        fn name(&self) -> &str {
            "personal-first"
        }
        async fn search(&self, query: &str, max: usize) -> Result<Vec<SearchResult>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((1..=max.min(3))
                .map(|i| {
                    let host = format!("clinic-{call}-{i}.com");
                    let email = if call == 0 {
                        format!("owner{call}{i}@gmail.com")
                    } else {
                        format!("info@{host}")
                    };
                    SearchResult {
                        title: format!("{query} Business {i}"),
                        url: format!("https://{host}"),
                        snippet: format!(
                            "Local result for {query}. The company provides relevant services \
                             in this industry. Contact us at {email}."
                        ),
                    }
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn skipped_results_are_made_up_from_later_terms() {
        let store = MemoryStore::new();
        let job_id = seeded(&store, 3).await;
        let tools = Toolbox::offline().with_search(Arc::new(PersonalFirst::default()));
        let summary = runner(&store, tools)
            .run(&job_id, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.leads_skipped, 3);
        assert_eq!(summary.leads_staged, 3);
        assert_eq!(summary.drafts_created, 3);
        assert_eq!(summary.results_found, 6);
        let leads = store.list_leads_by_job(&job_id).await.unwrap();
        assert!(leads.iter().all(|l| l.domain != "gmail.com"));

        let events = store.list_run_events(&job_id).await.unwrap();
        let rounds = events
            .iter()
            .filter(|e| e.event == "step_started" && e.step == "web_search")
            .count();
        assert_eq!(rounds, 2);
    }

    #[tokio::test]
    async fn step_events_bracket_each_step() {
        let store = MemoryStore::new();
        let job_id = seeded(&store, 1).await;
        runner(&store, Toolbox::offline())
            .run(&job_id, CancellationToken::new())
            .await
            .unwrap();
        let events = store.list_run_events(&job_id).await.unwrap();
        let started: Vec<&str> = events
            .iter()
            .filter(|e| e.event == "step_started")
            .map(|e| e.step.as_str())
            .collect();
        assert_eq!(
            started,
            vec![
                "plan_search_terms",
                "web_search",
                "enrich_leads",
                "draft_emails",
                "await_approval"
            ]
        );
        assert_eq!(
            events.iter().filter(|e| e.event == "step_completed").count(),
            5
        );
    }
}
