//! One tokio task per job run, at most one active run per job id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use outreach_types::{new_id, JobStatus, OutreachError, Result, RunEvent};

use crate::orchestrator::{JobRunner, RunSummary};

type ActiveRuns = Arc<Mutex<HashMap<String, ActiveRun>>>;

struct ActiveRun {
    generation: u64,
    cancel: CancellationToken,
}

fn lock(active: &ActiveRuns) -> MutexGuard<'_, HashMap<String, ActiveRun>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the run from the active set when its task ends, however it ends.
struct Registration {
    active: ActiveRuns,
    job_id: String,
    generation: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut active = lock(&self.active);
        if active
            .get(&self.job_id)
            .is_some_and(|run| run.generation == self.generation)
        {
            active.remove(&self.job_id);
        }
    }
}

/// A launched run.
pub struct RunHandle {
    job_id: String,
    cancel: CancellationToken,
    join: JoinHandle<Result<RunSummary>>,
}

impl RunHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to finish.
    pub async fn wait(self) -> Result<RunSummary> {
        self.join
            .await
            .map_err(|e| OutreachError::Other(format!("run task for job '{}' failed: {e}", self.job_id)))?
    }
}

pub struct JobSupervisor {
    runner: Arc<JobRunner>,
    active: ActiveRuns,
    generation: AtomicU64,
}

impl JobSupervisor {
    pub fn new(runner: Arc<JobRunner>) -> Self {
        Self {
            runner,
            active: Arc::default(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn runner(&self) -> &Arc<JobRunner> {
        &self.runner
    }

    /// Spawn a run for `job_id`. Fails with `JobBusy` while another run of
    /// the same job is active.
    pub fn launch(&self, job_id: &str) -> Result<RunHandle> {
        let cancel = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        {
            let mut active = lock(&self.active);
            if active.contains_key(job_id) {
                return Err(OutreachError::JobBusy(job_id.to_string()));
            }
            active.insert(
                job_id.to_string(),
                ActiveRun {
                    generation,
                    cancel: cancel.clone(),
                },
            );
        }

        let registration = Registration {
            active: Arc::clone(&self.active),
            job_id: job_id.to_string(),
            generation,
        };
        let runner = Arc::clone(&self.runner);
        let task_job_id = job_id.to_string();
        let task_cancel = cancel.clone();
        let join = tokio::spawn(async move {
            let _registration = registration;
            let result = runner.run(&task_job_id, task_cancel).await;
            if let Err(e) = &result {
                tracing::warn!(job_id = %task_job_id, error = %e, "Run ended with error");
            }
            result
        });

        tracing::info!(job_id, "Run launched");
        Ok(RunHandle {
            job_id: job_id.to_string(),
            cancel,
            join,
        })
    }

    /// Trip the cancellation token of an active run. Returns `false` when the
    /// job has no active run.
    pub fn cancel(&self, job_id: &str) -> bool {
        match lock(&self.active).get(job_id) {
            Some(run) => {
                run.cancel.cancel();
                tracing::info!(job_id, "Run cancellation requested");
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self, job_id: &str) -> bool {
        lock(&self.active).contains_key(job_id)
    }

    pub fn active_jobs(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.active).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Mark jobs left `running` or `queued` by an earlier process as
    /// `failed`. Jobs with an active run here are left alone.
    pub async fn recover_orphans(&self) -> Result<Vec<String>> {
        let store = self.runner.store();
        let mut recovered = Vec::new();

        for status in [JobStatus::Running, JobStatus::Queued] {
            for job in store.list_jobs_by_status(status).await? {
                if self.is_active(&job.job_id) {
                    continue;
                }
                store
                    .update_job_status(&job.job_id, JobStatus::Failed, None, None)
                    .await?;
                let event = RunEvent::new(
                    new_id("run"),
                    &job.job_id,
                    job.current_step.as_str(),
                    "job_orphaned",
                    json!({
                        "error": format!("job left {status} by a previous process"),
                        "previousStatus": status.as_str(),
                    }),
                );
                store.log_run_event(&event).await?;
                tracing::warn!(job_id = %job.job_id, previous = %status, "Orphaned job marked failed");
                recovered.push(job.job_id);
            }
        }
        Ok(recovered)
    }
}
