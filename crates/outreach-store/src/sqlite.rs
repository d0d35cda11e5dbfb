//! SQLite [`Store`] backend on a `sqlx` connection pool.
//!
//! One flat table per entity. List and map fields are stored as JSON text,
//! timestamps as RFC 3339 text. The schema is created idempotently on
//! connect.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use outreach_types::{
    Campaign, Draft, DraftStatus, Geo, GlobalSettings, Job, JobStatus, Lead, OutreachError,
    PipelineStep, Result, RunEvent,
};

use crate::{already_exists, draft_transition_error, job_transition_error, not_found, Store};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS campaigns (
        campaign_id      TEXT    PRIMARY KEY,
        name             TEXT    NOT NULL,
        preset           TEXT    NOT NULL,
        industry         TEXT    NOT NULL,
        geo              TEXT    NOT NULL,
        keywords         TEXT    NOT NULL,
        model            TEXT    NOT NULL,
        send_cap_per_run INTEGER NOT NULL,
        daily_send_cap   INTEGER NOT NULL,
        status           TEXT    NOT NULL,
        created_at       TEXT    NOT NULL,
        updated_at       TEXT    NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        job_id        TEXT    PRIMARY KEY,
        campaign_id   TEXT    NOT NULL,
        planned_count INTEGER NOT NULL,
        sent_count    INTEGER NOT NULL DEFAULT 0,
        cost_usd      REAL    NOT NULL DEFAULT 0,
        status        TEXT    NOT NULL,
        current_step  TEXT    NOT NULL,
        created_at    TEXT    NOT NULL,
        updated_at    TEXT    NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS leads (
        lead_id      TEXT PRIMARY KEY,
        job_id       TEXT NOT NULL,
        campaign_id  TEXT NOT NULL,
        company      TEXT NOT NULL,
        contact_name TEXT NOT NULL,
        role         TEXT NOT NULL,
        email        TEXT NOT NULL,
        domain       TEXT NOT NULL,
        city         TEXT NOT NULL,
        state        TEXT NOT NULL,
        source_url   TEXT NOT NULL,
        confidence   REAL NOT NULL,
        enriched_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS drafts (
        draft_id   TEXT PRIMARY KEY,
        job_id     TEXT NOT NULL,
        lead_id    TEXT NOT NULL,
        subject    TEXT NOT NULL,
        body       TEXT NOT NULL,
        status     TEXT NOT NULL,
        reviewer   TEXT,
        message_id TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS run_events (
        seq    INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL,
        job_id TEXT NOT NULL,
        step   TEXT NOT NULL,
        event  TEXT NOT NULL,
        data   TEXT NOT NULL,
        ts     TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        id               TEXT PRIMARY KEY,
        allow_domains    TEXT NOT NULL,
        block_domains    TEXT NOT NULL,
        unsubscribe_text TEXT NOT NULL,
        legal_address    TEXT NOT NULL,
        updated_at       TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)",
    "CREATE INDEX IF NOT EXISTS idx_leads_job ON leads(job_id)",
    "CREATE INDEX IF NOT EXISTS idx_drafts_job ON drafts(job_id)",
    "CREATE INDEX IF NOT EXISTS idx_run_events_job ON run_events(job_id)",
];

const SETTINGS_ID: &str = "global";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to a SQLite URL (e.g. `sqlite:outreach.db` or
    /// `sqlite::memory:`) and create the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(backend)?
            .create_if_missing(true);
        let in_memory = url.contains(":memory:");
        // An in-memory database lives and dies with its single connection.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(backend)?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(backend)?;
        }
        tracing::debug!(url, "SQLite store ready");
        Ok(Self { pool })
    }

    /// Open (or create) a database file.
    pub async fn open(path: &Path) -> Result<Self> {
        Self::connect(&format!("sqlite:{}", path.display())).await
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus> {
        let row = sqlx::query("SELECT status FROM jobs WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or_else(|| not_found("job", job_id))?;
        get_text(&row, "status")?.parse()
    }

    async fn draft_status(&self, draft_id: &str) -> Result<DraftStatus> {
        let row = sqlx::query("SELECT status FROM drafts WHERE draft_id = ?")
            .bind(draft_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or_else(|| not_found("draft", draft_id))?;
        get_text(&row, "status")?.parse()
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn backend(err: sqlx::Error) -> OutreachError {
    OutreachError::BackendUnavailable(format!("sqlite: {err}"))
}

fn insert_error(entity: &'static str, id: &str, err: sqlx::Error) -> OutreachError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return already_exists(entity, id);
        }
    }
    backend(err)
}

fn get_text(row: &SqliteRow, column: &str) -> Result<String> {
    row.try_get::<String, _>(column).map_err(backend)
}

fn get_opt_text(row: &SqliteRow, column: &str) -> Result<Option<String>> {
    row.try_get::<Option<String>, _>(column).map_err(backend)
}

fn get_u32(row: &SqliteRow, column: &str) -> Result<u32> {
    let value = row.try_get::<i64, _>(column).map_err(backend)?;
    u32::try_from(value).map_err(|_| {
        OutreachError::Other(format!("column '{column}' out of range: {value}"))
    })
}

fn get_f64(row: &SqliteRow, column: &str) -> Result<f64> {
    row.try_get::<f64, _>(column).map_err(backend)
}

fn get_time(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw = get_text(row, column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| OutreachError::Other(format!("bad timestamp in '{column}': {e}")))
}

fn get_json<T: serde::de::DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<T> {
    Ok(serde_json::from_str(&get_text(row, column)?)?)
}

fn campaign_from_row(row: &SqliteRow) -> Result<Campaign> {
    Ok(Campaign {
        campaign_id: get_text(row, "campaign_id")?,
        name: get_text(row, "name")?,
        preset: get_text(row, "preset")?,
        industry: get_text(row, "industry")?,
        geo: get_json::<Geo>(row, "geo")?,
        keywords: get_json(row, "keywords")?,
        model: get_text(row, "model")?,
        send_cap_per_run: get_u32(row, "send_cap_per_run")?,
        daily_send_cap: get_u32(row, "daily_send_cap")?,
        status: get_text(row, "status")?,
        created_at: get_time(row, "created_at")?,
        updated_at: get_time(row, "updated_at")?,
    })
}

fn job_from_row(row: &SqliteRow) -> Result<Job> {
    Ok(Job {
        job_id: get_text(row, "job_id")?,
        campaign_id: get_text(row, "campaign_id")?,
        planned_count: get_u32(row, "planned_count")?,
        sent_count: get_u32(row, "sent_count")?,
        cost_usd: get_f64(row, "cost_usd")?,
        status: get_text(row, "status")?.parse()?,
        current_step: get_text(row, "current_step")?.parse()?,
        created_at: get_time(row, "created_at")?,
        updated_at: get_time(row, "updated_at")?,
    })
}

fn lead_from_row(row: &SqliteRow) -> Result<Lead> {
    Ok(Lead {
        lead_id: get_text(row, "lead_id")?,
        job_id: get_text(row, "job_id")?,
        campaign_id: get_text(row, "campaign_id")?,
        company: get_text(row, "company")?,
        contact_name: get_text(row, "contact_name")?,
        role: get_text(row, "role")?,
        email: get_text(row, "email")?,
        domain: get_text(row, "domain")?,
        city: get_text(row, "city")?,
        state: get_text(row, "state")?,
        source_url: get_text(row, "source_url")?,
        confidence: get_f64(row, "confidence")?,
        enriched_at: get_time(row, "enriched_at")?,
    })
}

fn draft_from_row(row: &SqliteRow) -> Result<Draft> {
    Ok(Draft {
        draft_id: get_text(row, "draft_id")?,
        job_id: get_text(row, "job_id")?,
        lead_id: get_text(row, "lead_id")?,
        subject: get_text(row, "subject")?,
        body: get_text(row, "body")?,
        status: get_text(row, "status")?.parse()?,
        reviewer: get_opt_text(row, "reviewer")?,
        message_id: get_opt_text(row, "message_id")?,
        created_at: get_time(row, "created_at")?,
        updated_at: get_time(row, "updated_at")?,
    })
}

fn event_from_row(row: &SqliteRow) -> Result<RunEvent> {
    Ok(RunEvent {
        run_id: get_text(row, "run_id")?,
        job_id: get_text(row, "job_id")?,
        step: get_text(row, "step")?,
        event: get_text(row, "event")?,
        data: get_json(row, "data")?,
        timestamp: get_time(row, "ts")?,
    })
}

fn settings_from_row(row: &SqliteRow) -> Result<GlobalSettings> {
    Ok(GlobalSettings {
        allow_domains: get_json(row, "allow_domains")?,
        block_domains: get_json(row, "block_domains")?,
        unsubscribe_text: get_text(row, "unsubscribe_text")?,
        legal_address: get_text(row, "legal_address")?,
        updated_at: get_time(row, "updated_at")?,
    })
}

// ---------------------------------------------------------------------------
// Store impl
// ---------------------------------------------------------------------------

#[async_trait]
impl Store for SqliteStore {
    async fn create_campaign(&self, campaign: &Campaign) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO campaigns (campaign_id, name, preset, industry, geo, keywords, model,
                                   send_cap_per_run, daily_send_cap, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&campaign.campaign_id)
        .bind(&campaign.name)
        .bind(&campaign.preset)
        .bind(&campaign.industry)
        .bind(serde_json::to_string(&campaign.geo)?)
        .bind(serde_json::to_string(&campaign.keywords)?)
        .bind(&campaign.model)
        .bind(i64::from(campaign.send_cap_per_run))
        .bind(i64::from(campaign.daily_send_cap))
        .bind(&campaign.status)
        .bind(campaign.created_at.to_rfc3339())
        .bind(campaign.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error("campaign", &campaign.campaign_id, e))?;
        Ok(())
    }

    async fn get_campaign(&self, campaign_id: &str) -> Result<Option<Campaign>> {
        sqlx::query("SELECT * FROM campaigns WHERE campaign_id = ?")
            .bind(campaign_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(|row| campaign_from_row(&row))
            .transpose()
    }

    async fn create_job(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (job_id, campaign_id, planned_count, sent_count, cost_usd,
                              status, current_step, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.job_id)
        .bind(&job.campaign_id)
        .bind(i64::from(job.planned_count))
        .bind(i64::from(job.sent_count))
        .bind(job.cost_usd)
        .bind(job.status.as_str())
        .bind(job.current_step.as_str())
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error("job", &job.job_id, e))?;
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        sqlx::query("SELECT * FROM jobs WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(|row| job_from_row(&row))
            .transpose()
    }

    async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<Job>> {
        let rows = sqlx::query("SELECT * FROM jobs WHERE status = ? ORDER BY created_at, rowid")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(job_from_row).collect()
    }

    async fn update_job_status(
        &self,
        job_id: &str,
        status: JobStatus,
        sent_count: Option<u32>,
        cost_usd: Option<f64>,
    ) -> Result<()> {
        let current = self.job_status(job_id).await?;
        if !current.can_transition_to(status) {
            return Err(job_transition_error(job_id, current, status));
        }
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?,
                sent_count = COALESCE(?, sent_count),
                cost_usd = COALESCE(?, cost_usd),
                updated_at = ?
            WHERE job_id = ? AND status = ?
            "#,
        )
        .bind(status.as_str())
        .bind(sent_count.map(i64::from))
        .bind(cost_usd)
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .bind(current.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            // Someone else moved the job between our read and write.
            let actual = self.job_status(job_id).await?;
            return Err(job_transition_error(job_id, actual, status));
        }
        Ok(())
    }

    async fn update_job_step(&self, job_id: &str, step: PipelineStep) -> Result<()> {
        let result = sqlx::query("UPDATE jobs SET current_step = ?, updated_at = ? WHERE job_id = ?")
            .bind(step.as_str())
            .bind(Utc::now().to_rfc3339())
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(not_found("job", job_id));
        }
        Ok(())
    }

    async fn create_lead(&self, lead: &Lead) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO leads (lead_id, job_id, campaign_id, company, contact_name, role, email,
                               domain, city, state, source_url, confidence, enriched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&lead.lead_id)
        .bind(&lead.job_id)
        .bind(&lead.campaign_id)
        .bind(&lead.company)
        .bind(&lead.contact_name)
        .bind(&lead.role)
        .bind(&lead.email)
        .bind(&lead.domain)
        .bind(&lead.city)
        .bind(&lead.state)
        .bind(&lead.source_url)
        .bind(lead.confidence)
        .bind(lead.enriched_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error("lead", &lead.lead_id, e))?;
        Ok(())
    }

    async fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>> {
        sqlx::query("SELECT * FROM leads WHERE lead_id = ?")
            .bind(lead_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(|row| lead_from_row(&row))
            .transpose()
    }

    async fn list_leads_by_job(&self, job_id: &str) -> Result<Vec<Lead>> {
        let rows = sqlx::query("SELECT * FROM leads WHERE job_id = ? ORDER BY rowid")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(lead_from_row).collect()
    }

    async fn create_draft(&self, draft: &Draft) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO drafts (draft_id, job_id, lead_id, subject, body, status, reviewer,
                                message_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&draft.draft_id)
        .bind(&draft.job_id)
        .bind(&draft.lead_id)
        .bind(&draft.subject)
        .bind(&draft.body)
        .bind(draft.status.as_str())
        .bind(draft.reviewer.as_deref())
        .bind(draft.message_id.as_deref())
        .bind(draft.created_at.to_rfc3339())
        .bind(draft.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error("draft", &draft.draft_id, e))?;
        Ok(())
    }

    async fn get_draft(&self, draft_id: &str) -> Result<Option<Draft>> {
        sqlx::query("SELECT * FROM drafts WHERE draft_id = ?")
            .bind(draft_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .map(|row| draft_from_row(&row))
            .transpose()
    }

    async fn list_drafts_by_job(
        &self,
        job_id: &str,
        status: Option<DraftStatus>,
    ) -> Result<Vec<Draft>> {
        let rows = sqlx::query(
            "SELECT * FROM drafts WHERE job_id = ? AND (? IS NULL OR status = ?) ORDER BY rowid",
        )
        .bind(job_id)
        .bind(status.map(|s| s.as_str()))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(draft_from_row).collect()
    }

    async fn update_draft_status(
        &self,
        draft_id: &str,
        status: DraftStatus,
        reviewer: Option<&str>,
        message_id: Option<&str>,
    ) -> Result<()> {
        let current = self.draft_status(draft_id).await?;
        if !current.can_transition_to(status) {
            return Err(draft_transition_error(draft_id, current, status));
        }
        let result = sqlx::query(
            r#"
            UPDATE drafts
            SET status = ?,
                reviewer = COALESCE(?, reviewer),
                message_id = COALESCE(?, message_id),
                updated_at = ?
            WHERE draft_id = ? AND status = ?
            "#,
        )
        .bind(status.as_str())
        .bind(reviewer)
        .bind(message_id)
        .bind(Utc::now().to_rfc3339())
        .bind(draft_id)
        .bind(current.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            let actual = self.draft_status(draft_id).await?;
            return Err(draft_transition_error(draft_id, actual, status));
        }
        Ok(())
    }

    async fn log_run_event(&self, event: &RunEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO run_events (run_id, job_id, step, event, data, ts) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.run_id)
        .bind(&event.job_id)
        .bind(&event.step)
        .bind(&event.event)
        .bind(serde_json::to_string(&event.data)?)
        .bind(event.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn list_run_events(&self, job_id: &str) -> Result<Vec<RunEvent>> {
        let rows = sqlx::query("SELECT * FROM run_events WHERE job_id = ? ORDER BY seq")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(event_from_row).collect()
    }

    async fn get_global_settings(&self) -> Result<GlobalSettings> {
        let select = "SELECT * FROM settings WHERE id = ?";
        if let Some(row) = sqlx::query(select)
            .bind(SETTINGS_ID)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
        {
            return settings_from_row(&row);
        }

        // First access: a racing writer may beat us; INSERT OR IGNORE keeps
        // whichever default landed first.
        let defaults = GlobalSettings::default();
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO settings (id, allow_domains, block_domains, unsubscribe_text,
                                            legal_address, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(SETTINGS_ID)
        .bind(serde_json::to_string(&defaults.allow_domains)?)
        .bind(serde_json::to_string(&defaults.block_domains)?)
        .bind(&defaults.unsubscribe_text)
        .bind(&defaults.legal_address)
        .bind(defaults.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        tracing::info!("Created default global settings");

        let row = sqlx::query(select)
            .bind(SETTINGS_ID)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        settings_from_row(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn campaign() -> Campaign {
        Campaign::new(
            "camp_1",
            "Test",
            "Acupuncture",
            Geo::new("Potomac", "MD"),
            vec!["wellness".into(), "pain relief".into()],
        )
    }

    #[tokio::test]
    async fn campaign_persists_and_reads_back() {
        let store = SqliteStore::in_memory().await.unwrap();
        let c = campaign();
        store.create_campaign(&c).await.unwrap();

        let loaded = store.get_campaign("camp_1").await.unwrap().unwrap();
        assert_eq!(loaded.keywords, c.keywords);
        assert_eq!(loaded.geo, c.geo);
        assert_eq!(loaded.send_cap_per_run, 20);
        assert!(store.get_campaign("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_is_already_exists() {
        let store = SqliteStore::in_memory().await.unwrap();
        let job = Job::queued("job_1", "camp_1", 3);
        store.create_job(&job).await.unwrap();
        let err = store.create_job(&job).await.unwrap_err();
        assert!(matches!(err, OutreachError::AlreadyExists { entity: "job", .. }));
    }

    #[tokio::test]
    async fn job_lifecycle_round_trip() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.create_job(&Job::queued("job_1", "camp_1", 3)).await.unwrap();
        store
            .update_job_status("job_1", JobStatus::Running, None, None)
            .await
            .unwrap();
        store
            .update_job_step("job_1", PipelineStep::EnrichLeads)
            .await
            .unwrap();
        store
            .update_job_status("job_1", JobStatus::Done, Some(3), Some(0.5))
            .await
            .unwrap();

        let job = store.get_job("job_1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.current_step, PipelineStep::EnrichLeads);
        assert_eq!(job.sent_count, 3);
        assert_eq!(job.cost_usd, 0.5);

        let err = store
            .update_job_status("job_1", JobStatus::Failed, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, OutreachError::InvalidTransition { .. }));

        let done = store.list_jobs_by_status(JobStatus::Done).await.unwrap();
        assert_eq!(done.len(), 1);
    }

    #[tokio::test]
    async fn draft_state_machine_enforced() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .create_draft(&Draft::new("d1", "job_1", "lead_1", "Hi", "Body"))
            .await
            .unwrap();
        assert!(store
            .update_draft_status("d1", DraftStatus::Sent, None, None)
            .await
            .is_err());
        store
            .update_draft_status("d1", DraftStatus::Approved, Some("bob"), None)
            .await
            .unwrap();
        store
            .update_draft_status("d1", DraftStatus::Sent, None, Some("m-1"))
            .await
            .unwrap();

        let d = store.get_draft("d1").await.unwrap().unwrap();
        assert_eq!(d.reviewer.as_deref(), Some("bob"));
        assert_eq!(d.message_id.as_deref(), Some("m-1"));

        let sent = store
            .list_drafts_by_job("job_1", Some(DraftStatus::Sent))
            .await
            .unwrap();
        assert_eq!(sent.len(), 1);
        let drafts = store
            .list_drafts_by_job("job_1", Some(DraftStatus::Draft))
            .await
            .unwrap();
        assert!(drafts.is_empty());
    }

    #[tokio::test]
    async fn settings_default_then_stable() {
        let store = SqliteStore::in_memory().await.unwrap();
        let first = store.get_global_settings().await.unwrap();
        let second = store.get_global_settings().await.unwrap();
        assert_eq!(first.unsubscribe_text, second.unsubscribe_text);
        assert_eq!(first.updated_at, second.updated_at);
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outreach.db");
        {
            let store = SqliteStore::open(&path).await.unwrap();
            store.create_job(&Job::queued("job_1", "camp_1", 1)).await.unwrap();
            store
                .log_run_event(&RunEvent::new(
                    "run_1",
                    "job_1",
                    "web_search",
                    "job_failed",
                    serde_json::json!({"error": "boom"}),
                ))
                .await
                .unwrap();
        }
        let store = SqliteStore::open(&path).await.unwrap();
        assert!(store.get_job("job_1").await.unwrap().is_some());
        let events = store.list_run_events("job_1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].error_text(), Some("boom"));
    }

    #[tokio::test]
    async fn unreachable_database_is_backend_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("nested").join("db.sqlite");
        let err = SqliteStore::open(&path).await.err().unwrap();
        assert!(matches!(err, OutreachError::BackendUnavailable(_)));
    }
}
