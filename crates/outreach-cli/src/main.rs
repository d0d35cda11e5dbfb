//! CLI binary for running and checking Outreach campaigns.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};

use outreach_pipeline::{
    plan_search_terms, Compliance, EventEmitter, Guardrails, JobRunner, JobSupervisor,
    OutreachService, RunnerConfig, SendOutcome,
};
use outreach_store::{MemoryStore, SqliteStore, Store};
use outreach_tools::{Delivery, HttpRobotsPolicy, RecordingDelivery, Toolbox};
use outreach_types::{CreateCampaignRequest, CreateJobRequest, Geo, ReviewDraftRequest};

#[derive(Parser)]
#[command(name = "outreach", version, about = "Outreach campaign orchestration and policy engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Campaign targeting shared by `run` and `plan`.
#[derive(Args)]
struct CampaignArgs {
    /// Industry, e.g. "Acupuncture"
    #[arg(long)]
    industry: String,

    /// Search keyword (repeatable)
    #[arg(short, long = "keyword", required = true)]
    keywords: Vec<String>,

    /// Center city of the target area
    #[arg(long)]
    city: Option<String>,

    /// Two-letter state code
    #[arg(long)]
    state: Option<String>,
}

impl CampaignArgs {
    fn geo(&self) -> Geo {
        Geo {
            center_city: self.city.clone(),
            state: self.state.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create a campaign, run one job against it, and print the drafts
    Run {
        /// Campaign name
        #[arg(long)]
        name: String,

        #[command(flatten)]
        campaign: CampaignArgs,

        /// Number of leads to aim for
        #[arg(short, long, default_value = "5")]
        planned: i64,

        /// SQLite database file (default: DATABASE_URL, else in-memory)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Fetch robots.txt for every result instead of allowing all
        #[arg(long)]
        live_robots: bool,

        /// Approve every draft and send it (SendGrid when configured, else recorded)
        #[arg(long)]
        send: bool,

        /// Print drafts as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the search terms a campaign would use
    Plan {
        #[command(flatten)]
        campaign: CampaignArgs,
    },

    /// Check a domain against the configured allow/block lists
    CheckDomain {
        domain: String,

        /// Allowed domain (repeatable); when given, the allow list is closed
        #[arg(long = "allow")]
        allow: Vec<String>,

        /// Blocked domain (repeatable)
        #[arg(long = "block")]
        block: Vec<String>,
    },

    /// Check a message for compliance and print the amended body
    Compliance {
        /// Subject line
        #[arg(short, long)]
        subject: String,

        /// File holding the message body
        body: PathBuf,
    },

    /// Mark jobs left running or queued by a crashed process as failed
    Recover {
        /// SQLite database file
        db: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    match cli.command {
        Commands::Run {
            name,
            campaign,
            planned,
            db,
            live_robots,
            send,
            json,
        } => {
            cmd_run(&name, &campaign, planned, db.as_deref(), live_robots, send, json).await?;
        }
        Commands::Plan { campaign } => {
            cmd_plan(&campaign)?;
        }
        Commands::CheckDomain {
            domain,
            allow,
            block,
        } => {
            cmd_check_domain(&domain, allow, block);
        }
        Commands::Compliance { subject, body } => {
            cmd_compliance(&subject, &body)?;
        }
        Commands::Recover { db } => {
            cmd_recover(&db).await?;
        }
    }

    Ok(())
}

async fn open_store(db: Option<&Path>, config: &RunnerConfig) -> anyhow::Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match (db, config.database_url.as_deref()) {
        (Some(path), _) => Arc::new(SqliteStore::open(path).await?),
        (None, Some(url)) => Arc::new(SqliteStore::connect(url).await?),
        (None, None) => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}

fn delivery(config: &RunnerConfig) -> Arc<dyn Delivery> {
    let sendgrid = config.sendgrid();
    if sendgrid.is_configured() {
        Arc::new(sendgrid)
    } else {
        tracing::warn!("SENDGRID_API_KEY not set; messages are recorded, not sent");
        Arc::new(RecordingDelivery::new())
    }
}

async fn cmd_run(
    name: &str,
    args: &CampaignArgs,
    planned: i64,
    db: Option<&Path>,
    live_robots: bool,
    send: bool,
    json: bool,
) -> anyhow::Result<()> {
    let config = RunnerConfig::from_env()?;
    let store = open_store(db, &config).await?;

    let mut tools = Toolbox::offline().with_delivery(delivery(&config));
    if live_robots {
        tools = tools.with_robots(Arc::new(HttpRobotsPolicy::new()));
    }
    let service = OutreachService::new(Arc::clone(&store), tools, config);

    let campaign = service
        .create_campaign(CreateCampaignRequest {
            name: name.to_string(),
            preset: None,
            industry: args.industry.clone(),
            geo: args.geo(),
            keywords: args.keywords.clone(),
            model: None,
            send_cap_per_run: None,
            daily_send_cap: None,
        })
        .await?;
    println!("Campaign: {} ({})", campaign.name, campaign.campaign_id);

    let summary = service
        .run_job(CreateJobRequest {
            campaign_id: campaign.campaign_id.clone(),
            planned_count: planned,
        })
        .await
        .context("job run failed")?;

    println!("Job: {}", summary.job_id);
    println!("Search terms: {}", summary.search_terms.len());
    println!("Results: {}", summary.results_found);
    println!(
        "Leads: {} staged, {} skipped",
        summary.leads_staged, summary.leads_skipped
    );
    println!("Drafts: {} (cost ${:.4})", summary.drafts_created, summary.cost_usd);

    let drafts = service.list_drafts(&summary.job_id, None).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&drafts)?);
    } else {
        for draft in &drafts {
            let to = store
                .get_lead(&draft.lead_id)
                .await?
                .map(|l| l.email)
                .unwrap_or_default();
            println!("\n--- {} -> {}", draft.draft_id, to);
            println!("Subject: {}", draft.subject);
            println!("{}", draft.body);
        }
    }

    if send {
        for draft in &drafts {
            service
                .approve_draft(&draft.draft_id, ReviewDraftRequest::default())
                .await?;
        }
        let report = service.send_approved(&summary.job_id).await?;
        println!();
        for (draft_id, outcome) in &report.outcomes {
            match outcome {
                SendOutcome::Sent { message_id } => {
                    println!("SENT    {draft_id} {}", message_id.as_deref().unwrap_or("-"))
                }
                SendOutcome::Blocked { reasons } => {
                    println!("BLOCKED {draft_id} {}", reasons.join("; "))
                }
                SendOutcome::Failed { error } => println!("FAILED  {draft_id} {error}"),
            }
        }
        println!("Sent {} of {}", report.sent(), report.outcomes.len());
    }
    Ok(())
}

fn cmd_plan(args: &CampaignArgs) -> anyhow::Result<()> {
    let campaign = CreateCampaignRequest {
        name: "plan".to_string(),
        preset: None,
        industry: args.industry.clone(),
        geo: args.geo(),
        keywords: args.keywords.clone(),
        model: None,
        send_cap_per_run: None,
        daily_send_cap: None,
    }
    .into_campaign()?;

    for term in plan_search_terms(&campaign) {
        println!("{term}");
    }
    Ok(())
}

fn cmd_check_domain(domain: &str, allow: Vec<String>, block: Vec<String>) {
    let settings = outreach_types::GlobalSettings {
        allow_domains: allow,
        block_domains: block,
        ..Default::default()
    };
    match Guardrails::new(&settings).check_domain_restrictions(domain).reason() {
        None => println!("ALLOWED {domain}"),
        Some(reason) => {
            println!("DENIED  {reason}");
            std::process::exit(1);
        }
    }
}

fn cmd_compliance(subject: &str, body_path: &Path) -> anyhow::Result<()> {
    let body = std::fs::read_to_string(body_path)
        .with_context(|| format!("reading {}", body_path.display()))?;
    let report = Compliance::default().ensure_email_compliance(subject, &body);

    println!("Subject: {}", report.modified_subject);
    println!("{}", report.modified_body);
    if report.compliant {
        println!("\nCompliant");
        return Ok(());
    }
    println!();
    for issue in &report.issues {
        println!("[ISSUE] {issue}");
    }
    std::process::exit(1);
}

async fn cmd_recover(db: &Path) -> anyhow::Result<()> {
    let config = RunnerConfig::from_env()?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(db).await?);
    let runner = JobRunner::new(store, Toolbox::offline(), EventEmitter::default(), config);
    let recovered = JobSupervisor::new(Arc::new(runner)).recover_orphans().await?;

    if recovered.is_empty() {
        println!("No orphaned jobs");
    }
    for job_id in &recovered {
        println!("Marked failed: {job_id}");
    }
    Ok(())
}
