//! Draft review and the guarded send path.
//!
//! A draft only leaves the system after review (`draft → approved`) and after
//! every gate passes at send time: lead validation, send caps, and content
//! compliance. Blocked sends leave the draft `approved` so it can be retried
//! once the cause is fixed. Sends for one job are serialized so a draft is
//! delivered at most once and cap counts stay exact.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::json;

use outreach_store::Store;
use outreach_tools::Delivery;
use outreach_types::{
    new_id, Draft, DraftStatus, OutreachError, PipelineStep, Result, RunEvent,
};

use crate::compliance::Compliance;
use crate::events::{EventEmitter, PipelineEvent};
use crate::guardrails::{Guardrails, PolicyDecision};

/// Result of one send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SendOutcome {
    Sent { message_id: Option<String> },
    /// A gate refused the send; the draft is still `approved`.
    Blocked { reasons: Vec<String> },
    /// The provider refused the message; the draft is now `failed`.
    Failed { error: String },
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SendOutcome::Sent { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub job_id: String,
    /// `(draft_id, outcome)` in draft creation order.
    pub outcomes: Vec<(String, SendOutcome)>,
}

impl DispatchReport {
    pub fn sent(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_sent()).count()
    }

    pub fn blocked(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SendOutcome::Blocked { .. }))
            .count()
    }
}

pub struct DraftDispatcher {
    store: Arc<dyn Store>,
    delivery: Arc<dyn Delivery>,
    events: EventEmitter,
    /// One send lock per job.
    send_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DraftDispatcher {
    pub fn new(store: Arc<dyn Store>, delivery: Arc<dyn Delivery>, events: EventEmitter) -> Self {
        Self {
            store,
            delivery,
            events,
            send_locks: Mutex::new(HashMap::new()),
        }
    }

    fn send_lock(&self, job_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.send_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(job_id.to_string()).or_default())
    }

    pub async fn approve(&self, draft_id: &str, reviewer: &str) -> Result<Draft> {
        self.review(draft_id, DraftStatus::Approved, reviewer).await
    }

    pub async fn reject(&self, draft_id: &str, reviewer: &str) -> Result<Draft> {
        self.review(draft_id, DraftStatus::Rejected, reviewer).await
    }

    async fn review(&self, draft_id: &str, status: DraftStatus, reviewer: &str) -> Result<Draft> {
        self.store
            .update_draft_status(draft_id, status, Some(reviewer), None)
            .await?;
        tracing::info!(draft_id, reviewer, status = %status, "Draft reviewed");
        self.load_draft(draft_id).await
    }

    /// Send one approved draft through every gate.
    ///
    /// Fails with `InvalidTransition` unless the draft is `approved`, and with
    /// `BackendUnavailable` when the delivery tool cannot be used. Neither
    /// changes the draft. A concurrent send of the same draft waits for the
    /// first and then sees it `sent`.
    pub async fn send(&self, draft_id: &str, from_name: &str) -> Result<SendOutcome> {
        let job_id = self.load_draft(draft_id).await?.job_id;
        let lock = self.send_lock(&job_id);
        let _guard = lock.lock().await;
        self.send_claimed(draft_id, from_name).await
    }

    /// Status and caps are read under the job's send lock.
    async fn send_claimed(&self, draft_id: &str, from_name: &str) -> Result<SendOutcome> {
        let draft = self.load_draft(draft_id).await?;
        if draft.status != DraftStatus::Approved {
            return Err(OutreachError::InvalidTransition {
                entity: "draft",
                id: draft_id.to_string(),
                from: draft.status.to_string(),
                to: DraftStatus::Sent.to_string(),
            });
        }

        let lead = self
            .store
            .get_lead(&draft.lead_id)
            .await?
            .ok_or_else(|| OutreachError::NotFound {
                entity: "lead",
                id: draft.lead_id.clone(),
            })?;
        let job = self
            .store
            .get_job(&draft.job_id)
            .await?
            .ok_or_else(|| OutreachError::NotFound {
                entity: "job",
                id: draft.job_id.clone(),
            })?;
        let campaign = self
            .store
            .get_campaign(&job.campaign_id)
            .await?
            .ok_or_else(|| OutreachError::NotFound {
                entity: "campaign",
                id: job.campaign_id.clone(),
            })?;
        let settings = self.store.get_global_settings().await?;
        let guardrails = Guardrails::new(&settings);

        let validation = guardrails.validate_lead_data(&lead);
        if !validation.valid {
            return self.block(&draft, validation.errors).await;
        }

        // The job's sent_count holds drafts created, so gate on actual sends.
        let already_sent = self
            .store
            .list_drafts_by_job(&job.job_id, Some(DraftStatus::Sent))
            .await?
            .len();
        let mut gated = job.clone();
        gated.sent_count = u32::try_from(already_sent).unwrap_or(u32::MAX);
        if let PolicyDecision::Denied(reason) = guardrails.check_send_limits(&gated, &campaign, 1) {
            return self.block(&draft, vec![reason]).await;
        }

        let report =
            Compliance::from_settings(&settings).ensure_email_compliance(&draft.subject, &draft.body);
        if !report.compliant {
            return self.block(&draft, report.issues).await;
        }

        let receipt = self
            .delivery
            .send_email(&lead.email, &report.modified_subject, &report.modified_body, from_name)
            .await
            .map_err(OutreachError::without_fallback)?;

        if receipt.success {
            if let Err(e) = self
                .store
                .update_draft_status(draft_id, DraftStatus::Sent, None, receipt.message_id.as_deref())
                .await
            {
                return Err(self.unrecorded_send(&draft, &lead.email, receipt.message_id, e).await);
            }
            tracing::info!(draft_id, to = %lead.email, message_id = ?receipt.message_id, "Draft sent");
            self.log(
                &draft,
                "draft_sent",
                json!({ "to": lead.email, "messageId": receipt.message_id }),
            )
            .await?;
            self.events.emit(PipelineEvent::DraftSent {
                draft_id: draft_id.to_string(),
                message_id: receipt.message_id.clone(),
            });
            Ok(SendOutcome::Sent {
                message_id: receipt.message_id,
            })
        } else {
            let error = receipt
                .error
                .unwrap_or_else(|| "delivery failed without a reason".to_string());
            self.store
                .update_draft_status(draft_id, DraftStatus::Failed, None, None)
                .await?;
            tracing::warn!(draft_id, to = %lead.email, error = %error, "Delivery rejected draft");
            self.log(&draft, "send_failed", json!({ "to": lead.email, "error": error }))
                .await?;
            Ok(SendOutcome::Failed { error })
        }
    }

    /// Send every approved draft of a job, in creation order.
    ///
    /// Per-draft gate failures are collected as outcomes; a backend failure
    /// stops the batch.
    pub async fn send_approved(&self, job_id: &str, from_name: &str) -> Result<DispatchReport> {
        if self.store.get_job(job_id).await?.is_none() {
            return Err(OutreachError::NotFound {
                entity: "job",
                id: job_id.to_string(),
            });
        }
        self.store
            .update_job_step(job_id, PipelineStep::SendEmails)
            .await?;

        let approved = self
            .store
            .list_drafts_by_job(job_id, Some(DraftStatus::Approved))
            .await?;
        let mut outcomes = Vec::with_capacity(approved.len());
        for draft in approved {
            let outcome = match self.send(&draft.draft_id, from_name).await {
                Ok(outcome) => outcome,
                // Sent or reviewed by someone else since the listing.
                Err(OutreachError::InvalidTransition { .. }) => continue,
                Err(e) if e.is_item_scoped() => SendOutcome::Blocked {
                    reasons: vec![e.to_string()],
                },
                Err(e) => return Err(e),
            };
            outcomes.push((draft.draft_id, outcome));
        }

        self.store.update_job_step(job_id, PipelineStep::Done).await?;
        let report = DispatchReport {
            job_id: job_id.to_string(),
            outcomes,
        };
        tracing::info!(job_id, sent = report.sent(), blocked = report.blocked(), "Approved drafts dispatched");
        Ok(report)
    }

    /// The message went out but the draft is still `approved`. Keep a trace of
    /// the delivery so a retry is not sent blind.
    async fn unrecorded_send(
        &self,
        draft: &Draft,
        to: &str,
        message_id: Option<String>,
        err: OutreachError,
    ) -> OutreachError {
        tracing::error!(
            draft_id = %draft.draft_id,
            to,
            message_id = ?message_id,
            error = %err,
            "Draft delivered but not marked sent"
        );
        let data = json!({ "to": to, "messageId": message_id, "error": err.to_string() });
        if let Err(e) = self.log(draft, "draft_sent_unrecorded", data).await {
            tracing::error!(draft_id = %draft.draft_id, error = %e, "Could not record delivered draft");
        }
        self.events.emit(PipelineEvent::DraftSent {
            draft_id: draft.draft_id.clone(),
            message_id: message_id.clone(),
        });
        OutreachError::BackendUnavailable(format!(
            "draft '{}' was delivered (message {}) but not marked sent: {err}",
            draft.draft_id,
            message_id.as_deref().unwrap_or("-"),
        ))
    }

    async fn block(&self, draft: &Draft, reasons: Vec<String>) -> Result<SendOutcome> {
        tracing::warn!(draft_id = %draft.draft_id, reasons = ?reasons, "Send blocked");
        self.log(draft, "send_blocked", json!({ "reasons": reasons }))
            .await?;
        self.events.emit(PipelineEvent::SendBlocked {
            draft_id: draft.draft_id.clone(),
            reasons: reasons.clone(),
        });
        Ok(SendOutcome::Blocked { reasons })
    }

    async fn log(&self, draft: &Draft, event: &str, mut data: serde_json::Value) -> Result<()> {
        data["draftId"] = json!(draft.draft_id);
        let event = RunEvent::new(
            new_id("run"),
            &draft.job_id,
            PipelineStep::SendEmails.as_str(),
            event,
            data,
        );
        self.store.log_run_event(&event).await
    }

    async fn load_draft(&self, draft_id: &str) -> Result<Draft> {
        self.store
            .get_draft(draft_id)
            .await?
            .ok_or_else(|| OutreachError::NotFound {
                entity: "draft",
                id: draft_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use outreach_store::MemoryStore;
    use outreach_tools::RecordingDelivery;
    use outreach_types::{Campaign, Geo, Job, Lead, DEFAULT_LEGAL_ADDRESS};

    async fn seed(store: &MemoryStore, email: &str, domain: &str, run_cap: u32) {
        let mut campaign = Campaign::new(
            "camp_1",
            "Plumbers",
            "Plumbing",
            Geo::new("Rockville", "MD"),
            vec!["repair".into()],
        );
        campaign.send_cap_per_run = run_cap;
        store.create_campaign(&campaign).await.unwrap();
        store.create_job(&Job::queued("job_1", "camp_1", 5)).await.unwrap();
        for i in 0..3 {
            store
                .create_lead(&Lead {
                    lead_id: format!("lead_{i}"),
                    job_id: "job_1".into(),
                    campaign_id: "camp_1".into(),
                    company: "Acme Plumbing".into(),
                    contact_name: "Jane".into(),
                    role: "Owner".into(),
                    email: email.into(),
                    domain: domain.into(),
                    city: "Rockville".into(),
                    state: "MD".into(),
                    source_url: format!("https://{domain}"),
                    confidence: 0.9,
                    enriched_at: Utc::now(),
                })
                .await
                .unwrap();
            store
                .create_draft(&Draft::new(
                    format!("draft_{i}"),
                    "job_1",
                    format!("lead_{i}"),
                    "Connection Request - Acme Plumbing",
                    "Hello Jane,\n\nWould you have 15 minutes next week?",
                ))
                .await
                .unwrap();
        }
    }

    fn dispatcher(store: &MemoryStore, delivery: RecordingDelivery) -> DraftDispatcher {
        DraftDispatcher::new(Arc::new(store.clone()), Arc::new(delivery), EventEmitter::default())
    }

    #[tokio::test]
    async fn unapproved_draft_cannot_be_sent() {
        let store = MemoryStore::new();
        seed(&store, "jane@acme.com", "acme.com", 20).await;
        let delivery = RecordingDelivery::new();
        let err = dispatcher(&store, delivery.clone())
            .send("draft_0", "NOFA BC")
            .await
            .unwrap_err();
        assert!(matches!(err, OutreachError::InvalidTransition { .. }));
        assert!(delivery.sent().is_empty());
    }

    #[tokio::test]
    async fn approved_draft_is_sent_with_disclosures() {
        let store = MemoryStore::new();
        seed(&store, "jane@acme.com", "acme.com", 20).await;
        let delivery = RecordingDelivery::new();
        let d = dispatcher(&store, delivery.clone());

        let approved = d.approve("draft_0", "reviewer@nofa").await.unwrap();
        assert_eq!(approved.status, DraftStatus::Approved);
        assert_eq!(approved.reviewer.as_deref(), Some("reviewer@nofa"));

        let outcome = d.send("draft_0", "NOFA BC").await.unwrap();
        assert!(outcome.is_sent());

        let sent = delivery.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "jane@acme.com");
        assert!(sent[0].body.ends_with(DEFAULT_LEGAL_ADDRESS));

        let draft = store.get_draft("draft_0").await.unwrap().unwrap();
        assert_eq!(draft.status, DraftStatus::Sent);
        assert!(draft.message_id.is_some());
    }

    #[tokio::test]
    async fn personal_domain_is_blocked_and_stays_approved() {
        let store = MemoryStore::new();
        seed(&store, "owner@yahoo.com", "yahoo.com", 20).await;
        let delivery = RecordingDelivery::new();
        let d = dispatcher(&store, delivery.clone());
        d.approve("draft_0", "system").await.unwrap();

        let outcome = d.send("draft_0", "NOFA BC").await.unwrap();
        assert_eq!(
            outcome,
            SendOutcome::Blocked {
                reasons: vec!["Domain yahoo.com is a personal email domain".into()]
            }
        );
        assert!(delivery.sent().is_empty());
        let draft = store.get_draft("draft_0").await.unwrap().unwrap();
        assert_eq!(draft.status, DraftStatus::Approved);
        let events = store.list_run_events("job_1").await.unwrap();
        assert_eq!(events.last().unwrap().event, "send_blocked");
    }

    #[tokio::test]
    async fn run_cap_blocks_after_limit() {
        let store = MemoryStore::new();
        seed(&store, "jane@acme.com", "acme.com", 2).await;
        let delivery = RecordingDelivery::new();
        let d = dispatcher(&store, delivery.clone());
        for i in 0..3 {
            d.approve(&format!("draft_{i}"), "system").await.unwrap();
        }

        let report = d.send_approved("job_1", "NOFA BC").await.unwrap();
        assert_eq!(report.sent(), 2);
        assert_eq!(report.blocked(), 1);
        assert_eq!(
            report.outcomes[2].1,
            SendOutcome::Blocked {
                reasons: vec!["Per-run send cap exceeded: 3 > 2".into()]
            }
        );
        assert_eq!(delivery.sent().len(), 2);
        let job = store.get_job("job_1").await.unwrap().unwrap();
        assert_eq!(job.current_step, PipelineStep::Done);
    }

    #[tokio::test]
    async fn provider_rejection_fails_draft() {
        let store = MemoryStore::new();
        seed(&store, "jane@acme.com", "acme.com", 20).await;
        let d = dispatcher(&store, RecordingDelivery::rejecting("SendGrid API error: 400"));
        d.approve("draft_0", "system").await.unwrap();

        let outcome = d.send("draft_0", "NOFA BC").await.unwrap();
        assert_eq!(
            outcome,
            SendOutcome::Failed {
                error: "SendGrid API error: 400".into()
            }
        );
        let draft = store.get_draft("draft_0").await.unwrap().unwrap();
        assert_eq!(draft.status, DraftStatus::Failed);
        let events = store.list_run_events("job_1").await.unwrap();
        assert_eq!(events.last().unwrap().event, "send_failed");
    }

    #[tokio::test]
    async fn unconfigured_delivery_leaves_draft_approved() {
        let store = MemoryStore::new();
        seed(&store, "jane@acme.com", "acme.com", 20).await;
        let d = DraftDispatcher::new(
            Arc::new(store.clone()),
            Arc::new(outreach_tools::SendGridDelivery::new(None, "info@nofa.com")),
            EventEmitter::default(),
        );
        d.approve("draft_0", "system").await.unwrap();

        let err = d.send("draft_0", "NOFA BC").await.unwrap_err();
        assert!(matches!(err, OutreachError::BackendUnavailable(ref m) if m.contains("sendgrid")));
        let draft = store.get_draft("draft_0").await.unwrap().unwrap();
        assert_eq!(draft.status, DraftStatus::Approved);
    }

    /// Records like `RecordingDelivery` after a pause.
    #[derive(Clone)]
    struct SlowDelivery(RecordingDelivery);

    #[async_trait::async_trait]
    impl Delivery for SlowDelivery {
        async fn send_email(
            &self,
            to: &str,
            subject: &str,
            body: &str,
            from_name: &str,
        ) -> Result<outreach_tools::DeliveryReceipt> {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            self.0.send_email(to, subject, body, from_name).await
        }
    }

    /// Delivers, then takes the store down before the draft can be marked.
    struct StoreDropsAfterDelivery {
        inner: RecordingDelivery,
        store: MemoryStore,
    }

    #[async_trait::async_trait]
    impl Delivery for StoreDropsAfterDelivery {
        async fn send_email(
            &self,
            to: &str,
            subject: &str,
            body: &str,
            from_name: &str,
        ) -> Result<outreach_tools::DeliveryReceipt> {
            let receipt = self.inner.send_email(to, subject, body, from_name).await;
            self.store.set_unavailable(true);
            receipt
        }
    }

    #[tokio::test]
    async fn concurrent_sends_deliver_once() {
        let store = MemoryStore::new();
        seed(&store, "jane@acme.com", "acme.com", 20).await;
        let delivery = RecordingDelivery::new();
        let d = DraftDispatcher::new(
            Arc::new(store.clone()),
            Arc::new(SlowDelivery(delivery.clone())),
            EventEmitter::default(),
        );
        d.approve("draft_0", "system").await.unwrap();

        let (a, b) = tokio::join!(d.send("draft_0", "NOFA BC"), d.send("draft_0", "NOFA BC"));
        let sent = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Ok(SendOutcome::Sent { .. })))
            .count();
        assert_eq!(sent, 1);
        assert!([&a, &b]
            .iter()
            .any(|r| matches!(r, Err(OutreachError::InvalidTransition { .. }))));
        assert_eq!(delivery.sent().len(), 1);
        let draft = store.get_draft("draft_0").await.unwrap().unwrap();
        assert_eq!(draft.status, DraftStatus::Sent);
    }

    #[tokio::test]
    async fn concurrent_sends_respect_run_cap() {
        let store = MemoryStore::new();
        seed(&store, "jane@acme.com", "acme.com", 1).await;
        let delivery = RecordingDelivery::new();
        let d = DraftDispatcher::new(
            Arc::new(store.clone()),
            Arc::new(SlowDelivery(delivery.clone())),
            EventEmitter::default(),
        );
        d.approve("draft_0", "system").await.unwrap();
        d.approve("draft_1", "system").await.unwrap();

        let (a, b) = tokio::join!(d.send("draft_0", "NOFA BC"), d.send("draft_1", "NOFA BC"));
        let outcomes = [a.unwrap(), b.unwrap()];
        assert_eq!(outcomes.iter().filter(|o| o.is_sent()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|o| matches!(o, SendOutcome::Blocked { .. })));
        assert_eq!(delivery.sent().len(), 1);
    }

    #[tokio::test]
    async fn delivered_but_unmarked_send_reports_message_id() {
        let store = MemoryStore::new();
        seed(&store, "jane@acme.com", "acme.com", 20).await;
        let delivery = RecordingDelivery::new();
        let d = DraftDispatcher::new(
            Arc::new(store.clone()),
            Arc::new(StoreDropsAfterDelivery {
                inner: delivery.clone(),
                store: store.clone(),
            }),
            EventEmitter::default(),
        );
        d.approve("draft_0", "system").await.unwrap();

        let err = d.send("draft_0", "NOFA BC").await.unwrap_err();
        assert!(matches!(
            err,
            OutreachError::BackendUnavailable(ref m) if m.contains("delivered (message rec_1)")
        ));
        assert_eq!(delivery.sent().len(), 1);

        store.set_unavailable(false);
        let draft = store.get_draft("draft_0").await.unwrap().unwrap();
        assert_eq!(draft.status, DraftStatus::Approved);
    }

    #[tokio::test]
    async fn rejected_draft_is_terminal() {
        let store = MemoryStore::new();
        seed(&store, "jane@acme.com", "acme.com", 20).await;
        let d = dispatcher(&store, RecordingDelivery::new());
        let rejected = d.reject("draft_1", "system").await.unwrap();
        assert_eq!(rejected.status, DraftStatus::Rejected);
        assert!(d.approve("draft_1", "system").await.is_err());
        assert!(matches!(
            d.approve("missing", "system").await.unwrap_err(),
            OutreachError::NotFound { .. }
        ));
    }
}
