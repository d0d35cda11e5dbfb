//! Delivery-provider event intake.

use outreach_store::Store;
use outreach_types::{Result, WebhookAck, WebhookBatch};

use crate::compliance::{record_complaint, record_unsubscribe};

const COMPLAINT_EVENTS: &[&str] = &["bounce", "dropped", "spamreport"];
const UNSUBSCRIBE_EVENTS: &[&str] = &["unsubscribe", "group_unsubscribe"];

/// Record complaints and unsubscribes from a provider batch. Events of other
/// types, or without a recipient address, are counted and ignored.
pub async fn handle_delivery_webhook(store: &dyn Store, batch: &WebhookBatch) -> Result<WebhookAck> {
    let mut recorded = 0usize;
    for event in &batch.events {
        let Some(email) = event.email.as_deref().filter(|e| !e.trim().is_empty()) else {
            tracing::debug!(event = %event.event, "Webhook event without recipient ignored");
            continue;
        };
        let kind = event.event.to_ascii_lowercase();
        let reason = event.reason.as_deref().unwrap_or_default();

        if COMPLAINT_EVENTS.contains(&kind.as_str()) {
            record_complaint(store, email, &kind, reason).await?;
            recorded += 1;
        } else if UNSUBSCRIBE_EVENTS.contains(&kind.as_str()) {
            record_unsubscribe(store, email, reason).await?;
            recorded += 1;
        }
    }

    tracing::info!(count = batch.events.len(), recorded, "Delivery webhook processed");
    Ok(WebhookAck {
        received: true,
        count: batch.events.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compliance::SYSTEM_JOB_ID;
    use outreach_store::MemoryStore;

    #[tokio::test]
    async fn routes_events_by_type() {
        let store = MemoryStore::new();
        let batch: WebhookBatch = serde_json::from_str(
            r#"{"events":[
                {"event":"bounce","email":"a@acme.com","reason":"550 mailbox unavailable"},
                {"event":"group_unsubscribe","email":"b@acme.com"},
                {"event":"open","email":"c@acme.com"},
                {"event":"spamreport"}
            ]}"#,
        )
        .unwrap();

        let ack = handle_delivery_webhook(&store, &batch).await.unwrap();
        assert_eq!(ack, WebhookAck { received: true, count: 4 });

        let events = store.list_run_events(SYSTEM_JOB_ID).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "complaint_received");
        assert_eq!(events[0].data["complaintType"], "bounce");
        assert_eq!(events[0].data["details"], "550 mailbox unavailable");
        assert_eq!(events[1].event, "unsubscribe_request");
        assert_eq!(events[1].data["email"], "b@acme.com");
    }

    #[tokio::test]
    async fn empty_batch_is_acknowledged() {
        let store = MemoryStore::new();
        let ack = handle_delivery_webhook(&store, &WebhookBatch { events: vec![] })
            .await
            .unwrap();
        assert_eq!(ack.count, 0);
        assert!(ack.received);
    }
}
