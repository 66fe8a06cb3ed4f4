//! Batch processor: unpacks client-side event batches into user events.

use async_trait::async_trait;
use etl_core::{
    Error, EventKind, EventPayload, InteractionRecord, ParsedEvent, ProcessStatus, RawEvent, Result,
    RowOutcome,
};
use etl_store::{reconcile, Store};
use telemetry::metrics;

use crate::processor::Processor;

pub struct BatchProcessor {
    store: Store,
}

impl BatchProcessor {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

/// One interaction per sub-event, in batch order, with the parent's context.
pub fn interaction_records(parsed: &ParsedEvent) -> Result<Vec<InteractionRecord>> {
    let EventPayload::Batch(payload) = &parsed.payload else {
        return Err(Error::internal("batch processor received a non-batch payload"));
    };
    let envelope = &parsed.envelope;

    Ok(payload
        .events
        .iter()
        .map(|sub| InteractionRecord {
            sequence: sub.sequence,
            session_id: envelope.session_id.clone(),
            visitor_id: envelope.visitor_id.clone(),
            site_id: envelope.site_id.clone(),
            event_type: sub.event_type.clone(),
            event_time: sub.occurred_at,
            url: envelope.url.clone(),
            path: envelope.path.clone(),
            element_tag: sub.element_tag.clone(),
            element_class: sub.element_class.clone(),
            element_id: sub.element_id.clone(),
            element_text: sub.element_text.clone(),
            scroll_percentage: sub.scroll_percentage,
            form_id: sub.form_id.clone(),
            payload: sub.document.clone(),
        })
        .collect())
}

#[async_trait]
impl Processor for BatchProcessor {
    fn kind(&self) -> EventKind {
        EventKind::Batch
    }

    async fn apply(&self, raw: &RawEvent) -> Result<RowOutcome> {
        let parsed = ParsedEvent::parse(EventKind::Batch, raw);
        let records = interaction_records(&parsed)?;
        let status = ProcessStatus::from_defaulted(parsed.defaulted);

        let session_id = &parsed.envelope.session_id;
        let outcome =
            reconcile::apply_interactions(&self.store, raw.id, status, session_id, &records).await?;
        if matches!(outcome, RowOutcome::Processed(_)) {
            metrics().user_events_written.inc_by(records.len() as u64);
        }
        Ok(outcome)
    }
}
