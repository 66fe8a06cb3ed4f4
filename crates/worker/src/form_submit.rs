//! Form submit processor.

use async_trait::async_trait;
use etl_core::{
    Error, EventKind, EventPayload, FormSubmissionRecord, InteractionRecord, ParsedEvent,
    ProcessStatus, RawEvent, Result, RowOutcome,
};
use etl_store::{reconcile, Store};
use telemetry::metrics;

use crate::processor::Processor;

pub struct FormSubmitProcessor {
    store: Store,
}

impl FormSubmitProcessor {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

/// The submission row plus the `form_submit` interaction mirrored into user events.
pub fn form_submission_record(
    parsed: &ParsedEvent,
    document: &serde_json::Value,
) -> Result<FormSubmissionRecord> {
    let EventPayload::FormSubmit(payload) = &parsed.payload else {
        return Err(Error::internal("form processor received a non-form payload"));
    };
    let envelope = &parsed.envelope;

    let interaction = InteractionRecord {
        sequence: 0,
        session_id: envelope.session_id.clone(),
        visitor_id: envelope.visitor_id.clone(),
        site_id: envelope.site_id.clone(),
        event_type: EventKind::FormSubmit.as_str().to_string(),
        event_time: envelope.occurred_at,
        url: envelope.url.clone(),
        path: envelope.path.clone(),
        element_tag: Some("form".to_string()),
        element_class: None,
        element_id: None,
        element_text: None,
        scroll_percentage: None,
        form_id: Some(payload.form_id.clone()),
        payload: document.clone(),
    };

    Ok(FormSubmissionRecord {
        session_id: envelope.session_id.clone(),
        visitor_id: envelope.visitor_id.clone(),
        site_id: envelope.site_id.clone(),
        form_id: payload.form_id.clone(),
        action: payload.action.clone(),
        method: payload.method.clone(),
        url: envelope.url.clone(),
        path: envelope.path.clone(),
        submit_time: envelope.occurred_at,
        field_count: payload.field_count,
        fields: payload.fields.clone(),
        interaction,
    })
}

#[async_trait]
impl Processor for FormSubmitProcessor {
    fn kind(&self) -> EventKind {
        EventKind::FormSubmit
    }

    async fn apply(&self, raw: &RawEvent) -> Result<RowOutcome> {
        let parsed = ParsedEvent::parse(EventKind::FormSubmit, raw);
        let record = form_submission_record(&parsed, &raw.payload)?;
        let status = ProcessStatus::from_defaulted(parsed.defaulted);

        let outcome = reconcile::apply_form_submission(&self.store, raw.id, status, &record).await?;
        if matches!(outcome, RowOutcome::Processed(_)) {
            metrics().user_events_written.inc();
        }
        Ok(outcome)
    }
}
