//! Pageview processor: seeds and extends sessions, stores page views.

use async_trait::async_trait;
use etl_core::{
    classify_referrer, Error, EventKind, EventPayload, PageviewRecord, ParsedEvent, ProcessStatus,
    RawEvent, Result, RowOutcome,
};
use etl_store::{reconcile, Store};

use crate::enrichment::DeviceEnricher;
use crate::processor::Processor;

pub struct PageviewProcessor {
    store: Store,
    enricher: DeviceEnricher,
}

impl PageviewProcessor {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            enricher: DeviceEnricher::new(),
        }
    }
}

/// Builds the session seed and pageview row for a parsed pageview.
pub fn pageview_record(parsed: &ParsedEvent, enricher: &DeviceEnricher) -> Result<PageviewRecord> {
    let EventPayload::Pageview(payload) = &parsed.payload else {
        return Err(Error::internal("pageview processor received a non-pageview payload"));
    };
    let envelope = &parsed.envelope;

    let referrer_type = classify_referrer(
        payload.referrer.as_deref(),
        &envelope.url,
        payload.campaign.medium.as_deref(),
    );

    let mut device = enricher.snapshot(envelope.user_agent.as_deref());
    device.screen_resolution = payload.screen_resolution.clone();
    device.language = payload.language.clone();

    Ok(PageviewRecord {
        session_id: envelope.session_id.clone(),
        visitor_id: envelope.visitor_id.clone(),
        site_id: envelope.site_id.clone(),
        url: envelope.url.clone(),
        path: envelope.path.clone(),
        title: payload.title.clone(),
        view_time: envelope.occurred_at,
        referrer: payload.referrer.clone(),
        referrer_type,
        campaign: payload.campaign.clone(),
        device,
    })
}

#[async_trait]
impl Processor for PageviewProcessor {
    fn kind(&self) -> EventKind {
        EventKind::Pageview
    }

    async fn apply(&self, raw: &RawEvent) -> Result<RowOutcome> {
        let parsed = ParsedEvent::parse(EventKind::Pageview, raw);
        let record = pageview_record(&parsed, &self.enricher)?;
        let status = ProcessStatus::from_defaulted(parsed.defaulted);
        reconcile::apply_pageview(&self.store, raw.id, status, &record).await
    }
}
