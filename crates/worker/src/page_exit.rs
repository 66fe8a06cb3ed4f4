//! Page exit processor: closes sessions and the dwell time of the last view.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use etl_core::{
    Error, EventKind, EventPayload, PageExitRecord, ParsedEvent, ProcessStatus, RawEvent, Result,
    RowOutcome,
};
use etl_store::{fetch_ready_exits, reconcile, Store};
use tracing::{debug, warn};

use crate::processor::Processor;

pub struct PageExitProcessor {
    store: Store,
    /// How long an exit may wait for its session's first pageview.
    orphan_grace: Duration,
}

impl PageExitProcessor {
    pub fn new(store: Store, orphan_grace_secs: i64) -> Self {
        Self {
            store,
            orphan_grace: Duration::seconds(orphan_grace_secs.max(0)),
        }
    }

    /// Exits ingested at or before this instant no longer wait for their session.
    fn grace_cutoff(&self) -> DateTime<Utc> {
        Utc::now() - self.orphan_grace
    }

    /// Whether an exit for a missing session should stop waiting.
    fn grace_expired(&self, raw: &RawEvent) -> bool {
        raw.ingested_at <= self.grace_cutoff()
    }
}

pub fn page_exit_record(parsed: &ParsedEvent) -> Result<PageExitRecord> {
    let EventPayload::PageExit(payload) = &parsed.payload else {
        return Err(Error::internal("page exit processor received a non-exit payload"));
    };
    let envelope = &parsed.envelope;

    Ok(PageExitRecord {
        session_id: envelope.session_id.clone(),
        url: envelope.url.clone(),
        path: envelope.path.clone(),
        exit_time: envelope.occurred_at,
        time_on_page_secs: payload.time_on_page_secs,
    })
}

#[async_trait]
impl Processor for PageExitProcessor {
    fn kind(&self) -> EventKind {
        EventKind::PageExit
    }

    async fn fetch(&self, store: &Store, limit: i64) -> Result<Vec<RawEvent>> {
        fetch_ready_exits(store, limit, self.grace_cutoff()).await
    }

    async fn apply(&self, raw: &RawEvent) -> Result<RowOutcome> {
        let parsed = ParsedEvent::parse(EventKind::PageExit, raw);
        let record = page_exit_record(&parsed)?;
        let status = ProcessStatus::from_defaulted(parsed.defaulted);
        let allow_orphan = self.grace_expired(raw);

        let outcome =
            reconcile::apply_page_exit(&self.store, raw.id, status, &record, allow_orphan).await?;
        match outcome {
            RowOutcome::Deferred => {
                debug!(
                    raw_event_id = raw.id,
                    session_id = %record.session_id,
                    "Exit deferred, session not seen yet"
                );
            }
            RowOutcome::Processed(ProcessStatus::Defaulted) if allow_orphan => {
                warn!(
                    raw_event_id = raw.id,
                    session_id = %record.session_id,
                    "Exit past the orphan grace window, marked defaulted"
                );
            }
            _ => {}
        }
        Ok(outcome)
    }
}
