//! Background refresher.
//!
//! Each sweep walks one page of primary keys from the saved cursor,
//! re-renders eligible targets, repoints both keys at the new image and
//! deletes the superseded one. Item failures never abort the batch.

use capcache_client::{is_render_eligible, normalize};
use capcache_core::cache::target_from_primary;
use capcache_core::{CRON_CURSOR_KEY, CacheKeys, CacheRecord, Deadline, URL_KEY_PREFIX};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::capture::render::render_bounded;
use crate::capture::writer::{Recorded, upload_and_record};
use crate::state::AppState;

/// Counters for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub listed: usize,
    pub refreshed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Cursor saved for the next sweep; `None` once the listing completed.
    pub cursor: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Refreshed,
    Skipped,
    Failed,
}

/// Run one batch.
pub async fn sweep(state: &AppState) -> SweepReport {
    let kv = state.caps.kv.as_ref();
    let mut report = SweepReport::default();

    let cursor = match kv.get(CRON_CURSOR_KEY).await {
        Ok(cursor) => cursor.filter(|c| !c.is_empty()),
        Err(e) => {
            tracing::warn!(error = %e, "refresh cursor unreadable, starting from the beginning");
            None
        }
    };

    let page = match kv.list(URL_KEY_PREFIX, cursor.as_deref(), state.config.refresh.batch_size).await {
        Ok(page) => page,
        Err(e) => {
            tracing::warn!(error = %e, "refresh listing failed");
            report.cursor = cursor;
            return report;
        }
    };

    report.listed = page.keys.len();
    for key in &page.keys {
        match refresh_one(state, key).await {
            ItemOutcome::Refreshed => report.refreshed += 1,
            ItemOutcome::Skipped => report.skipped += 1,
            ItemOutcome::Failed => report.failed += 1,
        }
    }

    if page.list_complete {
        if let Err(e) = kv.delete(CRON_CURSOR_KEY).await {
            tracing::warn!(error = %e, "refresh cursor delete failed");
        }
    } else if let Some(next) = page.cursor {
        if let Err(e) = kv.put(CRON_CURSOR_KEY, &next).await {
            tracing::warn!(error = %e, "refresh cursor save failed");
        }
        report.cursor = Some(next);
    }

    report
}

async fn refresh_one(state: &AppState, key: &str) -> ItemOutcome {
    let Some(target) = target_from_primary(key).and_then(|raw| normalize(raw).ok()) else {
        tracing::debug!(key, "refresh skip: unparseable key");
        return ItemOutcome::Skipped;
    };
    if !is_render_eligible(&target, &state.config.root_domain) {
        tracing::debug!(key, "refresh skip: not eligible");
        return ItemOutcome::Skipped;
    }

    let deadline = Deadline::from_timeouts(&state.config.timeouts);
    let outcome = state.caps.fetch.preflight(&target, deadline.budget(state.config.timeouts.preflight())).await;
    if !outcome.is_ok() {
        tracing::debug!(key, outcome = outcome.code(), "refresh skip: preflight");
        return ItemOutcome::Skipped;
    }

    let png = match render_bounded(state, &target, &deadline).await {
        Ok(png) => png,
        Err(e) => {
            tracing::warn!(key, error = %e, "refresh render failed");
            return ItemOutcome::Failed;
        }
    };

    let keys = CacheKeys::for_target(&target);
    let previous = previous_image_id(state, &keys).await;

    match upload_and_record(&state.caps, &keys, png).await {
        Ok(Recorded { image, written: true }) => {
            if let Some(old) = previous.filter(|old| *old != image.id) {
                if let Err(e) = state.caps.images.delete(&old).await {
                    tracing::warn!(key, id = %old, error = %e, "superseded image delete failed");
                }
            }
            ItemOutcome::Refreshed
        }
        Ok(Recorded { image, written: false }) => {
            tracing::warn!(key, id = %image.id, "refresh cache write incomplete, keeping previous image");
            ItemOutcome::Failed
        }
        Err(e) => {
            tracing::warn!(key, error = %e, "refresh upload failed");
            ItemOutcome::Failed
        }
    }
}

/// Image id of the primary record, else of the legacy record.
async fn previous_image_id(state: &AppState, keys: &CacheKeys) -> Option<String> {
    let delivery_host = &state.config.images.delivery_host;
    for key in keys.read_order() {
        match state.caps.kv.get(key).await {
            Ok(Some(raw)) => {
                if let Some(id) = CacheRecord::parse(&raw).image_id(delivery_host) {
                    return Some(id);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::debug!(key, error = %e, "previous record unreadable"),
        }
    }
    None
}

/// Sweep on every interval tick until `shutdown` flips.
pub async fn run(state: &AppState, mut shutdown: watch::Receiver<bool>) {
    let period = state.config.refresh.interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(interval_secs = period.as_secs(), "refresher started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = sweep(state).await;
                tracing::info!(
                    listed = report.listed,
                    refreshed = report.refreshed,
                    skipped = report.skipped,
                    failed = report.failed,
                    cursor = ?report.cursor,
                    "refresh sweep done"
                );
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::info!("refresher stopped");
}
