//! Daily update scheduler.
//!
//! Re-evaluates every configured source once per tick and refreshes the ones
//! whose cutoff has passed without the business date being ingested. Errors
//! are logged and contained; a failing source is retried on the next tick and
//! never blocks the others.

use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use fxbridge_common::Source;
use fxbridge_ingest::Ingestor;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::metrics::SharedMetrics;
use crate::state::{SourceUpdateState, UpdatePhase};

/// Why the scheduler loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerExit {
    /// Cancellation was requested.
    Stopped,
}

/// Drives scheduled refreshes.
pub struct Scheduler {
    ingestor: Arc<Ingestor>,
    states: Vec<SourceUpdateState>,
    interval: Duration,
    time_zone: Tz,
    metrics: SharedMetrics,
}

impl Scheduler {
    pub fn new(
        ingestor: Arc<Ingestor>,
        states: Vec<SourceUpdateState>,
        interval: Duration,
        time_zone: Tz,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            ingestor,
            states,
            interval,
            time_zone,
            metrics,
        }
    }

    /// State of `source`, if scheduled.
    pub fn state(&self, source: Source) -> Option<&SourceUpdateState> {
        self.states.iter().find(|state| state.source == source)
    }

    /// Evaluate every source at `now` and refresh the due ones.
    ///
    /// Returns each source's phase after the tick.
    #[instrument(skip(self))]
    pub async fn tick_at(&mut self, now: NaiveDateTime) -> Vec<(Source, UpdatePhase)> {
        let mut phases = Vec::with_capacity(self.states.len());

        for state in &mut self.states {
            let source = state.source;

            if !state.cutoff_passed(now) {
                phases.push((source, UpdatePhase::Idle));
                continue;
            }
            if state.updated_for == Some(state.business_date(now)) {
                phases.push((source, UpdatePhase::Updated));
                continue;
            }

            let stored_through = match self.ingestor.stored_through(source).await {
                Ok(date) => date,
                Err(e) => {
                    warn!(source = %source, error = %e, "Could not read stored rate date");
                    None
                }
            };
            if !state.phase(now, stored_through).is_due() {
                debug!(source = %source, "Stored rates already cover the business date");
                state.mark_updated(now);
                phases.push((source, UpdatePhase::Updated));
                continue;
            }

            info!(source = %source, business_date = %state.business_date(now), "Source due for refresh");
            self.metrics.refresh_started();
            match self.ingestor.refresh_source(source).await {
                Ok(stored) => {
                    self.metrics.refresh_succeeded(stored);
                    state.mark_updated(now);
                    phases.push((source, UpdatePhase::Updated));
                }
                Err(e) => {
                    self.metrics.refresh_failed();
                    warn!(
                        source = %source,
                        error = %e,
                        code = e.error_code(),
                        "Scheduled refresh failed"
                    );
                    phases.push((source, UpdatePhase::Due));
                }
            }
        }

        phases
    }

    /// Tick immediately, then once per interval, until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) -> SchedulerExit {
        info!(
            sources = self.states.len(),
            interval_secs = self.interval.as_secs(),
            time_zone = %self.time_zone,
            "Scheduler started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let now = Utc::now().with_timezone(&self.time_zone).naive_local();
            self.tick_at(now).await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Scheduler stopped");
        SchedulerExit::Stopped
    }
}
