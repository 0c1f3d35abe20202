//! Per-source update state.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use fxbridge_common::{effective_cutoff, Source};

/// Where a source stands relative to its daily cutoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    /// Before today's cutoff.
    Idle,
    /// Cutoff passed and the business date has not been ingested.
    Due,
    /// The current business date is already covered.
    Updated,
}

impl UpdatePhase {
    /// Check if a refresh should run.
    pub fn is_due(&self) -> bool {
        matches!(self, UpdatePhase::Due)
    }
}

/// Scheduler bookkeeping for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUpdateState {
    pub source: Source,
    /// Daily cutoff in the configured zone.
    pub cutoff: NaiveTime,
    /// Business date whose cutoff has been satisfied.
    pub updated_for: Option<NaiveDate>,
}

impl SourceUpdateState {
    pub fn new(source: Source, cutoff: NaiveTime) -> Self {
        Self {
            source,
            cutoff,
            updated_for: None,
        }
    }

    /// Business date the cutoff governing `now` belongs to.
    pub fn business_date(&self, now: NaiveDateTime) -> NaiveDate {
        effective_cutoff(now, self.cutoff).date()
    }

    /// Whether `now` is at or past the governing cutoff.
    pub fn cutoff_passed(&self, now: NaiveDateTime) -> bool {
        now >= effective_cutoff(now, self.cutoff)
    }

    /// Phase at `now`, given the date every stored record of the source is
    /// current through.
    pub fn phase(&self, now: NaiveDateTime, stored_through: Option<NaiveDate>) -> UpdatePhase {
        if !self.cutoff_passed(now) {
            return UpdatePhase::Idle;
        }

        let business = self.business_date(now);
        let stored_covers = stored_through.map_or(false, |date| date >= business);
        if self.updated_for == Some(business) || stored_covers {
            UpdatePhase::Updated
        } else {
            UpdatePhase::Due
        }
    }

    /// Record that the business date governing `now` is covered.
    pub fn mark_updated(&mut self, now: NaiveDateTime) {
        self.updated_for = Some(self.business_date(now));
    }
}
