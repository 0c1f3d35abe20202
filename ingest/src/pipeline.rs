//! Fetch → parse → normalize → store.

use chrono::NaiveDate;
use fxbridge_common::{RatesResult, Source};
use fxbridge_store::RateStore;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::fetcher::SourceFetcher;
use crate::parser::{normalize, parse};

/// The ingestion unit shared by the scheduler and on-demand lookups.
pub struct Ingestor {
    fetcher: Arc<dyn SourceFetcher>,
    store: Arc<RateStore>,
}

impl Ingestor {
    pub fn new(fetcher: Arc<dyn SourceFetcher>, store: Arc<RateStore>) -> Self {
        Self { fetcher, store }
    }

    /// The store records are written to.
    pub fn store(&self) -> &Arc<RateStore> {
        &self.store
    }

    /// Fetch one response and store every record it normalizes to.
    ///
    /// Records are written one by one and the first failing write aborts the
    /// rest. Returns the number of records stored.
    #[instrument(skip(self), fields(fetcher = self.fetcher.name()))]
    pub async fn ingest(&self, source: Source, currency: Option<&str>) -> RatesResult<usize> {
        let body = self.fetcher.fetch(source, currency).await?;
        let records = normalize(parse(source, &body)?)?;

        for record in &records {
            self.store.store(record).await?;
        }

        debug!(source = %source, stored = records.len(), "Ingested response");
        Ok(records.len())
    }

    /// Refresh everything the service holds for `source`.
    ///
    /// RU publishes a full snapshot, so one ingest covers it. TH is queried
    /// currency by currency for the codes already stored, in code order; with
    /// nothing stored yet a single unfiltered query seeds the store.
    #[instrument(skip(self))]
    pub async fn refresh_source(&self, source: Source) -> RatesResult<usize> {
        let stored = match source {
            Source::Ru => self.ingest(source, None).await?,
            Source::Th => {
                let codes = self.known_codes(source).await?;
                if codes.is_empty() {
                    self.ingest(source, None).await?
                } else {
                    let mut stored = 0;
                    for code in &codes {
                        stored += self.ingest(source, Some(code)).await?;
                    }
                    stored
                }
            }
        };

        info!(source = %source, stored, "Source refreshed");
        Ok(stored)
    }

    /// Codes currently stored for `source`, sorted.
    pub async fn known_codes(&self, source: Source) -> RatesResult<Vec<String>> {
        let mut codes: Vec<String> = self
            .store
            .get_all_by_source(source.code())
            .await?
            .into_iter()
            .filter(|record| record.is_found() && !source.is_base_currency(&record.code))
            .map(|record| record.code)
            .collect();
        codes.sort();
        codes.dedup();
        Ok(codes)
    }

    /// Date every stored record of `source` is current through.
    ///
    /// This is the oldest publication date among the stored records, so one
    /// fresh currency never hides stale ones.
    pub async fn stored_through(&self, source: Source) -> RatesResult<Option<NaiveDate>> {
        Ok(self
            .store
            .get_all_by_source(source.code())
            .await?
            .iter()
            .filter(|record| record.is_found())
            .filter_map(|record| record.parsed_date())
            .min())
    }
}
