//! FxBridge Ingestion
//!
//! Fetches the upstream rate feeds, decodes them into typed per-source
//! models, normalizes those into [`RateRecord`](fxbridge_common::RateRecord)s
//! and writes them to the rate store.
//!
//! # Sources
//!
//! - RU: daily XML snapshot, `windows-1251`, one rate per currency.
//! - TH: JSON API queried over a date window, separate buy and sell rates,
//!   some currencies quoted per 100 or 1000 units.

pub mod config;
pub mod fetcher;
pub mod models;
pub mod parser;
pub mod pipeline;

pub use config::{FetcherConfig, SourceEndpoint};
pub use fetcher::{error_message, log_endpoints, HttpFetcher, RequestPlan, SourceFetcher};
pub use models::{RuDocument, RuValute, SourcePayload, ThDetail};
pub use parser::{denomination_multiplier, normalize, parse};
pub use pipeline::Ingestor;

#[cfg(any(test, feature = "test-utils"))]
pub use fetcher::ScriptedFetcher;
