//! FxBridge Service
//!
//! Wires the rate store, the ingestion pipeline and the conversion service
//! from one [`ServiceConfig`], and drives the daily update scheduler.

pub mod config;
pub mod metrics;
pub mod scheduler;
pub mod service;
pub mod state;

pub use config::{ServiceConfig, SourceSettings, StoreConfig};
pub use metrics::{IngestMetrics, MetricsSnapshot, SharedMetrics};
pub use scheduler::{Scheduler, SchedulerExit};
pub use service::RatesService;
pub use state::{SourceUpdateState, UpdatePhase};
