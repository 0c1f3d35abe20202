//! FxBridge Common Types
//!
//! Shared types used across the FxBridge crates: the rate sources, the
//! normalized rate record, the error taxonomy, decimal helpers and the
//! business-day calendar used by the update scheduler.

pub mod source;
pub mod record;
pub mod monetary;
pub mod error;
pub mod time;

pub use source::*;
pub use record::*;
pub use monetary::*;
pub use error::*;
pub use time::*;
