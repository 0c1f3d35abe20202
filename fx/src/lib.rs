//! FxBridge Conversion Service
//!
//! Converts amounts between currencies using the rates stored for one
//! source, fetching missing currencies on demand and remembering those the
//! source does not carry.
//!
//! # Example
//!
//! ```rust,ignore
//! use fxbridge_fx::{ConversionConfig, ConversionService};
//!
//! let service = ConversionService::new(store, ingestor, ConversionConfig::default());
//!
//! let result = service.convert("TH", "USD", "THB", "1000", "buy").await?;
//! println!("{} {}", result.converted_amount, result.second);
//! ```

pub mod conversion;
pub mod engine;
pub mod negative;

pub use conversion::{convert_amount, format_amount, ConversionRequest, ConversionResult, Direction};
pub use engine::{ConversionConfig, ConversionService, ConversionStats};
pub use negative::NegativeCachePolicy;
