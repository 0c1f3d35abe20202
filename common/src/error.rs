//! Error types for FxBridge.

use thiserror::Error;

/// Main error type for ingestion, storage and conversion.
///
/// Messages are safe to hand to API callers verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RatesError {
    /// Malformed query parameter.
    #[error("{0}")]
    InvalidInput(String),

    /// Currency is known not to be carried by the source.
    #[error("unsupported currency {code} for source {source_code}")]
    UnsupportedCurrency { source_code: String, code: String },

    /// Upstream answered that it does not carry the requested currency.
    #[error("source {source_code} does not offer currency {code}")]
    CurrencyNotOffered { source_code: String, code: String },

    /// Upstream timed out, refused the connection, or returned a non-2xx status.
    #[error("source {source_code} unavailable: {message}")]
    SourceUnavailable { source_code: String, message: String },

    /// Response body could not be decoded or normalized.
    #[error("malformed response from source {source_code}: {message}")]
    MalformedResponse { source_code: String, message: String },

    /// Store unreachable after the reconnect budget was spent.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A store command failed on a healthy connection.
    #[error("storage error: {0}")]
    Storage(String),

    /// The process-wide cancellation signal fired during a blocking wait.
    #[error("operation cancelled")]
    Cancelled,

    /// Arithmetic could not be carried out on the resolved rates.
    #[error("conversion failed: {0}")]
    ConversionError(String),

    /// Required configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl RatesError {
    /// Shorthand for [`RatesError::MalformedResponse`].
    pub fn malformed(source_code: impl Into<String>, message: impl Into<String>) -> Self {
        RatesError::MalformedResponse {
            source_code: source_code.into(),
            message: message.into(),
        }
    }

    /// Shorthand for [`RatesError::SourceUnavailable`].
    pub fn unavailable(source_code: impl Into<String>, message: impl Into<String>) -> Self {
        RatesError::SourceUnavailable {
            source_code: source_code.into(),
            message: message.into(),
        }
    }

    /// Check if a later attempt may succeed without any change on our side.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RatesError::SourceUnavailable { .. }
                | RatesError::StoreUnavailable(_)
                | RatesError::Storage(_)
        )
    }

    /// Get a stable error code for callers mapping errors to responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            RatesError::InvalidInput(_) => "INVALID_INPUT",
            RatesError::UnsupportedCurrency { .. } => "UNSUPPORTED_CURRENCY",
            RatesError::CurrencyNotOffered { .. } => "CURRENCY_NOT_OFFERED",
            RatesError::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE",
            RatesError::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            RatesError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            RatesError::Storage(_) => "STORAGE_ERROR",
            RatesError::Cancelled => "CANCELLED",
            RatesError::ConversionError(_) => "CONVERSION_ERROR",
            RatesError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Result type alias for FxBridge operations.
pub type RatesResult<T> = std::result::Result<T, RatesError>;
