//! Error types for gap-fill operations

use datafusion::error::DataFusionError;

#[derive(Debug, thiserror::Error)]
pub enum GapFillError {
    /// Invalid or inconsistent operator configuration. Raised before any
    /// row is processed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Column '{0}' not found in input schema")]
    MissingColumn(String),

    /// A target time literal that cannot be represented in the time column's
    /// domain. Fatal for the whole operation.
    #[error("Conversion error: cannot convert target '{target}' to {domain}: {reason}")]
    Conversion {
        target: String,
        domain: String,
        reason: String,
    },

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Invalid operator state: {0}")]
    InvalidState(String),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    #[error("DataFusion error: {0}")]
    DataFusion(Box<DataFusionError>),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Config file error: {0}")]
    ConfigFile(String),
}

impl GapFillError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// True for errors raised while validating configuration
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::MissingColumn(_))
    }
}

impl From<DataFusionError> for GapFillError {
    fn from(e: DataFusionError) -> Self {
        Self::DataFusion(Box::new(e))
    }
}

impl From<GapFillError> for DataFusionError {
    fn from(e: GapFillError) -> Self {
        match e {
            GapFillError::DataFusion(inner) => *inner,
            other => DataFusionError::External(Box::new(other)),
        }
    }
}

/// Result type for gap-fill operations
pub type Result<T> = std::result::Result<T, GapFillError>;
