use thiserror::Error;

use crate::{helpers::MetricDateError, traits::AnalyticsError};

/// Errors raised while folding adapter records into metric merges and ledger writes.
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    #[error("Record {record} could not be normalised. {reason}")]
    InvalidRecord { record: String, reason: String },
    #[error(transparent)]
    Store(#[from] AnalyticsError),
}

impl IngestError {
    pub fn invalid<R: Into<String>, S: Into<String>>(record: R, reason: S) -> Self {
        Self::InvalidRecord { record: record.into(), reason: reason.into() }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, IngestError::Store(e) if e.is_transient())
    }
}

impl From<IngestError> for AnalyticsError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::InvalidRecord { .. } => AnalyticsError::ValidationError(e.to_string()),
            IngestError::Store(e) => e,
        }
    }
}

impl From<MetricDateError> for AnalyticsError {
    fn from(e: MetricDateError) -> Self {
        AnalyticsError::ValidationError(e.to_string())
    }
}
