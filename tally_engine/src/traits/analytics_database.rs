use thiserror::Error;

use crate::traits::{AttributionManagement, MetricManagement};

/// The highest level of behaviour for storage backends supporting the analytics engine.
#[allow(async_fn_in_trait)]
pub trait AnalyticsDatabase: Clone + MetricManagement + AttributionManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), AnalyticsError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AnalyticsError {
    #[error("Invalid input. {0}")]
    ValidationError(String),
    #[error("The store is busy. The request can be retried. {0}")]
    TransientStoreError(String),
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("A stored record could not be decoded. {0}")]
    CorruptRecord(String),
}

impl AnalyticsError {
    /// Whether the caller can expect the same request to succeed if it is retried later.
    pub fn is_transient(&self) -> bool {
        matches!(self, AnalyticsError::TransientStoreError(_))
    }
}

// Primary SQLite result codes for SQLITE_BUSY and SQLITE_LOCKED. Extended codes carry these in the low byte.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl From<sqlx::Error> for AnalyticsError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db_err) => {
                let primary_code = db_err.code().and_then(|c| c.parse::<i32>().ok()).map(|c| c & 0xff);
                match primary_code {
                    Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => AnalyticsError::TransientStoreError(e.to_string()),
                    _ => AnalyticsError::DatabaseError(e.to_string()),
                }
            },
            sqlx::Error::PoolTimedOut => AnalyticsError::TransientStoreError(e.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => AnalyticsError::CorruptRecord(e.to_string()),
            _ => AnalyticsError::DatabaseError(e.to_string()),
        }
    }
}
