use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use tally_engine::{broadcast::BroadcastError, AnalyticsError, IngestError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("The store is busy. Try again shortly. {0}")]
    StoreBusy(String),
    #[error("Invalid input. {0}")]
    ValidationError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("Could not read query parameters: {0}")]
    InvalidQuery(String),
    #[error("No tenant was supplied in the {0} header")]
    MissingTenant(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The server is shutting down")]
    ShuttingDown,
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::MissingTenant(_) => StatusCode::UNAUTHORIZED,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::StoreBusy(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<AnalyticsError> for ServerError {
    fn from(e: AnalyticsError) -> Self {
        match e {
            AnalyticsError::ValidationError(s) => Self::ValidationError(s),
            AnalyticsError::TransientStoreError(s) => Self::StoreBusy(s),
            AnalyticsError::DatabaseError(s) => Self::BackendError(format!("Database error: {s}")),
            AnalyticsError::CorruptRecord(s) => Self::BackendError(format!("Corrupt record: {s}")),
        }
    }
}

impl From<IngestError> for ServerError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::InvalidRecord { .. } => Self::ValidationError(e.to_string()),
            IngestError::Store(e) => e.into(),
        }
    }
}

impl From<BroadcastError> for ServerError {
    fn from(e: BroadcastError) -> Self {
        match e {
            BroadcastError::UnknownConnection(_) => Self::NoRecordFound(e.to_string()),
            BroadcastError::ShutDown => Self::ShuttingDown,
            BroadcastError::Store(e) => e.into(),
        }
    }
}
