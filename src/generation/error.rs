use std::time::Duration;

use actix_web::HttpResponse;
use thiserror::Error;

use super::engine::EngineError;
use super::validation::ValidationError;
use crate::ErrorResponse;

/// Errors that can occur while turning a request into a rendered report.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("failed to read JSON source: {0}")]
    SourceRead(String),
    #[error("Format '{0}' is not supported. Use: PDF, XLSX, HTML, DOC")]
    UnsupportedFormat(String),
    #[error("report engine failure: {0}")]
    Engine(#[from] EngineError),
    #[error("report engine did not become available within {0:?}")]
    EngineBusy(Duration),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl GenerationError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Caller mistakes, as opposed to failures of the service itself.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::UnsupportedFormat(_))
    }
}

impl From<GenerationError> for HttpResponse {
    fn from(error: GenerationError) -> Self {
        let body = ErrorResponse::new(&error.to_string());
        if error.is_client_error() {
            HttpResponse::BadRequest().json(body)
        } else {
            HttpResponse::InternalServerError().json(body)
        }
    }
}
