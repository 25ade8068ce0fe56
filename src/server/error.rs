use axum::response::IntoResponse;
use axum::Json;
use hyper::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::database::QueryError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("request failed to specify scraper")]
    MissingScraper,
    #[error("timestamp is not an integer: {0}")]
    MalformedSince(String),
    #[error("incremental update requires specifying current term")]
    MissingCurrentTerm,
    #[error("{0}")]
    InvalidBody(String),
    #[error("no such scraper: {0}")]
    UnknownScraper(String),
    #[error("no such term: {0}")]
    UnknownTerm(String),
    #[error("data not available yet")]
    Unavailable,
}

impl From<QueryError> for Error {
    fn from(error: QueryError) -> Self {
        match error {
            QueryError::Unavailable => Self::Unavailable,
            QueryError::UnknownScraper(id) => Self::UnknownScraper(id),
            QueryError::UnknownTerm(code) => Self::UnknownTerm(code),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Unavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string()).into_response()
            }
            // Client mistakes travel in the response envelope with a 200;
            // the browser clients look at the "error" key, not the status.
            _ => Json(json!({ "error": self.to_string() })).into_response(),
        }
    }
}
