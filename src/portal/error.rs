//! Subscription portal client errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("portal credentials not configured")]
    MissingCredentials,

    #[error("invalid portal URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("portal returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}
