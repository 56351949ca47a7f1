//! Gateway error types

use thiserror::Error;

/// Errors raised while talking to the hosted backend.
///
/// `Api` carries the service's own message untouched so form-like callers can
/// show it verbatim.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Empty response from {0}")]
    EmptyResponse(String),
}

impl GatewayError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        GatewayError::Api {
            status,
            message: message.into(),
        }
    }

    /// HTTP-ish status code when the service answered
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Api { status, .. } => Some(*status),
            GatewayError::Http(e) => e.status().map(|s| s.as_u16()),
            GatewayError::NotFound(_) => Some(404),
            GatewayError::Unauthenticated => Some(401),
            _ => None,
        }
    }

    /// Unique-constraint violation reported by the row API
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
