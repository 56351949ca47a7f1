/// Error types for the Petgram client core
use gateway_client::GatewayError;
use petgram_cache::CacheError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Missing or malformed input, caught before any request
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthenticated(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        ClientError::Validation(message.into())
    }

    /// Text shown inline next to a form
    ///
    /// Gateway failures surface the service's own message untouched.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Gateway(GatewayError::Api { message, .. }) => message.clone(),
            other => other.to_string(),
        }
    }

    /// Page-level terminal state
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ClientError::NotFound(_) | ClientError::Gateway(GatewayError::NotFound(_))
        )
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
