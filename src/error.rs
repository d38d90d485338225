//! Error types for the HashiCups provider.

use thiserror::Error;

use crate::schema::Diagnostics;

/// Errors surfaced to the host by provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// An internal SDK error occurred.
    #[error("SDK error: {0}")]
    Sdk(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// Invalid request from the host.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The operation reported error diagnostics.
    #[error("{0}")]
    Diagnostics(Diagnostics),
}

impl ProviderError {
    /// Get the error message as a string.
    ///
    /// For [`ProviderError::Diagnostics`] this is the summary of the first error.
    pub fn message(&self) -> &str {
        match self {
            Self::Sdk(msg) => msg,
            Self::Configuration(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::InvalidRequest(msg) => msg,
            Self::Diagnostics(diags) => diags
                .errors()
                .next()
                .map(|d| d.summary.as_str())
                .unwrap_or("operation failed"),
        }
    }

    /// The diagnostics carried by this error, if any.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            Self::Diagnostics(diags) => Some(diags),
            _ => None,
        }
    }
}

impl From<Diagnostics> for ProviderError {
    fn from(diags: Diagnostics) -> Self {
        Self::Diagnostics(diags)
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Configuration(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::Sdk(msg) => tonic::Status::internal(msg),
            ProviderError::InvalidRequest(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Diagnostics(diags) => {
                tonic::Status::failed_precondition(diags.to_string())
            },
        }
    }
}

/// Errors returned by the HashiCups API client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request could not be sent or the response body could not be read.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered 404 for the given path.
    #[error("not found: {0}")]
    NotFound(String),

    /// The API answered with an unexpected status code.
    #[error("status: {status}, body: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The configured host is not a usable base URL.
    #[error("invalid host URL: {0}")]
    InvalidUrl(String),
}
