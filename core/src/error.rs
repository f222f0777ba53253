//! Error types for the ENSEK API client.
//!
//! # Design
//! Local caller mistakes (`UnknownOperation`, `MissingArgument`, `Config`)
//! are kept apart from remote outcomes. Remote failures are classified
//! strictly from the HTTP status code: `NotFound` gets its own variant
//! because callers routinely treat "no such resource" as a normal branch,
//! other 4xx responses land in `InvalidRequest`, and 5xx responses or
//! transport failures land in `Service`. Only `Service` is retryable.

use thiserror::Error;

/// Errors returned by `EnsekClient` and the pieces it is built from.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No operation is registered under the requested name.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// A path placeholder of the operation's template was not supplied.
    #[error("missing argument `{argument}` for operation {operation}")]
    MissingArgument { operation: String, argument: String },

    /// The server returned 404.
    #[error("404 {url}")]
    NotFound { url: String },

    /// The server returned a 4xx status other than 404.
    #[error("{status} {url}")]
    InvalidRequest { status: u16, url: String, body: String },

    /// The server returned a 5xx (or otherwise unexpected) status, or no
    /// response was obtained at all. `status` is `None` for the latter.
    #[error("{}", service_message(.status, .url, .message))]
    Service {
        status: Option<u16>,
        url: String,
        message: String,
    },

    /// Client construction parameters are inconsistent or unreadable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl ApiError {
    /// Whether another attempt of the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Service { .. })
    }

    /// HTTP status carried by the error, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::NotFound { .. } => Some(404),
            ApiError::InvalidRequest { status, .. } => Some(*status),
            ApiError::Service { status, .. } => *status,
            _ => None,
        }
    }
}

fn service_message(status: &Option<u16>, url: &str, message: &str) -> String {
    match status {
        Some(status) => format!("{status} {url}: {message}"),
        None => format!("request to {url} failed: {message}"),
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_service_errors_are_retryable() {
        let service = ApiError::Service {
            status: Some(503),
            url: "http://x/a".to_string(),
            message: "busy".to_string(),
        };
        let transport = ApiError::Service {
            status: None,
            url: "http://x/a".to_string(),
            message: "connection refused".to_string(),
        };
        let not_found = ApiError::NotFound {
            url: "http://x/a".to_string(),
        };
        let invalid = ApiError::InvalidRequest {
            status: 400,
            url: "http://x/a".to_string(),
            body: String::new(),
        };

        assert!(service.is_retryable());
        assert!(transport.is_retryable());
        assert!(!not_found.is_retryable());
        assert!(!invalid.is_retryable());
        assert!(!ApiError::UnknownOperation("get_nothing".to_string()).is_retryable());
        assert!(!ApiError::Config("bad".to_string()).is_retryable());
    }

    #[test]
    fn display_carries_status_and_url() {
        let err = ApiError::NotFound {
            url: "http://x/accounts/1".to_string(),
        };
        assert_eq!(err.to_string(), "404 http://x/accounts/1");

        let err = ApiError::Service {
            status: Some(500),
            url: "http://x/a".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "500 http://x/a: boom");

        let err = ApiError::Service {
            status: None,
            url: "http://x/a".to_string(),
            message: "timed out".to_string(),
        };
        assert_eq!(err.to_string(), "request to http://x/a failed: timed out");
    }

    #[test]
    fn status_accessor() {
        let err = ApiError::InvalidRequest {
            status: 422,
            url: String::new(),
            body: String::new(),
        };
        assert_eq!(err.status(), Some(422));
        assert_eq!(
            ApiError::MissingArgument {
                operation: "get_account".to_string(),
                argument: "account_id".to_string(),
            }
            .status(),
            None
        );
    }
}
