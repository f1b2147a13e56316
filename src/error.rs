//! Error types for the CircleCI provider.
//!
//! Two layers: [`ClientError`] describes what went wrong talking to the
//! CircleCI API, and [`ProviderError`] describes why a lifecycle operation
//! failed. Every `ProviderError` renders to a user-facing [`Diagnostic`].

use crate::schema::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

/// A structured error body returned by the CircleCI API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    /// HTTP status of the response that carried this error.
    #[serde(skip)]
    pub status: u16,
    /// Human-readable message from the API.
    pub message: String,
    /// Optional application-level error code.
    #[serde(default)]
    pub code: Option<i64>,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) if code != 0 => {
                write!(f, "CircleCI API error (code {}): {}", code, self.message)
            }
            _ => write!(f, "CircleCI API error: {}", self.message),
        }
    }
}

impl std::error::Error for ApiError {}

/// Errors returned by [`crate::client::CircleCiClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request never produced a response (DNS, TCP, TLS, timeout).
    #[error("failed to make request: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with status >= 400 and a structured error body.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The API answered with status >= 400 and a body that was not a
    /// structured error.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Response status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// A successful response body did not have the expected shape.
    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),

    /// The request body could not be serialized.
    #[error("failed to marshal request body: {0}")]
    Encode(#[source] serde_json::Error),
}

impl ClientError {
    /// The HTTP status code, if the API answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api(err) => Some(err.status),
            Self::Http { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|s| s.as_u16()),
            Self::Decode(_) | Self::Encode(_) => None,
        }
    }

    /// Whether the API reported that the object does not exist.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

/// Errors that can occur while serving a lifecycle operation.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested object was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The configuration failed a precondition before any API call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The provider is misconfigured or not configured yet.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// State could not be converted to or from its typed form.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A CircleCI API call failed.
    #[error("Unable to {action}, got error: {source}")]
    Client {
        /// What the provider was trying to do, e.g. "create context".
        action: String,
        /// The underlying client error.
        #[source]
        source: ClientError,
    },

    /// Operation failed due to current state (precondition not met).
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// The operation is not supported for this type.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// Invalid request from the host, such as a malformed import identifier.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The host wire protocol failed.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl ProviderError {
    /// Wrap a client error with the action that was being attempted.
    pub fn client(action: impl Into<String>, source: ClientError) -> Self {
        Self::Client {
            action: action.into(),
            source,
        }
    }

    /// Get the error message as a string.
    pub fn message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::FailedPrecondition(msg)
            | Self::Unimplemented(msg)
            | Self::InvalidRequest(msg)
            | Self::Protocol(msg) => msg.clone(),
            Self::Serialization(err) => err.to_string(),
            Self::Client { action, source } => {
                format!("Unable to {}, got error: {}", action, source)
            }
        }
    }

    /// Whether the underlying API call reported a missing object.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Client { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Render this error as a user-facing error diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let summary = match self {
            Self::NotFound(_) => "Not Found",
            Self::Validation(_) => "Validation Error",
            Self::Configuration(_) => "Provider Configuration Error",
            Self::UnknownResource(_) => "Unknown Type",
            Self::Serialization(_) => "State Conversion Error",
            Self::Client { .. } => "Client Error",
            Self::FailedPrecondition(_) => "Precondition Failed",
            Self::Unimplemented(_) => "Update Not Supported",
            Self::InvalidRequest(_) => "Unexpected Import Identifier",
            Self::Protocol(_) => "Protocol Error",
        };
        Diagnostic::error(summary).with_detail(self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(status: u16, code: Option<i64>) -> ApiError {
        ApiError {
            status,
            message: "Context not found".to_string(),
            code,
        }
    }

    #[test]
    fn test_api_error_display() {
        assert_eq!(
            api_error(404, Some(42)).to_string(),
            "CircleCI API error (code 42): Context not found"
        );
        assert_eq!(
            api_error(404, None).to_string(),
            "CircleCI API error: Context not found"
        );
    }

    #[test]
    fn test_client_error_status() {
        let err = ClientError::Api(api_error(404, None));
        assert_eq!(err.status(), Some(404));
        assert!(err.is_not_found());

        let err = ClientError::Http {
            status: 502,
            body: "<html>bad gateway</html>".to_string(),
        };
        assert_eq!(err.status(), Some(502));
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "HTTP 502: <html>bad gateway</html>");
    }

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("context shared".to_string());
        assert_eq!(format!("{}", err), "Resource not found: context shared");

        let err = ProviderError::Validation("invalid input".to_string());
        assert_eq!(format!("{}", err), "Validation error: invalid input");

        let err = ProviderError::UnknownResource("circleci_widget".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: circleci_widget");

        let err = ProviderError::client("read context", ClientError::Api(api_error(404, None)));
        assert_eq!(
            format!("{}", err),
            "Unable to read context, got error: CircleCI API error: Context not found"
        );
    }

    #[test]
    fn test_not_found_detection() {
        let err = ProviderError::client("read webhook", ClientError::Api(api_error(404, None)));
        assert!(err.is_not_found());

        let err = ProviderError::client(
            "read webhook",
            ClientError::Http {
                status: 500,
                body: String::new(),
            },
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_to_diagnostic() {
        let diag = ProviderError::Unimplemented("Contexts cannot be updated".to_string())
            .to_diagnostic();
        assert!(diag.is_error());
        assert_eq!(diag.summary, "Update Not Supported");
        assert_eq!(diag.detail.as_deref(), Some("Contexts cannot be updated"));

        let diag = ProviderError::InvalidRequest("bad id".to_string()).to_diagnostic();
        assert_eq!(diag.summary, "Unexpected Import Identifier");
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::Configuration("invalid config".to_string());
        assert_eq!(err.message(), "invalid config");

        let err = ProviderError::InvalidRequest("bad request".to_string());
        assert_eq!(err.message(), "bad request");
    }
}
