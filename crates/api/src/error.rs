//! Transport Error Types

use concept_visualizer_core::CoreError;
use thiserror::Error;

/// Errors from the REST client and the realtime transport.
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP request failed before a response arrived.
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Non-2xx status code.
    #[error("HTTP error {status}: {body}")]
    HttpError { status: u16, body: String },

    /// Failed to parse response body.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A base URL or endpoint could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// WebSocket / channel protocol failure.
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Payload could not be normalized into a task document.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type alias for transport errors
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Any non-2xx response counts; a payload that cannot be parsed will not
    /// improve by asking again.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_)
            | ApiError::Timeout(_)
            | ApiError::Realtime(_)
            | ApiError::HttpError { .. } => true,
            ApiError::InvalidResponse(_) | ApiError::InvalidUrl(_) | ApiError::Core(_) => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else if err.is_connect() {
            ApiError::Network(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<url::ParseError> for ApiError {
    fn from(err: url::ParseError) -> Self {
        ApiError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ApiError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ApiError::Realtime(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let err = ApiError::HttpError {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP error 503: unavailable");
    }

    #[test]
    fn test_transient_classification() {
        assert!(ApiError::Network("reset".into()).is_transient());
        assert!(ApiError::HttpError { status: 502, body: String::new() }.is_transient());
        assert!(ApiError::HttpError { status: 404, body: String::new() }.is_transient());
        assert!(!ApiError::InvalidResponse("bad json".into()).is_transient());
    }

    #[test]
    fn test_url_error_conversion() {
        let err: ApiError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, ApiError::InvalidUrl(_)));
    }
}
