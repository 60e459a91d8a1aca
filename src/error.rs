use std::time::Duration;
use thiserror::Error;

use crate::response::HttpResponse;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// HTTP client error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// The request was cancelled by its timeout timer
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Malformed proxy URL in client configuration
    #[error("Invalid proxy URL '{url}': {reason}")]
    InvalidProxy {
        /// The proxy URL that failed to parse
        url: String,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Codec encoder construction or write failure
    #[error("Compression failed: {0}")]
    Compression(#[source] std::io::Error),

    /// The configured redirect maximum was exceeded.
    ///
    /// Carries the last hop's response so callers can still inspect the
    /// status, headers, and body of the redirect that was not followed.
    #[error("Maximum redirects reached ({max})")]
    RedirectLimit {
        /// The configured redirect maximum
        max: usize,
        /// The last response received before the chain was cut off
        response: Box<HttpResponse>,
    },

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// HTTP non-2xx status
    #[error("HTTP {status}: {body_preview}")]
    HttpStatus {
        status: http::StatusCode,
        body_preview: String,
        content_type: Option<String>,
    },

    /// JSON serialization or deserialization error
    #[error("JSON failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Query/form URL encoding error
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field
    /// contains a diagnostic message intended for logging only; do not match
    /// on its contents as the format is unstable.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Invalid URL scheme for transport security configuration
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme {
        /// The URL scheme that was rejected
        scheme: String,
        /// Reason the scheme was rejected
        reason: String,
    },
}

impl HttpError {
    /// Whether this error was caused by a timeout.
    ///
    /// True for the `Timeout` variant (the request's own timer fired) and for
    /// `Transport` errors whose source chain contains a timed-out I/O
    /// operation or a hyper-level timeout. Callers should check this
    /// predicate rather than match a dedicated error kind.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            HttpError::Timeout(_) => true,
            HttpError::Transport(source) => chain_has_timeout(source.as_ref()),
            _ => false,
        }
    }
}

/// Walk an error chain looking for network-level timeout indicators.
fn chain_has_timeout(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        if let Some(hyper_err) = e.downcast_ref::<hyper::Error>() {
            if hyper_err.is_timeout() {
                return true;
            }
        }
        if e.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
            return true;
        }
        current = e.source();
    }
    false
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::fmt;

    #[derive(Debug)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl Error for TestError {}

    #[test]
    fn test_transport_error_preserves_source() {
        let inner = TestError("connection refused");
        let err = HttpError::Transport(Box::new(inner));

        let source = err.source();
        assert!(source.is_some(), "Transport error should have a source");

        let source = source.unwrap();
        let downcast = source.downcast_ref::<TestError>();
        assert!(downcast.is_some(), "Should downcast to TestError");
        assert_eq!(downcast.unwrap().0, "connection refused");
    }

    #[test]
    fn test_timeout_variant_is_timeout() {
        let err = HttpError::Timeout(Duration::from_millis(50));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_transport_io_timed_out_is_timeout() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline elapsed");
        let err = HttpError::Transport(Box::new(io));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_transport_other_io_is_not_timeout() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = HttpError::Transport(Box::new(io));
        assert!(!err.is_timeout());
    }

    /// Timeout indicators are found anywhere in the chain, not just at the top.
    #[test]
    fn test_nested_timeout_detected() {
        #[derive(Debug)]
        struct Wrapper(std::io::Error);

        impl fmt::Display for Wrapper {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "wrapped: {}", self.0)
            }
        }

        impl Error for Wrapper {
            fn source(&self) -> Option<&(dyn Error + 'static)> {
                Some(&self.0)
            }
        }

        let inner = std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline elapsed");
        let err = HttpError::Transport(Box::new(Wrapper(inner)));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_non_transport_kinds_are_not_timeout() {
        let err = HttpError::InvalidProxy {
            url: ":::".to_owned(),
            reason: "bad".to_owned(),
        };
        assert!(!err.is_timeout());
    }
}
