use hyper::StatusCode;
use thiserror::Error;

/// Unified error type for the spx proxy
#[derive(Error, Debug)]
pub enum SpxError {
    // Authentication errors
    #[error("Proxy authentication required")]
    AuthenticationFailed,

    // Tunnel errors
    /// Carries the dial error text verbatim, it is what the client sees.
    #[error("{0}")]
    DialFailed(String),

    #[error("Proxy hijack error")]
    HijackUnsupported,

    // Upstream errors
    #[error("{0}")]
    Upstream(String),

    #[error("Operation timed out")]
    Timeout,

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Parent proxy errors
    #[error("Invalid proxy address: {0}")]
    InvalidProxyAddress(String),

    #[error("Unsupported proxy protocol: {0}")]
    UnsupportedProtocol(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for spx operations
pub type Result<T> = std::result::Result<T, SpxError>;

impl SpxError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            SpxError::InvalidRequest(_)
            | SpxError::InvalidProxyAddress(_)
            | SpxError::UnsupportedProtocol(_)
            | SpxError::InvalidConfig(_)
            | SpxError::Toml(_) => StatusCode::BAD_REQUEST,

            // 407 Proxy Authentication Required
            SpxError::AuthenticationFailed => StatusCode::PROXY_AUTHENTICATION_REQUIRED,

            // 503 Service Unavailable, nothing is retried
            SpxError::DialFailed(_)
            | SpxError::HijackUnsupported
            | SpxError::Upstream(_)
            | SpxError::Timeout => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            SpxError::Io(_) | SpxError::Http(_) | SpxError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

/// Render an error together with its `source()` chain, joined by `": "`.
///
/// hyper's client errors keep the useful part (`connection refused`,
/// `dns error`) several levels down, so the top-level message alone is
/// not enough to tell a client what went wrong.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

// Convert from hyper errors
impl From<hyper::Error> for SpxError {
    fn from(err: hyper::Error) -> Self {
        SpxError::Http(err.to_string())
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for SpxError {
    fn from(err: url::ParseError) -> Self {
        SpxError::InvalidProxyAddress(err.to_string())
    }
}
