//! Proxy authentication middleware
//!
//! Handles Basic authentication for the proxy server.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hyper::header::{HeaderValue, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION};
use hyper::{Request, Response, StatusCode};
use tracing::{debug, trace, warn};

use crate::error::{Result, SpxError};

/// Challenge sent with every 407
pub const PROXY_AUTH_CHALLENGE: &str = "Basic realm=\"Password\"";

/// Configured proxy secret in both accepted encodings
///
/// Empty when either the username or the password is unset, which turns
/// authentication off.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProxyCredentials {
    raw: String,
    encoded: String,
}

impl ProxyCredentials {
    pub fn new(username: &str, password: &str) -> Self {
        if username.is_empty() || password.is_empty() {
            return Self::default();
        }

        let raw = format!("{}:{}", username, password);
        let encoded = BASE64.encode(raw.as_bytes());
        Self { raw, encoded }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Exact comparison against the raw or the base64 form, no normalization
    fn matches(&self, token: &str) -> bool {
        !token.is_empty() && (token == self.raw || token == self.encoded)
    }
}

impl std::fmt::Debug for ProxyCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyCredentials")
            .field("enabled", &!self.is_empty())
            .finish()
    }
}

/// Proxy authentication handler
#[derive(Clone, Debug)]
pub struct ProxyAuth {
    credentials: ProxyCredentials,
}

impl ProxyAuth {
    /// Create a new proxy auth handler
    pub fn new(credentials: ProxyCredentials) -> Self {
        Self { credentials }
    }

    /// Create a disabled auth handler
    pub fn disabled() -> Self {
        Self::new(ProxyCredentials::default())
    }

    /// Check if authentication is enabled
    pub fn is_enabled(&self) -> bool {
        !self.credentials.is_empty()
    }

    /// Validate the Proxy-Authorization header
    pub fn validate<T>(&self, req: &Request<T>) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }

        let header = req
            .headers()
            .get(PROXY_AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let token = header.strip_prefix("Basic ").unwrap_or(header);

        trace!(token = %token, "Proxy credentials presented");

        if self.credentials.matches(token) {
            debug!("Proxy authentication successful");
            Ok(())
        } else {
            warn!("Accessing proxy denied, password is wrong or empty");
            Err(SpxError::AuthenticationFailed)
        }
    }

    /// Create a 407 Proxy Authentication Required response
    pub fn challenge_response<T>(&self) -> Response<T>
    where
        T: Default,
    {
        let mut response = Response::new(T::default());
        *response.status_mut() = StatusCode::PROXY_AUTHENTICATION_REQUIRED;
        response.headers_mut().insert(
            PROXY_AUTHENTICATE,
            HeaderValue::from_static(PROXY_AUTH_CHALLENGE),
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::Full;

    fn create_request_with_auth(auth: Option<&str>) -> Request<Full<Bytes>> {
        let mut builder = Request::builder().uri("http://example.com/");

        if let Some(auth_value) = auth {
            builder = builder.header(PROXY_AUTHORIZATION, auth_value);
        }

        builder.body(Full::new(Bytes::new())).unwrap()
    }

    fn enabled_auth() -> ProxyAuth {
        ProxyAuth::new(ProxyCredentials::new("user", "pass"))
    }

    #[test]
    fn test_auth_disabled() {
        let auth = ProxyAuth::disabled();
        assert!(!auth.is_enabled());
        assert!(auth.validate(&create_request_with_auth(None)).is_ok());
        assert!(auth
            .validate(&create_request_with_auth(Some("Basic garbage")))
            .is_ok());
    }

    #[test]
    fn test_auth_disabled_without_password() {
        let auth = ProxyAuth::new(ProxyCredentials::new("user", ""));
        assert!(!auth.is_enabled());
        assert!(auth.validate(&create_request_with_auth(None)).is_ok());
    }

    #[test]
    fn test_auth_missing_header() {
        let req = create_request_with_auth(None);
        assert!(matches!(
            enabled_auth().validate(&req),
            Err(SpxError::AuthenticationFailed)
        ));
    }

    #[test]
    fn test_auth_valid_base64_credentials() {
        let credentials = BASE64.encode(b"user:pass");
        let req = create_request_with_auth(Some(&format!("Basic {}", credentials)));
        tokio_test::assert_ok!(enabled_auth().validate(&req));
    }

    #[test]
    fn test_auth_valid_raw_credentials() {
        let req = create_request_with_auth(Some("Basic user:pass"));
        tokio_test::assert_ok!(enabled_auth().validate(&req));
    }

    #[test]
    fn test_auth_invalid_credentials() {
        let credentials = BASE64.encode(b"wrong:wrong");
        let req = create_request_with_auth(Some(&format!("Basic {}", credentials)));
        tokio_test::assert_err!(enabled_auth().validate(&req));
    }

    #[test]
    fn test_auth_empty_token() {
        let req = create_request_with_auth(Some("Basic "));
        tokio_test::assert_err!(enabled_auth().validate(&req));
    }

    #[test]
    fn test_auth_is_exact_match() {
        let encoded = BASE64.encode(b"user:pass");
        for value in [
            format!("Basic  {}", encoded),
            format!("Basic {} ", encoded),
            "Basic USER:PASS".to_string(),
        ] {
            let req = create_request_with_auth(Some(&value));
            assert!(enabled_auth().validate(&req).is_err(), "accepted {:?}", value);
        }
    }

    #[test]
    fn test_challenge_response() {
        let response: Response<Full<Bytes>> = enabled_auth().challenge_response();
        assert_eq!(response.status(), StatusCode::PROXY_AUTHENTICATION_REQUIRED);
        assert_eq!(
            response.headers().get(PROXY_AUTHENTICATE).unwrap(),
            "Basic realm=\"Password\""
        );
    }
}
