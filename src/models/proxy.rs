use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hyper::header::HeaderValue;
use hyper::Uri;
use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::{Result, SpxError};

/// Parent proxy protocol type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyProtocol {
    Http,
    Https,
}

impl ProxyProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyProtocol::Http => "http",
            ProxyProtocol::Https => "https",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "http" => Some(ProxyProtocol::Http),
            "https" => Some(ProxyProtocol::Https),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Prefix `http://` unless the entry already names a recognized scheme.
///
/// `proxy.example.com:8080` becomes `http://proxy.example.com:8080`.
pub fn normalize_proxy_url(raw: &str) -> String {
    let raw = raw.trim();
    let has_scheme = ["http://", "https://"].iter().any(|scheme| {
        raw.get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
    });

    if has_scheme {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    }
}

/// A configured upstream (parent) proxy
#[derive(Debug, Clone)]
pub struct ParentProxy {
    /// Position in the configured rotation
    pub id: usize,
    /// Normalized URL as configured, scheme included
    pub address: String,
    pub protocol: ProxyProtocol,
    /// `host:port` of the proxy, used for dialing and in logs
    pub authority: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ParentProxy {
    /// Parse one `proxy.parent_proxies` entry
    pub fn parse(id: usize, raw: &str) -> Result<Self> {
        let address = normalize_proxy_url(raw);
        let url = Url::parse(&address)?;

        let protocol = ProxyProtocol::from_str(url.scheme())
            .ok_or_else(|| SpxError::UnsupportedProtocol(url.scheme().to_string()))?;

        let host = url
            .host_str()
            .ok_or_else(|| SpxError::InvalidProxyAddress(format!("Missing host in {}", address)))?;
        let port = url.port_or_known_default().unwrap_or(80);

        // Userinfo comes back percent-encoded from the URL parser
        let username = if url.username().is_empty() {
            None
        } else {
            Some(decode_userinfo(url.username()))
        };
        let password = username
            .as_ref()
            .map(|_| decode_userinfo(url.password().unwrap_or_default()));

        Ok(Self {
            id,
            address,
            protocol,
            authority: format!("{}:{}", host, port),
            username,
            password,
        })
    }

    /// Dial target for the proxy connection
    pub fn uri(&self) -> Result<Uri> {
        format!("http://{}", self.authority)
            .parse()
            .map_err(|e: http::uri::InvalidUri| SpxError::InvalidProxyAddress(e.to_string()))
    }

    /// `Proxy-Authorization` value for this parent, if it has credentials
    pub fn authorization(&self) -> Option<HeaderValue> {
        let username = self.username.as_ref()?;
        let credentials = format!(
            "{}:{}",
            username,
            self.password.as_deref().unwrap_or_default()
        );
        HeaderValue::from_str(&format!("Basic {}", BASE64.encode(credentials))).ok()
    }
}

fn decode_userinfo(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

impl std::fmt::Display for ParentProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}", self.protocol, self.authority)
    }
}
