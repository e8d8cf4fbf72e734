//! Proxy request handler
//!
//! Authenticates each request, then either opens a CONNECT tunnel or
//! relays the request upstream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::ext::ReasonPhrase;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::upgrade::OnUpgrade;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tracing::{debug, info, instrument, warn};

use crate::config::ProxyConfig;
use crate::error::{Result, SpxError};
use crate::proxy::headers::filter_proxy_headers;
use crate::proxy::middleware::ProxyAuth;
use crate::proxy::rotation::ProxySelector;
use crate::proxy::transport::ProxyTransport;
use crate::proxy::tunnel::{Tunnel, TunnelHandler};

/// Body type of every response the proxy sends
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Configuration for proxy handler
#[derive(Clone, Debug)]
pub struct ProxyHandlerConfig {
    /// Timeout for CONNECT dials and upstream TCP connects
    pub connect_timeout: Duration,
    /// Timeout for the upstream round trip, `None` waits indefinitely
    pub request_timeout: Option<Duration>,
    /// How long pooled upstream connections may sit idle
    pub pool_idle_timeout: Duration,
}

impl Default for ProxyHandlerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: None,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

impl From<&ProxyConfig> for ProxyHandlerConfig {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            request_timeout: config.request_timeout(),
            pool_idle_timeout: config.pool_idle_timeout(),
        }
    }
}

/// Proxy request handler
pub struct ProxyHandler {
    auth: ProxyAuth,
    transport: ProxyTransport,
    config: ProxyHandlerConfig,
}

impl ProxyHandler {
    pub fn new(
        auth: ProxyAuth,
        selector: Arc<dyn ProxySelector>,
        config: ProxyHandlerConfig,
    ) -> Result<Self> {
        let transport = ProxyTransport::new(selector, &config)?;
        Ok(Self {
            auth,
            transport,
            config,
        })
    }

    /// Handle an incoming proxy request
    #[instrument(skip(self, req), fields(method = %req.method(), client = %client_addr))]
    pub async fn handle(
        &self,
        req: Request<Incoming>,
        client_addr: SocketAddr,
    ) -> Response<ProxyBody> {
        if self.auth.validate(&req).is_err() {
            return self
                .auth
                .challenge_response::<Full<Bytes>>()
                .map(|body| body.map_err(|never| match never {}).boxed());
        }

        if req.method() == Method::CONNECT {
            self.handle_connect(req).await
        } else {
            self.handle_http(req).await
        }
    }

    /// Handle HTTP CONNECT request (HTTPS tunneling)
    async fn handle_connect<B>(&self, mut req: Request<B>) -> Response<ProxyBody> {
        let uri = req.uri();
        let authority = uri
            .authority()
            .map(|a| a.to_string())
            .unwrap_or_else(|| uri.to_string());

        info!("{} {}", req.method(), authority);

        // Nothing is sent to the client until the target answered
        let target = match TunnelHandler::dial(&authority, self.config.connect_timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("CONNECT to {} failed: {}", authority, e);
                return error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string());
            }
        };

        let Some(on_upgrade) = req.extensions_mut().remove::<OnUpgrade>() else {
            let e = SpxError::HijackUnsupported;
            warn!("CONNECT to {} failed: {}", authority, e);
            return error_response(e.status_code(), &e.to_string());
        };

        tokio::spawn(async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    let client = TokioIo::new(upgraded);
                    Tunnel::open(client, target).closed().await;
                }
                Err(e) => {
                    debug!("CONNECT upgrade failed: {}", e);
                }
            }
        });

        debug!("CONNECT tunnel established to {}", authority);

        let mut response = Response::new(empty());
        response
            .extensions_mut()
            .insert(ReasonPhrase::from_static(b"Connection Established"));
        response
    }

    /// Handle regular HTTP request
    async fn handle_http(&self, mut req: Request<Incoming>) -> Response<ProxyBody> {
        info!("{} {}", req.method(), req.uri());

        filter_proxy_headers(req.headers_mut());

        match self.transport.dispatch(req).await {
            Ok(response) => {
                debug!(status = %response.status(), "Upstream responded");
                response.map(|body| body.boxed())
            }
            Err(e) => {
                warn!("Upstream request failed: {}", e);
                error_response(StatusCode::SERVICE_UNAVAILABLE, &e.to_string())
            }
        }
    }
}

/// Create a plain-text error response
fn error_response(status: StatusCode, message: &str) -> Response<ProxyBody> {
    let mut response = Response::new(full(message.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn empty() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

fn full<T: Into<Bytes>>(chunk: T) -> ProxyBody {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::rotation::RoundRobinSelector;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_error_response_is_plain_text() {
        let response = error_response(StatusCode::SERVICE_UNAVAILABLE, "connection refused");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from("connection refused"));
    }

    #[tokio::test]
    async fn test_connect_without_upgrade_returns_503() {
        let target = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target_addr = target.local_addr().unwrap();

        let handler = ProxyHandler::new(
            ProxyAuth::disabled(),
            Arc::new(RoundRobinSelector::default()),
            ProxyHandlerConfig::default(),
        )
        .unwrap();

        // Built by hand, so there is no connection to take over
        let req = Request::builder()
            .method(Method::CONNECT)
            .uri(target_addr.to_string())
            .body(Empty::<Bytes>::new())
            .unwrap();

        let response = handler.handle_connect(req).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.extensions().get::<ReasonPhrase>().is_none());

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, Bytes::from(SpxError::HijackUnsupported.to_string()));
    }

    #[test]
    fn test_handler_config_from_proxy_config() {
        let proxy = ProxyConfig {
            connect_timeout: 5,
            request_timeout: Some(20),
            ..ProxyConfig::default()
        };
        let config = ProxyHandlerConfig::from(&proxy);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(20)));
        assert_eq!(config.pool_idle_timeout, Duration::from_secs(90));
    }
}
