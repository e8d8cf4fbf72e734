//! Upstream transport for plain HTTP requests
//!
//! Sends forwarded requests either straight to the origin or through the
//! parent proxy picked by the selector. Every route owns a pooled hyper
//! client, so keep-alive connections are reused per origin when going
//! direct and per parent proxy otherwise.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use hyper::body::Incoming;
use hyper::header::PROXY_AUTHORIZATION;
use hyper::{Request, Response, Uri};
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::TcpStream;
use tower::Service;
use tracing::{debug, instrument};

use crate::error::{error_chain, Result, SpxError};
use crate::models::{ParentProxy, ProxyProtocol};
use crate::proxy::handler::ProxyHandlerConfig;
use crate::proxy::rotation::ProxySelector;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Proxy transport handler
///
/// Dispatches forwarded requests, consulting the selector once per request.
pub struct ProxyTransport {
    selector: Arc<dyn ProxySelector>,
    direct: Client<HttpConnector, Incoming>,
    parents: HashMap<usize, Client<ParentConnector, Incoming>>,
    request_timeout: Option<Duration>,
}

impl ProxyTransport {
    /// Build clients for direct dispatch and for every configured parent
    pub fn new(selector: Arc<dyn ProxySelector>, config: &ProxyHandlerConfig) -> Result<Self> {
        let direct = client_builder(config).build(http_connector(config));

        let mut parents = HashMap::new();
        for proxy in selector.proxies() {
            if proxy.protocol != ProxyProtocol::Http {
                return Err(SpxError::UnsupportedProtocol(format!(
                    "{} (parent proxy {} needs TLS, which is not supported)",
                    proxy.protocol, proxy
                )));
            }

            let connector = ParentConnector::new(&proxy, config)?;
            parents.insert(proxy.id, client_builder(config).build(connector));
        }

        Ok(Self {
            selector,
            direct,
            parents,
            request_timeout: config.request_timeout,
        })
    }

    /// Send a filtered request upstream and return the upstream response
    ///
    /// The response body is handed back unread so it can be streamed.
    #[instrument(skip(self, req), fields(method = %req.method(), uri = %req.uri()))]
    pub async fn dispatch(&self, mut req: Request<Incoming>) -> Result<Response<Incoming>> {
        if req.uri().scheme().is_none() || req.uri().authority().is_none() {
            return Err(SpxError::Upstream(format!(
                "unsupported request target {:?}: absolute-form URI required",
                req.uri().to_string()
            )));
        }

        let Some(proxy) = self.selector.next() else {
            debug!("Forwarding request directly");
            return self.send(&self.direct, req).await;
        };

        let client = self.parents.get(&proxy.id).ok_or_else(|| {
            SpxError::Internal(format!("No client configured for parent proxy {}", proxy))
        })?;

        if let Some(authorization) = proxy.authorization() {
            req.headers_mut().insert(PROXY_AUTHORIZATION, authorization);
        }

        debug!(parent = %proxy, "Forwarding request through parent proxy");
        self.send(client, req).await
    }

    async fn send<C>(
        &self,
        client: &Client<C, Incoming>,
        req: Request<Incoming>,
    ) -> Result<Response<Incoming>>
    where
        C: hyper_util::client::legacy::connect::Connect + Clone + Send + Sync + 'static,
    {
        let response = client.request(req);
        let response = match self.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, response)
                .await
                .map_err(|_| SpxError::Timeout)?,
            None => response.await,
        };

        response.map_err(|e| SpxError::Upstream(error_chain(&e)))
    }

    /// Parent proxies this transport can route through
    pub fn parent_count(&self) -> usize {
        self.parents.len()
    }
}

fn http_connector(config: &ProxyHandlerConfig) -> HttpConnector {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(config.connect_timeout));
    connector.set_nodelay(true);
    connector
}

fn client_builder(config: &ProxyHandlerConfig) -> hyper_util::client::legacy::Builder {
    let mut builder = Client::builder(TokioExecutor::new());
    builder
        .pool_idle_timeout(config.pool_idle_timeout)
        .http1_preserve_header_case(true)
        .http1_title_case_headers(true);
    builder
}

/// Connector that dials a fixed parent proxy whatever the request target is
#[derive(Clone)]
pub struct ParentConnector {
    proxy_uri: Uri,
    http: HttpConnector,
}

impl ParentConnector {
    pub fn new(proxy: &ParentProxy, config: &ProxyHandlerConfig) -> Result<Self> {
        Ok(Self {
            proxy_uri: proxy.uri()?,
            http: http_connector(config),
        })
    }
}

impl Service<Uri> for ParentConnector {
    type Response = ParentConnection;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = std::result::Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.http.poll_ready(cx).map_err(|e| Box::new(e) as BoxError)
    }

    fn call(&mut self, _dst: Uri) -> Self::Future {
        let connecting = self.http.call(self.proxy_uri.clone());
        Box::pin(async move {
            let io = connecting.await.map_err(|e| Box::new(e) as BoxError)?;
            Ok(ParentConnection(io))
        })
    }
}

/// TCP connection to a parent proxy
///
/// Reports itself as proxied so hyper keeps absolute-form request targets.
pub struct ParentConnection(TokioIo<TcpStream>);

impl Connection for ParentConnection {
    fn connected(&self) -> Connected {
        self.0.inner().connected().proxy(true)
    }
}

impl hyper::rt::Read for ParentConnection {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: hyper::rt::ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl hyper::rt::Write for ParentConnection {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.0.is_write_vectored()
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write_vectored(cx, bufs)
    }
}
