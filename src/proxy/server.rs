//! Proxy server implementation using hyper
//!
//! Accepts client connections and serves each one on its own task.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::config::Config;
use crate::error::{Result, SpxError};
use crate::proxy::handler::{ProxyHandler, ProxyHandlerConfig};
use crate::proxy::middleware::{ProxyAuth, ProxyCredentials};
use crate::proxy::rotation::{ProxySelector, RoundRobinSelector};

/// Proxy server
pub struct ProxyServer {
    addr: String,
    handler: Arc<ProxyHandler>,
}

impl ProxyServer {
    /// Create a new proxy server from the resolved configuration
    pub fn new(config: &Config) -> Result<Self> {
        let credentials = ProxyCredentials::new(&config.common.username, &config.common.password);
        let auth = ProxyAuth::new(credentials);
        if auth.is_enabled() {
            info!("Proxy authentication enabled");
        }

        let selector: Arc<dyn ProxySelector> =
            Arc::new(RoundRobinSelector::configure(&config.proxy.parent_proxies)?);
        if selector.available_count() > 0 {
            info!(
                "Using {} parent proxies ({})",
                selector.available_count(),
                selector.strategy_name()
            );
        }

        let handler = ProxyHandler::new(auth, selector, ProxyHandlerConfig::from(&config.proxy))?;

        Ok(Self {
            addr: config.proxy_addr(),
            handler: Arc::new(handler),
        })
    }

    /// Bind the configured address and run until shutdown
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = self.addr.parse().map_err(|_| {
            SpxError::InvalidConfig(format!("Invalid proxy server address: {}", self.addr))
        })?;

        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Accept connections from `listener` until shutdown
    #[instrument(skip(self, listener, shutdown))]
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        info!("Proxy server listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, client_addr)) => {
                            let handler = self.handler.clone();

                            tokio::spawn(async move {
                                if let Err(e) = Self::handle_connection(
                                    stream,
                                    client_addr,
                                    handler,
                                ).await {
                                    debug!("Connection error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Proxy server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }

    /// Handle a single connection
    async fn handle_connection(
        stream: TcpStream,
        client_addr: SocketAddr,
        handler: Arc<ProxyHandler>,
    ) -> Result<()> {
        let io = TokioIo::new(stream);

        let service = service_fn(move |req: Request<Incoming>| {
            let handler = handler.clone();
            async move { Ok::<_, Infallible>(handler.handle(req, client_addr).await) }
        });

        http1::Builder::new()
            .preserve_header_case(true)
            .title_case_headers(true)
            .serve_connection(io, service)
            .with_upgrades()
            .await?;

        Ok(())
    }
}
