//! Proxy server implementation
//!
//! This module provides the proxy server functionality including:
//! - Basic proxy authentication
//! - CONNECT tunnel for HTTPS
//! - Plain HTTP forwarding, direct or through rotated parent proxies

pub mod handler;
pub mod headers;
pub mod middleware;
pub mod rotation;
pub mod server;
pub mod transport;
pub mod tunnel;

pub use handler::{ProxyHandler, ProxyHandlerConfig};
pub use rotation::{ProxySelector, RoundRobinSelector};
pub use server::ProxyServer;
pub use transport::ProxyTransport;
pub use tunnel::{Tunnel, TunnelHandler};
