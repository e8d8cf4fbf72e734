//! Proxy middleware for authentication

mod auth;

pub use auth::{ProxyAuth, ProxyCredentials, PROXY_AUTH_CHALLENGE};
