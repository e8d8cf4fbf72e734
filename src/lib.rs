//! spx - Forward HTTP/HTTPS proxy
//!
//! ## Features
//!
//! - HTTPS tunneling through `CONNECT`
//! - Plain HTTP forwarding with hop-by-hop proxy header filtering
//! - Round-robin rotation over HTTP parent proxies
//! - Optional Basic proxy authentication

pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod proxy;

pub use config::Config;
pub use error::{Result, SpxError};
