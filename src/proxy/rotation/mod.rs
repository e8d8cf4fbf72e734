//! Parent proxy rotation
//!
//! Selectors hand out one configured parent proxy per outbound request.
//! `None` from [`ProxySelector::next`] means the request goes out directly.

mod round_robin;

pub use round_robin::RoundRobinSelector;

use std::sync::Arc;

use crate::models::ParentProxy;

/// Trait for parent proxy selection strategies
pub trait ProxySelector: Send + Sync {
    /// Pick the parent proxy for the next request
    ///
    /// Returns `None` when no parent proxies are configured.
    fn next(&self) -> Option<Arc<ParentProxy>>;

    /// All configured parent proxies, in rotation order
    fn proxies(&self) -> Vec<Arc<ParentProxy>>;

    /// Get the number of configured parent proxies
    fn available_count(&self) -> usize;

    /// Get the strategy name
    fn strategy_name(&self) -> &'static str;
}
