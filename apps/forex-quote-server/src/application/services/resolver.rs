//! Quote Resolver
//!
//! Translates a symbol into a price through the blocking [`PriceSource`],
//! keeping the provider's failure modes away from the session.
//!
//! The lookup runs on tokio's blocking pool so a slow provider never
//! stalls the task that services a session's flow control. Each call is
//! bounded by a timeout; a lookup that outlives it keeps its blocking
//! thread until the provider returns, but its result is discarded.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::application::ports::PriceSource;
use crate::domain::quote::{LookupError, Resolution, Symbol};
use crate::infrastructure::metrics;

/// Default lookup bound.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves symbols to prices. Cheap to clone; holds no per-call state.
#[derive(Clone)]
pub struct QuoteResolver {
    source: Arc<dyn PriceSource>,
    timeout: Duration,
}

impl std::fmt::Debug for QuoteResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteResolver")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl QuoteResolver {
    /// Create a resolver over `source` with the default timeout.
    #[must_use]
    pub fn new(source: Arc<dyn PriceSource>) -> Self {
        Self::with_timeout(source, DEFAULT_LOOKUP_TIMEOUT)
    }

    /// Create a resolver with an explicit lookup bound.
    #[must_use]
    pub fn with_timeout(source: Arc<dyn PriceSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// The configured lookup bound.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve `raw_symbol` to a price.
    ///
    /// Never panics and never propagates past the returned [`Resolution`];
    /// invalid symbols fail without reaching the provider.
    pub async fn resolve(&self, raw_symbol: &str) -> Resolution {
        let symbol = Symbol::parse(raw_symbol)?;
        let started = Instant::now();

        let source = Arc::clone(&self.source);
        let lookup_symbol = symbol.clone();
        let task = tokio::task::spawn_blocking(move || source.lookup_forex_price(&lookup_symbol));

        let resolution = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(LookupError::Panicked(join_error.to_string())),
            Err(_) => Err(LookupError::Timeout(self.timeout)),
        };

        metrics::record_lookup_duration(started.elapsed());
        match &resolution {
            Ok(price) => {
                tracing::debug!(symbol = %symbol, price = %price, "Quote resolved");
            }
            Err(e) => {
                metrics::record_lookup_failure(e.kind());
                tracing::warn!(symbol = %symbol, error = %e, "Quote lookup failed");
            }
        }

        resolution
    }
}

// =============================================================================
// Tests
// =============================================================================
