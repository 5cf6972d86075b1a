//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `PriceSource`: blocking lookup against the market data provider
//! - `QuoteStream`: the transport half of one client stream (writability,
//!   inbound demand, outbound writes)

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::quote::{LookupError, QuoteResponse, Symbol};

// =============================================================================
// Price Source
// =============================================================================

/// External market data lookup.
///
/// Implementations block the calling thread until the provider answers.
/// They must be safe to call concurrently from many sessions.
#[cfg_attr(test, mockall::automock)]
pub trait PriceSource: Send + Sync {
    /// Look up the current price of a currency pair.
    ///
    /// # Errors
    ///
    /// Returns a [`LookupError`] on I/O failure, unknown symbols or
    /// unreadable provider data.
    fn lookup_forex_price(&self, symbol: &Symbol) -> Result<Decimal, LookupError>;
}

// =============================================================================
// Quote Stream
// =============================================================================

/// Transport-side handle for one bidirectional stream.
///
/// The transport never delivers more inbound items than have been
/// requested through [`QuoteStream::request`].
#[async_trait]
pub trait QuoteStream: Send + Sync {
    /// Whether the outbound direction can accept a write without waiting.
    fn is_ready(&self) -> bool;

    /// Authorize the transport to deliver `count` more inbound items.
    fn request(&self, count: usize);

    /// Write one response, waiting for outbound capacity if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] if the outbound direction is gone.
    async fn send(&self, response: QuoteResponse) -> Result<(), StreamError>;
}

/// Transport failures seen by a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The client went away or the outbound half was closed.
    #[error("stream closed")]
    Closed,

    /// The session was already terminated when the write was attempted.
    #[error("session terminated")]
    Terminated,
}
