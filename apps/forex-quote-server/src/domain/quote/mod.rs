//! Quote Types
//!
//! Domain types for a single quote exchange: the inbound request, the
//! outbound response, the validated symbol, and the typed outcome of a
//! price lookup.
//!
//! # Sentinel Price
//!
//! A failed lookup is carried as a [`LookupError`] all the way to response
//! construction, where it collapses to [`SENTINEL_PRICE`]. Clients must read
//! a zero price as "unavailable", never as a literal quote.

use std::fmt;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

// =============================================================================
// Constants
// =============================================================================

/// Price sent to the client when the lookup fails.
pub const SENTINEL_PRICE: f64 = 0.0;

/// Longest symbol accepted from a client.
pub const MAX_SYMBOL_LEN: usize = 32;

/// Suffix the provider uses for currency-pair tickers.
const FX_SUFFIX: &str = "=X";

// =============================================================================
// Symbol
// =============================================================================

/// A validated exchange-pair ticker such as `EURUSD` or `EURUSD=X`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol(String);

impl Symbol {
    /// Parse a client-supplied symbol.
    ///
    /// Surrounding whitespace is trimmed. The remainder must be non-empty,
    /// at most [`MAX_SYMBOL_LEN`] characters, and made of ASCII
    /// alphanumerics, `=`, `-`, `.` or `^`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::InvalidSymbol`] when the input fails validation.
    pub fn parse(raw: &str) -> Result<Self, LookupError> {
        let trimmed = raw.trim();

        if trimmed.is_empty() {
            return Err(LookupError::InvalidSymbol {
                symbol: raw.to_string(),
                reason: "symbol is empty",
            });
        }

        if trimmed.len() > MAX_SYMBOL_LEN {
            return Err(LookupError::InvalidSymbol {
                symbol: raw.to_string(),
                reason: "symbol is too long",
            });
        }

        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '=' | '-' | '.' | '^'))
        {
            return Err(LookupError::InvalidSymbol {
                symbol: raw.to_string(),
                reason: "symbol contains unsupported characters",
            });
        }

        Ok(Self(trimmed.to_string()))
    }

    /// The symbol as sent by the client (trimmed).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The ticker the market data provider expects.
    ///
    /// Bare six-letter currency pairs get the provider's FX suffix
    /// (`eurusd` becomes `EURUSD=X`); anything else is upper-cased as is.
    #[must_use]
    pub fn provider_symbol(&self) -> String {
        let upper = self.0.to_ascii_uppercase();
        if upper.len() == 6 && upper.chars().all(|c| c.is_ascii_alphabetic()) {
            format!("{upper}{FX_SUFFIX}")
        } else {
            upper
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Request / Response
// =============================================================================

/// One inbound stream item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    /// Requested ticker exactly as received.
    pub symbol: String,
}

impl QuoteRequest {
    /// Create a request for `symbol`.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
        }
    }
}

/// One outbound stream item.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteResponse {
    /// Echo of the request's symbol, unchanged.
    pub symbol: String,
    /// Quoted price, or [`SENTINEL_PRICE`] when unavailable.
    pub price: f64,
}

impl QuoteResponse {
    /// Build the response for `symbol` from a lookup outcome.
    ///
    /// This is the only place a [`LookupError`] is collapsed into the
    /// sentinel price.
    #[must_use]
    pub fn from_resolution(symbol: String, resolution: &Resolution) -> Self {
        let price = match resolution {
            Ok(price) => decimal_to_f64(*price),
            Err(_) => SENTINEL_PRICE,
        };
        Self { symbol, price }
    }
}

fn decimal_to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(SENTINEL_PRICE)
}

// =============================================================================
// Lookup Outcome
// =============================================================================

/// Outcome of resolving one symbol.
pub type Resolution = Result<Decimal, LookupError>;

/// Why a price could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// The client sent a symbol that fails validation.
    #[error("invalid symbol {symbol:?}: {reason}")]
    InvalidSymbol {
        /// Raw symbol as received.
        symbol: String,
        /// Validation failure.
        reason: &'static str,
    },

    /// The provider does not know the symbol.
    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    /// Network or HTTP failure talking to the provider.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The provider answered with data that cannot be read as a price.
    #[error("malformed upstream response: {0}")]
    Malformed(String),

    /// The lookup did not finish within the configured bound.
    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),

    /// The lookup task aborted before producing a result.
    #[error("lookup task failed: {0}")]
    Panicked(String),
}

impl LookupError {
    /// Short label used for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSymbol { .. } => "invalid_symbol",
            Self::UnknownSymbol(_) => "unknown_symbol",
            Self::Upstream(_) => "upstream",
            Self::Malformed(_) => "malformed",
            Self::Timeout(_) => "timeout",
            Self::Panicked(_) => "panicked",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
