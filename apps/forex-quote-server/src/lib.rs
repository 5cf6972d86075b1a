#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Forex Quote Server - Streaming FX Quotes over gRPC
//!
//! A gRPC service that answers a bidirectional stream of currency-pair
//! requests with one price quote per request. Each client stream is paced
//! by the server: an item is read only after the previous one has been
//! answered, so a slow provider or a slow client never causes unbounded
//! buffering.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Quote types and lookup errors
//!   - `quote`: symbols, requests, responses, sentinel price
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: price source and transport stream interfaces
//!   - `services`: quote resolver, per-stream session controller
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `grpc`: tonic service, stream adapter, session registry
//!   - `yahoo`: HTTP price source
//!   - `config`: environment configuration
//!   - `health`: health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! client ──QuoteRequest──► pump ──► QuoteSession ──► QuoteResolver ──► PriceSource
//!        ◄─QuoteResponse── outbound channel ◄──────────┘ (price or 0.0)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Quote types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::quote::{
    LookupError, QuoteRequest, QuoteResponse, Resolution, SENTINEL_PRICE, Symbol,
};

// Ports and services
pub use application::ports::{PriceSource, QuoteStream, StreamError};
pub use application::services::{QuoteResolver, QuoteSession, SessionEnd, SessionId};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, ProviderSettings, QuoteServerConfig, ServerSettings, SessionSettings,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// gRPC server (for integration tests)
pub use infrastructure::grpc::{
    QuoteServer, ServerError, bind as bind_grpc, proto::forex::v1 as proto, serve as serve_grpc,
};

// Price source
pub use infrastructure::yahoo::YahooFxClient;

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
