//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the per-stream session logic and the port
//! interfaces that define how it talks to the transport and to the
//! market data provider.

/// Port interfaces for external systems (transport stream, price source).
pub mod ports;

/// Application services: quote resolution and stream sessions.
pub mod services;
