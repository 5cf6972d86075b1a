//! Domain Layer - Core quote types and business rules.
//!
//! This layer contains the quote types exchanged over a stream with no
//! transport or provider dependencies.

/// Quote request/response types, symbols and lookup outcomes.
pub mod quote;
