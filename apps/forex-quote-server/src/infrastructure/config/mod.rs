//! Configuration Module
//!
//! Configuration loading for the quote server.

mod settings;

pub use settings::{
    ConfigError, ProviderSettings, QuoteServerConfig, ServerSettings, SessionSettings,
};
