//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `QuoteResolver`: symbol to price through the price source port
//! - `QuoteSession`: per-stream flow control and lifecycle

mod resolver;
mod session;

pub use resolver::{DEFAULT_LOOKUP_TIMEOUT, QuoteResolver};
pub use session::{QuoteSession, SessionEnd, SessionId};
