//! gRPC Quote Server
//!
//! Implements the `StreamingQuote` gRPC service. Each `SnapQuote` call is a
//! bidirectional stream handled by one [`QuoteSession`]:
//!
//! 1. The call is accepted and a session is opened and registered
//! 2. A pump task waits for the outbound direction to become writable
//! 3. The session requests one inbound item at a time
//! 4. Each item is resolved and answered before the next is read
//! 5. The session is deregistered when the call ends
//!
//! [`QuoteSession`]: crate::application::services::QuoteSession

pub mod server;
pub mod stream;

// Allow clippy warnings and missing docs in generated code
#[allow(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::unwrap_used,
    clippy::expect_used
)]
pub mod proto {
    pub mod forex {
        pub mod v1 {
            include!(concat!(env!("OUT_DIR"), "/forex.v1.rs"));
        }
    }
}

pub use server::{QuoteServer, ServerError, bind, serve};
pub use stream::{Demand, GrpcQuoteStream};
