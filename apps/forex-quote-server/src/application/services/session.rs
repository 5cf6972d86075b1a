//! Quote Session (Stream Controller)
//!
//! Mediates between transport flow control and quote processing for one
//! client stream. The session never holds more than one unanswered inbound
//! item and never writes faster than the transport absorbs.
//!
//! # Protocol
//!
//! ```text
//!   transport                       session
//!   ─────────                       ───────
//!   on_ready (writable) ──────────► ready: false → true (CAS, once)
//!                       ◄────────── request(1)
//!   item k              ──────────► resolve, send response k
//!                       ◄────────── request(1)
//!   item k+1            ──────────► ...
//!   complete / error    ──────────► terminate (no more writes or demand)
//! ```
//!
//! Readiness may fire any number of times from any thread; only the call
//! that wins the flag transition issues the initial demand. After that,
//! demand is replenished only when an item has been fully processed.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::resolver::QuoteResolver;
use crate::application::ports::{QuoteStream, StreamError};
use crate::domain::quote::{QuoteRequest, QuoteResponse};
use crate::infrastructure::metrics;

// =============================================================================
// Types
// =============================================================================

/// Unique identifier for a session.
pub type SessionId = u64;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client signalled it has sent all its items.
    ClientCompleted,
    /// The client stream failed (malformed message, reset, cancellation).
    ClientError(String),
    /// Writing a response to the client failed.
    WriteFailed,
    /// The server cancelled the session (shutdown or eviction).
    Cancelled,
}

impl SessionEnd {
    /// Short label used for metrics and logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ClientCompleted => "client_completed",
            Self::ClientError(_) => "client_error",
            Self::WriteFailed => "write_failed",
            Self::Cancelled => "cancelled",
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// State and behavior of one open client stream.
pub struct QuoteSession {
    id: SessionId,
    stream: Arc<dyn QuoteStream>,
    resolver: QuoteResolver,
    ready: AtomicBool,
    closed: AtomicBool,
    /// Items requested from the transport and not yet delivered.
    demand: AtomicUsize,
    responses_sent: AtomicU64,
    end: Mutex<Option<SessionEnd>>,
}

impl fmt::Debug for QuoteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuoteSession")
            .field("id", &self.id)
            .field("ready", &self.is_ready())
            .field("closed", &self.is_closed())
            .field("demand", &self.outstanding_demand())
            .field("responses_sent", &self.responses_sent())
            .finish_non_exhaustive()
    }
}

impl QuoteSession {
    /// Open a session on a freshly accepted stream.
    ///
    /// The transport is expected to call [`QuoteSession::on_ready`] once its
    /// outbound direction becomes writable.
    #[must_use]
    pub fn open(stream: Arc<dyn QuoteStream>, resolver: QuoteResolver) -> Arc<Self> {
        let id = uuid::Uuid::new_v4().as_u64_pair().0;
        metrics::record_session_opened();
        tracing::info!(session_id = id, "Quote session opened");

        Arc::new(Self {
            id,
            stream,
            resolver,
            ready: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            demand: AtomicUsize::new(0),
            responses_sent: AtomicU64::new(0),
            end: Mutex::new(None),
        })
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Whether the readiness transition has happened.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Whether the session has terminated.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Items requested from the transport and not yet received.
    #[must_use]
    pub fn outstanding_demand(&self) -> usize {
        self.demand.load(Ordering::Acquire)
    }

    /// Responses successfully written.
    #[must_use]
    pub fn responses_sent(&self) -> u64 {
        self.responses_sent.load(Ordering::Relaxed)
    }

    /// Why the session ended, once it has.
    #[must_use]
    pub fn end_reason(&self) -> Option<SessionEnd> {
        self.end.lock().clone()
    }

    /// Readiness callback.
    ///
    /// Returns `true` only for the single call that flipped the readiness
    /// flag and issued the initial demand of one item.
    pub fn on_ready(&self) -> bool {
        if self.is_closed() || !self.stream.is_ready() {
            return false;
        }

        if self
            .ready
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        tracing::info!(session_id = self.id, "Quote session ready");
        self.request_more(1);
        true
    }

    /// Handle one inbound item: resolve, respond, then ask for the next.
    ///
    /// Items arriving after termination are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError`] when the response cannot be written; the
    /// session is terminated with [`SessionEnd::WriteFailed`].
    pub async fn on_item(&self, request: QuoteRequest) -> Result<(), StreamError> {
        if self.is_closed() {
            tracing::debug!(
                session_id = self.id,
                symbol = %request.symbol,
                "Item after close dropped"
            );
            return Err(StreamError::Terminated);
        }

        if self
            .demand
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| d.checked_sub(1))
            .is_err()
        {
            tracing::warn!(session_id = self.id, "Item delivered without outstanding demand");
        }

        let resolution = self.resolver.resolve(&request.symbol).await;
        let resolved = resolution.is_ok();
        let response = QuoteResponse::from_resolution(request.symbol, &resolution);

        if self.is_closed() {
            return Err(StreamError::Terminated);
        }

        if let Err(e) = self.stream.send(response).await {
            self.terminate(SessionEnd::WriteFailed);
            return Err(e);
        }
        metrics::record_quote_served(resolved);

        let sent = self.responses_sent.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(session_id = self.id, responses_sent = sent, "Response sent");

        self.request_more(1);
        Ok(())
    }

    /// Client-side stream error.
    pub fn on_error(&self, cause: &str) {
        if self.terminate(SessionEnd::ClientError(cause.to_string())) {
            tracing::error!(session_id = self.id, error = %cause, "Quote stream failed");
        }
    }

    /// Client half-close.
    pub fn on_complete(&self) {
        self.terminate(SessionEnd::ClientCompleted);
    }

    /// Server-initiated termination.
    pub fn cancel(&self) {
        self.terminate(SessionEnd::Cancelled);
    }

    fn request_more(&self, count: usize) {
        if self.is_closed() {
            return;
        }
        self.demand.fetch_add(count, Ordering::AcqRel);
        self.stream.request(count);
    }

    /// Returns `true` if this call ended the session.
    fn terminate(&self, reason: SessionEnd) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        metrics::record_session_closed(reason.as_str());
        tracing::info!(
            session_id = self.id,
            reason = reason.as_str(),
            responses_sent = self.responses_sent(),
            "Quote session closed"
        );
        *self.end.lock() = Some(reason);
        true
    }
}

// =============================================================================
// Tests
// =============================================================================
