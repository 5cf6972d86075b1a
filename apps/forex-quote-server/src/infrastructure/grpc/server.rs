//! gRPC Quote Server Implementation
//!
//! Accepts `SnapQuote` calls, gives each its own session and pump task, and
//! keeps a registry of live sessions so they can be cancelled on shutdown.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_stream::Stream;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};

use super::proto::forex::v1::{
    self as proto,
    streaming_quote_server::{StreamingQuote, StreamingQuoteServer},
};
use super::stream::{Demand, GrpcQuoteStream, pump};
use crate::application::ports::QuoteStream;
use crate::application::services::{QuoteResolver, QuoteSession, SessionId};
use crate::infrastructure::config::SessionSettings;
use crate::infrastructure::metrics;

// =============================================================================
// Type Aliases
// =============================================================================

type StreamResult<T> = Result<Response<T>, Status>;
type BoxedStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

// =============================================================================
// Session Registry
// =============================================================================

/// Live sessions keyed by id.
///
/// Holds only each session's cancellation token; the session itself is
/// owned by its pump task.
#[derive(Debug, Default)]
struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, CancellationToken>>,
    opened: AtomicU64,
}

impl SessionRegistry {
    fn register(&self, id: SessionId, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        let active = {
            let mut sessions = self.sessions.lock();
            sessions.insert(id, token.clone());
            sessions.len()
        };
        self.opened.fetch_add(1, Ordering::Relaxed);
        metrics::set_active_sessions(active);
        token
    }

    fn remove(&self, id: SessionId) {
        let active = {
            let mut sessions = self.sessions.lock();
            sessions.remove(&id);
            sessions.len()
        };
        metrics::set_active_sessions(active);
    }

    fn len(&self) -> usize {
        self.sessions.lock().len()
    }
}

// =============================================================================
// Server Implementation
// =============================================================================

/// gRPC quote server.
#[derive(Debug)]
pub struct QuoteServer {
    resolver: QuoteResolver,
    settings: SessionSettings,
    registry: Arc<SessionRegistry>,
    shutdown: CancellationToken,
}

impl QuoteServer {
    /// Create a server that resolves quotes with `resolver`.
    #[must_use]
    pub fn new(resolver: QuoteResolver, settings: SessionSettings) -> Self {
        Self {
            resolver,
            settings,
            registry: Arc::new(SessionRegistry::default()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Number of sessions currently open.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    /// Number of sessions opened since start.
    #[must_use]
    pub fn sessions_opened(&self) -> u64 {
        self.registry.opened.load(Ordering::Relaxed)
    }

    /// Whether [`QuoteServer::shutdown`] has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancel every open session and refuse new calls.
    pub fn shutdown(&self) {
        tracing::info!(
            active_sessions = self.active_sessions(),
            "Cancelling quote sessions"
        );
        self.shutdown.cancel();
    }

    /// Token cancelled when the server shuts down.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[tonic::async_trait]
impl StreamingQuote for QuoteServer {
    type SnapQuoteStream = BoxedStream<proto::QuoteResponse>;

    async fn snap_quote(
        &self,
        request: Request<Streaming<proto::QuoteRequest>>,
    ) -> StreamResult<Self::SnapQuoteStream> {
        if self.is_shutting_down() {
            return Err(Status::unavailable("server shutting down"));
        }

        let remote = request.remote_addr();
        let inbound = request.into_inner();

        let demand = Arc::new(Demand::new());
        let (stream, rx) =
            GrpcQuoteStream::open(self.settings.outbound_buffer, Arc::clone(&demand));
        let stream = Arc::new(stream);
        let session = QuoteSession::open(
            Arc::clone(&stream) as Arc<dyn QuoteStream>,
            self.resolver.clone(),
        );

        let id = session.id();
        let cancel = self.registry.register(id, &self.shutdown);
        tracing::debug!(session_id = id, remote = ?remote, "SnapQuote call accepted");

        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            pump(session, stream, demand, inbound, cancel).await;
            registry.remove(id);
        });

        let stream = ReceiverStream::new(rx);
        Ok(Response::new(Box::pin(stream) as Self::SnapQuoteStream))
    }
}

// =============================================================================
// Serving
// =============================================================================

/// gRPC server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind the listening socket.
    #[error("failed to bind to {addr}: {source}")]
    BindFailed {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Transport failure while serving.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// Bind the gRPC listener on all interfaces.
///
/// # Errors
///
/// Returns [`ServerError::BindFailed`] if the port cannot be bound.
pub async fn bind(port: u16) -> Result<TcpListener, ServerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::BindFailed { addr, source })
}

/// Serve `server` on `listener` until `signal` resolves.
///
/// When the signal fires, every session is cancelled before tonic drains
/// its connections.
///
/// # Errors
///
/// Returns [`ServerError::Transport`] if the server fails while running.
pub async fn serve<F>(
    server: Arc<QuoteServer>,
    listener: TcpListener,
    signal: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "gRPC server listening");
    }

    let shutdown = {
        let server = Arc::clone(&server);
        async move {
            signal.await;
            server.shutdown();
        }
    };

    tonic::transport::Server::builder()
        .add_service(StreamingQuoteServer::from_arc(server))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await?;

    tracing::info!("gRPC server stopped");
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::MockPriceSource;

    fn server() -> QuoteServer {
        let mut source = MockPriceSource::new();
        source
            .expect_lookup_forex_price()
            .returning(|_| Ok(Decimal::ONE));
        QuoteServer::new(
            QuoteResolver::new(Arc::new(source)),
            SessionSettings::default(),
        )
    }

    #[test]
    fn registry_tracks_membership() {
        let registry = SessionRegistry::default();
        let parent = CancellationToken::new();

        let first = registry.register(1, &parent);
        let second = registry.register(2, &parent);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.opened.load(Ordering::Relaxed), 2);

        parent.cancel();
        assert!(first.is_cancelled());
        assert!(second.is_cancelled());

        registry.remove(1);
        registry.remove(2);
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.opened.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn shutdown_cancels_registered_sessions() {
        let server = server();
        let token = server.registry.register(7, &server.shutdown);

        assert!(!server.is_shutting_down());
        server.shutdown();

        assert!(server.is_shutting_down());
        assert!(token.is_cancelled());
        assert!(server.shutdown_token().is_cancelled());
    }

    #[test]
    fn sessions_registered_after_shutdown_start_cancelled() {
        let server = server();
        server.shutdown();

        let token = server.registry.register(9, &server.shutdown);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn bind_reports_address_in_use() {
        let held = bind(0).await.unwrap();
        let port = held.local_addr().unwrap().port();

        let err = bind(port).await.unwrap_err();
        assert!(matches!(err, ServerError::BindFailed { addr, .. } if addr.port() == port));
    }
}
