//! gRPC Stream Adapter
//!
//! Binds one tonic bidirectional call to a [`QuoteSession`]:
//!
//! - **Inbound**: items are pulled from the request stream only after the
//!   session has requested them, so unread messages stay in HTTP/2 flow
//!   control instead of piling up in the server.
//! - **Outbound**: responses go through a bounded channel; the stream is
//!   writable while the channel has free capacity, and writes wait for
//!   capacity rather than buffering without limit. One extra slot is held
//!   back at open so a terminal status always fits.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;
use tonic::Status;

use super::proto::forex::v1 as proto;
use crate::application::ports::{QuoteStream, StreamError};
use crate::application::services::QuoteSession;
use crate::domain::quote::{QuoteRequest, QuoteResponse};

type OutboundItem = Result<proto::QuoteResponse, Status>;

/// Receiving end of a call's outbound channel, handed to tonic.
pub type OutboundReceiver = mpsc::Receiver<OutboundItem>;

// =============================================================================
// Demand
// =============================================================================

/// Credits for inbound items the session is willing to accept.
#[derive(Debug, Default)]
pub struct Demand {
    credits: AtomicUsize,
    notify: Notify,
}

impl Demand {
    /// Create an empty demand counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` credits.
    pub fn add(&self, count: usize) {
        if count == 0 {
            return;
        }
        self.credits.fetch_add(count, Ordering::AcqRel);
        self.notify.notify_one();
    }

    /// Consume one credit if any is available.
    pub fn try_take(&self) -> bool {
        self.credits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
            .is_ok()
    }

    /// Wait until a credit is available and consume it.
    ///
    /// Intended for a single consumer (the session's pump).
    pub async fn take(&self) {
        loop {
            if self.try_take() {
                return;
            }
            // A notify_one() issued before this point leaves a permit behind,
            // so a credit added between try_take() and here is not missed.
            self.notify.notified().await;
        }
    }
}

// =============================================================================
// Stream Adapter
// =============================================================================

/// [`QuoteStream`] over a tonic outbound channel and a demand counter.
#[derive(Debug)]
pub struct GrpcQuoteStream {
    outbound: mpsc::Sender<OutboundItem>,
    demand: Arc<Demand>,
    terminal: Mutex<Option<mpsc::OwnedPermit<OutboundItem>>>,
}

impl GrpcQuoteStream {
    /// Open an outbound channel for `buffer` responses and wrap it with the
    /// demand the pump consumes.
    ///
    /// The channel gets one slot beyond `buffer`, reserved for [`fail`].
    /// Readiness only counts the other `buffer` slots.
    ///
    /// [`fail`]: GrpcQuoteStream::fail
    #[must_use]
    pub fn open(buffer: usize, demand: Arc<Demand>) -> (Self, OutboundReceiver) {
        let (outbound, rx) = mpsc::channel(buffer.saturating_add(1));
        let terminal = outbound.clone().try_reserve_owned().ok();
        let stream = Self {
            outbound,
            demand,
            terminal: Mutex::new(terminal),
        };
        (stream, rx)
    }

    /// Wait until the outbound channel can take a write.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Closed`] if the client side is gone.
    pub async fn writable(&self) -> Result<(), StreamError> {
        self.outbound
            .reserve()
            .await
            .map(drop)
            .map_err(|_| StreamError::Closed)
    }

    /// Send a terminal status to the client.
    ///
    /// Uses the reserved slot, so it never waits on a slow reader. Only the
    /// first call has any effect.
    pub fn fail(&self, status: Status) {
        if let Some(slot) = self.terminal.lock().take() {
            let _ = slot.send(Err(status));
        }
    }
}

#[async_trait]
impl QuoteStream for GrpcQuoteStream {
    fn is_ready(&self) -> bool {
        !self.outbound.is_closed() && self.outbound.capacity() > 0
    }

    fn request(&self, count: usize) {
        self.demand.add(count);
    }

    async fn send(&self, response: QuoteResponse) -> Result<(), StreamError> {
        self.outbound
            .send(Ok(response_to_proto(response)))
            .await
            .map_err(|_| StreamError::Closed)
    }
}

// =============================================================================
// Pump
// =============================================================================

/// Drive one session until the client finishes, fails or the server cancels.
///
/// Readiness fires once the outbound channel is writable; from then on an
/// inbound item is read only when the session holds demand for it.
pub async fn pump<S>(
    session: Arc<QuoteSession>,
    stream: Arc<GrpcQuoteStream>,
    demand: Arc<Demand>,
    mut inbound: S,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<proto::QuoteRequest, Status>> + Unpin + Send,
{
    let writable = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            session.cancel();
            stream.fail(Status::unavailable("server shutting down"));
            return;
        }
        writable = stream.writable() => writable,
    };
    if writable.is_err() {
        session.on_error("client closed before the stream became writable");
        return;
    }
    session.on_ready();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                session.cancel();
                stream.fail(Status::unavailable("server shutting down"));
                break;
            }
            () = demand.take() => {}
        }

        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                session.cancel();
                stream.fail(Status::unavailable("server shutting down"));
                break;
            }
            next = inbound.next() => next,
        };

        match next {
            Some(Ok(message)) => {
                let request = request_from_proto(message);
                let outcome = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        session.cancel();
                        stream.fail(Status::unavailable("server shutting down"));
                        break;
                    }
                    outcome = session.on_item(request) => outcome,
                };
                if let Err(e) = outcome {
                    tracing::debug!(session_id = session.id(), error = %e, "Stopping quote pump");
                    break;
                }
            }
            Some(Err(status)) => {
                session.on_error(&status_summary(&status));
                break;
            }
            None => {
                session.on_complete();
                break;
            }
        }
    }
}

// =============================================================================
// Conversion Functions
// =============================================================================

fn request_from_proto(message: proto::QuoteRequest) -> QuoteRequest {
    QuoteRequest::new(message.symbol)
}

fn response_to_proto(response: QuoteResponse) -> proto::QuoteResponse {
    proto::QuoteResponse {
        symbol: response.symbol,
        price: response.price,
    }
}

fn status_summary(status: &Status) -> String {
    if status.message().is_empty() {
        format!("{:?}", status.code())
    } else {
        format!("{:?}: {}", status.code(), status.message())
    }
}

// =============================================================================
// Tests
// =============================================================================
