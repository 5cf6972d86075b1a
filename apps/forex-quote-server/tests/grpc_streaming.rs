//! gRPC Streaming Integration Tests
//!
//! Drives a real tonic server over loopback with a fixed price table.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;

use forex_quote_server::{
    LookupError, PriceSource, QuoteResolver, QuoteServer, ServerError, SessionSettings, Symbol,
    proto::{QuoteRequest, QuoteResponse, streaming_quote_client::StreamingQuoteClient},
    serve_grpc,
};

const STEP: Duration = Duration::from_secs(5);

struct FixedPrices;

impl PriceSource for FixedPrices {
    fn lookup_forex_price(&self, symbol: &Symbol) -> Result<Decimal, LookupError> {
        let ticker = symbol.provider_symbol();
        match ticker.as_str() {
            "EURUSD=X" => Ok(Decimal::new(10850, 4)),
            "GBPUSD=X" => Ok(Decimal::new(12710, 4)),
            "USDJPY=X" => Ok(Decimal::new(14932, 2)),
            _ => Err(LookupError::UnknownSymbol(ticker)),
        }
    }
}

struct TestServer {
    server: Arc<QuoteServer>,
    addr: SocketAddr,
    stop: CancellationToken,
    handle: tokio::task::JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    async fn start() -> Self {
        let resolver = QuoteResolver::with_timeout(Arc::new(FixedPrices), Duration::from_secs(1));
        let server = Arc::new(QuoteServer::new(resolver, SessionSettings::default()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stop = CancellationToken::new();
        let handle = tokio::spawn(serve_grpc(
            Arc::clone(&server),
            listener,
            stop.clone().cancelled_owned(),
        ));

        Self {
            server,
            addr,
            stop,
            handle,
        }
    }

    async fn client(&self) -> StreamingQuoteClient<Channel> {
        StreamingQuoteClient::connect(format!("http://{}", self.addr))
            .await
            .unwrap()
    }

    async fn wait_for_active(&self, expected: usize) {
        timeout(STEP, async {
            while self.server.active_sessions() != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}

fn assert_price(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected price {expected}, got {actual}"
    );
}

fn request(symbol: &str) -> QuoteRequest {
    QuoteRequest {
        symbol: symbol.to_string(),
    }
}

/// An open call whose requests are sent one at a time.
struct Call {
    tx: mpsc::Sender<QuoteRequest>,
    responses: tonic::Streaming<QuoteResponse>,
}

impl Call {
    async fn open(client: &mut StreamingQuoteClient<Channel>) -> Self {
        let (tx, rx) = mpsc::channel(8);
        let responses = client
            .snap_quote(ReceiverStream::new(rx))
            .await
            .unwrap()
            .into_inner();
        Self { tx, responses }
    }

    async fn ask(&mut self, symbol: &str) -> QuoteResponse {
        self.tx.send(request(symbol)).await.unwrap();
        timeout(STEP, self.responses.message())
            .await
            .unwrap()
            .unwrap()
            .unwrap()
    }
}

#[tokio::test]
async fn single_request_gets_price() {
    let test = TestServer::start().await;
    let mut client = test.client().await;
    let mut call = Call::open(&mut client).await;

    let response = call.ask("EURUSD").await;

    assert_eq!(response.symbol, "EURUSD");
    assert_price(response.price, 1.085);
}

#[tokio::test]
async fn unknown_symbol_gets_sentinel_and_stream_continues() {
    let test = TestServer::start().await;
    let mut client = test.client().await;
    let mut call = Call::open(&mut client).await;

    let unknown = call.ask("ZZZINVALID").await;
    assert_eq!(unknown.symbol, "ZZZINVALID");
    assert_eq!(unknown.price, 0.0);

    let known = call.ask("GBPUSD").await;
    assert_price(known.price, 1.271);
}

#[tokio::test]
async fn responses_follow_request_order_and_stream_ends_on_completion() {
    let test = TestServer::start().await;
    let mut client = test.client().await;

    let requests = tokio_stream::iter(vec![
        request("USDJPY"),
        request("EURUSD"),
        request("GBPUSD"),
        request("usdjpy"),
    ]);
    let mut responses = client.snap_quote(requests).await.unwrap().into_inner();

    let mut received = Vec::new();
    while let Some(response) = timeout(STEP, responses.message()).await.unwrap().unwrap() {
        received.push(response);
    }

    let symbols: Vec<_> = received.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, ["USDJPY", "EURUSD", "GBPUSD", "usdjpy"]);
    assert_price(received[0].price, 149.32);
    assert_price(received[3].price, 149.32);

    test.wait_for_active(0).await;
    assert_eq!(test.server.sessions_opened(), 1);
}

#[tokio::test]
async fn empty_symbol_gets_sentinel() {
    let test = TestServer::start().await;
    let mut client = test.client().await;
    let mut call = Call::open(&mut client).await;

    let response = call.ask("").await;

    assert_eq!(response.symbol, "");
    assert_eq!(response.price, 0.0);
}

#[tokio::test]
async fn client_disconnect_leaves_other_sessions_running() {
    let test = TestServer::start().await;
    let mut client = test.client().await;

    let mut first = Call::open(&mut client).await;
    let mut second = Call::open(&mut client).await;
    first.ask("EURUSD").await;
    second.ask("EURUSD").await;
    test.wait_for_active(2).await;

    drop(first);
    test.wait_for_active(1).await;

    let response = second.ask("GBPUSD").await;
    assert_price(response.price, 1.271);
    assert_eq!(test.server.sessions_opened(), 2);
}

#[tokio::test]
async fn concurrent_sessions_are_independent() {
    let test = TestServer::start().await;
    let mut tasks = Vec::new();

    for symbol in ["EURUSD", "GBPUSD", "USDJPY", "NOPE"] {
        let mut client = test.client().await;
        tasks.push(tokio::spawn(async move {
            let mut call = Call::open(&mut client).await;
            let mut prices = Vec::new();
            for _ in 0..5 {
                let response = call.ask(symbol).await;
                assert_eq!(response.symbol, symbol);
                prices.push(response.price);
            }
            prices
        }));
    }

    let results: Vec<Vec<f64>> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    results[0].iter().for_each(|&p| assert_price(p, 1.085));
    assert!(results[3].iter().all(|&p| p == 0.0));
}

#[tokio::test]
async fn shutdown_cancels_open_sessions() {
    let test = TestServer::start().await;
    let mut client = test.client().await;
    let mut call = Call::open(&mut client).await;
    call.ask("EURUSD").await;

    test.stop.cancel();

    let status = timeout(STEP, call.responses.message())
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(status.code(), tonic::Code::Unavailable);
    assert!(test.server.is_shutting_down());

    drop(call);
    timeout(STEP, test.handle).await.unwrap().unwrap().unwrap();
}
