//! Yahoo Finance FX Adapter
//!
//! Implements [`PriceSource`] against the Yahoo Finance chart endpoint:
//!
//! ```text
//! GET {base_url}/v8/finance/chart/{provider_symbol}?interval=1d&range=1d
//! ```
//!
//! # Blocking Contract
//!
//! [`PriceSource::lookup_forex_price`] is synchronous. The adapter drives its
//! async HTTP request to completion on the runtime handle captured at
//! construction, so it must be called from a blocking context such as
//! `tokio::task::spawn_blocking`, never directly from an async task.

use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::runtime::Handle;

use crate::application::ports::PriceSource;
use crate::domain::quote::{LookupError, Symbol};
use crate::infrastructure::config::ProviderSettings;

/// Yahoo Finance price source.
#[derive(Debug, Clone)]
pub struct YahooFxClient {
    client: reqwest::Client,
    base_url: String,
    runtime: Handle,
}

impl YahooFxClient {
    /// Create a client for the configured provider.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Upstream`] if no runtime is available or the
    /// HTTP client cannot be built.
    pub fn new(settings: &ProviderSettings) -> Result<Self, LookupError> {
        let runtime = Handle::try_current()
            .map_err(|e| LookupError::Upstream(format!("no tokio runtime: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .user_agent(concat!("forex-quote-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LookupError::Upstream(e.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            runtime,
        })
    }

    /// Fetch the latest price for `symbol`.
    async fn fetch_price(&self, symbol: &Symbol) -> Result<Decimal, LookupError> {
        let provider_symbol = symbol.provider_symbol();
        let url = format!("{}/v8/finance/chart/{}", self.base_url, provider_symbol);

        let response = self
            .client
            .get(&url)
            .query(&[("interval", "1d"), ("range", "1d")])
            .send()
            .await
            .map_err(|e| LookupError::Upstream(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(LookupError::UnknownSymbol(provider_symbol));
        }
        if !status.is_success() {
            return Err(LookupError::Upstream(format!("HTTP {status} for {provider_symbol}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| LookupError::Upstream(e.to_string()))?;

        parse_chart_price(&provider_symbol, &body)
    }
}

impl PriceSource for YahooFxClient {
    fn lookup_forex_price(&self, symbol: &Symbol) -> Result<Decimal, LookupError> {
        let price = self.runtime.block_on(self.fetch_price(symbol))?;
        tracing::debug!(symbol = %symbol, price = %price, "FX quote received");
        Ok(price)
    }
}

// =============================================================================
// API response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: Option<String>,
}

/// Extract the regular market price from a chart response body.
fn parse_chart_price(provider_symbol: &str, body: &[u8]) -> Result<Decimal, LookupError> {
    let envelope: ChartEnvelope =
        serde_json::from_slice(body).map_err(|e| LookupError::Malformed(e.to_string()))?;

    if let Some(error) = envelope.chart.error {
        tracing::debug!(
            symbol = provider_symbol,
            code = %error.code,
            description = error.description.as_deref().unwrap_or(""),
            "Provider rejected symbol"
        );
        return Err(LookupError::UnknownSymbol(provider_symbol.to_string()));
    }

    let meta = envelope
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .map(|result| result.meta)
        .ok_or_else(|| LookupError::UnknownSymbol(provider_symbol.to_string()))?;

    let price = meta
        .regular_market_price
        .ok_or_else(|| LookupError::Malformed("missing regularMarketPrice".to_string()))?;

    if !price.is_finite() || price < 0.0 {
        return Err(LookupError::Malformed(format!("unusable price {price}")));
    }

    Decimal::try_from(price).map_err(|e| LookupError::Malformed(e.to_string()))
}

// =============================================================================
// Tests
// =============================================================================
