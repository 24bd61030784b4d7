//! Quote domain - quote shapes, the provider seam and the windowed batcher

mod quote_batcher;

pub use quote_batcher::{QuoteBatcher, QuoteBatcherConfig};

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::shared::errors::QuoteError;

/// Quote request for a single token pair and amount
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u64,
    pub max_slippage_bps: u32,
}

impl QuoteRequest {
    pub fn cache_key(&self) -> String {
        format!("{}:{}:{}:{}", self.input_mint, self.output_mint, self.amount, self.max_slippage_bps)
    }
}

/// A quote as returned by the provider.
///
/// `route_payload` is opaque to the engine; only the chain adapter that
/// executes the step interprets it.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub input_mint: String,
    pub output_mint: String,
    pub amount_in: u64,
    pub amount_out: u64,
    pub price_impact_bps: u32,
    pub route_payload: Vec<u8>,
    pub fetched_at: Instant,
}

impl Quote {
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// External quote source
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError>;

    /// Fetch from the source even if an earlier answer is still held somewhere.
    /// Replacing a stale quote must go through here.
    async fn requote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError> {
        self.quote(request).await
    }
}

/// A quote enriched with USD values and the impact the engine plans with
#[derive(Debug, Clone, PartialEq)]
pub struct PricedQuote {
    pub quote: Quote,
    pub input_usd: f64,
    pub output_usd: f64,
    /// Provider impact, raised to the reference-derived impact when that is larger.
    pub price_impact_bps: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuoteFailure {
    pub mint: String,
    pub error: QuoteError,
}

/// Outcome of one quoting round
#[derive(Debug, Default)]
pub struct QuoteRound {
    pub quotes: HashMap<String, PricedQuote>,
    pub failures: Vec<QuoteFailure>,
}

impl QuoteRound {
    pub fn len(&self) -> usize {
        self.quotes.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
