//! Windowed quote fetching with pacing between windows

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::{PricedQuote, Quote, QuoteFailure, QuoteProvider, QuoteRequest, QuoteRound};
use crate::shared::config::QuotingConfig;
use crate::shared::errors::QuoteError;
use crate::shared::types::{OutputAsset, TokenBalance, Tradeability};
use crate::shared::utils::{from_ui_amount, to_ui_amount, BPS_DENOMINATOR};

#[derive(Debug, Clone)]
pub struct QuoteBatcherConfig {
    pub window_size: usize,
    pub window_pause: Duration,
    /// USD notional of the reference quote; `0` disables reference pricing.
    pub reference_notional_usd: f64,
    pub request_slippage_bps: u32,
}

impl Default for QuoteBatcherConfig {
    fn default() -> Self {
        Self::from(&QuotingConfig::default())
    }
}

impl From<&QuotingConfig> for QuoteBatcherConfig {
    fn from(cfg: &QuotingConfig) -> Self {
        Self {
            window_size: cfg.window_size.max(1),
            window_pause: Duration::from_millis(cfg.window_pause_ms),
            reference_notional_usd: cfg.reference_notional_usd,
            request_slippage_bps: cfg.request_slippage_bps,
        }
    }
}

/// Whether a cached answer is acceptable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fetch {
    Any,
    Fresh,
}

/// Fetches quotes for many tokens, `window_size` at a time.
///
/// Requests inside a window run concurrently; windows run one after another
/// with `window_pause` in between to stay under upstream rate limits. A failed
/// quote is terminal for the round and is never retried inline.
pub struct QuoteBatcher {
    provider: Arc<dyn QuoteProvider>,
    output: OutputAsset,
    config: QuoteBatcherConfig,
}

impl QuoteBatcher {
    pub fn new(provider: Arc<dyn QuoteProvider>, output: OutputAsset, config: QuoteBatcherConfig) -> Self {
        Self {
            provider,
            output,
            config,
        }
    }

    pub fn output(&self) -> &OutputAsset {
        &self.output
    }

    /// Quote every `(token, amount)` pair into the output asset.
    pub async fn fetch_quotes(&self, requests: &[(TokenBalance, u64)]) -> QuoteRound {
        self.quote_round(requests, Fetch::Any).await
    }

    /// Like [`fetch_quotes`](Self::fetch_quotes), but never answered from a cache.
    /// Used to replace quotes that went stale.
    pub async fn refetch_quotes(&self, requests: &[(TokenBalance, u64)]) -> QuoteRound {
        self.quote_round(requests, Fetch::Fresh).await
    }

    async fn quote_round(&self, requests: &[(TokenBalance, u64)], fetch: Fetch) -> QuoteRound {
        let verb = match fetch {
            Fetch::Any => "Quoting",
            Fetch::Fresh => "Re-quoting",
        };
        info!(
            "💱 {} {} tokens into {} (windows of {})",
            verb,
            requests.len(),
            self.output.symbol,
            self.config.window_size
        );

        let mut round = QuoteRound::default();

        for (index, window) in requests.chunks(self.config.window_size.max(1)).enumerate() {
            if index > 0 && !self.config.window_pause.is_zero() {
                tokio::time::sleep(self.config.window_pause).await;
            }

            let results = join_all(window.iter().map(|(token, amount)| async move {
                (token.mint.clone(), self.price(token, *amount, fetch).await)
            }))
            .await;

            for (mint, result) in results {
                match result {
                    Ok(priced) => {
                        debug!(
                            "Quoted {}: out={} impact={}bps",
                            mint, priced.quote.amount_out, priced.price_impact_bps
                        );
                        round.quotes.insert(mint, priced);
                    }
                    Err(error) => {
                        warn!("⚠️  Quote failed for {}: {}", mint, error);
                        round.failures.push(QuoteFailure { mint, error });
                    }
                }
            }
        }

        info!(
            "✅ Quoting finished: {} quoted, {} failed",
            round.quotes.len(),
            round.failures.len()
        );
        round
    }

    /// Quote a single token, calibrating impact against a reference quote when possible.
    pub async fn fetch_one(&self, token: &TokenBalance, amount: u64) -> Result<PricedQuote, QuoteError> {
        self.price(token, amount, Fetch::Any).await
    }

    /// Fresh single-token quote that bypasses any cache.
    pub async fn refetch_one(&self, token: &TokenBalance, amount: u64) -> Result<PricedQuote, QuoteError> {
        self.price(token, amount, Fetch::Fresh).await
    }

    async fn ask(&self, request: &QuoteRequest, fetch: Fetch) -> Result<Quote, QuoteError> {
        match fetch {
            Fetch::Any => self.provider.quote(request).await,
            Fetch::Fresh => self.provider.requote(request).await,
        }
    }

    async fn price(&self, token: &TokenBalance, amount: u64, fetch: Fetch) -> Result<PricedQuote, QuoteError> {
        let request = QuoteRequest {
            input_mint: token.mint.clone(),
            output_mint: self.output.mint.clone(),
            amount,
            max_slippage_bps: self.config.request_slippage_bps,
        };

        let quote = self.ask(&request, fetch).await?;
        if quote.amount_out == 0 {
            return Err(QuoteError::NoRoute(format!("zero output quoted for {}", token.mint)));
        }

        let reference_rate = self.reference_rate(token, amount, fetch).await;
        let price_impact_bps = match reference_rate {
            Some(rate) => quote
                .price_impact_bps
                .max(true_impact_bps(quote.amount_in, quote.amount_out, rate)),
            None => quote.price_impact_bps,
        };

        let output_usd = self.output.usd_value_of(quote.amount_out);
        let input_usd = token
            .usd_value_of(amount)
            .or_else(|| reference_rate.map(|rate| self.output.usd_value_of((amount as f64 * rate) as u64)))
            .unwrap_or(output_usd);

        Ok(PricedQuote {
            quote,
            input_usd,
            output_usd,
            price_impact_bps,
        })
    }

    /// Output units per input unit at a small notional, if it can be measured.
    async fn reference_rate(&self, token: &TokenBalance, amount: u64, fetch: Fetch) -> Option<f64> {
        let reference_amount = self.reference_amount(token)?;
        if reference_amount >= amount {
            return None;
        }

        let request = QuoteRequest {
            input_mint: token.mint.clone(),
            output_mint: self.output.mint.clone(),
            amount: reference_amount,
            max_slippage_bps: self.config.request_slippage_bps,
        };

        match self.ask(&request, fetch).await {
            Ok(reference) if reference.amount_in > 0 && reference.amount_out > 0 => {
                Some(reference.amount_out as f64 / reference.amount_in as f64)
            }
            Ok(_) => None,
            Err(e) => {
                debug!("Reference quote for {} unavailable: {}", token.mint, e);
                None
            }
        }
    }

    fn reference_amount(&self, token: &TokenBalance) -> Option<u64> {
        let price = token.unit_price_usd.filter(|p| *p > 0.0)?;
        if self.config.reference_notional_usd <= 0.0 {
            return None;
        }
        Some(from_ui_amount(self.config.reference_notional_usd / price, token.decimals).max(1))
    }

    /// Liquidity probe: mark each token tradeable or not and refresh its unit price.
    ///
    /// Transport-level failures leave the token `Unknown`; only a definite
    /// "no route" marks it untradeable.
    pub async fn probe(&self, tokens: &[TokenBalance]) -> Vec<TokenBalance> {
        let mut probed = Vec::with_capacity(tokens.len());

        for (index, window) in tokens.chunks(self.config.window_size.max(1)).enumerate() {
            if index > 0 && !self.config.window_pause.is_zero() {
                tokio::time::sleep(self.config.window_pause).await;
            }

            let results = join_all(window.iter().map(|token| self.probe_one(token))).await;
            probed.extend(results);
        }

        probed
    }

    async fn probe_one(&self, token: &TokenBalance) -> TokenBalance {
        let mut probed = token.clone();
        let amount = self
            .reference_amount(token)
            .unwrap_or(token.raw_balance)
            .min(token.raw_balance.max(1));

        let request = QuoteRequest {
            input_mint: token.mint.clone(),
            output_mint: self.output.mint.clone(),
            amount,
            max_slippage_bps: self.config.request_slippage_bps,
        };

        match self.provider.quote(&request).await {
            Ok(quote) if quote.amount_out > 0 => {
                probed.tradeable = Tradeability::Tradeable;
                probed.unit_price_usd = Some(self.unit_price_from(&quote, token.decimals));
            }
            Ok(_) | Err(QuoteError::NoRoute(_)) | Err(QuoteError::Malformed(_)) => {
                probed.tradeable = Tradeability::Untradeable;
            }
            Err(e) => {
                debug!("Probe for {} inconclusive: {}", token.mint, e);
                probed.tradeable = Tradeability::Unknown;
            }
        }

        probed
    }

    fn unit_price_from(&self, quote: &Quote, input_decimals: u8) -> f64 {
        let ui_in = to_ui_amount(quote.amount_in, input_decimals);
        if ui_in <= 0.0 {
            return 0.0;
        }
        to_ui_amount(quote.amount_out, self.output.decimals) / ui_in * self.output.unit_price_usd
    }
}

/// Impact implied by the gap between the quoted rate and the reference rate.
pub fn true_impact_bps(amount_in: u64, amount_out: u64, reference_rate: f64) -> u32 {
    if amount_in == 0 || !reference_rate.is_finite() || reference_rate <= 0.0 {
        return 0;
    }
    let rate = amount_out as f64 / amount_in as f64;
    let loss = 1.0 - rate / reference_rate;
    (loss * BPS_DENOMINATOR as f64)
        .round()
        .clamp(0.0, BPS_DENOMINATOR as f64) as u32
}
