use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::schema::{ApiErrorResponse, QuoteResponse, SwapInstructionsRequest, SwapInstructionsResponse};
use crate::domain::quote::{Quote, QuoteProvider, QuoteRequest};
use crate::shared::config::AggregatorConfig;
use crate::shared::errors::{AppError, QuoteError, SurfaceError};
use crate::shared::utils::pct_to_bps;

/// HTTP client for the swap aggregator (quotes and swap instructions)
pub struct AggregatorClient {
    http_client: Client,
    base_url: String,
}

impl AggregatorClient {
    pub fn new(config: &AggregatorConfig) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Swap instructions for a (possibly patched) quote document.
    pub async fn swap_instructions(
        &self,
        quote: &Value,
        user: &str,
        destination_token_account: Option<&str>,
    ) -> Result<SwapInstructionsResponse, SurfaceError> {
        let url = format!("{}/swap-instructions", self.base_url);
        let body = SwapInstructionsRequest {
            quote_response: quote,
            user_public_key: user,
            wrap_and_unwrap_sol: false,
            destination_token_account,
        };

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SurfaceError::Submission(format!("swap-instructions request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SurfaceError::Submission(format!("swap-instructions body unreadable: {}", e)))?;

        if !status.is_success() {
            return Err(SurfaceError::Encoding(format!(
                "swap-instructions returned {}: {}",
                status,
                api_error_message(&text)
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| SurfaceError::Encoding(format!("malformed swap-instructions response: {}", e)))
    }
}

#[async_trait]
impl QuoteProvider for AggregatorClient {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError> {
        let url = format!("{}/quote", self.base_url);
        debug!("Requesting quote {} -> {} for {}", request.input_mint, request.output_mint, request.amount);

        let amount = request.amount.to_string();
        let slippage = request.max_slippage_bps.to_string();
        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("inputMint", request.input_mint.as_str()),
                ("outputMint", request.output_mint.as_str()),
                ("amount", amount.as_str()),
                ("slippageBps", slippage.as_str()),
            ])
            .send()
            .await
            .map_err(|e| QuoteError::Http(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| QuoteError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_quote_failure(status, &text));
        }

        parse_quote(&text, request)
    }
}

/// Turn a quote response body into a [`Quote`], rejecting anything that does
/// not match the request or carries unparseable amounts.
pub fn parse_quote(body: &str, request: &QuoteRequest) -> Result<Quote, QuoteError> {
    let raw: Value = serde_json::from_str(body).map_err(|e| QuoteError::Malformed(e.to_string()))?;
    let parsed: QuoteResponse =
        serde_json::from_value(raw.clone()).map_err(|e| QuoteError::Malformed(e.to_string()))?;

    if parsed.input_mint != request.input_mint || parsed.output_mint != request.output_mint {
        return Err(QuoteError::Malformed(format!(
            "quote is for {} -> {}, requested {} -> {}",
            parsed.input_mint, parsed.output_mint, request.input_mint, request.output_mint
        )));
    }
    if parsed.route_plan.is_empty() {
        return Err(QuoteError::NoRoute(format!("empty route plan for {}", request.input_mint)));
    }

    let amount_in = parse_amount("inAmount", &parsed.in_amount)?;
    let amount_out = parse_amount("outAmount", &parsed.out_amount)?;
    let impact_pct: f64 = parsed
        .price_impact_pct
        .trim()
        .parse()
        .map_err(|_| QuoteError::Malformed(format!("bad priceImpactPct {:?}", parsed.price_impact_pct)))?;

    let route_payload = serde_json::to_vec(&raw).map_err(|e| QuoteError::Malformed(e.to_string()))?;

    Ok(Quote {
        input_mint: parsed.input_mint,
        output_mint: parsed.output_mint,
        amount_in,
        amount_out,
        price_impact_bps: pct_to_bps(impact_pct),
        route_payload,
        fetched_at: Instant::now(),
    })
}

fn parse_amount(field: &str, value: &str) -> Result<u64, QuoteError> {
    value
        .parse()
        .map_err(|_| QuoteError::Malformed(format!("bad {} {:?}", field, value)))
}

fn classify_quote_failure(status: StatusCode, body: &str) -> QuoteError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!("⚠️  Aggregator rate limit hit");
        return QuoteError::RateLimited;
    }

    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(err) => match err.error_code.as_deref() {
            Some("COULD_NOT_FIND_ANY_ROUTE") | Some("TOKEN_NOT_TRADABLE") | Some("NO_ROUTES_FOUND") => {
                QuoteError::NoRoute(err.error)
            }
            _ if status.is_client_error() && err.error.to_lowercase().contains("route") => QuoteError::NoRoute(err.error),
            _ => QuoteError::Http(format!("{}: {}", status, err.error)),
        },
        Err(_) => QuoteError::Http(format!("{}: {}", status, body.chars().take(200).collect::<String>())),
    }
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorResponse>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}
