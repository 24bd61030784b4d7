//! Result domain - per-token swap results, the sweep report and balance reconciliation

mod result_aggregator;

pub use result_aggregator::{attribute, ResultAggregator};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::session::SwapStatus;
use crate::shared::errors::{SurfaceError, SweepError};

/// Reads the balance of an asset held by an owner
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    async fn balance(&self, asset: &str, owner: &str) -> Result<u64, SurfaceError>;
}

/// Terminal record for one originally selected token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapResult {
    pub mint: String,
    pub symbol: String,
    pub status: SwapStatus,
    pub input_amount: u64,
    pub input_usd: f64,
    pub quoted_output: u64,
    pub quoted_output_usd: f64,
    pub realized_output: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SweepError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub session_id: String,
    pub output_mint: String,
    pub output_symbol: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<SwapResult>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub submissions: usize,
    pub balance_before: Option<u64>,
    pub balance_after: Option<u64>,
    /// Quoted output of successful tokens.
    pub quoted_output: u64,
    pub realized_output: Option<u64>,
    /// Realized over quoted output for successful tokens.
    pub efficiency: Option<f64>,
}

impl SweepReport {
    pub fn result(&self, mint: &str) -> Option<&SwapResult> {
        self.results.iter().find(|r| r.mint == mint)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
