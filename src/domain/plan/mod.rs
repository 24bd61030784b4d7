//! Plan domain - swap steps, execution batches and the plan builder

mod plan_builder;

pub use plan_builder::{Plan, PlanBuilder, PlanCandidate};

use std::time::Duration;

use tokio::time::Instant;

use crate::shared::utils::apply_slippage;

/// The unit of execution: one token swapped into the output asset
#[derive(Debug, Clone, PartialEq)]
pub struct SwapStep {
    pub input_mint: String,
    pub output_mint: String,
    pub amount_in: u64,
    pub quoted_out: u64,
    pub min_out: u64,
    pub slippage_bps: u32,
    pub price_impact_bps: u32,
    pub forced: bool,
    pub use_full_balance: bool,
    pub route_payload: Vec<u8>,
    pub quoted_at: Instant,
}

impl SwapStep {
    pub fn quote_age(&self) -> Duration {
        self.quoted_at.elapsed()
    }

    pub fn is_stale(&self, window: Duration) -> bool {
        self.quote_age() > window
    }

    /// Same step with a different slippage bound; `min_out` follows.
    pub fn with_slippage(&self, slippage_bps: u32) -> Self {
        let mut step = self.clone();
        step.slippage_bps = slippage_bps;
        step.min_out = apply_slippage(step.quoted_out, slippage_bps);
        step
    }
}

/// Steps intended for one atomic invocation of the execution surface
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionBatch {
    pub index: usize,
    pub steps: Vec<SwapStep>,
}

impl ExecutionBatch {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn mints(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.input_mint.as_str()).collect()
    }
}
