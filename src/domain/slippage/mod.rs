//! Slippage policy
//!
//! Maps a quoted price impact to the slippage bound a swap step is allowed to
//! tolerate on-chain. Without `force` the bound stays low so ordinary swaps
//! cannot silently eat a large adverse move; with `force` the caller has
//! acknowledged the risk and the bound is opened up to a high ceiling.
//!
//! The bound never drops below `impact + min_buffer`: a guard tighter than the
//! swap's own known impact reverts with certainty.

use crate::shared::config::SlippageConfig;
use crate::shared::utils::BPS_DENOMINATOR;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlippagePolicy {
    config: SlippageConfig,
}

impl Default for SlippagePolicy {
    fn default() -> Self {
        Self::new(SlippageConfig::default())
    }
}

impl SlippagePolicy {
    pub fn new(config: SlippageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SlippageConfig {
        &self.config
    }

    /// Slippage bound in bps for a swap with `price_impact_bps` of known impact.
    ///
    /// Monotonic non-decreasing in `price_impact_bps` for either value of
    /// `force`, and the forced bound is never below the unforced one as long as
    /// `force_buffer >= min_buffer` and `force_ceiling >= normal_cap`.
    pub fn slippage(&self, price_impact_bps: u32, force: bool) -> u32 {
        let cfg = &self.config;
        let impact = price_impact_bps.min(BPS_DENOMINATOR);
        let safety_floor = impact.saturating_add(cfg.min_buffer_bps);

        let bound = if force {
            cfg.low_floor_bps
                .max(impact.saturating_add(cfg.force_buffer_bps))
                .min(cfg.force_ceiling_bps)
        } else {
            cfg.low_floor_bps
                .max(impact.saturating_add(cfg.min_buffer_bps))
                .min(cfg.normal_cap_bps)
        };

        bound.max(safety_floor).min(BPS_DENOMINATOR)
    }
}
