use std::collections::HashSet;

use tracing::{debug, info};

use super::{ExecutionBatch, SwapStep};
use crate::domain::quote::PricedQuote;
use crate::domain::slippage::SlippagePolicy;
use crate::shared::errors::SweepError;
use crate::shared::types::TokenBalance;
use crate::shared::utils::apply_slippage;

/// A quoted token offered to the planner
#[derive(Debug, Clone)]
pub struct PlanCandidate {
    pub token: TokenBalance,
    pub quote: PricedQuote,
    pub force: bool,
}

/// Ordered execution batches plus the tokens the planner refused
#[derive(Debug, Default)]
pub struct Plan {
    pub batches: Vec<ExecutionBatch>,
    pub rejected: Vec<(String, SweepError)>,
}

impl Plan {
    pub fn step_count(&self) -> usize {
        self.batches.iter().map(|b| b.len()).sum()
    }
}

/// Turns quoted tokens into swap steps and capacity-bounded batches
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    policy: SlippagePolicy,
    auto_select_impact_bps: u32,
    capacity: usize,
}

impl PlanBuilder {
    pub fn new(policy: SlippagePolicy, auto_select_impact_bps: u32, capacity: usize) -> Self {
        Self {
            policy,
            auto_select_impact_bps,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> &SlippagePolicy {
        &self.policy
    }

    /// Build a step for one token, or explain why it is not selected.
    pub fn plan_step(
        &self,
        token: &TokenBalance,
        priced: &PricedQuote,
        force: bool,
    ) -> Result<SwapStep, SweepError> {
        let impact = priced.price_impact_bps;
        if !force && impact >= self.auto_select_impact_bps {
            return Err(SweepError::ImpactTooHigh {
                impact_bps: impact,
                threshold_bps: self.auto_select_impact_bps,
            });
        }

        let slippage_bps = self.policy.slippage(impact, force);
        let quote = &priced.quote;

        Ok(SwapStep {
            input_mint: token.mint.clone(),
            output_mint: quote.output_mint.clone(),
            amount_in: quote.amount_in,
            quoted_out: quote.amount_out,
            min_out: apply_slippage(quote.amount_out, slippage_bps),
            slippage_bps,
            price_impact_bps: impact,
            forced: force,
            use_full_balance: quote.amount_in >= token.raw_balance,
            route_payload: quote.route_payload.clone(),
            quoted_at: quote.fetched_at,
        })
    }

    /// Widen a step's bound to the forced policy, used for individual retries.
    pub fn boost(&self, step: &SwapStep) -> SwapStep {
        let boosted = self
            .policy
            .slippage(step.price_impact_bps, true)
            .max(step.slippage_bps);
        let mut step = step.with_slippage(boosted);
        step.forced = true;
        step
    }

    /// Select, price-guard and partition the candidates, preserving their order.
    pub fn build(&self, candidates: &[PlanCandidate]) -> Plan {
        let mut seen = HashSet::new();
        let mut steps = Vec::with_capacity(candidates.len());
        let mut rejected = Vec::new();

        for candidate in candidates {
            let mint = candidate.token.mint.clone();
            if !seen.insert(mint.clone()) {
                rejected.push((mint, SweepError::DuplicateToken));
                continue;
            }

            match self.plan_step(&candidate.token, &candidate.quote, candidate.force) {
                Ok(step) => {
                    debug!(
                        "Planned {}: in={} min_out={} slippage={}bps",
                        mint, step.amount_in, step.min_out, step.slippage_bps
                    );
                    steps.push(step);
                }
                Err(reason) => {
                    info!("⏭️  Skipping {}: {}", mint, reason);
                    rejected.push((mint, reason));
                }
            }
        }

        let batches = self.partition(steps);
        info!(
            "📋 Plan: {} steps in {} batches (capacity {}), {} rejected",
            batches.iter().map(|b| b.len()).sum::<usize>(),
            batches.len(),
            self.capacity,
            rejected.len()
        );

        Plan { batches, rejected }
    }

    pub fn partition(&self, steps: Vec<SwapStep>) -> Vec<ExecutionBatch> {
        let mut batches = Vec::new();
        let mut current = Vec::with_capacity(self.capacity);

        for step in steps {
            current.push(step);
            if current.len() == self.capacity {
                batches.push(ExecutionBatch {
                    index: batches.len(),
                    steps: std::mem::take(&mut current),
                });
            }
        }
        if !current.is_empty() {
            batches.push(ExecutionBatch {
                index: batches.len(),
                steps: current,
            });
        }

        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::priced;

    fn candidate(mint: &str, impact_bps: u32, force: bool) -> PlanCandidate {
        PlanCandidate {
            token: TokenBalance::new(mint, mint.to_uppercase(), 6, 1_000_000),
            quote: priced(mint, 1_000_000, 500_000, impact_bps),
            force,
        }
    }

    fn builder(capacity: usize) -> PlanBuilder {
        PlanBuilder::new(SlippagePolicy::default(), 1_000, capacity)
    }

    #[test]
    fn test_batches_never_exceed_capacity() {
        for capacity in 1..=6 {
            for count in 0..=17 {
                let candidates: Vec<_> = (0..count)
                    .map(|i| candidate(&format!("m{}", i), 10, false))
                    .collect();
                let plan = builder(capacity).build(&candidates);

                assert_eq!(plan.step_count(), count);
                assert!(plan.batches.iter().all(|b| !b.is_empty() && b.len() <= capacity));
                assert_eq!(plan.batches.len(), count.div_ceil(capacity));
            }
        }
    }

    #[test]
    fn test_input_order_preserved() {
        let candidates: Vec<_> = ["c", "a", "e", "b", "d"]
            .iter()
            .map(|m| candidate(m, 10, false))
            .collect();
        let plan = builder(2).build(&candidates);

        let order: Vec<&str> = plan.batches.iter().flat_map(|b| b.mints()).collect();
        assert_eq!(order, vec!["c", "a", "e", "b", "d"]);
        assert_eq!(plan.batches[2].index, 2);
    }

    #[test]
    fn test_high_impact_skipped_unless_forced() {
        let plan = builder(3).build(&[candidate("risky", 1_200, false), candidate("ok", 20, false)]);

        assert_eq!(plan.step_count(), 1);
        assert_eq!(plan.rejected.len(), 1);
        assert_eq!(plan.rejected[0].0, "risky");
        assert!(plan.rejected[0]
            .1
            .to_string()
            .starts_with("impact exceeds threshold, requires force"));

        let forced = builder(3).build(&[candidate("risky", 1_200, true)]);
        let step = &forced.batches[0].steps[0];
        assert!(step.forced);
        assert_eq!(step.slippage_bps, 1_700);
    }

    #[test]
    fn test_slippage_bound_covers_impact() {
        let candidates: Vec<_> = (0..40)
            .map(|i| candidate(&format!("m{}", i), i * 250, i % 3 == 0))
            .collect();
        let plan = builder(4).build(&candidates);

        for step in plan.batches.iter().flat_map(|b| &b.steps) {
            assert!(step.slippage_bps >= step.price_impact_bps);
            assert!(step.slippage_bps >= SlippagePolicy::default().slippage(step.price_impact_bps, step.forced));
            assert_eq!(step.min_out, apply_slippage(step.quoted_out, step.slippage_bps));
        }
    }

    #[test]
    fn test_duplicate_token_rejected() {
        let plan = builder(3).build(&[candidate("dup", 10, false), candidate("dup", 10, false)]);

        assert_eq!(plan.step_count(), 1);
        assert_eq!(plan.rejected, vec![("dup".to_string(), SweepError::DuplicateToken)]);
    }

    #[test]
    fn test_boost_widens_bound() {
        let plan = builder(1).build(&[candidate("a", 100, false)]);
        let step = &plan.batches[0].steps[0];
        assert_eq!(step.slippage_bps, 150);
        assert!(step.use_full_balance);

        let boosted = builder(1).boost(step);
        assert_eq!(boosted.slippage_bps, 600);
        assert!(boosted.forced);
        assert!(boosted.min_out < step.min_out);
    }
}
