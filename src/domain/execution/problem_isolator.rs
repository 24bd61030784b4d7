//! Exclusion search over a batch that failed its dry run
//!
//! Each member is removed in turn and the remainder re-validated; the first
//! removal (by position) that yields a valid remainder quarantines that
//! member. When no single removal helps, every member is quarantined and
//! retried on its own. No deeper subset search is attempted, so cost stays at
//! O(n²) dry runs for batches bounded by the surface capacity.
//!
//! Leave-one-out candidates are dry-run `concurrency` at a time; a window is
//! fully settled before the next one starts.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use super::{BatchValidator, DryRun};
use crate::domain::plan::SwapStep;

#[derive(Debug, Clone, PartialEq)]
pub struct Isolation {
    /// Validated remainder, possibly empty.
    pub core: Vec<SwapStep>,
    pub resource_estimate: Option<u64>,
    pub quarantined: Vec<SwapStep>,
    pub validations: usize,
}

pub struct ProblemIsolator {
    validator: Arc<BatchValidator>,
    concurrency: usize,
}

impl ProblemIsolator {
    pub fn new(validator: Arc<BatchValidator>, concurrency: usize) -> Self {
        Self {
            validator,
            concurrency: concurrency.max(1),
        }
    }

    /// Shrink `failing` (already known to fail validation) to a valid core.
    pub async fn isolate(&self, failing: Vec<SwapStep>) -> Isolation {
        let mut validations = 0;

        if failing.len() > 1 {
            let positions: Vec<usize> = (0..failing.len()).collect();

            for window in positions.chunks(self.concurrency) {
                let results = join_all(window.iter().map(|&i| {
                    let candidate = without(&failing, i);
                    async move {
                        let outcome = self.validator.validate(&candidate).await;
                        (i, candidate, outcome)
                    }
                }))
                .await;
                validations += results.len();

                // join_all keeps input order, so the first hit is the lowest position
                let hit = results.into_iter().find_map(|(i, candidate, outcome)| match outcome {
                    DryRun::Valid { resource_estimate } => Some((i, candidate, resource_estimate)),
                    DryRun::Invalid { .. } => None,
                });

                if let Some((i, core, resource_estimate)) = hit {
                    let mut remaining = failing;
                    let problem = remaining.remove(i);
                    info!(
                        "🔬 Isolated {} as the failing member ({} dry runs)",
                        problem.input_mint, validations
                    );
                    return Isolation {
                        core,
                        resource_estimate: Some(resource_estimate),
                        quarantined: vec![problem],
                        validations,
                    };
                }
            }
        }

        warn!(
            "🔬 Isolation inconclusive for {} steps, quarantining all ({} dry runs)",
            failing.len(),
            validations
        );
        Isolation {
            core: Vec::new(),
            resource_estimate: None,
            quarantined: failing,
            validations,
        }
    }
}

fn without(steps: &[SwapStep], skip: usize) -> Vec<SwapStep> {
    steps
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != skip)
        .map(|(_, s)| s.clone())
        .collect()
}
