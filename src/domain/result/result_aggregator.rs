use chrono::Utc;
use tracing::{info, warn};

use super::{SwapResult, SweepReport};
use crate::domain::session::{SweepSession, SwapStatus};

/// Split `delta` across `weights` pro-rata. The last entry takes the rounding
/// remainder, so the shares always sum to `delta`.
pub fn attribute(delta: u64, weights: &[u64]) -> Vec<u64> {
    if weights.is_empty() {
        return Vec::new();
    }

    let total: u128 = weights.iter().map(|&w| w as u128).sum();
    let last = weights.len() - 1;
    let mut shares = Vec::with_capacity(weights.len());
    let mut assigned = 0u64;

    for (i, &weight) in weights.iter().enumerate() {
        let share = if i == last {
            delta - assigned
        } else if total == 0 {
            0
        } else {
            (delta as u128 * weight as u128 / total) as u64
        };
        assigned += share;
        shares.push(share);
    }

    shares
}

pub struct ResultAggregator;

impl ResultAggregator {
    /// Build the report: one result per selected token, realized output
    /// attributed from the output-asset balance delta.
    pub fn reconcile(session: &SweepSession, balance_before: Option<u64>, balance_after: Option<u64>) -> SweepReport {
        let mut results: Vec<SwapResult> = session
            .entries()
            .iter()
            .map(|entry| {
                let quote = entry.quote.as_ref();
                let (status, error, receipt) = match &entry.outcome {
                    Some(outcome) => (outcome.status, outcome.error.clone(), outcome.receipt.clone()),
                    None => {
                        warn!("{} has no terminal outcome, reporting as skipped", entry.token.mint);
                        (SwapStatus::Skipped, None, None)
                    }
                };

                SwapResult {
                    mint: entry.token.mint.clone(),
                    symbol: entry.token.symbol.clone(),
                    status,
                    input_amount: quote.map(|q| q.quote.amount_in).unwrap_or(entry.token.raw_balance),
                    input_usd: quote
                        .map(|q| q.input_usd)
                        .or_else(|| entry.token.usd_value())
                        .unwrap_or(0.0),
                    quoted_output: quote.map(|q| q.quote.amount_out).unwrap_or(0),
                    quoted_output_usd: quote.map(|q| q.output_usd).unwrap_or(0.0),
                    realized_output: None,
                    reason: match (&error, status) {
                        (Some(e), _) => Some(e.to_string()),
                        (None, SwapStatus::Success) => None,
                        (None, _) => Some("not processed".to_string()),
                    },
                    error,
                    receipt,
                }
            })
            .collect();

        let success_idx: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status == SwapStatus::Success)
            .map(|(i, _)| i)
            .collect();
        let quoted_output: u64 = success_idx.iter().map(|&i| results[i].quoted_output).sum();

        let realized_output = match (balance_before, balance_after) {
            (Some(before), Some(after)) => {
                if after < before {
                    warn!("Output balance decreased during sweep ({} -> {})", before, after);
                }
                let delta = after.saturating_sub(before);
                let weights: Vec<u64> = success_idx.iter().map(|&i| results[i].quoted_output).collect();
                for (&i, share) in success_idx.iter().zip(attribute(delta, &weights)) {
                    results[i].realized_output = Some(share);
                }
                Some(delta)
            }
            _ => None,
        };

        let efficiency = match realized_output {
            Some(realized) if quoted_output > 0 => Some(realized as f64 / quoted_output as f64),
            _ => None,
        };

        let count = |status: SwapStatus| results.iter().filter(|r| r.status == status).count();
        let report = SweepReport {
            session_id: session.id().to_string(),
            output_mint: session.output().mint.clone(),
            output_symbol: session.output().symbol.clone(),
            started_at: session.started_at(),
            finished_at: Utc::now(),
            succeeded: count(SwapStatus::Success),
            failed: count(SwapStatus::Failed),
            skipped: count(SwapStatus::Skipped),
            submissions: session.submissions(),
            balance_before,
            balance_after,
            quoted_output,
            realized_output,
            efficiency,
            results,
        };

        info!(
            "📊 Sweep {}: {} succeeded, {} failed, {} skipped in {} submissions",
            report.session_id, report.succeeded, report.failed, report.skipped, report.submissions
        );
        report
    }
}
