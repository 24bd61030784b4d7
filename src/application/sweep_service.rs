//! Sweep use case: prefilter, quote, plan, execute and reconcile one session

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::execution::{DryRun, SweepExecutor};
use crate::domain::plan::{Plan, PlanBuilder, PlanCandidate};
use crate::domain::quote::QuoteBatcher;
use crate::domain::result::{BalanceOracle, ResultAggregator, SweepReport};
use crate::domain::session::{SweepSession, SwapStatus, TokenState};
use crate::shared::errors::{AppError, SweepError};
use crate::shared::types::{TokenBalance, Tradeability};
use crate::shared::utils::format_amount;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Wallet whose output-asset balance is reconciled.
    pub owner: String,
    pub min_usd_value: f64,
    pub simulate_only: bool,
}

/// Application service running a whole sweep against one execution surface
pub struct SweepService {
    quoter: Arc<QuoteBatcher>,
    planner: PlanBuilder,
    executor: SweepExecutor,
    oracle: Arc<dyn BalanceOracle>,
    settings: ServiceSettings,
}

impl SweepService {
    pub fn new(
        quoter: Arc<QuoteBatcher>,
        planner: PlanBuilder,
        executor: SweepExecutor,
        oracle: Arc<dyn BalanceOracle>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            quoter,
            planner,
            executor,
            oracle,
            settings,
        }
    }

    /// Open a session for `selection` (token, force) in the configured output asset.
    pub fn new_session(&self, selection: Vec<(TokenBalance, bool)>) -> SweepSession {
        SweepSession::new(self.quoter.output().clone(), selection)
    }

    /// Drive `session` to completion and return the reconciled report.
    ///
    /// Token-level failures end up in the report; only session bookkeeping
    /// errors abort the run.
    pub async fn run(&self, session: &mut SweepSession, cancel: &CancellationToken) -> Result<SweepReport, AppError> {
        info!(
            "🧹 Sweep {} started: {} tokens into {}",
            session.id(),
            session.entries().len(),
            session.output().symbol
        );

        if cancel.is_cancelled() {
            warn!("🛑 Sweep cancelled before quoting");
            for mint in session.unresolved() {
                session.finish(&mint, SwapStatus::Skipped, Some(SweepError::UserCancelled), None)?;
            }
            return Ok(self.finish(session, None, None));
        }

        let eligible = self.prefilter(session)?;
        let plan = self.quote_and_plan(session, eligible).await?;

        if plan.batches.is_empty() {
            info!("Nothing to execute");
            return Ok(self.finish(session, None, None));
        }

        if self.settings.simulate_only {
            self.simulate(session, plan).await?;
            return Ok(self.finish(session, None, None));
        }

        let output = session.output().mint.clone();
        let before = self.read_balance(&output).await;
        for batch in plan.batches {
            self.executor.run_batch(batch, session, cancel).await?;
        }
        let after = self.read_balance(&output).await;

        Ok(self.finish(session, before, after))
    }

    /// Skip tokens that can never be swapped, returning the rest in session order.
    fn prefilter(&self, session: &mut SweepSession) -> Result<Vec<TokenBalance>, AppError> {
        let output = session.output().mint.clone();
        let mut skipped = Vec::new();
        let mut eligible = Vec::new();

        for entry in session.entries() {
            let token = &entry.token;
            let reason = if token.mint == output {
                Some(SweepError::AlreadyOutputAsset)
            } else if token.tradeable == Tradeability::Untradeable {
                Some(SweepError::NotTradeable)
            } else if token.raw_balance == 0
                || token.usd_value().is_some_and(|usd| usd < self.settings.min_usd_value)
            {
                Some(SweepError::BelowMinimumValue)
            } else {
                None
            };

            match reason {
                Some(reason) => skipped.push((token.mint.clone(), reason)),
                None => eligible.push(token.clone()),
            }
        }

        for (mint, reason) in skipped {
            info!("⏭️  Skipping {}: {}", mint, reason);
            session.finish(&mint, SwapStatus::Skipped, Some(reason), None)?;
        }
        Ok(eligible)
    }

    async fn quote_and_plan(&self, session: &mut SweepSession, tokens: Vec<TokenBalance>) -> Result<Plan, AppError> {
        let requests: Vec<(TokenBalance, u64)> = tokens.iter().map(|t| (t.clone(), t.raw_balance)).collect();
        let mut round = self.quoter.fetch_quotes(&requests).await;

        for failure in &round.failures {
            warn!("⚠️  No quote for {}: {}", failure.mint, failure.error);
            session.finish(&failure.mint, SwapStatus::Failed, Some(failure.error.clone().into()), None)?;
        }

        let mut candidates = Vec::with_capacity(round.len());
        for token in tokens {
            if session.state_of(&token.mint) != Some(TokenState::Discovered) {
                continue;
            }
            let Some(quote) = round.quotes.remove(&token.mint) else {
                session.finish(
                    &token.mint,
                    SwapStatus::Failed,
                    Some(SweepError::QuoteUnavailable("no quote returned".to_string())),
                    None,
                )?;
                continue;
            };

            session.set_quote(&token.mint, quote.clone())?;
            session.advance(&token.mint, TokenState::Quoted)?;
            let force = session.entry(&token.mint).is_some_and(|e| e.force);
            candidates.push(PlanCandidate { token, quote, force });
        }

        let plan = self.planner.build(&candidates);

        for (mint, reason) in &plan.rejected {
            session.advance(mint, TokenState::Rejected)?;
            session.finish(mint, SwapStatus::Skipped, Some(reason.clone()), None)?;
        }
        for batch in &plan.batches {
            for mint in batch.mints() {
                session.advance(mint, TokenState::Selected)?;
                session.advance(mint, TokenState::Batched)?;
            }
        }

        Ok(plan)
    }

    /// Dry-run every batch and report it; nothing is submitted.
    async fn simulate(&self, session: &mut SweepSession, plan: Plan) -> Result<(), AppError> {
        for batch in plan.batches {
            match self.executor.validator().validate(&batch.steps).await {
                DryRun::Valid { resource_estimate } => info!(
                    "🧪 Batch #{} ({} steps) would succeed, estimated {} units",
                    batch.index,
                    batch.len(),
                    resource_estimate
                ),
                DryRun::Invalid { reason } => {
                    warn!("🧪 Batch #{} ({} steps) would fail: {}", batch.index, batch.len(), reason)
                }
            }
            for step in &batch.steps {
                session.finish(&step.input_mint, SwapStatus::Skipped, Some(SweepError::SimulationOnly), None)?;
            }
        }
        Ok(())
    }

    async fn read_balance(&self, asset: &str) -> Option<u64> {
        match self.oracle.balance(asset, &self.settings.owner).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                error!("❌ Failed to read {} balance: {}", asset, e);
                None
            }
        }
    }

    fn finish(&self, session: &SweepSession, before: Option<u64>, after: Option<u64>) -> SweepReport {
        let report = ResultAggregator::reconcile(session, before, after);
        session.close();
        let received = report
            .realized_output
            .map(|amount| format_amount(amount, session.output().decimals))
            .unwrap_or_else(|| "n/a".to_string());
        info!(
            "🏁 Sweep {} finished: {} succeeded, {} failed, {} skipped, {} submissions, received {} {}",
            report.session_id,
            report.succeeded,
            report.failed,
            report.skipped,
            report.submissions,
            received,
            report.output_symbol
        );
        report
    }
}
