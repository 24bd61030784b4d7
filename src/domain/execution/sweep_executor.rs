//! Batch executor: authorize, refresh, validate, isolate, submit, confirm, retry

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ensure_authorized, Authorizer, BatchValidator, DryRun, ExecutionSurface, ProblemIsolator, Receipt};
use crate::domain::plan::{ExecutionBatch, PlanBuilder, SwapStep};
use crate::domain::quote::QuoteBatcher;
use crate::domain::session::{SweepEvent, SweepSession, SwapStatus, TokenState};
use crate::shared::config::{ExecutionConfig, QuotingConfig};
use crate::shared::errors::{SessionError, SurfaceError, SweepError};
use crate::shared::utils::with_headroom;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Extra resource budget on top of the dry-run estimate, in percent.
    pub headroom_pct: u32,
    pub confirmation_timeout: Duration,
    pub staleness_window: Duration,
    /// Leave-one-out dry runs in flight at once during isolation.
    pub validation_concurrency: usize,
    /// Receiver of the output asset.
    pub recipient: String,
}

impl ExecutorConfig {
    pub fn from_config(execution: &ExecutionConfig, quoting: &QuotingConfig, recipient: impl Into<String>) -> Self {
        Self {
            headroom_pct: execution.headroom_pct,
            confirmation_timeout: Duration::from_millis(execution.confirmation_timeout_ms),
            staleness_window: quoting.staleness_window(),
            validation_concurrency: execution.validation_concurrency,
            recipient: recipient.into(),
        }
    }
}

/// How a submitted operation ended
enum Settlement {
    Confirmed(Receipt),
    Failed(SweepError),
    /// Rejected before reaching the chain; safe to retry.
    Retryable(String),
}

/// Runs execution batches one at a time against a single surface.
///
/// Every token of a batch handed to [`run_batch`](Self::run_batch) leaves it
/// in a terminal state.
pub struct SweepExecutor {
    surface: Arc<dyn ExecutionSurface>,
    validator: Arc<BatchValidator>,
    isolator: ProblemIsolator,
    authorizer: Arc<dyn Authorizer>,
    quoter: Arc<QuoteBatcher>,
    planner: PlanBuilder,
    config: ExecutorConfig,
}

impl SweepExecutor {
    pub fn new(
        surface: Arc<dyn ExecutionSurface>,
        authorizer: Arc<dyn Authorizer>,
        quoter: Arc<QuoteBatcher>,
        planner: PlanBuilder,
        config: ExecutorConfig,
    ) -> Self {
        let validator = Arc::new(BatchValidator::new(surface.clone(), config.recipient.clone()));
        Self {
            surface,
            isolator: ProblemIsolator::new(validator.clone(), config.validation_concurrency),
            validator,
            authorizer,
            quoter,
            planner,
            config,
        }
    }

    pub fn validator(&self) -> &BatchValidator {
        &self.validator
    }

    pub fn surface(&self) -> &Arc<dyn ExecutionSurface> {
        &self.surface
    }

    pub async fn run_batch(
        &self,
        batch: ExecutionBatch,
        session: &mut SweepSession,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        let index = batch.index;
        info!("🚀 Executing batch #{} ({} steps)", index, batch.len());

        if cancel.is_cancelled() {
            return self.skip_cancelled(session, &batch.steps);
        }

        let mut steps = Vec::with_capacity(batch.len());
        for step in batch.steps {
            if !session.claim_pending(&step.input_mint) {
                warn!("⚠️  {} is already pending, dropping duplicate step", step.input_mint);
                session.finish(&step.input_mint, SwapStatus::Skipped, Some(SweepError::DuplicateToken), None)?;
                continue;
            }
            steps.push(step);
        }

        // 1. authorization
        let auth_started = Instant::now();
        let mut authorized = Vec::with_capacity(steps.len());
        for step in steps {
            match ensure_authorized(self.authorizer.as_ref(), &step.input_mint, step.amount_in).await {
                Ok(outcome) => {
                    debug!("Authorization for {}: {:?}", step.input_mint, outcome);
                    authorized.push(step);
                }
                Err(e) => {
                    error!("❌ Authorization failed for {}: {}", step.input_mint, e);
                    session.finish(&step.input_mint, SwapStatus::Failed, Some(e), None)?;
                }
            }
        }
        let auth_elapsed = auth_started.elapsed();

        if authorized.is_empty() {
            return Ok(());
        }

        let window = self.config.staleness_window;
        let oldest = authorized
            .iter()
            .map(SwapStep::quote_age)
            .max()
            .unwrap_or_default();
        let steps = if auth_elapsed > window || oldest > window {
            let reason = SweepError::StaleQuote {
                age_ms: oldest.as_millis() as u64,
            };
            info!(
                "🔄 Quotes for batch #{} went stale (authorization took {:?}): {}",
                index, auth_elapsed, reason
            );
            self.refresh(index, authorized, session, reason).await?
        } else {
            authorized
        };

        if steps.is_empty() {
            return Ok(());
        }

        // 2. validation, isolation on failure
        let (core, estimate, quarantined) = match self.validator.validate(&steps).await {
            DryRun::Valid { resource_estimate } => (steps, Some(resource_estimate), Vec::new()),
            DryRun::Invalid { reason } => {
                warn!("🧪 Batch #{} failed validation: {}", index, reason);
                let isolation = self.isolator.isolate(steps).await;
                (isolation.core, isolation.resource_estimate, isolation.quarantined)
            }
        };

        for step in &core {
            session.advance(&step.input_mint, TokenState::Validated)?;
        }
        for step in &quarantined {
            session.advance(&step.input_mint, TokenState::Quarantined)?;
        }

        // 3-4. submission and confirmation of the validated core
        let mut retry: Vec<SwapStep> = quarantined;
        if let (false, Some(estimate)) = (core.is_empty(), estimate) {
            if cancel.is_cancelled() {
                self.skip_cancelled(session, &core)?;
                return self.skip_cancelled(session, &retry);
            }

            for step in &core {
                session.advance(&step.input_mint, TokenState::Executing)?;
            }

            match self.submit_and_confirm(index, &core, estimate, session).await {
                Settlement::Confirmed(receipt) => {
                    info!("✅ Batch #{} confirmed: {}", index, receipt.id);
                    for step in &core {
                        session.finish(&step.input_mint, SwapStatus::Success, None, Some(receipt.id.clone()))?;
                    }
                }
                Settlement::Failed(reason) => {
                    error!("❌ Batch #{} failed: {}", index, reason);
                    for step in &core {
                        session.finish(&step.input_mint, SwapStatus::Failed, Some(reason.clone()), None)?;
                    }
                }
                Settlement::Retryable(reason) => {
                    warn!("⚠️  Batch #{} was not submitted ({}), retrying individually", index, reason);
                    for step in &core {
                        session.advance(&step.input_mint, TokenState::RetryIndividually)?;
                    }
                    retry.extend(core);
                }
            }
        }

        // 5. individual retries
        for step in retry {
            let mint = step.input_mint.clone();
            if cancel.is_cancelled() {
                session.finish(&mint, SwapStatus::Skipped, Some(SweepError::UserCancelled), None)?;
                continue;
            }
            if session.state_of(&mint) == Some(TokenState::Quarantined) {
                session.advance(&mint, TokenState::RetryIndividually)?;
            }

            match self.retry_individually(index, step, session).await? {
                Ok(receipt) => {
                    info!("✅ {} swapped individually: {}", mint, receipt.id);
                    session.finish(&mint, SwapStatus::Success, None, Some(receipt.id))?;
                }
                Err(reason) => {
                    warn!("❌ Individual retry of {} failed: {}", mint, reason);
                    session.finish(&mint, SwapStatus::Failed, Some(reason), None)?;
                }
            }
        }

        Ok(())
    }

    /// Re-quote every step from the source and re-plan it. Tokens that cannot
    /// be re-quoted or re-planned are finished here and dropped from the
    /// returned list.
    async fn refresh(
        &self,
        index: usize,
        steps: Vec<SwapStep>,
        session: &mut SweepSession,
        reason: SweepError,
    ) -> Result<Vec<SwapStep>, SessionError> {
        let mut requests = Vec::with_capacity(steps.len());
        for step in &steps {
            if let Some(entry) = session.entry(&step.input_mint) {
                requests.push((entry.token.clone(), step.amount_in));
            }
        }

        let mut round = self.quoter.refetch_quotes(&requests).await;
        let mut refreshed = Vec::with_capacity(steps.len());

        for step in steps {
            let mint = step.input_mint;
            let Some(priced) = round.quotes.remove(&mint) else {
                let reason = round
                    .failures
                    .iter()
                    .find(|f| f.mint == mint)
                    .map(|f| f.error.to_string())
                    .unwrap_or_else(|| "no quote returned".to_string());
                session.finish(&mint, SwapStatus::Failed, Some(SweepError::RequoteFailed(reason)), None)?;
                continue;
            };

            let Some(entry) = session.entry(&mint) else {
                return Err(SessionError::UnknownToken(mint));
            };
            let (token, force) = (entry.token.clone(), entry.force);
            let planned = self.planner.plan_step(&token, &priced, force);
            session.set_quote(&mint, priced)?;

            match planned {
                Ok(step) => refreshed.push(step),
                Err(reason) => {
                    info!("⏭️  {} no longer qualifies after re-quote: {}", mint, reason);
                    session.finish(&mint, SwapStatus::Skipped, Some(reason), None)?;
                }
            }
        }

        session.emit(SweepEvent::QuotesRefreshed {
            batch: index,
            refreshed: refreshed.len(),
            reason,
        });
        Ok(refreshed)
    }

    async fn retry_individually(
        &self,
        index: usize,
        step: SwapStep,
        session: &mut SweepSession,
    ) -> Result<Result<Receipt, SweepError>, SessionError> {
        let boosted = if step.is_stale(self.config.staleness_window) {
            let Some(entry) = session.entry(&step.input_mint) else {
                return Err(SessionError::UnknownToken(step.input_mint));
            };
            let token = entry.token.clone();
            match self.quoter.refetch_one(&token, step.amount_in).await {
                Ok(priced) => {
                    let planned = self.planner.plan_step(&token, &priced, true);
                    session.set_quote(&step.input_mint, priced)?;
                    match planned {
                        Ok(step) => step,
                        Err(reason) => return Ok(Err(reason)),
                    }
                }
                Err(e) => return Ok(Err(SweepError::RequoteFailed(e.to_string()))),
            }
        } else {
            self.planner.boost(&step)
        };

        debug!(
            "🔁 Retrying {} alone with slippage {}bps",
            boosted.input_mint, boosted.slippage_bps
        );

        let single = [boosted];
        let estimate = match self.validator.validate(&single).await {
            DryRun::Valid { resource_estimate } => resource_estimate,
            DryRun::Invalid { reason } => return Ok(Err(SweepError::ValidationFailure(reason))),
        };

        Ok(match self.submit_and_confirm(index, &single, estimate, session).await {
            Settlement::Confirmed(receipt) => Ok(receipt),
            Settlement::Failed(reason) => Err(reason),
            Settlement::Retryable(reason) => Err(SweepError::SubmissionError(reason)),
        })
    }

    async fn submit_and_confirm(
        &self,
        index: usize,
        steps: &[SwapStep],
        estimate: u64,
        session: &mut SweepSession,
    ) -> Settlement {
        let resource_limit = with_headroom(estimate, self.config.headroom_pct);

        let submission = match self
            .surface
            .submit(steps, &self.config.recipient, resource_limit)
            .await
        {
            Ok(submission) => submission,
            Err(e) => {
                let reason = e.to_string();
                session.emit(SweepEvent::BatchFailed {
                    batch: index,
                    reason: reason.clone(),
                });
                // only a landed operation is terminal; anything refused before the chain is retried
                return match e {
                    SurfaceError::Reverted { .. } => Settlement::Failed(SweepError::OnChainRevert(reason)),
                    SurfaceError::Rejected { .. } | SurfaceError::Submission(_) | SurfaceError::Encoding(_) => {
                        Settlement::Retryable(reason)
                    }
                };
            }
        };

        session.record_submission();
        info!(
            "📤 Submitted {} ({} steps, resource limit {})",
            submission.id, submission.step_count, resource_limit
        );
        session.emit(SweepEvent::BatchSubmitted {
            batch: index,
            submission: submission.id.clone(),
            steps: steps.len(),
        });

        let settlement = match timeout(self.config.confirmation_timeout, self.surface.confirm(&submission)).await {
            Ok(Ok(receipt)) => {
                session.emit(SweepEvent::BatchConfirmed {
                    batch: index,
                    receipt: receipt.id.clone(),
                });
                return Settlement::Confirmed(receipt);
            }
            Ok(Err(e @ SurfaceError::Reverted { .. })) => Settlement::Failed(SweepError::OnChainRevert(e.to_string())),
            Err(_) => Settlement::Failed(SweepError::ConfirmationTimeout),
            // the operation may already have landed, so it is not resubmitted
            Ok(Err(e)) => Settlement::Failed(SweepError::SubmissionError(e.to_string())),
        };

        if let Settlement::Failed(reason) = &settlement {
            session.emit(SweepEvent::BatchFailed {
                batch: index,
                reason: reason.to_string(),
            });
        }
        settlement
    }

    fn skip_cancelled(&self, session: &mut SweepSession, steps: &[SwapStep]) -> Result<(), SessionError> {
        for step in steps {
            info!("⏹️  Skipping {}: cancelled", step.input_mint);
            session.finish(&step.input_mint, SwapStatus::Skipped, Some(SweepError::UserCancelled), None)?;
        }
        Ok(())
    }
}
