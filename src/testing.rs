//! In-memory fakes for the capability traits, shared by unit tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::execution::{Authorizer, DryRun, ExecutionSurface, Receipt, Submission};
use crate::domain::plan::SwapStep;
use crate::domain::quote::{PricedQuote, Quote, QuoteProvider, QuoteRequest};
use crate::domain::result::BalanceOracle;
use crate::domain::slippage::SlippagePolicy;
use crate::shared::errors::{QuoteError, RevertKind, SurfaceError};
use crate::shared::types::OutputAsset;
use crate::shared::utils::{apply_slippage, to_ui_amount};

pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

pub fn usdc() -> OutputAsset {
    OutputAsset {
        mint: USDC_MINT.to_string(),
        symbol: "USDC".to_string(),
        decimals: 6,
        unit_price_usd: 1.0,
    }
}

pub fn priced(mint: &str, amount_in: u64, amount_out: u64, impact_bps: u32) -> PricedQuote {
    let usd = to_ui_amount(amount_out, 6);
    PricedQuote {
        quote: Quote {
            input_mint: mint.to_string(),
            output_mint: USDC_MINT.to_string(),
            amount_in,
            amount_out,
            price_impact_bps: impact_bps,
            route_payload: format!("route:{}", mint).into_bytes(),
            fetched_at: Instant::now(),
        },
        input_usd: usd,
        output_usd: usd,
        price_impact_bps: impact_bps,
    }
}

/// A planned step for `mint` with 1:1 pricing and non-forced slippage.
pub fn step(mint: &str, impact_bps: u32) -> SwapStep {
    let slippage_bps = SlippagePolicy::default().slippage(impact_bps, false);
    SwapStep {
        input_mint: mint.to_string(),
        output_mint: USDC_MINT.to_string(),
        amount_in: 1_000_000,
        quoted_out: 1_000_000,
        min_out: apply_slippage(1_000_000, slippage_bps),
        slippage_bps,
        price_impact_bps: impact_bps,
        forced: false,
        use_full_balance: true,
        route_payload: format!("route:{}", mint).into_bytes(),
        quoted_at: Instant::now(),
    }
}

/// Scripted pricing for one mint
#[derive(Debug, Clone)]
pub struct QuoteScript {
    rate: f64,
    impact_bps: u32,
    size_penalty: Option<(u64, u32)>,
    error: Option<QuoteError>,
    succeed_first: Option<usize>,
}

impl QuoteScript {
    /// Output per input unit, with `impact_bps` reported as the provider impact.
    pub fn rate(rate: f64, impact_bps: u32) -> Self {
        Self {
            rate,
            impact_bps,
            size_penalty: None,
            error: None,
            succeed_first: None,
        }
    }

    pub fn failing(error: QuoteError) -> Self {
        Self {
            error: Some(error),
            ..Self::rate(0.0, 0)
        }
    }

    /// Amounts above `threshold` lose `penalty_bps` of output without it being reported.
    pub fn with_size_penalty(mut self, threshold: u64, penalty_bps: u32) -> Self {
        self.size_penalty = Some((threshold, penalty_bps));
        self
    }

    /// Quote normally for the first `calls` requests, then fail with `error`.
    pub fn failing_after(mut self, calls: usize, error: QuoteError) -> Self {
        self.succeed_first = Some(calls);
        self.error = Some(error);
        self
    }
}

#[derive(Default)]
struct ProviderState {
    scripts: HashMap<String, QuoteScript>,
    calls: Vec<(String, Duration)>,
}

pub struct FakeQuoteProvider {
    state: Mutex<ProviderState>,
    latency: Duration,
    created: Instant,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeQuoteProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProviderState::default()),
            latency: Duration::ZERO,
            created: Instant::now(),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn script(&self, mint: &str, script: QuoteScript) {
        self.state.lock().unwrap().scripts.insert(mint.to_string(), script);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Start offsets of every call since the provider was created, in call order.
    pub fn call_offsets(&self) -> Vec<Duration> {
        self.state.lock().unwrap().calls.iter().map(|(_, at)| *at).collect()
    }

    pub fn calls_for(&self, mint: &str) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|(m, _)| m == mint).count()
    }
}

#[async_trait]
impl QuoteProvider for FakeQuoteProvider {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, QuoteError> {
        let (script, call_number) = {
            let mut state = self.state.lock().unwrap();
            state.calls.push((request.input_mint.clone(), self.created.elapsed()));
            let call_number = state.calls.iter().filter(|(m, _)| *m == request.input_mint).count();
            (state.scripts.get(&request.input_mint).cloned(), call_number)
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let script = script.ok_or_else(|| QuoteError::NoRoute(format!("unscripted mint {}", request.input_mint)))?;
        if let Some(error) = &script.error {
            if script.succeed_first.map_or(true, |n| call_number > n) {
                return Err(error.clone());
            }
        }

        let base = (request.amount as f64 * script.rate) as u64;
        let amount_out = match script.size_penalty {
            Some((threshold, penalty_bps)) if request.amount > threshold => apply_slippage(base, penalty_bps),
            _ => base,
        };

        Ok(Quote {
            input_mint: request.input_mint.clone(),
            output_mint: request.output_mint.clone(),
            amount_in: request.amount,
            amount_out,
            price_impact_bps: script.impact_bps,
            route_payload: format!("route:{}", request.input_mint).into_bytes(),
            fetched_at: Instant::now(),
        })
    }
}

/// Output-asset balances kept in memory
#[derive(Default)]
pub struct FakeOracle {
    balances: Mutex<HashMap<String, u64>>,
}

impl FakeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, asset: &str, amount: u64) {
        self.balances.lock().unwrap().insert(asset.to_string(), amount);
    }

    pub fn credit(&self, asset: &str, amount: u64) {
        *self.balances.lock().unwrap().entry(asset.to_string()).or_insert(0) += amount;
    }
}

#[async_trait]
impl BalanceOracle for FakeOracle {
    async fn balance(&self, asset: &str, _owner: &str) -> Result<u64, SurfaceError> {
        Ok(self.balances.lock().unwrap().get(asset).copied().unwrap_or(0))
    }
}

#[derive(Default)]
struct SurfaceState {
    validated: Vec<(String, u32)>,
    recipients: Vec<String>,
    submitted_limits: Vec<u64>,
    pending: HashMap<String, Vec<SwapStep>>,
}

/// Execution surface with scripted failures.
///
/// Each step costs 100_000 resource units. A successful confirmation credits
/// the attached oracle with the steps' quoted output scaled by `fill_bps`.
pub struct FakeSurface {
    capacity: usize,
    poisoned: HashSet<String>,
    reverting: HashMap<String, RevertKind>,
    validation_error: Option<SurfaceError>,
    never_confirm: bool,
    max_valid: Option<usize>,
    max_submission: Option<usize>,
    preflight: Option<(usize, RevertKind)>,
    validation_latency: Duration,
    fill_bps: u32,
    oracle: Option<Arc<FakeOracle>>,
    validations: AtomicUsize,
    validating: AtomicUsize,
    max_validating: AtomicUsize,
    submissions: AtomicUsize,
    state: Mutex<SurfaceState>,
}

impl FakeSurface {
    pub fn new() -> Self {
        Self {
            capacity: 3,
            poisoned: HashSet::new(),
            reverting: HashMap::new(),
            validation_error: None,
            never_confirm: false,
            max_valid: None,
            max_submission: None,
            preflight: None,
            validation_latency: Duration::ZERO,
            fill_bps: 10_000,
            oracle: None,
            validations: AtomicUsize::new(0),
            validating: AtomicUsize::new(0),
            max_validating: AtomicUsize::new(0),
            submissions: AtomicUsize::new(0),
            state: Mutex::new(SurfaceState::default()),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Any dry run containing `mint` fails.
    pub fn poison(mut self, mint: &str) -> Self {
        self.poisoned.insert(mint.to_string());
        self
    }

    /// Dry runs pass but confirmation of an operation containing `mint` reverts.
    pub fn revert_on_chain(mut self, mint: &str, kind: RevertKind) -> Self {
        self.reverting.insert(mint.to_string(), kind);
        self
    }

    pub fn fail_validation_with(mut self, error: SurfaceError) -> Self {
        self.validation_error = Some(error);
        self
    }

    pub fn never_confirm(mut self) -> Self {
        self.never_confirm = true;
        self
    }

    /// Dry runs of more than `steps` steps fail.
    pub fn invalid_above(mut self, steps: usize) -> Self {
        self.max_valid = Some(steps);
        self
    }

    /// Submissions of more than `steps` steps fail in transport.
    pub fn reject_submissions_larger_than(mut self, steps: usize) -> Self {
        self.max_submission = Some(steps);
        self
    }

    /// Submissions of more than `steps` steps are refused by preflight with `kind`.
    pub fn preflight_reject_larger_than(mut self, steps: usize, kind: RevertKind) -> Self {
        self.preflight = Some((steps, kind));
        self
    }

    pub fn with_validation_latency(mut self, latency: Duration) -> Self {
        self.validation_latency = latency;
        self
    }

    pub fn filling(mut self, fill_bps: u32, oracle: Arc<FakeOracle>) -> Self {
        self.fill_bps = fill_bps;
        self.oracle = Some(oracle);
        self
    }

    pub fn validations(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_validations(&self) -> usize {
        self.max_validating.load(Ordering::SeqCst)
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Recipients seen by dry runs and submissions, in call order.
    pub fn recipients(&self) -> Vec<String> {
        self.state.lock().unwrap().recipients.clone()
    }

    pub fn submitted_limits(&self) -> Vec<u64> {
        self.state.lock().unwrap().submitted_limits.clone()
    }

    /// Slippage bounds `mint` was dry-run with, in order.
    pub fn validated_slippage(&self, mint: &str) -> Vec<u32> {
        self.state
            .lock()
            .unwrap()
            .validated
            .iter()
            .filter(|(m, _)| m == mint)
            .map(|(_, bps)| *bps)
            .collect()
    }
}

#[async_trait]
impl ExecutionSurface for FakeSurface {
    fn name(&self) -> &str {
        "fake"
    }

    fn capacity_limit(&self) -> usize {
        self.capacity
    }

    async fn validate(&self, steps: &[SwapStep], recipient: &str) -> Result<DryRun, SurfaceError> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.state.lock().unwrap();
            state
                .validated
                .extend(steps.iter().map(|s| (s.input_mint.clone(), s.slippage_bps)));
            state.recipients.push(recipient.to_string());
        }

        let now = self.validating.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_validating.fetch_max(now, Ordering::SeqCst);
        if !self.validation_latency.is_zero() {
            tokio::time::sleep(self.validation_latency).await;
        }
        self.validating.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = &self.validation_error {
            return Err(error.clone());
        }
        if self.max_valid.is_some_and(|max| steps.len() > max) {
            return Ok(DryRun::Invalid {
                reason: format!("{} steps exceed the compute budget", steps.len()),
            });
        }
        if let Some(bad) = steps.iter().find(|s| self.poisoned.contains(&s.input_mint)) {
            return Ok(DryRun::Invalid {
                reason: format!("custom program error: 0x1771 ({})", bad.input_mint),
            });
        }
        Ok(DryRun::Valid {
            resource_estimate: 100_000 * steps.len() as u64,
        })
    }

    async fn submit(&self, steps: &[SwapStep], recipient: &str, resource_limit: u64) -> Result<Submission, SurfaceError> {
        if self.max_submission.is_some_and(|max| steps.len() > max) {
            return Err(SurfaceError::Submission("transaction too large".to_string()));
        }
        if let Some((max, kind)) = self.preflight {
            if steps.len() > max {
                return Err(SurfaceError::Rejected {
                    kind,
                    message: "preflight simulation failed".to_string(),
                });
            }
        }

        let n = self.submissions.fetch_add(1, Ordering::SeqCst);
        let id = format!("sig{}", n);
        let mut state = self.state.lock().unwrap();
        state.recipients.push(recipient.to_string());
        state.submitted_limits.push(resource_limit);
        state.pending.insert(id.clone(), steps.to_vec());

        Ok(Submission {
            id,
            step_count: steps.len(),
        })
    }

    async fn confirm(&self, submission: &Submission) -> Result<Receipt, SurfaceError> {
        if self.never_confirm {
            std::future::pending::<()>().await;
        }

        let steps = self
            .state
            .lock()
            .unwrap()
            .pending
            .remove(&submission.id)
            .unwrap_or_default();

        if let Some(kind) = steps.iter().find_map(|s| self.reverting.get(&s.input_mint)) {
            return Err(SurfaceError::Reverted {
                kind: *kind,
                message: "swap instruction failed".to_string(),
            });
        }

        if let Some(oracle) = &self.oracle {
            for step in &steps {
                let filled = (step.quoted_out as u128 * self.fill_bps as u128 / 10_000) as u64;
                oracle.credit(&step.output_mint, filled);
            }
        }

        Ok(Receipt {
            id: submission.id.clone(),
        })
    }
}

#[derive(Default)]
struct AuthorizerState {
    allowances: HashMap<String, u64>,
    approvals: Vec<(String, u64)>,
}

/// Allowance book for a single spender
pub struct FakeAuthorizer {
    requires_reset: bool,
    delays: HashMap<String, Duration>,
    failing: HashSet<String>,
    state: Mutex<AuthorizerState>,
}

impl FakeAuthorizer {
    pub fn new() -> Self {
        Self {
            requires_reset: false,
            delays: HashMap::new(),
            failing: HashSet::new(),
            state: Mutex::new(AuthorizerState::default()),
        }
    }

    pub fn requiring_reset(mut self) -> Self {
        self.requires_reset = true;
        self
    }

    pub fn with_allowance(self, mint: &str, amount: u64) -> Self {
        self.state.lock().unwrap().allowances.insert(mint.to_string(), amount);
        self
    }

    /// Allowance queries for `mint` take `delay`.
    pub fn with_delay(mut self, mint: &str, delay: Duration) -> Self {
        self.delays.insert(mint.to_string(), delay);
        self
    }

    pub fn failing_for(mut self, mint: &str) -> Self {
        self.failing.insert(mint.to_string());
        self
    }

    pub fn approvals(&self) -> Vec<(String, u64)> {
        self.state.lock().unwrap().approvals.clone()
    }
}

#[async_trait]
impl Authorizer for FakeAuthorizer {
    fn spender(&self) -> Option<&str> {
        Some("spender")
    }

    fn requires_reset(&self) -> bool {
        self.requires_reset
    }

    async fn allowance(&self, mint: &str, _spender: &str) -> Result<u64, SurfaceError> {
        if let Some(delay) = self.delays.get(mint) {
            tokio::time::sleep(*delay).await;
        }
        Ok(self.state.lock().unwrap().allowances.get(mint).copied().unwrap_or(0))
    }

    async fn approve(&self, mint: &str, _spender: &str, amount: u64) -> Result<(), SurfaceError> {
        if self.failing.contains(mint) {
            return Err(SurfaceError::Submission("approve rejected".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.approvals.push((mint.to_string(), amount));
        state.allowances.insert(mint.to_string(), amount);
        Ok(())
    }
}
