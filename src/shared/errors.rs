//! Error handling for the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Quote provider errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    #[error("No route found: {0}")]
    NoRoute(String),

    #[error("Quote provider rate limited the request")]
    RateLimited,

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Malformed quote response: {0}")]
    Malformed(String),
}

/// Why an atomic operation reverted, as far as the chain adapter can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "code")]
pub enum RevertKind {
    SlippageExceeded,
    InsufficientFunds,
    ComputeExceeded,
    Program(u32),
    Unknown,
}

impl std::fmt::Display for RevertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RevertKind::SlippageExceeded => write!(f, "slippage exceeded"),
            RevertKind::InsufficientFunds => write!(f, "insufficient funds"),
            RevertKind::ComputeExceeded => write!(f, "compute budget exceeded"),
            RevertKind::Program(code) => write!(f, "program error {:#x}", code),
            RevertKind::Unknown => write!(f, "unknown failure"),
        }
    }
}

/// Execution surface errors (dry run, submission, confirmation)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    /// The operation landed and failed on-chain.
    #[error("Reverted ({kind}): {message}")]
    Reverted { kind: RevertKind, message: String },

    /// Refused by preflight before reaching the chain; nothing was spent.
    #[error("Rejected by preflight ({kind}): {message}")]
    Rejected { kind: RevertKind, message: String },

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Could not encode operation: {0}")]
    Encoding(String),
}

/// Per-token failure taxonomy surfaced in the sweep report
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum SweepError {
    #[error("quote unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("impact exceeds threshold, requires force ({impact_bps} bps > {threshold_bps} bps)")]
    ImpactTooHigh { impact_bps: u32, threshold_bps: u32 },

    #[error("quote is stale ({age_ms}ms old)")]
    StaleQuote { age_ms: u64 },

    #[error("re-quote failed: {0}")]
    RequoteFailed(String),

    #[error("validation failed: {0}")]
    ValidationFailure(String),

    #[error("authorization failed: {0}")]
    AuthorizationFailure(String),

    #[error("reverted on-chain: {0}")]
    OnChainRevert(String),

    #[error("submission error: {0}")]
    SubmissionError(String),

    #[error("confirmation timed out, re-sweep to retry")]
    ConfirmationTimeout,

    #[error("cancelled by user")]
    UserCancelled,

    #[error("token is not tradeable")]
    NotTradeable,

    #[error("value below minimum")]
    BelowMinimumValue,

    #[error("already the output asset")]
    AlreadyOutputAsset,

    #[error("token already pending in another step")]
    DuplicateToken,

    #[error("simulation only, nothing submitted")]
    SimulationOnly,
}

impl From<QuoteError> for SweepError {
    fn from(err: QuoteError) -> Self {
        SweepError::QuoteUnavailable(err.to_string())
    }
}

/// Session bookkeeping errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Unknown token: {0}")]
    UnknownToken(String),

    #[error("Illegal transition for {mint}: {from} -> {to}")]
    IllegalTransition { mint: String, from: String, to: String },
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Discovery error: {0}")]
    DiscoveryError(String),

    #[error("Blockchain error: {0}")]
    BlockchainError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),
}

impl From<SurfaceError> for AppError {
    fn from(err: SurfaceError) -> Self {
        AppError::BlockchainError(err.to_string())
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        AppError::ExecutionError(err.to_string())
    }
}
