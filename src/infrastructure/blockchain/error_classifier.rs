//! Failure classification at the chain boundary
//!
//! Structured transaction errors are preferred; program logs are only
//! consulted when the error itself is not specific enough.

use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::rpc_request::{RpcError, RpcResponseErrorData};
use solana_sdk::instruction::InstructionError;
use solana_sdk::transaction::TransactionError;

use crate::shared::errors::{RevertKind, SurfaceError};

/// Aggregator program: `SlippageToleranceExceeded`
pub const AGGREGATOR_SLIPPAGE_CODE: u32 = 6001;
/// SPL Token: `InsufficientFunds`
pub const TOKEN_INSUFFICIENT_FUNDS_CODE: u32 = 1;

pub fn classify(err: Option<&TransactionError>, logs: &[String]) -> RevertKind {
    let structured = err.map(classify_transaction_error).unwrap_or(RevertKind::Unknown);
    match structured {
        RevertKind::Unknown | RevertKind::Program(_) => classify_logs(logs).unwrap_or(structured),
        kind => kind,
    }
}

pub fn classify_transaction_error(err: &TransactionError) -> RevertKind {
    match err {
        TransactionError::InstructionError(_, ix_err) => match ix_err {
            InstructionError::Custom(AGGREGATOR_SLIPPAGE_CODE) => RevertKind::SlippageExceeded,
            InstructionError::Custom(TOKEN_INSUFFICIENT_FUNDS_CODE) | InstructionError::InsufficientFunds => {
                RevertKind::InsufficientFunds
            }
            InstructionError::Custom(code) => RevertKind::Program(*code),
            InstructionError::ComputationalBudgetExceeded => RevertKind::ComputeExceeded,
            _ => RevertKind::Unknown,
        },
        TransactionError::InsufficientFundsForFee | TransactionError::InsufficientFundsForRent { .. } => {
            RevertKind::InsufficientFunds
        }
        TransactionError::WouldExceedMaxBlockCostLimit
        | TransactionError::WouldExceedMaxAccountCostLimit
        | TransactionError::WouldExceedAccountDataBlockLimit => RevertKind::ComputeExceeded,
        _ => RevertKind::Unknown,
    }
}

pub fn classify_logs(logs: &[String]) -> Option<RevertKind> {
    logs.iter().rev().find_map(|line| {
        let line = line.to_lowercase();
        if line.contains("slippage") {
            Some(RevertKind::SlippageExceeded)
        } else if line.contains("insufficient funds") || line.contains("insufficient lamports") {
            Some(RevertKind::InsufficientFunds)
        } else if line.contains("exceeded cus meter") || line.contains("computational budget exceeded") {
            Some(RevertKind::ComputeExceeded)
        } else {
            None
        }
    })
}

/// Map a `send_transaction` failure to a surface error.
///
/// A transaction error here comes from preflight: the transaction never
/// reached the chain, so it is a rejection, not a revert.
pub fn classify_client_error(err: &ClientError) -> SurfaceError {
    let logs = preflight_logs(err.kind());
    match err.get_transaction_error() {
        Some(tx_err) => SurfaceError::Rejected {
            kind: classify(Some(&tx_err), &logs),
            message: tx_err.to_string(),
        },
        None => SurfaceError::Submission(err.to_string()),
    }
}

fn preflight_logs(kind: &ClientErrorKind) -> Vec<String> {
    match kind {
        ClientErrorKind::RpcError(RpcError::RpcResponseError {
            data: RpcResponseErrorData::SendTransactionPreflightFailure(result),
            ..
        }) => result.logs.clone().unwrap_or_default(),
        _ => Vec::new(),
    }
}
