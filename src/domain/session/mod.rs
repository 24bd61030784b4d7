//! Sweep session - the aggregate root threaded through every pipeline stage
//!
//! The session owns per-token state, the quotes that were committed, the
//! terminal outcome of every token and the pending set that guarantees a token
//! is in at most one in-flight step. Consumers (CLI, UI) observe progress
//! through [`SweepEvent`]s instead of participating in the algorithm.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::quote::PricedQuote;
use crate::shared::errors::{SessionError, SweepError};
use crate::shared::types::{OutputAsset, TokenBalance};
use crate::shared::utils::generate_id;

/// Per-token lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    Discovered,
    Quoted,
    Selected,
    Rejected,
    Batched,
    Validated,
    Executing,
    Quarantined,
    RetryIndividually,
    Success,
    Failed,
    Skipped,
}

impl TokenState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TokenState::Success | TokenState::Failed | TokenState::Skipped)
    }

    pub fn can_transition_to(self, next: TokenState) -> bool {
        use TokenState::*;
        match self {
            Discovered => matches!(next, Quoted | Failed | Skipped),
            Quoted => matches!(next, Selected | Rejected),
            Rejected => matches!(next, Skipped),
            Selected => matches!(next, Batched | Failed | Skipped),
            Batched => matches!(next, Validated | Quarantined | Failed | Skipped),
            Validated => matches!(next, Executing | Skipped),
            Executing => matches!(next, Success | Failed | RetryIndividually),
            Quarantined => matches!(next, RetryIndividually | Skipped),
            RetryIndividually => matches!(next, Success | Failed | Skipped),
            Success | Failed | Skipped => false,
        }
    }
}

impl fmt::Display for TokenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Terminal status reported per token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    Success,
    Failed,
    Skipped,
}

/// Recorded once when a token reaches a terminal state
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalOutcome {
    pub status: SwapStatus,
    pub error: Option<SweepError>,
    pub receipt: Option<String>,
    pub quoted_out: u64,
}

#[derive(Debug, Clone)]
pub struct TokenEntry {
    pub token: TokenBalance,
    pub force: bool,
    pub state: TokenState,
    pub quote: Option<PricedQuote>,
    pub outcome: Option<TerminalOutcome>,
}

/// Progress notifications for subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum SweepEvent {
    TokenStateChanged {
        mint: String,
        from: TokenState,
        to: TokenState,
    },
    QuotesRefreshed {
        batch: usize,
        refreshed: usize,
        reason: SweepError,
    },
    BatchSubmitted {
        batch: usize,
        submission: String,
        steps: usize,
    },
    BatchConfirmed {
        batch: usize,
        receipt: String,
    },
    BatchFailed {
        batch: usize,
        reason: String,
    },
    Finished {
        session_id: String,
    },
}

pub struct SweepSession {
    id: String,
    output: OutputAsset,
    started_at: DateTime<Utc>,
    entries: Vec<TokenEntry>,
    index: HashMap<String, usize>,
    pending: HashSet<String>,
    submissions: usize,
    events: Option<mpsc::UnboundedSender<SweepEvent>>,
}

impl SweepSession {
    /// Start a session over `selection`: each token with its per-token force flag.
    ///
    /// A mint listed twice keeps its first entry.
    pub fn new(output: OutputAsset, selection: Vec<(TokenBalance, bool)>) -> Self {
        let mut entries = Vec::with_capacity(selection.len());
        let mut index = HashMap::new();

        for (token, force) in selection {
            if index.contains_key(&token.mint) {
                warn!("Duplicate token {} in selection ignored", token.mint);
                continue;
            }
            index.insert(token.mint.clone(), entries.len());
            entries.push(TokenEntry {
                token,
                force,
                state: TokenState::Discovered,
                quote: None,
                outcome: None,
            });
        }

        Self {
            id: generate_id(),
            output,
            started_at: Utc::now(),
            entries,
            index,
            pending: HashSet::new(),
            submissions: 0,
            events: None,
        }
    }

    /// Subscribe to progress events. Replaces any previous subscriber.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<SweepEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn output(&self) -> &OutputAsset {
        &self.output
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn entries(&self) -> &[TokenEntry] {
        &self.entries
    }

    pub fn entry(&self, mint: &str) -> Option<&TokenEntry> {
        self.index.get(mint).map(|&i| &self.entries[i])
    }

    pub fn state_of(&self, mint: &str) -> Option<TokenState> {
        self.entry(mint).map(|e| e.state)
    }

    pub fn submissions(&self) -> usize {
        self.submissions
    }

    pub fn record_submission(&mut self) {
        self.submissions += 1;
    }

    pub fn emit(&self, event: SweepEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Move a token to `to`, rejecting transitions the lifecycle does not allow.
    pub fn advance(&mut self, mint: &str, to: TokenState) -> Result<(), SessionError> {
        let idx = *self
            .index
            .get(mint)
            .ok_or_else(|| SessionError::UnknownToken(mint.to_string()))?;
        let from = self.entries[idx].state;

        if !from.can_transition_to(to) {
            return Err(SessionError::IllegalTransition {
                mint: mint.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        self.entries[idx].state = to;
        if to.is_terminal() {
            self.pending.remove(mint);
        }
        debug!("{}: {} -> {}", mint, from, to);
        self.emit(SweepEvent::TokenStateChanged {
            mint: mint.to_string(),
            from,
            to,
        });
        Ok(())
    }

    pub fn set_quote(&mut self, mint: &str, quote: PricedQuote) -> Result<(), SessionError> {
        let idx = *self
            .index
            .get(mint)
            .ok_or_else(|| SessionError::UnknownToken(mint.to_string()))?;
        self.entries[idx].quote = Some(quote);
        Ok(())
    }

    /// Claim `mint` for a pending step; false if it is already pending.
    pub fn claim_pending(&mut self, mint: &str) -> bool {
        self.pending.insert(mint.to_string())
    }

    pub fn is_pending(&self, mint: &str) -> bool {
        self.pending.contains(mint)
    }

    /// Record a terminal outcome. The first recorded outcome wins.
    pub fn finish(
        &mut self,
        mint: &str,
        status: SwapStatus,
        error: Option<SweepError>,
        receipt: Option<String>,
    ) -> Result<(), SessionError> {
        let target = match status {
            SwapStatus::Success => TokenState::Success,
            SwapStatus::Failed => TokenState::Failed,
            SwapStatus::Skipped => TokenState::Skipped,
        };
        self.advance(mint, target)?;

        let idx = self.index[mint];
        let entry = &mut self.entries[idx];
        let quoted_out = entry.quote.as_ref().map(|q| q.quote.amount_out).unwrap_or(0);
        if entry.outcome.is_none() {
            entry.outcome = Some(TerminalOutcome {
                status,
                error,
                receipt,
                quoted_out,
            });
        }
        Ok(())
    }

    /// Tokens not yet in a terminal state.
    pub fn unresolved(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| !e.state.is_terminal())
            .map(|e| e.token.mint.clone())
            .collect()
    }

    pub fn close(&self) {
        self.emit(SweepEvent::Finished {
            session_id: self.id.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{priced, usdc};

    fn session() -> SweepSession {
        SweepSession::new(
            usdc(),
            vec![
                (TokenBalance::new("a", "A", 6, 100), false),
                (TokenBalance::new("b", "B", 6, 100), true),
                (TokenBalance::new("a", "A", 6, 999), false),
            ],
        )
    }

    #[test]
    fn test_duplicate_selection_collapsed() {
        let s = session();
        assert_eq!(s.entries().len(), 2);
        assert_eq!(s.entry("a").unwrap().token.raw_balance, 100);
        assert!(s.entry("b").unwrap().force);
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut s = session();
        for state in [
            TokenState::Quoted,
            TokenState::Selected,
            TokenState::Batched,
            TokenState::Validated,
            TokenState::Executing,
        ] {
            s.advance("a", state).unwrap();
        }
        s.finish("a", SwapStatus::Success, None, Some("sig".into())).unwrap();

        let entry = s.entry("a").unwrap();
        assert_eq!(entry.state, TokenState::Success);
        assert_eq!(entry.outcome.as_ref().unwrap().receipt.as_deref(), Some("sig"));
        assert_eq!(s.unresolved(), vec!["b".to_string()]);
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut s = session();
        let err = s.advance("a", TokenState::Executing).unwrap_err();
        assert!(matches!(err, SessionError::IllegalTransition { .. }));
        assert_eq!(s.state_of("a"), Some(TokenState::Discovered));

        s.finish("a", SwapStatus::Skipped, Some(SweepError::NotTradeable), None).unwrap();
        assert!(s.advance("a", TokenState::Quoted).is_err());
        assert!(s.advance("zzz", TokenState::Quoted).is_err());
    }

    #[test]
    fn test_pending_is_exclusive_until_terminal() {
        let mut s = session();
        assert!(s.claim_pending("a"));
        assert!(!s.claim_pending("a"));

        s.advance("a", TokenState::Quoted).unwrap();
        s.advance("a", TokenState::Selected).unwrap();
        s.finish("a", SwapStatus::Failed, Some(SweepError::ConfirmationTimeout), None).unwrap();
        assert!(!s.is_pending("a"));
        assert!(s.claim_pending("a"));
    }

    #[test]
    fn test_outcome_keeps_quoted_out() {
        let mut s = session();
        s.set_quote("b", priced("b", 100, 42, 10)).unwrap();
        s.advance("b", TokenState::Quoted).unwrap();
        s.advance("b", TokenState::Selected).unwrap();
        s.finish("b", SwapStatus::Skipped, Some(SweepError::UserCancelled), None).unwrap();
        assert_eq!(s.entry("b").unwrap().outcome.as_ref().unwrap().quoted_out, 42);
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let mut s = session();
        let mut rx = s.subscribe();
        s.advance("a", TokenState::Quoted).unwrap();
        s.close();

        assert_eq!(
            rx.recv().await.unwrap(),
            SweepEvent::TokenStateChanged {
                mint: "a".into(),
                from: TokenState::Discovered,
                to: TokenState::Quoted
            }
        );
        assert!(matches!(rx.recv().await.unwrap(), SweepEvent::Finished { .. }));
    }
}
