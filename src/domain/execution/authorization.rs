//! Spending authorization ahead of execution

use async_trait::async_trait;
use tracing::{debug, info};

use crate::shared::errors::{SurfaceError, SweepError};

/// Per-(token, spender) spending permission on the chain
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// The spender that needs authorization, or `None` when the surface spends
    /// directly from the owner and no authorization step exists.
    fn spender(&self) -> Option<&str>;

    /// Whether a non-zero authorization must be reset to zero before it can be raised.
    fn requires_reset(&self) -> bool;

    async fn allowance(&self, mint: &str, spender: &str) -> Result<u64, SurfaceError>;

    async fn approve(&self, mint: &str, spender: &str, amount: u64) -> Result<(), SurfaceError>;
}

/// Authorizer for surfaces that need no spending permission
pub struct NoAuthorization;

#[async_trait]
impl Authorizer for NoAuthorization {
    fn spender(&self) -> Option<&str> {
        None
    }

    fn requires_reset(&self) -> bool {
        false
    }

    async fn allowance(&self, _mint: &str, _spender: &str) -> Result<u64, SurfaceError> {
        Ok(u64::MAX)
    }

    async fn approve(&self, _mint: &str, _spender: &str, _amount: u64) -> Result<(), SurfaceError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    NotRequired,
    AlreadySufficient,
    Raised,
}

/// Make sure the spender may move `amount` of `mint`.
pub async fn ensure_authorized(
    authorizer: &dyn Authorizer,
    mint: &str,
    amount: u64,
) -> Result<AuthorizationOutcome, SweepError> {
    let Some(spender) = authorizer.spender() else {
        return Ok(AuthorizationOutcome::NotRequired);
    };

    let current = authorizer
        .allowance(mint, spender)
        .await
        .map_err(|e| SweepError::AuthorizationFailure(format!("allowance query failed: {}", e)))?;

    if current >= amount {
        debug!("Allowance for {} already covers {}", mint, amount);
        return Ok(AuthorizationOutcome::AlreadySufficient);
    }

    if current > 0 && authorizer.requires_reset() {
        info!("🔐 Resetting allowance for {} before raising", mint);
        authorizer
            .approve(mint, spender, 0)
            .await
            .map_err(|e| SweepError::AuthorizationFailure(format!("allowance reset failed: {}", e)))?;
    }

    info!("🔐 Raising allowance for {} to {}", mint, amount);
    authorizer
        .approve(mint, spender, amount)
        .await
        .map_err(|e| SweepError::AuthorizationFailure(format!("allowance raise failed: {}", e)))?;

    Ok(AuthorizationOutcome::Raised)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeAuthorizer;

    #[tokio::test]
    async fn test_no_authorization_needed() {
        let outcome = ensure_authorized(&NoAuthorization, "mint", 10).await.unwrap();
        assert_eq!(outcome, AuthorizationOutcome::NotRequired);
    }

    #[tokio::test]
    async fn test_sufficient_allowance_untouched() {
        let auth = FakeAuthorizer::new().with_allowance("mint", 100);
        let outcome = ensure_authorized(&auth, "mint", 100).await.unwrap();

        assert_eq!(outcome, AuthorizationOutcome::AlreadySufficient);
        assert!(auth.approvals().is_empty());
    }

    #[tokio::test]
    async fn test_reset_before_raise() {
        let auth = FakeAuthorizer::new().requiring_reset().with_allowance("mint", 5);
        let outcome = ensure_authorized(&auth, "mint", 100).await.unwrap();

        assert_eq!(outcome, AuthorizationOutcome::Raised);
        assert_eq!(auth.approvals(), vec![("mint".to_string(), 0), ("mint".to_string(), 100)]);
    }

    #[tokio::test]
    async fn test_no_reset_from_zero() {
        let auth = FakeAuthorizer::new().requiring_reset();
        ensure_authorized(&auth, "mint", 100).await.unwrap();

        assert_eq!(auth.approvals(), vec![("mint".to_string(), 100)]);
    }

    #[tokio::test]
    async fn test_raise_failure_is_authorization_failure() {
        let auth = FakeAuthorizer::new().failing_for("mint");
        let err = ensure_authorized(&auth, "mint", 100).await.unwrap_err();

        assert!(matches!(err, SweepError::AuthorizationFailure(_)));
    }
}
