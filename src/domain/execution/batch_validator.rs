//! Dry-run gate in front of every submission

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use super::{DryRun, ExecutionSurface};
use crate::domain::plan::SwapStep;

/// Predicts whether a batch would succeed without spending anything.
///
/// Dry runs target the same recipient the real submission pays out to. A
/// transport error during the dry run is treated as a failed prediction.
pub struct BatchValidator {
    surface: Arc<dyn ExecutionSurface>,
    recipient: String,
    calls: AtomicUsize,
}

impl BatchValidator {
    pub fn new(surface: Arc<dyn ExecutionSurface>, recipient: impl Into<String>) -> Self {
        Self {
            surface,
            recipient: recipient.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub async fn validate(&self, steps: &[SwapStep]) -> DryRun {
        self.calls.fetch_add(1, Ordering::Relaxed);

        if steps.is_empty() {
            return DryRun::Invalid {
                reason: "empty batch".to_string(),
            };
        }

        match self.surface.validate(steps, &self.recipient).await {
            Ok(DryRun::Valid { resource_estimate }) => {
                debug!(
                    "🧪 Dry run of {} steps on {} passed (estimate {})",
                    steps.len(),
                    self.surface.name(),
                    resource_estimate
                );
                DryRun::Valid { resource_estimate }
            }
            Ok(DryRun::Invalid { reason }) => {
                debug!("🧪 Dry run of {} steps failed: {}", steps.len(), reason);
                DryRun::Invalid { reason }
            }
            Err(e) => {
                warn!("⚠️  Dry run errored on {}: {}", self.surface.name(), e);
                DryRun::Invalid { reason: e.to_string() }
            }
        }
    }

    /// Dry runs performed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::errors::SurfaceError;
    use crate::testing::{step, FakeSurface};

    #[tokio::test]
    async fn test_clean_batch_is_valid() {
        let surface = Arc::new(FakeSurface::new());
        let validator = BatchValidator::new(surface.clone(), "owner");

        let result = validator.validate(&[step("a", 10), step("b", 10)]).await;
        assert_eq!(result, DryRun::Valid { resource_estimate: 200_000 });
        assert_eq!(validator.calls(), 1);
        assert_eq!(surface.recipients(), vec!["owner".to_string()]);
    }

    #[tokio::test]
    async fn test_poisoned_batch_is_invalid() {
        let surface = Arc::new(FakeSurface::new().poison("b"));
        let validator = BatchValidator::new(surface, "owner");

        let result = validator.validate(&[step("a", 10), step("b", 10)]).await;
        assert!(!result.is_valid());
    }

    #[tokio::test]
    async fn test_transport_error_counts_as_invalid() {
        let surface = Arc::new(
            FakeSurface::new().fail_validation_with(SurfaceError::Submission("rpc down".into())),
        );
        let validator = BatchValidator::new(surface, "owner");

        match validator.validate(&[step("a", 10)]).await {
            DryRun::Invalid { reason } => assert!(reason.contains("rpc down")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_batch_invalid_without_dry_run() {
        let surface = Arc::new(FakeSurface::new());
        let validator = BatchValidator::new(surface.clone(), "owner");

        assert!(!validator.validate(&[]).await.is_valid());
        assert_eq!(surface.validations(), 0);
    }
}
