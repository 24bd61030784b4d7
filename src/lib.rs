//! Dustsweep - batch swap orchestration for sweeping dust balances into one asset
//! Built with Domain-Driven Design principles

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use application::{ServiceSettings, SweepService};
pub use domain::execution::{ExecutionSurface, SweepExecutor};
pub use domain::plan::PlanBuilder;
pub use domain::quote::QuoteBatcher;
pub use domain::result::SweepReport;
pub use domain::session::{SweepEvent, SweepSession};
pub use shared::config::{ConfigLoader, SweepConfig};
