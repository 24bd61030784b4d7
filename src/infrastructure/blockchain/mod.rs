//! Solana adapters: bundled swap execution and balances

pub mod balance_oracle;
pub mod bundle_surface;
pub mod compute_budget;
pub mod error_classifier;

pub use balance_oracle::SplBalanceOracle;
pub use bundle_surface::{SolanaBundleSurface, SurfaceConfig};
