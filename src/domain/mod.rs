//! Domain layer - core sweep logic and entities

pub mod execution;
pub mod plan;
pub mod quote;
pub mod result;
pub mod session;
pub mod slippage;
