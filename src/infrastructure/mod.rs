//! Infrastructure layer - adapters for the aggregator, the chain, caching and discovery

pub mod aggregator;
pub mod blockchain;
pub mod cache;
pub mod discovery;
