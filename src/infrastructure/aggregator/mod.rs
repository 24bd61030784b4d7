//! Swap aggregator HTTP integration

mod quote_client;
pub mod schema;

pub use quote_client::{parse_quote, AggregatorClient};
