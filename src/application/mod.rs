//! Application layer - use cases and services

pub mod sweep_service;

pub use sweep_service::{ServiceSettings, SweepService};
