//! Common types used across the application

use serde::{Deserialize, Serialize};

use crate::shared::utils::to_ui_amount;

/// Result of the liquidity probe for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tradeability {
    #[default]
    Unknown,
    Tradeable,
    Untradeable,
}

/// A wallet token balance as handed over by discovery.
///
/// Immutable for the duration of a sweep; only a re-scan (or the probe path
/// before a sweep starts) produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    pub mint: String,
    pub symbol: String,
    pub name: Option<String>,
    pub decimals: u8,
    pub raw_balance: u64,
    pub unit_price_usd: Option<f64>,
    pub tradeable: Tradeability,
}

impl TokenBalance {
    pub fn new(mint: impl Into<String>, symbol: impl Into<String>, decimals: u8, raw_balance: u64) -> Self {
        Self {
            mint: mint.into(),
            symbol: symbol.into(),
            name: None,
            decimals,
            raw_balance,
            unit_price_usd: None,
            tradeable: Tradeability::Unknown,
        }
    }

    pub fn with_price(mut self, unit_price_usd: f64) -> Self {
        self.unit_price_usd = Some(unit_price_usd);
        self
    }

    pub fn ui_amount(&self) -> f64 {
        to_ui_amount(self.raw_balance, self.decimals)
    }

    /// USD value of `raw_amount` units, if a unit price is known.
    pub fn usd_value_of(&self, raw_amount: u64) -> Option<f64> {
        self.unit_price_usd
            .map(|price| to_ui_amount(raw_amount, self.decimals) * price)
    }

    pub fn usd_value(&self) -> Option<f64> {
        self.usd_value_of(self.raw_balance)
    }
}

/// The asset every selected token is swapped into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputAsset {
    pub mint: String,
    pub symbol: String,
    pub decimals: u8,
    pub unit_price_usd: f64,
}

impl OutputAsset {
    pub fn usd_value_of(&self, raw_amount: u64) -> f64 {
        to_ui_amount(raw_amount, self.decimals) * self.unit_price_usd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usd_value_requires_price() {
        let token = TokenBalance::new("mint", "BONK", 5, 250_000);
        assert_eq!(token.usd_value(), None);

        let priced = token.with_price(0.5);
        assert!((priced.usd_value().unwrap() - 1.25).abs() < 1e-9);
    }

    #[test]
    fn test_output_usd_value() {
        let usdc = OutputAsset {
            mint: "usdc".into(),
            symbol: "USDC".into(),
            decimals: 6,
            unit_price_usd: 1.0,
        };
        assert!((usdc.usd_value_of(2_500_000) - 2.5).abs() < 1e-9);
    }
}
