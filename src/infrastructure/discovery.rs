//! Read-only discovery inputs: the wallet snapshot and the blacklist

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::shared::errors::AppError;
use crate::shared::types::{TokenBalance, Tradeability};

/// Wallet snapshot as produced by an external indexer
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoverySnapshot {
    #[serde(default)]
    pub owner: Option<String>,
    pub tokens: Vec<DiscoveredToken>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveredToken {
    pub mint: String,
    pub symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    pub decimals: u8,
    /// Raw balance in base units.
    #[serde(alias = "balance")]
    pub amount: u64,
    #[serde(default, alias = "priceUsd", alias = "price_usd")]
    pub unit_price_usd: Option<f64>,
    #[serde(default)]
    pub tradeable: Option<bool>,
}

impl DiscoveredToken {
    fn into_balance(self) -> TokenBalance {
        TokenBalance {
            mint: self.mint,
            symbol: self.symbol,
            name: self.name,
            decimals: self.decimals,
            raw_balance: self.amount,
            unit_price_usd: self.unit_price_usd.filter(|p| p.is_finite() && *p >= 0.0),
            tradeable: match self.tradeable {
                Some(true) => Tradeability::Tradeable,
                Some(false) => Tradeability::Untradeable,
                None => Tradeability::Unknown,
            },
        }
    }
}

pub fn parse_snapshot(raw: &str) -> Result<Vec<TokenBalance>, AppError> {
    let snapshot: DiscoverySnapshot = serde_json::from_str(raw)
        .map_err(|e| AppError::DiscoveryError(format!("Malformed discovery snapshot: {}", e)))?;

    let mut tokens = Vec::with_capacity(snapshot.tokens.len());
    for token in snapshot.tokens {
        if token.mint.trim().is_empty() {
            return Err(AppError::DiscoveryError("Token entry with empty mint".to_string()));
        }
        if token.decimals > 19 {
            return Err(AppError::DiscoveryError(format!(
                "Token {} has implausible decimals {}",
                token.mint, token.decimals
            )));
        }
        tokens.push(token.into_balance());
    }

    Ok(tokens)
}

pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Vec<TokenBalance>, AppError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::DiscoveryError(format!("Failed to read {}: {}", path.display(), e)))?;
    let tokens = parse_snapshot(&raw)?;
    info!("📂 Loaded {} tokens from {}", tokens.len(), path.display());
    Ok(tokens)
}

/// Spam list: exact addresses plus `*` wildcard patterns over symbol and name
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Blacklist {
    #[serde(default)]
    pub addresses: HashSet<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl Blacklist {
    pub fn parse(raw: &str) -> Result<Self, AppError> {
        serde_json::from_str(raw).map_err(|e| AppError::DiscoveryError(format!("Malformed blacklist: {}", e)))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| AppError::DiscoveryError(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::parse(&raw)
    }

    pub fn is_blocked(&self, token: &TokenBalance) -> bool {
        if self.addresses.contains(&token.mint) {
            return true;
        }
        self.patterns.iter().any(|pattern| {
            wildcard_match(pattern, &token.symbol)
                || token.name.as_deref().is_some_and(|name| wildcard_match(pattern, name))
        })
    }

    /// Split `tokens` into (kept, blocked), preserving order.
    pub fn filter(&self, tokens: Vec<TokenBalance>) -> (Vec<TokenBalance>, Vec<TokenBalance>) {
        let (blocked, kept): (Vec<_>, Vec<_>) = tokens.into_iter().partition(|t| self.is_blocked(t));
        for token in &blocked {
            debug!("Blacklisted {} ({})", token.symbol, token.mint);
        }
        (kept, blocked)
    }
}

/// Case-insensitive match where `*` stands for any run of characters.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let text: Vec<char> = text.to_lowercase().chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while t < text.len() {
        if p < pattern.len() && pattern[p] != '*' && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            resume = t;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            resume += 1;
            t = resume;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*claim*", "Visit to CLAIM rewards"));
        assert!(wildcard_match("airdrop*", "AirdropToken"));
        assert!(wildcard_match("*.com", "free-usdc.com"));
        assert!(wildcard_match("exact", "EXACT"));
        assert!(wildcard_match("*", ""));
        assert!(!wildcard_match("exact", "exactly"));
        assert!(!wildcard_match("*.com", "free-usdc.org"));
        assert!(wildcard_match("a*b*c", "aXXbYYc"));
        assert!(!wildcard_match("a*b*c", "aXXcYYb"));
    }

    #[test]
    fn test_parse_snapshot() {
        let raw = r#"{
            "owner": "Owner111",
            "tokens": [
                {"mint": "Bonk111", "symbol": "BONK", "decimals": 5, "amount": 123456, "priceUsd": 0.00002},
                {"mint": "Dead111", "symbol": "DEAD", "name": "Dead Coin", "decimals": 6, "balance": 10, "tradeable": false}
            ]
        }"#;

        let tokens = parse_snapshot(raw).unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].raw_balance, 123_456);
        assert_eq!(tokens[0].unit_price_usd, Some(0.00002));
        assert_eq!(tokens[1].tradeable, Tradeability::Untradeable);
        assert_eq!(tokens[1].name.as_deref(), Some("Dead Coin"));
    }

    #[test]
    fn test_malformed_snapshot_is_discovery_error() {
        for raw in [
            "not json",
            r#"{"tokens": [{"mint": "x", "symbol": "X", "decimals": 6}]}"#,
            r#"{"tokens": [{"mint": "x", "symbol": "X", "decimals": 6, "amount": -5}]}"#,
            r#"{"tokens": [{"mint": "", "symbol": "X", "decimals": 6, "amount": 5}]}"#,
            r#"{"tokenz": []}"#,
        ] {
            assert!(matches!(parse_snapshot(raw), Err(AppError::DiscoveryError(_))), "{}", raw);
        }
    }

    #[test]
    fn test_blacklist_filters_addresses_and_patterns() {
        let blacklist = Blacklist::parse(r#"{"addresses": ["Spam111"], "patterns": ["*claim*", "www.*"]}"#).unwrap();

        let mut named = TokenBalance::new("Ok222", "GIFT", 6, 1);
        named.name = Some("Claim your airdrop".to_string());
        let tokens = vec![
            TokenBalance::new("Spam111", "SPAM", 6, 1),
            TokenBalance::new("Jup111", "JUP", 6, 1),
            named,
            TokenBalance::new("Url111", "www.scam.io", 6, 1),
        ];

        let (kept, blocked) = blacklist.filter(tokens);
        assert_eq!(kept.iter().map(|t| t.mint.as_str()).collect::<Vec<_>>(), vec!["Jup111"]);
        assert_eq!(blocked.len(), 3);
    }

    #[test]
    fn test_load_snapshot_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.json");
        fs::write(&path, r#"{"tokens": []}"#).unwrap();

        assert!(load_snapshot(&path).unwrap().is_empty());
        assert!(matches!(load_snapshot(dir.path().join("missing.json")), Err(AppError::DiscoveryError(_))));
    }
}
