use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::errors::AppError;
use crate::shared::types::OutputAsset;

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub commitment: String,
    pub timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            commitment: "confirmed".to_string(),
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub keypair_path: String,
}

/// Swap aggregator HTTP endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://quote-api.jup.ag/v6".to_string(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub mint: String,
    pub symbol: String,
    pub decimals: u8,
    pub unit_price_usd: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            mint: "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v".to_string(),
            symbol: "USDC".to_string(),
            decimals: 6,
            unit_price_usd: 1.0,
        }
    }
}

impl OutputConfig {
    pub fn asset(&self) -> OutputAsset {
        OutputAsset {
            mint: self.mint.clone(),
            symbol: self.symbol.clone(),
            decimals: self.decimals,
            unit_price_usd: self.unit_price_usd,
        }
    }
}

/// Slippage policy knobs, all in basis points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlippageConfig {
    pub low_floor_bps: u32,
    pub min_buffer_bps: u32,
    pub normal_cap_bps: u32,
    pub force_buffer_bps: u32,
    pub force_ceiling_bps: u32,
}

impl Default for SlippageConfig {
    fn default() -> Self {
        Self {
            low_floor_bps: 50,
            min_buffer_bps: 50,
            normal_cap_bps: 300,
            force_buffer_bps: 500,
            force_ceiling_bps: 9_900,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotingConfig {
    pub window_size: usize,
    pub window_pause_ms: u64,
    pub reference_notional_usd: f64,
    pub staleness_ms: u64,
    pub request_slippage_bps: u32,
    pub cache_ttl_ms: u64,
}

impl Default for QuotingConfig {
    fn default() -> Self {
        Self {
            window_size: 5,
            window_pause_ms: 1_000,
            reference_notional_usd: 10.0,
            staleness_ms: 30_000,
            request_slippage_bps: 300,
            cache_ttl_ms: 5_000,
        }
    }
}

impl QuotingConfig {
    pub fn staleness_window(&self) -> Duration {
        Duration::from_millis(self.staleness_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    pub auto_select_impact_bps: u32,
    pub min_usd_value: f64,
    pub capacity_limit: usize,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            auto_select_impact_bps: 1_000,
            min_usd_value: 0.0,
            capacity_limit: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub headroom_pct: u32,
    pub confirmation_timeout_ms: u64,
    pub confirmation_poll_ms: u64,
    pub priority_fee_microlamports: u64,
    pub simulation_compute_units: u32,
    /// Leave-one-out dry runs in flight at once while isolating a failing batch.
    pub validation_concurrency: usize,
    pub simulate_only: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            headroom_pct: 30,
            confirmation_timeout_ms: 60_000,
            confirmation_poll_ms: 500,
            priority_fee_microlamports: 1_000,
            simulation_compute_units: 1_400_000,
            validation_concurrency: 4,
            simulate_only: false,
        }
    }
}

/// Sweep configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub network: NetworkConfig,
    pub wallet: WalletConfig,
    pub aggregator: AggregatorConfig,
    pub output: OutputConfig,
    pub slippage: SlippageConfig,
    pub quoting: QuotingConfig,
    pub planning: PlanningConfig,
    pub execution: ExecutionConfig,
}

impl SweepConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.quoting.window_size == 0 {
            return Err(AppError::ConfigError("quoting.window_size must be at least 1".to_string()));
        }
        if self.quoting.cache_ttl_ms > 0 && self.quoting.cache_ttl_ms >= self.quoting.staleness_ms {
            return Err(AppError::ConfigError(format!(
                "quoting.cache_ttl_ms ({}) must be shorter than quoting.staleness_ms ({})",
                self.quoting.cache_ttl_ms, self.quoting.staleness_ms
            )));
        }
        if self.execution.validation_concurrency == 0 {
            return Err(AppError::ConfigError(
                "execution.validation_concurrency must be at least 1".to_string(),
            ));
        }
        if self.planning.capacity_limit == 0 {
            return Err(AppError::ConfigError("planning.capacity_limit must be at least 1".to_string()));
        }
        if self.slippage.force_ceiling_bps > 10_000 || self.slippage.normal_cap_bps > 10_000 {
            return Err(AppError::ConfigError("slippage caps cannot exceed 10000 bps".to_string()));
        }
        if self.output.mint.is_empty() {
            return Err(AppError::ConfigError("output.mint is required".to_string()));
        }
        Ok(())
    }
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from Config.toml in the working directory
    pub fn load_config() -> Result<SweepConfig, AppError> {
        Self::load_from("Config.toml")
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<SweepConfig, AppError> {
        let config_content = fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: SweepConfig = toml::from_str(&config_content)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[network]
rpc_url = "http://localhost:8899"

[planning]
capacity_limit = 4

[execution]
validation_concurrency = 2
"#
        )
        .unwrap();

        let cfg = ConfigLoader::load_from(file.path()).unwrap();
        assert_eq!(cfg.network.rpc_url, "http://localhost:8899");
        assert_eq!(cfg.planning.capacity_limit, 4);
        assert_eq!(cfg.planning.auto_select_impact_bps, 1_000);
        assert_eq!(cfg.quoting.window_size, 5);
        assert_eq!(cfg.execution.headroom_pct, 30);
        assert_eq!(cfg.execution.validation_concurrency, 2);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[planning]\ncapacity_limit = 0").unwrap();

        let err = ConfigLoader::load_from(file.path()).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_cache_must_expire_before_quotes_go_stale() {
        let mut cfg = SweepConfig::default();
        cfg.quoting.cache_ttl_ms = 60_000;
        cfg.quoting.staleness_ms = 30_000;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("cache_ttl_ms"));

        cfg.quoting.cache_ttl_ms = 30_000;
        assert!(cfg.validate().is_err());

        cfg.quoting.cache_ttl_ms = 0;
        assert!(cfg.validate().is_ok());

        cfg.quoting.cache_ttl_ms = 5_000;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_missing_file() {
        let err = ConfigLoader::load_from("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
