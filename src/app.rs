// src/app.rs
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    program_pack::Pack,
    pubkey::Pubkey,
    signature::{read_keypair_file, Signer},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dustsweep::domain::execution::{ExecutionSurface, ExecutorConfig, NoAuthorization, SweepExecutor};
use dustsweep::domain::plan::PlanBuilder;
use dustsweep::domain::quote::{Quote, QuoteBatcher, QuoteBatcherConfig, QuoteProvider};
use dustsweep::domain::slippage::SlippagePolicy;
use dustsweep::infrastructure::aggregator::AggregatorClient;
use dustsweep::infrastructure::blockchain::{SolanaBundleSurface, SplBalanceOracle, SurfaceConfig};
use dustsweep::infrastructure::cache::{CachedQuoteProvider, InMemoryCache};
use dustsweep::infrastructure::discovery::{load_snapshot, Blacklist};
use dustsweep::shared::types::{TokenBalance, Tradeability};
use dustsweep::{ServiceSettings, SweepConfig, SweepService};

#[derive(Debug, Clone)]
pub struct AppCfg {
    pub config: SweepConfig,
    /// Discovery snapshot with the wallet's balances.
    pub tokens_path: String,
    pub blacklist_path: Option<String>,
    /// Mints swapped even when their impact exceeds the auto-select threshold.
    pub force: Vec<String>,
    /// Set when the output mint came from the command line; decimals are read on-chain.
    pub output_mint_override: bool,
}

impl AppCfg {
    pub fn new(config: SweepConfig, tokens_path: String) -> Self {
        Self {
            config,
            tokens_path,
            blacklist_path: None,
            force: Vec::new(),
            output_mint_override: false,
        }
    }
}

pub async fn run(app_cfg: AppCfg, cancel: CancellationToken) -> Result<()> {
    let mut cfg = app_cfg.config.clone();
    cfg.validate()?;
    info!("Starting dustsweep");
    info!("Configuration: {:?}", cfg);

    let commitment = CommitmentConfig::from_str(&cfg.network.commitment)
        .map_err(|e| anyhow!("Invalid commitment {:?}: {}", cfg.network.commitment, e))?;
    let rpc_client = Arc::new(RpcClient::new_with_timeout_and_commitment(
        cfg.network.rpc_url.clone(),
        Duration::from_millis(cfg.network.timeout_ms),
        commitment,
    ));

    let keypair = Arc::new(
        read_keypair_file(&cfg.wallet.keypair_path)
            .map_err(|e| anyhow!("Failed to load keypair {}: {}", cfg.wallet.keypair_path, e))?,
    );
    let owner = keypair.pubkey().to_string();
    info!("Loaded keypair: {}", owner);

    if app_cfg.output_mint_override {
        cfg.output.decimals = mint_decimals(&rpc_client, &cfg.output.mint).await?;
        info!("🎯 Output {} has {} decimals", cfg.output.mint, cfg.output.decimals);
    }
    let output = cfg.output.asset();

    // Quoting
    let aggregator = Arc::new(AggregatorClient::new(&cfg.aggregator)?);
    let provider: Arc<dyn QuoteProvider> = if cfg.quoting.cache_ttl_ms > 0 {
        let cache = Arc::new(InMemoryCache::<Quote>::new(Duration::from_millis(cfg.quoting.cache_ttl_ms)));
        Arc::new(CachedQuoteProvider::new(aggregator.clone(), cache))
    } else {
        aggregator.clone()
    };
    let quoter = Arc::new(QuoteBatcher::new(
        provider,
        output.clone(),
        QuoteBatcherConfig::from(&cfg.quoting),
    ));

    // Token selection
    let tokens = load_snapshot(&app_cfg.tokens_path)
        .with_context(|| format!("Failed to load token snapshot {}", app_cfg.tokens_path))?;
    let tokens = match &app_cfg.blacklist_path {
        Some(path) => {
            let blacklist = Blacklist::load(path).with_context(|| format!("Failed to load blacklist {}", path))?;
            let (kept, blocked) = blacklist.filter(tokens);
            if !blocked.is_empty() {
                info!("🚫 Dropped {} blacklisted tokens", blocked.len());
            }
            kept
        }
        None => tokens,
    };
    let tokens = probe_unknown(&quoter, tokens).await;

    for mint in &app_cfg.force {
        if !tokens.iter().any(|t| &t.mint == mint) {
            warn!("⚠️  --force {} does not match any selected token", mint);
        }
    }
    let selection: Vec<(TokenBalance, bool)> = tokens
        .into_iter()
        .map(|t| {
            let force = app_cfg.force.contains(&t.mint);
            (t, force)
        })
        .collect();

    // Execution
    let surface = Arc::new(SolanaBundleSurface::new(
        rpc_client.clone(),
        aggregator,
        keypair,
        SurfaceConfig {
            capacity: cfg.planning.capacity_limit,
            priority_fee_microlamports: cfg.execution.priority_fee_microlamports,
            simulation_compute_units: cfg.execution.simulation_compute_units,
            poll_interval: Duration::from_millis(cfg.execution.confirmation_poll_ms),
            commitment,
        },
    ));
    let capacity = cfg.planning.capacity_limit.min(surface.capacity_limit());
    let planner = PlanBuilder::new(
        SlippagePolicy::new(cfg.slippage.clone()),
        cfg.planning.auto_select_impact_bps,
        capacity,
    );

    // the payer signs its own swaps, so there is no spending permission to raise
    let executor = SweepExecutor::new(
        surface,
        Arc::new(NoAuthorization),
        quoter.clone(),
        planner.clone(),
        ExecutorConfig::from_config(&cfg.execution, &cfg.quoting, owner.clone()),
    );
    let service = SweepService::new(
        quoter,
        planner,
        executor,
        Arc::new(SplBalanceOracle::new(rpc_client)),
        ServiceSettings {
            owner,
            min_usd_value: cfg.planning.min_usd_value,
            simulate_only: cfg.execution.simulate_only,
        },
    );

    let mut session = service.new_session(selection);
    let report = service.run(&mut session, &cancel).await?;

    println!("{}", report.to_json().context("Failed to serialize report")?);
    Ok(())
}

/// Probe tokens whose tradeability the snapshot did not state, keeping snapshot order.
async fn probe_unknown(quoter: &QuoteBatcher, tokens: Vec<TokenBalance>) -> Vec<TokenBalance> {
    let unknown: Vec<TokenBalance> = tokens
        .iter()
        .filter(|t| t.tradeable == Tradeability::Unknown)
        .cloned()
        .collect();
    if unknown.is_empty() {
        return tokens;
    }

    info!("🔎 Probing liquidity for {} tokens", unknown.len());
    let mut probed: HashMap<String, TokenBalance> = quoter
        .probe(&unknown)
        .await
        .into_iter()
        .map(|t| (t.mint.clone(), t))
        .collect();

    tokens
        .into_iter()
        .map(|t| probed.remove(&t.mint).unwrap_or(t))
        .collect()
}

async fn mint_decimals(rpc_client: &RpcClient, mint: &str) -> Result<u8> {
    let pubkey = Pubkey::from_str(mint).map_err(|e| anyhow!("Invalid output mint {}: {}", mint, e))?;
    let account = rpc_client
        .get_account(&pubkey)
        .await
        .with_context(|| format!("Failed to fetch output mint {}", mint))?;
    let state = spl_token::state::Mint::unpack(&account.data)
        .map_err(|e| anyhow!("{} is not an SPL mint: {}", mint, e))?;
    Ok(state.decimals)
}
