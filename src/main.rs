mod app;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use dustsweep::{ConfigLoader, SweepConfig};

#[derive(Parser, Debug)]
#[command(version, about = "Sweep dust token balances into a single asset on Solana")]
struct Args {
    /// Path to config file (optional)
    #[arg(long)]
    config: Option<String>,

    /// Discovery snapshot (JSON) listing the wallet's token balances
    #[arg(long)]
    tokens: String,

    /// Blacklist (JSON) of addresses and symbol/name patterns to leave alone
    #[arg(long)]
    blacklist: Option<String>,

    /// Output asset mint (overrides config; decimals are read on-chain)
    #[arg(long)]
    output_mint: Option<String>,

    /// Swap this mint even if its price impact exceeds the auto-select threshold
    #[arg(long, value_name = "MINT")]
    force: Vec<String>,

    /// Plan and validate only, nothing is submitted
    #[arg(long)]
    simulate_only: bool,

    /// Path to keypair file (overrides config)
    #[arg(long)]
    keypair: Option<String>,

    /// RPC endpoint URL (overrides config)
    #[arg(long)]
    rpc_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    // Priority: CLI args > Config file > Defaults
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => SweepConfig::default(),
    };

    if let Some(rpc_url) = args.rpc_url {
        config.network.rpc_url = rpc_url;
    }
    if let Some(keypair) = args.keypair {
        config.wallet.keypair_path = keypair;
    }
    if args.simulate_only {
        config.execution.simulate_only = true;
    }
    let output_mint_override = match args.output_mint {
        Some(mint) if mint != config.output.mint => {
            config.output.symbol = mint.chars().take(4).collect();
            config.output.mint = mint;
            true
        }
        _ => false,
    };
    if config.wallet.keypair_path.is_empty() {
        return Err(anyhow::anyhow!("--keypair is required when the config does not set wallet.keypair_path"));
    }

    let mut app_cfg = app::AppCfg::new(config, args.tokens);
    app_cfg.blacklist_path = args.blacklist;
    app_cfg.force = args.force;
    app_cfg.output_mint_override = output_mint_override;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupted, finishing the current step and skipping the rest");
            on_interrupt.cancel();
        }
    });

    app::run(app_cfg, cancel).await
}
