use clap::Parser;
use prover_persistence::FileTokenCache;
use prover_worker::accounts::{load_accounts, load_proxies};
use prover_worker::{NodeKey, Orchestrator, PlaceholderProver, ReqwestFactory, TracingSink, WorkerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pv-worker")]
#[command(about = "Prover network worker", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// `worker_id,credential` lines
    #[arg(short, long, default_value = "accounts.txt")]
    accounts: PathBuf,

    /// One proxy URL per line, assigned to accounts in order
    #[arg(short, long, default_value = "proxy.txt")]
    proxies: PathBuf,

    /// Iterations per account (0 = run indefinitely)
    #[arg(short, long)]
    loops: Option<u64>,

    /// Seconds between iterations
    #[arg(short, long)]
    delay: Option<u64>,

    /// Claim points every N iterations (0 = never)
    #[arg(long)]
    claim_every: Option<u64>,

    /// Maximum accounts running at once
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Token cache file
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Orchestrator base URL
    #[arg(long)]
    orchestrator_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => WorkerConfig::from_file(path)?,
        None => WorkerConfig::default(),
    };

    // Override with CLI args
    if let Some(loops) = args.loops {
        config.cycle.loop_count = loops;
    }
    if let Some(delay) = args.delay {
        config.cycle.iteration_delay_secs = delay;
    }
    if let Some(claim_every) = args.claim_every {
        config.cycle.claim_every = claim_every;
    }
    if let Some(max) = args.max_concurrent {
        config.max_concurrent_identities = Some(max);
    }
    if let Some(cache) = args.cache {
        config.cache_path = cache;
    }
    if let Some(url) = args.orchestrator_url {
        config.orchestrator.base_url = url;
    }
    config.validate()?;

    let accounts = load_accounts(&args.accounts)?;
    for rejected in &accounts.rejected {
        tracing::warn!("Skipping account: {}", rejected);
    }
    let identities = accounts.identities;
    let proxies = load_proxies(&args.proxies)?;
    let node_key = NodeKey::from_config(config.node_key.as_deref())?;

    tracing::info!(
        "Loaded {} accounts, {} proxies, node key {}",
        identities.len(),
        proxies.len(),
        node_key.public_key_base64()
    );

    let cache = Arc::new(FileTokenCache::open(config.cache_path.clone()));
    let transports = Arc::new(ReqwestFactory);

    let orchestrator = Orchestrator::new(
        config,
        cache,
        Arc::new(PlaceholderProver::new()),
        Arc::new(TracingSink),
        node_key,
        transports,
    );

    let outcomes = tokio::select! {
        outcomes = orchestrator.run(identities, &proxies) => outcomes,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal");
            return Ok(());
        }
    };

    let failed = outcomes.iter().filter(|o| !o.success).count() + accounts.rejected.len();
    let total = outcomes.len() + accounts.rejected.len();
    if failed > 0 {
        anyhow::bail!("{} of {} accounts failed", failed, total);
    }

    Ok(())
}
