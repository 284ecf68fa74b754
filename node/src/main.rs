use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use luckdraw::notifier::LogNotifier;
use luckdraw::selection::OsSeedSource;
use luckdraw::Announcer;
use luckdraw::Cadence;
use luckdraw::Clock;
use luckdraw::Config;
use luckdraw::DrawExecutor;
use luckdraw::DrawScheduler;
use luckdraw::PersistenceStore;
use luckdraw::RoundRegistry;
use luckdraw::SystemClock;
use luckdraw_memstore::MemStore;
use luckdraw_rocksstore::RocksStore;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Opt {
    #[clap(flatten)]
    pub config: Config,

    /// Directory of the rocksdb store. The replica keeps its state in memory when absent.
    #[clap(long, env = "LUCKDRAW_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Keep a recurring round of this cadence open: one is opened at startup, and again when a
    /// period starts without an upcoming round of this cadence.
    #[clap(long = "cadence", value_parser = parse_cadence)]
    pub cadences: Vec<Cadence>,
}

fn parse_cadence(s: &str) -> Result<Cadence, String> {
    Cadence::ALL
        .into_iter()
        .find(|c| c.to_string().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("unknown cadence: {}, expect one of daily, weekly, monthly, yearly", s))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup the logger
    tracing_subscriber::fmt()
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .with_ansi(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Parse the parameters passed by arguments.
    let options = Opt::parse();
    let config = options.config.clone().validate()?;

    match &options.db_path {
        Some(path) => {
            let store = RocksStore::open(path)?;
            run(Arc::new(store), config, &options.cadences).await
        }
        None => {
            tracing::warn!("no --db-path given, state is kept in memory");
            run(MemStore::new_arc(), config, &options.cadences).await
        }
    }
}

async fn run<S>(store: Arc<S>, config: Config, cadences: &[Cadence]) -> anyhow::Result<()>
where S: PersistenceStore {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = Arc::new(RoundRegistry::new(store, clock, &config));
    let notifier = Arc::new(LogNotifier);

    let announcer = Announcer::new(registry.clone(), notifier.clone(), &config, cadences.iter().copied());
    for round in announcer.open_configured().await {
        tracing::info!("opened: {}", round);
    }
    announcer.publish_overview().await?;

    let executor = Arc::new(DrawExecutor::new(registry, notifier, Arc::new(OsSeedSource), &config));
    let scheduler = DrawScheduler::new(executor, &config).spawn(true);
    let announcer = announcer.spawn();

    tracing::info!(
        "replica {} started, poll every {:?}, lease ttl {:?}, announce every {:?}",
        config.replica_id,
        config.poll_interval(),
        config.lease_ttl(),
        config.announce_interval()
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("shutting down replica {}", config.replica_id);
    announcer.shutdown().await;
    scheduler.shutdown().await;

    Ok(())
}
