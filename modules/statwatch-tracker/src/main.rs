use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hiscores_client::HiscoresClient;
use statwatch_common::file_config::load_config;
use statwatch_common::AppConfig;
use statwatch_store::PgStatsStore;
use statwatch_tracker::notify::{backend::NotifyBackend, noop::NoopBackend, router::NotifyRouter};
use statwatch_tracker::{spawn, Tracker, TrackerDeps, TrackerSettings};

#[derive(Parser)]
#[command(name = "tracker", about = "Poll hiscores and report stat changes")]
struct Cli {
    /// Path to the TOML tunables file.
    #[arg(long, default_value = "statwatch.toml")]
    config: PathBuf,
}

// `statwatch` covers every statwatch_* crate by target prefix.
const DEFAULT_LOG_DIRECTIVES: [&str; 2] = ["statwatch=info", "hiscores_client=info"];

fn default_filter() -> Result<EnvFilter> {
    let mut filter = EnvFilter::from_default_env();
    for directive in DEFAULT_LOG_DIRECTIVES {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(default_filter()?).init();

    let cli = Cli::parse();
    info!("Statwatch tracker starting...");

    let config = AppConfig::from_env()?;
    let file_config = load_config(&cli.config)?;

    let store = PgStatsStore::connect(&config.database_url).await?;
    store.migrate().await?;
    let store = Arc::new(store);

    let client = HiscoresClient::new(
        file_config.upstream.base_url.clone(),
        file_config.upstream.timeout(),
    )?;

    let notifier: Arc<dyn NotifyBackend> = match NotifyRouter::from_config(&config) {
        Some(router) => {
            info!("Webhook notifications enabled");
            Arc::new(router)
        }
        None => {
            info!("No NOTIFY_WEBHOOK_URL set, notifications disabled");
            Arc::new(NoopBackend)
        }
    };

    let deps = TrackerDeps::builder()
        .source(Arc::new(client))
        .persistence(store.clone())
        .notifier(notifier)
        .membership(store)
        .settings(TrackerSettings::from_config(&file_config))
        .build();

    let mut tracker = Tracker::new(deps);
    tracker.hydrate(Utc::now()).await?;

    let (handle, task) = spawn(tracker, file_config.scheduler.tick_interval());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    handle.shutdown().await?;
    let tracker = task.await?;

    info!("Tracker stopped. {}", tracker.status());
    Ok(())
}
