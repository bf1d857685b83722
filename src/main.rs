use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use showtime_scrape::api::{self, ApiState, Refresher};
use showtime_scrape::browser::ChromeLauncher;
use showtime_scrape::cache::CacheStore;
use showtime_scrape::config::Config;
use showtime_scrape::mirror::{self, MirrorClient};
use showtime_scrape::orchestrator::Orchestrator;
use showtime_scrape::refresh;

#[derive(Debug, Parser)]
#[command(name = "showtime-scrape", about = "Scrape cinema showtimes and serve them as JSON")]
struct Cli {
    /// JSON config file (theaters, premium formats, timeouts).
    #[arg(long, global = true, env = "SHOWTIME_CONFIG")]
    config: Option<PathBuf>,

    /// Snapshot file, overrides the config.
    #[arg(long, global = true, env = "SHOWTIME_CACHE")]
    cache: Option<PathBuf>,

    /// Days to scrape per theater, starting today.
    #[arg(long, global = true)]
    days: Option<u32>,

    /// Chrome/Chromium binary, overrides the config.
    #[arg(long, global = true, env = "CHROME_PATH")]
    chrome: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Scrape once, write the snapshot and exit.
    Scrape {
        /// Commit and push the snapshot file afterwards.
        #[arg(long)]
        push: bool,
    },
    /// Serve the query API.
    Serve {
        #[arg(long, env = "PORT", default_value_t = 10000)]
        port: u16,

        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Refresh by copying this published snapshot instead of scraping.
        #[arg(long, env = "SHOWTIME_MIRROR_URL")]
        mirror_url: Option<String>,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(cache) = &cli.cache {
        config.cache_path = cache.clone();
    }
    if let Some(days) = cli.days {
        config.day_window = days;
    }
    if let Some(chrome) = &cli.chrome {
        config.chrome_executable = Some(chrome.clone());
    }
    Ok(config)
}

fn build_orchestrator(config: &Config) -> anyhow::Result<Orchestrator> {
    let launcher = ChromeLauncher::new(config.chrome_executable.clone());
    Orchestrator::new(config, Box::new(launcher)).context("building scraper")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = load_config(&cli)?;
    let cache = Arc::new(CacheStore::new(config.cache_path.clone()));

    match cli.command {
        Command::Scrape { push } => {
            let orchestrator = build_orchestrator(&config)?;
            let today = chrono::Local::now().date_naive();
            let report = orchestrator.refresh(today, &cache).await?;
            for skip in &report.skips {
                warn!(%skip, "skipped");
            }
            info!(
                showings = report.snapshot.showings.len(),
                path = %cache.path().display(),
                "snapshot written"
            );
            if push && let Err(e) = mirror::publish(cache.path()).await {
                warn!(error = %e, "no changes to commit or push failed");
            }
        }
        Command::Serve {
            port,
            host,
            mirror_url,
        } => {
            if mirror_url.is_some() {
                config.mirror_url = mirror_url;
            }
            let refresher = match &config.mirror_url {
                Some(url) => {
                    info!(%url, "refresh will copy the published snapshot");
                    Refresher::Mirror(Arc::new(MirrorClient::new(url.clone())?))
                }
                None => {
                    let (handle, _worker) =
                        refresh::spawn_worker(build_orchestrator(&config)?, Arc::clone(&cache));
                    info!("visit /refresh to start scraping");
                    Refresher::Queue(handle)
                }
            };

            let addr: SocketAddr = format!("{host}:{port}")
                .parse()
                .with_context(|| format!("invalid listen address {host}:{port}"))?;
            let app = api::router(ApiState { cache, refresher });
            api::serve(addr, app).await?;
        }
    }

    Ok(())
}
