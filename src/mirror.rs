//! Keeping the cache in sync with a git-hosted copy: pulling a pre-built
//! snapshot over HTTP, and committing/pushing a freshly scraped one.

use std::path::Path;

use reqwest::{Client, header};
use tokio::process::Command;
use tracing::{info, warn};

use crate::Snapshot;
use crate::cache::CacheStore;
use crate::error::MirrorError;

const USER_AGENT: &str = concat!("showtime-scrape/", env!("CARGO_PKG_VERSION"));

/// Fetches a snapshot published elsewhere (e.g. a raw file on GitHub).
#[derive(Debug, Clone)]
pub struct MirrorClient {
    client: Client,
    url: String,
}

impl MirrorClient {
    pub fn new(url: impl Into<String>) -> Result<Self, MirrorError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch(&self) -> Result<Snapshot, MirrorError> {
        let resp = self
            .client
            .get(&self.url)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?;
        let body = resp.bytes().await?;
        serde_json::from_slice(&body).map_err(MirrorError::InvalidSnapshot)
    }

    /// Fetch and overwrite the local cache. On any failure the local file is
    /// left as it was.
    pub async fn sync(&self, cache: &CacheStore) -> Result<Snapshot, MirrorError> {
        let snapshot = self.fetch().await?;
        cache.store(&snapshot).await?;
        info!(url = %self.url, showings = snapshot.showings.len(), "cache replaced from mirror");
        Ok(snapshot)
    }
}

/// Commit `file` in its repository and push. Nothing to commit counts as failure.
pub async fn publish(file: &Path) -> Result<(), MirrorError> {
    info!(file = %file.display(), "pushing cache to git remote");
    let message = format!(
        "Update showtimes {}",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S")
    );
    let file = file.to_string_lossy();
    git(&["add", file.as_ref()]).await?;
    git(&["commit", "-m", message.as_str()]).await?;
    git(&["push"]).await?;
    info!("push successful");
    Ok(())
}

async fn git(args: &[&str]) -> Result<(), MirrorError> {
    let command = args.join(" ");
    let output = Command::new("git")
        .args(args)
        .output()
        .await
        .map_err(|e| MirrorError::Git {
            command: command.clone(),
            reason: e.to_string(),
        })?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    warn!(%command, status = %output.status, %stderr, "git command failed");
    Err(MirrorError::Git {
        command,
        reason: if stderr.is_empty() {
            output.status.to_string()
        } else {
            stderr
        },
    })
}
