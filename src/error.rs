//! Error types for the scraper, the cache and the mirror.

use std::path::PathBuf;

use thiserror::Error;

/// Browser and page level failures. These never abort a run: the
/// orchestrator turns them into skip reasons.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Reading page content failed: {0}")]
    Content(String),

    #[error("Browser shutdown failed: {0}")]
    Close(String),

    #[error("Invalid selector {selector}: {reason}")]
    Selector { selector: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed cache file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serializing snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Mirror request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mirror returned an invalid snapshot: {0}")]
    InvalidSnapshot(serde_json::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("git {command} failed: {reason}")]
    Git { command: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parsing config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}
