//! Showtime scraper for a fixed set of cinemas listed on a JS-rendered
//! ticketing site, plus the read-only query API that serves the cached
//! snapshot.

pub mod api;
pub mod browser;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod format;
pub mod id;
pub mod mirror;
pub mod orchestrator;
pub mod refresh;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A theater as listed in configuration: display name plus the listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TheaterConfig {
    pub name: String,
    pub url: String,
}

impl TheaterConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Listing URL for one calendar day, e.g. `.../theater/x/abc?date=2026-02-09`.
    pub fn url_for_date(&self, date: NaiveDate) -> String {
        format!("{}?date={}", self.url, date.format("%Y-%m-%d"))
    }
}

/// Theater metadata as stored in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theater {
    pub name: String,
    #[serde(default)]
    pub url: String,
    /// `None` when the base page could not be loaded or carried no address.
    #[serde(default)]
    pub address: Option<String>,
}

/// One bookable screening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Showtime {
    pub id: String,
    pub theater: String,
    pub movie: String,
    pub format: String,
    #[serde(default)]
    pub amenities: Vec<String>,
    pub date: NaiveDate,
    #[serde(default)]
    pub rottentomatoes_score: Option<String>,
    /// Venue-local display time as shown on the site ("7:30 PM").
    pub time: String,
    pub url: String,
}

/// Everything one scrape run produced. Replaces the previous snapshot wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub scraped_date: NaiveDate,
    #[serde(default)]
    pub showings: Vec<Showtime>,
    #[serde(default)]
    pub theaters: Vec<Theater>,
}

impl Snapshot {
    pub fn empty(scraped_date: NaiveDate) -> Self {
        Self {
            scraped_date,
            showings: Vec::new(),
            theaters: Vec::new(),
        }
    }
}
