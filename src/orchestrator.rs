//! Drives one scrape run: theaters in configured order, one fresh browser
//! session each, then every date in the window. Failures are contained at
//! the page, date or theater level and recorded as skip reasons.

use std::fmt;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use tracing::{debug, info, warn};

use crate::browser::{BrowserSession, NavigationPolicy, SessionLauncher, navigate};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::{CacheError, ScrapeError};
use crate::extract::{PageContext, PageExtractor, READY_SELECTOR};
use crate::format::FormatResolver;
use crate::{Showtime, Snapshot, Theater, TheaterConfig};

/// Why a unit of work contributed nothing (or less than it could) to the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    SessionOpen { theater: String, reason: String },
    SessionClose { theater: String, reason: String },
    AddressPage { theater: String, reason: String },
    Navigation { theater: String, date: NaiveDate, reason: String },
    NotReady { theater: String, date: NaiveDate },
    Content { theater: String, date: NaiveDate, reason: String },
    MissingTitle { theater: String, date: NaiveDate },
    MissingTime { theater: String, date: NaiveDate, movie: String },
    MissingLink { theater: String, date: NaiveDate, movie: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::SessionOpen { theater, reason } => {
                write!(f, "{theater}: browser did not start ({reason})")
            }
            SkipReason::SessionClose { theater, reason } => {
                write!(f, "{theater}: browser did not shut down cleanly ({reason})")
            }
            SkipReason::AddressPage { theater, reason } => {
                write!(f, "{theater}: address page not loaded ({reason})")
            }
            SkipReason::Navigation { theater, date, reason } => {
                write!(f, "{theater} {date}: page not loaded ({reason})")
            }
            SkipReason::NotReady { theater, date } => {
                write!(f, "{theater} {date}: no movies rendered")
            }
            SkipReason::Content { theater, date, reason } => {
                write!(f, "{theater} {date}: page content unreadable ({reason})")
            }
            SkipReason::MissingTitle { theater, date } => {
                write!(f, "{theater} {date}: movie entry without title")
            }
            SkipReason::MissingTime { theater, date, movie } => {
                write!(f, "{theater} {date}: {movie} showtime without time")
            }
            SkipReason::MissingLink { theater, date, movie } => {
                write!(f, "{theater} {date}: {movie} showtime without booking link")
            }
        }
    }
}

/// Result of one run: the snapshot plus everything that was skipped.
#[derive(Debug)]
pub struct RunReport {
    pub snapshot: Snapshot,
    pub skips: Vec<SkipReason>,
}

pub struct Orchestrator {
    theaters: Vec<TheaterConfig>,
    day_window: u32,
    navigation: NavigationPolicy,
    ready_timeout: Duration,
    launcher: Box<dyn SessionLauncher>,
    extractor: PageExtractor,
}

impl Orchestrator {
    pub fn new(config: &Config, launcher: Box<dyn SessionLauncher>) -> Result<Self, ScrapeError> {
        let resolver = FormatResolver::new(config.premium_formats.iter().cloned());
        Ok(Self {
            theaters: config.theaters.clone(),
            day_window: config.day_window,
            navigation: config.navigation_policy(),
            ready_timeout: config.ready_timeout(),
            launcher,
            extractor: PageExtractor::new(resolver, config.site_origin.clone())?,
        })
    }

    /// Scrape every theater for `day_window` days starting at `today`.
    /// Always yields a snapshot, possibly empty.
    pub async fn run(&self, today: NaiveDate) -> RunReport {
        info!(theaters = self.theaters.len(), days = self.day_window, "scrape run started");
        let mut run = RunState {
            showings: Vec::new(),
            theaters: Vec::new(),
            skips: Vec::new(),
        };

        for theater in &self.theaters {
            info!(theater = %theater.name, "starting browser");
            let mut session = match self.launcher.open().await {
                Ok(session) => session,
                Err(e) => {
                    warn!(theater = %theater.name, error = %e, "browser did not start, skipping theater");
                    run.skips.push(SkipReason::SessionOpen {
                        theater: theater.name.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            self.scrape_theater(session.as_mut(), theater, today, &mut run).await;

            info!(theater = %theater.name, "closing browser");
            if let Err(e) = session.close().await {
                warn!(theater = %theater.name, error = %e, "browser shutdown failed");
                run.skips.push(SkipReason::SessionClose {
                    theater: theater.name.clone(),
                    reason: e.to_string(),
                });
            }
        }

        info!(
            showings = run.showings.len(),
            theaters = run.theaters.len(),
            skipped = run.skips.len(),
            "scrape run completed"
        );
        RunReport {
            snapshot: Snapshot {
                scraped_date: today,
                showings: run.showings,
                theaters: run.theaters,
            },
            skips: run.skips,
        }
    }

    /// Run, then replace the cache file with the result.
    pub async fn refresh(&self, today: NaiveDate, cache: &CacheStore) -> Result<RunReport, CacheError> {
        let report = self.run(today).await;
        cache.store(&report.snapshot).await?;
        Ok(report)
    }

    async fn scrape_theater(
        &self,
        session: &mut dyn BrowserSession,
        theater: &TheaterConfig,
        today: NaiveDate,
        run: &mut RunState,
    ) {
        let address = self.fetch_address(session, theater, today, run).await;
        run.theaters.push(Theater {
            name: theater.name.clone(),
            url: theater.url.clone(),
            address,
        });

        for offset in 0..self.day_window {
            let Some(date) = today.checked_add_days(Days::new(u64::from(offset))) else {
                break;
            };
            self.scrape_date(session, theater, date, run).await;
        }
    }

    async fn fetch_address(
        &self,
        session: &mut dyn BrowserSession,
        theater: &TheaterConfig,
        today: NaiveDate,
        run: &mut RunState,
    ) -> Option<String> {
        let url = theater.url_for_date(today);
        if let Err(e) = navigate(session, &url, &self.navigation).await {
            run.skips.push(SkipReason::AddressPage {
                theater: theater.name.clone(),
                reason: e.to_string(),
            });
            return None;
        }
        match session.content().await {
            Ok(html) => self.extractor.extract_address(&html),
            Err(e) => {
                warn!(theater = %theater.name, error = %e, "address page unreadable");
                run.skips.push(SkipReason::AddressPage {
                    theater: theater.name.clone(),
                    reason: e.to_string(),
                });
                None
            }
        }
    }

    async fn scrape_date(
        &self,
        session: &mut dyn BrowserSession,
        theater: &TheaterConfig,
        date: NaiveDate,
        run: &mut RunState,
    ) {
        let url = theater.url_for_date(date);
        info!(%url, "loading listing");

        if let Err(e) = navigate(session, &url, &self.navigation).await {
            run.skips.push(SkipReason::Navigation {
                theater: theater.name.clone(),
                date,
                reason: e.to_string(),
            });
            return;
        }

        if !session.wait_for(READY_SELECTOR, self.ready_timeout).await {
            debug!(theater = %theater.name, %date, "no movie entries rendered");
            run.skips.push(SkipReason::NotReady {
                theater: theater.name.clone(),
                date,
            });
            return;
        }

        let html = match session.content().await {
            Ok(html) => html,
            Err(e) => {
                warn!(theater = %theater.name, %date, error = %e, "listing unreadable");
                run.skips.push(SkipReason::Content {
                    theater: theater.name.clone(),
                    date,
                    reason: e.to_string(),
                });
                return;
            }
        };

        let page = self.extractor.extract(
            &html,
            PageContext {
                theater: &theater.name,
                date,
            },
        );
        info!(
            theater = %theater.name,
            %date,
            movies = page.movies,
            showtimes = page.showtimes.len(),
            "listing parsed"
        );
        for skip in &page.skips {
            debug!(%skip, "skipped entry");
        }
        run.showings.extend(page.showtimes);
        run.skips.extend(page.skips);
    }
}

struct RunState {
    showings: Vec<Showtime>,
    theaters: Vec<Theater>,
    skips: Vec<SkipReason>,
}
