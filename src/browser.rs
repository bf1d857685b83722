//! Headless Chrome sessions behind a small trait seam, so the orchestrator
//! can be driven by an in-memory double in tests.

use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ScrapeError;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One isolated, JavaScript-executing browsing context.
#[async_trait::async_trait]
pub trait BrowserSession: Send {
    /// Load `url` in the session's tab.
    async fn goto(&mut self, url: &str) -> Result<(), ScrapeError>;

    /// Wait until `selector` matches something on the current page.
    /// Returns `false` if `timeout` elapses first.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> bool;

    /// Rendered markup of the current page.
    async fn content(&mut self) -> Result<String, ScrapeError>;

    /// Release the browser process. Must be called on every exit path.
    async fn close(self: Box<Self>) -> Result<(), ScrapeError>;
}

/// Starts fresh sessions; one per theater.
#[async_trait::async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, ScrapeError>;
}

/// Retry bounds for a single page load.
#[derive(Debug, Clone)]
pub struct NavigationPolicy {
    pub attempts: u32,
    /// Pause between failed attempts.
    pub backoff: Duration,
    /// Pause after a successful load, before anything reads the page.
    pub settle: Duration,
}

impl Default for NavigationPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            backoff: Duration::from_secs(2),
            settle: Duration::from_millis(1500),
        }
    }
}

/// Load `url`, retrying per `policy`. The error of the last attempt is
/// returned once all attempts are spent; callers skip the page.
pub async fn navigate(
    session: &mut dyn BrowserSession,
    url: &str,
    policy: &NavigationPolicy,
) -> Result<(), ScrapeError> {
    let attempts = policy.attempts.max(1);
    let mut last_err = None;

    for attempt in 1..=attempts {
        match session.goto(url).await {
            Ok(()) => {
                if !policy.settle.is_zero() {
                    tokio::time::sleep(policy.settle).await;
                }
                return Ok(());
            }
            Err(e) => {
                warn!(url, attempt, error = %e, "page load failed");
                last_err = Some(e);
                if attempt < attempts && !policy.backoff.is_zero() {
                    tokio::time::sleep(policy.backoff).await;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| ScrapeError::Navigation {
        url: url.to_string(),
        reason: "no attempts made".to_string(),
    }))
}

/// Launches headless Chrome via chromiumoxide.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    executable: Option<PathBuf>,
}

impl ChromeLauncher {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }

    fn browser_config(&self) -> Result<BrowserConfig, ScrapeError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-blink-features=AutomationControlled")
            .window_size(1920, 1080);
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(ScrapeError::Launch)
    }
}

#[async_trait::async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, ScrapeError> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| ScrapeError::Launch(e.to_string()))?;

        // The CDP handler has to be polled for the browser to make progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler event error");
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let session = ChromeSession {
                    browser,
                    page: None,
                    handler_task,
                };
                if let Err(close_err) = Box::new(session).close().await {
                    warn!(error = %close_err, "closing half-started browser failed");
                }
                return Err(ScrapeError::Launch(e.to_string()));
            }
        };

        Ok(Box::new(ChromeSession {
            browser,
            page: Some(page),
            handler_task,
        }))
    }
}

struct ChromeSession {
    browser: Browser,
    page: Option<Page>,
    handler_task: JoinHandle<()>,
}

impl ChromeSession {
    fn page(&self) -> Result<&Page, ScrapeError> {
        self.page
            .as_ref()
            .ok_or_else(|| ScrapeError::Content("session has no open tab".to_string()))
    }
}

#[async_trait::async_trait]
impl BrowserSession for ChromeSession {
    async fn goto(&mut self, url: &str) -> Result<(), ScrapeError> {
        let page = self.page().map_err(|e| ScrapeError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        page.goto(url)
            .await
            .map_err(|e| ScrapeError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> bool {
        let Ok(page) = self.page() else {
            return false;
        };
        poll_until(timeout, || async move { page.find_element(selector).await.is_ok() }).await
    }

    async fn content(&mut self) -> Result<String, ScrapeError> {
        self.page()?
            .content()
            .await
            .map_err(|e| ScrapeError::Content(e.to_string()))
    }

    async fn close(self: Box<Self>) -> Result<(), ScrapeError> {
        let mut this = *self;
        this.page = None;
        let closed = this.browser.close().await;
        if let Err(e) = this.browser.wait().await {
            warn!(error = %e, "reaping browser process failed");
        }
        this.handler_task.abort();
        closed.map(|_| ()).map_err(|e| ScrapeError::Close(e.to_string()))
    }
}

/// Re-run `check` every [`POLL_INTERVAL`] until it passes. A check still in
/// flight when `timeout` runs out is abandoned.
async fn poll_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        loop {
            if check().await {
                return true;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    })
    .await
    .unwrap_or(false)
}

impl Drop for ChromeSession {
    // Covers panics and early returns; chromiumoxide kills the child process
    // when `Browser` drops, the handler task has to be stopped by hand.
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory browser double serving canned HTML by URL.

    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use scraper::{Html, Selector};

    use super::*;

    #[derive(Default)]
    pub struct FakeSite {
        pub pages: HashMap<String, String>,
        /// URLs that fail this many times before loading.
        pub flaky: Mutex<HashMap<String, u32>>,
        pub visits: Mutex<Vec<String>>,
    }

    impl FakeSite {
        pub fn with_page(mut self, url: impl Into<String>, html: impl Into<String>) -> Self {
            self.pages.insert(url.into(), html.into());
            self
        }

        pub fn visits(&self) -> Vec<String> {
            self.visits.lock().unwrap().clone()
        }
    }

    pub struct FakeLauncher {
        pub site: Arc<FakeSite>,
        /// Zero-based `open` calls that fail.
        pub failing_opens: HashSet<usize>,
        pub opened: Arc<AtomicUsize>,
        pub closed: Arc<AtomicUsize>,
    }

    impl FakeLauncher {
        pub fn new(site: FakeSite) -> Self {
            Self {
                site: Arc::new(site),
                failing_opens: HashSet::new(),
                opened: Arc::new(AtomicUsize::new(0)),
                closed: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn fail_open(mut self, call: usize) -> Self {
            self.failing_opens.insert(call);
            self
        }
    }

    #[async_trait::async_trait]
    impl SessionLauncher for FakeLauncher {
        async fn open(&self) -> Result<Box<dyn BrowserSession>, ScrapeError> {
            let call = self.opened.fetch_add(1, Ordering::SeqCst);
            if self.failing_opens.contains(&call) {
                return Err(ScrapeError::Launch("chrome not found".to_string()));
            }
            Ok(Box::new(FakeSession {
                site: Arc::clone(&self.site),
                current: None,
                closed: Arc::clone(&self.closed),
            }))
        }
    }

    pub struct FakeSession {
        site: Arc<FakeSite>,
        current: Option<String>,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl BrowserSession for FakeSession {
        async fn goto(&mut self, url: &str) -> Result<(), ScrapeError> {
            self.site.visits.lock().unwrap().push(url.to_string());
            {
                let mut flaky = self.site.flaky.lock().unwrap();
                if let Some(left) = flaky.get_mut(url)
                    && *left > 0
                {
                    *left -= 1;
                    return Err(ScrapeError::Navigation {
                        url: url.to_string(),
                        reason: "net::ERR_CONNECTION_RESET".to_string(),
                    });
                }
            }
            match self.site.pages.get(url) {
                Some(html) => {
                    self.current = Some(html.clone());
                    Ok(())
                }
                None => Err(ScrapeError::Navigation {
                    url: url.to_string(),
                    reason: "net::ERR_NAME_NOT_RESOLVED".to_string(),
                }),
            }
        }

        async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> bool {
            let (Some(html), Ok(sel)) = (&self.current, Selector::parse(selector)) else {
                return false;
            };
            Html::parse_document(html).select(&sel).next().is_some()
        }

        async fn content(&mut self) -> Result<String, ScrapeError> {
            self.current
                .clone()
                .ok_or_else(|| ScrapeError::Content("nothing loaded".to_string()))
        }

        async fn close(self: Box<Self>) -> Result<(), ScrapeError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
