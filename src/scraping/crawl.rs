//! The incremental-load crawl loop.
//!
//! Drives repeated scroll + extract cycles against a [`SearchPage`] until
//! the quota is met or the attempt budget is exhausted. The attempt budget
//! is the run's liveness guarantee: the loop terminates in bounded
//! wall-clock time no matter what the target page does, including pages
//! whose height never stabilizes. Each iteration performs exactly one
//! scroll-and-settle — there is no inner wait-for-stable-height loop.

use std::collections::HashSet;
use std::time::Duration;

use scraper::Html;
use tracing::{debug, info, warn};

use crate::core::config;
use crate::core::types::{CollectRequest, QuerySource};
use crate::scraping::extract;
use crate::scraping::observer::{Checkpoint, CrawlObserver, CrawlStage};
use crate::scraping::page::{CrawlError, SearchPage};

/// Hard ceiling on scroll + extract cycles per run. Fixed, not per-call
/// configurable: termination must not depend on caller input.
pub const MAX_SCROLL_ATTEMPTS: u32 = 10;

/// Timing knobs for one crawl run. Defaults come from the environment
/// (see `core::config`); tests shrink them to keep fakes fast.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Layout-settle pause after each scroll instruction.
    pub settle_pause: Duration,
    /// Bounded wait for the results view to render a marker.
    pub results_timeout: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            settle_pause: config::settle_pause(),
            results_timeout: config::results_timeout(),
        }
    }
}

/// Accumulator owned by exactly one in-flight run; discarded when the run
/// ends.
struct ExtractionState {
    found: HashSet<String>,
    attempt: u32,
}

pub struct CrawlController<'a, P: SearchPage> {
    page: &'a P,
    config: CrawlConfig,
    observer: &'a dyn CrawlObserver,
}

impl<'a, P: SearchPage> CrawlController<'a, P> {
    pub fn new(page: &'a P, config: CrawlConfig, observer: &'a dyn CrawlObserver) -> Self {
        Self {
            page,
            config,
            observer,
        }
    }

    /// Navigate to the results view for `request` and accumulate candidate
    /// URLs until the target count is reached or the attempt budget runs
    /// out. Returns at most `target_count` URLs, order unspecified.
    pub async fn collect(&self, request: &CollectRequest) -> Result<Vec<String>, CrawlError> {
        match &request.query {
            QuerySource::Text(term) => {
                info!("searching images for: {}", term);
                self.page
                    .open_text_search(term, request.filter_policy)
                    .await?;
            }
            QuerySource::ReferenceImage(path) => {
                info!("reverse image search for: {}", path.display());
                self.page.open_reverse_search(path).await?;
            }
        }

        self.page.await_results(self.config.results_timeout).await?;
        self.notify(CrawlStage::ResultsReady, 0, 0).await;

        let urls = self.scroll_and_extract(request.target_count).await?;
        info!("collected {} image urls", urls.len());
        Ok(urls)
    }

    /// The scroll/extract loop proper, against an already-loaded results
    /// view.
    async fn scroll_and_extract(&self, target_count: usize) -> Result<Vec<String>, CrawlError> {
        let mut state = ExtractionState {
            found: HashSet::new(),
            attempt: 0,
        };
        let mut recovery_available = true;

        while state.found.len() < target_count && state.attempt < MAX_SCROLL_ATTEMPTS {
            // A page that refuses to scroll can still be extracted once.
            if let Err(e) = self.page.scroll_and_settle(self.config.settle_pause).await {
                warn!("scroll failed on attempt {}: {}", state.attempt + 1, e);
            }

            let html = self.page.snapshot().await?;
            let doc = Html::parse_document(&html);
            let remaining = target_count - state.found.len();
            let fresh = extract::extract(&doc, &state.found, remaining);
            debug!(
                "attempt {}: {} fresh urls ({} total)",
                state.attempt + 1,
                fresh.len(),
                state.found.len() + fresh.len()
            );
            state.found.extend(fresh);
            state.attempt += 1;

            self.notify_with_page(CrawlStage::ScrollCycle, &state, Some(html.as_str()))
                .await;

            // One-shot recovery: a zero-yield first pass usually means the
            // thumbnails have not materialized; opening the first result
            // surfaces a higher-resolution view.
            if state.attempt == 1 && state.found.is_empty() && recovery_available {
                recovery_available = false;
                match self.page.open_first_result().await {
                    Ok(()) => {
                        tokio::time::sleep(self.config.settle_pause).await;
                        info!("recovery: opened first result item");
                    }
                    Err(e) => warn!("recovery click failed: {}", e),
                }
                self.notify(CrawlStage::Recovery, state.attempt, state.found.len())
                    .await;
            }
        }

        self.notify(CrawlStage::Finished, state.attempt, state.found.len())
            .await;

        let mut urls: Vec<String> = state.found.into_iter().collect();
        urls.truncate(target_count);
        Ok(urls)
    }

    async fn notify(&self, stage: CrawlStage, attempt: u32, found: usize) {
        let screenshot = if self.observer.active() {
            self.page.screenshot().await
        } else {
            None
        };
        self.observer.checkpoint(&Checkpoint {
            stage,
            attempt,
            found,
            page_html: None,
            screenshot: screenshot.as_deref(),
        });
    }

    async fn notify_with_page(&self, stage: CrawlStage, state: &ExtractionState, html: Option<&str>) {
        let (page_html, screenshot) = if self.observer.active() {
            (html, self.page.screenshot().await)
        } else {
            (None, None)
        };
        self.observer.checkpoint(&Checkpoint {
            stage,
            attempt: state.attempt,
            found: state.found.len(),
            page_html,
            screenshot: screenshot.as_deref(),
        });
    }
}
