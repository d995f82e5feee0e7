//! The page-query facade the crawl loop runs against.
//!
//! `CrawlController` never touches the browser directly — it drives this
//! trait, implemented by `BrowserSession` for real runs and by scripted
//! fakes in tests. One `SearchPage` belongs to one collection run at a
//! time; nothing here is safe to share across concurrent runs.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::types::FilterPolicy;

#[derive(Debug, Error)]
pub enum CrawlError {
    /// The results view never rendered a recognizable marker within the
    /// bounded wait. Reported as a zero-result run, never fatal.
    #[error("results view did not render within {0:?}")]
    NavigationTimeout(Duration),

    /// The reference image for a reverse search does not exist.
    #[error("reference image not found: {0}")]
    InputNotFound(std::path::PathBuf),

    /// The page exposed no recognizable upload affordance.
    #[error("no upload affordance found on the page")]
    UploadAffordanceMissing,

    /// The browser session itself failed (launch, CDP transport, dead tab).
    #[error("browser session error: {0}")]
    Session(String),
}

impl CrawlError {
    /// Structural failures are reported as a zero-result outcome; session
    /// failures propagate to the caller as hard errors.
    pub fn is_structural(&self) -> bool {
        !matches!(self, CrawlError::Session(_))
    }
}

#[async_trait]
pub trait SearchPage: Send + Sync {
    /// Navigate to the results view for a text query.
    async fn open_text_search(&self, term: &str, policy: FilterPolicy) -> Result<(), CrawlError>;

    /// Navigate to the results view for a reverse-image query: open the
    /// search home, trigger the by-image affordance, inject the file.
    async fn open_reverse_search(&self, image: &Path) -> Result<(), CrawlError>;

    /// Block until a recognizable result marker is present, or fail with
    /// `NavigationTimeout` after `timeout`.
    async fn await_results(&self, timeout: Duration) -> Result<(), CrawlError>;

    /// One scroll-to-bottom followed by a fixed layout-settle pause.
    /// Exactly one invocation per crawl iteration; no inner convergence
    /// loop against the page height.
    async fn scroll_and_settle(&self, pause: Duration) -> Result<(), CrawlError>;

    /// Current rendered DOM as an HTML string.
    async fn snapshot(&self) -> Result<String, CrawlError>;

    /// Click the first recognizable result item (recovery fallback).
    async fn open_first_result(&self) -> Result<(), CrawlError>;

    /// Best-effort screenshot for debug observers. `None` when the
    /// implementation has nothing to render.
    async fn screenshot(&self) -> Option<Vec<u8>> {
        None
    }
}
