//! Native browser session using `chromiumoxide`.
//!
//! Single source of truth for:
//! * Finding a usable Chromium-family executable (override → PATH → well-known paths).
//! * Launching a stealth-configured session with an explicit lifecycle
//!   (`launch` / `close`) — one session per collection run.
//! * The `SearchPage` implementation the crawl loop drives: navigation to
//!   the text-search and reverse-image results views, marker polling,
//!   scroll-and-settle, DOM snapshots, the recovery click.
//!
//! Stealth model: process-level defaults only (user-agent rotation,
//! `--disable-blink-features=AutomationControlled`, CI-safe flags). There
//! is no JS-injection layer here; image results render without it.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use rand::seq::IndexedRandom;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::config;
use crate::core::types::FilterPolicy;
use crate::scraping::page::{CrawlError, SearchPage};

/// Markers that identify a rendered results view. Either may be present
/// depending on which markup variant the site serves.
const RESULT_MARKERS: &[&str] = &[".serp-item", ".SimpleImage"];

/// The by-image (camera) affordance, across known markup variants.
const CAMERA_SELECTORS: &[&str] = &[
    ".CBIr3",
    ".search-by-image__button",
    r#"[aria-label*="Search by image"]"#,
];

const FIRST_RESULT_SELECTOR: &str = ".serp-item";
const FILE_INPUT_SELECTOR: &str = "input[type=file]";

/// How often marker polling re-probes the DOM.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

// ── Realistic User-Agent pool ────────────────────────────────────────────────

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Edge 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36 Edg/132.0.0.0",
];

/// Returns a randomly-chosen realistic desktop User-Agent string.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan — finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = config::chrome_executable_override() {
        return Some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = ["google-chrome", "chromium", "chromium-browser", "chrome"];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    let well_known = [
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];
    #[cfg(target_os = "linux")]
    let well_known = [
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/usr/local/bin/chromium",
    ];
    #[cfg(target_os = "windows")]
    let well_known = [
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    ];

    well_known
        .iter()
        .find(|c| Path::new(c).exists())
        .map(|c| c.to_string())
}

/// Build a `BrowserConfig` with stealth defaults.
///
/// Flags chosen for compatibility with CI / restricted environments
/// (`--no-sandbox`, `--disable-dev-shm-usage`) and for suppressing the
/// `navigator.webdriver` automation fingerprint.
fn build_browser_config(exe: &str, headless: bool) -> Result<BrowserConfig> {
    let ua = random_user_agent();

    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: 1920,
            height: 1080,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(1920, 1080)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", ua));

    if !headless {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

/// Build the text-search results URL for `term`.
fn search_url(term: &str, policy: FilterPolicy) -> String {
    let encoded = utf8_percent_encode(term, NON_ALPHANUMERIC).to_string();
    let mut url = format!("{}/images/search?text={}", config::search_base_url(), encoded);
    if policy == FilterPolicy::Unfiltered {
        url.push_str("&family=no");
    }
    url
}

// ── The session ──────────────────────────────────────────────────────────────

/// One owned browser session. A session hosts one collection run at a
/// time; concurrent runs need their own sessions.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch a browser and open a blank tab. Fails when no usable
    /// executable is installed.
    pub async fn launch(headless: bool) -> Result<Self> {
        let exe = find_chrome_executable().ok_or_else(|| {
            anyhow!(
                "No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE to its path."
            )
        })?;

        info!("launching browser session ({})", exe);
        let config = build_browser_config(&exe, headless)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| anyhow!("Failed to launch browser ({}): {}", exe, e))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Failed to open tab: {}", e))?;

        Ok(Self {
            browser,
            page,
            handler_task,
        })
    }

    /// Gracefully shut the browser down. Close errors are logged, not
    /// propagated — the session is gone either way.
    pub async fn close(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("browser close error (non-fatal): {}", e);
        }
        self.handler_task.abort();
    }

    fn session_err(context: &str, e: impl std::fmt::Display) -> CrawlError {
        CrawlError::Session(format!("{}: {}", context, e))
    }

    /// Try each selector once, first hit wins.
    async fn find_any(&self, selectors: &[&str]) -> Option<chromiumoxide::element::Element> {
        for sel in selectors {
            if let Ok(el) = self.page.find_element(*sel).await {
                return Some(el);
            }
        }
        None
    }

    /// Poll for any of `selectors` until `timeout`.
    async fn wait_for_any(
        &self,
        selectors: &[&str],
        timeout: Duration,
    ) -> Option<chromiumoxide::element::Element> {
        let start = Instant::now();
        loop {
            if let Some(el) = self.find_any(selectors).await {
                return Some(el);
            }
            if start.elapsed() >= timeout {
                return None;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn document_height(&self) -> u64 {
        self.page
            .evaluate("Math.max(document.body.scrollHeight, document.documentElement.scrollHeight)")
            .await
            .ok()
            .and_then(|v| v.into_value::<serde_json::Value>().ok())
            .and_then(|j| j.as_u64())
            .unwrap_or(0)
    }
}

#[async_trait]
impl SearchPage for BrowserSession {
    async fn open_text_search(&self, term: &str, policy: FilterPolicy) -> Result<(), CrawlError> {
        let url = search_url(term, policy);
        debug!("navigating to {}", url);
        self.page
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|e| Self::session_err("navigation failed", e))
    }

    async fn open_reverse_search(&self, image: &Path) -> Result<(), CrawlError> {
        if tokio::fs::metadata(image).await.is_err() {
            return Err(CrawlError::InputNotFound(image.to_path_buf()));
        }
        let absolute = image
            .canonicalize()
            .map_err(|e| Self::session_err("resolving reference image path", e))?;

        let home = format!("{}/images/", config::search_base_url());
        self.page
            .goto(home)
            .await
            .map_err(|e| Self::session_err("navigation failed", e))?;

        let camera = self
            .wait_for_any(CAMERA_SELECTORS, config::results_timeout())
            .await
            .ok_or(CrawlError::UploadAffordanceMissing)?;
        camera
            .click()
            .await
            .map_err(|e| Self::session_err("camera click failed", e))?;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let input = self
            .wait_for_any(&[FILE_INPUT_SELECTOR], Duration::from_secs(5))
            .await
            .ok_or(CrawlError::UploadAffordanceMissing)?;

        info!("uploading reference image {}", absolute.display());
        let params = SetFileInputFilesParams::builder()
            .files(vec![absolute.to_string_lossy().to_string()])
            .backend_node_id(input.backend_node_id)
            .build()
            .map_err(CrawlError::Session)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| Self::session_err("file injection failed", e))?;

        Ok(())
    }

    async fn await_results(&self, timeout: Duration) -> Result<(), CrawlError> {
        self.wait_for_any(RESULT_MARKERS, timeout)
            .await
            .map(|_| ())
            .ok_or(CrawlError::NavigationTimeout(timeout))
    }

    async fn scroll_and_settle(&self, pause: Duration) -> Result<(), CrawlError> {
        let before = self.document_height().await;
        self.page
            .evaluate(format!("window.scrollTo(0, {});", before))
            .await
            .map_err(|e| Self::session_err("scroll failed", e))?;
        tokio::time::sleep(pause).await;
        let after = self.document_height().await;
        debug!("scrolled to {}, settled height {}", before, after);
        Ok(())
    }

    async fn snapshot(&self) -> Result<String, CrawlError> {
        self.page
            .content()
            .await
            .map_err(|e| Self::session_err("snapshot failed", e))
    }

    async fn open_first_result(&self) -> Result<(), CrawlError> {
        let item = self
            .page
            .find_element(FIRST_RESULT_SELECTOR)
            .await
            .map_err(|e| Self::session_err("first result not found", e))?;
        item.click()
            .await
            .map(|_| ())
            .map_err(|e| Self::session_err("first result click failed", e))
    }

    async fn screenshot(&self) -> Option<Vec<u8>> {
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.page.screenshot(params).await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agents_are_desktop() {
        assert!(DESKTOP_USER_AGENTS.iter().all(|ua| ua.contains("Mozilla")));
        assert!(random_user_agent().contains("Mozilla"));
    }

    #[test]
    fn test_search_url_encodes_term() {
        let url = search_url("cute cats & dogs", FilterPolicy::Default);
        assert!(url.starts_with("https://yandex.com/images/search?text="));
        assert!(url.contains("cute%20cats%20%26%20dogs"));
        assert!(!url.contains("family="));
    }

    #[test]
    fn test_search_url_unfiltered_appends_family() {
        let url = search_url("sunset", FilterPolicy::Unfiltered);
        assert!(url.ends_with("&family=no"));
    }
}
