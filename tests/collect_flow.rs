//! End-to-end collection runs over deterministic fakes: a scripted
//! results page and an in-memory transfer client. No network, no browser.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use imagehaul::download::{ByteStream, TransferClient, TransferError};
use imagehaul::scraping::observer::NoopObserver;
use imagehaul::scraping::page::{CrawlError, SearchPage};
use imagehaul::{collect_images, CollectRequest, CrawlConfig, DownloadOutcome, FilterPolicy};

fn fast_config() -> CrawlConfig {
    CrawlConfig {
        settle_pause: Duration::from_millis(1),
        results_timeout: Duration::from_millis(10),
    }
}

fn image_url(name: &str) -> String {
    format!("https://images.example.net/full/resolution/{}.png", name)
}

fn results_page(names: &[&str]) -> String {
    let imgs: String = names
        .iter()
        .map(|n| format!(r#"<img class="SimpleImage" src="{}">"#, image_url(n)))
        .collect();
    format!("<html><body>{}</body></html>", imgs)
}

enum PageScript {
    Ready(Vec<String>),
    NeverReady,
    MissingInput,
}

struct FakePage {
    script: PageScript,
    cursor: AtomicUsize,
}

impl FakePage {
    fn serving(snapshots: Vec<String>) -> Self {
        Self {
            script: PageScript::Ready(snapshots),
            cursor: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SearchPage for FakePage {
    async fn open_text_search(&self, _term: &str, _policy: FilterPolicy) -> Result<(), CrawlError> {
        Ok(())
    }

    async fn open_reverse_search(&self, image: &Path) -> Result<(), CrawlError> {
        match self.script {
            PageScript::MissingInput => Err(CrawlError::InputNotFound(image.to_path_buf())),
            _ => Ok(()),
        }
    }

    async fn await_results(&self, timeout: Duration) -> Result<(), CrawlError> {
        match self.script {
            PageScript::NeverReady => Err(CrawlError::NavigationTimeout(timeout)),
            _ => Ok(()),
        }
    }

    async fn scroll_and_settle(&self, _pause: Duration) -> Result<(), CrawlError> {
        Ok(())
    }

    async fn snapshot(&self) -> Result<String, CrawlError> {
        match &self.script {
            PageScript::Ready(snapshots) => {
                let idx = self.cursor.fetch_add(1, Ordering::SeqCst);
                Ok(snapshots
                    .get(idx)
                    .or_else(|| snapshots.last())
                    .cloned()
                    .unwrap_or_default())
            }
            _ => Ok(String::new()),
        }
    }

    async fn open_first_result(&self) -> Result<(), CrawlError> {
        Ok(())
    }
}

/// Serves scripted bodies; unknown URLs fail with a 404-shaped error.
struct FakeTransfer {
    bodies: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl FakeTransfer {
    fn serving(urls: &[String]) -> Self {
        Self {
            bodies: urls
                .iter()
                .map(|u| (u.clone(), format!("bytes-of:{}", u).into_bytes()))
                .collect(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TransferClient for FakeTransfer {
    async fn get(&self, url: &str) -> Result<ByteStream, TransferError> {
        self.requests.lock().unwrap().push(url.to_string());
        match self.bodies.get(url) {
            Some(body) => Ok(futures::stream::iter(vec![Ok(Bytes::copy_from_slice(body))]).boxed()),
            None => Err(TransferError::Status(404)),
        }
    }
}

#[tokio::test]
async fn test_text_search_run_downloads_quota() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("cats");

    // Two snapshots: 3 images, then 5 — quota 4 is met on the second pass.
    let page = FakePage::serving(vec![
        results_page(&["a", "b", "c"]),
        results_page(&["a", "b", "c", "d", "e"]),
    ]);
    let expected: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|n| image_url(n)).collect();
    let transfer = FakeTransfer::serving(&expected);

    let result = collect_images(
        &page,
        &transfer,
        &CollectRequest::text("cats", 4),
        &dest,
        fast_config(),
        &NoopObserver,
    )
    .await
    .unwrap();

    assert_eq!(result.attempted, 4);
    assert_eq!(result.succeeded, 4);
    assert!(result
        .items
        .iter()
        .all(|i| i.outcome == DownloadOutcome::Succeeded));

    // Files are numbered in sequence with inferred extensions.
    for i in 1..=4 {
        assert!(dest.join(format!("image_{:03}.png", i)).exists());
    }
    assert_eq!(transfer.requests.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn test_partial_download_failure_is_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out");

    let page = FakePage::serving(vec![results_page(&["ok", "missing"])]);
    // Only one of the two discovered URLs is servable.
    let transfer = FakeTransfer::serving(&[image_url("ok")]);

    let result = collect_images(
        &page,
        &transfer,
        &CollectRequest::text("anything", 2),
        &dest,
        fast_config(),
        &NoopObserver,
    )
    .await
    .unwrap();

    assert_eq!(result.attempted, 2);
    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed(), 1);
    let failed: Vec<_> = result
        .items
        .iter()
        .filter(|i| i.outcome == DownloadOutcome::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].source_url, image_url("missing"));
}

#[tokio::test]
async fn test_scenario_d_navigation_timeout_reports_zero() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("never");

    let page = FakePage {
        script: PageScript::NeverReady,
        cursor: AtomicUsize::new(0),
    };
    let transfer = FakeTransfer::serving(&[]);

    let result = collect_images(
        &page,
        &transfer,
        &CollectRequest::text("anything", 5),
        &dest,
        fast_config(),
        &NoopObserver,
    )
    .await
    .unwrap();

    assert_eq!(result.attempted, 0);
    assert_eq!(result.succeeded, 0);
    assert!(result.items.is_empty());
    // Nothing was downloaded, so the destination folder was never created.
    assert!(!dest.exists());
    assert!(transfer.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_reference_image_reports_zero() {
    let dir = tempfile::tempdir().unwrap();

    let page = FakePage {
        script: PageScript::MissingInput,
        cursor: AtomicUsize::new(0),
    };
    let transfer = FakeTransfer::serving(&[]);

    let result = collect_images(
        &page,
        &transfer,
        &CollectRequest::reference_image("/nonexistent/photo.jpg", 5),
        dir.path(),
        fast_config(),
        &NoopObserver,
    )
    .await
    .unwrap();

    assert_eq!(result.attempted, 0);
    assert_eq!(result.succeeded, 0);
}

#[tokio::test]
async fn test_reverse_search_uses_similar_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("similar_images");

    let page = FakePage::serving(vec![results_page(&["twin"])]);
    let transfer = FakeTransfer::serving(&[image_url("twin")]);

    let result = collect_images(
        &page,
        &transfer,
        &CollectRequest::reference_image("seed.jpg", 1),
        &dest,
        fast_config(),
        &NoopObserver,
    )
    .await
    .unwrap();

    assert_eq!(result.succeeded, 1);
    assert!(dest.join("similar_001.png").exists());
}

#[tokio::test]
async fn test_empty_results_report_zero_without_downloads() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("empty");

    let page = FakePage::serving(vec!["<html><body></body></html>".to_string()]);
    let transfer = FakeTransfer::serving(&[]);

    let result = collect_images(
        &page,
        &transfer,
        &CollectRequest::text("nothing here", 3),
        &dest,
        fast_config(),
        &NoopObserver,
    )
    .await
    .unwrap();

    assert_eq!(result.attempted, 0);
    assert!(transfer.requests.lock().unwrap().is_empty());
    assert!(!dest.exists());
}
