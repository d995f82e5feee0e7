//! Run glue: one collection run end to end.
//!
//! Drives the crawl controller, then hands the capped URL collection to
//! the download pipeline. Structural failures — the results view never
//! rendering, a missing reference image, no upload affordance — are
//! reported and converted into the zero-result outcome; only session-level
//! breakage propagates as an error. Nothing here terminates the process;
//! the CLI decides exit behavior from the aggregate result.

use std::path::Path;

use anyhow::Result;
use tracing::{info, warn};

use crate::core::types::{CollectRequest, CollectResult};
use crate::download::{self, TransferClient};
use crate::scraping::crawl::{CrawlConfig, CrawlController};
use crate::scraping::observer::CrawlObserver;
use crate::scraping::page::SearchPage;

/// Collect up to `request.target_count` images into `dest_dir`.
///
/// `dest_dir` is created if absent; files are named
/// `<prefix>_<NNN>.<ext>` with the prefix taken from the query kind.
pub async fn collect_images<P, T>(
    page: &P,
    transfer: &T,
    request: &CollectRequest,
    dest_dir: &Path,
    config: CrawlConfig,
    observer: &dyn CrawlObserver,
) -> Result<CollectResult>
where
    P: SearchPage,
    T: TransferClient + ?Sized,
{
    let controller = CrawlController::new(page, config, observer);

    let urls = match controller.collect(request).await {
        Ok(urls) => urls,
        Err(e) if e.is_structural() => {
            warn!("collection yielded nothing: {}", e);
            return Ok(CollectResult::empty());
        }
        Err(e) => return Err(e.into()),
    };

    if urls.is_empty() {
        warn!("no image urls found");
        return Ok(CollectResult::empty());
    }

    info!(
        "found {} image urls, downloading to {}",
        urls.len(),
        dest_dir.display()
    );
    download::download_all(transfer, &urls, dest_dir, request.query.file_prefix()).await
}
