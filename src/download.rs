//! The download pipeline.
//!
//! Consumes the final URL collection in order, resolves one destination
//! file per item and streams each body straight to disk. Failures are
//! per-item: a dead URL marks its item `Failed` and the batch moves on.
//! Each URL is attempted exactly once — the aggregate `succeeded` count is
//! the only success signal the caller needs.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use regex::Regex;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::core::types::{CollectResult, DownloadItem, DownloadOutcome};

/// Fixed descriptive request header sent with every transfer.
const DOWNLOAD_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("body read failed: {0}")]
    Read(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ByteStream = BoxStream<'static, Result<Bytes, TransferError>>;

/// The transfer seam: a streamed GET. The pipeline owns writing the
/// stream to disk.
#[async_trait]
pub trait TransferClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<ByteStream, TransferError>;
}

/// reqwest-backed transfer client with a bounded per-request timeout.
pub struct HttpTransfer {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransfer {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl TransferClient for HttpTransfer {
    async fn get(&self, url: &str) -> Result<ByteStream, TransferError> {
        let resp = self
            .client
            .get(url)
            .header("User-Agent", DOWNLOAD_USER_AGENT)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| TransferError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransferError::Status(status.as_u16()));
        }

        Ok(resp
            .bytes_stream()
            .map_err(|e| TransferError::Read(e.to_string()))
            .boxed())
    }
}

/// Infer a file extension from the URL alone. A heuristic, not
/// content-type sniffing: first match wins in the checked order.
pub fn infer_extension(url: &str) -> &'static str {
    let lower = url.to_lowercase();
    if lower.contains(".png") {
        ".png"
    } else if lower.contains(".gif") {
        ".gif"
    } else if lower.contains(".webp") {
        ".webp"
    } else {
        ".jpg"
    }
}

static FOLDER_SANITIZER: OnceLock<Regex> = OnceLock::new();

/// Strip characters that are invalid in folder names on common filesystems.
pub fn sanitize_folder_name(name: &str) -> String {
    let re = FOLDER_SANITIZER
        .get_or_init(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("valid sanitizer pattern"));
    re.replace_all(name, "_").into_owned()
}

fn destination_path(dir: &Path, prefix: &str, sequence_index: usize, url: &str) -> PathBuf {
    dir.join(format!(
        "{}_{:03}{}",
        prefix,
        sequence_index,
        infer_extension(url)
    ))
}

/// Stream one body to `dest`. On any failure the partially-written file is
/// removed best-effort.
async fn download_one<T: TransferClient + ?Sized>(
    transfer: &T,
    url: &str,
    dest: &Path,
) -> Result<(), TransferError> {
    let result = async {
        let mut stream = transfer.get(url).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        Ok(())
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(dest).await;
    }
    result
}

/// Download every URL in input order into `dest_dir`, one attempt each.
///
/// Output items carry 1-based sequence indices matching input order;
/// `succeeded + failed == attempted == urls.len()`.
pub async fn download_all<T: TransferClient + ?Sized>(
    transfer: &T,
    urls: &[String],
    dest_dir: &Path,
    prefix: &str,
) -> Result<CollectResult> {
    tokio::fs::create_dir_all(dest_dir)
        .await
        .with_context(|| format!("creating destination folder {}", dest_dir.display()))?;

    let mut items = Vec::with_capacity(urls.len());
    let mut succeeded = 0;

    for (i, url) in urls.iter().enumerate() {
        let sequence_index = i + 1;
        let dest = destination_path(dest_dir, prefix, sequence_index, url);
        let mut item = DownloadItem {
            sequence_index,
            source_url: url.clone(),
            destination: dest.clone(),
            outcome: DownloadOutcome::Pending,
            error: None,
        };

        info!(
            "downloading {}/{}: {}...",
            sequence_index,
            urls.len(),
            url.chars().take(60).collect::<String>()
        );

        match download_one(transfer, url, &dest).await {
            Ok(()) => {
                item.outcome = DownloadOutcome::Succeeded;
                succeeded += 1;
            }
            Err(e) => {
                warn!("download failed for {}: {}", url, e);
                item.outcome = DownloadOutcome::Failed;
                item.error = Some(e.to_string());
            }
        }
        items.push(item);
    }

    Ok(CollectResult {
        attempted: urls.len(),
        succeeded,
        items,
    })
}
