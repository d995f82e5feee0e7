//! Crawl-run observability.
//!
//! Debug side effects (page-source snapshots, screenshots) are a
//! cross-cutting concern: the controller notifies an observer at defined
//! checkpoints and otherwise knows nothing about artifacts. The controller
//! only captures page payloads when the observer declares itself active,
//! so the default `NoopObserver` costs nothing per iteration.

use std::path::PathBuf;

use chrono::Utc;
use tracing::warn;

/// Where in the run a checkpoint was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStage {
    /// The results view rendered a recognizable marker.
    ResultsReady,
    /// One scroll + extract cycle completed.
    ScrollCycle,
    /// The one-shot recovery fallback fired.
    Recovery,
    /// The run ended (quota met or attempts exhausted).
    Finished,
}

impl CrawlStage {
    fn label(self) -> &'static str {
        match self {
            CrawlStage::ResultsReady => "results_ready",
            CrawlStage::ScrollCycle => "scroll_cycle",
            CrawlStage::Recovery => "recovery",
            CrawlStage::Finished => "finished",
        }
    }
}

/// Payload handed to the observer at each checkpoint. `page_html` and
/// `screenshot` are populated only for active observers.
#[derive(Debug)]
pub struct Checkpoint<'a> {
    pub stage: CrawlStage,
    pub attempt: u32,
    pub found: usize,
    pub page_html: Option<&'a str>,
    pub screenshot: Option<&'a [u8]>,
}

pub trait CrawlObserver: Send + Sync {
    /// Active observers receive page payloads; inactive ones only counters.
    fn active(&self) -> bool {
        false
    }

    fn checkpoint(&self, checkpoint: &Checkpoint<'_>);
}

/// Default observer: ignores everything.
pub struct NoopObserver;

impl CrawlObserver for NoopObserver {
    fn checkpoint(&self, _checkpoint: &Checkpoint<'_>) {}
}

/// Writes page-source snapshots and screenshots into a directory, one pair
/// per checkpoint. Failures to write are logged and swallowed — artifact
/// dumping must never affect the run itself.
pub struct ArtifactObserver {
    dir: PathBuf,
}

impl ArtifactObserver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn artifact_path(&self, checkpoint: &Checkpoint<'_>, ext: &str) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
        self.dir.join(format!(
            "{}_{:02}_{}.{}",
            checkpoint.stage.label(),
            checkpoint.attempt,
            stamp,
            ext
        ))
    }
}

impl CrawlObserver for ArtifactObserver {
    fn active(&self) -> bool {
        true
    }

    fn checkpoint(&self, checkpoint: &Checkpoint<'_>) {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            warn!("artifact dir {} unavailable: {}", self.dir.display(), e);
            return;
        }
        if let Some(html) = checkpoint.page_html {
            let path = self.artifact_path(checkpoint, "html");
            if let Err(e) = std::fs::write(&path, html) {
                warn!("failed to dump page source {}: {}", path.display(), e);
            }
        }
        if let Some(png) = checkpoint.screenshot {
            let path = self.artifact_path(checkpoint, "png");
            if let Err(e) = std::fs::write(&path, png) {
                warn!("failed to dump screenshot {}: {}", path.display(), e);
            }
        }
    }
}
