use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where a collection run gets its results view from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QuerySource {
    /// Plain text search term.
    Text(String),
    /// Reverse-image search seeded by a local file.
    ReferenceImage(PathBuf),
}

impl QuerySource {
    /// Default destination folder name for this query, before sanitization.
    pub fn default_folder_name(&self) -> String {
        match self {
            QuerySource::Text(term) => term.clone(),
            QuerySource::ReferenceImage(path) => {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "image".to_string());
                format!("reverse_search_{}", stem)
            }
        }
    }

    /// Filename prefix for downloaded items.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            QuerySource::Text(_) => "image",
            QuerySource::ReferenceImage(_) => "similar",
        }
    }
}

/// Site-side content filter applied when the search URL is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterPolicy {
    /// Leave the site's default (moderate) filtering in place.
    Default,
    /// Ask the site to disable its content filter.
    Unfiltered,
}

/// One collection run's input. Immutable once issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectRequest {
    pub query: QuerySource,
    /// Number of distinct image URLs the caller wants. Must be positive.
    pub target_count: usize,
    pub filter_policy: FilterPolicy,
}

impl CollectRequest {
    pub fn text(term: impl Into<String>, target_count: usize) -> Self {
        Self {
            query: QuerySource::Text(term.into()),
            target_count,
            filter_policy: FilterPolicy::Default,
        }
    }

    pub fn reference_image(path: impl Into<PathBuf>, target_count: usize) -> Self {
        Self {
            query: QuerySource::ReferenceImage(path.into()),
            target_count,
            filter_policy: FilterPolicy::Default,
        }
    }
}

/// Terminal state of one download attempt. Set exactly once per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadOutcome {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadItem {
    /// 1-based position in the input URL sequence.
    pub sequence_index: usize,
    pub source_url: String,
    pub destination: PathBuf,
    pub outcome: DownloadOutcome,
    /// Failure description when `outcome` is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate result of one collection run. Produced once, immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectResult {
    pub attempted: usize,
    pub succeeded: usize,
    pub items: Vec<DownloadItem>,
}

impl CollectResult {
    /// The reported zero-result outcome: the run found nothing and
    /// downloaded nothing, without raising an error to the caller.
    pub fn empty() -> Self {
        Self {
            attempted: 0,
            succeeded: 0,
            items: Vec::new(),
        }
    }

    pub fn failed(&self) -> usize {
        self.attempted - self.succeeded
    }
}
