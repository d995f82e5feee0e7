pub mod config;
pub mod types;

pub use types::{
    CollectRequest, CollectResult, DownloadItem, DownloadOutcome, FilterPolicy, QuerySource,
};
