pub mod collect;
pub mod core;
pub mod download;
pub mod scraping;

// --- Primary core exports ---
pub use collect::collect_images;
pub use core::config;
pub use core::types;
pub use core::types::*;
pub use download::{HttpTransfer, TransferClient, TransferError};
pub use scraping::browser::BrowserSession;
pub use scraping::crawl::{CrawlConfig, CrawlController, MAX_SCROLL_ATTEMPTS};
pub use scraping::observer::{ArtifactObserver, CrawlObserver, NoopObserver};
pub use scraping::page::{CrawlError, SearchPage};
