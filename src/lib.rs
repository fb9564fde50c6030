pub mod article;
pub mod config;
pub mod crawler;
pub mod error;
pub mod etl;
pub mod fetcher;
pub mod persistent;
pub mod retry;
pub mod sources;

mod data;
mod utils;

pub use article::{ArticleRecord, DetailFields, Source};
pub use data::{ArticleRow, ArticleTable, Table};
pub use error::{CrawlerError, ExtractError, FetchError};
pub use fetcher::{Identity, Page, PageFetcher, PageRequest};
pub use persistent::{CollectionKey, ErrorLedger, ListingCollection, ListingStore};
pub use utils::{last_segment, squash_whitespace};

/// Whether a listing is sorted newest-first.
///
/// Only newest-first listings may stop at the first already-seen id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingOrder {
    NewestFirst,
    Unordered,
}

/// Candidates found on one listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    pub items: Vec<ArticleRecord>,
    /// Set when the source says there are no further pages.
    pub reached_end: bool,
}

impl ListingPage {
    pub fn new(items: Vec<ArticleRecord>) -> ListingPage {
        ListingPage {
            items,
            reached_end: false,
        }
    }

    pub fn end() -> ListingPage {
        ListingPage {
            items: vec![],
            reached_end: true,
        }
    }
}

/// Per-source extraction of listing pages and article pages.
///
/// Implementations skip (and log) single malformed items; an `Err` means the
/// page as a whole no longer looks like what the source used to serve.
pub trait Extractor: Send + Sync {
    fn source(&self) -> Source;

    fn identity(&self) -> &Identity;

    fn topics(&self) -> &[&'static str];

    /// Request for 1-based page `page` of `topic`.
    fn listing_request(&self, topic: &str, page: u32) -> Result<PageRequest, CrawlerError>;

    fn extract_listing_page(&self, page: &Page) -> Result<ListingPage, ExtractError>;

    fn extract_detail(&self, page: &Page) -> Result<DetailFields, ExtractError>;

    /// Request for an article's own page.
    fn detail_request(&self, record: &ArticleRecord) -> PageRequest {
        PageRequest::get(record.url.as_str())
    }

    fn ordering(&self) -> ListingOrder {
        ListingOrder::NewestFirst
    }
}
