//! The incremental crawl loop shared by every paginated source.
//!
//! A topic is crawled page by page, newest first. Each page's candidates
//! are checked against the collection as it was loaded, new ones get their
//! article page fetched, and the collection is checkpointed every
//! [`CrawlOptions::checkpoint_every`] processed items and once more when the
//! topic ends, however it ends.

pub mod newsletter;

use crate::{
    article::{ArticleRecord, DetailFields},
    error::{CrawlerError, ExtractError, FetchError},
    fetcher::{Page, PageFetcher, PageRequest},
    persistent::{CollectionKey, ErrorLedger, ListingCollection, ListingStore},
    retry::RetryPolicy,
    Extractor, ListingOrder,
};
use futures::{stream, StreamExt};
use std::{collections::HashSet, fmt, sync::Arc};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOptions {
    /// Processed items between two checkpoints.
    pub checkpoint_every: usize,
    /// Retries of one listing page before the topic is abandoned.
    pub page_retry: RetryPolicy,
    pub detail_retry: RetryPolicy,
    /// Article pages fetched at once within one listing page.
    pub detail_concurrency: usize,
    /// Overrides the ordering each source declares.
    pub ordering: Option<ListingOrder>,
    pub max_pages: Option<u32>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        CrawlOptions {
            checkpoint_every: 10,
            page_retry: RetryPolicy::bounded(5),
            detail_retry: RetryPolicy::unbounded(),
            detail_concurrency: 1,
            ordering: None,
            max_pages: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// First already-known id of a newest-first listing.
    Duplicate(String),
    EndOfListing,
    PageLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlReport {
    pub key: CollectionKey,
    pub pages: u32,
    pub new_records: usize,
    pub skipped: usize,
    pub ledgered: usize,
    pub checkpoints: usize,
    pub stop: Option<StopReason>,
}

impl CrawlReport {
    fn new(key: CollectionKey) -> CrawlReport {
        CrawlReport {
            key,
            pages: 0,
            new_records: 0,
            skipped: 0,
            ledgered: 0,
            checkpoints: 0,
            stop: None,
        }
    }
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] pages: {}, new: {}, skipped: {}, faulty: {}, checkpoints: {}",
            self.key, self.pages, self.new_records, self.skipped, self.ledgered, self.checkpoints
        )?;
        match &self.stop {
            Some(StopReason::Duplicate(id)) => write!(f, ", stopped at known id {}", id),
            Some(StopReason::EndOfListing) => write!(f, ", end of listing"),
            Some(StopReason::PageLimit) => write!(f, ", page limit"),
            None => Ok(()),
        }
    }
}

/// What the article page gave for one candidate.
#[derive(Debug)]
pub(crate) enum Detail {
    /// The listing already carried a body.
    Complete,
    Fields(DetailFields),
    Faulty,
}

/// One collection and its ledger, exclusively owned by a running crawl.
pub(crate) struct TopicState {
    pub(crate) key: CollectionKey,
    pub(crate) collection: ListingCollection,
    pub(crate) ledger: ErrorLedger,
    pub(crate) report: CrawlReport,
    since_checkpoint: usize,
}

impl TopicState {
    pub(crate) async fn load(
        store: &ListingStore,
        key: CollectionKey,
    ) -> Result<TopicState, CrawlerError> {
        let collection = store.load(&key).await?;
        let ledger = store.load_ledger(&key).await?;
        Ok(TopicState {
            report: CrawlReport::new(key.clone()),
            key,
            collection,
            ledger,
            since_checkpoint: 0,
        })
    }

    /// Merges one processed candidate and checkpoints on cadence.
    pub(crate) async fn persist(
        &mut self,
        store: &ListingStore,
        every: usize,
        mut record: ArticleRecord,
        detail: Detail,
    ) -> Result<(), CrawlerError> {
        match detail {
            Detail::Complete => {}
            Detail::Fields(fields) => record.apply_detail(fields),
            Detail::Faulty => {
                if self.ledger.record(record.article_id.as_str()) {
                    self.report.ledgered += 1;
                    warn!(
                        "[{}] {} added to faulty ids, total faults: {}",
                        self.key,
                        record.article_id,
                        self.ledger.len()
                    );
                }
            }
        }
        debug!("[{}] [{}] {}", self.key, self.collection.len() + 1, record.title);
        self.collection.merge(record);
        self.report.new_records += 1;
        self.since_checkpoint += 1;
        if self.since_checkpoint >= every.max(1) {
            self.checkpoint(store).await?;
        }
        Ok(())
    }

    pub(crate) async fn checkpoint(&mut self, store: &ListingStore) -> Result<(), CrawlerError> {
        store.checkpoint(&self.key, &self.collection).await?;
        store.checkpoint_ledger(&self.key, &mut self.ledger).await?;
        self.report.checkpoints += 1;
        self.since_checkpoint = 0;
        Ok(())
    }

    /// Final checkpoint, written whether or not the crawl succeeded.
    pub(crate) async fn finish(
        mut self,
        store: &ListingStore,
        outcome: Result<(), CrawlerError>,
    ) -> Result<CrawlReport, CrawlerError> {
        let saved = self.checkpoint(store).await;
        if let Err(e) = &outcome {
            error!("[{}] crawl stopped: {}", self.key, e);
        }
        outcome?;
        saved?;
        info!("{}", self.report);
        Ok(self.report)
    }
}

/// Drives one source's topics through page, extract, dedupe, detail and
/// persist.
pub struct CrawlController {
    store: ListingStore,
    fetcher: Arc<dyn PageFetcher>,
    options: CrawlOptions,
}

impl CrawlController {
    pub fn new(
        store: ListingStore,
        fetcher: Arc<dyn PageFetcher>,
        options: CrawlOptions,
    ) -> CrawlController {
        CrawlController {
            store,
            fetcher,
            options,
        }
    }

    pub fn store(&self) -> &ListingStore {
        &self.store
    }

    /// Crawls `topic` until the first known id (newest-first listings), the
    /// end of the listing, or the page limit.
    pub async fn crawl_topic(
        &self,
        extractor: &dyn Extractor,
        topic: &str,
    ) -> Result<CrawlReport, CrawlerError> {
        let key = CollectionKey::new(extractor.source(), topic);
        let mut state = TopicState::load(&self.store, key).await?;
        let outcome = self.run_pages(extractor, topic, &mut state).await;
        state.finish(&self.store, outcome).await
    }

    async fn run_pages(
        &self,
        extractor: &dyn Extractor,
        topic: &str,
        state: &mut TopicState,
    ) -> Result<(), CrawlerError> {
        let ordering = self.options.ordering.unwrap_or_else(|| extractor.ordering());
        let known: HashSet<String> = state.collection.ids().map(ToString::to_string).collect();
        let mut seen: HashSet<String> = HashSet::new();

        let mut page_no = 1;
        loop {
            if let Some(max) = self.options.max_pages {
                if page_no > max {
                    state.report.stop = Some(StopReason::PageLimit);
                    return Ok(());
                }
            }

            let request = extractor.listing_request(topic, page_no)?;
            info!("[{}] Scraping page {}", state.key, page_no);
            let Some(page) =
                fetch_listing(self.fetcher.as_ref(), &self.options.page_retry, &request).await?
            else {
                info!("[{}] page {} not found, end of listing", state.key, page_no);
                state.report.stop = Some(StopReason::EndOfListing);
                return Ok(());
            };
            state.report.pages += 1;

            let listing = extractor.extract_listing_page(&page)?;
            if listing.items.is_empty() {
                info!("[{}] no articles on page {}, end of listing", state.key, page_no);
                state.report.stop = Some(StopReason::EndOfListing);
                return Ok(());
            }
            debug!("[{}] {} articles on page {}", state.key, listing.items.len(), page_no);

            let mut candidates = vec![];
            for item in listing.items {
                if known.contains(&item.article_id) {
                    match ordering {
                        ListingOrder::NewestFirst => {
                            info!("[{}] {} already scraped, stopping", state.key, item.article_id);
                            state.report.stop = Some(StopReason::Duplicate(item.article_id));
                            break;
                        }
                        ListingOrder::Unordered => {
                            state.report.skipped += 1;
                            continue;
                        }
                    }
                }
                // Items shifted onto the next page while we were paging.
                if !seen.insert(item.article_id.clone()) {
                    state.report.skipped += 1;
                    continue;
                }
                if state.ledger.contains(&item.article_id) {
                    debug!("[{}] {} is a faulty id, skipping", state.key, item.article_id);
                    state.report.skipped += 1;
                    continue;
                }
                candidates.push(item);
            }

            let every = self.options.checkpoint_every.max(1);
            for chunk in candidates.chunks(every) {
                for (record, detail) in self.fetch_details(extractor, chunk.to_vec()).await {
                    state.persist(&self.store, every, record, detail).await?;
                }
            }

            if state.report.stop.is_some() {
                return Ok(());
            }
            if listing.reached_end {
                state.report.stop = Some(StopReason::EndOfListing);
                return Ok(());
            }
            page_no += 1;
        }
    }

    /// Fetches article pages for every stored record that still has no
    /// body and is not in the ledger.
    pub async fn backfill(
        &self,
        extractor: &dyn Extractor,
        topic: &str,
    ) -> Result<CrawlReport, CrawlerError> {
        let key = CollectionKey::new(extractor.source(), topic);
        let mut state = TopicState::load(&self.store, key).await?;
        let pending: Vec<ArticleRecord> = state
            .collection
            .iter()
            .filter(|r| !r.is_complete() && !state.ledger.contains(&r.article_id))
            .cloned()
            .collect();
        info!("[{}] {} articles without body", state.key, pending.len());

        let outcome = self.run_backfill(extractor, pending, &mut state).await;
        state.finish(&self.store, outcome).await
    }

    async fn run_backfill(
        &self,
        extractor: &dyn Extractor,
        pending: Vec<ArticleRecord>,
        state: &mut TopicState,
    ) -> Result<(), CrawlerError> {
        let every = self.options.checkpoint_every.max(1);
        for chunk in pending.chunks(every) {
            for (record, detail) in self.fetch_details(extractor, chunk.to_vec()).await {
                state.persist(&self.store, every, record, detail).await?;
            }
        }
        Ok(())
    }

    /// Detail fetches for one batch, results kept in batch order.
    async fn fetch_details(
        &self,
        extractor: &dyn Extractor,
        records: Vec<ArticleRecord>,
    ) -> Vec<(ArticleRecord, Detail)> {
        stream::iter(records)
            .map(|record| async move {
                let detail = if record.is_complete() {
                    Detail::Complete
                } else {
                    let request = extractor.detail_request(&record);
                    fetch_detail(
                        self.fetcher.as_ref(),
                        &self.options.detail_retry,
                        &request,
                        |page| extractor.extract_detail(page),
                    )
                    .await
                };
                (record, detail)
            })
            .buffered(self.options.detail_concurrency.max(1))
            .collect()
            .await
    }
}

/// One listing page, retried while it fails transiently. `None` means the
/// page does not exist.
pub(crate) async fn fetch_listing(
    fetcher: &dyn PageFetcher,
    policy: &RetryPolicy,
    request: &PageRequest,
) -> Result<Option<Page>, CrawlerError> {
    let mut backoff = policy.backoff();
    loop {
        match fetcher.fetch(request).await {
            Ok(page) => return Ok(Some(page)),
            Err(FetchError::NotFound) => return Ok(None),
            Err(FetchError::Fatal(e)) => return Err(FetchError::Fatal(e).into()),
            Err(last @ FetchError::Transient(_)) => {
                if !backoff.wait(&request.describe()).await {
                    return Err(CrawlerError::PageRetriesExhausted {
                        page: request.describe(),
                        attempts: backoff.attempts(),
                        last,
                    });
                }
            }
        }
    }
}

/// Fetches and extracts one article page. Transient failures are retried
/// per `policy`; anything else marks the article faulty.
pub(crate) async fn fetch_detail<F>(
    fetcher: &dyn PageFetcher,
    policy: &RetryPolicy,
    request: &PageRequest,
    extract: F,
) -> Detail
where
    F: Fn(&Page) -> Result<DetailFields, ExtractError>,
{
    let mut backoff = policy.backoff();
    loop {
        match fetcher.fetch(request).await {
            Ok(page) => {
                return match extract(&page) {
                    Ok(fields) => Detail::Fields(fields),
                    Err(e) => {
                        warn!("[!] {}: {}", request.url, e);
                        Detail::Faulty
                    }
                }
            }
            Err(FetchError::NotFound) => {
                warn!("[!] {} does not exist", request.url);
                return Detail::Faulty;
            }
            Err(FetchError::Fatal(e)) => {
                error!("[!] {}: {}", request.url, e);
                return Detail::Faulty;
            }
            Err(FetchError::Transient(_)) => {
                if !backoff.wait(&request.url).await {
                    return Detail::Faulty;
                }
            }
        }
    }
}
