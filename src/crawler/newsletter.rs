//! Date-driven crawl of the Energy Economic Times newsletter.
//!
//! Indexing walks calendar dates and stores each issue's links by
//! category. Draining fetches the articles behind those links into one
//! collection per category, skipping anything the `eec` category crawler
//! already has.

use super::{fetch_detail, fetch_listing, CrawlOptions, CrawlReport, Detail, TopicState};
use crate::{
    article::{ArticleRecord, Source},
    error::CrawlerError,
    fetcher::PageFetcher,
    persistent::{load_json, save_json, CollectionKey, ListingStore},
    sources::newsletter::{article_id, companion_topic, IssueLinks, NewsletterExtractor},
};
use chrono::{Duration, NaiveDate};
use futures::{stream, StreamExt};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    path::PathBuf,
    sync::Arc,
};
use tracing::{debug, info, warn};

pub const INDEX_FILE: &str = "newsletter.json";

/// `YYYY-MM-DD → category → article URLs`, one entry per issue that had
/// links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NewsletterIndex {
    issues: BTreeMap<String, IssueLinks>,
}

impl NewsletterIndex {
    pub fn new() -> NewsletterIndex {
        NewsletterIndex::default()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.issues
            .get(&date_key(date))
            .map_or(false, |links| links.values().any(|urls| !urls.is_empty()))
    }

    pub fn insert(&mut self, date: NaiveDate, links: IssueLinks) {
        self.issues.insert(date_key(date), links);
    }

    pub fn issues(&self) -> usize {
        self.issues.len()
    }

    pub fn link_count(&self) -> usize {
        self.issues
            .values()
            .flat_map(|links| links.values())
            .map(BTreeSet::len)
            .sum()
    }

    /// Every indexed URL, grouped by category across all dates.
    pub fn by_category(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut categories: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for links in self.issues.values() {
            for (category, urls) in links {
                categories
                    .entry(category.clone())
                    .or_default()
                    .extend(urls.iter().cloned());
            }
        }
        categories
    }
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// First newsletter issue to the last one certainly published.
pub fn default_range(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = NaiveDate::from_ymd_opt(2010, 1, 1).unwrap_or(today);
    (start, today - Duration::days(2))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub fetched: usize,
    pub already_indexed: usize,
    pub empty: Vec<NaiveDate>,
    pub failed: Vec<NaiveDate>,
    pub links: usize,
}

pub struct NewsletterIndexer {
    store: ListingStore,
    fetcher: Arc<dyn PageFetcher>,
    extractor: NewsletterExtractor,
    options: CrawlOptions,
}

impl NewsletterIndexer {
    pub fn new(
        store: ListingStore,
        fetcher: Arc<dyn PageFetcher>,
        options: CrawlOptions,
    ) -> NewsletterIndexer {
        NewsletterIndexer {
            store,
            fetcher,
            extractor: NewsletterExtractor::new(),
            options,
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.store.source_dir(Source::Nleec).join(INDEX_FILE)
    }

    pub async fn load_index(&self) -> Result<NewsletterIndex, CrawlerError> {
        let index: NewsletterIndex = load_json(&self.index_path()).await?.unwrap_or_default();
        info!(
            "[nleec] newsletters of {} dates loaded, {} links",
            index.issues(),
            index.link_count()
        );
        Ok(index)
    }

    /// Fetches every issue in `start..=end` not indexed yet. Issues that
    /// fail or carry no links are logged and left out of the index, so a
    /// later run tries them again.
    pub async fn index_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<IndexReport, CrawlerError> {
        let mut index = self.load_index().await?;
        let mut report = IndexReport::default();

        let mut date = start;
        while date <= end {
            if index.contains(date) {
                report.already_indexed += 1;
            } else {
                self.index_one(&mut index, date, &mut report).await?;
            }
            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        info!(
            "[nleec] {} issues fetched, {} already indexed, {} empty, {} failed, {} new links",
            report.fetched,
            report.already_indexed,
            report.empty.len(),
            report.failed.len(),
            report.links
        );
        Ok(report)
    }

    async fn index_one(
        &self,
        index: &mut NewsletterIndex,
        date: NaiveDate,
        report: &mut IndexReport,
    ) -> Result<(), CrawlerError> {
        let request = self.extractor.issue_request(date);
        info!("[nleec] Scraping for {}", date);
        let page = match fetch_listing(self.fetcher.as_ref(), &self.options.page_retry, &request)
            .await
        {
            Ok(Some(page)) => page,
            Ok(None) => {
                warn!("[nleec] [{}] no issue at {}", date, request.describe());
                report.failed.push(date);
                return Ok(());
            }
            Err(e) => {
                warn!("[nleec] [{}] {}", date, e);
                report.failed.push(date);
                return Ok(());
            }
        };
        report.fetched += 1;

        let links = self.extractor.extract_links(&page);
        let count: usize = links.values().map(BTreeSet::len).sum();
        if count == 0 {
            warn!("[nleec] No newsletter on {}? {}", date, request.describe());
            report.empty.push(date);
            return Ok(());
        }
        report.links += count;
        index.insert(date, links);
        save_json(&self.index_path(), &*index).await?;
        info!(
            "[nleec] Dumped {} links, {:>04} newsletters",
            index.link_count(),
            index.issues()
        );
        Ok(())
    }

    /// Fetches every indexed article not yet stored, one collection per
    /// category.
    pub async fn drain(&self) -> Result<Vec<CrawlReport>, CrawlerError> {
        let categories = self.load_index().await?.by_category();
        for (category, urls) in &categories {
            info!("[nleec] {:<12} {}", category, urls.len());
        }

        let mut reports = vec![];
        for (category, urls) in categories
            .into_iter()
            .sorted_by_key(|(category, _)| std::cmp::Reverse(category.len()))
        {
            reports.push(self.drain_category(&category, urls).await?);
        }
        Ok(reports)
    }

    async fn drain_category(
        &self,
        category: &str,
        urls: BTreeSet<String>,
    ) -> Result<CrawlReport, CrawlerError> {
        let companion_key = CollectionKey::new(Source::Eec, companion_topic(category));
        let companion = self.store.load(&companion_key).await?;
        let companion_ledger = self.store.load_ledger(&companion_key).await?;

        let mut state =
            TopicState::load(&self.store, CollectionKey::new(Source::Nleec, category)).await?;

        let mut seen = HashSet::new();
        let mut pending = vec![];
        for url in urls {
            let id = article_id(&url).to_string();
            if state.collection.contains(&id) {
                debug!("[nleec] {} already scraped from the newsletter", id);
            } else if companion.contains(&id) {
                debug!("[nleec] {} already scraped from {}", id, companion_key);
            } else if state.ledger.contains(&id) || companion_ledger.contains(&id) {
                debug!("[nleec] {} is a faulty id, skipping", id);
            } else if seen.insert(id.clone()) {
                pending.push(ArticleRecord::new(Source::Nleec, id, url, ""));
                continue;
            }
            state.report.skipped += 1;
        }
        info!("[{}] {} articles to fetch", state.key, pending.len());

        let outcome = self.fetch_pending(pending, &mut state).await;
        state.finish(&self.store, outcome).await
    }

    async fn fetch_pending(
        &self,
        pending: Vec<ArticleRecord>,
        state: &mut TopicState,
    ) -> Result<(), CrawlerError> {
        let every = self.options.checkpoint_every.max(1);
        for chunk in pending.chunks(every) {
            let fetched: Vec<(ArticleRecord, Detail)> = stream::iter(chunk.to_vec())
                .map(|record| async move {
                    let request = self.extractor.detail_request(&record.url);
                    let detail = fetch_detail(
                        self.fetcher.as_ref(),
                        &self.options.detail_retry,
                        &request,
                        |page| self.extractor.extract_detail(page),
                    )
                    .await;
                    (record, detail)
                })
                .buffered(self.options.detail_concurrency.max(1))
                .collect()
                .await;
            for (record, detail) in fetched {
                state.persist(&self.store, every, record, detail).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crawler::tests::options,
        error::FetchError,
        fetcher::fake::FakeFetcher,
        persistent::ListingCollection,
    };
    use pretty_assertions::assert_eq;

    const TRACKER: &str = "https://energy.economictimes.indiatimes.com/redirect?url=";

    fn article_url(category: &str, id: &str) -> String {
        format!(
            "https://energy.economictimes.indiatimes.com/news/{}/story-{}/{}",
            category, id, id
        )
    }

    fn issue(links: &[(&str, &str)]) -> String {
        let anchors: String = links
            .iter()
            .map(|(category, id)| {
                format!(
                    r#"<a href="{}{}&mailer_id=1">Story {}</a>"#,
                    TRACKER,
                    urlencoding::encode(&article_url(category, id)),
                    id
                )
            })
            .collect();
        format!("<html><body>{}</body></html>", anchors)
    }

    fn article(headline: &str) -> String {
        format!(
            r#"<html><head><script type="application/ld+json">
            {{"@type": "NewsArticle", "headline": "{}", "articleBody": "Body of {}"}}
            </script></head></html>"#,
            headline, headline
        )
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    fn issue_key(date: NaiveDate) -> String {
        NewsletterExtractor::new().issue_request(date).describe()
    }

    #[test]
    fn default_range_ends_two_days_ago() {
        let (start, end) = default_range(day(10));
        assert_eq!(start, NaiveDate::from_ymd_opt(2010, 1, 1).unwrap());
        assert_eq!(end, day(8));
    }

    #[tokio::test]
    async fn indexes_only_dates_with_links() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(
            FakeFetcher::new()
                .page(issue_key(day(1)), issue(&[("renewable", "101"), ("coal", "102")]))
                .page(issue_key(day(2)), "<html><body>Nothing today</body></html>")
                .fail(issue_key(day(4)), FetchError::Transient(Some(500))),
        );
        let indexer =
            NewsletterIndexer::new(ListingStore::new(dir.path()), fetcher.clone(), options());

        let report = indexer.index_dates(day(1), day(4)).await.unwrap();
        assert_eq!(report.fetched, 2);
        assert_eq!(report.links, 2);
        assert_eq!(report.empty, vec![day(2)]);
        assert_eq!(report.failed, vec![day(3), day(4)]);

        let index = indexer.load_index().await.unwrap();
        assert_eq!(index.issues(), 1);
        assert!(index.contains(day(1)));
        assert_eq!(
            index.by_category()["renewable"],
            BTreeSet::from([article_url("renewable", "101")])
        );

        fetcher.reset_calls();
        let report = indexer.index_dates(day(1), day(2)).await.unwrap();
        assert_eq!(report.already_indexed, 1);
        assert_eq!(fetcher.calls(), vec![issue_key(day(2))]);
    }

    #[tokio::test]
    async fn drain_skips_what_is_already_known() {
        let dir = tempfile::tempdir().unwrap();
        let store = ListingStore::new(dir.path());

        let mut index = NewsletterIndex::new();
        let mut links = IssueLinks::new();
        links.insert(
            "renewable".into(),
            ["201", "202", "203", "204"]
                .iter()
                .map(|id| article_url("renewable", id))
                .collect(),
        );
        index.insert(day(1), links);
        save_json(&store.source_dir(Source::Nleec).join(INDEX_FILE), &index)
            .await
            .unwrap();

        // 202 came in through the category crawler, 203 is known to fail.
        let companion_key = CollectionKey::new(Source::Eec, "renewable-news");
        let mut companion = ListingCollection::new();
        companion.merge(ArticleRecord::new(
            Source::Eec,
            "202",
            article_url("renewable", "202"),
            "Story 202",
        ));
        store.checkpoint(&companion_key, &companion).await.unwrap();
        let own_key = CollectionKey::new(Source::Nleec, "renewable");
        let mut ledger = store.load_ledger(&own_key).await.unwrap();
        ledger.record("203");
        store.checkpoint_ledger(&own_key, &mut ledger).await.unwrap();

        let fetcher = Arc::new(
            FakeFetcher::new().page(article_url("renewable", "201"), article("Solar park")),
        );
        let indexer = NewsletterIndexer::new(store.clone(), fetcher.clone(), options());
        let reports = indexer.drain().await.unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].skipped, 2);
        assert_eq!(reports[0].new_records, 2);
        assert_eq!(reports[0].ledgered, 1);
        assert_eq!(fetcher.count(&article_url("renewable", "202")), 0);
        assert_eq!(fetcher.count(&article_url("renewable", "203")), 0);

        let stored = store.load(&own_key).await.unwrap();
        let record = stored.get("201").unwrap();
        assert_eq!(record.title, "Solar park");
        assert_eq!(record.body.as_deref(), Some("Body of Solar park"));
        assert!(store.load_ledger(&own_key).await.unwrap().contains("204"));

        fetcher.reset_calls();
        let reports = indexer.drain().await.unwrap();
        assert_eq!(reports[0].new_records, 0);
        assert!(fetcher.calls().is_empty());
    }
}
