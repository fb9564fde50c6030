//! Flattens the persisted collections of every source into one SQLite
//! table.

use crate::{
    article::{ArticleRecord, Source},
    data::{ArticleRow, ArticleTable, Table},
    error::CrawlerError,
    persistent::{CollectionKey, ListingCollection, ListingStore},
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use futures::{stream, StreamExt};
use lazy_regex::regex;
use std::path::Path;
use tracing::{debug, info, warn};

pub const TABLE_NAME: &str = "articles";

/// Collections exported when none are named explicitly.
pub const DEFAULT_COLLECTIONS: [(Source, &str); 8] = [
    (Source::Ec, "solar"),
    (Source::Eec, "renewable-news"),
    (Source::Nleec, "renewable"),
    (Source::Mercom, "mercom"),
    (Source::Saur, "saur"),
    (Source::Pvmag, "pvmag"),
    (Source::PvmagUsa, "pvmag_usa"),
    (Source::PvmagGlobal, "pvmag_global"),
];

const LOAD_CONCURRENCY: usize = 4;

pub fn default_collections() -> Vec<CollectionKey> {
    DEFAULT_COLLECTIONS
        .iter()
        .map(|(source, topic)| CollectionKey::new(*source, *topic))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EtlReport {
    pub loaded: usize,
    pub exported: usize,
    pub skipped: usize,
    pub missing: Vec<CollectionKey>,
}

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%a, %b %d, %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
];

const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Publication date in any of the sources' formats → `YYYY-MM-DD`.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local().date().format("%Y-%m-%d").to_string());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.naive_local().date().format("%Y-%m-%d").to_string());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date().format("%Y-%m-%d").to_string());
        }
    }
    // "Mon, Jul 1st, 2024"
    let cleaned = regex!(r"(\d)(st|nd|rd|th)\b").replace_all(raw, "$1");
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&cleaned, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}

/// Row for one record; newsletter records that never got a body are left
/// out.
pub fn to_row(record: &ArticleRecord) -> Option<ArticleRow> {
    if record.source == Source::Nleec && !record.is_complete() {
        return None;
    }
    let date = record.date_published.as_deref().and_then(|raw| {
        let date = normalize_date(raw);
        if date.is_none() {
            debug!("[{}] unparsable date {:?}", record.source, raw);
        }
        date
    });
    Some(ArticleRow {
        id: format!("{}:{}", record.source, record.article_id),
        url: record.url.clone(),
        title: record.title.clone(),
        summary: record.summary.clone(),
        body: record.body.clone(),
        date,
        keywords: record.keywords.join("|"),
        source: record.source.to_string(),
    })
}

/// Loads `keys` a few at a time, keeping their order. Collections with no
/// file yet come back as `None`.
pub async fn load_collections(
    store: &ListingStore,
    keys: Vec<CollectionKey>,
) -> Result<Vec<(CollectionKey, Option<ListingCollection>)>, CrawlerError> {
    let loaded: Vec<_> = stream::iter(keys)
        .map(|key| async move {
            let collection = store.load(&key).await;
            (key, collection)
        })
        .buffered(LOAD_CONCURRENCY)
        .collect()
        .await;

    loaded
        .into_iter()
        .map(|(key, collection)| {
            let collection = collection?;
            if collection.is_first_time() {
                Ok((key, None))
            } else {
                Ok((key, Some(collection)))
            }
        })
        .collect()
}

pub async fn export(
    store: &ListingStore,
    keys: Vec<CollectionKey>,
    output: &Path,
) -> Result<EtlReport, CrawlerError> {
    let mut report = EtlReport::default();
    let mut rows = vec![];
    for (key, collection) in load_collections(store, keys).await? {
        let Some(collection) = collection else {
            warn!("[{}] no collection file, skipping", key);
            report.missing.push(key);
            continue;
        };
        report.loaded += collection.len();
        let before = rows.len();
        rows.extend(collection.iter().filter_map(to_row));
        let kept = rows.len() - before;
        report.skipped += collection.len() - kept;
        info!("[{}] {} of {} articles kept", key, kept, collection.len());
    }

    let table = ArticleTable::open(output, TABLE_NAME).await?;
    table.insert_all(&rows).await?;
    report.exported = rows.len();
    info!(
        "Processed {} articles, table now holds {}",
        report.exported,
        table.count().await?
    );
    table.close().await;
    Ok(report)
}
