use crate::{
    article::{ArticleRecord, Source},
    error::CrawlerError,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info};

/// Names one persisted collection: a source and one of its topics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionKey {
    pub source: Source,
    pub topic: String,
}

impl CollectionKey {
    pub fn new<T: Into<String>>(source: Source, topic: T) -> CollectionKey {
        CollectionKey {
            source,
            topic: topic.into(),
        }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.source, self.topic)
    }
}

/// In-memory listing of one (source, topic), in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingCollection {
    records: Vec<ArticleRecord>,
    index: HashMap<String, usize>,
    first_time: bool,
}

impl ListingCollection {
    pub fn new() -> ListingCollection {
        ListingCollection::default()
    }

    /// True when no file existed for this collection at load time.
    pub fn is_first_time(&self) -> bool {
        self.first_time
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, article_id: &str) -> bool {
        self.index.contains_key(article_id)
    }

    pub fn get(&self, article_id: &str) -> Option<&ArticleRecord> {
        self.index.get(article_id).map(|&i| &self.records[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArticleRecord> {
        self.records.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.article_id.as_str())
    }

    /// Upserts by id. An existing record only gains fields it was missing.
    pub fn merge(&mut self, record: ArticleRecord) {
        match self.index.get(&record.article_id) {
            Some(&i) => self.records[i].absorb(record),
            None => self.push(record),
        }
    }

    /// Upserts by id, replacing every field the new record carries.
    pub fn merge_overwrite(&mut self, record: ArticleRecord) {
        match self.index.get(&record.article_id) {
            Some(&i) => self.records[i].overwrite(record),
            None => self.push(record),
        }
    }

    fn push(&mut self, record: ArticleRecord) {
        self.index
            .insert(record.article_id.clone(), self.records.len());
        self.records.push(record);
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        let map: serde_json::Map<String, serde_json::Value> = self
            .records
            .iter()
            .map(|r| -> Result<_, serde_json::Error> {
                Ok((r.article_id.clone(), serde_json::to_value(r)?))
            })
            .collect::<Result<_, _>>()?;
        to_pretty(&map)
    }

    pub fn from_json(bytes: &[u8]) -> Result<ListingCollection, serde_json::Error> {
        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(bytes)?;
        let mut collection = ListingCollection::new();
        for (article_id, value) in map {
            let mut record: ArticleRecord = serde_json::from_value(value)?;
            record.article_id = article_id;
            collection.push(record);
        }
        Ok(collection)
    }
}

/// Ids (or URLs) that permanently failed extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLedger {
    entries: BTreeSet<String>,
    dirty: bool,
}

impl ErrorLedger {
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains(id)
    }

    /// Returns false if the id was already recorded.
    pub fn record<I: Into<String>>(&mut self, id: I) -> bool {
        let inserted = self.entries.insert(id.into());
        self.dirty |= inserted;
        inserted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// Directory of per-(source, topic) JSON files.
///
/// Layout: `<root>/<source>/<topic>.json` for listings and
/// `<root>/<source>/<topic>.errors.json` for error ledgers.
#[derive(Debug, Clone)]
pub struct ListingStore {
    root: PathBuf,
}

impl ListingStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> ListingStore {
        ListingStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_dir(&self, source: Source) -> PathBuf {
        self.root.join(source.as_str())
    }

    pub fn collection_path(&self, key: &CollectionKey) -> PathBuf {
        self.source_dir(key.source)
            .join(format!("{}.json", key.topic))
    }

    pub fn ledger_path(&self, key: &CollectionKey) -> PathBuf {
        self.source_dir(key.source)
            .join(format!("{}.errors.json", key.topic))
    }

    pub async fn load(&self, key: &CollectionKey) -> Result<ListingCollection, CrawlerError> {
        let path = self.collection_path(key);
        match read_optional(&path).await? {
            Some(bytes) => {
                let collection = ListingCollection::from_json(&bytes)
                    .map_err(|source| CrawlerError::Corrupt {
                        path: path.clone(),
                        source,
                    })?;
                info!("[{}] {} articles loaded", key, collection.len());
                Ok(collection)
            }
            None => {
                info!("[{}] no listing yet, starting fresh", key);
                Ok(ListingCollection {
                    first_time: true,
                    ..ListingCollection::default()
                })
            }
        }
    }

    pub async fn checkpoint(
        &self,
        key: &CollectionKey,
        collection: &ListingCollection,
    ) -> Result<(), CrawlerError> {
        let path = self.collection_path(key);
        write_atomic(&path, &collection.to_json()?).await?;
        info!("[{}] Dumped {:>05} articles", key, collection.len());
        Ok(())
    }

    pub async fn load_ledger(&self, key: &CollectionKey) -> Result<ErrorLedger, CrawlerError> {
        let entries: BTreeSet<String> = load_json(&self.ledger_path(key))
            .await?
            .unwrap_or_default();
        if !entries.is_empty() {
            info!("[{}] {} faulty ids loaded", key, entries.len());
        }
        Ok(ErrorLedger {
            entries,
            dirty: false,
        })
    }

    /// Writes the ledger if it gained entries since the last write.
    pub async fn checkpoint_ledger(
        &self,
        key: &CollectionKey,
        ledger: &mut ErrorLedger,
    ) -> Result<(), CrawlerError> {
        if !ledger.dirty {
            return Ok(());
        }
        save_json(&self.ledger_path(key), &ledger.entries).await?;
        ledger.dirty = false;
        info!("[{}] Dumped {} faulty ids", key, ledger.len());
        Ok(())
    }

    /// Empties a ledger on disk. Returns how many entries were dropped.
    pub async fn reset_ledger(&self, key: &CollectionKey) -> Result<usize, CrawlerError> {
        let ledger = self.load_ledger(key).await?;
        let dropped = ledger.len();
        save_json(&self.ledger_path(key), &BTreeSet::<String>::new()).await?;
        Ok(dropped)
    }
}

fn to_pretty<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    buf.push(b'\n');
    Ok(buf)
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, CrawlerError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CrawlerError::io(path, e)),
    }
}

/// Reads a whole JSON file, `None` when it does not exist.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CrawlerError> {
    match read_optional(path).await? {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CrawlerError::Corrupt {
                path: path.to_path_buf(),
                source,
            }),
        None => Ok(None),
    }
}

pub async fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CrawlerError> {
    write_atomic(path, &to_pretty(value)?).await
}

/// Writes to a sibling temp file, syncs it, then renames over `path`.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CrawlerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| CrawlerError::io(parent, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = fs::File::create(&tmp)
        .await
        .map_err(|e| CrawlerError::io(&tmp, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| CrawlerError::io(&tmp, e))?;
    file.sync_all()
        .await
        .map_err(|e| CrawlerError::io(&tmp, e))?;
    drop(file);

    fs::rename(&tmp, path)
        .await
        .map_err(|e| CrawlerError::io(path, e))?;
    debug!("Wrote {}", path.display());
    Ok(())
}
