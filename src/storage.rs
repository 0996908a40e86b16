//! Deduplicated, persisted article table.
//!
//! The dataset is a single CSV file with a fixed header
//! (`title, author, content, source, url, date`) and every field quoted so
//! article bodies may contain commas, quotes and newlines. The whole file is
//! loaded into memory at start and rewritten in full on every flush.
//!
//! Records are keyed by `url`. Merging never overwrites an existing row and
//! never duplicates one; within a batch the first occurrence of a URL wins.
//!
//! Rows of an existing file that cannot be read as an [`Article`] (a bad
//! date, invalid UTF-8) are kept verbatim, realigned to the current column
//! order, and written back on every flush. Their URLs still count as known.
//!
//! # Concurrency
//!
//! Source workers share one store as [`SharedStore`]. The "is this URL known"
//! check and the insert happen in [`ArticleStore::merge`], under a single lock
//! acquisition.

use crate::error::StoreError;
use crate::models::Article;
use csv::ByteRecord;
use indexmap::{IndexMap, IndexSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

/// Column order of the persisted file.
pub const COLUMNS: [&str; 6] = ["title", "author", "content", "source", "url", "date"];

const URL_COLUMN: usize = 4;

/// A store shared between concurrently running source workers.
pub type SharedStore = Arc<Mutex<ArticleStore>>;

#[derive(Debug)]
pub struct ArticleStore {
    path: PathBuf,
    table: IndexMap<String, Article>,
    /// Unreadable rows from the loaded file, in [`COLUMNS`] order.
    verbatim: Vec<ByteRecord>,
    verbatim_urls: IndexSet<String>,
    /// Records merged since the last successful flush.
    dirty: bool,
}

impl ArticleStore {
    /// An empty store that will flush to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: IndexMap::new(),
            verbatim: Vec::new(),
            verbatim_urls: IndexSet::new(),
            dirty: false,
        }
    }

    /// Load the existing dataset at `path`.
    ///
    /// A missing file is an empty table. Rows that cannot be deserialized are
    /// logged and kept verbatim. Any other read failure is an error: the
    /// caller must not flush over a file it could not read.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let mut store = Self::new(path);

        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No existing articles file found");
                return Ok(store);
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes.as_slice());

        let headers = reader.byte_headers()?.clone();
        let positions = column_positions(&headers);
        let mut raw = ByteRecord::new();
        let mut row = 0usize;
        while reader.read_byte_record(&mut raw)? {
            row += 1;
            match raw.deserialize::<Article>(Some(&headers)) {
                Ok(article) => {
                    store.table.entry(article.url.clone()).or_insert(article);
                }
                Err(e) => {
                    warn!(row, error = %e, "Keeping unreadable row as is");
                    store.keep_verbatim(realign(&raw, &positions));
                }
            }
        }

        info!(
            count = store.table.len(),
            unreadable = store.verbatim.len(),
            "Loaded existing articles"
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows the next flush will write, unreadable ones included.
    pub fn len(&self) -> usize {
        self.table.len() + self.verbatim.len()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.table.contains_key(url) || self.verbatim_urls.contains(url)
    }

    fn keep_verbatim(&mut self, record: ByteRecord) {
        if let Some(url) = record
            .get(URL_COLUMN)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .filter(|url| !url.is_empty())
        {
            self.verbatim_urls.insert(url.to_string());
        }
        self.verbatim.push(record);
    }

    /// Insert every record whose URL is not yet present; returns how many
    /// were inserted.
    pub fn merge<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = Article>,
    {
        let mut added = 0;
        for article in records {
            if self.contains(&article.url) {
                continue;
            }
            self.table.insert(article.url.clone(), article);
            added += 1;
        }
        if added > 0 {
            self.dirty = true;
        }
        added
    }

    /// Rewrite the whole table to disk.
    ///
    /// Writes to a sibling temporary file first and renames it into place, so
    /// a failed flush leaves the previous file intact.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), count = self.table.len()))]
    pub async fn flush(&mut self) -> Result<(), StoreError> {
        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .has_headers(false)
            .from_writer(Vec::new());

        writer.write_record(COLUMNS)?;
        for article in self.table.values() {
            writer.serialize(article)?;
        }
        for record in &self.verbatim {
            writer.write_byte_record(record)?;
        }
        let bytes = writer.into_inner().map_err(|e| StoreError::Io {
            path: self.path.clone(),
            source: e.into_error(),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_error(parent))?;
        }
        let tmp = temp_path(&self.path);
        fs::write(&tmp, bytes).await.map_err(io_error(&tmp))?;
        fs::rename(&tmp, &self.path)
            .await
            .map_err(io_error(&self.path))?;

        self.dirty = false;
        info!("Saved articles");
        Ok(())
    }

    /// Merge `records` and flush.
    ///
    /// Returns the number of new records persisted. If the flush fails the
    /// error is logged and 0 is returned; the records stay in memory and are
    /// written by the next successful flush.
    pub async fn checkpoint(&mut self, records: Vec<Article>) -> usize {
        let added = self.merge(records);
        if added == 0 && !self.dirty {
            info!("No new articles to save");
            return 0;
        }
        match self.flush().await {
            Ok(()) => {
                info!(added, path = %self.path.display(), "Saved new articles");
                added
            }
            Err(e) => {
                error!(error = %e, path = %self.path.display(), "Error saving articles");
                0
            }
        }
    }
}

/// For each of [`COLUMNS`], its index in the file's header row.
fn column_positions(headers: &ByteRecord) -> Vec<Option<usize>> {
    COLUMNS
        .iter()
        .map(|column| headers.iter().position(|h| h == column.as_bytes()))
        .collect()
}

fn realign(raw: &ByteRecord, positions: &[Option<usize>]) -> ByteRecord {
    positions
        .iter()
        .map(|position| position.and_then(|i| raw.get(i)).unwrap_or_default())
        .collect()
}

#[cfg(test)]
impl ArticleStore {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, url: &str) -> Option<&Article> {
        self.table.get(url)
    }

    pub fn articles(&self) -> impl Iterator<Item = &Article> {
        self.table.values()
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + use<> {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn article(url: &str, title: &str) -> Article {
        Article {
            title: title.to_string(),
            author: "Ada Lovelace, Grace Hopper".to_string(),
            content: "Line one, with a comma.\n\n\"Quoted\" line two.".to_string(),
            source: "example".to_string(),
            url: url.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_table() {
        let dir = tempdir().unwrap();
        let store = ArticleStore::load(dir.path().join("absent.csv")).await.unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_merge_same_record_twice_adds_once() {
        let mut store = ArticleStore::new("unused.csv");
        assert_eq!(store.merge(vec![article("https://e.com/a", "A")]), 1);
        assert_eq!(store.merge(vec![article("https://e.com/a", "A")]), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_merge_never_overwrites_and_first_in_batch_wins() {
        let mut store = ArticleStore::new("unused.csv");
        store.merge(vec![article("https://e.com/a", "Original")]);

        let added = store.merge(vec![
            article("https://e.com/a", "Refetched"),
            article("https://e.com/b", "First"),
            article("https://e.com/b", "Second"),
        ]);
        assert_eq!(added, 1);
        assert_eq!(store.get("https://e.com/a").unwrap().title, "Original");
        assert_eq!(store.get("https://e.com/b").unwrap().title, "First");
    }

    #[tokio::test]
    async fn test_flush_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("articles.csv");

        let mut sparse = article("https://e.com/sparse", "");
        sparse.author = String::new();
        sparse.content = String::new();

        let mut store = ArticleStore::new(&path);
        store.merge(vec![article("https://e.com/a", "A, \"quoted\""), sparse]);
        store.flush().await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with(r#""title","author","content","source","url","date""#));
        assert!(raw.contains(r#""2024-03-07""#));
        assert!(raw.contains(r#""""#), "empty fields are quoted");

        let reloaded = ArticleStore::load(&path).await.unwrap();
        let urls: Vec<_> = reloaded.articles().map(|a| a.url.as_str()).collect();
        assert_eq!(urls, vec!["https://e.com/a", "https://e.com/sparse"]);

        let a = reloaded.get("https://e.com/a").unwrap();
        assert_eq!(a, &article("https://e.com/a", "A, \"quoted\""));

        let s = reloaded.get("https://e.com/sparse").unwrap();
        assert_eq!(s.title, "");
        assert_eq!(s.author, "");
        assert_eq!(s.content, "");
        assert_eq!(s.source, "example");
    }

    #[tokio::test]
    async fn test_load_tolerates_missing_columns_and_keeps_bad_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.csv");
        std::fs::write(
            &path,
            "url,date,title\n\
             https://e.com/a,2024-03-07,A\n\
             https://e.com/b,not-a-date,B\n\
             https://e.com/a,2024-03-08,Duplicate\n",
        )
        .unwrap();

        let mut store = ArticleStore::load(&path).await.unwrap();
        assert_eq!(store.len(), 2);
        let a = store.get("https://e.com/a").unwrap();
        assert_eq!(a.title, "A");
        assert_eq!(a.author, "");
        assert!(store.contains("https://e.com/b"));

        // A known URL is not merged again, readable or not.
        assert_eq!(store.merge(vec![article("https://e.com/b", "Refetched")]), 0);

        store.flush().await.unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains(r#""B","","","","https://e.com/b","not-a-date""#));
        assert!(!raw.contains("Refetched"));
    }

    #[tokio::test]
    async fn test_unreadable_row_survives_checkpoint() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("articles.csv");
        let bytes = b"title,author,content,source,url,date\n\
            Old,Unknown,broken \xff byte,example,https://e.com/old,2024-01-01\n\
            Kept,Unknown,fine,example,https://e.com/kept,2024-01-02\n"
            .to_vec();
        std::fs::write(&path, &bytes).unwrap();

        let mut store = ArticleStore::load(&path).await.unwrap();
        assert_eq!(store.get("https://e.com/kept").unwrap().title, "Kept");
        assert!(store.get("https://e.com/old").is_none());
        assert!(store.contains("https://e.com/old"));

        assert_eq!(store.checkpoint(vec![article("https://e.com/new", "New")]).await, 1);

        let written = std::fs::read(&path).unwrap();
        let needle = b"broken \xff byte";
        assert!(written.windows(needle.len()).any(|w| w == needle));

        let reloaded = ArticleStore::load(&path).await.unwrap();
        assert_eq!(reloaded.len(), 3);
        assert!(reloaded.contains("https://e.com/old"));
        assert!(reloaded.contains("https://e.com/new"));
    }

    #[tokio::test]
    async fn test_unreadable_file_is_an_error() {
        let dir = tempdir().unwrap();
        // A directory cannot be read as a file.
        let path = dir.path().join("articles.csv");
        std::fs::create_dir(&path).unwrap();
        assert!(matches!(
            ArticleStore::load(&path).await,
            Err(StoreError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_checkpoint_reports_zero_on_write_failure_and_recovers() {
        let dir = tempdir().unwrap();
        // A directory where the file should be makes the rename fail.
        let blocked = dir.path().join("blocked.csv");
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("keep"), "x").unwrap();

        let mut store = ArticleStore::new(&blocked);
        assert_eq!(store.checkpoint(vec![article("https://e.com/a", "A")]).await, 0);
        assert_eq!(store.len(), 1, "in-memory table is kept");

        store.path = dir.path().join("articles.csv");
        assert_eq!(store.checkpoint(Vec::new()).await, 0);
        let reloaded = ArticleStore::load(store.path()).await.unwrap();
        assert!(reloaded.contains("https://e.com/a"));
    }
}
