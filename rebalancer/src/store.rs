//! Durable trade-record storage.
//!
//! [`RecordStore`] is a small key-value contract: put a record by id, get
//! one back, and scan a table page by page with a status filter. Two
//! implementations ship here:
//!
//! - [`MemoryStore`]: in-process, with write failure injection for tests
//! - [`JsonlStore`]: one append-only JSON Lines file per table; on load the
//!   last line for an id wins
//!
//! Every `put` is checked against the stored copy with
//! [`TradeRecord::check_successor`], so a stale writer cannot reopen a
//! reconciled record.

use std::collections::BTreeMap;
use std::collections::hash_map::Entry;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::{debug, warn};
use rustc_hash::FxHashMap;
use tranche::{RecordStatus, TradeRecord};

use crate::error::StoreError;

/// Which records a scan returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Is(RecordStatus),
    IsNot(RecordStatus),
}

impl StatusFilter {
    pub fn matches(self, record: &TradeRecord) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Is(s) => record.status() == s,
            StatusFilter::IsNot(s) => record.status() != s,
        }
    }
}

/// One page of a scan, ordered by record id.
#[derive(Debug, Default)]
pub struct Page {
    pub records: Vec<TradeRecord>,
    /// Pass back as `cursor` for the next page. `None` on the last page.
    pub next: Option<String>,
}

/// Durable key-value persistence for trade records.
pub trait RecordStore {
    /// Insert or replace a record, keyed by its id.
    fn put(&self, table: &str, record: &TradeRecord) -> Result<(), StoreError>;

    fn get(&self, table: &str, id: &str) -> Result<TradeRecord, StoreError>;

    /// Up to `limit` matching records with id greater than `cursor`.
    fn scan_page(
        &self,
        table: &str,
        filter: StatusFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page, StoreError>;

    /// Every record that is not yet reconciled, all pages drained.
    fn scan_unreconciled(
        &self,
        table: &str,
        page_size: usize,
    ) -> Result<Vec<TradeRecord>, StoreError> {
        let filter = StatusFilter::IsNot(RecordStatus::Reconciled);
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.scan_page(table, filter, cursor.as_deref(), page_size)?;
            out.extend(page.records);
            match page.next {
                Some(next) => cursor = Some(next),
                None => return Ok(out),
            }
        }
    }
}

impl<S: RecordStore + ?Sized> RecordStore for &S {
    fn put(&self, table: &str, record: &TradeRecord) -> Result<(), StoreError> {
        (**self).put(table, record)
    }

    fn get(&self, table: &str, id: &str) -> Result<TradeRecord, StoreError> {
        (**self).get(table, id)
    }

    fn scan_page(
        &self,
        table: &str,
        filter: StatusFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page, StoreError> {
        (**self).scan_page(table, filter, cursor, limit)
    }
}

type Table = BTreeMap<String, TradeRecord>;

fn page_of(table: &Table, filter: StatusFilter, cursor: Option<&str>, limit: usize) -> Page {
    let limit = limit.max(1);
    let lower = match cursor {
        Some(c) => Bound::Excluded(c),
        None => Bound::Unbounded,
    };
    let mut matching = table
        .range::<str, _>((lower, Bound::Unbounded))
        .map(|(_, r)| r)
        .filter(|r| filter.matches(r));

    let records: Vec<TradeRecord> = matching.by_ref().take(limit).cloned().collect();
    let more = matching.next().is_some();
    let next = match records.last() {
        Some(last) if more => Some(last.id().to_string()),
        _ => None,
    };
    Page { records, next }
}

fn check_write(table: &Table, record: &TradeRecord) -> Result<(), StoreError> {
    if let Some(existing) = table.get(record.id()) {
        existing.check_successor(record)?;
    }
    Ok(())
}

fn not_found(table: &str, id: &str) -> StoreError {
    StoreError::NotFound {
        table: table.to_string(),
        id: id.to_string(),
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

#[derive(Default)]
struct MemoryState {
    tables: FxHashMap<String, Table>,
    puts: usize,
    fail_put_at: Option<usize>,
    fail_scans: bool,
}

/// In-memory store for tests and dry runs.
///
/// ```
/// use tranche::{Decimal, Ticker, TradeRecord};
/// use tranche_rebalancer::store::{MemoryStore, RecordStore};
///
/// let store = MemoryStore::new();
/// let rec = TradeRecord::new(Ticker::new("SPY").unwrap(), Decimal::from(3));
/// store.put("trades", &rec).unwrap();
/// assert_eq!(store.get("trades", rec.id()).unwrap(), rec);
///
/// // The next put fails once; nothing is written.
/// store.fail_put_after(0);
/// assert!(store.put("trades", &rec).is_err());
/// ```
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail one `put`: the one after `successes` further successful puts.
    pub fn fail_put_after(&self, successes: usize) {
        let mut state = self.state();
        state.fail_put_at = Some(state.puts + successes);
    }

    /// Fail every scan while `true`.
    pub fn set_fail_scans(&self, fail: bool) {
        self.state().fail_scans = fail;
    }

    /// Successful puts so far.
    pub fn put_count(&self) -> usize {
        self.state().puts
    }

    /// All records in `table`, ordered by id.
    pub fn records(&self, table: &str) -> Vec<TradeRecord> {
        self.state()
            .tables
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl RecordStore for MemoryStore {
    fn put(&self, table: &str, record: &TradeRecord) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.fail_put_at == Some(state.puts) {
            state.fail_put_at = None;
            let msg = format!("injected put failure for {}", record.id());
            return Err(StoreError::Unavailable(msg));
        }
        let t = state.tables.entry(table.to_string()).or_default();
        check_write(t, record)?;
        t.insert(record.id().to_string(), record.clone());
        state.puts += 1;
        Ok(())
    }

    fn get(&self, table: &str, id: &str) -> Result<TradeRecord, StoreError> {
        self.state()
            .tables
            .get(table)
            .and_then(|t| t.get(id))
            .cloned()
            .ok_or_else(|| not_found(table, id))
    }

    fn scan_page(
        &self,
        table: &str,
        filter: StatusFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page, StoreError> {
        let state = self.state();
        if state.fail_scans {
            return Err(StoreError::Unavailable("injected scan failure".into()));
        }
        Ok(state
            .tables
            .get(table)
            .map(|t| page_of(t, filter, cursor, limit))
            .unwrap_or_default())
    }
}

// ============================================================================
// JsonlStore
// ============================================================================

/// File-backed store: `<dir>/<table>.jsonl`, one record per line.
///
/// Writes append a full copy of the record and fsync before returning.
/// Tables are read into memory on first use.
pub struct JsonlStore {
    dir: PathBuf,
    tables: Mutex<FxHashMap<String, Table>>,
}

impl JsonlStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            tables: Mutex::new(FxHashMap::default()),
        })
    }

    pub fn table_path(&self, table: &str) -> Result<PathBuf, StoreError> {
        let valid = !table.is_empty()
            && table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidTable(table.to_string()));
        }
        Ok(self.dir.join(format!("{table}.jsonl")))
    }

    fn with_table<T>(
        &self,
        table: &str,
        f: impl FnOnce(&mut Table, &Path) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let path = self.table_path(table)?;
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let t = match tables.entry(table.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => {
                let loaded = load_table(&path)?;
                debug!("Loaded {} records from {}", loaded.len(), path.display());
                v.insert(loaded)
            }
        };
        f(t, &path)
    }
}

/// Replay a table file. Later lines replace earlier ones for the same id,
/// and must be legal successors of them.
///
/// An unparsable final line is a write torn by a crash; it is dropped and
/// the file truncated so the next append starts on a clean line.
fn load_table(path: &Path) -> Result<Table, StoreError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Table::new()),
        Err(e) => return Err(e.into()),
    };

    let mut table = Table::new();
    let mut offset = 0;
    let mut lines = bytes.split_inclusive(|b| *b == b'\n').enumerate().peekable();
    while let Some((idx, raw)) = lines.next() {
        let start = offset;
        offset += raw.len();
        let line = raw.trim_ascii();
        if line.is_empty() {
            continue;
        }
        let corrupt = |message: String| StoreError::Corrupt {
            path: path.to_path_buf(),
            line: idx + 1,
            message,
        };
        let record: TradeRecord = match serde_json::from_slice(line) {
            Ok(r) => r,
            Err(e) if lines.peek().is_none() => {
                warn!("Dropping torn line {} of {}: {e}", idx + 1, path.display());
                truncate(path, start)?;
                break;
            }
            Err(e) => return Err(corrupt(e.to_string())),
        };
        if let Some(prev) = table.get(record.id()) {
            prev.check_successor(&record)
                .map_err(|e| corrupt(e.to_string()))?;
        }
        table.insert(record.id().to_string(), record);
    }
    Ok(table)
}

fn truncate(path: &Path, len: usize) -> Result<(), StoreError> {
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len as u64)?;
    file.sync_data()?;
    Ok(())
}

fn append_line(path: &Path, record: &TradeRecord) -> Result<(), StoreError> {
    let json = serde_json::to_string(record)?;
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{json}")?;
    writer.flush()?;
    writer.get_ref().sync_data()?;
    Ok(())
}

impl RecordStore for JsonlStore {
    fn put(&self, table: &str, record: &TradeRecord) -> Result<(), StoreError> {
        self.with_table(table, |t, path| {
            check_write(t, record)?;
            append_line(path, record)?;
            t.insert(record.id().to_string(), record.clone());
            Ok(())
        })
    }

    fn get(&self, table: &str, id: &str) -> Result<TradeRecord, StoreError> {
        self.with_table(table, |t, _| t.get(id).cloned().ok_or_else(|| not_found(table, id)))
    }

    fn scan_page(
        &self,
        table: &str,
        filter: StatusFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Page, StoreError> {
        self.with_table(table, |t, _| Ok(page_of(t, filter, cursor, limit)))
    }
}
