use crate::domain::price::{DailyPriceRecord, StoredPrice};
use crate::storage::error_logs::ErrorLogEntry;
use crate::storage::{PriceStore, StoreBackend};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-process store honoring the `(symbol, date)` key. Backs `--dry-run` and tests.
#[derive(Debug, Default)]
pub struct MemoryPriceStore {
    rows: Mutex<BTreeMap<(String, NaiveDate), StoredPrice>>,
    errors: Mutex<Vec<ErrorLogEntry>>,
    failing_dates: Mutex<HashSet<NaiveDate>>,
    calls: AtomicUsize,
}

impl MemoryPriceStore {
    /// Makes every write for `date` fail, for exercising per-record failure handling.
    pub fn fail_writes_on(&self, date: NaiveDate) {
        lock(&self.failing_dates).insert(date);
    }

    pub fn rows(&self) -> Vec<StoredPrice> {
        lock(&self.rows).values().cloned().collect()
    }

    pub fn error_logs(&self) -> Vec<ErrorLogEntry> {
        lock(&self.errors).clone()
    }

    /// Number of store operations performed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn check_writable(&self, record: &DailyPriceRecord) -> Result<()> {
        if lock(&self.failing_dates).contains(&record.date) {
            anyhow::bail!("write rejected for {} {}", record.symbol, record.date);
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn key(record: &DailyPriceRecord) -> (String, NaiveDate) {
    (record.symbol.clone(), record.date)
}

#[async_trait::async_trait]
impl PriceStore for MemoryPriceStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Memory
    }

    async fn find(&self, symbol: &str, date: NaiveDate) -> Result<Option<StoredPrice>> {
        self.touch();
        Ok(lock(&self.rows).get(&(symbol.to_string(), date)).cloned())
    }

    async fn insert(&self, record: &DailyPriceRecord, written_at: DateTime<Utc>) -> Result<StoredPrice> {
        self.touch();
        self.check_writable(record)?;
        let mut rows = lock(&self.rows);
        let key = key(record);
        anyhow::ensure!(
            !rows.contains_key(&key),
            "duplicate key value violates unique constraint (symbol={}, date={})",
            record.symbol,
            record.date
        );
        let row = StoredPrice {
            record: record.clone(),
            created_at: Some(written_at),
            updated_at: Some(written_at),
        };
        rows.insert(key, row.clone());
        Ok(row)
    }

    async fn update(&self, record: &DailyPriceRecord, written_at: DateTime<Utc>) -> Result<StoredPrice> {
        self.touch();
        self.check_writable(record)?;
        let mut rows = lock(&self.rows);
        let Some(row) = rows.get_mut(&key(record)) else {
            anyhow::bail!(
                "update stock_prices matched no row (symbol={}, date={})",
                record.symbol,
                record.date
            );
        };
        row.record = record.clone();
        row.updated_at = Some(written_at);
        Ok(row.clone())
    }

    async fn upsert(&self, record: &DailyPriceRecord, written_at: DateTime<Utc>) -> Result<StoredPrice> {
        self.touch();
        self.check_writable(record)?;
        let mut rows = lock(&self.rows);
        let row = rows.entry(key(record)).or_insert_with(|| StoredPrice {
            record: record.clone(),
            created_at: Some(written_at),
            updated_at: None,
        });
        row.record = record.clone();
        row.updated_at = Some(written_at);
        Ok(row.clone())
    }

    async fn latest(&self, symbol: &str) -> Result<Option<StoredPrice>> {
        self.touch();
        Ok(lock(&self.rows)
            .values()
            .filter(|r| r.record.symbol == symbol)
            .max_by_key(|r| r.record.date)
            .cloned())
    }

    async fn record_error(&self, entry: &ErrorLogEntry) -> Result<()> {
        self.touch();
        lock(&self.errors).push(entry.clone());
        Ok(())
    }
}
