use crate::domain::price::{DailyPriceRecord, StoredPrice};
use crate::storage::error_logs::{insert_error_log, ErrorLogEntry};
use crate::storage::{PriceStore, StoreBackend};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};

const COLUMNS: &str = "symbol, date, open, high, low, close, volume, source, created_at, updated_at";

type PriceRow = (
    String,
    NaiveDate,
    f64,
    f64,
    f64,
    f64,
    i64,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn from_row(row: PriceRow) -> StoredPrice {
    let (symbol, date, open, high, low, close, volume, source, created_at, updated_at) = row;
    StoredPrice {
        record: DailyPriceRecord {
            symbol,
            date,
            open,
            high,
            low,
            close,
            volume,
            source,
        },
        created_at: Some(created_at),
        updated_at: Some(updated_at),
    }
}

/// `stock_prices` over a direct Postgres connection.
#[derive(Debug, Clone)]
pub struct PgPriceStore {
    pool: sqlx::PgPool,
}

impl PgPriceStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PriceStore for PgPriceStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Postgres
    }

    async fn find(&self, symbol: &str, date: NaiveDate) -> anyhow::Result<Option<StoredPrice>> {
        let row = sqlx::query_as::<_, PriceRow>(&format!(
            "SELECT {COLUMNS} FROM stock_prices WHERE symbol = $1 AND date = $2"
        ))
        .persistent(false)
        .bind(symbol)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("select stock_prices failed (symbol={symbol}, date={date})"))?;

        Ok(row.map(from_row))
    }

    async fn insert(
        &self,
        record: &DailyPriceRecord,
        written_at: DateTime<Utc>,
    ) -> anyhow::Result<StoredPrice> {
        let row = sqlx::query_as::<_, PriceRow>(&format!(
            "INSERT INTO stock_prices (symbol, date, open, high, low, close, volume, source, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) \
             RETURNING {COLUMNS}"
        ))
        .persistent(false)
        .bind(&record.symbol)
        .bind(record.date)
        .bind(record.open)
        .bind(record.high)
        .bind(record.low)
        .bind(record.close)
        .bind(record.volume)
        .bind(&record.source)
        .bind(written_at)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("insert stock_prices failed (date={})", record.date))?;

        Ok(from_row(row))
    }

    async fn update(
        &self,
        record: &DailyPriceRecord,
        written_at: DateTime<Utc>,
    ) -> anyhow::Result<StoredPrice> {
        let row = sqlx::query_as::<_, PriceRow>(&format!(
            "UPDATE stock_prices \
             SET open = $3, high = $4, low = $5, close = $6, volume = $7, source = $8, updated_at = $9 \
             WHERE symbol = $1 AND date = $2 \
             RETURNING {COLUMNS}"
        ))
        .persistent(false)
        .bind(&record.symbol)
        .bind(record.date)
        .bind(record.open)
        .bind(record.high)
        .bind(record.low)
        .bind(record.close)
        .bind(record.volume)
        .bind(&record.source)
        .bind(written_at)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("update stock_prices failed (date={})", record.date))?;

        let row = row.with_context(|| {
            format!(
                "update stock_prices matched no row (symbol={}, date={})",
                record.symbol, record.date
            )
        })?;
        Ok(from_row(row))
    }

    async fn upsert(
        &self,
        record: &DailyPriceRecord,
        written_at: DateTime<Utc>,
    ) -> anyhow::Result<StoredPrice> {
        let row = sqlx::query_as::<_, PriceRow>(&format!(
            "INSERT INTO stock_prices (symbol, date, open, high, low, close, volume, source, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) \
             ON CONFLICT (symbol, date) DO UPDATE \
               SET open = EXCLUDED.open, high = EXCLUDED.high, low = EXCLUDED.low, close = EXCLUDED.close, \
                   volume = EXCLUDED.volume, source = EXCLUDED.source, updated_at = EXCLUDED.updated_at \
             RETURNING {COLUMNS}"
        ))
        .persistent(false)
        .bind(&record.symbol)
        .bind(record.date)
        .bind(record.open)
        .bind(record.high)
        .bind(record.low)
        .bind(record.close)
        .bind(record.volume)
        .bind(&record.source)
        .bind(written_at)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("upsert stock_prices failed (date={})", record.date))?;

        Ok(from_row(row))
    }

    async fn latest(&self, symbol: &str) -> anyhow::Result<Option<StoredPrice>> {
        let row = sqlx::query_as::<_, PriceRow>(&format!(
            "SELECT {COLUMNS} FROM stock_prices WHERE symbol = $1 ORDER BY date DESC LIMIT 1"
        ))
        .persistent(false)
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .context("select latest stock_prices failed")?;

        Ok(row.map(from_row))
    }

    async fn record_error(&self, entry: &ErrorLogEntry) -> anyhow::Result<()> {
        insert_error_log(&self.pool, entry).await?;
        Ok(())
    }
}
