pub mod error_logs;
pub mod memory;
pub mod postgrest;
pub mod prices;

use crate::config::Settings;
use crate::domain::price::{DailyPriceRecord, StoredPrice};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use error_logs::ErrorLogEntry;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Row-oriented access to the `stock_prices` table, keyed by `(symbol, date)`.
///
/// `written_at` is supplied by the caller so the reconciler owns the timestamps.
#[async_trait::async_trait]
pub trait PriceStore: Send + Sync {
    fn backend(&self) -> StoreBackend;

    async fn find(&self, symbol: &str, date: NaiveDate) -> anyhow::Result<Option<StoredPrice>>;

    async fn insert(
        &self,
        record: &DailyPriceRecord,
        written_at: DateTime<Utc>,
    ) -> anyhow::Result<StoredPrice>;

    async fn update(
        &self,
        record: &DailyPriceRecord,
        written_at: DateTime<Utc>,
    ) -> anyhow::Result<StoredPrice>;

    /// Insert, or overwrite the row sharing the record's key. Keeps the existing
    /// `created_at` on conflict.
    async fn upsert(
        &self,
        record: &DailyPriceRecord,
        written_at: DateTime<Utc>,
    ) -> anyhow::Result<StoredPrice>;

    async fn latest(&self, symbol: &str) -> anyhow::Result<Option<StoredPrice>>;

    async fn record_error(&self, entry: &ErrorLogEntry) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Postgrest,
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Postgrest => "postgrest",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "postgrest" | "supabase" | "rest" => Ok(Self::Postgrest),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("unknown STORE_BACKEND: {other}"),
        }
    }
}

/// Builds the configured store. Postgres connections run embedded migrations first.
pub async fn connect(settings: &Settings) -> anyhow::Result<Arc<dyn PriceStore>> {
    let store: Arc<dyn PriceStore> = match settings.store_backend {
        StoreBackend::Postgres => {
            let db_url = settings.require_database_url()?;
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .context("connect DATABASE_URL failed")?;
            migrate(&pool).await?;
            Arc::new(prices::PgPriceStore::new(pool))
        }
        StoreBackend::Postgrest => Arc::new(postgrest::PostgrestPriceStore::from_settings(
            settings,
        )?),
        StoreBackend::Memory => Arc::new(memory::MemoryPriceStore::default()),
    };

    tracing::info!(backend = %store.backend(), "price store ready");
    Ok(store)
}

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}
