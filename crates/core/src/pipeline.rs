use crate::config::Settings;
use crate::domain::price::{DailyPriceRecord, DateRange, ProviderId, StoredPrice, Symbol};
use crate::error::{PipelineError, ProviderFailure};
use crate::ingest::adapter::QuoteSourceAdapter;
use crate::reconcile::{BackfillSummary, Reconciler, RecordOutcome, WriteAction};
use crate::storage::error_logs::{ErrorLogEntry, STOCK_PRICE_UPDATE};
use crate::storage::{self, PriceStore};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Result of the scheduled single-day update.
#[derive(Debug, Clone, Serialize)]
pub struct DailyUpdate {
    pub action: WriteAction,
    pub record: DailyPriceRecord,
    pub row: StoredPrice,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    pub symbol: String,
    pub range: DateRange,
    pub provider: ProviderId,
    pub summary: BackfillSummary,
    pub outcomes: Vec<RecordOutcome>,
}

/// Adapter → normalizer → reconciler for one symbol.
pub struct QuotePipeline {
    symbol: Symbol,
    adapter: QuoteSourceAdapter,
    reconciler: Reconciler,
}

impl QuotePipeline {
    pub fn new(symbol: Symbol, adapter: QuoteSourceAdapter, reconciler: Reconciler) -> Self {
        Self {
            symbol,
            adapter,
            reconciler,
        }
    }

    /// Connects the configured store and builds the providers.
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let store = storage::connect(settings).await?;
        Self::with_store(settings, store)
    }

    pub fn with_store(settings: &Settings, store: Arc<dyn PriceStore>) -> anyhow::Result<Self> {
        let symbol = Symbol::new(&settings.symbol)?;
        let adapter = QuoteSourceAdapter::from_settings(settings)?;
        let reconciler = Reconciler::new(
            store,
            settings.write_strategy,
            settings.backfill_throttle,
        );
        Ok(Self::new(symbol, adapter, reconciler))
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn store(&self) -> &Arc<dyn PriceStore> {
        self.reconciler.store()
    }

    /// Stores the `as_of_date` session. Live snapshots are tried first; when none of them is
    /// quoted for that session (a past date, or before the day's close) the session's bar is
    /// read from the range providers instead. Failures are also recorded in `error_logs`,
    /// best-effort.
    pub async fn run_daily_update(&self, as_of_date: NaiveDate) -> Result<DailyUpdate, PipelineError> {
        let result = self.daily_update(as_of_date).await;
        if let Err(err) = &result {
            self.log_failure(as_of_date, err).await;
        }
        result
    }

    async fn daily_update(&self, as_of_date: NaiveDate) -> Result<DailyUpdate, PipelineError> {
        let record = match self.adapter.resolve_snapshot(&self.symbol, as_of_date).await {
            Ok(record) => record,
            Err(PipelineError::SourceUnavailable {
                symbol,
                mut attempts,
            }) => match self.session_bar(as_of_date).await {
                Ok(record) => record,
                Err(PipelineError::SourceUnavailable { attempts: more, .. }) => {
                    attempts.extend(more);
                    return Err(PipelineError::SourceUnavailable { symbol, attempts });
                }
                Err(err) => return Err(err),
            },
            Err(err) => return Err(err),
        };
        let done = self
            .reconciler
            .reconcile(&record)
            .await
            .map_err(PipelineError::Persistence)?;

        tracing::info!(
            symbol = %self.symbol,
            date = %record.date,
            close = record.close,
            action = %done.action,
            "daily price stored"
        );

        Ok(DailyUpdate {
            action: done.action,
            record,
            row: done.row,
        })
    }

    async fn session_bar(&self, date: NaiveDate) -> Result<DailyPriceRecord, PipelineError> {
        let range = DateRange {
            start: date,
            end: date,
        };
        let series = self.adapter.resolve_series(&self.symbol, range).await?;

        let provider = series.provider;
        match series.records.into_iter().find(|r| r.date == date) {
            Some(record) => {
                tracing::info!(%provider, %date, close = record.close, "session bar resolved from series");
                Ok(record)
            }
            None => {
                let mut attempts = series.attempts;
                attempts.push(ProviderFailure {
                    provider,
                    message: format!("no daily bar for {date}"),
                });
                Err(PipelineError::SourceUnavailable {
                    symbol: self.symbol.bare().to_string(),
                    attempts,
                })
            }
        }
    }

    async fn log_failure(&self, as_of_date: NaiveDate, err: &PipelineError) {
        let mut details = json!({
            "symbol": self.symbol.bare(),
            "as_of_date": as_of_date,
        });
        if let PipelineError::SourceUnavailable { attempts, .. } = err {
            details["attempts"] = json!(attempts);
        }

        let entry = ErrorLogEntry::new(STOCK_PRICE_UPDATE, err.to_string(), Some(details));
        if let Err(log_err) = self.store().record_error(&entry).await {
            tracing::warn!(error = %format!("{log_err:#}"), "failed to record error log");
        }
    }

    /// Fetches the range in one request and writes every record, continuing past per-record
    /// failures.
    pub async fn run_backfill(&self, range: DateRange) -> Result<BackfillReport, PipelineError> {
        let series = self.adapter.resolve_series(&self.symbol, range).await?;
        if series.records.is_empty() {
            tracing::warn!(
                symbol = %self.symbol,
                start = %range.start,
                end = %range.end,
                "provider returned no records for range"
            );
        }

        let (summary, outcomes) = self.reconciler.reconcile_all(&series.records).await;
        tracing::info!(
            symbol = %self.symbol,
            provider = %series.provider,
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            "backfill finished"
        );

        Ok(BackfillReport {
            symbol: self.symbol.bare().to_string(),
            range,
            provider: series.provider,
            summary,
            outcomes,
        })
    }

    pub async fn latest(&self) -> Result<Option<StoredPrice>, PipelineError> {
        self.store()
            .latest(self.symbol.bare())
            .await
            .map_err(PipelineError::Persistence)
    }
}
