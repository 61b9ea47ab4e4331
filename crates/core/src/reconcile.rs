use crate::domain::price::{DailyPriceRecord, StoredPrice};
use crate::storage::PriceStore;
use anyhow::ensure;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// How a record reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStrategy {
    /// One `insert … on conflict (symbol, date) do update` per record. The store's unique
    /// key makes this safe under concurrent writers.
    Upsert,
    /// Look the key up, then insert or update. Not atomic: two writers racing between the
    /// lookup and the write can collide on the unique key. Only safe while a single
    /// scheduled writer runs at a time.
    CheckThenWrite,
}

impl FromStr for WriteStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "upsert" => Ok(Self::Upsert),
            "check_then_write" | "check_then_insert" => Ok(Self::CheckThenWrite),
            other => anyhow::bail!("unknown QUOTE_WRITE_STRATEGY: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteAction {
    Inserted,
    Updated,
    Upserted,
}

impl fmt::Display for WriteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inserted => "inserted",
            Self::Updated => "updated",
            Self::Upserted => "upserted",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Reconciled {
    pub action: WriteAction,
    pub row: StoredPrice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

/// Per-record result of a backfill.
#[derive(Debug, Clone, Serialize)]
pub struct RecordOutcome {
    pub date: NaiveDate,
    pub close: f64,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<WriteAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

pub struct Reconciler {
    store: Arc<dyn PriceStore>,
    strategy: WriteStrategy,
    throttle: Duration,
}

impl Reconciler {
    pub fn new(store: Arc<dyn PriceStore>, strategy: WriteStrategy, throttle: Duration) -> Self {
        if strategy == WriteStrategy::CheckThenWrite {
            tracing::warn!(
                "check-then-write reconciliation assumes a single concurrent writer; \
                 overlapping runs can race between lookup and write"
            );
        }
        Self {
            store,
            strategy,
            throttle,
        }
    }

    pub fn store(&self) -> &Arc<dyn PriceStore> {
        &self.store
    }

    /// Persists one record under its `(symbol, date)` key.
    pub async fn reconcile(&self, record: &DailyPriceRecord) -> anyhow::Result<Reconciled> {
        ensure!(
            record.close.is_finite() && record.close > 0.0,
            "refusing to store non-positive close {} for {}",
            record.close,
            record.date
        );

        let written_at = Utc::now();
        match self.strategy {
            WriteStrategy::Upsert => {
                let row = self.store.upsert(record, written_at).await?;
                Ok(Reconciled {
                    action: WriteAction::Upserted,
                    row,
                })
            }
            WriteStrategy::CheckThenWrite => {
                let existing = self.store.find(&record.symbol, record.date).await?;
                if existing.is_some() {
                    let row = self.store.update(record, written_at).await?;
                    Ok(Reconciled {
                        action: WriteAction::Updated,
                        row,
                    })
                } else {
                    let row = self.store.insert(record, written_at).await?;
                    Ok(Reconciled {
                        action: WriteAction::Inserted,
                        row,
                    })
                }
            }
        }
    }

    /// Persists records one at a time, in order. A failed record is logged in its outcome
    /// and the run moves on to the next one.
    pub async fn reconcile_all(
        &self,
        records: &[DailyPriceRecord],
    ) -> (BackfillSummary, Vec<RecordOutcome>) {
        let mut summary = BackfillSummary {
            total: records.len(),
            ..Default::default()
        };
        let mut outcomes = Vec::with_capacity(records.len());

        for (idx, record) in records.iter().enumerate() {
            if idx != 0 && !self.throttle.is_zero() {
                tokio::time::sleep(self.throttle).await;
            }

            match self.reconcile(record).await {
                Ok(done) => {
                    summary.successful += 1;
                    outcomes.push(RecordOutcome {
                        date: record.date,
                        close: record.close,
                        status: OutcomeStatus::Success,
                        action: Some(done.action),
                        error: None,
                    });
                }
                Err(err) => {
                    summary.failed += 1;
                    tracing::warn!(
                        idx,
                        date = %record.date,
                        failure_count = summary.failed,
                        error = %format!("{err:#}"),
                        "price write failed; continuing"
                    );
                    outcomes.push(RecordOutcome {
                        date: record.date,
                        close: record.close,
                        status: OutcomeStatus::Failure,
                        action: None,
                        error: Some(format!("{err:#}")),
                    });
                }
            }
        }

        (summary, outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryPriceStore;

    fn record(day: u32, close: f64) -> DailyPriceRecord {
        DailyPriceRecord {
            symbol: "TIPSMUSIC".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000,
            source: Some("yahoo_finance".to_string()),
        }
    }

    fn reconciler(store: &Arc<MemoryPriceStore>, strategy: WriteStrategy) -> Reconciler {
        Reconciler::new(store.clone(), strategy, Duration::ZERO)
    }

    #[tokio::test]
    async fn upsert_twice_leaves_one_row_with_latest_values() {
        let store = Arc::new(MemoryPriceStore::default());
        let r = reconciler(&store, WriteStrategy::Upsert);

        let first = r.reconcile(&record(12, 610.0)).await.unwrap();
        let mut second_rec = record(12, 615.5);
        second_rec.volume = 2500;
        let second = r.reconcile(&second_rec).await.unwrap();

        assert_eq!(first.action, WriteAction::Upserted);
        assert_eq!(second.action, WriteAction::Upserted);

        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.close, 615.5);
        assert_eq!(rows[0].record.volume, 2500);
        assert_eq!(rows[0].created_at, first.row.created_at);
        assert!(rows[0].updated_at >= first.row.updated_at);
    }

    #[tokio::test]
    async fn check_then_write_inserts_then_updates() {
        let store = Arc::new(MemoryPriceStore::default());
        let r = reconciler(&store, WriteStrategy::CheckThenWrite);

        let first = r.reconcile(&record(12, 610.0)).await.unwrap();
        let second = r.reconcile(&record(12, 612.0)).await.unwrap();

        assert_eq!(first.action, WriteAction::Inserted);
        assert_eq!(second.action, WriteAction::Updated);
        let rows = store.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.close, 612.0);
    }

    #[tokio::test]
    async fn rejects_non_positive_close_before_touching_store() {
        let store = Arc::new(MemoryPriceStore::default());
        let r = reconciler(&store, WriteStrategy::Upsert);

        assert!(r.reconcile(&record(12, 0.0)).await.is_err());
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn backfill_continues_past_a_failed_record() {
        let store = Arc::new(MemoryPriceStore::default());
        store.fail_writes_on(NaiveDate::from_ymd_opt(2026, 1, 7).unwrap());
        let r = reconciler(&store, WriteStrategy::Upsert);

        let records: Vec<_> = (5..=9).map(|d| record(d, 600.0 + d as f64)).collect();
        let (summary, outcomes) = r.reconcile_all(&records).await;

        assert_eq!(
            summary,
            BackfillSummary {
                total: 5,
                successful: 4,
                failed: 1
            }
        );
        assert_eq!(outcomes.len(), 5);
        assert_eq!(outcomes[2].status, OutcomeStatus::Failure);
        assert!(outcomes[2].error.as_deref().unwrap().contains("2026-01-07"));
        assert!(outcomes[3..]
            .iter()
            .all(|o| o.status == OutcomeStatus::Success));
        assert_eq!(store.rows().len(), 4);
    }

    #[tokio::test]
    async fn empty_backfill_is_a_clean_zero_summary() {
        let store = Arc::new(MemoryPriceStore::default());
        let r = reconciler(&store, WriteStrategy::Upsert);
        let (summary, outcomes) = r.reconcile_all(&[]).await;
        assert_eq!(summary, BackfillSummary::default());
        assert!(outcomes.is_empty());
    }

    #[test]
    fn parses_strategy_names() {
        assert_eq!("upsert".parse::<WriteStrategy>().unwrap(), WriteStrategy::Upsert);
        assert_eq!(
            "check-then-write".parse::<WriteStrategy>().unwrap(),
            WriteStrategy::CheckThenWrite
        );
        assert!("merge".parse::<WriteStrategy>().is_err());
    }
}
