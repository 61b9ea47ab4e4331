use crate::config::Settings;
use crate::domain::price::{DailyPriceRecord, DateRange, ProviderId, Symbol};
use crate::error::{PipelineError, ProviderFailure};
use crate::ingest::alpha_vantage::AlphaVantageProvider;
use crate::ingest::normalize::{normalize_series, normalize_snapshot};
use crate::ingest::nse::NseProvider;
use crate::ingest::provider::{JsonHttp, QuoteProvider};
use crate::ingest::twelve_data::TwelveDataProvider;
use crate::ingest::yahoo::YahooProvider;
use chrono::NaiveDate;
use std::sync::Arc;

/// Ordered provider strategies for snapshots and for time series.
///
/// Snapshots fall through on any failure: transport, non-2xx, malformed body, or a payload
/// the normalizer rejects. Series fall through only when a provider fails outright; an
/// empty or partial series is returned as-is.
pub struct QuoteSourceAdapter {
    snapshot_providers: Vec<Arc<dyn QuoteProvider>>,
    range_providers: Vec<Arc<dyn QuoteProvider>>,
}

/// A normalized time series and the provider that produced it.
#[derive(Debug, Clone)]
pub struct ResolvedSeries {
    pub provider: ProviderId,
    pub records: Vec<DailyPriceRecord>,
    pub attempts: Vec<ProviderFailure>,
}

impl QuoteSourceAdapter {
    pub fn new(
        snapshot_providers: Vec<Arc<dyn QuoteProvider>>,
        range_providers: Vec<Arc<dyn QuoteProvider>>,
    ) -> Self {
        Self {
            snapshot_providers,
            range_providers,
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let http = JsonHttp::new(settings.http_timeout)?;
        let snapshot_providers = build_providers(settings, &http, &settings.providers);
        let range_providers = build_providers(settings, &http, &settings.range_providers);

        tracing::info!(
            snapshot = ?ids(&snapshot_providers),
            range = ?ids(&range_providers),
            "quote providers configured"
        );

        Ok(Self::new(snapshot_providers, range_providers))
    }

    pub fn snapshot_provider_ids(&self) -> Vec<ProviderId> {
        ids(&self.snapshot_providers)
    }

    pub fn range_provider_ids(&self) -> Vec<ProviderId> {
        ids(&self.range_providers)
    }

    /// Today's record from the first provider that yields a valid one.
    pub async fn resolve_snapshot(
        &self,
        symbol: &Symbol,
        as_of_date: NaiveDate,
    ) -> Result<DailyPriceRecord, PipelineError> {
        let mut attempts = Vec::new();

        for provider in &self.snapshot_providers {
            let id = provider.provider_id();
            let outcome = match provider.fetch_snapshot(symbol).await {
                Ok(payload) => {
                    normalize_snapshot(&payload, symbol, as_of_date).map_err(anyhow::Error::new)
                }
                Err(err) => Err(err),
            };

            match outcome {
                Ok(record) => {
                    tracing::info!(
                        provider = %id,
                        %symbol,
                        %as_of_date,
                        close = record.close,
                        failed_attempts = attempts.len(),
                        "quote snapshot resolved"
                    );
                    return Ok(record);
                }
                Err(err) => {
                    tracing::warn!(provider = %id, %symbol, error = %format!("{err:#}"), "quote provider failed; trying next");
                    attempts.push(ProviderFailure {
                        provider: id,
                        message: format!("{err:#}"),
                    });
                }
            }
        }

        Err(PipelineError::SourceUnavailable {
            symbol: symbol.bare().to_string(),
            attempts,
        })
    }

    /// Daily records for `range` from the first range provider that answers.
    pub async fn resolve_series(
        &self,
        symbol: &Symbol,
        range: DateRange,
    ) -> Result<ResolvedSeries, PipelineError> {
        let mut attempts = Vec::new();

        for provider in &self.range_providers {
            let id = provider.provider_id();
            let outcome = match provider.fetch_series(symbol, range).await {
                Ok(payload) => normalize_series(&payload, symbol).map_err(anyhow::Error::new),
                Err(err) => Err(err),
            };

            match outcome {
                Ok(records) => {
                    tracing::info!(
                        provider = %id,
                        %symbol,
                        start = %range.start,
                        end = %range.end,
                        records = records.len(),
                        "quote series resolved"
                    );
                    return Ok(ResolvedSeries {
                        provider: id,
                        records,
                        attempts,
                    });
                }
                Err(err) => {
                    tracing::warn!(provider = %id, %symbol, error = %format!("{err:#}"), "series provider failed");
                    attempts.push(ProviderFailure {
                        provider: id,
                        message: format!("{err:#}"),
                    });
                }
            }
        }

        Err(PipelineError::SourceUnavailable {
            symbol: symbol.bare().to_string(),
            attempts,
        })
    }
}

fn ids(providers: &[Arc<dyn QuoteProvider>]) -> Vec<ProviderId> {
    providers.iter().map(|p| p.provider_id()).collect()
}

fn build_providers(
    settings: &Settings,
    http: &JsonHttp,
    order: &[ProviderId],
) -> Vec<Arc<dyn QuoteProvider>> {
    let mut out: Vec<Arc<dyn QuoteProvider>> = Vec::with_capacity(order.len());
    for id in order {
        match id {
            ProviderId::YahooFinance => out.push(Arc::new(YahooProvider::new(http.clone()))),
            ProviderId::NseIndia => out.push(Arc::new(NseProvider::new(http.clone()))),
            ProviderId::AlphaVantage => match &settings.alpha_vantage_api_key {
                Some(key) => out.push(Arc::new(AlphaVantageProvider::new(
                    http.clone(),
                    key.clone(),
                ))),
                None => tracing::debug!("ALPHA_VANTAGE_API_KEY not set; skipping alpha_vantage"),
            },
            ProviderId::TwelveData => match &settings.twelve_data_api_key {
                Some(key) => out.push(Arc::new(TwelveDataProvider::new(
                    http.clone(),
                    key.clone(),
                ))),
                None => tracing::debug!("TWELVE_DATA_API_KEY not set; skipping twelve_data"),
            },
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::RawPayload;
    use anyhow::Result;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider that replays a fixed response and counts calls.
    struct Scripted {
        id: ProviderId,
        response: Option<Value>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn ok(id: ProviderId, body: Value) -> Arc<Self> {
            Arc::new(Self {
                id,
                response: Some(body),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(id: ProviderId) -> Arc<Self> {
            Arc::new(Self {
                id,
                response: None,
                calls: AtomicUsize::new(0),
            })
        }

        fn reply(&self) -> Result<RawPayload> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Some(body) => Ok(RawPayload {
                    provider: self.id,
                    body: body.clone(),
                }),
                None => anyhow::bail!("{} HTTP 503 Service Unavailable", self.id),
            }
        }
    }

    #[async_trait::async_trait]
    impl QuoteProvider for Scripted {
        fn provider_id(&self) -> ProviderId {
            self.id
        }

        async fn fetch_snapshot(&self, _symbol: &Symbol) -> Result<RawPayload> {
            self.reply()
        }

        async fn fetch_series(&self, _symbol: &Symbol, _range: DateRange) -> Result<RawPayload> {
            self.reply()
        }
    }

    fn dyns(providers: Vec<Arc<Scripted>>) -> Vec<Arc<dyn QuoteProvider>> {
        providers
            .into_iter()
            .map(|p| p as Arc<dyn QuoteProvider>)
            .collect()
    }

    fn symbol() -> Symbol {
        Symbol::new("TIPSMUSIC").unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 12).unwrap()
    }

    fn range() -> DateRange {
        DateRange::try_new(NaiveDate::from_ymd_opt(2026, 1, 9).unwrap(), today()).unwrap()
    }

    fn yahoo_meta(price: f64) -> Value {
        json!({"chart": {"result": [{"meta": {"regularMarketPrice": price}}]}})
    }

    #[tokio::test]
    async fn first_successful_provider_wins() {
        let yahoo = Scripted::ok(ProviderId::YahooFinance, yahoo_meta(612.0));
        let twelve = Scripted::ok(ProviderId::TwelveData, json!({"close": "600.0"}));
        let adapter = QuoteSourceAdapter::new(dyns(vec![yahoo.clone(), twelve.clone()]), dyns(vec![]));

        let rec = adapter.resolve_snapshot(&symbol(), today()).await.unwrap();
        assert_eq!(rec.close, 612.0);
        assert_eq!(rec.source.as_deref(), Some("yahoo_finance"));
        assert_eq!(twelve.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_through_on_http_failure_and_unusable_payload() {
        let yahoo = Scripted::failing(ProviderId::YahooFinance);
        let alpha = Scripted::ok(ProviderId::AlphaVantage, json!({"Global Quote": {}}));
        let twelve = Scripted::ok(ProviderId::TwelveData, json!({"close": "600.25"}));
        let adapter =
            QuoteSourceAdapter::new(dyns(vec![yahoo.clone(), alpha.clone(), twelve.clone()]), dyns(vec![]));

        let rec = adapter.resolve_snapshot(&symbol(), today()).await.unwrap();
        assert_eq!(rec.close, 600.25);
        assert_eq!(rec.source.as_deref(), Some("twelve_data"));
        assert_eq!(yahoo.calls.load(Ordering::SeqCst), 1);
        assert_eq!(alpha.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_failures_surface_source_unavailable() {
        let yahoo = Scripted::ok(ProviderId::YahooFinance, yahoo_meta(0.0));
        let twelve = Scripted::failing(ProviderId::TwelveData);
        let adapter = QuoteSourceAdapter::new(dyns(vec![yahoo, twelve]), dyns(vec![]));

        let err = adapter.resolve_snapshot(&symbol(), today()).await.unwrap_err();
        match err {
            PipelineError::SourceUnavailable { symbol, attempts } => {
                assert_eq!(symbol, "TIPSMUSIC");
                assert_eq!(attempts.len(), 2);
                assert_eq!(attempts[0].provider, ProviderId::YahooFinance);
                assert!(attempts[0].message.contains("non-positive close"));
                assert_eq!(attempts[1].provider, ProviderId::TwelveData);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_configured_providers_is_source_unavailable() {
        let adapter = QuoteSourceAdapter::new(dyns(vec![]), dyns(vec![]));
        assert!(matches!(
            adapter.resolve_snapshot(&symbol(), today()).await,
            Err(PipelineError::SourceUnavailable { .. })
        ));
        assert!(matches!(
            adapter.resolve_series(&symbol(), range()).await,
            Err(PipelineError::SourceUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn empty_series_is_not_retried_elsewhere() {
        let yahoo = Scripted::ok(
            ProviderId::YahooFinance,
            json!({"chart": {"result": [{"meta": {}}]}}),
        );
        let nse = Scripted::ok(
            ProviderId::NseIndia,
            json!({"data": [{"CH_TIMESTAMP": "12-Jan-2026", "CH_CLOSING_PRICE": 612.4}]}),
        );
        let adapter = QuoteSourceAdapter::new(dyns(vec![]), dyns(vec![yahoo, nse.clone()]));

        let series = adapter.resolve_series(&symbol(), range()).await.unwrap();
        assert_eq!(series.provider, ProviderId::YahooFinance);
        assert!(series.records.is_empty());
        assert_eq!(nse.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn outright_series_failure_uses_configured_fallback() {
        let yahoo = Scripted::failing(ProviderId::YahooFinance);
        let nse = Scripted::ok(
            ProviderId::NseIndia,
            json!({"data": [{"CH_TIMESTAMP": "12-Jan-2026", "CH_CLOSING_PRICE": 612.4}]}),
        );
        let adapter = QuoteSourceAdapter::new(dyns(vec![]), dyns(vec![yahoo, nse]));

        let series = adapter.resolve_series(&symbol(), range()).await.unwrap();
        assert_eq!(series.provider, ProviderId::NseIndia);
        assert_eq!(series.records.len(), 1);
        assert_eq!(series.attempts.len(), 1);
    }

    #[tokio::test]
    async fn single_range_provider_failure_is_not_swallowed() {
        let yahoo = Scripted::failing(ProviderId::YahooFinance);
        let adapter = QuoteSourceAdapter::new(dyns(vec![]), dyns(vec![yahoo]));
        assert!(matches!(
            adapter.resolve_series(&symbol(), range()).await,
            Err(PipelineError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn keyed_providers_are_skipped_without_keys() {
        let mut settings = Settings::from_vars(|_| None).unwrap();
        settings.providers = vec![
            ProviderId::YahooFinance,
            ProviderId::AlphaVantage,
            ProviderId::TwelveData,
        ];
        settings.twelve_data_api_key = Some("td-key".to_string());

        let adapter = QuoteSourceAdapter::from_settings(&settings).unwrap();
        assert_eq!(
            adapter.snapshot_provider_ids(),
            vec![ProviderId::YahooFinance, ProviderId::TwelveData]
        );
        assert_eq!(adapter.range_provider_ids(), vec![ProviderId::YahooFinance]);
    }
}
