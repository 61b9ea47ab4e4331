pub mod domain;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod reconcile;
pub mod storage;
pub mod time;

pub mod config {
    use crate::domain::price::ProviderId;
    use crate::reconcile::WriteStrategy;
    use crate::storage::StoreBackend;
    use anyhow::Context;
    use chrono::NaiveDate;
    use std::time::Duration;

    const DEFAULT_SYMBOL: &str = "TIPSMUSIC";
    const DEFAULT_BACKFILL_START: &str = "2026-01-09";
    const DEFAULT_BACKFILL_THROTTLE_MS: u64 = 300;
    const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;

    /// Process configuration, read once by each binary and handed to the pipeline.
    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub supabase_url: Option<String>,
        pub supabase_service_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub cron_secret: Option<String>,
        pub alpha_vantage_api_key: Option<String>,
        pub twelve_data_api_key: Option<String>,
        pub symbol: String,
        /// Snapshot providers in fallback order.
        pub providers: Vec<ProviderId>,
        /// Time-series providers in fallback order. A single entry means no fallback.
        pub range_providers: Vec<ProviderId>,
        pub write_strategy: WriteStrategy,
        pub store_backend: StoreBackend,
        pub backfill_throttle: Duration,
        pub backfill_default_start: NaiveDate,
        pub http_timeout: Duration,
        pub market_holidays: Vec<NaiveDate>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Self::from_vars(|key| std::env::var(key).ok())
        }

        pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
            let non_empty = |key: &str| var(key).filter(|s| !s.trim().is_empty());

            let database_url = non_empty("DATABASE_URL");

            let store_backend = match non_empty("STORE_BACKEND") {
                Some(s) => s.parse::<StoreBackend>()?,
                None if database_url.is_some() => StoreBackend::Postgres,
                None => StoreBackend::Postgrest,
            };

            let write_strategy = match non_empty("QUOTE_WRITE_STRATEGY") {
                Some(s) => s.parse::<WriteStrategy>()?,
                None => WriteStrategy::Upsert,
            };

            let backfill_default_start = non_empty("BACKFILL_DEFAULT_START")
                .unwrap_or_else(|| DEFAULT_BACKFILL_START.to_string());
            let backfill_default_start =
                NaiveDate::parse_from_str(backfill_default_start.trim(), "%Y-%m-%d")
                    .context("BACKFILL_DEFAULT_START must be YYYY-MM-DD")?;

            let backfill_throttle_ms = non_empty("BACKFILL_THROTTLE_MS")
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_BACKFILL_THROTTLE_MS);

            let http_timeout_secs = non_empty("QUOTE_HTTP_TIMEOUT_SECS")
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS);

            Ok(Self {
                database_url,
                supabase_url: non_empty("SUPABASE_URL"),
                supabase_service_key: non_empty("SUPABASE_SERVICE_KEY"),
                sentry_dsn: non_empty("SENTRY_DSN"),
                cron_secret: non_empty("CRON_SECRET"),
                alpha_vantage_api_key: non_empty("ALPHA_VANTAGE_API_KEY"),
                twelve_data_api_key: non_empty("TWELVE_DATA_API_KEY"),
                symbol: non_empty("QUOTE_SYMBOL")
                    .map(|s| s.trim().to_ascii_uppercase())
                    .unwrap_or_else(|| DEFAULT_SYMBOL.to_string()),
                providers: parse_providers(
                    non_empty("QUOTE_PROVIDERS"),
                    &[
                        ProviderId::YahooFinance,
                        ProviderId::AlphaVantage,
                        ProviderId::TwelveData,
                    ],
                ),
                range_providers: parse_providers(
                    non_empty("QUOTE_RANGE_PROVIDERS"),
                    &[ProviderId::YahooFinance],
                ),
                write_strategy,
                store_backend,
                backfill_throttle: Duration::from_millis(backfill_throttle_ms),
                backfill_default_start,
                http_timeout: Duration::from_secs(http_timeout_secs),
                market_holidays: parse_holidays(non_empty("MARKET_HOLIDAYS")),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }

        pub fn require_supabase_url(&self) -> anyhow::Result<&str> {
            self.supabase_url
                .as_deref()
                .context("SUPABASE_URL is required")
        }

        pub fn require_supabase_service_key(&self) -> anyhow::Result<&str> {
            self.supabase_service_key
                .as_deref()
                .context("SUPABASE_SERVICE_KEY is required")
        }

        pub fn require_cron_secret(&self) -> anyhow::Result<&str> {
            self.cron_secret.as_deref().context("CRON_SECRET is required")
        }
    }

    fn parse_providers(v: Option<String>, default: &[ProviderId]) -> Vec<ProviderId> {
        let Some(v) = v else {
            return default.to_vec();
        };
        let mut out = Vec::new();
        for part in v.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.parse::<ProviderId>() {
                Ok(id) if !out.contains(&id) => out.push(id),
                Ok(_) => {}
                Err(err) => tracing::warn!(provider = part, error = %err, "ignoring unknown quote provider"),
            }
        }
        if out.is_empty() {
            out.extend_from_slice(default);
        }
        out
    }

    fn parse_holidays(v: Option<String>) -> Vec<NaiveDate> {
        let Some(v) = v else {
            return Vec::new();
        };
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .collect()
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::collections::HashMap;

        fn settings(pairs: &[(&str, &str)]) -> anyhow::Result<Settings> {
            let vars: HashMap<String, String> = pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            Settings::from_vars(|k| vars.get(k).cloned())
        }

        #[test]
        fn defaults_without_environment() {
            let s = settings(&[]).unwrap();
            assert_eq!(s.symbol, "TIPSMUSIC");
            assert_eq!(
                s.providers,
                vec![
                    ProviderId::YahooFinance,
                    ProviderId::AlphaVantage,
                    ProviderId::TwelveData
                ]
            );
            assert_eq!(s.range_providers, vec![ProviderId::YahooFinance]);
            assert_eq!(s.write_strategy, WriteStrategy::Upsert);
            assert_eq!(s.store_backend, StoreBackend::Postgrest);
            assert_eq!(s.backfill_throttle, Duration::from_millis(300));
            assert_eq!(
                s.backfill_default_start,
                NaiveDate::from_ymd_opt(2026, 1, 9).unwrap()
            );
        }

        #[test]
        fn database_url_selects_postgres_backend() {
            let s = settings(&[("DATABASE_URL", "postgres://localhost/prices")]).unwrap();
            assert_eq!(s.store_backend, StoreBackend::Postgres);
        }

        #[test]
        fn provider_lists_keep_order_and_skip_unknowns() {
            let s = settings(&[
                ("QUOTE_PROVIDERS", "twelve_data, bogus ,yahoo,twelve_data"),
                ("QUOTE_RANGE_PROVIDERS", "nse,yahoo_finance"),
            ])
            .unwrap();
            assert_eq!(
                s.providers,
                vec![ProviderId::TwelveData, ProviderId::YahooFinance]
            );
            assert_eq!(
                s.range_providers,
                vec![ProviderId::NseIndia, ProviderId::YahooFinance]
            );
        }

        #[test]
        fn rejects_unknown_write_strategy() {
            assert!(settings(&[("QUOTE_WRITE_STRATEGY", "yolo")]).is_err());
            let s = settings(&[("QUOTE_WRITE_STRATEGY", "check_then_write")]).unwrap();
            assert_eq!(s.write_strategy, WriteStrategy::CheckThenWrite);
        }

        #[test]
        fn parses_holiday_list() {
            let s = settings(&[("MARKET_HOLIDAYS", "2026-03-04, nope,2026-11-09")]).unwrap();
            assert_eq!(
                s.market_holidays,
                vec![
                    NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
                    NaiveDate::from_ymd_opt(2026, 11, 9).unwrap()
                ]
            );
        }
    }
}
