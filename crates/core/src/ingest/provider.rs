use crate::domain::price::{DateRange, ProviderId, Symbol};
use crate::ingest::types::RawPayload;
use anyhow::{Context, Result};
use reqwest::header::HeaderMap;
use serde_json::Value;
use std::time::Duration;

pub(crate) const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A quote source. Each call is a single request; fallback between providers is the
/// adapter's job, not the provider's.
#[async_trait::async_trait]
pub trait QuoteProvider: Send + Sync {
    fn provider_id(&self) -> ProviderId;

    /// Today's quote for `symbol`.
    async fn fetch_snapshot(&self, _symbol: &Symbol) -> Result<RawPayload> {
        anyhow::bail!("{} does not serve snapshot quotes", self.provider_id())
    }

    /// Daily bars for `symbol` within `range`.
    async fn fetch_series(&self, _symbol: &Symbol, _range: DateRange) -> Result<RawPayload> {
        anyhow::bail!("{} does not serve time series", self.provider_id())
    }
}

/// Thin JSON-over-HTTP client shared by the providers.
#[derive(Debug, Clone)]
pub struct JsonHttp {
    http: reqwest::Client,
}

impl JsonHttp {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()
            .context("failed to build quote provider http client")?;
        Ok(Self { http })
    }

    /// GET that only cares about side effects (cookies).
    pub async fn warm_up(&self, url: &str, headers: HeaderMap) -> Result<()> {
        let res = self
            .http
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("warm-up request to {url} failed"))?;
        tracing::debug!(url, status = %res.status(), "provider session warmed up");
        Ok(())
    }

    /// Transport errors are stripped of the request URL, which can carry an API key.
    pub async fn get_json(
        &self,
        provider: ProviderId,
        url: &str,
        query: &[(&str, String)],
        headers: HeaderMap,
    ) -> Result<RawPayload> {
        let res = self
            .http
            .get(url)
            .headers(headers)
            .query(query)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("{provider} request failed"))?;

        let status = res.status();
        let text = res
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("failed to read {provider} response"))?;

        if !status.is_success() {
            anyhow::bail!("{provider} HTTP {status}: {}", truncate(&text, 300));
        }

        let body = serde_json::from_str::<Value>(&text).with_context(|| {
            format!("{provider} response is not valid JSON: {}", truncate(&text, 300))
        })?;

        Ok(RawPayload { provider, body })
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SnapshotOnly;

    #[async_trait::async_trait]
    impl QuoteProvider for SnapshotOnly {
        fn provider_id(&self) -> ProviderId {
            ProviderId::TwelveData
        }
    }

    #[tokio::test]
    async fn default_methods_report_unsupported() {
        let symbol = Symbol::new("TIPSMUSIC").unwrap();
        let err = SnapshotOnly.fetch_snapshot(&symbol).await.unwrap_err();
        assert_eq!(err.to_string(), "twelve_data does not serve snapshot quotes");

        let d = chrono::NaiveDate::from_ymd_opt(2026, 1, 9).unwrap();
        let range = DateRange::try_new(d, d).unwrap();
        let err = SnapshotOnly.fetch_series(&symbol, range).await.unwrap_err();
        assert_eq!(err.to_string(), "twelve_data does not serve time series");
    }

    #[tokio::test]
    async fn transport_errors_do_not_echo_the_api_key() {
        let http = JsonHttp::new(Duration::from_secs(2)).unwrap();
        let err = http
            .get_json(
                ProviderId::AlphaVantage,
                "http://127.0.0.1:1/query",
                &[("apikey", "SUPERSECRETKEY".to_string())],
                HeaderMap::new(),
            )
            .await
            .unwrap_err();

        let message = format!("{err:#}");
        assert!(message.starts_with("alpha_vantage request failed"), "{message}");
        assert!(!message.contains("SUPERSECRETKEY"), "{message}");
        assert!(!format!("{err:?}").contains("SUPERSECRETKEY"));
    }

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate("₹612.35", 1), "₹");
        assert_eq!(truncate("short", 300), "short");
    }
}
