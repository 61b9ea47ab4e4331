use crate::domain::price::{DateRange, ProviderId, Symbol};
use crate::ingest::provider::{JsonHttp, QuoteProvider, BROWSER_USER_AGENT};
use crate::ingest::types::RawPayload;
use anyhow::Result;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Yahoo Finance chart API. Serves both snapshots (`range=1d`) and daily series.
#[derive(Debug, Clone)]
pub struct YahooProvider {
    http: JsonHttp,
    base_url: String,
}

impl YahooProvider {
    pub fn new(http: JsonHttp) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn chart_url(&self, symbol: &Symbol) -> String {
        format!(
            "{}/v8/finance/chart/{}",
            self.base_url.trim_end_matches('/'),
            symbol.yahoo()
        )
    }

    fn headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers
    }
}

#[async_trait::async_trait]
impl QuoteProvider for YahooProvider {
    fn provider_id(&self) -> ProviderId {
        ProviderId::YahooFinance
    }

    async fn fetch_snapshot(&self, symbol: &Symbol) -> Result<RawPayload> {
        let query = [("interval", "1d".to_string()), ("range", "1d".to_string())];
        self.http
            .get_json(self.provider_id(), &self.chart_url(symbol), &query, Self::headers())
            .await
    }

    async fn fetch_series(&self, symbol: &Symbol, range: DateRange) -> Result<RawPayload> {
        let query = [
            ("period1", range.period1().to_string()),
            ("period2", range.period2().to_string()),
            ("interval", "1d".to_string()),
        ];
        tracing::debug!(%symbol, start = %range.start, end = %range.end, "requesting yahoo chart series");
        self.http
            .get_json(self.provider_id(), &self.chart_url(symbol), &query, Self::headers())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn chart_url_uses_nse_suffix() {
        let p = YahooProvider::new(JsonHttp::new(Duration::from_secs(5)).unwrap())
            .with_base_url("http://localhost:9000/");
        let s = Symbol::new("TIPSMUSIC").unwrap();
        assert_eq!(
            p.chart_url(&s),
            "http://localhost:9000/v8/finance/chart/TIPSMUSIC.NS"
        );
    }
}
