use crate::domain::price::{DateRange, ProviderId, Symbol};
use crate::ingest::provider::{JsonHttp, QuoteProvider, BROWSER_USER_AGENT};
use crate::ingest::types::RawPayload;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};

const DEFAULT_BASE_URL: &str = "https://www.nseindia.com";

/// NSE India historical equity data. Series only.
///
/// The API rejects requests without the session cookies set by the home page, so every
/// series fetch visits it first through the shared cookie store.
#[derive(Debug, Clone)]
pub struct NseProvider {
    http: JsonHttp,
    base_url: String,
}

impl NseProvider {
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

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
        headers.insert(
            REFERER,
            HeaderValue::from_str(&format!("{}/", self.base_url.trim_end_matches('/')))
                .context("invalid NSE referer")?,
        );
        Ok(headers)
    }
}

#[async_trait::async_trait]
impl QuoteProvider for NseProvider {
    fn provider_id(&self) -> ProviderId {
        ProviderId::NseIndia
    }

    async fn fetch_series(&self, symbol: &Symbol, range: DateRange) -> Result<RawPayload> {
        let base = self.base_url.trim_end_matches('/');
        let headers = self.headers()?;

        self.http.warm_up(&format!("{base}/"), headers.clone()).await?;

        let query = series_query(symbol, range);
        self.http
            .get_json(
                self.provider_id(),
                &format!("{base}/api/historical/cm/equity"),
                &query,
                headers,
            )
            .await
    }
}

fn series_query(symbol: &Symbol, range: DateRange) -> [(&'static str, String); 4] {
    [
        ("symbol", symbol.bare().to_string()),
        ("series", "[\"EQ\"]".to_string()),
        ("from", range.start.format("%d-%m-%Y").to_string()),
        ("to", range.end.format("%d-%m-%Y").to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn formats_query_dates_day_first() {
        let range = DateRange::try_new(
            NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 12).unwrap(),
        )
        .unwrap();
        let q = series_query(&Symbol::new("TIPSMUSIC").unwrap(), range);
        assert_eq!(q[0].1, "TIPSMUSIC");
        assert_eq!(q[1].1, "[\"EQ\"]");
        assert_eq!(q[2].1, "02-01-2026");
        assert_eq!(q[3].1, "12-01-2026");
    }
}
