use crate::domain::price::{ProviderId, Symbol};
use crate::ingest::provider::{JsonHttp, QuoteProvider};
use crate::ingest::types::RawPayload;
use anyhow::Result;
use reqwest::header::HeaderMap;

const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";

/// Alpha Vantage `GLOBAL_QUOTE` against the BSE listing.
#[derive(Debug, Clone)]
pub struct AlphaVantageProvider {
    http: JsonHttp,
    base_url: String,
    api_key: String,
}

impl AlphaVantageProvider {
    pub fn new(http: JsonHttp, api_key: String) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl QuoteProvider for AlphaVantageProvider {
    fn provider_id(&self) -> ProviderId {
        ProviderId::AlphaVantage
    }

    async fn fetch_snapshot(&self, symbol: &Symbol) -> Result<RawPayload> {
        let url = format!("{}/query", self.base_url.trim_end_matches('/'));
        let query = [
            ("function", "GLOBAL_QUOTE".to_string()),
            ("symbol", symbol.alpha_vantage()),
            ("apikey", self.api_key.clone()),
        ];
        self.http
            .get_json(self.provider_id(), &url, &query, HeaderMap::new())
            .await
    }
}
