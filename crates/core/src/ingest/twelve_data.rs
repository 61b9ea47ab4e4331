use crate::domain::price::{ProviderId, Symbol};
use crate::ingest::provider::{JsonHttp, QuoteProvider};
use crate::ingest::types::RawPayload;
use anyhow::Result;
use reqwest::header::HeaderMap;

const DEFAULT_BASE_URL: &str = "https://api.twelvedata.com";

/// Twelve Data `/quote` on the NSE listing.
#[derive(Debug, Clone)]
pub struct TwelveDataProvider {
    http: JsonHttp,
    base_url: String,
    api_key: String,
}

impl TwelveDataProvider {
    pub fn new(http: JsonHttp, api_key: String) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl QuoteProvider for TwelveDataProvider {
    fn provider_id(&self) -> ProviderId {
        ProviderId::TwelveData
    }

    async fn fetch_snapshot(&self, symbol: &Symbol) -> Result<RawPayload> {
        let (ticker, exchange) = symbol.twelve_data();
        let url = format!("{}/quote", self.base_url.trim_end_matches('/'));
        let query = [
            ("symbol", ticker.to_string()),
            ("exchange", exchange.to_string()),
            ("apikey", self.api_key.clone()),
        ];
        self.http
            .get_json(self.provider_id(), &url, &query, HeaderMap::new())
            .await
    }
}
