use crate::config::Settings;
use crate::domain::price::{DailyPriceRecord, StoredPrice};
use crate::storage::error_logs::ErrorLogEntry;
use crate::storage::{PriceStore, StoreBackend};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use std::time::Duration;

const PRICES_TABLE: &str = "stock_prices";
const ERROR_LOGS_TABLE: &str = "error_logs";

/// `stock_prices` through the hosted database's REST interface (Supabase / PostgREST).
#[derive(Debug, Clone)]
pub struct PostgrestPriceStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct PriceRowBody<'a> {
    #[serde(flatten)]
    record: &'a DailyPriceRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl PostgrestPriceStore {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_supabase_url()?.to_string();
        let api_key = settings.require_supabase_service_key()?.to_string();
        Self::new(base_url, api_key, settings.http_timeout)
    }

    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build store http client")?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url.trim_end_matches('/'))
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn request(&self, method: Method, table: &str, prefer: Option<&'static str>) -> Result<RequestBuilder> {
        let mut headers = self.headers()?;
        if let Some(prefer) = prefer {
            headers.insert("Prefer", HeaderValue::from_static(prefer));
        }
        Ok(self
            .http
            .request(method, self.table_url(table))
            .headers(headers))
    }

    /// Sends the request and decodes PostgREST's array representation.
    async fn send_rows(&self, req: RequestBuilder, what: &str) -> Result<Vec<StoredPrice>> {
        let res = req
            .send()
            .await
            .with_context(|| format!("{what} request failed"))?;
        let status = res.status();
        let text = res
            .text()
            .await
            .with_context(|| format!("failed to read {what} response"))?;
        if !status.is_success() {
            anyhow::bail!("{what} HTTP {status}: {text}");
        }
        serde_json::from_str::<Vec<StoredPrice>>(&text)
            .with_context(|| format!("failed to parse {what} response: {text}"))
    }

    fn key_filter(record_symbol: &str, date: NaiveDate) -> [(&'static str, String); 2] {
        [
            ("symbol", format!("eq.{record_symbol}")),
            ("date", format!("eq.{date}")),
        ]
    }
}

fn single_row(rows: Vec<StoredPrice>, what: &str) -> Result<StoredPrice> {
    rows.into_iter()
        .next()
        .with_context(|| format!("{what} returned no rows"))
}

#[async_trait::async_trait]
impl PriceStore for PostgrestPriceStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Postgrest
    }

    async fn find(&self, symbol: &str, date: NaiveDate) -> Result<Option<StoredPrice>> {
        let req = self
            .request(Method::GET, PRICES_TABLE, None)?
            .query(&Self::key_filter(symbol, date))
            .query(&[("select", "*"), ("limit", "1")]);
        let rows = self.send_rows(req, "select stock_prices").await?;
        Ok(rows.into_iter().next())
    }

    async fn insert(
        &self,
        record: &DailyPriceRecord,
        written_at: DateTime<Utc>,
    ) -> Result<StoredPrice> {
        let body = PriceRowBody {
            record,
            created_at: Some(written_at),
            updated_at: written_at,
        };
        let req = self
            .request(Method::POST, PRICES_TABLE, Some("return=representation"))?
            .json(&[body]);
        single_row(self.send_rows(req, "insert stock_prices").await?, "insert stock_prices")
    }

    async fn update(
        &self,
        record: &DailyPriceRecord,
        written_at: DateTime<Utc>,
    ) -> Result<StoredPrice> {
        let body = PriceRowBody {
            record,
            created_at: None,
            updated_at: written_at,
        };
        let req = self
            .request(Method::PATCH, PRICES_TABLE, Some("return=representation"))?
            .query(&Self::key_filter(&record.symbol, record.date))
            .json(&body);
        single_row(self.send_rows(req, "update stock_prices").await?, "update stock_prices")
    }

    async fn upsert(
        &self,
        record: &DailyPriceRecord,
        written_at: DateTime<Utc>,
    ) -> Result<StoredPrice> {
        // created_at is left to the column default so a conflicting row keeps its original.
        let body = PriceRowBody {
            record,
            created_at: None,
            updated_at: written_at,
        };
        let req = self
            .request(
                Method::POST,
                PRICES_TABLE,
                Some("resolution=merge-duplicates,return=representation"),
            )?
            .query(&[("on_conflict", "symbol,date")])
            .json(&[body]);
        single_row(self.send_rows(req, "upsert stock_prices").await?, "upsert stock_prices")
    }

    async fn latest(&self, symbol: &str) -> Result<Option<StoredPrice>> {
        let req = self
            .request(Method::GET, PRICES_TABLE, None)?
            .query(&[
                ("symbol", format!("eq.{symbol}")),
                ("select", "*".to_string()),
                ("order", "date.desc".to_string()),
                ("limit", "1".to_string()),
            ]);
        let rows = self.send_rows(req, "select latest stock_prices").await?;
        Ok(rows.into_iter().next())
    }

    async fn record_error(&self, entry: &ErrorLogEntry) -> Result<()> {
        let res = self
            .request(Method::POST, ERROR_LOGS_TABLE, Some("return=minimal"))?
            .json(&[entry])
            .send()
            .await
            .context("insert error_logs request failed")?;
        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            anyhow::bail!("insert error_logs HTTP {status}: {text}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn row_body_flattens_record_and_omits_created_at_on_upsert() {
        let record = DailyPriceRecord {
            symbol: "TIPSMUSIC".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 1, 12).unwrap(),
            open: 118.0,
            high: 120.5,
            low: 120.5,
            close: 120.5,
            volume: 5000,
            source: Some("yahoo_finance".to_string()),
        };
        let at = DateTime::parse_from_rfc3339("2026-01-12T13:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let body = serde_json::to_value(PriceRowBody {
            record: &record,
            created_at: None,
            updated_at: at,
        })
        .unwrap();

        assert_eq!(
            body,
            json!({
                "symbol": "TIPSMUSIC",
                "date": "2026-01-12",
                "open": 118.0,
                "high": 120.5,
                "low": 120.5,
                "close": 120.5,
                "volume": 5000,
                "source": "yahoo_finance",
                "updated_at": "2026-01-12T13:00:00Z"
            })
        );
    }

    #[test]
    fn decodes_rows_with_extra_columns() {
        let text = r#"[{
            "id": 42,
            "symbol": "TIPSMUSIC",
            "date": "2026-01-12",
            "open": 118.0, "high": 120.5, "low": 120.5, "close": 120.5,
            "volume": 5000,
            "source": null,
            "created_at": "2026-01-12T13:00:00+00:00",
            "updated_at": null
        }]"#;
        let rows: Vec<StoredPrice> = serde_json::from_str(text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.volume, 5000);
        assert!(rows[0].record.source.is_none());
        assert!(rows[0].created_at.is_some());
        assert!(rows[0].updated_at.is_none());
    }

    #[test]
    fn table_url_strips_trailing_slash() {
        let store = PostgrestPriceStore::new(
            "https://example.supabase.co/".to_string(),
            "service-key".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            store.table_url(PRICES_TABLE),
            "https://example.supabase.co/rest/v1/stock_prices"
        );
    }
}
