use crate::domain::price::ProviderId;
use serde::Deserialize;
use serde_json::Value;

/// Provider response body as received, tagged with who sent it. Parsing into the
/// schemas below happens in the normalizer.
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub provider: ProviderId,
    pub body: Value,
}

// Yahoo Finance chart API (`/v8/finance/chart/{symbol}`).

#[derive(Debug, Clone, Deserialize)]
pub struct YahooChartResponse {
    pub chart: YahooChart,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YahooChart {
    #[serde(default)]
    pub result: Option<Vec<YahooChartResult>>,
    #[serde(default)]
    pub error: Option<YahooChartError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YahooChartError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YahooChartResult {
    #[serde(default)]
    pub meta: Option<YahooChartMeta>,
    #[serde(default)]
    pub timestamp: Option<Vec<i64>>,
    #[serde(default)]
    pub indicators: Option<YahooIndicators>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooChartMeta {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub regular_market_time: Option<i64>,
    #[serde(default)]
    pub regular_market_price: Option<f64>,
    #[serde(default)]
    pub regular_market_open: Option<f64>,
    #[serde(default)]
    pub regular_market_day_high: Option<f64>,
    #[serde(default)]
    pub regular_market_day_low: Option<f64>,
    #[serde(default)]
    pub regular_market_volume: Option<f64>,
    #[serde(default)]
    pub previous_close: Option<f64>,
    #[serde(default)]
    pub chart_previous_close: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YahooIndicators {
    #[serde(default)]
    pub quote: Vec<YahooQuoteSeries>,
}

/// Parallel OHLCV arrays, index-aligned with `YahooChartResult::timestamp`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct YahooQuoteSeries {
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(default)]
    pub high: Vec<Option<f64>>,
    #[serde(default)]
    pub low: Vec<Option<f64>>,
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub volume: Vec<Option<f64>>,
}

// NSE India historical equity API (`/api/historical/cm/equity`).

#[derive(Debug, Clone, Deserialize)]
pub struct NseHistoricalResponse {
    #[serde(default)]
    pub data: Vec<NseHistoricalRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NseHistoricalRow {
    #[serde(rename = "CH_TIMESTAMP", default)]
    pub timestamp: Option<String>,
    #[serde(rename = "CH_SERIES", default)]
    pub series: Option<String>,
    #[serde(rename = "CH_OPENING_PRICE", default)]
    pub open: Option<f64>,
    #[serde(rename = "CH_TRADE_HIGH_PRICE", default)]
    pub high: Option<f64>,
    #[serde(rename = "CH_TRADE_LOW_PRICE", default)]
    pub low: Option<f64>,
    #[serde(rename = "CH_CLOSING_PRICE", default)]
    pub close: Option<f64>,
    #[serde(rename = "CH_TOT_TRADED_QTY", default)]
    pub volume: Option<f64>,
}

// Alpha Vantage `GLOBAL_QUOTE`. Every value arrives as a string.

#[derive(Debug, Clone, Deserialize)]
pub struct AlphaVantageQuoteResponse {
    #[serde(rename = "Global Quote", default)]
    pub global_quote: Option<AlphaVantageGlobalQuote>,
    #[serde(rename = "Note", default)]
    pub note: Option<String>,
    #[serde(rename = "Information", default)]
    pub information: Option<String>,
    #[serde(rename = "Error Message", default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlphaVantageGlobalQuote {
    #[serde(rename = "01. symbol", default)]
    pub symbol: Option<String>,
    #[serde(rename = "02. open", default)]
    pub open: Option<String>,
    #[serde(rename = "03. high", default)]
    pub high: Option<String>,
    #[serde(rename = "04. low", default)]
    pub low: Option<String>,
    #[serde(rename = "05. price", default)]
    pub price: Option<String>,
    #[serde(rename = "06. volume", default)]
    pub volume: Option<String>,
    #[serde(rename = "07. latest trading day", default)]
    pub latest_trading_day: Option<String>,
}

// Twelve Data `/quote`. Numeric values arrive as strings; errors come back in-band.

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwelveDataQuote {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub datetime: Option<String>,
    #[serde(default)]
    pub open: Option<String>,
    #[serde(default)]
    pub high: Option<String>,
    #[serde(default)]
    pub low: Option<String>,
    #[serde(default)]
    pub close: Option<String>,
    #[serde(default)]
    pub volume: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}
