use anyhow::ensure;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quote providers, tagged on every record they produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    YahooFinance,
    NseIndia,
    AlphaVantage,
    TwelveData,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::YahooFinance => "yahoo_finance",
            Self::NseIndia => "nse_india",
            Self::AlphaVantage => "alpha_vantage",
            Self::TwelveData => "twelve_data",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "yahoo" | "yahoo_finance" => Ok(Self::YahooFinance),
            "nse" | "nse_india" => Ok(Self::NseIndia),
            "alpha_vantage" | "alphavantage" => Ok(Self::AlphaVantage),
            "twelve_data" | "twelvedata" => Ok(Self::TwelveData),
            other => anyhow::bail!("unknown quote provider: {other}"),
        }
    }
}

/// A bare NSE ticker. Providers that need an exchange-qualified form derive it here;
/// storage always uses the bare ticker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    ticker: String,
}

impl Symbol {
    pub fn new(ticker: &str) -> anyhow::Result<Self> {
        let ticker = ticker.trim().to_ascii_uppercase();
        ensure!(!ticker.is_empty(), "symbol must be non-empty");
        ensure!(
            ticker
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '&' | '_')),
            "symbol contains unsupported characters: {ticker}"
        );
        Ok(Self { ticker })
    }

    pub fn bare(&self) -> &str {
        &self.ticker
    }

    pub fn yahoo(&self) -> String {
        format!("{}.NS", self.ticker)
    }

    pub fn alpha_vantage(&self) -> String {
        format!("{}.BSE", self.ticker)
    }

    pub fn twelve_data(&self) -> (&str, &'static str) {
        (&self.ticker, "NSE")
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ticker)
    }
}

/// Canonical daily OHLCV row, keyed by `(symbol, date)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyPriceRecord {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub source: Option<String>,
}

/// A record as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPrice {
    #[serde(flatten)]
    pub record: DailyPriceRecord,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn try_new(start: NaiveDate, end: NaiveDate) -> anyhow::Result<Self> {
        ensure!(start <= end, "start {start} is after end {end}");
        Ok(Self { start, end })
    }

    /// First epoch second of `start` (UTC).
    pub fn period1(&self) -> i64 {
        self.start.and_time(NaiveTime::MIN).and_utc().timestamp()
    }

    /// First epoch second after `end` (UTC), so the end date is included.
    pub fn period2(&self) -> i64 {
        let after_end = self.end.checked_add_days(Days::new(1)).unwrap_or(self.end);
        after_end.and_time(NaiveTime::MIN).and_utc().timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_tags_round_trip_through_names() {
        for id in [
            ProviderId::YahooFinance,
            ProviderId::NseIndia,
            ProviderId::AlphaVantage,
            ProviderId::TwelveData,
        ] {
            assert_eq!(id.as_str().parse::<ProviderId>().unwrap(), id);
            assert_eq!(serde_json::to_value(id).unwrap(), id.as_str());
        }
        assert!("bloomberg".parse::<ProviderId>().is_err());
    }

    #[test]
    fn symbol_qualifies_per_provider() {
        let s = Symbol::new(" tipsmusic ").unwrap();
        assert_eq!(s.bare(), "TIPSMUSIC");
        assert_eq!(s.yahoo(), "TIPSMUSIC.NS");
        assert_eq!(s.alpha_vantage(), "TIPSMUSIC.BSE");
        assert_eq!(s.twelve_data(), ("TIPSMUSIC", "NSE"));
        assert!(Symbol::new("  ").is_err());
        assert!(Symbol::new("TIPS/MUSIC").is_err());
    }

    #[test]
    fn range_periods_cover_whole_end_day() {
        let r = DateRange::try_new(
            NaiveDate::from_ymd_opt(2026, 1, 9).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
        )
        .unwrap();
        assert_eq!(r.period1(), 1_767_916_800);
        assert_eq!(r.period2(), 1_767_916_800 + 2 * 86_400);
    }

    #[test]
    fn rejects_inverted_range() {
        let a = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(DateRange::try_new(a, b).is_err());
        assert!(DateRange::try_new(a, a).is_ok());
    }
}
