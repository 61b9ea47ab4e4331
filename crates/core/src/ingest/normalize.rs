//! Pure conversion from provider payloads to canonical [`DailyPriceRecord`]s.
//!
//! Field rules shared by every provider:
//! - `close` is mandatory and must be positive; series entries without one are dropped,
//!   snapshots without one are an error.
//! - `open`, `high` and `low` fall back to the same record's `close` when missing or zero.
//! - `volume` defaults to zero.
//! - A snapshot carries the session it was quoted in; one quoted for a different session
//!   than the requested date is rejected rather than stored under the wrong day.

use crate::domain::price::{DailyPriceRecord, ProviderId, Symbol};
use crate::time::nse_market;
use crate::ingest::types::{
    AlphaVantageQuoteResponse, NseHistoricalResponse, RawPayload, TwelveDataQuote,
    YahooChartMeta, YahooChartResponse, YahooChartResult,
};
use chrono::{DateTime, NaiveDate};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizeError {
    #[error("{provider} payload does not match the expected schema: {detail}")]
    Schema { provider: ProviderId, detail: String },

    #[error("{provider} payload is missing `{field}`")]
    MissingField {
        provider: ProviderId,
        field: &'static str,
    },

    #[error("{provider} payload has an invalid `{field}`: {value:?}")]
    InvalidField {
        provider: ProviderId,
        field: &'static str,
        value: String,
    },

    #[error("{provider} reported an error: {message}")]
    Provider { provider: ProviderId, message: String },

    #[error("{provider} resolved a non-positive close ({close})")]
    InvalidClose { provider: ProviderId, close: f64 },

    #[error("{provider} quote is for the {actual} session, not {expected}")]
    SessionMismatch {
        provider: ProviderId,
        expected: NaiveDate,
        actual: NaiveDate,
    },

    #[error("{provider} does not provide {kind} payloads")]
    Unsupported {
        provider: ProviderId,
        kind: &'static str,
    },
}

/// Normalizes a single-day quote for the `as_of_date` session. The record is dated from the
/// provider's own session stamp when present; a stamp for another session is an error.
pub fn normalize_snapshot(
    payload: &RawPayload,
    symbol: &Symbol,
    as_of_date: NaiveDate,
) -> Result<DailyPriceRecord, NormalizeError> {
    match payload.provider {
        ProviderId::YahooFinance => yahoo_snapshot(payload, symbol, as_of_date),
        ProviderId::AlphaVantage => alpha_vantage_snapshot(payload, symbol, as_of_date),
        ProviderId::TwelveData => twelve_data_snapshot(payload, symbol, as_of_date),
        ProviderId::NseIndia => Err(NormalizeError::Unsupported {
            provider: payload.provider,
            kind: "snapshot",
        }),
    }
}

/// Normalizes a time series into records sorted by date. If a payload carries the same
/// date more than once, the later entry wins.
pub fn normalize_series(
    payload: &RawPayload,
    symbol: &Symbol,
) -> Result<Vec<DailyPriceRecord>, NormalizeError> {
    let records = match payload.provider {
        ProviderId::YahooFinance => yahoo_series(payload, symbol)?,
        ProviderId::NseIndia => nse_series(payload, symbol)?,
        ProviderId::AlphaVantage | ProviderId::TwelveData => {
            return Err(NormalizeError::Unsupported {
                provider: payload.provider,
                kind: "time-series",
            })
        }
    };

    let mut by_date = BTreeMap::new();
    for record in records {
        by_date.insert(record.date, record);
    }
    Ok(by_date.into_values().collect())
}

fn parse_body<T: DeserializeOwned>(payload: &RawPayload) -> Result<T, NormalizeError> {
    T::deserialize(&payload.body).map_err(|err| NormalizeError::Schema {
        provider: payload.provider,
        detail: err.to_string(),
    })
}

fn yahoo_result(payload: &RawPayload) -> Result<YahooChartResult, NormalizeError> {
    let parsed: YahooChartResponse = parse_body(payload)?;
    if let Some(err) = parsed.chart.error {
        let message = err
            .description
            .or(err.code)
            .unwrap_or_else(|| "unspecified chart error".to_string());
        return Err(NormalizeError::Provider {
            provider: payload.provider,
            message,
        });
    }

    parsed
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or(NormalizeError::MissingField {
            provider: payload.provider,
            field: "chart.result",
        })
}

fn yahoo_snapshot(
    payload: &RawPayload,
    symbol: &Symbol,
    as_of_date: NaiveDate,
) -> Result<DailyPriceRecord, NormalizeError> {
    let meta: YahooChartMeta = yahoo_result(payload)?
        .meta
        .ok_or(NormalizeError::MissingField {
            provider: payload.provider,
            field: "chart.result[0].meta",
        })?;

    let previous_close = meta.previous_close.or(meta.chart_previous_close);
    let close = resolve_close(
        payload.provider,
        "meta.regularMarketPrice",
        &[meta.regular_market_price, previous_close],
    )?;

    let session = meta
        .regular_market_time
        .map(|ts| {
            DateTime::from_timestamp(ts, 0)
                .and_then(|dt| nse_market::ist_date(dt).ok())
                .ok_or_else(|| NormalizeError::InvalidField {
                    provider: payload.provider,
                    field: "meta.regularMarketTime",
                    value: ts.to_string(),
                })
        })
        .transpose()?;
    let date = session_date(payload.provider, session, as_of_date)?;

    Ok(DailyPriceRecord {
        symbol: symbol.bare().to_string(),
        date,
        open: positive(meta.regular_market_open)
            .or(positive(previous_close))
            .unwrap_or(close),
        high: positive(meta.regular_market_day_high).unwrap_or(close),
        low: positive(meta.regular_market_day_low).unwrap_or(close),
        close,
        volume: volume(meta.regular_market_volume),
        source: Some(payload.provider.as_str().to_string()),
    })
}

fn yahoo_series(
    payload: &RawPayload,
    symbol: &Symbol,
) -> Result<Vec<DailyPriceRecord>, NormalizeError> {
    let result = yahoo_result(payload)?;

    // Yahoo omits `timestamp` entirely when the range holds no trading days.
    let Some(timestamps) = result.timestamp.filter(|t| !t.is_empty()) else {
        return Ok(Vec::new());
    };

    let quote = result
        .indicators
        .and_then(|i| i.quote.into_iter().next())
        .ok_or(NormalizeError::MissingField {
            provider: payload.provider,
            field: "chart.result[0].indicators.quote",
        })?;

    let at = |values: &[Option<f64>], idx: usize| values.get(idx).copied().flatten();

    let mut out = Vec::with_capacity(timestamps.len());
    for (idx, ts) in timestamps.iter().copied().enumerate() {
        let Some(close) = positive(at(&quote.close, idx)) else {
            continue;
        };
        let date = DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| NormalizeError::InvalidField {
                provider: payload.provider,
                field: "chart.result[0].timestamp",
                value: ts.to_string(),
            })?;

        out.push(build_record(
            symbol,
            date,
            Ohlcv {
                open: at(&quote.open, idx),
                high: at(&quote.high, idx),
                low: at(&quote.low, idx),
                close,
                volume: at(&quote.volume, idx),
            },
            payload.provider,
        ));
    }
    Ok(out)
}

fn nse_series(
    payload: &RawPayload,
    symbol: &Symbol,
) -> Result<Vec<DailyPriceRecord>, NormalizeError> {
    let parsed: NseHistoricalResponse = parse_body(payload)?;

    let mut out = Vec::with_capacity(parsed.data.len());
    for row in parsed.data {
        let Some(raw_date) = row.timestamp.as_deref().map(str::trim).filter(|s| !s.is_empty())
        else {
            continue;
        };
        let Some(close) = positive(row.close) else {
            continue;
        };
        let date = parse_nse_date(raw_date).ok_or_else(|| NormalizeError::InvalidField {
            provider: payload.provider,
            field: "CH_TIMESTAMP",
            value: raw_date.to_string(),
        })?;

        out.push(build_record(
            symbol,
            date,
            Ohlcv {
                open: row.open,
                high: row.high,
                low: row.low,
                close,
                volume: row.volume,
            },
            payload.provider,
        ));
    }
    Ok(out)
}

fn parse_nse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d-%b-%Y"))
        .ok()
}

fn alpha_vantage_snapshot(
    payload: &RawPayload,
    symbol: &Symbol,
    as_of_date: NaiveDate,
) -> Result<DailyPriceRecord, NormalizeError> {
    let parsed: AlphaVantageQuoteResponse = parse_body(payload)?;
    let provider = payload.provider;

    if let Some(message) = parsed
        .error_message
        .or(parsed.note)
        .or(parsed.information)
    {
        return Err(NormalizeError::Provider { provider, message });
    }

    let quote = parsed.global_quote.unwrap_or_default();
    let price = parse_decimal(provider, "05. price", quote.price.as_deref())?;
    let close = resolve_close(provider, "05. price", &[price])?;
    let session = parse_session(
        provider,
        "07. latest trading day",
        quote.latest_trading_day.as_deref(),
    )?;
    let date = session_date(provider, session, as_of_date)?;

    Ok(build_record(
        symbol,
        date,
        Ohlcv {
            open: parse_decimal(provider, "02. open", quote.open.as_deref())?,
            high: parse_decimal(provider, "03. high", quote.high.as_deref())?,
            low: parse_decimal(provider, "04. low", quote.low.as_deref())?,
            close,
            volume: parse_decimal(provider, "06. volume", quote.volume.as_deref())?,
        },
        provider,
    ))
}

fn twelve_data_snapshot(
    payload: &RawPayload,
    symbol: &Symbol,
    as_of_date: NaiveDate,
) -> Result<DailyPriceRecord, NormalizeError> {
    let quote: TwelveDataQuote = parse_body(payload)?;
    let provider = payload.provider;

    if quote.status.as_deref() == Some("error") {
        let message = quote
            .message
            .unwrap_or_else(|| format!("status error (code {:?})", quote.code));
        return Err(NormalizeError::Provider { provider, message });
    }

    let close = parse_decimal(provider, "close", quote.close.as_deref())?;
    let close = resolve_close(provider, "close", &[close])?;
    let session = parse_session(provider, "datetime", quote.datetime.as_deref())?;
    let date = session_date(provider, session, as_of_date)?;

    Ok(build_record(
        symbol,
        date,
        Ohlcv {
            open: parse_decimal(provider, "open", quote.open.as_deref())?,
            high: parse_decimal(provider, "high", quote.high.as_deref())?,
            low: parse_decimal(provider, "low", quote.low.as_deref())?,
            close,
            volume: parse_decimal(provider, "volume", quote.volume.as_deref())?,
        },
        provider,
    ))
}

fn session_date(
    provider: ProviderId,
    session: Option<NaiveDate>,
    as_of_date: NaiveDate,
) -> Result<NaiveDate, NormalizeError> {
    match session {
        Some(actual) if actual != as_of_date => Err(NormalizeError::SessionMismatch {
            provider,
            expected: as_of_date,
            actual,
        }),
        _ => Ok(as_of_date),
    }
}

/// `YYYY-MM-DD`, optionally followed by a time of day.
fn parse_session(
    provider: ProviderId,
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<NaiveDate>, NormalizeError> {
    let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    s.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .map(Some)
        .ok_or_else(|| NormalizeError::InvalidField {
            provider,
            field,
            value: s.to_string(),
        })
}

struct Ohlcv {
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: f64,
    volume: Option<f64>,
}

fn build_record(
    symbol: &Symbol,
    date: NaiveDate,
    v: Ohlcv,
    provider: ProviderId,
) -> DailyPriceRecord {
    DailyPriceRecord {
        symbol: symbol.bare().to_string(),
        date,
        open: positive(v.open).unwrap_or(v.close),
        high: positive(v.high).unwrap_or(v.close),
        low: positive(v.low).unwrap_or(v.close),
        close: v.close,
        volume: volume(v.volume),
        source: Some(provider.as_str().to_string()),
    }
}

/// First positive candidate wins. A present-but-unusable value is an invalid close,
/// nothing present at all is a missing field.
fn resolve_close(
    provider: ProviderId,
    field: &'static str,
    candidates: &[Option<f64>],
) -> Result<f64, NormalizeError> {
    if let Some(close) = candidates.iter().copied().find_map(positive) {
        return Ok(close);
    }
    match candidates.iter().copied().flatten().next() {
        Some(close) => Err(NormalizeError::InvalidClose { provider, close }),
        None => Err(NormalizeError::MissingField { provider, field }),
    }
}

fn positive(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite() && *x > 0.0)
}

fn volume(v: Option<f64>) -> i64 {
    match positive(v) {
        Some(x) if x < i64::MAX as f64 => x.round() as i64,
        _ => 0,
    }
}

fn parse_decimal(
    provider: ProviderId,
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<f64>, NormalizeError> {
    let Some(s) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    s.replace(',', "")
        .parse::<f64>()
        .map(Some)
        .map_err(|_| NormalizeError::InvalidField {
            provider,
            field,
            value: s.to_string(),
        })
}
