use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Timelike, Utc, Weekday};

const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

// NSE closes at 15:30 IST. Before this cutoff the scheduled job targets the previous session.
const CLOSE_CUTOFF_HOUR_IST: u32 = 16;
const CLOSE_CUTOFF_MINUTE_IST: u32 = 0;

// Republic Day, Independence Day, Gandhi Jayanti.
const FIXED_HOLIDAYS: [(u32, u32); 3] = [(1, 26), (8, 15), (10, 2)];

pub fn ist() -> anyhow::Result<FixedOffset> {
    FixedOffset::east_opt(IST_OFFSET_SECS).context("invalid IST offset")
}

/// Calendar date on the exchange's clock.
pub fn ist_date(now_utc: DateTime<Utc>) -> anyhow::Result<NaiveDate> {
    Ok(now_utc.with_timezone(&ist()?).date_naive())
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn is_holiday(date: NaiveDate, extra_holidays: &[NaiveDate]) -> bool {
    FIXED_HOLIDAYS
        .iter()
        .any(|&(m, d)| date.month() == m && date.day() == d)
        || extra_holidays.contains(&date)
}

pub fn is_trading_day(date: NaiveDate, extra_holidays: &[NaiveDate]) -> bool {
    !is_weekend(date) && !is_holiday(date, extra_holidays)
}

/// Most recent trading day on or before `date`.
pub fn previous_trading_day(mut date: NaiveDate, extra_holidays: &[NaiveDate]) -> NaiveDate {
    while !is_trading_day(date, extra_holidays) {
        date = date - Duration::days(1);
    }
    date
}

/// Session date a scheduled update should target. An explicit `YYYY-MM-DD` wins; otherwise
/// today in IST once the close cutoff has passed, else yesterday, rolled back over weekends
/// and holidays.
pub fn resolve_as_of_date(
    as_of_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
    extra_holidays: &[NaiveDate],
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid as-of date {s:?}, expected YYYY-MM-DD"));
    }

    let now_ist = now_utc.with_timezone(&ist()?);
    let cutoff_reached =
        (now_ist.hour(), now_ist.minute()) >= (CLOSE_CUTOFF_HOUR_IST, CLOSE_CUTOFF_MINUTE_IST);
    let mut date = now_ist.date_naive();
    if !cutoff_reached {
        date = date - Duration::days(1);
    }

    Ok(previous_trading_day(date, extra_holidays))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn ist_date_crosses_midnight_before_utc() {
        // 2026-01-11 19:00 UTC = 2026-01-12 00:30 IST
        let now = Utc.with_ymd_and_hms(2026, 1, 11, 19, 0, 0).unwrap();
        assert_eq!(ist_date(now).unwrap(), d(2026, 1, 12));
    }

    #[test]
    fn weekends_and_fixed_holidays_are_closed() {
        assert!(!is_trading_day(d(2026, 1, 10), &[])); // Saturday
        assert!(!is_trading_day(d(2026, 1, 26), &[])); // Monday, Republic Day
        assert!(is_trading_day(d(2026, 1, 27), &[]));
        assert!(!is_trading_day(d(2026, 3, 4), &[d(2026, 3, 4)]));
    }

    #[test]
    fn uses_same_day_after_cutoff() {
        // 2026-01-12 11:00 UTC = 16:30 IST
        let now = Utc.with_ymd_and_hms(2026, 1, 12, 11, 0, 0).unwrap();
        assert_eq!(resolve_as_of_date(None, now, &[]).unwrap(), d(2026, 1, 12));
    }

    #[test]
    fn uses_previous_session_before_cutoff() {
        // 2026-01-12 (Monday) 09:00 UTC = 14:30 IST; rolls back over the weekend.
        let now = Utc.with_ymd_and_hms(2026, 1, 12, 9, 0, 0).unwrap();
        assert_eq!(resolve_as_of_date(None, now, &[]).unwrap(), d(2026, 1, 9));
    }

    #[test]
    fn rolls_back_over_configured_holiday() {
        // 2026-01-28 (Wednesday) 04:00 UTC, before cutoff: 27th is a configured holiday,
        // 26th is Republic Day, 24/25 are the weekend.
        let now = Utc.with_ymd_and_hms(2026, 1, 28, 4, 0, 0).unwrap();
        let got = resolve_as_of_date(None, now, &[d(2026, 1, 27)]).unwrap();
        assert_eq!(got, d(2026, 1, 23));
    }

    #[test]
    fn explicit_date_is_taken_verbatim() {
        let now = Utc.with_ymd_and_hms(2026, 1, 12, 9, 0, 0).unwrap();
        assert_eq!(
            resolve_as_of_date(Some("2026-01-10"), now, &[]).unwrap(),
            d(2026, 1, 10)
        );
        assert!(resolve_as_of_date(Some("10/01/2026"), now, &[]).is_err());
    }
}
