use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pricefeed_core::config::Settings;
use pricefeed_core::domain::price::DateRange;
use pricefeed_core::pipeline::QuotePipeline;
use pricefeed_core::storage::memory::MemoryPriceStore;
use pricefeed_core::time::nse_market;

#[derive(Debug, Parser)]
#[command(name = "pricefeed_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch the latest quote and store it as one daily row.
    Update {
        /// Market as-of date (YYYY-MM-DD). Defaults to the last completed NSE session.
        #[arg(long)]
        as_of_date: Option<String>,

        /// Do everything except writing to the configured store.
        #[arg(long)]
        dry_run: bool,
    },
    /// Fetch an inclusive date range in one request and store every day.
    Backfill {
        /// First day (YYYY-MM-DD). Defaults to BACKFILL_DEFAULT_START.
        #[arg(long)]
        start: Option<String>,

        /// Last day (YYYY-MM-DD). Defaults to today's IST date.
        #[arg(long)]
        end: Option<String>,

        #[arg(long)]
        dry_run: bool,
    },
    /// Print the most recent stored row.
    Latest,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    if let Err(err) = run(args.command, &settings).await {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %format!("{err:#}"), "worker run failed");
        return Err(err);
    }
    Ok(())
}

async fn run(command: Command, settings: &Settings) -> anyhow::Result<()> {
    match command {
        Command::Update {
            as_of_date,
            dry_run,
        } => {
            let as_of_date = nse_market::resolve_as_of_date(
                as_of_date.as_deref(),
                chrono::Utc::now(),
                &settings.market_holidays,
            )?;
            let pipeline = build_pipeline(settings, dry_run).await?;

            tracing::info!(%as_of_date, dry_run, symbol = %pipeline.symbol(), "running daily update");
            let done = pipeline.run_daily_update(as_of_date).await?;
            print_json(&done)
        }
        Command::Backfill {
            start,
            end,
            dry_run,
        } => {
            let range = backfill_range(start.as_deref(), end.as_deref(), settings)?;
            let pipeline = build_pipeline(settings, dry_run).await?;

            tracing::info!(start = %range.start, end = %range.end, dry_run, "running backfill");
            let report = pipeline.run_backfill(range).await?;
            print_json(&report)
        }
        Command::Latest => {
            let pipeline = QuotePipeline::from_settings(settings).await?;
            match pipeline.latest().await? {
                Some(row) => print_json(&row),
                None => anyhow::bail!("no stored price for {}", pipeline.symbol()),
            }
        }
    }
}

async fn build_pipeline(settings: &Settings, dry_run: bool) -> anyhow::Result<QuotePipeline> {
    if dry_run {
        return QuotePipeline::with_store(settings, Arc::new(MemoryPriceStore::default()));
    }
    QuotePipeline::from_settings(settings).await
}

fn backfill_range(
    start: Option<&str>,
    end: Option<&str>,
    settings: &Settings,
) -> anyhow::Result<DateRange> {
    let start = match start {
        Some(s) => parse_date("--start", s)?,
        None => settings.backfill_default_start,
    };
    let end = match end {
        Some(s) => parse_date("--end", s)?,
        None => nse_market::ist_date(chrono::Utc::now())?,
    };
    DateRange::try_new(start, end)
}

fn parse_date(flag: &str, value: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("{flag} must be YYYY-MM-DD (got {value:?})"))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::from_vars(|_| None).unwrap()
    }

    #[test]
    fn parses_update_flags() {
        let args =
            Args::try_parse_from(["pricefeed_worker", "update", "--as-of-date", "2026-01-12", "--dry-run"])
                .unwrap();
        match args.command {
            Command::Update {
                as_of_date,
                dry_run,
            } => {
                assert_eq!(as_of_date.as_deref(), Some("2026-01-12"));
                assert!(dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn backfill_range_uses_configured_default_start() {
        let range = backfill_range(None, Some("2026-01-16"), &settings()).unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2026, 1, 9).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2026, 1, 16).unwrap());
    }

    #[test]
    fn backfill_range_rejects_inverted_or_malformed_dates() {
        assert!(backfill_range(Some("2026-01-16"), Some("2026-01-09"), &settings()).is_err());
        assert!(backfill_range(Some("16-01-2026"), None, &settings()).is_err());
    }

    #[test]
    fn latest_takes_no_flags() {
        assert!(Args::try_parse_from(["pricefeed_worker", "latest", "--dry-run"]).is_err());
    }
}
