use axum::{
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pricefeed_core::config::Settings;
use pricefeed_core::domain::price::DateRange;
use pricefeed_core::error::PipelineError;
use pricefeed_core::pipeline::QuotePipeline;
use pricefeed_core::time::nse_market;

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

    if settings.cron_secret.is_none() {
        tracing::warn!("CRON_SECRET missing; scheduled updates will be rejected");
    }

    let pipeline = match QuotePipeline::from_settings(&settings).await {
        Ok(p) => Some(Arc::new(p)),
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %format!("{e:#}"), "pipeline init failed; starting API in degraded mode");
            None
        }
    };

    let app = router(AppState::new(settings, pipeline));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/update-stock-price", any(update_stock_price))
        .route(
            "/api/backfill-stock-data",
            get(backfill_stock_data)
                .fallback(method_not_allowed)
                .layer(CorsLayer::permissive()),
        )
        .route(
            "/api/latest-stock-price",
            get(latest_stock_price).fallback(method_not_allowed),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    pipeline: Option<Arc<QuotePipeline>>,
    settings: Arc<Settings>,
    now: fn() -> DateTime<Utc>,
}

impl AppState {
    fn new(settings: Settings, pipeline: Option<Arc<QuotePipeline>>) -> Self {
        Self {
            pipeline,
            settings: Arc::new(settings),
            now: Utc::now,
        }
    }

    fn pipeline(&self) -> Result<&QuotePipeline, ApiError> {
        self.pipeline.as_deref().ok_or_else(|| {
            ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "price store unavailable")
        })
    }

    fn today_ist(&self) -> Result<NaiveDate, ApiError> {
        nse_market::ist_date((self.now)()).map_err(ApiError::internal)
    }
}

/// JSON error body shared by every route: `{ "success": false, "error": … }`.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        sentry_anyhow::capture_anyhow(&err);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::SourceUnavailable { .. } => StatusCode::NOT_FOUND,
            PipelineError::InvalidRange(_) => StatusCode::BAD_REQUEST,
            PipelineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = err.to_string();
        if status != StatusCode::BAD_REQUEST {
            sentry_anyhow::capture_anyhow(&anyhow::Error::new(err));
        }
        Self::new(status, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

async fn method_not_allowed() -> ApiError {
    ApiError::new(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

fn ok(body: Value) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

fn authorized(headers: &HeaderMap, cron_secret: Option<&str>) -> bool {
    let Some(secret) = cron_secret else {
        return false;
    };
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == secret)
}

async fn update_stock_price(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if method != Method::GET && method != Method::POST {
        return Err(method_not_allowed().await);
    }
    if !authorized(&headers, state.settings.cron_secret.as_deref()) {
        tracing::warn!("rejected unauthorized update request");
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized"));
    }

    let today = state.today_ist()?;
    if !nse_market::is_trading_day(today, &state.settings.market_holidays) {
        tracing::info!(%today, "market closed; skipping update");
        return Ok(ok(json!({
            "success": true,
            "skipped": true,
            "message": format!("market closed on {today}; no update"),
        })));
    }

    let pipeline = state.pipeline()?;
    let done = pipeline.run_daily_update(today).await?;

    Ok(ok(json!({
        "success": true,
        "message": format!("stock price {} for {}", done.action, done.record.date),
        "action": done.action,
        "data": done.record,
    })))
}

#[derive(Debug, Deserialize)]
struct BackfillParams {
    start: Option<String>,
    end: Option<String>,
}

fn parse_date(param: &str, value: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("invalid {param} date {value:?}, expected YYYY-MM-DD"),
        )
    })
}

async fn backfill_stock_data(
    State(state): State<AppState>,
    Query(params): Query<BackfillParams>,
) -> Result<Response, ApiError> {
    let start = match params.start.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(s) => parse_date("start", s)?,
        None => state.settings.backfill_default_start,
    };
    let end = match params.end.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(s) => parse_date("end", s)?,
        None => state.today_ist()?,
    };
    let range = DateRange::try_new(start, end)
        .map_err(|e| PipelineError::InvalidRange(format!("{e:#}")))?;

    let pipeline = state.pipeline()?;
    let report = pipeline.run_backfill(range).await?;

    Ok(ok(json!({
        "success": true,
        "message": format!(
            "backfill {} to {}: {} of {} stored",
            range.start, range.end, report.summary.successful, report.summary.total
        ),
        "symbol": report.symbol,
        "provider": report.provider,
        "summary": report.summary,
        "results": report.outcomes,
    })))
}

async fn latest_stock_price(State(state): State<AppState>) -> Result<Response, ApiError> {
    let pipeline = state.pipeline()?;
    let row = pipeline.latest().await?.ok_or_else(|| {
        ApiError::new(
            StatusCode::NOT_FOUND,
            format!("no stored price for {}", pipeline.symbol()),
        )
    })?;
    Ok(ok(json!({ "success": true, "data": row })))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
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
