use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

pub const STOCK_PRICE_UPDATE: &str = "stock_price_update";

/// A row of the `error_logs` monitoring table.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorLogEntry {
    #[serde(skip_serializing)]
    pub id: Uuid,
    pub error_type: String,
    pub error_message: String,
    pub error_details: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl ErrorLogEntry {
    pub fn new(error_type: &str, error_message: String, error_details: Option<Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            error_type: error_type.to_string(),
            error_message,
            error_details,
            created_at: Utc::now(),
        }
    }
}

pub async fn insert_error_log(pool: &sqlx::PgPool, entry: &ErrorLogEntry) -> anyhow::Result<Uuid> {
    sqlx::query(
        "INSERT INTO error_logs (id, error_type, error_message, error_details, created_at) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .persistent(false)
    .bind(entry.id)
    .bind(&entry.error_type)
    .bind(&entry.error_message)
    .bind(&entry.error_details)
    .bind(entry.created_at)
    .execute(pool)
    .await
    .context("insert error_logs failed")?;

    Ok(entry.id)
}
