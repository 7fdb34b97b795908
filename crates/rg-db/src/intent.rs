//! TradingIntent persistence for the Intent Pipeline (§4.4).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TradingIntentRow {
    pub intent_id: Uuid,
    pub tenant_id: Uuid,
    pub symbol: String,
    pub side: String,
    pub quantity: Option<Decimal>,
    pub entry_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub capital: Option<Decimal>,
    pub risk_amount: Option<Decimal>,
    pub risk_percent: Option<Decimal>,
    pub confidence: Option<String>,
    pub strategy: Option<String>,
    pub status: String,
    pub validation_result: Option<Value>,
    pub execution_result: Option<Value>,
    pub pattern_code: Option<String>,
    pub pattern_source: Option<String>,
    pub pattern_event_id: Option<Uuid>,
    pub pattern_triggered_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
}

fn row_to_intent(row: sqlx::postgres::PgRow) -> Result<TradingIntentRow, sqlx::Error> {
    Ok(TradingIntentRow {
        intent_id: row.try_get("intent_id")?,
        tenant_id: row.try_get("tenant_id")?,
        symbol: row.try_get("symbol")?,
        side: row.try_get("side")?,
        quantity: row.try_get("quantity")?,
        entry_price: row.try_get("entry_price")?,
        stop_price: row.try_get("stop_price")?,
        target_price: row.try_get("target_price")?,
        capital: row.try_get("capital")?,
        risk_amount: row.try_get("risk_amount")?,
        risk_percent: row.try_get("risk_percent")?,
        confidence: row.try_get("confidence")?,
        strategy: row.try_get("strategy")?,
        status: row.try_get("status")?,
        validation_result: row.try_get("validation_result")?,
        execution_result: row.try_get("execution_result")?,
        pattern_code: row.try_get("pattern_code")?,
        pattern_source: row.try_get("pattern_source")?,
        pattern_event_id: row.try_get("pattern_event_id")?,
        pattern_triggered_at: row.try_get("pattern_triggered_at")?,
        executed_at: row.try_get("executed_at")?,
    })
}

/// Insert a new intent in status PENDING. Called at PLAN.
pub async fn insert_intent(pool: &PgPool, intent: &TradingIntentRow) -> Result<()> {
    sqlx::query(
        r#"
        insert into trading_intents (
            intent_id, tenant_id, symbol, side, quantity, entry_price, stop_price, target_price,
            capital, risk_amount, risk_percent, confidence, strategy, status,
            pattern_code, pattern_source, pattern_event_id, pattern_triggered_at
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        "#,
    )
    .bind(intent.intent_id)
    .bind(intent.tenant_id)
    .bind(&intent.symbol)
    .bind(&intent.side)
    .bind(intent.quantity)
    .bind(intent.entry_price)
    .bind(intent.stop_price)
    .bind(intent.target_price)
    .bind(intent.capital)
    .bind(intent.risk_amount)
    .bind(intent.risk_percent)
    .bind(&intent.confidence)
    .bind(&intent.strategy)
    .bind(&intent.status)
    .bind(&intent.pattern_code)
    .bind(&intent.pattern_source)
    .bind(intent.pattern_event_id)
    .bind(intent.pattern_triggered_at)
    .execute(pool)
    .await
    .context("insert_intent failed")?;

    Ok(())
}

pub async fn fetch_intent(pool: &PgPool, intent_id: Uuid) -> Result<TradingIntentRow> {
    let row = sqlx::query("select * from trading_intents where intent_id = $1")
        .bind(intent_id)
        .fetch_one(pool)
        .await
        .context("fetch_intent failed")?;
    Ok(row_to_intent(row)?)
}

/// Persist the derived/validated sizing fields plus the validation verdict,
/// advancing status to VALIDATED or FAILED (§4.4 VALIDATE).
#[allow(clippy::too_many_arguments)]
pub async fn record_validation(
    pool: &PgPool,
    intent_id: Uuid,
    quantity: Option<Decimal>,
    entry_price: Option<Decimal>,
    stop_price: Option<Decimal>,
    capital: Option<Decimal>,
    risk_amount: Option<Decimal>,
    risk_percent: Option<Decimal>,
    status: &str,
    validation_result: Value,
) -> Result<()> {
    sqlx::query(
        r#"
        update trading_intents
        set quantity = $2, entry_price = $3, stop_price = $4, capital = $5,
            risk_amount = $6, risk_percent = $7, status = $8, validation_result = $9,
            updated_at = now()
        where intent_id = $1
        "#,
    )
    .bind(intent_id)
    .bind(quantity)
    .bind(entry_price)
    .bind(stop_price)
    .bind(capital)
    .bind(risk_amount)
    .bind(risk_percent)
    .bind(status)
    .bind(validation_result)
    .execute(pool)
    .await
    .context("record_validation failed")?;

    Ok(())
}

/// Mark EXECUTED (dry-run or live) with the execution result payload.
pub async fn record_execution(
    pool: &PgPool,
    intent_id: Uuid,
    execution_result: Value,
) -> Result<()> {
    sqlx::query(
        r#"
        update trading_intents
        set status = 'EXECUTED', execution_result = $2, executed_at = now(), updated_at = now()
        where intent_id = $1
        "#,
    )
    .bind(intent_id)
    .bind(execution_result)
    .execute(pool)
    .await
    .context("record_execution failed")?;

    Ok(())
}

pub async fn record_failure(pool: &PgPool, intent_id: Uuid, execution_result: Value) -> Result<()> {
    sqlx::query(
        r#"
        update trading_intents
        set status = 'FAILED', execution_result = $2, updated_at = now()
        where intent_id = $1
        "#,
    )
    .bind(intent_id)
    .bind(execution_result)
    .execute(pool)
    .await
    .context("record_failure failed")?;

    Ok(())
}

/// Intents left PENDING across a restart (§5 "Intent Pipeline requests").
pub async fn list_pending_intents(pool: &PgPool) -> Result<Vec<TradingIntentRow>> {
    let rows = sqlx::query("select * from trading_intents where status = 'PENDING' order by created_at asc")
        .fetch_all(pool)
        .await
        .context("list_pending_intents failed")?;

    rows.into_iter().map(|r| Ok(row_to_intent(r)?)).collect()
}
