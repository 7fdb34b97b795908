//! Event-sourced Stop Monitor persistence (§4.5): the StopEvent log and its
//! StopExecution projection. Every StopEvent insert is followed, in the same
//! transaction, by an upsert of the matching StopExecution row — the
//! "projection" is a deterministic fold keyed by execution_token, not a
//! separately maintained cache.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewStopEvent {
    pub event_id: Uuid,
    pub operation_id: Uuid,
    pub tenant_id: Uuid,
    pub symbol: String,
    pub event_type: String,
    pub trigger_price: Option<Decimal>,
    pub stop_price: Decimal,
    pub quantity: Decimal,
    pub side: String,
    pub execution_token: String,
    pub payload: Option<Value>,
    pub exchange_order_id: Option<String>,
    pub fill_price: Option<Decimal>,
    pub slippage_pct: Option<Decimal>,
    pub source: String,
    pub error_message: Option<String>,
    pub retry_count: i32,
}

#[derive(Debug, Clone)]
pub struct StopEventRow {
    pub event_id: Uuid,
    pub event_seq: i64,
    pub occurred_at: DateTime<Utc>,
    pub operation_id: Uuid,
    pub event_type: String,
    pub execution_token: String,
}

fn row_to_event(row: sqlx::postgres::PgRow) -> Result<StopEventRow, sqlx::Error> {
    Ok(StopEventRow {
        event_id: row.try_get("event_id")?,
        event_seq: row.try_get("event_seq")?,
        occurred_at: row.try_get("occurred_at")?,
        operation_id: row.try_get("operation_id")?,
        event_type: row.try_get("event_type")?,
        execution_token: row.try_get("execution_token")?,
    })
}

/// Append one StopEvent and open a transaction the caller completes with
/// [`upsert_projection`] and, in the same transaction, an Outbox insert (see
/// `rg-db::outbox::enqueue_in_tx`). Returning the open transaction keeps the
/// event-append, the projection update, and the outbox write atomic without
/// this crate knowing about the orchestrator's outbox routing decisions.
pub async fn append_event<'a>(
    pool: &'a PgPool,
    ev: &NewStopEvent,
) -> Result<(Transaction<'a, Postgres>, StopEventRow)> {
    let mut tx = pool.begin().await.context("append_event begin failed")?;

    let row = sqlx::query(
        r#"
        insert into stop_events (
            event_id, operation_id, tenant_id, symbol, event_type, trigger_price, stop_price,
            quantity, side, execution_token, payload, exchange_order_id, fill_price,
            slippage_pct, source, error_message, retry_count
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        returning event_id, event_seq, occurred_at, operation_id, event_type, execution_token
        "#,
    )
    .bind(ev.event_id)
    .bind(ev.operation_id)
    .bind(ev.tenant_id)
    .bind(&ev.symbol)
    .bind(&ev.event_type)
    .bind(ev.trigger_price)
    .bind(ev.stop_price)
    .bind(ev.quantity)
    .bind(&ev.side)
    .bind(&ev.execution_token)
    .bind(&ev.payload)
    .bind(&ev.exchange_order_id)
    .bind(ev.fill_price)
    .bind(ev.slippage_pct)
    .bind(&ev.source)
    .bind(&ev.error_message)
    .bind(ev.retry_count)
    .fetch_one(&mut *tx)
    .await
    .context("append_event insert failed")?;

    Ok((tx, row_to_event(row)?))
}

pub async fn list_events_for_operation(
    pool: &PgPool,
    operation_id: Uuid,
) -> Result<Vec<StopEventRow>> {
    let rows = sqlx::query(
        "select * from stop_events where operation_id = $1 order by event_seq asc",
    )
    .bind(operation_id)
    .fetch_all(pool)
    .await
    .context("list_events_for_operation failed")?;

    rows.into_iter().map(|r| Ok(row_to_event(r)?)).collect()
}

pub async fn latest_stop_triggered_for_tenant(
    pool: &PgPool,
    tenant_id: Uuid,
) -> Result<Option<DateTime<Utc>>> {
    let row: Option<(DateTime<Utc>,)> = sqlx::query_as(
        r#"
        select occurred_at from stop_events
        where tenant_id = $1 and event_type = 'STOP_TRIGGERED'
        order by occurred_at desc
        limit 1
        "#,
    )
    .bind(tenant_id)
    .fetch_optional(pool)
    .await
    .context("latest_stop_triggered_for_tenant failed")?;

    Ok(row.map(|(t,)| t))
}

#[derive(Debug, Clone)]
pub struct StopExecutionRow {
    pub execution_id: Uuid,
    pub operation_id: Uuid,
    pub execution_token: String,
    pub status: String,
    pub stop_price: Decimal,
    pub trigger_price: Option<Decimal>,
    pub quantity: Decimal,
    pub side: String,
    pub exchange_order_id: Option<String>,
    pub fill_price: Option<Decimal>,
    pub slippage_pct: Option<Decimal>,
    pub retry_count: i32,
}

fn row_to_execution(row: sqlx::postgres::PgRow) -> Result<StopExecutionRow, sqlx::Error> {
    Ok(StopExecutionRow {
        execution_id: row.try_get("execution_id")?,
        operation_id: row.try_get("operation_id")?,
        execution_token: row.try_get("execution_token")?,
        status: row.try_get("status")?,
        stop_price: row.try_get("stop_price")?,
        trigger_price: row.try_get("trigger_price")?,
        quantity: row.try_get("quantity")?,
        side: row.try_get("side")?,
        exchange_order_id: row.try_get("exchange_order_id")?,
        fill_price: row.try_get("fill_price")?,
        slippage_pct: row.try_get("slippage_pct")?,
        retry_count: row.try_get("retry_count")?,
    })
}

/// Attempt to claim the first `StopExecution` row for `(operation_id,
/// execution_token)`, inside the caller's open transaction. This is the real
/// exactly-once primitive behind §4.5's "two concurrent workers ... the
/// loser no-ops": the insert uses `on conflict do nothing`, so exactly one
/// concurrent caller gets `Some(row)` back (status PENDING) and every other
/// caller racing on the same token gets `None` and must stop without
/// submitting to the exchange. [`upsert_projection`] is for the confirmed
/// winner's subsequent status advances only — it must never be used to
/// decide who wins the race.
#[allow(clippy::too_many_arguments)]
pub async fn claim_execution(
    tx: &mut Transaction<'_, Postgres>,
    execution_id: Uuid,
    operation_id: Uuid,
    execution_token: &str,
    stop_price: Decimal,
    trigger_price: Option<Decimal>,
    quantity: Decimal,
    side: &str,
    source: &str,
) -> Result<Option<StopExecutionRow>> {
    let row = sqlx::query(
        r#"
        insert into stop_executions (
            execution_id, operation_id, execution_token, status, stop_price, trigger_price,
            quantity, side, triggered_at, source
        ) values ($1, $2, $3, 'PENDING', $4, $5, $6, $7, now(), $8)
        on conflict (operation_id, execution_token) do nothing
        returning execution_id, operation_id, execution_token, status, stop_price, trigger_price,
            quantity, side, exchange_order_id, fill_price, slippage_pct, retry_count
        "#,
    )
    .bind(execution_id)
    .bind(operation_id)
    .bind(execution_token)
    .bind(stop_price)
    .bind(trigger_price)
    .bind(quantity)
    .bind(side)
    .bind(source)
    .fetch_optional(&mut **tx)
    .await
    .context("claim_execution failed")?;

    row.map(row_to_execution).transpose().map_err(Into::into)
}

/// Upsert the StopExecution row for `(operation_id, execution_token)` inside
/// an open transaction, advancing `status` and copying the latest
/// timestamp/price fields the event carries. The unique index on
/// `(operation_id, execution_token)` is what makes the very first insert for
/// a token win the exactly-once race (§4.5 "Submission"); callers that lose
/// the race observe the already-advanced row instead.
///
/// `status_column` (triggered_at/submitted_at/executed_at/failed_at) is set
/// to `now()` only on first transition into that status; callers advance
/// monotonically (PENDING -> SUBMITTED -> EXECUTED or -> FAILED/BLOCKED) and
/// never move status backwards.
#[allow(clippy::too_many_arguments)]
pub async fn upsert_projection(
    tx: &mut Transaction<'_, Postgres>,
    execution_id: Uuid,
    operation_id: Uuid,
    execution_token: &str,
    status: &str,
    stop_price: Decimal,
    trigger_price: Option<Decimal>,
    quantity: Decimal,
    side: &str,
    exchange_order_id: Option<&str>,
    fill_price: Option<Decimal>,
    slippage_pct: Option<Decimal>,
    source: &str,
    error_message: Option<&str>,
) -> Result<StopExecutionRow> {
    let timestamp_column = match status {
        "PENDING" => "triggered_at",
        "SUBMITTED" => "submitted_at",
        "EXECUTED" => "executed_at",
        _ => "failed_at",
    };

    let sql = format!(
        r#"
        insert into stop_executions (
            execution_id, operation_id, execution_token, status, stop_price, trigger_price,
            quantity, side, {timestamp_column}, exchange_order_id, fill_price, slippage_pct,
            source, error_message
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, now(), $9, $10, $11, $12, $13)
        on conflict (operation_id, execution_token) do update set
            status = excluded.status,
            {timestamp_column} = coalesce(stop_executions.{timestamp_column}, excluded.{timestamp_column}),
            exchange_order_id = coalesce(excluded.exchange_order_id, stop_executions.exchange_order_id),
            fill_price = coalesce(excluded.fill_price, stop_executions.fill_price),
            slippage_pct = coalesce(excluded.slippage_pct, stop_executions.slippage_pct),
            error_message = coalesce(excluded.error_message, stop_executions.error_message),
            retry_count = stop_executions.retry_count + 1,
            updated_at = now()
        returning execution_id, operation_id, execution_token, status, stop_price, trigger_price,
            quantity, side, exchange_order_id, fill_price, slippage_pct, retry_count
        "#
    );

    let row = sqlx::query(&sql)
        .bind(execution_id)
        .bind(operation_id)
        .bind(execution_token)
        .bind(status)
        .bind(stop_price)
        .bind(trigger_price)
        .bind(quantity)
        .bind(side)
        .bind(exchange_order_id)
        .bind(fill_price)
        .bind(slippage_pct)
        .bind(source)
        .bind(error_message)
        .fetch_one(&mut **tx)
        .await
        .context("upsert_projection failed")?;

    Ok(row_to_execution(row)?)
}

pub async fn fetch_execution_by_token(
    pool: &PgPool,
    operation_id: Uuid,
    execution_token: &str,
) -> Result<Option<StopExecutionRow>> {
    let row = sqlx::query(
        "select * from stop_executions where operation_id = $1 and execution_token = $2",
    )
    .bind(operation_id)
    .bind(execution_token)
    .fetch_optional(pool)
    .await
    .context("fetch_execution_by_token failed")?;

    row.map(row_to_execution).transpose().map_err(Into::into)
}
