//! Trailing-Stop Calculator (C9, §4.6) state persistence: one row per open
//! position, updated in place as the calculator steps the stop forward.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewTrailingStopState {
    pub position_id: Uuid,
    pub tenant_id: Uuid,
    pub symbol: String,
    pub side: String,
    pub entry_price: Decimal,
    pub initial_stop: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone)]
pub struct TrailingStopStateRow {
    pub position_id: Uuid,
    pub tenant_id: Uuid,
    pub symbol: String,
    pub side: String,
    pub entry_price: Decimal,
    pub initial_stop: Decimal,
    pub current_stop: Decimal,
    pub current_price: Option<Decimal>,
    pub quantity: Decimal,
    pub last_adjustment_token: Option<String>,
    pub updated_at: DateTime<Utc>,
}

fn row_to_state(row: sqlx::postgres::PgRow) -> Result<TrailingStopStateRow, sqlx::Error> {
    Ok(TrailingStopStateRow {
        position_id: row.try_get("position_id")?,
        tenant_id: row.try_get("tenant_id")?,
        symbol: row.try_get("symbol")?,
        side: row.try_get("side")?,
        entry_price: row.try_get("entry_price")?,
        initial_stop: row.try_get("initial_stop")?,
        current_stop: row.try_get("current_stop")?,
        current_price: row.try_get("current_price")?,
        quantity: row.try_get("quantity")?,
        last_adjustment_token: row.try_get("last_adjustment_token")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Seed trailing-stop state for a newly opened position. A no-op (returns
/// the existing row) if one already exists for this `position_id` — the
/// position_id is the Operation id, which is created exactly once.
pub async fn insert_or_get_state(pool: &PgPool, new: &NewTrailingStopState) -> Result<TrailingStopStateRow> {
    let row = sqlx::query(
        r#"
        insert into trailing_stop_states (
            position_id, tenant_id, symbol, side, entry_price, initial_stop, current_stop, quantity
        ) values ($1, $2, $3, $4, $5, $6, $6, $7)
        on conflict (position_id) do update set position_id = excluded.position_id
        returning *
        "#,
    )
    .bind(new.position_id)
    .bind(new.tenant_id)
    .bind(&new.symbol)
    .bind(&new.side)
    .bind(new.entry_price)
    .bind(new.initial_stop)
    .bind(new.quantity)
    .fetch_one(pool)
    .await
    .context("insert_or_get_state failed")?;

    Ok(row_to_state(row)?)
}

pub async fn fetch_state(pool: &PgPool, position_id: Uuid) -> Result<Option<TrailingStopStateRow>> {
    let row = sqlx::query("select * from trailing_stop_states where position_id = $1")
        .bind(position_id)
        .fetch_optional(pool)
        .await
        .context("fetch_state failed")?;

    row.map(row_to_state).transpose().map_err(Into::into)
}

/// Apply an adjustment computed by `rg_stopmon::trailing`. Idempotent on
/// `adjustment_token`: a duplicate submission within the same token window
/// is a no-op (§4.6 "duplicate submissions within the same second are
/// no-ops"), reported back via the returned `bool`.
pub async fn apply_adjustment(
    pool: &PgPool,
    position_id: Uuid,
    new_stop: Decimal,
    current_price: Decimal,
    adjustment_token: &str,
) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        update trailing_stop_states
        set current_stop = $2, current_price = $3, last_adjustment_token = $4, updated_at = now()
        where position_id = $1 and last_adjustment_token is distinct from $4
        returning position_id
        "#,
    )
    .bind(position_id)
    .bind(new_stop)
    .bind(current_price)
    .bind(adjustment_token)
    .fetch_optional(pool)
    .await
    .context("apply_adjustment failed")?;

    Ok(row.is_some())
}

pub async fn delete_state(pool: &PgPool, position_id: Uuid) -> Result<()> {
    sqlx::query("delete from trailing_stop_states where position_id = $1")
        .bind(position_id)
        .execute(pool)
        .await
        .context("delete_state failed")?;
    Ok(())
}
