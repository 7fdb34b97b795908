//! Operation and Order persistence (§3).

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct OperationRow {
    pub operation_id: Uuid,
    pub tenant_id: Uuid,
    pub intent_id: Uuid,
    pub strategy: Option<String>,
    pub symbol: String,
    pub side: String,
    pub status: String,
    pub entry_order_id: String,
    pub stop_price: Decimal,
    pub target_price: Option<Decimal>,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub average_fill_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

fn row_to_operation(row: sqlx::postgres::PgRow) -> Result<OperationRow, sqlx::Error> {
    Ok(OperationRow {
        operation_id: row.try_get("operation_id")?,
        tenant_id: row.try_get("tenant_id")?,
        intent_id: row.try_get("intent_id")?,
        strategy: row.try_get("strategy")?,
        symbol: row.try_get("symbol")?,
        side: row.try_get("side")?,
        status: row.try_get("status")?,
        entry_order_id: row.try_get("entry_order_id")?,
        stop_price: row.try_get("stop_price")?,
        target_price: row.try_get("target_price")?,
        quantity: row.try_get("quantity")?,
        filled_quantity: row.try_get("filled_quantity")?,
        average_fill_price: row.try_get("average_fill_price")?,
        created_at: row.try_get("created_at")?,
        closed_at: row.try_get("closed_at")?,
    })
}

/// Create an Operation with status=ACTIVE. Only called once the exchange has
/// confirmed entry (§3 Operation lifecycle); `entry_order_id` is unique so a
/// retried insert with the same order id fails loudly rather than duplicating.
#[allow(clippy::too_many_arguments)]
pub async fn insert_active_operation(
    pool: &PgPool,
    operation_id: Uuid,
    tenant_id: Uuid,
    intent_id: Uuid,
    strategy: Option<&str>,
    symbol: &str,
    side: &str,
    entry_order_id: &str,
    stop_price: Decimal,
    target_price: Option<Decimal>,
    quantity: Decimal,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into operations (
            operation_id, tenant_id, intent_id, strategy, symbol, side, status,
            entry_order_id, stop_price, target_price, quantity
        ) values ($1, $2, $3, $4, $5, $6, 'ACTIVE', $7, $8, $9, $10)
        "#,
    )
    .bind(operation_id)
    .bind(tenant_id)
    .bind(intent_id)
    .bind(strategy)
    .bind(symbol)
    .bind(side)
    .bind(entry_order_id)
    .bind(stop_price)
    .bind(target_price)
    .bind(quantity)
    .execute(pool)
    .await
    .context("insert_active_operation failed")?;

    Ok(())
}

pub async fn fetch_operation(pool: &PgPool, operation_id: Uuid) -> Result<OperationRow> {
    let row = sqlx::query("select * from operations where operation_id = $1")
        .bind(operation_id)
        .fetch_one(pool)
        .await
        .context("fetch_operation failed")?;
    Ok(row_to_operation(row)?)
}

pub async fn fetch_operation_by_intent(
    pool: &PgPool,
    intent_id: Uuid,
) -> Result<Option<OperationRow>> {
    let row = sqlx::query("select * from operations where intent_id = $1")
        .bind(intent_id)
        .fetch_optional(pool)
        .await
        .context("fetch_operation_by_intent failed")?;

    row.map(row_to_operation).transpose().map_err(Into::into)
}

/// Look up an Operation by its `entry_order_id` (unique). Used by the
/// reconciliation sweep to tell "already backfilled on a prior sweep" apart
/// from "genuinely missing", since `entry_order_id` — not `intent_id` — is
/// the only handle a bare exchange order history record carries.
pub async fn fetch_operation_by_entry_order_id(
    pool: &PgPool,
    entry_order_id: &str,
) -> Result<Option<OperationRow>> {
    let row = sqlx::query("select * from operations where entry_order_id = $1")
        .bind(entry_order_id)
        .fetch_optional(pool)
        .await
        .context("fetch_operation_by_entry_order_id failed")?;

    row.map(row_to_operation).transpose().map_err(Into::into)
}

pub async fn list_active_operations_for_tenant(
    pool: &PgPool,
    tenant_id: Uuid,
) -> Result<Vec<OperationRow>> {
    let rows = sqlx::query(
        "select * from operations where tenant_id = $1 and status = 'ACTIVE' order by created_at asc",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await
    .context("list_active_operations_for_tenant failed")?;

    rows.into_iter().map(|r| Ok(row_to_operation(r)?)).collect()
}

/// Allowed transitions per the Operation DAG (§3): PLANNED → ACTIVE,
/// PLANNED → CANCELLED, ACTIVE → {CLOSED, CANCELLED}. Terminal states never
/// transition (I10).
fn transition_allowed(from: &str, to: &str) -> bool {
    matches!(
        (from, to),
        ("PLANNED", "ACTIVE") | ("PLANNED", "CANCELLED") | ("ACTIVE", "CLOSED") | ("ACTIVE", "CANCELLED")
    )
}

#[derive(Debug)]
pub struct TransitionError {
    pub from: String,
    pub to: String,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid operation transition {} -> {} (terminal states never transition)",
            self.from, self.to
        )
    }
}

impl std::error::Error for TransitionError {}

/// Close an ACTIVE operation (stop executed or manual close). Fails the
/// whole statement atomically if the row is not ACTIVE, so a racing close
/// cannot silently clobber a CANCELLED operation (I10).
pub async fn close_operation(
    pool: &PgPool,
    operation_id: Uuid,
    filled_quantity: Decimal,
    average_fill_price: Decimal,
) -> Result<()> {
    let op = fetch_operation(pool, operation_id).await?;
    if !transition_allowed(&op.status, "CLOSED") {
        bail!(TransitionError {
            from: op.status,
            to: "CLOSED".to_string(),
        });
    }

    sqlx::query(
        r#"
        update operations
        set status = 'CLOSED', filled_quantity = $2, average_fill_price = $3, closed_at = now()
        where operation_id = $1 and status = 'ACTIVE'
        "#,
    )
    .bind(operation_id)
    .bind(filled_quantity)
    .bind(average_fill_price)
    .execute(pool)
    .await
    .context("close_operation failed")?;

    Ok(())
}

/// cancel_operation: valid only from PLANNED or ACTIVE (§6 Command interface).
pub async fn cancel_operation(pool: &PgPool, operation_id: Uuid) -> Result<()> {
    let op = fetch_operation(pool, operation_id).await?;
    if !transition_allowed(&op.status, "CANCELLED") {
        bail!(TransitionError {
            from: op.status,
            to: "CANCELLED".to_string(),
        });
    }

    sqlx::query(
        r#"
        update operations
        set status = 'CANCELLED', closed_at = now()
        where operation_id = $1 and status in ('PLANNED', 'ACTIVE')
        "#,
    )
    .bind(operation_id)
    .execute(pool)
    .await
    .context("cancel_operation failed")?;

    Ok(())
}
