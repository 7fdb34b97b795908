//! AuditTransaction (Movement) persistence: the append-only ground truth for
//! realized P&L (§4.8). Writes never update or delete existing rows.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewAuditTransaction {
    pub movement_id: Uuid,
    pub tenant_id: Uuid,
    pub exchange_order_id: Option<String>,
    pub transaction_type: String,
    pub symbol: String,
    pub asset: String,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub total_value: Option<Decimal>,
    pub fee: Decimal,
    pub side: Option<String>,
    pub leverage: Option<Decimal>,
    pub is_margin: bool,
    pub stop_price: Option<Decimal>,
    pub operation_id: Option<Uuid>,
    pub raw_exchange_response: Option<Value>,
    pub source: String,
    pub executed_at: DateTime<Utc>,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuditTransactionRow {
    pub movement_id: Uuid,
    pub tenant_id: Uuid,
    pub exchange_order_id: Option<String>,
    pub transaction_type: String,
    pub symbol: String,
    pub asset: String,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub total_value: Option<Decimal>,
    pub fee: Decimal,
    pub side: Option<String>,
    pub is_margin: bool,
    pub operation_id: Option<Uuid>,
    pub source: String,
    pub executed_at: DateTime<Utc>,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

fn row_to_movement(row: sqlx::postgres::PgRow) -> Result<AuditTransactionRow, sqlx::Error> {
    Ok(AuditTransactionRow {
        movement_id: row.try_get("movement_id")?,
        tenant_id: row.try_get("tenant_id")?,
        exchange_order_id: row.try_get("exchange_order_id")?,
        transaction_type: row.try_get("transaction_type")?,
        symbol: row.try_get("symbol")?,
        asset: row.try_get("asset")?,
        quantity: row.try_get("quantity")?,
        price: row.try_get("price")?,
        total_value: row.try_get("total_value")?,
        fee: row.try_get("fee")?,
        side: row.try_get("side")?,
        is_margin: row.try_get("is_margin")?,
        operation_id: row.try_get("operation_id")?,
        source: row.try_get("source")?,
        executed_at: row.try_get("executed_at")?,
        hash_prev: row.try_get("hash_prev")?,
        hash_self: row.try_get("hash_self")?,
    })
}

/// Insert one movement. Returns `Ok(false)` without writing a row if a
/// movement with the same (exchange_order_id, transaction_type) already
/// exists — the dedup invariant from §3, and the mechanism behind I2 (exactly
/// one AuditTransaction per Operation's entry order).
pub async fn insert_movement(pool: &PgPool, m: &NewAuditTransaction) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        insert into audit_transactions (
            movement_id, tenant_id, exchange_order_id, transaction_type, symbol, asset,
            quantity, price, total_value, fee, side, leverage, is_margin, stop_price,
            operation_id, raw_exchange_response, source, executed_at, hash_prev, hash_self
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
        on conflict (exchange_order_id, transaction_type) where exchange_order_id is not null
        do nothing
        returning movement_id
        "#,
    )
    .bind(m.movement_id)
    .bind(m.tenant_id)
    .bind(&m.exchange_order_id)
    .bind(&m.transaction_type)
    .bind(&m.symbol)
    .bind(&m.asset)
    .bind(m.quantity)
    .bind(m.price)
    .bind(m.total_value)
    .bind(m.fee)
    .bind(&m.side)
    .bind(m.leverage)
    .bind(m.is_margin)
    .bind(m.stop_price)
    .bind(m.operation_id)
    .bind(&m.raw_exchange_response)
    .bind(&m.source)
    .bind(m.executed_at)
    .bind(&m.hash_prev)
    .bind(&m.hash_self)
    .fetch_optional(pool)
    .await
    .context("insert_movement failed")?;

    Ok(row.is_some())
}

pub async fn fetch_movement_by_order(
    pool: &PgPool,
    exchange_order_id: &str,
    transaction_type: &str,
) -> Result<Option<AuditTransactionRow>> {
    let row = sqlx::query(
        "select * from audit_transactions where exchange_order_id = $1 and transaction_type = $2",
    )
    .bind(exchange_order_id)
    .bind(transaction_type)
    .fetch_optional(pool)
    .await
    .context("fetch_movement_by_order failed")?;

    row.map(row_to_movement).transpose().map_err(Into::into)
}

pub async fn list_movements_for_tenant(
    pool: &PgPool,
    tenant_id: Uuid,
) -> Result<Vec<AuditTransactionRow>> {
    let rows = sqlx::query(
        "select * from audit_transactions where tenant_id = $1 order by executed_at asc",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await
    .context("list_movements_for_tenant failed")?;

    rows.into_iter().map(|r| Ok(row_to_movement(r)?)).collect()
}

/// The `hash_self` of the most recently inserted movement for a tenant, used
/// to seed a fresh `AuditWriter` at startup so the chain survives restarts.
pub async fn fetch_last_hash_for_tenant(pool: &PgPool, tenant_id: Uuid) -> Result<Option<String>> {
    let row: Option<(Option<String>,)> = sqlx::query_as(
        "select hash_self from audit_transactions where tenant_id = $1 and hash_self is not null
         order by created_at desc limit 1",
    )
    .bind(tenant_id)
    .fetch_optional(pool)
    .await
    .context("fetch_last_hash_for_tenant failed")?;

    Ok(row.and_then(|(h,)| h))
}

/// The set of `exchange_order_id`s already recorded for a symbol, used by
/// the exchange reconciliation sweep (§6) to find orders the exchange knows
/// about that never made it into the audit log.
pub async fn known_exchange_order_ids(
    pool: &PgPool,
    tenant_id: Uuid,
    symbol: &str,
) -> Result<std::collections::HashSet<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        select distinct exchange_order_id from audit_transactions
        where tenant_id = $1 and symbol = $2 and exchange_order_id is not null
        "#,
    )
    .bind(tenant_id)
    .bind(symbol)
    .fetch_all(pool)
    .await
    .context("known_exchange_order_ids failed")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

pub async fn list_movements_for_operation(
    pool: &PgPool,
    operation_id: Uuid,
) -> Result<Vec<AuditTransactionRow>> {
    let rows = sqlx::query(
        "select * from audit_transactions where operation_id = $1 order by executed_at asc",
    )
    .bind(operation_id)
    .fetch_all(pool)
    .await
    .context("list_movements_for_operation failed")?;

    rows.into_iter().map(|r| Ok(row_to_movement(r)?)).collect()
}
