//! Cross-entity atomic writes that must commit as a single transaction.
//! The only caller today is the Intent Pipeline's LIVE EXECUTE phase
//! (§4.4): "atomically... creates an Operation... creates an
//! AuditTransaction... marks the intent EXECUTED". Splitting this into
//! three independent pool-level calls (as `operation`/`audit`/`intent`
//! expose for their other write paths) would leave a window where the
//! exchange accepted an order but the local transaction only partially
//! landed — exactly the failure mode §4.4's reconciliation job exists to
//! paper over. This module exists so that window never opens in the first
//! place.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::audit::NewAuditTransaction;

#[derive(Debug, Clone)]
pub struct NewOperationInCommit {
    pub operation_id: Uuid,
    pub tenant_id: Uuid,
    pub intent_id: Uuid,
    pub strategy: Option<String>,
    pub symbol: String,
    pub side: String,
    pub entry_order_id: String,
    pub stop_price: Decimal,
    pub target_price: Option<Decimal>,
    pub quantity: Decimal,
}

/// Commit the three writes of a successful LIVE execution in one
/// transaction. The `operations` insert is `ON CONFLICT (intent_id) DO
/// NOTHING RETURNING` against the unique index on `operations(intent_id)`
/// — the same exactly-once-insert pattern proven in `stopmon::claim_execution`
/// — so two genuinely concurrent EXECUTE calls for the same intent can both
/// reach this function (both having placed an exchange order) but only one
/// of them creates the Operation, AuditTransaction, and EXECUTED status.
/// Returns `Ok(true)` if this call won that race, `Ok(false)` if a
/// concurrent call already had; either way the transaction commits cleanly,
/// and any failure rolls back whichever of the three writes this call
/// attempted — the condition the reconciliation sweep (`rg-reconcile`)
/// exists to detect and repair (the exchange may still have accepted the
/// order even though this transaction never committed, or never tried to).
pub async fn commit_live_execution(
    pool: &PgPool,
    operation: &NewOperationInCommit,
    movement: &NewAuditTransaction,
    intent_id: Uuid,
    execution_result: Value,
) -> Result<bool> {
    let mut tx = pool.begin().await.context("commit_live_execution begin failed")?;

    let inserted = sqlx::query(
        r#"
        insert into operations (
            operation_id, tenant_id, intent_id, strategy, symbol, side, status,
            entry_order_id, stop_price, target_price, quantity
        ) values ($1, $2, $3, $4, $5, $6, 'ACTIVE', $7, $8, $9, $10)
        on conflict (intent_id) do nothing
        returning operation_id
        "#,
    )
    .bind(operation.operation_id)
    .bind(operation.tenant_id)
    .bind(operation.intent_id)
    .bind(&operation.strategy)
    .bind(&operation.symbol)
    .bind(&operation.side)
    .bind(&operation.entry_order_id)
    .bind(operation.stop_price)
    .bind(operation.target_price)
    .bind(operation.quantity)
    .fetch_optional(&mut *tx)
    .await
    .context("commit_live_execution insert operation failed")?;

    if inserted.is_none() {
        // Lost the race: a concurrent EXECUTE for this intent already
        // created the Operation. Nothing left for this call to commit.
        tx.commit().await.context("commit_live_execution commit failed")?;
        return Ok(false);
    }

    sqlx::query(
        r#"
        insert into audit_transactions (
            movement_id, tenant_id, exchange_order_id, transaction_type, symbol, asset,
            quantity, price, total_value, fee, side, leverage, is_margin, stop_price,
            operation_id, raw_exchange_response, source, executed_at, hash_prev, hash_self
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
        on conflict (exchange_order_id, transaction_type) where exchange_order_id is not null
        do nothing
        "#,
    )
    .bind(movement.movement_id)
    .bind(movement.tenant_id)
    .bind(&movement.exchange_order_id)
    .bind(&movement.transaction_type)
    .bind(&movement.symbol)
    .bind(&movement.asset)
    .bind(movement.quantity)
    .bind(movement.price)
    .bind(movement.total_value)
    .bind(movement.fee)
    .bind(&movement.side)
    .bind(movement.leverage)
    .bind(movement.is_margin)
    .bind(movement.stop_price)
    .bind(movement.operation_id)
    .bind(&movement.raw_exchange_response)
    .bind(&movement.source)
    .bind(movement.executed_at)
    .bind(&movement.hash_prev)
    .bind(&movement.hash_self)
    .execute(&mut *tx)
    .await
    .context("commit_live_execution insert movement failed")?;

    sqlx::query(
        r#"
        update trading_intents
        set status = 'EXECUTED', execution_result = $2, executed_at = now(), updated_at = now()
        where intent_id = $1
        "#,
    )
    .bind(intent_id)
    .bind(execution_result)
    .execute(&mut *tx)
    .await
    .context("commit_live_execution mark intent executed failed")?;

    tx.commit().await.context("commit_live_execution commit failed")?;
    Ok(true)
}
