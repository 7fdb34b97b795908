//! Exchange Reconciliation outbound sweep (spec.md §6 "Exchange
//! Reconciliation"): for one symbol, read the exchange's order history and
//! backfill any order not matched by `exchange_order_id` in
//! `AuditTransaction`. Closes the window where the exchange accepted an
//! order but the local transaction rolled back.

use anyhow::Result;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use rg_audit::{AuditLog, NewMovement};
use rg_db::intent::TradingIntentRow;
use rg_execution::types::Side;
use rg_sizing::{calculate_technical_stop, TechnicalStopConfig};

use crate::engine::find_missing;
use crate::port::ExchangeHistoryPort;
use crate::types::{ExchangeOrderRecord, SweepReport};

fn side_label(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

fn movement_from_record(tenant_id: Uuid, rec: &ExchangeOrderRecord, operation_id: Option<Uuid>) -> NewMovement {
    NewMovement {
        movement_id: Uuid::new_v4(),
        tenant_id,
        exchange_order_id: Some(rec.exchange_order_id.clone()),
        transaction_type: "RECONCILED_FILL".to_string(),
        symbol: rec.symbol.clone(),
        asset: rec.asset.clone(),
        quantity: rec.quantity,
        price: rec.price,
        total_value: rec.price.map(|p| p * rec.quantity),
        fee: rec.fee,
        side: Some(side_label(rec.side).to_string()),
        leverage: None,
        is_margin: false,
        stop_price: None,
        operation_id,
        raw_exchange_response: None,
        source: "reconcile".to_string(),
        executed_at: rec.executed_at,
    }
}

/// Recreate the Operation a missing exchange fill left behind (spec §4.4:
/// "a reconciliation job reads exchange order ids written outside the
/// transaction and creates the missing Operation"). A bare exchange order
/// record carries no `intent_id` to attach to — unlike the LIVE execute path,
/// there was never a surviving TradingIntent on this engine's side of a
/// crash this deep — so this also backs the Operation with a synthetic
/// TradingIntent row (status EXECUTED, `execution_result.mode = "reconciled"`)
/// recording that provenance, the same way `commit_live_execution` pairs an
/// Operation with its originating intent.
///
/// Returns `Ok(None)` without writing anything if an Operation for this
/// `exchange_order_id` already exists (a prior sweep already recreated it)
/// or if the record has no fill price to derive a stop from.
async fn recreate_missing_operation(pool: &PgPool, tenant_id: Uuid, rec: &ExchangeOrderRecord) -> Result<Option<Uuid>> {
    if rg_db::operation::fetch_operation_by_entry_order_id(pool, &rec.exchange_order_id)
        .await?
        .is_some()
    {
        return Ok(None);
    }

    let Some(entry_price) = rec.price else {
        tracing::warn!(
            exchange_order_id = %rec.exchange_order_id,
            symbol = %rec.symbol,
            "reconciled fill has no price; cannot derive a stop, leaving it without an Operation",
        );
        return Ok(None);
    };

    // No candle history travels with a bare exchange order record, so this
    // falls through to the Technical Stop Calculator's percent-of-entry
    // fallback (§4.1 step 4) — the same floor it uses whenever chart history
    // is unavailable.
    let stop = calculate_technical_stop(&[], entry_price, rec.side, "unknown", &TechnicalStopConfig::default());
    let stop_distance = (entry_price - stop.stop_price).abs();
    let capital = entry_price * rec.quantity;
    let risk_amount = rec.quantity * stop_distance;
    let risk_percent = if capital > Decimal::ZERO {
        (risk_amount / capital) * Decimal::from(100)
    } else {
        Decimal::ZERO
    };

    let intent_id = Uuid::new_v4();
    let intent = TradingIntentRow {
        intent_id,
        tenant_id,
        symbol: rec.symbol.clone(),
        side: side_label(rec.side).to_string(),
        quantity: Some(rec.quantity),
        entry_price: Some(entry_price),
        stop_price: Some(stop.stop_price),
        target_price: None,
        capital: Some(capital),
        risk_amount: Some(risk_amount),
        risk_percent: Some(risk_percent),
        confidence: None,
        strategy: None,
        status: "EXECUTED".to_string(),
        validation_result: None,
        execution_result: Some(serde_json::json!({
            "mode": "reconciled",
            "exchange_order_id": rec.exchange_order_id,
        })),
        pattern_code: None,
        pattern_source: None,
        pattern_event_id: None,
        pattern_triggered_at: None,
        executed_at: Some(rec.executed_at),
    };
    rg_db::intent::insert_intent(pool, &intent).await?;

    let operation_id = Uuid::new_v4();
    rg_db::operation::insert_active_operation(
        pool,
        operation_id,
        tenant_id,
        intent_id,
        None,
        &rec.symbol,
        side_label(rec.side),
        &rec.exchange_order_id,
        stop.stop_price,
        None,
        rec.quantity,
    )
    .await?;

    tracing::warn!(
        exchange_order_id = %rec.exchange_order_id,
        operation_id = %operation_id,
        stop_price = %stop.stop_price,
        "reconciliation recreated a missing Operation for an exchange fill with no local record",
    );

    Ok(Some(operation_id))
}

/// Sweep one symbol: fetch the exchange's order history, diff it against
/// what `audit_transactions` already knows, recreate the missing Operation
/// for each gap, and append an `AuditLog` movement (hash-chained, same as
/// every other write path) linked back to it.
pub async fn sweep_symbol(
    pool: &PgPool,
    history_port: &dyn ExchangeHistoryPort,
    tenant_id: Uuid,
    symbol: &str,
) -> Result<SweepReport> {
    let known = rg_db::audit::known_exchange_order_ids(pool, tenant_id, symbol).await?;
    let history = history_port
        .order_history(symbol)
        .await
        .map_err(|e| anyhow::anyhow!("order_history({symbol}) failed: {e}"))?;

    let missing = find_missing(&known, &history);

    let mut audit_log = AuditLog::load(pool.clone(), tenant_id, true).await?;
    let mut backfilled = Vec::new();
    let mut recreated_operations = Vec::new();
    for rec in &missing {
        let operation_id = recreate_missing_operation(pool, tenant_id, rec).await?;
        if let Some(operation_id) = operation_id {
            recreated_operations.push(operation_id);
        }

        let movement = movement_from_record(tenant_id, rec, operation_id);
        let movement_id = movement.movement_id;
        if audit_log.record(movement).await? {
            backfilled.push(movement_id);
        }
    }

    Ok(SweepReport {
        symbol: symbol.to_string(),
        scanned: history.len(),
        missing,
        backfilled,
        recreated_operations,
    })
}

/// Sweep every symbol in `symbols` for one tenant, one at a time — the
/// periodic job's entry point. Each symbol's sweep is independent; one
/// failing does not abort the rest.
pub async fn sweep_all(
    pool: &PgPool,
    history_port: &dyn ExchangeHistoryPort,
    tenant_id: Uuid,
    symbols: &[String],
) -> Vec<Result<SweepReport>> {
    let mut reports = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        reports.push(sweep_symbol(pool, history_port, tenant_id, symbol).await);
    }
    reports
}
