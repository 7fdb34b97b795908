//! Event-sourced Stop Monitor (C8, §4.5): guards, trigger evaluation,
//! exactly-once submission, and post-submission bookkeeping (slippage,
//! circuit breaker, automatic kill switch). Every write path appends a
//! [`rg_db::stopmon::NewStopEvent`] and an Outbox row in the same
//! transaction — the event log is the ground truth; [`rg_db::stopmon`]'s
//! projection upsert is a deterministic fold over it (I5).

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use rg_config::tenant::TenantConfig;
use rg_db::stopmon::NewStopEvent;
use rg_execution::{ExecutionPort, Side};

use crate::types::{execution_token, is_triggered, PriceSource, StopMonitorError, StopWatch};

/// The outcome of one `evaluate_and_execute` tick for one [`StopWatch`].
#[derive(Debug)]
pub enum StopOutcome {
    /// Price has not crossed the stop; nothing happened.
    NotTriggered,
    /// A guard aborted before any execution attempt (§4.5 "Guards").
    Blocked { event_type: &'static str, reason: String },
    /// Another worker already claimed this execution_token (§4.5
    /// "Submission" exactly-once race).
    AlreadyClaimed { execution_token: String },
    /// This call won the race, submitted, and the exchange accepted it.
    Executed {
        exchange_order_id: String,
        fill_price: Decimal,
        slippage_pct: Decimal,
        slippage_breach: bool,
        kill_switch_engaged: bool,
    },
    /// This call won the race but the exchange submission failed.
    Failed { error: String, retryable: bool },
}

fn routing_key(event_type: &str, tenant_id: Uuid, symbol: &str) -> String {
    format!("stop.{}.{}.{}", event_type.to_lowercase(), tenant_id, symbol)
}

async fn append_and_publish(
    pool: &PgPool,
    ev: NewStopEvent,
) -> Result<rg_db::stopmon::StopEventRow, StopMonitorError> {
    let tenant_id = ev.tenant_id;
    let symbol = ev.symbol.clone();
    let event_type = ev.event_type.clone();
    let (mut tx, row) = rg_db::stopmon::append_event(pool, &ev).await?;

    let payload = json!({
        "event_id": row.event_id,
        "event_seq": row.event_seq,
        "operation_id": row.operation_id,
        "event_type": row.event_type,
        "execution_token": row.execution_token,
    });
    rg_db::outbox::enqueue_in_tx(
        &mut tx,
        tenant_id,
        row.event_id,
        &routing_key(&event_type, tenant_id, &symbol),
        "stopmon",
        payload,
    )
    .await?;

    tx.commit().await.map_err(|e| StopMonitorError::Db(e.to_string()))?;
    Ok(row)
}

#[allow(clippy::too_many_arguments)]
async fn blocked_event(
    pool: &PgPool,
    watch: &StopWatch,
    token: &str,
    trigger_price: Decimal,
    event_type: &'static str,
    source: PriceSource,
    message: &str,
) -> Result<(), StopMonitorError> {
    let ev = NewStopEvent {
        event_id: Uuid::new_v4(),
        operation_id: watch.operation_id,
        tenant_id: watch.tenant_id,
        symbol: watch.symbol.clone(),
        event_type: event_type.to_string(),
        trigger_price: Some(trigger_price),
        stop_price: watch.stop_price,
        quantity: watch.quantity,
        side: watch.side.closing_side_str(),
        execution_token: token.to_string(),
        payload: None,
        exchange_order_id: None,
        fill_price: None,
        slippage_pct: None,
        source: source.as_str().to_string(),
        error_message: Some(message.to_string()),
        retry_count: 0,
    };
    append_and_publish(pool, ev).await?;
    warn!(operation_id = %watch.operation_id, symbol = %watch.symbol, event_type, message, "stop monitor guard aborted");
    Ok(())
}

/// Private extension so `StopWatch::side` (a [`rg_schemas::PositionSide`])
/// can render the closing order side without importing `rg_execution::Side`
/// at every call site.
trait ClosingSideStr {
    fn closing_side_str(&self) -> String;
}

impl ClosingSideStr for rg_schemas::PositionSide {
    fn closing_side_str(&self) -> String {
        match self.closing_side() {
            Side::Buy => "BUY".to_string(),
            Side::Sell => "SELL".to_string(),
        }
    }
}

/// One evaluation tick for one watched Operation (§4.5 "Trigger
/// evaluation" through "Post-submission"). `breaker` and `tenant_cfg` are
/// read fresh by the caller before each call so the guards always see
/// current state; this function performs the writes the guards and the
/// submission path require.
#[allow(clippy::too_many_arguments)]
pub async fn evaluate_and_execute(
    pool: &PgPool,
    execution_port: &dyn ExecutionPort,
    watch: &StopWatch,
    current_price: Decimal,
    price_age_secs: i64,
    source: PriceSource,
    tenant_cfg: &TenantConfig,
    breaker: &rg_db::tenant::CircuitBreakerRow,
) -> Result<StopOutcome, StopMonitorError> {
    if !is_triggered(watch.side, current_price, watch.stop_price) {
        return Ok(StopOutcome::NotTriggered);
    }

    let token = execution_token(watch.operation_id, watch.stop_price, watch.side);

    // Guard 1: stale price.
    if price_age_secs > tenant_cfg.max_data_age_secs {
        let msg = format!(
            "price age {price_age_secs}s exceeds max {}s",
            tenant_cfg.max_data_age_secs
        );
        blocked_event(pool, watch, &token, current_price, "STALE_PRICE", source, &msg).await?;
        return Ok(StopOutcome::Blocked {
            event_type: "STALE_PRICE",
            reason: msg,
        });
    }

    // Guard 2: kill switch.
    if !tenant_cfg.trading_enabled {
        let msg = format!("kill switch engaged for tenant {}", tenant_cfg.tenant_id);
        blocked_event(pool, watch, &token, current_price, "KILL_SWITCH", source, &msg).await?;
        return Ok(StopOutcome::Blocked {
            event_type: "KILL_SWITCH",
            reason: msg,
        });
    }

    // Guard 3: circuit breaker.
    let now = Utc::now();
    let mut half_open_attempt = false;
    if breaker.state == "OPEN" {
        let retry_at = breaker.will_retry_at.unwrap_or(now);
        if now < retry_at {
            let msg = format!("circuit open for {}, retries at {retry_at}", watch.symbol);
            blocked_event(pool, watch, &token, current_price, "CIRCUIT_BREAKER", source, &msg).await?;
            return Ok(StopOutcome::Blocked {
                event_type: "CIRCUIT_BREAKER",
                reason: msg,
            });
        }
        rg_db::tenant::transition_circuit_breaker_half_open(pool, &watch.symbol).await?;
        half_open_attempt = true;
    }

    // Append STOP_TRIGGERED unconditionally: both feeders racing to this
    // point each record that they observed the crossing (§4.5).
    let triggered_ev = NewStopEvent {
        event_id: Uuid::new_v4(),
        operation_id: watch.operation_id,
        tenant_id: watch.tenant_id,
        symbol: watch.symbol.clone(),
        event_type: "STOP_TRIGGERED".to_string(),
        trigger_price: Some(current_price),
        stop_price: watch.stop_price,
        quantity: watch.quantity,
        side: watch.side.closing_side_str(),
        execution_token: token.clone(),
        payload: None,
        exchange_order_id: None,
        fill_price: None,
        slippage_pct: None,
        source: source.as_str().to_string(),
        error_message: None,
        retry_count: 0,
    };
    append_and_publish(pool, triggered_ev).await?;

    // Exactly-once claim (I7): the insert's `on conflict do nothing` is the
    // real race resolution; every caller past this point already won.
    let mut tx = pool.begin().await.map_err(|e| StopMonitorError::Db(e.to_string()))?;
    let claimed = rg_db::stopmon::claim_execution(
        &mut tx,
        Uuid::new_v4(),
        watch.operation_id,
        &token,
        watch.stop_price,
        Some(current_price),
        watch.quantity,
        &watch.side.closing_side_str(),
        source.as_str(),
    )
    .await?;
    tx.commit().await.map_err(|e| StopMonitorError::Db(e.to_string()))?;

    let Some(_execution_row) = claimed else {
        info!(operation_id = %watch.operation_id, %token, "stop execution already claimed by another worker");
        return Ok(StopOutcome::AlreadyClaimed { execution_token: token });
    };

    let submitted_ev = NewStopEvent {
        event_id: Uuid::new_v4(),
        operation_id: watch.operation_id,
        tenant_id: watch.tenant_id,
        symbol: watch.symbol.clone(),
        event_type: "EXECUTION_SUBMITTED".to_string(),
        trigger_price: Some(current_price),
        stop_price: watch.stop_price,
        quantity: watch.quantity,
        side: watch.side.closing_side_str(),
        execution_token: token.clone(),
        payload: None,
        exchange_order_id: None,
        fill_price: None,
        slippage_pct: None,
        source: source.as_str().to_string(),
        error_message: None,
        retry_count: 0,
    };
    append_and_publish(pool, submitted_ev).await?;

    let placed = execution_port
        .place_market(&watch.symbol, watch.side.closing_side(), watch.quantity, Some(&token))
        .await;

    match placed {
        Ok(order) => {
            let fill_price = order.average_fill_price().unwrap_or(watch.stop_price);
            let slippage_pct = if watch.stop_price.is_zero() {
                Decimal::ZERO
            } else {
                (fill_price - watch.stop_price).abs() / watch.stop_price * dec!(100)
            };
            let slippage_breach = slippage_pct > tenant_cfg.max_slippage_pct;
            let kill_switch_engaged = slippage_pct > tenant_cfg.slippage_pause_threshold_pct;

            let mut tx = pool.begin().await.map_err(|e| StopMonitorError::Db(e.to_string()))?;
            rg_db::stopmon::upsert_projection(
                &mut tx,
                Uuid::new_v4(),
                watch.operation_id,
                &token,
                "EXECUTED",
                watch.stop_price,
                Some(current_price),
                watch.quantity,
                &watch.side.closing_side_str(),
                Some(&order.order_id),
                Some(fill_price),
                Some(slippage_pct),
                source.as_str(),
                None,
            )
            .await?;
            tx.commit().await.map_err(|e| StopMonitorError::Db(e.to_string()))?;

            let executed_ev = NewStopEvent {
                event_id: Uuid::new_v4(),
                operation_id: watch.operation_id,
                tenant_id: watch.tenant_id,
                symbol: watch.symbol.clone(),
                event_type: "EXECUTED".to_string(),
                trigger_price: Some(current_price),
                stop_price: watch.stop_price,
                quantity: watch.quantity,
                side: watch.side.closing_side_str(),
                execution_token: token.clone(),
                payload: None,
                exchange_order_id: Some(order.order_id.clone()),
                fill_price: Some(fill_price),
                slippage_pct: Some(slippage_pct),
                source: source.as_str().to_string(),
                error_message: None,
                retry_count: 0,
            };
            append_and_publish(pool, executed_ev).await?;

            if slippage_breach {
                let breach_ev = NewStopEvent {
                    event_id: Uuid::new_v4(),
                    operation_id: watch.operation_id,
                    tenant_id: watch.tenant_id,
                    symbol: watch.symbol.clone(),
                    event_type: "SLIPPAGE_BREACH".to_string(),
                    trigger_price: Some(current_price),
                    stop_price: watch.stop_price,
                    quantity: watch.quantity,
                    side: watch.side.closing_side_str(),
                    execution_token: token.clone(),
                    payload: None,
                    exchange_order_id: Some(order.order_id.clone()),
                    fill_price: Some(fill_price),
                    slippage_pct: Some(slippage_pct),
                    source: source.as_str().to_string(),
                    error_message: None,
                    retry_count: 0,
                };
                append_and_publish(pool, breach_ev).await?;
            }

            if kill_switch_engaged {
                rg_db::tenant::set_trading_enabled(pool, watch.tenant_id, false).await?;
                let kill_ev = NewStopEvent {
                    event_id: Uuid::new_v4(),
                    operation_id: watch.operation_id,
                    tenant_id: watch.tenant_id,
                    symbol: watch.symbol.clone(),
                    event_type: "KILL_SWITCH".to_string(),
                    trigger_price: Some(current_price),
                    stop_price: watch.stop_price,
                    quantity: watch.quantity,
                    side: watch.side.closing_side_str(),
                    execution_token: token.clone(),
                    payload: None,
                    exchange_order_id: Some(order.order_id.clone()),
                    fill_price: Some(fill_price),
                    slippage_pct: Some(slippage_pct),
                    source: source.as_str().to_string(),
                    error_message: Some("automatic kill switch: slippage above pause threshold".to_string()),
                    retry_count: 0,
                };
                append_and_publish(pool, kill_ev).await?;
                warn!(tenant_id = %watch.tenant_id, %slippage_pct, "automatic kill switch engaged on slippage breach");
            }

            rg_db::operation::close_operation(pool, watch.operation_id, watch.quantity, fill_price).await?;

            if half_open_attempt {
                rg_db::tenant::reset_circuit_breaker(pool, &watch.symbol).await?;
            }

            Ok(StopOutcome::Executed {
                exchange_order_id: order.order_id,
                fill_price,
                slippage_pct,
                slippage_breach,
                kill_switch_engaged,
            })
        }
        Err(e) => {
            let retryable = e.is_retryable();
            let mut tx = pool.begin().await.map_err(|e| StopMonitorError::Db(e.to_string()))?;
            rg_db::stopmon::upsert_projection(
                &mut tx,
                Uuid::new_v4(),
                watch.operation_id,
                &token,
                "FAILED",
                watch.stop_price,
                Some(current_price),
                watch.quantity,
                &watch.side.closing_side_str(),
                None,
                None,
                None,
                source.as_str(),
                Some(&e.to_string()),
            )
            .await?;
            tx.commit().await.map_err(|e| StopMonitorError::Db(e.to_string()))?;

            let failed_ev = NewStopEvent {
                event_id: Uuid::new_v4(),
                operation_id: watch.operation_id,
                tenant_id: watch.tenant_id,
                symbol: watch.symbol.clone(),
                event_type: "FAILED".to_string(),
                trigger_price: Some(current_price),
                stop_price: watch.stop_price,
                quantity: watch.quantity,
                side: watch.side.closing_side_str(),
                execution_token: token.clone(),
                payload: None,
                exchange_order_id: None,
                fill_price: None,
                slippage_pct: None,
                source: source.as_str().to_string(),
                error_message: Some(e.to_string()),
                retry_count: 0,
            };
            append_and_publish(pool, failed_ev).await?;

            if half_open_attempt {
                rg_db::tenant::reopen_circuit_breaker(
                    pool,
                    &watch.symbol,
                    tenant_cfg.circuit_breaker_retry_delay_secs,
                )
                .await?;
            } else {
                rg_db::tenant::record_circuit_breaker_failure(pool, &watch.symbol).await?;
            }

            Ok(StopOutcome::Failed {
                error: e.to_string(),
                retryable,
            })
        }
    }
}
