//! EXECUTE phase (§4.4): DryRun always simulates; Live places a real order
//! and then atomically commits the Operation + AuditTransaction + EXECUTED
//! status through `rg_db::lifecycle::commit_live_execution`. Pattern-
//! triggered intents are hard-blocked from LIVE execution in this MVP —
//! only dry-run is allowed for them until an automated strategy has earned
//! enough track record to be trusted with LIVE quantity.

use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use rg_db::audit::NewAuditTransaction;
use rg_db::intent::TradingIntentRow;
use rg_db::lifecycle::{commit_live_execution, NewOperationInCommit};
use rg_execution::{ExchangeError, ExecutionPort, Side};
use rg_schemas::stable_hash;

use crate::types::{ExecutionMode, IntentError};

fn parse_side(raw: &str) -> Result<Side, IntentError> {
    match raw {
        "BUY" => Ok(Side::Buy),
        "SELL" => Ok(Side::Sell),
        other => Err(IntentError::Validation(vec![format!("unknown side {other}")])),
    }
}

/// Derives the base asset from a symbol of the form `BASEQUOTE` (e.g.
/// `BTCUSDT` -> `BTC`) by stripping the longest quote suffix this engine
/// trades against.
fn base_asset(symbol: &str) -> String {
    const QUOTE_SUFFIXES: [&str; 4] = ["USDT", "BUSD", "BTC", "USD"];
    for quote in QUOTE_SUFFIXES {
        if let Some(base) = symbol.strip_suffix(quote) {
            if !base.is_empty() {
                return base.to_string();
            }
        }
    }
    symbol.to_string()
}

pub async fn execute(
    pool: &PgPool,
    execution_port: &dyn ExecutionPort,
    intent_id: Uuid,
    mode: ExecutionMode,
    live_acknowledged: bool,
    nonce: u64,
) -> Result<TradingIntentRow, IntentError> {
    let intent = rg_db::intent::fetch_intent(pool, intent_id).await?;
    if intent.status != "VALIDATED" {
        return Err(IntentError::Conflict {
            from: intent.status,
            attempted: "EXECUTE".to_string(),
        });
    }

    match mode {
        ExecutionMode::DryRun => {
            let result = json!({
                "mode": "dry_run",
                "simulated": true,
                "symbol": intent.symbol,
                "side": intent.side,
                "quantity": intent.quantity,
                "entry_price": intent.entry_price,
            });
            rg_db::intent::record_execution(pool, intent_id, result).await?;
            rg_db::intent::fetch_intent(pool, intent_id).await.map_err(Into::into)
        }
        ExecutionMode::Live => {
            if intent.pattern_event_id.is_some() {
                return Err(IntentError::PatternLiveBlocked);
            }
            if !live_acknowledged {
                return Err(IntentError::Validation(vec![
                    "LIVE execution requires an explicit acknowledgement".to_string(),
                ]));
            }

            // Fast path only: skips a redundant exchange call when a prior
            // attempt's Operation is already visible. This is check-then-act
            // and does not by itself prevent two concurrent EXECUTE calls
            // from both placing an order — the real guarantee is the unique
            // index on operations(intent_id) that commit_live_execution
            // below inserts against.
            if rg_db::operation::fetch_operation_by_intent(pool, intent_id).await?.is_some() {
                return rg_db::intent::fetch_intent(pool, intent_id).await.map_err(Into::into);
            }

            let quantity = intent
                .quantity
                .ok_or_else(|| IntentError::Derivation("validated intent is missing quantity".to_string()))?;
            let side = parse_side(&intent.side)?;
            let idempotency_key = stable_hash(&[&intent_id.to_string(), "execute", &nonce.to_string()]);

            let placed = execution_port
                .place_market(&intent.symbol, side, quantity, Some(&idempotency_key))
                .await;

            match placed {
                Ok(order) => {
                    let operation_id = Uuid::new_v4();
                    let movement_id = Uuid::new_v4();
                    let fill_price = order.average_fill_price();
                    let total_value = fill_price.map(|p| p * quantity);
                    let fee: Decimal = order.fills.iter().map(|f| f.commission).sum();

                    let operation = NewOperationInCommit {
                        operation_id,
                        tenant_id: intent.tenant_id,
                        intent_id,
                        strategy: intent.strategy.clone(),
                        symbol: intent.symbol.clone(),
                        side: intent.side.clone(),
                        entry_order_id: order.order_id.clone(),
                        stop_price: intent.stop_price.unwrap_or(Decimal::ZERO),
                        target_price: intent.target_price,
                        quantity,
                    };

                    let transaction_type = match side {
                        Side::Buy => "SPOT_BUY",
                        Side::Sell => "SPOT_SELL",
                    };

                    let movement = NewAuditTransaction {
                        movement_id,
                        tenant_id: intent.tenant_id,
                        exchange_order_id: Some(order.order_id.clone()),
                        transaction_type: transaction_type.to_string(),
                        symbol: intent.symbol.clone(),
                        asset: base_asset(&intent.symbol),
                        quantity,
                        price: fill_price,
                        total_value,
                        fee,
                        side: Some(intent.side.clone()),
                        leverage: None,
                        is_margin: false,
                        stop_price: intent.stop_price,
                        operation_id: Some(operation_id),
                        raw_exchange_response: serde_json::to_value(&order).ok(),
                        source: "engine".to_string(),
                        executed_at: chrono::Utc::now(),
                        hash_prev: None,
                        hash_self: None,
                    };

                    let execution_result = json!({
                        "mode": "live",
                        "order_id": order.order_id,
                        "status": order.status,
                        "fill_price": fill_price,
                        "operation_id": operation_id,
                    });

                    let won = commit_live_execution(pool, &operation, &movement, intent_id, execution_result).await?;
                    if !won {
                        // A concurrent EXECUTE for this intent committed first. This
                        // call's exchange order is now orphaned from this engine's
                        // bookkeeping; the reconciliation sweep (`rg-reconcile`) picks
                        // it up via `order.order_id` against the exchange's order log.
                        tracing::warn!(
                            intent_id = %intent_id,
                            order_id = %order.order_id,
                            "lost the exactly-once race for this intent; a concurrent EXECUTE already committed",
                        );
                    }
                    rg_db::intent::fetch_intent(pool, intent_id).await.map_err(Into::into)
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    let result = json!({
                        "mode": "live",
                        "error": e.to_string(),
                        "retryable": retryable,
                    });
                    rg_db::intent::record_failure(pool, intent_id, result).await?;
                    Err(map_exchange_error(e))
                }
            }
        }
    }
}

fn map_exchange_error(e: ExchangeError) -> IntentError {
    IntentError::Exchange(e)
}
