//! PLAN phase (§4.4): take a caller-supplied subset of intent fields,
//! deriving whatever was left unset, and persist a PENDING TradingIntent.
//! The two derivations ladder into each other — a derived stop price feeds
//! the Position Sizer's Golden Rule exactly as a caller-supplied one would.

use chrono::Utc;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use uuid::Uuid;

use rg_db::intent::TradingIntentRow;
use rg_execution::MarketDataPort;
use rg_schemas::Money;
use rg_sizing::sizer::{size_position, SizingConfig};
use rg_sizing::technical_stop::calculate_technical_stop;
use rg_sizing::types::TechnicalStopConfig;

use crate::types::{IntentError, PlanInput};

const DEFAULT_RISK_PERCENT_FRACTION: Money = dec!(0.01);
const TECHNICAL_STOP_CANDLE_LOOKBACK: usize = 200;

pub async fn plan(
    pool: &PgPool,
    market_data: &dyn MarketDataPort,
    tenant_id: Uuid,
    tenant_capital: Money,
    input: PlanInput,
) -> Result<TradingIntentRow, IntentError> {
    let side = input
        .side
        .ok_or_else(|| IntentError::Validation(vec!["side is required".to_string()]))?;
    let entry_price = input
        .entry_price
        .ok_or_else(|| IntentError::Validation(vec!["entry_price is required".to_string()]))?;

    let capital = input.capital.unwrap_or(tenant_capital);
    let risk_percent_fraction = input
        .risk_percent
        .map(|p| p / dec!(100))
        .unwrap_or(DEFAULT_RISK_PERCENT_FRACTION);

    let stop_price = match input.stop_price {
        Some(stop) => stop,
        None => {
            let candles = market_data
                .klines(&input.symbol, &input.timeframe, TECHNICAL_STOP_CANDLE_LOOKBACK)
                .await
                .map_err(|e| IntentError::Derivation(format!("klines fetch failed: {e}")))?;
            let result = calculate_technical_stop(
                &candles,
                entry_price,
                side,
                &input.timeframe,
                &TechnicalStopConfig::default(),
            );
            result.stop_price
        }
    };

    let (quantity, risk_amount, risk_percent) = match input.quantity {
        Some(qty) => {
            let risk_amount = qty * (entry_price - stop_price).abs();
            let risk_percent = if capital > Money::ZERO {
                (risk_amount / capital) * dec!(100)
            } else {
                Money::ZERO
            };
            (qty, risk_amount, risk_percent)
        }
        None => {
            let sized = size_position(
                capital,
                entry_price,
                stop_price,
                input.target_price,
                side,
                risk_percent_fraction,
                &SizingConfig::default(),
            )
            .map_err(|e| IntentError::Derivation(e.to_string()))?;
            (sized.quantity, sized.risk_amount, sized.risk_percent)
        }
    };

    let row = TradingIntentRow {
        intent_id: Uuid::new_v4(),
        tenant_id,
        symbol: input.symbol,
        side: side.to_string(),
        quantity: Some(quantity),
        entry_price: Some(entry_price),
        stop_price: Some(stop_price),
        target_price: input.target_price,
        capital: Some(capital),
        risk_amount: Some(risk_amount),
        risk_percent: Some(risk_percent),
        confidence: input.confidence,
        strategy: input.strategy,
        status: "PENDING".to_string(),
        validation_result: None,
        execution_result: None,
        pattern_code: input.pattern_code,
        pattern_source: input.pattern_source,
        pattern_event_id: input.pattern_event_id,
        pattern_triggered_at: input.pattern_event_id.map(|_| Utc::now()),
        executed_at: None,
    };

    rg_db::intent::insert_intent(pool, &row).await?;
    Ok(row)
}
