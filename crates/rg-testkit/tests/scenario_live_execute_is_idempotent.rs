use chrono::Utc;
use rust_decimal_macros::dec;
use uuid::Uuid;

use rg_execution::{PaperExchange, PaperMarketData};
use rg_gate::GateContext;
use rg_intent::types::{ExecutionMode, PlanInput, Side};
use rg_intent::validate::RiskGuardContext;
use rg_testkit::{db_pool, force_intent_status, random_symbol};

/// I4: a retried LIVE execute against an intent that already produced an
/// Operation must not submit a second order. This models the window
/// `execute()`'s own doc comment names: a caller re-entering EXECUTE before
/// the prior attempt's EXECUTED status update is visible to it.
#[tokio::test]
async fn retried_live_execute_does_not_double_submit() -> anyhow::Result<()> {
    let Some(pool) = db_pool().await else { return Ok(()) };

    let tenant_id = Uuid::new_v4();
    let symbol = random_symbol("BTCUSDT");
    let market_data = PaperMarketData::new();
    let execution_port = PaperExchange::new();
    execution_port.set_fill_price(&symbol, dec!(60000));

    let input = PlanInput {
        symbol: symbol.clone(),
        timeframe: "1h".to_string(),
        side: Some(Side::Buy),
        entry_price: Some(dec!(60000)),
        stop_price: Some(dec!(59000)),
        target_price: Some(dec!(63000)),
        capital: Some(dec!(10000)),
        quantity: Some(dec!(0.1)),
        risk_percent: None,
        confidence: None,
        strategy: Some("breakout".to_string()),
        pattern_code: None,
        pattern_source: None,
        pattern_event_id: None,
    };

    let planned = rg_intent::plan(&pool, &market_data, tenant_id, dec!(10000), input).await?;

    let gate_ctx = GateContext {
        tenant_id,
        symbol: symbol.clone(),
        now: Utc::now(),
        monthly_pnl: rust_decimal::Decimal::ZERO,
        capital: dec!(10000),
        active_position_count: 0,
        cooldown_enabled: false,
        stop_out_cooldown_secs: 900,
        latest_stop_out: None,
        funding_enabled: false,
        funding_rate: None,
        funding_rate_threshold: dec!(0.0001),
        data_freshness_enabled: false,
        data_age_secs: None,
        max_data_age_secs: 300,
    };
    let risk_ctx = RiskGuardContext {
        monthly_pnl: rust_decimal::Decimal::ZERO,
        trade_confirmed: true,
    };

    let validated = rg_intent::validate(&pool, &gate_ctx, ExecutionMode::Live, &risk_ctx, planned.intent_id).await?;
    assert_eq!(validated.status, "VALIDATED");

    let executed = rg_intent::execute(&pool, &execution_port, validated.intent_id, ExecutionMode::Live, true, 0).await?;
    assert_eq!(executed.status, "EXECUTED");
    assert_eq!(execution_port.submit_count(), 1);

    let operation_after_first = rg_db::operation::fetch_operation_by_intent(&pool, planned.intent_id)
        .await?
        .expect("operation created on first execute");

    // Simulate a retried caller that still sees VALIDATED (its view of the
    // first attempt's EXECUTED transition hasn't landed yet).
    force_intent_status(&pool, planned.intent_id, "VALIDATED").await?;

    let retried = rg_intent::execute(&pool, &execution_port, planned.intent_id, ExecutionMode::Live, true, 1).await?;

    assert_eq!(execution_port.submit_count(), 1, "retry must not reach the exchange again");
    let operation_after_retry = rg_db::operation::fetch_operation_by_intent(&pool, planned.intent_id)
        .await?
        .expect("operation still present");
    assert_eq!(operation_after_first.operation_id, operation_after_retry.operation_id);
    assert_eq!(retried.intent_id, planned.intent_id);
    Ok(())
}
