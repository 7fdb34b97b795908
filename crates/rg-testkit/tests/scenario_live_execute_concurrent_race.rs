use chrono::Utc;
use rust_decimal_macros::dec;
use uuid::Uuid;

use rg_db::audit::NewAuditTransaction;
use rg_db::lifecycle::{commit_live_execution, NewOperationInCommit};
use rg_execution::{PaperExchange, PaperMarketData};
use rg_gate::GateContext;
use rg_intent::types::{ExecutionMode, PlanInput, Side};
use rg_intent::validate::RiskGuardContext;
use rg_testkit::{db_pool, random_symbol};

/// I4: two genuinely concurrent commits racing to create the Operation for
/// the same intent (the scenario two simultaneous EXECUTE calls produce,
/// each already holding a confirmed exchange order) must leave exactly one
/// Operation behind. Unlike the sequential retry scenario, this drives both
/// writers through `tokio::join!` so they interleave for real rather than
/// simulating a retry via a status rewind.
#[tokio::test]
async fn concurrent_commits_for_same_intent_only_one_wins() -> anyhow::Result<()> {
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
    let intent_id = validated.intent_id;

    // Two writers, as if two exchange orders for the same intent had both
    // already been confirmed by the exchange and were now racing to commit.
    let build_commit = |suffix: &str| {
        let operation_id = Uuid::new_v4();
        let movement_id = Uuid::new_v4();
        let order_id = format!("race-order-{suffix}");
        let operation = NewOperationInCommit {
            operation_id,
            tenant_id,
            intent_id,
            strategy: Some("breakout".to_string()),
            symbol: symbol.clone(),
            side: "BUY".to_string(),
            entry_order_id: order_id.clone(),
            stop_price: dec!(59000),
            target_price: Some(dec!(63000)),
            quantity: dec!(0.1),
        };
        let movement = NewAuditTransaction {
            movement_id,
            tenant_id,
            exchange_order_id: Some(order_id),
            transaction_type: "SPOT_BUY".to_string(),
            symbol: symbol.clone(),
            asset: "BTC".to_string(),
            quantity: dec!(0.1),
            price: Some(dec!(60000)),
            total_value: Some(dec!(6000)),
            fee: dec!(0),
            side: Some("BUY".to_string()),
            leverage: None,
            is_margin: false,
            stop_price: Some(dec!(59000)),
            operation_id: Some(operation_id),
            raw_exchange_response: None,
            source: "engine".to_string(),
            executed_at: Utc::now(),
            hash_prev: None,
            hash_self: None,
        };
        (operation, movement)
    };

    let (op_a, mv_a) = build_commit("a");
    let (op_b, mv_b) = build_commit("b");

    let result_a = json_execution_result("a");
    let result_b = json_execution_result("b");

    let (won_a, won_b) = tokio::join!(
        commit_live_execution(&pool, &op_a, &mv_a, intent_id, result_a),
        commit_live_execution(&pool, &op_b, &mv_b, intent_id, result_b),
    );
    let won_a = won_a?;
    let won_b = won_b?;

    assert_ne!(won_a, won_b, "exactly one concurrent commit must win the race");

    let operations = sqlx::query_scalar::<_, i64>("select count(*) from operations where intent_id = $1")
        .bind(intent_id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(operations, 1, "only one Operation may exist per intent");

    let intent_after = rg_db::intent::fetch_intent(&pool, intent_id).await?;
    assert_eq!(intent_after.status, "EXECUTED");

    Ok(())
}

fn json_execution_result(suffix: &str) -> serde_json::Value {
    serde_json::json!({ "mode": "live", "race": suffix })
}
