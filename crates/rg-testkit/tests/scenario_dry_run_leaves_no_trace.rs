use std::sync::Arc;

use rust_decimal_macros::dec;
use uuid::Uuid;

use rg_config::tenant::TenantConfig;
use rg_execution::{PaperExchange, PaperMarketData};
use rg_intent::types::{ExecutionMode, PlanInput, Side};
use rg_orchestrator::Orchestrator;
use rg_testkit::{confirmed_risk_ctx, db_pool, passing_gate_ctx, random_symbol};

/// I3: a DryRun execution never creates an Operation or an
/// AuditTransaction, regardless of whether VALIDATE passed. Dry-run is a
/// pure simulation of what EXECUTE would have done.
#[tokio::test]
async fn dry_run_execution_creates_no_operation_or_movement() -> anyhow::Result<()> {
    let Some(pool) = db_pool().await else { return Ok(()) };

    let tenant_id = Uuid::new_v4();
    let symbol = random_symbol("BTCUSDT");
    let market_data = Arc::new(PaperMarketData::new());
    let execution_port = Arc::new(PaperExchange::new());
    let orchestrator = Orchestrator::new(
        pool.clone(),
        market_data.clone() as Arc<dyn rg_execution::MarketDataPort>,
        execution_port.clone() as Arc<dyn rg_execution::ExecutionPort>,
    );

    let tenant_cfg = TenantConfig::defaults(tenant_id);
    let gate_ctx = passing_gate_ctx(tenant_id, &symbol);
    let risk_ctx = confirmed_risk_ctx();

    let input = PlanInput {
        symbol: symbol.clone(),
        timeframe: "1h".to_string(),
        side: Some(Side::Buy),
        entry_price: Some(dec!(60000)),
        stop_price: Some(dec!(59000)),
        target_price: Some(dec!(63000)),
        capital: Some(dec!(10000)),
        quantity: None,
        risk_percent: Some(dec!(1.0)),
        confidence: None,
        strategy: Some("breakout".to_string()),
        pattern_code: None,
        pattern_source: None,
        pattern_event_id: None,
    };

    let result = orchestrator
        .submit_intent(
            tenant_id,
            dec!(10000),
            &tenant_cfg,
            input,
            ExecutionMode::DryRun,
            &gate_ctx,
            &risk_ctx,
        )
        .await?;

    assert_eq!(result.status, "EXECUTED");
    assert!(result.execution_result.is_some());

    let operation = rg_db::operation::fetch_operation_by_intent(&pool, result.intent_id).await?;
    assert!(operation.is_none(), "dry-run must not create an Operation");

    assert_eq!(execution_port.submit_count(), 0, "dry-run must never reach the exchange");

    let known = rg_db::audit::known_exchange_order_ids(&pool, tenant_id, &symbol).await?;
    assert!(known.is_empty(), "dry-run must not create an AuditTransaction");
    Ok(())
}
