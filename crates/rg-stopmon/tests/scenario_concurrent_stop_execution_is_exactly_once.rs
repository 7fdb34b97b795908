use rust_decimal_macros::dec;
use uuid::Uuid;

use rg_execution::PaperExchange;
use rg_schemas::PositionSide;
use rg_stopmon::{evaluate_and_execute, PriceSource, StopWatch};

async fn db_pool() -> Option<sqlx::PgPool> {
    match std::env::var(rg_db::ENV_DB_URL) {
        Ok(_) => Some(rg_db::testkit_db_pool().await.expect("testkit db pool")),
        Err(_) => {
            eprintln!("SKIP: {} not set", rg_db::ENV_DB_URL);
            None
        }
    }
}

/// I7 / §8 scenario 5: two workers (the WS feeder and the backstop poller)
/// observe the same crossing and both call `evaluate_and_execute` for the
/// same operation. Exactly one of them must submit to the exchange.
#[tokio::test]
async fn two_concurrent_callers_submit_exactly_once() -> anyhow::Result<()> {
    let Some(pool) = db_pool().await else { return Ok(()) };

    let tenant_id = Uuid::new_v4();
    rg_db::tenant::upsert_tenant_config(
        &pool,
        &rg_db::tenant::TenantConfigRow {
            tenant_id,
            trading_enabled: true,
            capital: dec!(10000),
            stop_out_cooldown_secs: 900,
            max_data_age_secs: 300,
            funding_rate_threshold: dec!(0.0001),
            max_slippage_pct: dec!(0.05),
            slippage_pause_threshold_pct: dec!(0.10),
            max_executions_per_minute: 10,
            max_executions_per_hour: 100,
            circuit_breaker_failure_threshold: 3,
            circuit_breaker_retry_delay_secs: 300,
        },
    )
    .await?;
    let cfg = rg_config::tenant::TenantConfig {
        tenant_id,
        trading_enabled: true,
        stop_out_cooldown_secs: 900,
        max_data_age_secs: 300,
        funding_rate_threshold: dec!(0.0001),
        max_slippage_pct: dec!(0.05),
        slippage_pause_threshold_pct: dec!(0.10),
        max_executions_per_minute: 10,
        max_executions_per_hour: 100,
        circuit_breaker_failure_threshold: 3,
        circuit_breaker_retry_delay_secs: 300,
    };

    let symbol = format!("BTCUSDT-{}", Uuid::new_v4());
    let breaker =
        rg_db::tenant::fetch_or_init_circuit_breaker(&pool, &symbol, 3, 300).await?;

    let operation_id = Uuid::new_v4();
    rg_db::operation::insert_active_operation(
        &pool,
        operation_id,
        tenant_id,
        Uuid::new_v4(),
        None,
        &symbol,
        "SELL",
        &format!("entry-{operation_id}"),
        dec!(49000),
        None,
        dec!(1),
    )
    .await?;

    let watch = StopWatch {
        operation_id,
        tenant_id,
        symbol: symbol.clone(),
        side: PositionSide::Long,
        stop_price: dec!(49000),
        quantity: dec!(1),
    };

    let exchange = PaperExchange::new();
    exchange.set_fill_price(&symbol, dec!(48900));

    let a = evaluate_and_execute(
        &pool,
        &exchange,
        &watch,
        dec!(48900),
        1,
        PriceSource::Ws,
        &cfg,
        &breaker,
    )
    .await?;
    let b = evaluate_and_execute(
        &pool,
        &exchange,
        &watch,
        dec!(48900),
        1,
        PriceSource::Cron,
        &cfg,
        &breaker,
    )
    .await?;

    let outcomes = [a, b];
    let executed = outcomes
        .iter()
        .filter(|o| matches!(o, rg_stopmon::StopOutcome::Executed { .. }))
        .count();
    let already_claimed = outcomes
        .iter()
        .filter(|o| matches!(o, rg_stopmon::StopOutcome::AlreadyClaimed { .. }))
        .count();

    assert_eq!(executed, 1, "exactly one caller should execute the stop");
    assert_eq!(already_claimed, 1, "the other caller should no-op");

    let token = rg_stopmon::execution_token(operation_id, dec!(49000), PositionSide::Long);
    let execution = rg_db::stopmon::fetch_execution_by_token(&pool, operation_id, &token)
        .await?
        .expect("execution row must exist");
    assert_eq!(execution.status, "EXECUTED");

    Ok(())
}

/// §4.5 guard 1: a stale price must abort before any claim is attempted,
/// leaving no StopExecution row behind.
#[tokio::test]
async fn stale_price_blocks_before_claim() -> anyhow::Result<()> {
    let Some(pool) = db_pool().await else { return Ok(()) };

    let tenant_id = Uuid::new_v4();
    let cfg = rg_config::tenant::TenantConfig::defaults(tenant_id);
    let mut cfg = cfg;
    cfg.trading_enabled = true;

    let symbol = format!("ETHUSDT-{}", Uuid::new_v4());
    let breaker = rg_db::tenant::fetch_or_init_circuit_breaker(&pool, &symbol, 3, 300).await?;

    let operation_id = Uuid::new_v4();
    rg_db::operation::insert_active_operation(
        &pool,
        operation_id,
        tenant_id,
        Uuid::new_v4(),
        None,
        &symbol,
        "SELL",
        &format!("entry-{operation_id}"),
        dec!(2900),
        None,
        dec!(1),
    )
    .await?;

    let watch = StopWatch {
        operation_id,
        tenant_id,
        symbol: symbol.clone(),
        side: PositionSide::Long,
        stop_price: dec!(2900),
        quantity: dec!(1),
    };

    let exchange = PaperExchange::new();
    let outcome = evaluate_and_execute(
        &pool,
        &exchange,
        &watch,
        dec!(2800),
        10_000,
        PriceSource::Cron,
        &cfg,
        &breaker,
    )
    .await?;

    assert!(matches!(
        outcome,
        rg_stopmon::StopOutcome::Blocked {
            event_type: "STALE_PRICE",
            ..
        }
    ));

    let token = rg_stopmon::execution_token(operation_id, dec!(2900), PositionSide::Long);
    let execution = rg_db::stopmon::fetch_execution_by_token(&pool, operation_id, &token).await?;
    assert!(execution.is_none(), "a blocked guard must not create an execution row");

    Ok(())
}
