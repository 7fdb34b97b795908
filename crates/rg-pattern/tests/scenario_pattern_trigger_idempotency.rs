use chrono::Utc;
use rust_decimal_macros::dec;
use uuid::Uuid;

use rg_db::pattern::{NewPatternInstance, PatternInstanceRow};
use rg_execution::{PaperExchange, PaperMarketData};
use rg_gate::GateContext;
use rg_intent::validate::RiskGuardContext;
use rg_pattern::{bridge_confirmed_instance, BridgeOutcome, EntryMode, StrategyPatternConfig};

async fn db_pool() -> Option<sqlx::PgPool> {
    match std::env::var(rg_db::ENV_DB_URL) {
        Ok(_) => Some(rg_db::testkit_db_pool().await.expect("testkit db pool")),
        Err(_) => {
            eprintln!("SKIP: {} not set", rg_db::ENV_DB_URL);
            None
        }
    }
}

fn gate_ctx(tenant_id: Uuid, symbol: &str) -> GateContext {
    GateContext {
        tenant_id,
        symbol: symbol.to_string(),
        now: Utc::now(),
        monthly_pnl: dec!(0),
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
    }
}

async fn confirmed_instance(pool: &sqlx::PgPool, tenant_id: Uuid, symbol: &str) -> anyhow::Result<PatternInstanceRow> {
    let new = NewPatternInstance {
        pattern_instance_id: Uuid::new_v4(),
        tenant_id,
        pattern_code: "HAMMER".to_string(),
        symbol: symbol.to_string(),
        timeframe: "1h".to_string(),
        detection_bar_ts: Utc::now(),
        entry_price: Some(dec!(105)),
        invalidation_price: Some(dec!(100)),
        target_price: Some(dec!(115)),
        confidence: Some("MEDIUM".to_string()),
        features: None,
    };
    let (instance, _inserted) = rg_db::pattern::insert_or_get_instance(pool, &new).await?;
    rg_db::pattern::transition_instance(pool, instance.pattern_instance_id, "CONFIRMED").await?;
    Ok(instance)
}

/// I9: a CONFIRMED instance spawns exactly one intent no matter how many
/// times the bridge is invoked for it (a scan loop revisiting a sticky
/// CONFIRMED row, a restart replaying the same alert, etc).
#[tokio::test]
async fn confirmed_instance_bridges_to_intent_exactly_once() -> anyhow::Result<()> {
    let Some(pool) = db_pool().await else { return Ok(()) };

    let tenant_id = Uuid::new_v4();
    let symbol = format!("BTCUSDT-{}", Uuid::new_v4());
    let instance = confirmed_instance(&pool, tenant_id, &symbol).await?;

    let config = StrategyPatternConfig {
        strategy: "pattern-hammer".to_string(),
        pattern_code: "HAMMER".to_string(),
        timeframe: "1h".to_string(),
        auto_entry_enabled: true,
        entry_mode: EntryMode::DryRun,
        min_confidence: None,
    };

    let market_data = PaperMarketData::new();
    let exchange = PaperExchange::new();
    let ctx = gate_ctx(tenant_id, &symbol);
    let risk_ctx = RiskGuardContext {
        monthly_pnl: dec!(0),
        trade_confirmed: true,
    };

    let first = bridge_confirmed_instance(
        &pool,
        &market_data,
        &exchange,
        tenant_id,
        dec!(10000),
        &[config.clone()],
        &instance,
        &ctx,
        &risk_ctx,
    )
    .await?;
    let first_intent_id = match first {
        BridgeOutcome::Submitted { intent_id, .. } => intent_id,
        other => panic!("expected Submitted on first bridge call, got {other:?}"),
    };

    let second = bridge_confirmed_instance(
        &pool,
        &market_data,
        &exchange,
        tenant_id,
        dec!(10000),
        &[config],
        &instance,
        &ctx,
        &risk_ctx,
    )
    .await?;
    match second {
        BridgeOutcome::AlreadyProcessed { intent_id } => assert_eq!(intent_id, first_intent_id),
        other => panic!("expected AlreadyProcessed on second bridge call, got {other:?}"),
    }

    Ok(())
}

/// A `min_confidence`-gated config matches a CONFIRMED instance whose
/// recorded confidence clears the floor — the confidence round-trips from
/// `pattern_instances.confidence` through `PatternInstanceRow` into the
/// match check, not silently dropped on the DB read path.
#[tokio::test]
async fn confidence_gated_config_bridges_a_sufficiently_confident_instance() -> anyhow::Result<()> {
    let Some(pool) = db_pool().await else { return Ok(()) };

    let tenant_id = Uuid::new_v4();
    let symbol = format!("BTCUSDT-{}", Uuid::new_v4());
    let instance = confirmed_instance(&pool, tenant_id, &symbol).await?;
    assert_eq!(instance.confidence.as_deref(), Some("MEDIUM"));

    let config = StrategyPatternConfig {
        strategy: "pattern-hammer".to_string(),
        pattern_code: "HAMMER".to_string(),
        timeframe: "1h".to_string(),
        auto_entry_enabled: true,
        entry_mode: EntryMode::DryRun,
        min_confidence: Some("MEDIUM".to_string()),
    };

    let market_data = PaperMarketData::new();
    let exchange = PaperExchange::new();
    let ctx = gate_ctx(tenant_id, &symbol);
    let risk_ctx = RiskGuardContext {
        monthly_pnl: dec!(0),
        trade_confirmed: true,
    };

    let outcome = bridge_confirmed_instance(
        &pool,
        &market_data,
        &exchange,
        tenant_id,
        dec!(10000),
        &[config],
        &instance,
        &ctx,
        &risk_ctx,
    )
    .await?;
    assert!(matches!(outcome, BridgeOutcome::Submitted { .. }), "expected Submitted, got {outcome:?}");

    Ok(())
}

/// A `min_confidence`-gated config never fires against an instance whose
/// recorded confidence falls short of the floor.
#[tokio::test]
async fn confidence_gated_config_rejects_an_insufficiently_confident_instance() -> anyhow::Result<()> {
    let Some(pool) = db_pool().await else { return Ok(()) };

    let tenant_id = Uuid::new_v4();
    let symbol = format!("BTCUSDT-{}", Uuid::new_v4());
    let instance = confirmed_instance(&pool, tenant_id, &symbol).await?;

    let config = StrategyPatternConfig {
        strategy: "pattern-hammer".to_string(),
        pattern_code: "HAMMER".to_string(),
        timeframe: "1h".to_string(),
        auto_entry_enabled: true,
        entry_mode: EntryMode::DryRun,
        min_confidence: Some("HIGH".to_string()),
    };

    let market_data = PaperMarketData::new();
    let exchange = PaperExchange::new();
    let ctx = gate_ctx(tenant_id, &symbol);
    let risk_ctx = RiskGuardContext {
        monthly_pnl: dec!(0),
        trade_confirmed: true,
    };

    let outcome = bridge_confirmed_instance(
        &pool,
        &market_data,
        &exchange,
        tenant_id,
        dec!(10000),
        &[config],
        &instance,
        &ctx,
        &risk_ctx,
    )
    .await?;
    assert!(matches!(outcome, BridgeOutcome::NoConfigMatched));

    Ok(())
}

/// A config for a different pattern_code never fires, regardless of how
/// confident the instance is.
#[tokio::test]
async fn non_matching_config_is_a_no_op() -> anyhow::Result<()> {
    let Some(pool) = db_pool().await else { return Ok(()) };

    let tenant_id = Uuid::new_v4();
    let symbol = format!("BTCUSDT-{}", Uuid::new_v4());
    let instance = confirmed_instance(&pool, tenant_id, &symbol).await?;

    let config = StrategyPatternConfig {
        strategy: "pattern-morning-star".to_string(),
        pattern_code: "MORNING_STAR".to_string(),
        timeframe: "1h".to_string(),
        auto_entry_enabled: true,
        entry_mode: EntryMode::DryRun,
        min_confidence: None,
    };

    let market_data = PaperMarketData::new();
    let exchange = PaperExchange::new();
    let ctx = gate_ctx(tenant_id, &symbol);
    let risk_ctx = RiskGuardContext {
        monthly_pnl: dec!(0),
        trade_confirmed: true,
    };

    let outcome = bridge_confirmed_instance(
        &pool,
        &market_data,
        &exchange,
        tenant_id,
        dec!(10000),
        &[config],
        &instance,
        &ctx,
        &risk_ctx,
    )
    .await?;
    assert!(matches!(outcome, BridgeOutcome::NoConfigMatched));

    Ok(())
}
