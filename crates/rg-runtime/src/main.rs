//! rg-runtime entry point.
//!
//! Thin by design, the way `mqk-daemon::main` is thin: load env, init
//! tracing, build shared state, spawn the supervised background tasks, and
//! wait for a shutdown signal. Everything domain-specific lives in the
//! library crates this binary wires together. Unlike `mqk-daemon`, there is
//! no HTTP server here (out of scope, spec.md §1) — `rg-runtime` is the one
//! binary in this workspace allowed to enable `rg-db`'s `runtime-claim`
//! feature (RT-1), since it is the single designated outbox dispatcher.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use uuid::Uuid;

use rg_config::tenant::TenantConfig;
use rg_db::tenant::TenantConfigRow;
use rg_execution::{PaperExchange, PaperMarketData};
use rg_gate::GateContext;
use rg_intent::validate::RiskGuardContext;
use rg_orchestrator::Orchestrator;
use rg_schemas::PositionSide;
use rg_stopmon::types::StopWatch;

const SCAN_INTERVAL: Duration = Duration::from_secs(30);
const STOP_POLL_INTERVAL: Duration = Duration::from_secs(5);
const OUTBOX_POLL_INTERVAL: Duration = Duration::from_secs(2);
const OUTBOX_BATCH_SIZE: i64 = 50;

/// One tenant/symbol/timeframe the Pattern Engine scans and the Stop
/// Monitor's backstop poller watches. A real deployment would load this
/// from the tenant-config table's watchlist; this MVP binary takes it from
/// env vars since no watchlist table exists in the data model (§3 lists no
/// such entity) — see DESIGN.md.
struct Watch {
    tenant_id: Uuid,
    symbol: String,
    timeframe: String,
}

fn load_watches_from_env() -> Vec<Watch> {
    let tenant_id = std::env::var("RG_TENANT_ID")
        .ok()
        .and_then(|s| Uuid::parse_str(&s).ok())
        .unwrap_or_else(Uuid::nil);
    let symbols = std::env::var("RG_SYMBOLS").unwrap_or_else(|_| "BTCUSDT".to_string());
    let timeframe = std::env::var("RG_TIMEFRAME").unwrap_or_else(|_| "1h".to_string());

    symbols
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|symbol| Watch {
            tenant_id,
            symbol: symbol.to_string(),
            timeframe: timeframe.clone(),
        })
        .collect()
}

fn tenant_config_from_row(row: &TenantConfigRow) -> TenantConfig {
    TenantConfig {
        tenant_id: row.tenant_id,
        trading_enabled: row.trading_enabled,
        stop_out_cooldown_secs: row.stop_out_cooldown_secs,
        max_data_age_secs: row.max_data_age_secs,
        funding_rate_threshold: row.funding_rate_threshold,
        max_slippage_pct: row.max_slippage_pct,
        slippage_pause_threshold_pct: row.slippage_pause_threshold_pct,
        max_executions_per_minute: row.max_executions_per_minute as u32,
        max_executions_per_hour: row.max_executions_per_hour as u32,
        circuit_breaker_failure_threshold: row.circuit_breaker_failure_threshold as u32,
        circuit_breaker_retry_delay_secs: row.circuit_breaker_retry_delay_secs,
    }
}

fn gate_ctx_from_row(row: &TenantConfigRow, symbol: &str) -> GateContext {
    GateContext {
        tenant_id: row.tenant_id,
        symbol: symbol.to_string(),
        now: chrono::Utc::now(),
        monthly_pnl: rust_decimal::Decimal::ZERO,
        capital: row.capital,
        active_position_count: 0,
        cooldown_enabled: row.stop_out_cooldown_secs > 0,
        stop_out_cooldown_secs: row.stop_out_cooldown_secs,
        latest_stop_out: None,
        funding_enabled: false,
        funding_rate: None,
        funding_rate_threshold: row.funding_rate_threshold,
        data_freshness_enabled: true,
        data_age_secs: None,
        max_data_age_secs: row.max_data_age_secs,
    }
}

/// §4.7: one Pattern Engine scan pass per watch, on a fixed interval.
async fn pattern_scan_task(orchestrator: Arc<Orchestrator>, watches: Arc<Vec<Watch>>, pool: sqlx::PgPool, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(SCAN_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("pattern_scan_task shutting down");
                return;
            }
            _ = ticker.tick() => {
                for watch in watches.iter() {
                    let tenant_cfg = match rg_db::tenant::fetch_tenant_config(&pool, watch.tenant_id).await {
                        Ok(cfg) => cfg,
                        Err(e) => {
                            warn!(symbol = %watch.symbol, error = %e, "skipping scan: no tenant config");
                            continue;
                        }
                    };
                    let gate_ctx = gate_ctx_from_row(&tenant_cfg, &watch.symbol);
                    let risk_ctx = RiskGuardContext {
                        monthly_pnl: rust_decimal::Decimal::ZERO,
                        trade_confirmed: false,
                    };
                    match orchestrator
                        .scan_patterns(watch.tenant_id, tenant_cfg.capital, &watch.symbol, &watch.timeframe, &gate_ctx, &risk_ctx)
                        .await
                    {
                        Ok(report) => {
                            if !report.outcomes.is_empty() {
                                info!(symbol = %watch.symbol, outcomes = report.outcomes.len(), bridged = report.bridged.len(), "pattern scan produced outcomes");
                            }
                        }
                        Err(e) => error!(symbol = %watch.symbol, error = %e, "pattern scan failed"),
                    }
                }
            }
        }
    }
}

/// §4.5 backstop poller: re-evaluates every ACTIVE operation's stop against
/// the latest known price, independent of the (not-implemented-here)
/// websocket price feeder — the backstop exists precisely so a feed outage
/// doesn't leave a stop unmonitored.
async fn stop_monitor_backstop_task(
    pool: sqlx::PgPool,
    market_data: Arc<PaperMarketData>,
    execution_port: Arc<PaperExchange>,
    watches: Arc<Vec<Watch>>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(STOP_POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("stop_monitor_backstop_task shutting down");
                return;
            }
            _ = ticker.tick() => {
                for watch in watches.iter() {
                    let tenant_cfg = match rg_db::tenant::fetch_tenant_config(&pool, watch.tenant_id).await {
                        Ok(cfg) => cfg,
                        Err(_) => continue,
                    };
                    let config = tenant_config_from_row(&tenant_cfg);

                    let operations = match rg_db::operation::list_active_operations_for_tenant(&pool, watch.tenant_id).await {
                        Ok(ops) => ops,
                        Err(e) => {
                            error!(error = %e, "failed to list active operations");
                            continue;
                        }
                    };

                    for op in operations.into_iter().filter(|op| op.symbol == watch.symbol) {
                        let side = match op.side.as_str() {
                            "BUY" => PositionSide::Long,
                            _ => PositionSide::Short,
                        };
                        let stop_watch = StopWatch {
                            operation_id: op.operation_id,
                            tenant_id: op.tenant_id,
                            symbol: op.symbol.clone(),
                            side,
                            stop_price: op.stop_price,
                            quantity: op.quantity,
                        };

                        let (bid, ask, age_secs) = match (
                            market_data.best_bid(&op.symbol).await,
                            market_data.best_ask(&op.symbol).await,
                            market_data.data_age(&op.symbol).await,
                        ) {
                            (Ok(bid), Ok(ask), Ok(age)) => (bid, ask, age),
                            _ => continue,
                        };
                        let current_price = match side {
                            PositionSide::Long => bid,
                            PositionSide::Short => ask,
                        };

                        let breaker = match rg_db::tenant::fetch_or_init_circuit_breaker(
                            &pool,
                            &op.symbol,
                            config.circuit_breaker_failure_threshold as i32,
                            config.circuit_breaker_retry_delay_secs,
                        )
                        .await
                        {
                            Ok(b) => b,
                            Err(e) => {
                                error!(error = %e, "failed to load circuit breaker");
                                continue;
                            }
                        };

                        match rg_stopmon::monitor::evaluate_and_execute(
                            &pool,
                            execution_port.as_ref(),
                            &stop_watch,
                            current_price,
                            age_secs,
                            rg_stopmon::types::PriceSource::Cron,
                            &config,
                            &breaker,
                        )
                        .await
                        {
                            Ok(rg_stopmon::monitor::StopOutcome::NotTriggered) => {}
                            Ok(outcome) => info!(operation_id = %op.operation_id, ?outcome, "backstop stop outcome"),
                            Err(e) => warn!(operation_id = %op.operation_id, error = %e, "backstop evaluation error"),
                        }
                    }
                }
            }
        }
    }
}

/// §4.5 Outbox: claim unpublished rows, deliver them, mark published. No
/// message-bus crate is wired into this workspace, so delivery is a
/// structured log line rather than an actual publish — the Outbox's
/// exactly-once claim/mark-published mechanics are real, the transport is a
/// stub pending a concrete bus choice (see DESIGN.md).
async fn outbox_publisher_task(pool: sqlx::PgPool, shutdown: CancellationToken) {
    let dispatcher_id = format!("rg-runtime-{}", Uuid::new_v4());
    let mut ticker = tokio::time::interval(OUTBOX_POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("outbox_publisher_task shutting down");
                return;
            }
            _ = ticker.tick() => {
                let batch = match rg_db::outbox::claim_batch(&pool, OUTBOX_BATCH_SIZE, &dispatcher_id).await {
                    Ok(rows) => rows,
                    Err(e) => {
                        error!(error = %e, "outbox claim_batch failed");
                        continue;
                    }
                };
                for row in batch {
                    info!(outbox_id = row.outbox_id, routing_key = %row.routing_key, "dispatching outbox row");
                    if let Err(e) = rg_db::outbox::mark_published(&pool, row.outbox_id).await {
                        error!(outbox_id = row.outbox_id, error = %e, "mark_published failed");
                        let _ = rg_db::outbox::release_claim(&pool, row.outbox_id).await;
                    }
                }
            }
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_max_level(Level::TRACE)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let pool = rg_db::connect_from_env().await.context("failed to connect to Postgres")?;
    rg_db::migrate(&pool).await.context("failed to run migrations")?;

    let market_data = Arc::new(PaperMarketData::new());
    let execution_port = Arc::new(PaperExchange::new());
    let orchestrator = Arc::new(Orchestrator::new(
        pool.clone(),
        market_data.clone() as Arc<dyn rg_execution::MarketDataPort>,
        execution_port.clone() as Arc<dyn rg_execution::ExecutionPort>,
    ));

    let watches = Arc::new(load_watches_from_env());
    info!(count = watches.len(), "watches loaded");

    let shutdown = CancellationToken::new();

    let pattern_task = tokio::spawn(pattern_scan_task(orchestrator.clone(), watches.clone(), pool.clone(), shutdown.clone()));
    let stop_task = tokio::spawn(stop_monitor_backstop_task(
        pool.clone(),
        market_data.clone(),
        execution_port.clone(),
        watches.clone(),
        shutdown.clone(),
    ));
    let outbox_task = tokio::spawn(outbox_publisher_task(pool.clone(), shutdown.clone()));

    info!("rg-runtime started");
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl_c")?;
    info!("shutdown signal received");
    shutdown.cancel();

    let _ = tokio::join!(pattern_task, stop_task, outbox_task);
    info!("rg-runtime stopped");
    Ok(())
}
