//! TenantConfig (kill switch + thresholds) and CircuitBreakerState (§3).

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TenantConfigRow {
    pub tenant_id: Uuid,
    pub trading_enabled: bool,
    pub capital: Decimal,
    pub stop_out_cooldown_secs: i64,
    pub max_data_age_secs: i64,
    pub funding_rate_threshold: Decimal,
    pub max_slippage_pct: Decimal,
    pub slippage_pause_threshold_pct: Decimal,
    pub max_executions_per_minute: i32,
    pub max_executions_per_hour: i32,
    pub circuit_breaker_failure_threshold: i32,
    pub circuit_breaker_retry_delay_secs: i64,
}

fn row_to_tenant_config(row: sqlx::postgres::PgRow) -> Result<TenantConfigRow, sqlx::Error> {
    Ok(TenantConfigRow {
        tenant_id: row.try_get("tenant_id")?,
        trading_enabled: row.try_get("trading_enabled")?,
        capital: row.try_get("capital")?,
        stop_out_cooldown_secs: row.try_get("stop_out_cooldown_secs")?,
        max_data_age_secs: row.try_get("max_data_age_secs")?,
        funding_rate_threshold: row.try_get("funding_rate_threshold")?,
        max_slippage_pct: row.try_get("max_slippage_pct")?,
        slippage_pause_threshold_pct: row.try_get("slippage_pause_threshold_pct")?,
        max_executions_per_minute: row.try_get("max_executions_per_minute")?,
        max_executions_per_hour: row.try_get("max_executions_per_hour")?,
        circuit_breaker_failure_threshold: row.try_get("circuit_breaker_failure_threshold")?,
        circuit_breaker_retry_delay_secs: row.try_get("circuit_breaker_retry_delay_secs")?,
    })
}

pub async fn upsert_tenant_config(pool: &PgPool, cfg: &TenantConfigRow) -> Result<()> {
    sqlx::query(
        r#"
        insert into tenant_configs (
            tenant_id, trading_enabled, capital, stop_out_cooldown_secs, max_data_age_secs,
            funding_rate_threshold, max_slippage_pct, slippage_pause_threshold_pct,
            max_executions_per_minute, max_executions_per_hour,
            circuit_breaker_failure_threshold, circuit_breaker_retry_delay_secs, updated_at
        ) values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, now())
        on conflict (tenant_id) do update set
            trading_enabled = excluded.trading_enabled,
            capital = excluded.capital,
            stop_out_cooldown_secs = excluded.stop_out_cooldown_secs,
            max_data_age_secs = excluded.max_data_age_secs,
            funding_rate_threshold = excluded.funding_rate_threshold,
            max_slippage_pct = excluded.max_slippage_pct,
            slippage_pause_threshold_pct = excluded.slippage_pause_threshold_pct,
            max_executions_per_minute = excluded.max_executions_per_minute,
            max_executions_per_hour = excluded.max_executions_per_hour,
            circuit_breaker_failure_threshold = excluded.circuit_breaker_failure_threshold,
            circuit_breaker_retry_delay_secs = excluded.circuit_breaker_retry_delay_secs,
            updated_at = now()
        "#,
    )
    .bind(cfg.tenant_id)
    .bind(cfg.trading_enabled)
    .bind(cfg.capital)
    .bind(cfg.stop_out_cooldown_secs)
    .bind(cfg.max_data_age_secs)
    .bind(cfg.funding_rate_threshold)
    .bind(cfg.max_slippage_pct)
    .bind(cfg.slippage_pause_threshold_pct)
    .bind(cfg.max_executions_per_minute)
    .bind(cfg.max_executions_per_hour)
    .bind(cfg.circuit_breaker_failure_threshold)
    .bind(cfg.circuit_breaker_retry_delay_secs)
    .execute(pool)
    .await
    .context("upsert_tenant_config failed")?;

    Ok(())
}

pub async fn fetch_tenant_config(pool: &PgPool, tenant_id: Uuid) -> Result<TenantConfigRow> {
    let row = sqlx::query("select * from tenant_configs where tenant_id = $1")
        .bind(tenant_id)
        .fetch_one(pool)
        .await
        .context("fetch_tenant_config failed")?;
    Ok(row_to_tenant_config(row)?)
}

/// Flip `trading_enabled` for a tenant. Used both for manual operator clears
/// and the automatic kill switch triggered by a slippage breach (§4.5).
pub async fn set_trading_enabled(pool: &PgPool, tenant_id: Uuid, enabled: bool) -> Result<()> {
    sqlx::query("update tenant_configs set trading_enabled = $2, updated_at = now() where tenant_id = $1")
        .bind(tenant_id)
        .bind(enabled)
        .execute(pool)
        .await
        .context("set_trading_enabled failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerRow {
    pub symbol: String,
    pub state: String,
    pub failure_count: i32,
    pub last_failure_at: Option<chrono::DateTime<chrono::Utc>>,
    pub opened_at: Option<chrono::DateTime<chrono::Utc>>,
    pub will_retry_at: Option<chrono::DateTime<chrono::Utc>>,
    pub failure_threshold: i32,
    pub retry_delay_seconds: i64,
}

fn row_to_breaker(row: sqlx::postgres::PgRow) -> Result<CircuitBreakerRow, sqlx::Error> {
    Ok(CircuitBreakerRow {
        symbol: row.try_get("symbol")?,
        state: row.try_get("state")?,
        failure_count: row.try_get("failure_count")?,
        last_failure_at: row.try_get("last_failure_at")?,
        opened_at: row.try_get("opened_at")?,
        will_retry_at: row.try_get("will_retry_at")?,
        failure_threshold: row.try_get("failure_threshold")?,
        retry_delay_seconds: row.try_get("retry_delay_seconds")?,
    })
}

/// Load a symbol's breaker state, creating a fresh CLOSED row with the given
/// defaults if none exists yet.
pub async fn fetch_or_init_circuit_breaker(
    pool: &PgPool,
    symbol: &str,
    failure_threshold: i32,
    retry_delay_seconds: i64,
) -> Result<CircuitBreakerRow> {
    let row = sqlx::query(
        r#"
        insert into circuit_breaker_states (symbol, failure_threshold, retry_delay_seconds)
        values ($1, $2, $3)
        on conflict (symbol) do update set symbol = excluded.symbol
        returning *
        "#,
    )
    .bind(symbol)
    .bind(failure_threshold)
    .bind(retry_delay_seconds)
    .fetch_one(pool)
    .await
    .context("fetch_or_init_circuit_breaker failed")?;

    Ok(row_to_breaker(row)?)
}

pub async fn record_circuit_breaker_failure(
    pool: &PgPool,
    symbol: &str,
) -> Result<CircuitBreakerRow> {
    let row = sqlx::query(
        r#"
        update circuit_breaker_states
        set failure_count = failure_count + 1,
            last_failure_at = now(),
            state = case
                when failure_count + 1 >= failure_threshold then 'OPEN'
                else state
            end,
            opened_at = case
                when failure_count + 1 >= failure_threshold then now()
                else opened_at
            end,
            will_retry_at = case
                when failure_count + 1 >= failure_threshold
                    then now() + make_interval(secs => retry_delay_seconds)
                else will_retry_at
            end,
            updated_at = now()
        where symbol = $1
        returning *
        "#,
    )
    .bind(symbol)
    .fetch_one(pool)
    .await
    .context("record_circuit_breaker_failure failed")?;

    Ok(row_to_breaker(row)?)
}

pub async fn transition_circuit_breaker_half_open(pool: &PgPool, symbol: &str) -> Result<()> {
    sqlx::query(
        "update circuit_breaker_states set state = 'HALF_OPEN', updated_at = now() where symbol = $1",
    )
    .bind(symbol)
    .execute(pool)
    .await
    .context("transition_circuit_breaker_half_open failed")?;
    Ok(())
}

/// Reset to CLOSED after a successful execution in HALF_OPEN (§4.5).
pub async fn reset_circuit_breaker(pool: &PgPool, symbol: &str) -> Result<()> {
    sqlx::query(
        r#"
        update circuit_breaker_states
        set state = 'CLOSED', failure_count = 0, opened_at = null, will_retry_at = null, updated_at = now()
        where symbol = $1
        "#,
    )
    .bind(symbol)
    .execute(pool)
    .await
    .context("reset_circuit_breaker failed")?;
    Ok(())
}

/// A HALF_OPEN attempt that fails returns to OPEN (§4.5).
pub async fn reopen_circuit_breaker(pool: &PgPool, symbol: &str, retry_delay_seconds: i64) -> Result<()> {
    sqlx::query(
        r#"
        update circuit_breaker_states
        set state = 'OPEN', opened_at = now(),
            will_retry_at = now() + make_interval(secs => $2),
            updated_at = now()
        where symbol = $1
        "#,
    )
    .bind(symbol)
    .bind(retry_delay_seconds)
    .execute(pool)
    .await
    .context("reopen_circuit_breaker failed")?;
    Ok(())
}
