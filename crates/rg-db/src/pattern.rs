//! Pattern Engine lifecycle persistence (§4.7): PatternInstance,
//! PatternAlert, and the PatternTrigger idempotency record.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewPatternInstance {
    pub pattern_instance_id: Uuid,
    pub tenant_id: Uuid,
    pub pattern_code: String,
    pub symbol: String,
    pub timeframe: String,
    pub detection_bar_ts: DateTime<Utc>,
    pub entry_price: Option<Decimal>,
    pub invalidation_price: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub confidence: Option<String>,
    pub features: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct PatternInstanceRow {
    pub pattern_instance_id: Uuid,
    pub tenant_id: Uuid,
    pub pattern_code: String,
    pub symbol: String,
    pub timeframe: String,
    pub status: String,
    pub detection_bar_ts: DateTime<Utc>,
    pub entry_price: Option<Decimal>,
    pub invalidation_price: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub confidence: Option<String>,
}

fn row_to_instance(row: sqlx::postgres::PgRow) -> Result<PatternInstanceRow, sqlx::Error> {
    Ok(PatternInstanceRow {
        pattern_instance_id: row.try_get("pattern_instance_id")?,
        tenant_id: row.try_get("tenant_id")?,
        pattern_code: row.try_get("pattern_code")?,
        symbol: row.try_get("symbol")?,
        timeframe: row.try_get("timeframe")?,
        status: row.try_get("status")?,
        detection_bar_ts: row.try_get("detection_bar_ts")?,
        entry_price: row.try_get("entry_price")?,
        invalidation_price: row.try_get("invalidation_price")?,
        target_price: row.try_get("target_price")?,
        confidence: row.try_get("confidence")?,
    })
}

/// Insert a FORMING instance. Returns the existing row instead of a
/// duplicate if (symbol, timeframe, pattern_code, detection_bar_ts) was
/// already seen — a re-scanned bar never creates a second instance (§4.7).
/// The `bool` is `true` only when this call actually inserted a new row
/// (the standard `xmax = 0` upsert-return-inserted idiom), so the caller
/// knows whether to emit a DETECTED alert.
pub async fn insert_or_get_instance(
    pool: &PgPool,
    new: &NewPatternInstance,
) -> Result<(PatternInstanceRow, bool)> {
    let row = sqlx::query(
        r#"
        insert into pattern_instances (
            pattern_instance_id, tenant_id, pattern_code, symbol, timeframe, status,
            detection_bar_ts, entry_price, invalidation_price, target_price, confidence, features
        ) values ($1, $2, $3, $4, $5, 'FORMING', $6, $7, $8, $9, $10, $11)
        on conflict (symbol, timeframe, pattern_code, detection_bar_ts) do update set
            symbol = excluded.symbol
        returning *, (xmax = 0) as inserted
        "#,
    )
    .bind(new.pattern_instance_id)
    .bind(new.tenant_id)
    .bind(&new.pattern_code)
    .bind(&new.symbol)
    .bind(&new.timeframe)
    .bind(new.detection_bar_ts)
    .bind(new.entry_price)
    .bind(new.invalidation_price)
    .bind(new.target_price)
    .bind(&new.confidence)
    .bind(&new.features)
    .fetch_one(pool)
    .await
    .context("insert_or_get_instance failed")?;

    let inserted: bool = row.try_get("inserted")?;
    Ok((row_to_instance(row)?, inserted))
}

/// All instances still in FORMING for a given symbol/timeframe, oldest
/// first — the re-evaluation worklist for a scan pass (§4.7 lifecycle).
pub async fn list_forming_instances(
    pool: &PgPool,
    tenant_id: Uuid,
    symbol: &str,
    timeframe: &str,
) -> Result<Vec<PatternInstanceRow>> {
    let rows = sqlx::query(
        r#"
        select * from pattern_instances
        where tenant_id = $1 and symbol = $2 and timeframe = $3 and status = 'FORMING'
        order by detection_bar_ts asc
        "#,
    )
    .bind(tenant_id)
    .bind(symbol)
    .bind(timeframe)
    .fetch_all(pool)
    .await
    .context("list_forming_instances failed")?;

    rows.into_iter().map(row_to_instance).collect::<Result<Vec<_>, sqlx::Error>>().map_err(Into::into)
}

/// Advance a FORMING instance to CONFIRMED or INVALIDATED. No-ops (returns
/// `Ok(false)`) if the instance is not currently FORMING — both terminal
/// states are sticky.
pub async fn transition_instance(
    pool: &PgPool,
    pattern_instance_id: Uuid,
    new_status: &str,
) -> Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        update pattern_instances
        set status = $2, updated_at = now()
        where pattern_instance_id = $1 and status = 'FORMING'
        returning pattern_instance_id
        "#,
    )
    .bind(pattern_instance_id)
    .bind(new_status)
    .fetch_optional(pool)
    .await
    .context("transition_instance failed")?;

    Ok(row.is_some())
}

pub async fn insert_alert(
    pool: &PgPool,
    pattern_alert_id: Uuid,
    tenant_id: Uuid,
    pattern_instance_id: Uuid,
    alert_type: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into pattern_alerts (pattern_alert_id, tenant_id, pattern_instance_id, alert_type)
        values ($1, $2, $3, $4)
        "#,
    )
    .bind(pattern_alert_id)
    .bind(tenant_id)
    .bind(pattern_instance_id)
    .bind(alert_type)
    .execute(pool)
    .await
    .context("insert_alert failed")?;

    Ok(())
}

/// PatternTrigger: (tenant, pattern_event_id) -> intent_id, enforced unique
/// by the table's primary key. Returns the existing `intent_id` and `true`
/// if this event id had already been processed (I9 / the ALREADY_PROCESSED
/// path in §4.7's pattern-to-intent bridge).
pub async fn record_pattern_trigger(
    pool: &PgPool,
    tenant_id: Uuid,
    pattern_event_id: Uuid,
    intent_id: Uuid,
) -> Result<(Uuid, bool)> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        insert into pattern_triggers (tenant_id, pattern_event_id, intent_id)
        values ($1, $2, $3)
        on conflict (tenant_id, pattern_event_id) do nothing
        returning intent_id
        "#,
    )
    .bind(tenant_id)
    .bind(pattern_event_id)
    .bind(intent_id)
    .fetch_optional(pool)
    .await
    .context("record_pattern_trigger insert failed")?;

    if let Some((inserted_intent_id,)) = row {
        return Ok((inserted_intent_id, false));
    }

    let (existing,): (Uuid,) = sqlx::query_as(
        "select intent_id from pattern_triggers where tenant_id = $1 and pattern_event_id = $2",
    )
    .bind(tenant_id)
    .bind(pattern_event_id)
    .fetch_one(pool)
    .await
    .context("record_pattern_trigger lookup failed")?;

    Ok((existing, true))
}
