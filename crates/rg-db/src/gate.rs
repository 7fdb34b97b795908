//! Entry Gate decision persistence (§4.3). Every `evaluate_entry_gate` call
//! writes one append-only row, regardless of outcome — there is no update
//! path, matching the audit log's write-once discipline.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct GateDecisionRow {
    pub gate_decision_id: Uuid,
    pub tenant_id: Uuid,
    pub symbol: String,
    pub allowed: bool,
    pub checks_json: Value,
    pub occurred_at: DateTime<Utc>,
}

fn row_to_decision(row: sqlx::postgres::PgRow) -> Result<GateDecisionRow, sqlx::Error> {
    Ok(GateDecisionRow {
        gate_decision_id: row.try_get("gate_decision_id")?,
        tenant_id: row.try_get("tenant_id")?,
        symbol: row.try_get("symbol")?,
        allowed: row.try_get("allowed")?,
        checks_json: row.try_get("checks_json")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

pub async fn insert_gate_decision(
    pool: &PgPool,
    gate_decision_id: Uuid,
    tenant_id: Uuid,
    symbol: &str,
    allowed: bool,
    checks_json: Value,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into gate_decisions (gate_decision_id, tenant_id, symbol, allowed, checks_json)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(gate_decision_id)
    .bind(tenant_id)
    .bind(symbol)
    .bind(allowed)
    .bind(checks_json)
    .execute(pool)
    .await
    .context("insert_gate_decision failed")?;

    Ok(())
}

pub async fn list_gate_decisions_for_tenant(
    pool: &PgPool,
    tenant_id: Uuid,
) -> Result<Vec<GateDecisionRow>> {
    let rows = sqlx::query(
        "select * from gate_decisions where tenant_id = $1 order by occurred_at asc",
    )
    .bind(tenant_id)
    .fetch_all(pool)
    .await
    .context("list_gate_decisions_for_tenant failed")?;

    rows.into_iter().map(|r| Ok(row_to_decision(r)?)).collect()
}
