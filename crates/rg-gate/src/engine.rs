use anyhow::Result;
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::checks;
use crate::types::{EntryGateDecision, GateCheckResult, GateContext};

/// Run every required check, in order, without short-circuiting (§4.3). The
/// final decision is `allowed = all(checks.passed)` (I8).
pub fn evaluate(ctx: &GateContext) -> EntryGateDecision {
    let checks: Vec<GateCheckResult> = vec![
        checks::dynamic_position_limit(ctx),
        checks::stop_out_cooldown(ctx),
        checks::funding_rate(ctx),
        checks::data_freshness(ctx),
    ];
    let allowed = checks.iter().all(|c| c.passed);
    EntryGateDecision { allowed, checks }
}

/// Run the gate and persist the decision append-only (§4.3 "Each gate
/// decision is persisted append-only with full context").
pub async fn evaluate_and_persist(pool: &PgPool, ctx: &GateContext) -> Result<EntryGateDecision> {
    let decision = evaluate(ctx);
    let checks_json: Value = json!(decision.checks);
    rg_db::gate::insert_gate_decision(
        pool,
        Uuid::new_v4(),
        ctx.tenant_id,
        &ctx.symbol,
        decision.allowed,
        checks_json,
    )
    .await?;
    Ok(decision)
}
