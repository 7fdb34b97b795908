//! VALIDATE phase (§4.4): deterministic field validation, the Entry Gate,
//! and the risk-management guard battery (stop required, the 1% rule, the
//! monthly drawdown ceiling, and — LIVE only — strategy name + explicit
//! trade confirmation). Every one of these always runs; VALIDATED or
//! FAILED is the union of all of them, not the first failure, mirroring
//! the Entry Gate's own non-short-circuiting shape (§4.3).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use rg_db::intent::TradingIntentRow;
use rg_gate::{evaluate_and_persist, GateContext};

use crate::types::{ExecutionMode, IntentError};

/// Fields the risk-management guard battery needs that the Entry Gate
/// doesn't already carry in its `GateContext`.
#[derive(Clone, Debug)]
pub struct RiskGuardContext {
    pub monthly_pnl: Decimal,
    /// Set by the caller once an operator has explicitly confirmed a LIVE
    /// trade out of band; ignored in DryRun mode.
    pub trade_confirmed: bool,
}

fn validate_fields(intent: &TradingIntentRow) -> Vec<String> {
    let mut issues = Vec::new();
    let (Some(entry), Some(stop)) = (intent.entry_price, intent.stop_price) else {
        issues.push("entry_price and stop_price must both be set before validation".to_string());
        return issues;
    };
    if entry == stop {
        issues.push("entry_price and stop_price must differ".to_string());
    }
    match intent.side.as_str() {
        "BUY" => {
            if stop >= entry {
                issues.push("BUY requires stop_price below entry_price".to_string());
            }
        }
        "SELL" => {
            if stop <= entry {
                issues.push("SELL requires stop_price above entry_price".to_string());
            }
        }
        other => issues.push(format!("unknown side {other}")),
    }
    if let Some(rp) = intent.risk_percent {
        if rp > dec!(1.00) {
            issues.push(format!("risk_percent {rp} exceeds the 1% rule ceiling"));
        }
    }
    issues
}

fn risk_guard_battery(intent: &TradingIntentRow, mode: ExecutionMode, risk_ctx: &RiskGuardContext) -> Vec<String> {
    let mut issues = Vec::new();
    if intent.stop_price.is_none() {
        issues.push("stop_price is required".to_string());
    }

    let capital = intent.capital.unwrap_or(Decimal::ZERO);
    let available_risk_pct = if capital > Decimal::ZERO {
        dec!(4.0) + (risk_ctx.monthly_pnl / capital) * dec!(100)
    } else {
        dec!(4.0)
    };
    if available_risk_pct <= Decimal::ZERO {
        issues.push(format!(
            "monthly drawdown ceiling breached: available_risk_pct={available_risk_pct}"
        ));
    }

    if mode == ExecutionMode::Live {
        if intent.strategy.is_none() {
            issues.push("strategy name is required for LIVE execution".to_string());
        }
        if !risk_ctx.trade_confirmed {
            issues.push("trade must be explicitly confirmed for LIVE execution".to_string());
        }
    }

    issues
}

pub async fn validate(
    pool: &PgPool,
    gate_ctx: &GateContext,
    mode: ExecutionMode,
    risk_ctx: &RiskGuardContext,
    intent_id: Uuid,
) -> Result<TradingIntentRow, IntentError> {
    let intent = rg_db::intent::fetch_intent(pool, intent_id).await?;

    let field_issues = validate_fields(&intent);
    let gate_decision = evaluate_and_persist(pool, gate_ctx).await?;
    let guard_issues = risk_guard_battery(&intent, mode, risk_ctx);

    let passed = field_issues.is_empty() && guard_issues.is_empty() && gate_decision.allowed;
    let status = if passed { "VALIDATED" } else { "FAILED" };

    let validation_result = json!({
        "field_issues": field_issues,
        "guard_issues": guard_issues,
        "gate": gate_decision,
        "passed": passed,
    });

    rg_db::intent::record_validation(
        pool,
        intent_id,
        intent.quantity,
        intent.entry_price,
        intent.stop_price,
        intent.capital,
        intent.risk_amount,
        intent.risk_percent,
        status,
        validation_result,
    )
    .await?;

    if !passed {
        if field_issues.is_empty() && guard_issues.is_empty() {
            return Err(IntentError::GateDenied(gate_decision));
        }
        let mut combined = field_issues;
        combined.extend(guard_issues);
        return Err(IntentError::Validation(combined));
    }

    rg_db::intent::fetch_intent(pool, intent_id).await.map_err(Into::into)
}
