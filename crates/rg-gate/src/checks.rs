//! The four required Entry Gate checks (§4.3), run unconditionally in a
//! fixed order with no short-circuiting — every check runs and reports,
//! even once the decision is already known to be a denial, so an operator
//! reviewing a decision sees every contributing reason (I8: denial is
//! total — any single failing check makes `allowed=false`).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

use crate::types::{GateCheckResult, GateContext};

/// `available_risk_pct = 4.0 + (monthly_pnl / capital) * 100`;
/// `max_concurrent = floor(available_risk_pct / 1.0)` if positive, else 0.
/// These two constants (4%/month, 1%/position) are fixed, not configurable
/// (§4.3).
pub fn dynamic_position_limit(ctx: &GateContext) -> GateCheckResult {
    let monthly_pnl_pct = if ctx.capital != Decimal::ZERO {
        (ctx.monthly_pnl / ctx.capital) * dec!(100)
    } else {
        Decimal::ZERO
    };
    let available_risk_pct = dec!(4.0) + monthly_pnl_pct;
    let max_concurrent: i64 = if available_risk_pct > Decimal::ZERO {
        available_risk_pct.floor().try_into().unwrap_or(0)
    } else {
        0
    };

    let passed = (ctx.active_position_count as i64) < max_concurrent;
    let message = if passed {
        format!(
            "{}/{} concurrent positions within budget: {:.1}%",
            ctx.active_position_count, max_concurrent, available_risk_pct
        )
    } else {
        format!(
            "{}/{} concurrent positions at budget: {:.1}%",
            ctx.active_position_count, max_concurrent, available_risk_pct
        )
    };

    GateCheckResult {
        gate_name: "DynamicPositionLimit".to_string(),
        passed,
        message,
        details: json!({
            "monthly_pnl": ctx.monthly_pnl,
            "capital": ctx.capital,
            "available_risk_pct": available_risk_pct,
            "max_concurrent": max_concurrent,
            "active_count": ctx.active_position_count,
        }),
    }
}

/// Pass unconditionally if cooldown is disabled. Otherwise pass iff
/// `now - latest_stop_out >= cooldown_seconds`; "latest stop-out" is the
/// most recent STOP_TRIGGERED event for the tenant (§4.3, Open Question 2:
/// only automated STOP_TRIGGERED events reset this, never manual closes).
pub fn stop_out_cooldown(ctx: &GateContext) -> GateCheckResult {
    if !ctx.cooldown_enabled {
        return GateCheckResult {
            gate_name: "StopOutCooldown".to_string(),
            passed: true,
            message: "cooldown disabled".to_string(),
            details: json!({ "enabled": false }),
        };
    }

    let Some(latest_stop_out) = ctx.latest_stop_out else {
        return GateCheckResult {
            gate_name: "StopOutCooldown".to_string(),
            passed: true,
            message: "no prior stop-out on record".to_string(),
            details: json!({ "enabled": true, "latest_stop_out": Option::<()>::None }),
        };
    };

    let elapsed = (ctx.now - latest_stop_out).num_seconds();
    let passed = elapsed >= ctx.stop_out_cooldown_secs;
    let message = if passed {
        format!("cooldown elapsed ({elapsed}s >= {}s)", ctx.stop_out_cooldown_secs)
    } else {
        format!("cooldown active, remaining={}s", ctx.stop_out_cooldown_secs - elapsed)
    };

    GateCheckResult {
        gate_name: "StopOutCooldown".to_string(),
        passed,
        message,
        details: json!({
            "enabled": true,
            "latest_stop_out": latest_stop_out,
            "elapsed_secs": elapsed,
            "cooldown_secs": ctx.stop_out_cooldown_secs,
        }),
    }
}

/// Pass iff `|rate| <= threshold`. Disabled checks always pass. Missing data
/// while enabled fails safe (§4.3).
pub fn funding_rate(ctx: &GateContext) -> GateCheckResult {
    if !ctx.funding_enabled {
        return GateCheckResult {
            gate_name: "FundingRate".to_string(),
            passed: true,
            message: "funding rate check disabled".to_string(),
            details: json!({ "enabled": false }),
        };
    }

    let Some(rate) = ctx.funding_rate else {
        return GateCheckResult {
            gate_name: "FundingRate".to_string(),
            passed: false,
            message: "funding rate unavailable; failing safe".to_string(),
            details: json!({ "enabled": true, "rate": Option::<()>::None }),
        };
    };

    let passed = rate.abs() <= ctx.funding_rate_threshold;
    GateCheckResult {
        gate_name: "FundingRate".to_string(),
        passed,
        message: format!(
            "funding rate {rate} {} threshold {}",
            if passed { "within" } else { "exceeds" },
            ctx.funding_rate_threshold
        ),
        details: json!({ "enabled": true, "rate": rate, "threshold": ctx.funding_rate_threshold }),
    }
}

/// Pass iff `data_age <= max_data_age_seconds`. Disabled checks always
/// pass. Missing data while enabled fails safe (§4.3).
pub fn data_freshness(ctx: &GateContext) -> GateCheckResult {
    if !ctx.data_freshness_enabled {
        return GateCheckResult {
            gate_name: "DataFreshness".to_string(),
            passed: true,
            message: "data freshness check disabled".to_string(),
            details: json!({ "enabled": false }),
        };
    }

    let Some(age) = ctx.data_age_secs else {
        return GateCheckResult {
            gate_name: "DataFreshness".to_string(),
            passed: false,
            message: "market data age unavailable; failing safe".to_string(),
            details: json!({ "enabled": true, "age_secs": Option::<()>::None }),
        };
    };

    let passed = age <= ctx.max_data_age_secs;
    GateCheckResult {
        gate_name: "DataFreshness".to_string(),
        passed,
        message: format!("market data age {age}s (max {}s)", ctx.max_data_age_secs),
        details: json!({ "enabled": true, "age_secs": age, "max_age_secs": ctx.max_data_age_secs }),
    }
}
