//! Pattern-to-intent bridge (§4.7): turns a CONFIRM alert into a call into
//! the Intent Pipeline (C7), gated by a standing [`StrategyPatternConfig`]
//! subscription and de-duplicated on `pattern_instance_id` via
//! `rg_db::pattern::record_pattern_trigger` (I9 — a pattern instance can
//! only ever spawn one intent, no matter how many times a scan revisits
//! it). Only `Side::Buy`/`Side::Sell` entries derived from the instance's
//! own evidence are submitted; the bridge never guesses a direction the
//! detector didn't hand it.

use anyhow::Result;
use rg_db::pattern::PatternInstanceRow;
use rg_execution::{ExecutionPort, MarketDataPort, Side};
use rg_gate::GateContext;
use rg_intent::types::{ExecutionMode, IntentError, PlanInput};
use rg_intent::validate::RiskGuardContext;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::{EntryMode, StrategyPatternConfig};

/// What the bridge did with one CONFIRMED instance against one subscribed
/// config. Kept distinct from a hard error: a config simply not matching,
/// or a trigger already having been recorded, is the expected steady state
/// most scans will see.
#[derive(Debug)]
pub enum BridgeOutcome {
    NoConfigMatched,
    AlreadyProcessed { intent_id: Uuid },
    Submitted { intent_id: Uuid, status: String },
    Rejected { intent_id: Uuid, error: String },
}

/// Side a CONFIRMED instance implies: long if its entry sits above the
/// invalidation level (stop below entry), short otherwise. Patterns with no
/// entry/invalidation evidence can't be bridged at all.
fn implied_side(instance: &PatternInstanceRow) -> Option<Side> {
    let (entry, invalidation) = (instance.entry_price?, instance.invalidation_price?);
    if entry > invalidation {
        Some(Side::Buy)
    } else if entry < invalidation {
        Some(Side::Sell)
    } else {
        None
    }
}

/// Process one CONFIRMED instance against the tenant's standing pattern
/// subscriptions. `pattern_event_id` is the instance's own id — one
/// instance, confirmed once (transitions are sticky), maps to at most one
/// intent no matter how many times this function is called for it.
#[allow(clippy::too_many_arguments)]
pub async fn bridge_confirmed_instance(
    pool: &PgPool,
    market_data: &dyn MarketDataPort,
    execution_port: &dyn ExecutionPort,
    tenant_id: Uuid,
    tenant_capital: rg_schemas::Money,
    configs: &[StrategyPatternConfig],
    instance: &PatternInstanceRow,
    gate_ctx: &GateContext,
    risk_ctx: &RiskGuardContext,
) -> Result<BridgeOutcome> {
    let Some(config) = configs.iter().find(|c| {
        c.auto_entry_enabled
            && c.matches(&instance.pattern_code, &instance.timeframe, instance_confidence(instance))
    }) else {
        return Ok(BridgeOutcome::NoConfigMatched);
    };

    let Some(side) = implied_side(instance) else {
        return Ok(BridgeOutcome::NoConfigMatched);
    };

    let input = PlanInput {
        symbol: instance.symbol.clone(),
        timeframe: instance.timeframe.clone(),
        side: Some(side),
        entry_price: instance.entry_price,
        stop_price: instance.invalidation_price,
        target_price: instance.target_price,
        capital: None,
        quantity: None,
        risk_percent: None,
        confidence: None,
        strategy: Some(config.strategy.clone()),
        pattern_code: Some(instance.pattern_code.clone()),
        pattern_source: Some("pattern_engine".to_string()),
        pattern_event_id: Some(instance.pattern_instance_id),
    };

    let planned = rg_intent::plan(pool, market_data, tenant_id, tenant_capital, input).await?;

    let (recorded_intent_id, already_processed) =
        rg_db::pattern::record_pattern_trigger(pool, tenant_id, instance.pattern_instance_id, planned.intent_id)
            .await?;
    if already_processed {
        return Ok(BridgeOutcome::AlreadyProcessed {
            intent_id: recorded_intent_id,
        });
    }

    let mode = match config.entry_mode {
        EntryMode::DryRun => ExecutionMode::DryRun,
        EntryMode::Live => ExecutionMode::Live,
    };

    let validated = rg_intent::validate(pool, gate_ctx, mode, risk_ctx, planned.intent_id).await;
    let validated = match validated {
        Ok(row) if row.status == "VALIDATED" => row,
        Ok(row) => {
            return Ok(BridgeOutcome::Rejected {
                intent_id: row.intent_id,
                error: "validation failed".to_string(),
            })
        }
        Err(e) => {
            return Ok(BridgeOutcome::Rejected {
                intent_id: planned.intent_id,
                error: e.to_string(),
            })
        }
    };

    match rg_intent::execute(pool, execution_port, validated.intent_id, mode, false, 0).await {
        Ok(row) => Ok(BridgeOutcome::Submitted {
            intent_id: row.intent_id,
            status: row.status,
        }),
        Err(IntentError::PatternLiveBlocked) => Ok(BridgeOutcome::Rejected {
            intent_id: validated.intent_id,
            error: "pattern-triggered intents cannot execute LIVE in this MVP".to_string(),
        }),
        Err(e) => Ok(BridgeOutcome::Rejected {
            intent_id: validated.intent_id,
            error: e.to_string(),
        }),
    }
}

fn instance_confidence(instance: &PatternInstanceRow) -> Option<&str> {
    instance.confidence.as_deref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn instance(entry: rg_schemas::Money, invalidation: rg_schemas::Money) -> PatternInstanceRow {
        PatternInstanceRow {
            pattern_instance_id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            pattern_code: "HAMMER".to_string(),
            symbol: "BTCUSDT".to_string(),
            timeframe: "1h".to_string(),
            status: "CONFIRMED".to_string(),
            detection_bar_ts: chrono::Utc::now(),
            entry_price: Some(entry),
            invalidation_price: Some(invalidation),
            target_price: None,
            confidence: None,
        }
    }

    fn config_with_min_confidence(min_confidence: &str) -> crate::types::StrategyPatternConfig {
        crate::types::StrategyPatternConfig {
            strategy: "breakout".to_string(),
            pattern_code: "HAMMER".to_string(),
            timeframe: "1h".to_string(),
            auto_entry_enabled: true,
            entry_mode: crate::types::EntryMode::DryRun,
            min_confidence: Some(min_confidence.to_string()),
        }
    }

    #[test]
    fn instance_confidence_round_trips_from_the_row() {
        let mut row = instance(dec!(100), dec!(95));
        row.confidence = Some("HIGH".to_string());
        assert_eq!(instance_confidence(&row), Some("HIGH"));
    }

    #[test]
    fn confidence_gated_config_matches_a_sufficiently_confident_instance() {
        let mut row = instance(dec!(100), dec!(95));
        row.confidence = Some("HIGH".to_string());
        let config = config_with_min_confidence("MEDIUM");
        assert!(config.matches(&row.pattern_code, &row.timeframe, instance_confidence(&row)));
    }

    #[test]
    fn confidence_gated_config_rejects_an_insufficiently_confident_instance() {
        let mut row = instance(dec!(100), dec!(95));
        row.confidence = Some("LOW".to_string());
        let config = config_with_min_confidence("MEDIUM");
        assert!(!config.matches(&row.pattern_code, &row.timeframe, instance_confidence(&row)));
    }

    #[test]
    fn implied_side_is_long_when_entry_above_invalidation() {
        let row = instance(dec!(100), dec!(95));
        assert_eq!(implied_side(&row), Some(Side::Buy));
    }

    #[test]
    fn implied_side_is_short_when_entry_below_invalidation() {
        let row = instance(dec!(95), dec!(100));
        assert_eq!(implied_side(&row), Some(Side::Sell));
    }

    #[test]
    fn implied_side_is_none_without_evidence() {
        let mut row = instance(dec!(100), dec!(95));
        row.entry_price = None;
        assert_eq!(implied_side(&row), None);
    }
}
