use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The context one `evaluate_entry_gate` call is run against. Every field a
/// gate check needs is gathered up front so checks stay pure functions of
/// this struct — no check reaches back out to a database or clock itself.
#[derive(Clone, Debug)]
pub struct GateContext {
    pub tenant_id: Uuid,
    pub symbol: String,
    pub now: DateTime<Utc>,

    /// Realized P&L for the current calendar month, same unit as `capital`.
    pub monthly_pnl: Decimal,
    pub capital: Decimal,
    pub active_position_count: u32,

    pub cooldown_enabled: bool,
    pub stop_out_cooldown_secs: i64,
    pub latest_stop_out: Option<DateTime<Utc>>,

    pub funding_enabled: bool,
    pub funding_rate: Option<Decimal>,
    pub funding_rate_threshold: Decimal,

    pub data_freshness_enabled: bool,
    pub data_age_secs: Option<i64>,
    pub max_data_age_secs: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GateCheckResult {
    pub gate_name: String,
    pub passed: bool,
    pub message: String,
    pub details: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntryGateDecision {
    pub allowed: bool,
    pub checks: Vec<GateCheckResult>,
}

impl EntryGateDecision {
    /// Accumulated human-readable reasons from every failed check (§4.3).
    pub fn reasons(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.message.clone())
            .collect()
    }
}
