//! Per-tenant trading configuration: the kill switch and the threshold
//! battery the Entry Gate (C6), Stop Monitor (C8), and Intent Pipeline (C7)
//! read before acting on a tenant's capital. Loaded from the same layered
//! YAML config as the rest of the engine (see [`crate::load_layered_yaml`])
//! under the `/tenant` pointer, and overridable per tenant from the
//! `tenant_config` table (see rg-db).

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trading thresholds and the kill switch for a single tenant.
///
/// `Default` matches the defaults spec.md §5 names explicitly: a tenant row
/// absent from config gets these, not a zeroed-out struct that would fail
/// closed for the wrong reason.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    pub tenant_id: Uuid,

    /// Master kill switch. `false` blocks LIVE execution and new Operations
    /// outright, independent of any other check.
    pub trading_enabled: bool,

    /// Minimum seconds after a stop-out before the same symbol may be
    /// re-entered for this tenant.
    pub stop_out_cooldown_secs: i64,

    /// Maximum age, in seconds, of the last candle/tick before the Entry
    /// Gate treats market data as stale and denies entry.
    pub max_data_age_secs: i64,

    /// Funding-rate magnitude above which the Entry Gate denies entry on a
    /// perpetual symbol.
    pub funding_rate_threshold: Decimal,

    /// Maximum slippage, as a fraction of expected fill price, tolerated on
    /// a single execution before it is flagged.
    pub max_slippage_pct: Decimal,

    /// Slippage fraction at which the circuit breaker pauses the symbol
    /// rather than merely flagging the fill.
    pub slippage_pause_threshold_pct: Decimal,

    /// Execution rate limits, per tenant.
    pub max_executions_per_minute: u32,
    pub max_executions_per_hour: u32,

    /// Consecutive exchange failures before the per-symbol circuit breaker
    /// opens.
    pub circuit_breaker_failure_threshold: u32,

    /// Seconds an open circuit breaker stays open before probing
    /// half-open.
    pub circuit_breaker_retry_delay_secs: i64,
}

impl TenantConfig {
    /// Defaults from spec.md §5: cooldown 900s, max data age 300s, funding
    /// threshold 0.0001, max slippage 5%, slippage pause threshold 10%, max
    /// executions/min 10, max/hour 100, circuit-breaker failure threshold 3,
    /// retry delay 300s.
    pub fn defaults(tenant_id: Uuid) -> Self {
        TenantConfig {
            tenant_id,
            trading_enabled: false,
            stop_out_cooldown_secs: 900,
            max_data_age_secs: 300,
            funding_rate_threshold: dec!(0.0001),
            max_slippage_pct: dec!(0.05),
            slippage_pause_threshold_pct: dec!(0.10),
            max_executions_per_minute: 10,
            max_executions_per_hour: 100,
            circuit_breaker_failure_threshold: 3,
            circuit_breaker_retry_delay_secs: 300,
        }
    }
}
