//! Shared value types for the event-sourced Stop Monitor (C8, §4.5) and the
//! Trailing-Stop Calculator (C9, §4.6).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use rg_schemas::PositionSide;

/// Every guard the monitor evaluates emits a distinguishing event on abort
/// (§4.5 "Guards"). This is a decision value, not an exception — callers
/// branch on it rather than unwinding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StopMonitorError {
    #[error("price for {symbol} is stale (age {age_secs}s > max {max_age_secs}s)")]
    StalePrice {
        symbol: String,
        age_secs: i64,
        max_age_secs: i64,
    },
    #[error("kill switch engaged for tenant {tenant_id}")]
    KillSwitch { tenant_id: Uuid },
    #[error("circuit breaker open for {symbol}, retries at {will_retry_at}")]
    CircuitOpen {
        symbol: String,
        will_retry_at: chrono::DateTime<chrono::Utc>,
    },
    #[error("exchange error submitting stop execution: {0}")]
    Exchange(#[from] rg_execution::ExchangeError),
    #[error("database error: {0}")]
    Db(String),
}

impl From<anyhow::Error> for StopMonitorError {
    fn from(e: anyhow::Error) -> Self {
        StopMonitorError::Db(e.to_string())
    }
}

/// One evaluation input: the Operation under watch plus the latest known
/// price for its symbol. Kept as a plain struct so trigger evaluation stays
/// a pure function of its arguments (§4.5 "Trigger evaluation"), the same
/// shape `rg_gate::GateContext` uses to keep its checks pure.
#[derive(Clone, Debug)]
pub struct StopWatch {
    pub operation_id: Uuid,
    pub tenant_id: Uuid,
    pub symbol: String,
    pub side: PositionSide,
    pub stop_price: Decimal,
    pub quantity: Decimal,
}

/// Computes the stable execution token shared by every event in one
/// execution attempt (§3 StopEvent, §4.5): `hash(operation_id, stop_price,
/// direction)`. Both the price feeder and the backstop poller derive the
/// same token for the same stop level, which is what makes the unique
/// `(operation_id, execution_token)` constraint the exactly-once mechanism
/// (I7).
pub fn execution_token(operation_id: Uuid, stop_price: Decimal, side: PositionSide) -> String {
    let direction = match side {
        PositionSide::Long => "LONG",
        PositionSide::Short => "SHORT",
    };
    rg_schemas::stable_hash(&[&operation_id.to_string(), &stop_price.to_string(), direction])
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceSource {
    Ws,
    Cron,
    Manual,
}

impl PriceSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PriceSource::Ws => "ws",
            PriceSource::Cron => "cron",
            PriceSource::Manual => "manual",
        }
    }
}

/// True iff `current_price` has crossed `stop_price` against `side` (§4.5
/// "Trigger evaluation"): LONG triggers on price at-or-below the stop,
/// SHORT on price at-or-above it.
pub fn is_triggered(side: PositionSide, current_price: Decimal, stop_price: Decimal) -> bool {
    match side {
        PositionSide::Long => current_price <= stop_price,
        PositionSide::Short => current_price >= stop_price,
    }
}
