//! Shared wire/domain value types used across the risk-gated trade lifecycle
//! engine. Kept deliberately small: this crate owns only the vocabulary that
//! more than one other crate needs (sides, money scale, event envelopes,
//! stable hashing for idempotency keys), mirroring how the teacher
//! workspace's schemas crate holds only cross-cutting wire shapes and
//! leaves entity-specific types to the crate that owns them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// All money, price, and quantity fields use `rust_decimal::Decimal` rather
/// than binary floating point. See DESIGN.md for why this departs from the
/// teacher's integer-micros scheme.
pub type Money = rust_decimal::Decimal;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Position direction, distinct from order `Side`: a LONG position is closed
/// by a SELL order and vice versa. Kept separate because the trailing-stop
/// and stop-monitor math is naturally expressed in terms of position
/// direction, not order side.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// The order side that closes a position of this direction.
    pub fn closing_side(self) -> Side {
        match self {
            PositionSide::Long => Side::Sell,
            PositionSide::Short => Side::Buy,
        }
    }
}

/// A single OHLCV candle, as returned by the Market Data Port (spec §6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Money,
    pub high: Money,
    pub low: Money,
    pub close: Money,
    pub volume: Money,
}

/// Generic event envelope for anything published through the audit log or
/// the stop-monitor outbox. Mirrors the teacher's `EventEnvelope<T>` shape
/// (event_id/run_id/ts_utc/correlation_id/causation_id) almost verbatim;
/// `run_id` is renamed `tenant_id` here because this system's unit of
/// isolation is the tenant, not a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    pub event_id: Uuid,
    pub tenant_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub causation_id: Option<Uuid>,
    pub topic: String,
    pub event_type: String,
    pub payload: T,
}

/// Derive a deterministic, stable hex digest from an ordered list of parts.
/// Used for execution tokens (`hash(operation_id, stop_price, direction)`)
/// and idempotency keys (`hash(intent_id, "execute", nonce)`), exactly the
/// derivation contract the teacher's `mqk-audit::derive_event_id` documents
/// (deterministic from inputs, no RNG).
pub fn stable_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, p) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\x1f"); // unit separator; avoids ("ab","c") == ("a","bc") collisions
        }
        hasher.update(p.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_hash_is_deterministic() {
        let a = stable_hash(&["op-1", "90000", "LONG"]);
        let b = stable_hash(&["op-1", "90000", "LONG"]);
        assert_eq!(a, b);
    }

    #[test]
    fn stable_hash_distinguishes_part_boundaries() {
        let a = stable_hash(&["ab", "c"]);
        let b = stable_hash(&["a", "bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn position_side_closing_side() {
        assert_eq!(PositionSide::Long.closing_side(), Side::Sell);
        assert_eq!(PositionSide::Short.closing_side(), Side::Buy);
    }
}
