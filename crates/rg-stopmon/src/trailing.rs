//! Trailing-Stop Calculator (C9, §4.6): a pure function over
//! [`TrailingStopState`] that steps a stop forward in fixed "span" units as a
//! position moves into profit. Mirrors `mqk-risk::engine`'s
//! config-struct-in, result-struct-out shape — no IO, no clock reads, fully
//! deterministic given its inputs.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::PositionSide;

/// Fee assumptions the break-even step (§4.6 step 1) needs to clear the
/// round-trip cost before calling a stop "break-even". Defaults per §4.6:
/// 0.1% trading fee + 0.05% slippage buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrailingFeeConfig {
    pub trading_fee_pct: Decimal,
    pub slippage_buffer_pct: Decimal,
}

impl TrailingFeeConfig {
    pub fn total_fee_pct(&self) -> Decimal {
        self.trading_fee_pct + self.slippage_buffer_pct
    }
}

impl Default for TrailingFeeConfig {
    fn default() -> Self {
        TrailingFeeConfig {
            trading_fee_pct: dec!(0.1),
            slippage_buffer_pct: dec!(0.05),
        }
    }
}

/// A position under trailing-stop management (§3 TrailingStopState).
#[derive(Clone, Debug, PartialEq)]
pub struct TrailingStopState {
    pub position_id: Uuid,
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub initial_stop: Decimal,
    pub current_stop: Decimal,
    pub quantity: Decimal,
}

impl TrailingStopState {
    /// §3 "Derived: span = |entry − initial_stop|".
    pub fn span(&self) -> Decimal {
        (self.entry_price - self.initial_stop).abs()
    }

    /// §3 "spans_in_profit (integer floor of |current − entry| / span when
    /// in profit, else 0)".
    pub fn spans_in_profit(&self, current_price: Decimal) -> i64 {
        let in_profit = match self.side {
            PositionSide::Long => current_price > self.entry_price,
            PositionSide::Short => current_price < self.entry_price,
        };
        if !in_profit {
            return 0;
        }
        let span = self.span();
        if span.is_zero() {
            return 0;
        }
        let ratio = (current_price - self.entry_price).abs() / span;
        // Non-negative by construction (`in_profit` guarantees the numerator
        // and span share sign after the abs()), so trunc() == floor().
        ratio.trunc().to_i64().unwrap_or(0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentReason {
    NoAdjustment,
    BreakEven,
    Trailing,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StopAdjustment {
    pub old_stop: Decimal,
    pub new_stop: Decimal,
    pub reason: AdjustmentReason,
    pub step_index: i64,
    pub spans_crossed: i64,
    pub adjustment_token: String,
}

/// §4.6 "adjustment_token = position_id + \":adjust:\" + floor(current_time_ms
/// / 1000)": duplicate submissions within the same second collapse onto the
/// same token, which `rg_db::trailing::apply_adjustment` uses as its
/// idempotency key.
pub fn adjustment_token(position_id: Uuid, current_time_ms: i64) -> String {
    format!("{position_id}:adjust:{}", current_time_ms / 1000)
}

/// Steps `state.current_stop` forward per §4.6's algorithm (LONG case
/// described; SHORT is mirrored via [`PositionSide`]'s sign flip).
///
/// The **monotonic invariant** (I6) is enforced here, not just documented:
/// any computed `new_stop` that would loosen the stop (less than
/// `current_stop` for LONG, greater for SHORT) is discarded and the
/// adjustment downgrades to `NoAdjustment` with `current_stop` unchanged.
pub fn calculate_adjustment(
    state: &TrailingStopState,
    current_price: Decimal,
    fees: &TrailingFeeConfig,
    current_time_ms: i64,
) -> StopAdjustment {
    let token = adjustment_token(state.position_id, current_time_ms);
    let spans = state.spans_in_profit(current_price);

    let (reason, candidate) = if spans < 1 {
        (AdjustmentReason::NoAdjustment, state.current_stop)
    } else if spans == 1 {
        let total_fee = fees.total_fee_pct() / dec!(100);
        let be_stop = match state.side {
            PositionSide::Long => state.entry_price * (Decimal::ONE + total_fee),
            PositionSide::Short => state.entry_price / (Decimal::ONE + total_fee),
        };
        (AdjustmentReason::BreakEven, be_stop)
    } else {
        let span = state.span();
        let steps = Decimal::from(spans - 1);
        let trail_stop = match state.side {
            PositionSide::Long => state.entry_price + steps * span,
            PositionSide::Short => state.entry_price - steps * span,
        };
        (AdjustmentReason::Trailing, trail_stop)
    };

    let tightens = match state.side {
        PositionSide::Long => candidate >= state.current_stop,
        PositionSide::Short => candidate <= state.current_stop,
    };

    if !tightens || reason == AdjustmentReason::NoAdjustment {
        return StopAdjustment {
            old_stop: state.current_stop,
            new_stop: state.current_stop,
            reason: AdjustmentReason::NoAdjustment,
            step_index: spans,
            spans_crossed: spans,
            adjustment_token: token,
        };
    }

    StopAdjustment {
        old_stop: state.current_stop,
        new_stop: candidate,
        reason,
        step_index: spans,
        spans_crossed: spans,
        adjustment_token: token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn long_state() -> TrailingStopState {
        TrailingStopState {
            position_id: Uuid::nil(),
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Long,
            entry_price: dec!(50000),
            initial_stop: dec!(49000),
            current_stop: dec!(49000),
            quantity: dec!(1),
        }
    }

    /// Scenario 6 of spec.md §8: entry=50000, initial_stop=49000 (span=1000).
    #[test]
    fn scenario_6_trailing_steps() {
        let fees = TrailingFeeConfig::default();
        let mut state = long_state();

        let adj = calculate_adjustment(&state, dec!(50500), &fees, 0);
        assert_eq!(adj.reason, AdjustmentReason::NoAdjustment);
        assert_eq!(adj.new_stop, dec!(49000));
        state.current_stop = adj.new_stop;

        let adj = calculate_adjustment(&state, dec!(51000), &fees, 1_000);
        assert_eq!(adj.reason, AdjustmentReason::BreakEven);
        assert_eq!(adj.new_stop, dec!(50075.00));
        state.current_stop = adj.new_stop;

        let adj = calculate_adjustment(&state, dec!(52000), &fees, 2_000);
        assert_eq!(adj.reason, AdjustmentReason::Trailing);
        assert_eq!(adj.new_stop, dec!(51000));
        state.current_stop = adj.new_stop;

        let adj = calculate_adjustment(&state, dec!(53000), &fees, 3_000);
        assert_eq!(adj.reason, AdjustmentReason::Trailing);
        assert_eq!(adj.new_stop, dec!(52000));
        state.current_stop = adj.new_stop;

        // Price drops back to 52500 after touching 53000: would compute
        // spans_in_profit = 2 -> new_stop 51000, which loosens the 52000
        // stop already set, so this must be NO_ADJUSTMENT (monotonic).
        let adj = calculate_adjustment(&state, dec!(52500), &fees, 4_000);
        assert_eq!(adj.reason, AdjustmentReason::NoAdjustment);
        assert_eq!(adj.new_stop, dec!(52000));
    }

    #[test]
    fn duplicate_token_within_same_second() {
        let a = adjustment_token(Uuid::nil(), 1_700_000_000_123);
        let b = adjustment_token(Uuid::nil(), 1_700_000_000_987);
        assert_eq!(a, b);
        let c = adjustment_token(Uuid::nil(), 1_700_000_001_000);
        assert_ne!(a, c);
    }

    #[test]
    fn short_mirrors_long() {
        let fees = TrailingFeeConfig::default();
        let state = TrailingStopState {
            position_id: Uuid::nil(),
            symbol: "BTCUSDT".to_string(),
            side: PositionSide::Short,
            entry_price: dec!(50000),
            initial_stop: dec!(51000),
            current_stop: dec!(51000),
            quantity: dec!(1),
        };
        let adj = calculate_adjustment(&state, dec!(48000), &fees, 0);
        assert_eq!(adj.reason, AdjustmentReason::Trailing);
        assert!(adj.new_stop < state.current_stop);
    }

    proptest! {
        /// I6: for any LONG position and any sequence of prices, the
        /// sequence of `current_stop` values is non-decreasing.
        #[test]
        fn prop_long_monotonic_non_decreasing(
            prices in prop::collection::vec(40_000i64..70_000i64, 1..30)
        ) {
            let fees = TrailingFeeConfig::default();
            let mut state = long_state();
            for (i, p) in prices.into_iter().enumerate() {
                let price = Decimal::from(p);
                let adj = calculate_adjustment(&state, price, &fees, i as i64 * 2_000);
                prop_assert!(adj.new_stop >= state.current_stop);
                state.current_stop = adj.new_stop;
            }
        }

        /// I6 mirrored: SHORT stops are non-increasing.
        #[test]
        fn prop_short_monotonic_non_increasing(
            prices in prop::collection::vec(30_000i64..60_000i64, 1..30)
        ) {
            let fees = TrailingFeeConfig::default();
            let mut state = TrailingStopState {
                position_id: Uuid::nil(),
                symbol: "BTCUSDT".to_string(),
                side: PositionSide::Short,
                entry_price: dec!(50000),
                initial_stop: dec!(51000),
                current_stop: dec!(51000),
                quantity: dec!(1),
            };
            for (i, p) in prices.into_iter().enumerate() {
                let price = Decimal::from(p);
                let adj = calculate_adjustment(&state, price, &fees, i as i64 * 2_000);
                prop_assert!(adj.new_stop <= state.current_stop);
                state.current_stop = adj.new_stop;
            }
        }
    }
}
