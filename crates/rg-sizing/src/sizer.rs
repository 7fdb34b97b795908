//! Position Sizer (C5, spec §4.2): the Golden Rule. Size follows the stop,
//! never the other way around. Pure function, no IO.

use rg_schemas::Money;
use rust_decimal::RoundingStrategy;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Side;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Fractional digits the exchange allows for quantity on this symbol.
    pub quantity_precision: u32,
    pub max_position_pct: Money,
    pub min_quantity: Money,
}

impl Default for SizingConfig {
    fn default() -> Self {
        SizingConfig {
            quantity_precision: 8,
            max_position_pct: dec!(0.50),
            min_quantity: dec!(0.00000001),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SizingError {
    #[error("capital must be > 0, got {0}")]
    NonPositiveCapital(Money),
    #[error("entry must be > 0, got {0}")]
    NonPositiveEntry(Money),
    #[error("stop is on the wrong side of entry for side {side:?}: entry={entry}, stop={stop}")]
    StopWrongSide { side: Side, entry: Money, stop: Money },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionSizeResult {
    pub quantity: Money,
    pub position_value: Money,
    pub risk_amount: Money,
    pub risk_percent: Money,
    pub is_capped: bool,
    pub cap_reason: Option<String>,
    pub risk_reward_ratio: Option<Money>,
}

/// `quantity = (capital * risk_pct) / |entry - stop|`, then constraints
/// applied in order: zero-distance short-circuit, precision rounding,
/// max-position-value cap, minimum-quantity clamp (§4.2).
pub fn size_position(
    capital: Money,
    entry: Money,
    stop: Money,
    target: Option<Money>,
    side: Side,
    risk_pct: Money,
    config: &SizingConfig,
) -> Result<PositionSizeResult, SizingError> {
    if capital <= Money::ZERO {
        return Err(SizingError::NonPositiveCapital(capital));
    }
    if entry <= Money::ZERO {
        return Err(SizingError::NonPositiveEntry(entry));
    }
    let stop_distance = (entry - stop).abs();

    if stop_distance == Money::ZERO {
        return Ok(PositionSizeResult {
            quantity: Money::ZERO,
            position_value: Money::ZERO,
            risk_amount: Money::ZERO,
            risk_percent: Money::ZERO,
            is_capped: false,
            cap_reason: None,
            risk_reward_ratio: None,
        });
    }

    let side_ok = match side {
        Side::Buy => stop < entry,
        Side::Sell => stop > entry,
    };
    if !side_ok {
        return Err(SizingError::StopWrongSide { side, entry, stop });
    }

    let mut risk_amount = capital * risk_pct;
    let mut quantity = risk_amount / stop_distance;
    quantity = quantity.round_dp_with_strategy(config.quantity_precision, RoundingStrategy::ToZero);

    let mut position_value = quantity * entry;
    let mut is_capped = false;
    let mut cap_reason = None;

    let max_position_value = config.max_position_pct * capital;
    if position_value > max_position_value {
        quantity = (max_position_value / entry)
            .round_dp_with_strategy(config.quantity_precision, RoundingStrategy::ToZero);
        position_value = quantity * entry;
        risk_amount = quantity * stop_distance;
        is_capped = true;
        cap_reason = Some("max_position_pct".to_string());
    }

    if quantity < config.min_quantity {
        quantity = config.min_quantity;
        position_value = quantity * entry;
        risk_amount = quantity * stop_distance;
        is_capped = true;
        cap_reason = Some("below_minimum".to_string());
    }

    let risk_percent = if capital > Money::ZERO {
        (risk_amount / capital) * dec!(100)
    } else {
        Money::ZERO
    };

    let risk_reward_ratio = target.map(|t| {
        let target_distance = (t - entry).abs();
        target_distance / stop_distance
    });

    Ok(PositionSizeResult {
        quantity,
        position_value,
        risk_amount,
        risk_percent,
        is_capped,
        cap_reason,
        risk_reward_ratio,
    })
}
