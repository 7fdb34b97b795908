use rg_schemas::Money;
use serde::{Deserialize, Serialize};

pub use rg_schemas::{Candle, Side};

/// Confidence attached to a derived stop or, by extension, a sizing result
/// that depends on one. Higher confidence means more corroborating touches
/// or a sturdier algorithm step (§4.1).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Which of the four algorithm steps produced the stop (§4.1).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopMethod {
    SupportResistance,
    SwingPoint,
    Atr,
    Percent,
}

/// A clustered support/resistance level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Level {
    pub price: Money,
    pub touches: u32,
    pub strength: u32,
}

/// Tunable thresholds for [`crate::technical_stop::calculate_technical_stop`].
/// Defaults match spec.md §4.1 exactly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TechnicalStopConfig {
    pub level_tolerance_pct: Money,
    pub min_touches: u32,
    pub level_n: usize,
    pub atr_period: usize,
    pub atr_multiplier: Money,
    pub min_stop_pct: Money,
    pub max_stop_pct: Money,
}

impl Default for TechnicalStopConfig {
    fn default() -> Self {
        use rust_decimal_macros::dec;
        TechnicalStopConfig {
            level_tolerance_pct: dec!(0.005),
            min_touches: 2,
            level_n: 2,
            atr_period: 14,
            atr_multiplier: dec!(1.5),
            min_stop_pct: dec!(0.001),
            max_stop_pct: dec!(0.10),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TechnicalStopResult {
    pub stop_price: Money,
    pub method_used: StopMethod,
    pub confidence: Confidence,
    pub levels: Vec<Level>,
    pub selected_level: Option<Level>,
    pub atr_value: Option<Money>,
    pub warnings: Vec<String>,
}
