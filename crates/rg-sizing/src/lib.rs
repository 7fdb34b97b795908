//! Technical Stop Calculator (C4) and Position Sizer (C5): the algorithmic
//! core of the Golden Rule — size follows the stop, never the other way
//! around (spec §4.1, §4.2). Both are pure functions, mirroring the
//! teacher's `mqk-risk::engine` pure-deterministic-decision style.

pub mod sizer;
pub mod technical_stop;
pub mod types;

pub use sizer::{size_position, PositionSizeResult, SizingConfig, SizingError};
pub use technical_stop::calculate_technical_stop;
pub use types::{Candle, Confidence, Level, Side, StopMethod, TechnicalStopConfig, TechnicalStopResult};
