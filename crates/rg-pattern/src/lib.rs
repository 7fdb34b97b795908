//! Pattern Engine (C10, §4.7): candlestick/chart-pattern detection over
//! recent candles, a FORMING -> CONFIRMED/INVALIDATED lifecycle persisted
//! through `rg-db::pattern`, and a bridge from CONFIRMED instances into the
//! Intent Pipeline (C7) gated by standing per-strategy subscriptions.
//! Grounded on the teacher's `mqk-strategy` crate's detection/lifecycle
//! shape with the multi-strategy plugin host dropped — this system runs a
//! fixed set of canonical detectors, not a pluggable strategy runtime.

pub mod bridge;
pub mod detectors;
pub mod engine;
pub mod types;

pub use bridge::{bridge_confirmed_instance, BridgeOutcome};
pub use detectors::canonical_detectors;
pub use engine::{scan, PatternScanOutcome};
pub use types::{
    CandleWindow, DetectedPattern, EntryMode, PatternDetector, PatternEvidence, StrategyPatternConfig,
};
