//! Pattern Engine (C10, §4.7) shared types: the candle window detectors
//! read, the detector protocol, and the bridge config that turns a CONFIRM
//! alert into an Intent Pipeline call.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use rg_schemas::Candle;

/// Bounded tail window of recent candles — detectors never see more than
/// this many bars. Mirrors `mqk-strategy::types::RecentBarsWindow`'s
/// deterministic-truncation idea, renamed to the candle domain.
#[derive(Clone, Debug, PartialEq)]
pub struct CandleWindow {
    candles: Vec<Candle>,
}

impl CandleWindow {
    /// Keeps only the most recent `max_len` candles (tail truncation).
    pub fn new(max_len: usize, mut candles: Vec<Candle>) -> Self {
        if candles.len() > max_len {
            let start = candles.len() - max_len;
            candles = candles.split_off(start);
        }
        CandleWindow { candles }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    /// `nth_from_end(0)` is the most recent candle, `nth_from_end(1)` the
    /// one before it, and so on.
    pub fn nth_from_end(&self, n: usize) -> Option<&Candle> {
        if n >= self.candles.len() {
            return None;
        }
        self.candles.get(self.candles.len() - 1 - n)
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }
}

/// Evidence a detector attaches to a candidate instance (§3 PatternInstance).
#[derive(Clone, Debug, PartialEq)]
pub struct PatternEvidence {
    pub entry_price: Option<Decimal>,
    pub invalidation_price: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub confidence: Option<String>,
    pub features: Option<Value>,
}

/// One candidate instance a detector's `detect` returns for a given bar.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedPattern {
    pub pattern_code: &'static str,
    pub detection_bar_ts: DateTime<Utc>,
    pub evidence: PatternEvidence,
}

/// Detector protocol (§4.7): `detect` proposes FORMING candidates;
/// `check_confirmation`/`check_invalidation` are re-run on each subsequent
/// scan against the still-FORMING instance to decide whether it becomes
/// CONFIRMED, INVALIDATED, or stays FORMING. Mirrors
/// `mqk-strategy::Strategy`'s `spec()`/`on_bar()` shape, renamed to the
/// pattern-detection domain.
pub trait PatternDetector: Send + Sync {
    fn pattern_code(&self) -> &'static str;

    /// Scan the tail of `window` for new candidates. A detector only ever
    /// proposes a candidate anchored at the window's last candle — the
    /// caller is responsible for re-scanning as new candles arrive.
    fn detect(&self, window: &CandleWindow) -> Vec<DetectedPattern>;

    fn check_confirmation(
        &self,
        instance: &rg_db::pattern::PatternInstanceRow,
        window: &CandleWindow,
    ) -> bool;

    fn check_invalidation(
        &self,
        instance: &rg_db::pattern::PatternInstanceRow,
        window: &CandleWindow,
    ) -> bool;
}

/// §4.7 "Pattern-to-intent bridge": a standing subscription from a
/// (strategy, pattern_code, timeframe) to the Intent Pipeline, consulted on
/// every CONFIRM alert.
#[derive(Clone, Debug, PartialEq)]
pub struct StrategyPatternConfig {
    pub strategy: String,
    pub pattern_code: String,
    pub timeframe: String,
    pub auto_entry_enabled: bool,
    pub entry_mode: EntryMode,
    /// Minimum confidence (as recorded in `PatternEvidence::confidence`,
    /// compared lexically against `"LOW" < "MEDIUM" < "HIGH"`) required for
    /// this config to match a given confirmed instance.
    pub min_confidence: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EntryMode {
    DryRun,
    Live,
}

impl StrategyPatternConfig {
    /// Does this config apply to the given confirmed instance?
    pub fn matches(&self, pattern_code: &str, timeframe: &str, confidence: Option<&str>) -> bool {
        if self.pattern_code != pattern_code || self.timeframe != timeframe {
            return false;
        }
        match (&self.min_confidence, confidence) {
            (Some(min), Some(got)) => confidence_rank(got) >= confidence_rank(min),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

fn confidence_rank(c: &str) -> u8 {
    match c {
        "HIGH" => 2,
        "MEDIUM" => 1,
        _ => 0,
    }
}
