//! Canonical candlestick / chart-pattern detectors (§4.7). Each is a pure
//! function of a [`CandleWindow`] tail, grounded on the standard
//! candlestick/chart-pattern definitions spec.md's GLOSSARY points to —
//! this system recognizes patterns, it does not predict markets.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

use rg_schemas::Candle;

use crate::types::{CandleWindow, DetectedPattern, PatternDetector, PatternEvidence};

fn body(c: &Candle) -> Decimal {
    (c.close - c.open).abs()
}

fn range(c: &Candle) -> Decimal {
    c.high - c.low
}

fn upper_wick(c: &Candle) -> Decimal {
    c.high - c.open.max(c.close)
}

fn lower_wick(c: &Candle) -> Decimal {
    c.open.min(c.close) - c.low
}

fn is_bullish(c: &Candle) -> bool {
    c.close > c.open
}

fn is_bearish(c: &Candle) -> bool {
    c.close < c.open
}

/// True if the last `n` closes before `window`'s last candle are
/// monotonically decreasing — the "prior downtrend" context single-candle
/// reversal patterns require.
fn prior_downtrend(window: &CandleWindow, n: usize) -> bool {
    let mut prev = match window.nth_from_end(1) {
        Some(c) => c.close,
        None => return false,
    };
    for i in 2..=n {
        let Some(c) = window.nth_from_end(i) else {
            return false;
        };
        if c.close <= prev {
            return false;
        }
        prev = c.close;
    }
    true
}

fn prior_uptrend(window: &CandleWindow, n: usize) -> bool {
    let mut prev = match window.nth_from_end(1) {
        Some(c) => c.close,
        None => return false,
    };
    for i in 2..=n {
        let Some(c) = window.nth_from_end(i) else {
            return false;
        };
        if c.close >= prev {
            return false;
        }
        prev = c.close;
    }
    true
}

/// Risk:reward used to derive a `target_price` from an `entry`/`invalidation`
/// pair when a detector has no more specific target (neckline measured move
/// etc.): a 2R target.
const DEFAULT_REWARD_MULTIPLE: Decimal = dec!(2);

pub struct HammerDetector;

impl PatternDetector for HammerDetector {
    fn pattern_code(&self) -> &'static str {
        "HAMMER"
    }

    fn detect(&self, window: &CandleWindow) -> Vec<DetectedPattern> {
        let Some(c) = window.last() else { return vec![] };
        let b = body(c);
        let r = range(c);
        if r.is_zero() || !prior_downtrend(window, 3) {
            return vec![];
        }
        let lw = lower_wick(c);
        let uw = upper_wick(c);
        if lw >= b * dec!(2) && uw <= b * dec!(0.3) && b / r <= dec!(0.35) {
            let entry = c.high;
            let invalidation = c.low;
            let target = entry + (entry - invalidation) * DEFAULT_REWARD_MULTIPLE;
            return vec![DetectedPattern {
                pattern_code: self.pattern_code(),
                detection_bar_ts: c.open_time,
                evidence: PatternEvidence {
                    entry_price: Some(entry),
                    invalidation_price: Some(invalidation),
                    target_price: Some(target),
                    confidence: Some("MEDIUM".to_string()),
                    features: Some(json!({"body": b, "lower_wick": lw, "upper_wick": uw})),
                },
            }];
        }
        vec![]
    }

    fn check_confirmation(&self, instance: &rg_db::pattern::PatternInstanceRow, window: &CandleWindow) -> bool {
        confirms_above_entry(instance, window)
    }

    fn check_invalidation(&self, instance: &rg_db::pattern::PatternInstanceRow, window: &CandleWindow) -> bool {
        invalidates_below(instance, window)
    }
}

pub struct InvertedHammerDetector;

impl PatternDetector for InvertedHammerDetector {
    fn pattern_code(&self) -> &'static str {
        "INVERTED_HAMMER"
    }

    fn detect(&self, window: &CandleWindow) -> Vec<DetectedPattern> {
        let Some(c) = window.last() else { return vec![] };
        let b = body(c);
        let r = range(c);
        if r.is_zero() || !prior_downtrend(window, 3) {
            return vec![];
        }
        let lw = lower_wick(c);
        let uw = upper_wick(c);
        if uw >= b * dec!(2) && lw <= b * dec!(0.3) && b / r <= dec!(0.35) {
            let entry = c.high;
            let invalidation = c.low;
            let target = entry + (entry - invalidation) * DEFAULT_REWARD_MULTIPLE;
            return vec![DetectedPattern {
                pattern_code: self.pattern_code(),
                detection_bar_ts: c.open_time,
                evidence: PatternEvidence {
                    entry_price: Some(entry),
                    invalidation_price: Some(invalidation),
                    target_price: Some(target),
                    confidence: Some("MEDIUM".to_string()),
                    features: Some(json!({"body": b, "lower_wick": lw, "upper_wick": uw})),
                },
            }];
        }
        vec![]
    }

    fn check_confirmation(&self, instance: &rg_db::pattern::PatternInstanceRow, window: &CandleWindow) -> bool {
        confirms_above_entry(instance, window)
    }

    fn check_invalidation(&self, instance: &rg_db::pattern::PatternInstanceRow, window: &CandleWindow) -> bool {
        invalidates_below(instance, window)
    }
}

pub struct BullishEngulfingDetector;

impl PatternDetector for BullishEngulfingDetector {
    fn pattern_code(&self) -> &'static str {
        "BULLISH_ENGULFING"
    }

    fn detect(&self, window: &CandleWindow) -> Vec<DetectedPattern> {
        let (Some(prev), Some(cur)) = (window.nth_from_end(1), window.last()) else {
            return vec![];
        };
        if !is_bearish(prev) || !is_bullish(cur) {
            return vec![];
        }
        if !(cur.open <= prev.close && cur.close >= prev.open) {
            return vec![];
        }
        let entry = cur.close;
        let invalidation = cur.low.min(prev.low);
        let target = entry + (entry - invalidation) * DEFAULT_REWARD_MULTIPLE;
        vec![DetectedPattern {
            pattern_code: self.pattern_code(),
            detection_bar_ts: cur.open_time,
            evidence: PatternEvidence {
                entry_price: Some(entry),
                invalidation_price: Some(invalidation),
                target_price: Some(target),
                confidence: Some("MEDIUM".to_string()),
                features: Some(json!({"prev_body": body(prev), "cur_body": body(cur)})),
            },
        }]
    }

    fn check_confirmation(&self, instance: &rg_db::pattern::PatternInstanceRow, window: &CandleWindow) -> bool {
        confirms_above_entry(instance, window)
    }

    fn check_invalidation(&self, instance: &rg_db::pattern::PatternInstanceRow, window: &CandleWindow) -> bool {
        invalidates_below(instance, window)
    }
}

pub struct BearishEngulfingDetector;

impl PatternDetector for BearishEngulfingDetector {
    fn pattern_code(&self) -> &'static str {
        "BEARISH_ENGULFING"
    }

    fn detect(&self, window: &CandleWindow) -> Vec<DetectedPattern> {
        let (Some(prev), Some(cur)) = (window.nth_from_end(1), window.last()) else {
            return vec![];
        };
        if !is_bullish(prev) || !is_bearish(cur) {
            return vec![];
        }
        if !(cur.open >= prev.close && cur.close <= prev.open) {
            return vec![];
        }
        let entry = cur.close;
        let invalidation = cur.high.max(prev.high);
        let target = entry - (invalidation - entry) * DEFAULT_REWARD_MULTIPLE;
        vec![DetectedPattern {
            pattern_code: self.pattern_code(),
            detection_bar_ts: cur.open_time,
            evidence: PatternEvidence {
                entry_price: Some(entry),
                invalidation_price: Some(invalidation),
                target_price: Some(target),
                confidence: Some("MEDIUM".to_string()),
                features: Some(json!({"prev_body": body(prev), "cur_body": body(cur)})),
            },
        }]
    }

    fn check_confirmation(&self, instance: &rg_db::pattern::PatternInstanceRow, window: &CandleWindow) -> bool {
        confirms_below_entry(instance, window)
    }

    fn check_invalidation(&self, instance: &rg_db::pattern::PatternInstanceRow, window: &CandleWindow) -> bool {
        invalidates_above(instance, window)
    }
}

/// Three-bar bullish reversal: a bearish candle, a small-bodied candle
/// gapping (or closing) lower, then a bullish candle closing back above the
/// midpoint of the first candle's body.
pub struct MorningStarDetector;

impl PatternDetector for MorningStarDetector {
    fn pattern_code(&self) -> &'static str {
        "MORNING_STAR"
    }

    fn detect(&self, window: &CandleWindow) -> Vec<DetectedPattern> {
        let (Some(first), Some(star), Some(third)) =
            (window.nth_from_end(2), window.nth_from_end(1), window.last())
        else {
            return vec![];
        };
        if !is_bearish(first) {
            return vec![];
        }
        let first_mid = (first.open + first.close) / dec!(2);
        let star_is_small = body(star) <= body(first) * dec!(0.4);
        let star_gapped_down = star.open.max(star.close) <= first.close;
        if !(star_is_small && star_gapped_down) {
            return vec![];
        }
        if !(is_bullish(third) && third.close >= first_mid) {
            return vec![];
        }
        let entry = third.close;
        let invalidation = star.low.min(first.low);
        let target = entry + (entry - invalidation) * DEFAULT_REWARD_MULTIPLE;
        vec![DetectedPattern {
            pattern_code: self.pattern_code(),
            detection_bar_ts: third.open_time,
            evidence: PatternEvidence {
                entry_price: Some(entry),
                invalidation_price: Some(invalidation),
                target_price: Some(target),
                confidence: Some("HIGH".to_string()),
                features: Some(json!({"first_mid": first_mid})),
            },
        }]
    }

    fn check_confirmation(&self, instance: &rg_db::pattern::PatternInstanceRow, window: &CandleWindow) -> bool {
        confirms_above_entry(instance, window)
    }

    fn check_invalidation(&self, instance: &rg_db::pattern::PatternInstanceRow, window: &CandleWindow) -> bool {
        invalidates_below(instance, window)
    }
}

/// Bearish reversal: three peaks over a window, the middle (head) strictly
/// higher than both shoulders, shoulders roughly level, identified against
/// the neckline (the lower of the two troughs between the peaks).
pub struct HeadAndShouldersDetector;

/// Largest relative difference tolerated between the two shoulder highs.
const SHOULDER_SYMMETRY_TOLERANCE: Decimal = dec!(0.03);

impl PatternDetector for HeadAndShouldersDetector {
    fn pattern_code(&self) -> &'static str {
        "HEAD_AND_SHOULDERS"
    }

    fn detect(&self, window: &CandleWindow) -> Vec<DetectedPattern> {
        // Five-candle skeleton: left shoulder, trough, head, trough, right
        // shoulder (the last candle in the window).
        let candles: Vec<&Candle> = (0..5).rev().filter_map(|i| window.nth_from_end(i)).collect();
        if candles.len() != 5 {
            return vec![];
        }
        let [left_shoulder, left_trough, head, right_trough, right_shoulder] =
            [candles[0], candles[1], candles[2], candles[3], candles[4]];

        if !(head.high > left_shoulder.high && head.high > right_shoulder.high) {
            return vec![];
        }
        let shoulder_diff = (left_shoulder.high - right_shoulder.high).abs();
        let shoulder_avg = (left_shoulder.high + right_shoulder.high) / dec!(2);
        if shoulder_avg.is_zero() || shoulder_diff / shoulder_avg > SHOULDER_SYMMETRY_TOLERANCE {
            return vec![];
        }
        let neckline = left_trough.low.min(right_trough.low);
        if right_shoulder.close >= neckline {
            // Neckline not yet broken: still forming, not yet a candidate.
            return vec![];
        }

        let entry = right_shoulder.close;
        let invalidation = head.high;
        let measured_move = head.high - neckline;
        let target = neckline - measured_move;
        vec![DetectedPattern {
            pattern_code: self.pattern_code(),
            detection_bar_ts: right_shoulder.open_time,
            evidence: PatternEvidence {
                entry_price: Some(entry),
                invalidation_price: Some(invalidation),
                target_price: Some(target),
                confidence: Some("HIGH".to_string()),
                features: Some(json!({"neckline": neckline, "head_high": head.high})),
            },
        }]
    }

    fn check_confirmation(&self, instance: &rg_db::pattern::PatternInstanceRow, window: &CandleWindow) -> bool {
        confirms_below_entry(instance, window)
    }

    fn check_invalidation(&self, instance: &rg_db::pattern::PatternInstanceRow, window: &CandleWindow) -> bool {
        invalidates_above(instance, window)
    }
}

/// Bullish mirror of [`HeadAndShouldersDetector`]: three troughs, the
/// middle (head) strictly lower than both shoulders.
pub struct InvertedHeadAndShouldersDetector;

impl PatternDetector for InvertedHeadAndShouldersDetector {
    fn pattern_code(&self) -> &'static str {
        "INVERTED_HEAD_AND_SHOULDERS"
    }

    fn detect(&self, window: &CandleWindow) -> Vec<DetectedPattern> {
        let candles: Vec<&Candle> = (0..5).rev().filter_map(|i| window.nth_from_end(i)).collect();
        if candles.len() != 5 {
            return vec![];
        }
        let [left_shoulder, left_peak, head, right_peak, right_shoulder] =
            [candles[0], candles[1], candles[2], candles[3], candles[4]];

        if !(head.low < left_shoulder.low && head.low < right_shoulder.low) {
            return vec![];
        }
        let shoulder_diff = (left_shoulder.low - right_shoulder.low).abs();
        let shoulder_avg = (left_shoulder.low + right_shoulder.low) / dec!(2);
        if shoulder_avg.is_zero() || shoulder_diff / shoulder_avg > SHOULDER_SYMMETRY_TOLERANCE {
            return vec![];
        }
        let neckline = left_peak.high.max(right_peak.high);
        if right_shoulder.close <= neckline {
            return vec![];
        }

        let entry = right_shoulder.close;
        let invalidation = head.low;
        let measured_move = neckline - head.low;
        let target = neckline + measured_move;
        vec![DetectedPattern {
            pattern_code: self.pattern_code(),
            detection_bar_ts: right_shoulder.open_time,
            evidence: PatternEvidence {
                entry_price: Some(entry),
                invalidation_price: Some(invalidation),
                target_price: Some(target),
                confidence: Some("HIGH".to_string()),
                features: Some(json!({"neckline": neckline, "head_low": head.low})),
            },
        }]
    }

    fn check_confirmation(&self, instance: &rg_db::pattern::PatternInstanceRow, window: &CandleWindow) -> bool {
        confirms_above_entry(instance, window)
    }

    fn check_invalidation(&self, instance: &rg_db::pattern::PatternInstanceRow, window: &CandleWindow) -> bool {
        invalidates_below(instance, window)
    }
}

fn confirms_above_entry(instance: &rg_db::pattern::PatternInstanceRow, window: &CandleWindow) -> bool {
    match (instance.entry_price, window.last()) {
        (Some(entry), Some(c)) => c.close >= entry,
        _ => false,
    }
}

fn confirms_below_entry(instance: &rg_db::pattern::PatternInstanceRow, window: &CandleWindow) -> bool {
    match (instance.entry_price, window.last()) {
        (Some(entry), Some(c)) => c.close <= entry,
        _ => false,
    }
}

fn invalidates_below(instance: &rg_db::pattern::PatternInstanceRow, window: &CandleWindow) -> bool {
    match (instance.invalidation_price, window.last()) {
        (Some(inv), Some(c)) => c.close < inv,
        _ => false,
    }
}

fn invalidates_above(instance: &rg_db::pattern::PatternInstanceRow, window: &CandleWindow) -> bool {
    match (instance.invalidation_price, window.last()) {
        (Some(inv), Some(c)) => c.close > inv,
        _ => false,
    }
}

/// All canonical detectors, ready to register with [`crate::engine::scan`].
pub fn canonical_detectors() -> Vec<Box<dyn PatternDetector>> {
    vec![
        Box::new(HammerDetector),
        Box::new(InvertedHammerDetector),
        Box::new(BullishEngulfingDetector),
        Box::new(BearishEngulfingDetector),
        Box::new(MorningStarDetector),
        Box::new(HeadAndShouldersDetector),
        Box::new(InvertedHeadAndShouldersDetector),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candle(ts: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Candle {
        Candle {
            open_time: Utc.timestamp_opt(ts, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: dec!(100),
        }
    }

    #[test]
    fn hammer_detects_on_long_lower_wick_after_downtrend() {
        let window = CandleWindow::new(
            10,
            vec![
                candle(0, dec!(110), dec!(111), dec!(108), dec!(109)),
                candle(1, dec!(109), dec!(110), dec!(106), dec!(107)),
                candle(2, dec!(107), dec!(108), dec!(104), dec!(105)),
                // hammer: small body near top, long lower wick
                candle(3, dec!(105), dec!(105.2), dec!(100), dec!(105.1)),
            ],
        );
        let found = HammerDetector.detect(&window);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pattern_code, "HAMMER");
        assert_eq!(found[0].evidence.invalidation_price, Some(dec!(100)));
    }

    #[test]
    fn bullish_engulfing_requires_full_body_engulf() {
        let window = CandleWindow::new(
            10,
            vec![
                candle(0, dec!(110), dec!(111), dec!(100), dec!(105)), // bearish
                candle(1, dec!(104), dec!(115), dec!(103), dec!(112)), // bullish, engulfs
            ],
        );
        let found = BullishEngulfingDetector.detect(&window);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].evidence.entry_price, Some(dec!(112)));
    }

    #[test]
    fn bearish_engulfing_does_not_fire_on_partial_overlap() {
        let window = CandleWindow::new(
            10,
            vec![
                candle(0, dec!(100), dec!(110), dec!(99), dec!(108)), // bullish
                candle(1, dec!(107), dec!(109), dec!(103), dec!(104)), // bearish, partial
            ],
        );
        let found = BearishEngulfingDetector.detect(&window);
        assert!(found.is_empty());
    }

    #[test]
    fn morning_star_detects_three_bar_reversal() {
        let window = CandleWindow::new(
            10,
            vec![
                candle(0, dec!(110), dec!(111), dec!(100), dec!(101)), // big bearish
                candle(1, dec!(99), dec!(100), dec!(97), dec!(98)),    // small, gapped down
                candle(2, dec!(99), dec!(108), dec!(98), dec!(107)),  // bullish, closes into body
            ],
        );
        let found = MorningStarDetector.detect(&window);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn head_and_shoulders_requires_neckline_break() {
        let window = CandleWindow::new(
            10,
            vec![
                candle(0, dec!(100), dec!(110), dec!(99), dec!(105)),  // left shoulder
                candle(1, dec!(105), dec!(106), dec!(95), dec!(96)),   // left trough
                candle(2, dec!(96), dec!(120), dec!(95), dec!(110)),   // head
                candle(3, dec!(110), dec!(111), dec!(94), dec!(95)),   // right trough
                candle(4, dec!(95), dec!(108), dec!(90), dec!(92)),    // right shoulder, breaks neckline
            ],
        );
        let found = HeadAndShouldersDetector.detect(&window);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].evidence.invalidation_price, Some(dec!(120)));
    }
}
