//! Pattern Engine scan/persistence loop (§4.7): each pass pulls recent
//! candles, runs every canonical detector over the tail to emit new FORMING
//! candidates, then re-evaluates every still-FORMING instance for the
//! symbol/timeframe against confirmation/invalidation. Grounded on the
//! teacher's `mqk-strategy::host::StrategyHost::on_bar` drive loop,
//! generalized from a strategy-signal fan-out to the detector protocol in
//! [`crate::types`].

use anyhow::{Context, Result};
use rg_db::pattern::PatternInstanceRow;
use rg_execution::MarketDataPort;
use uuid::Uuid;

use crate::types::{CandleWindow, PatternDetector};

/// Candles kept in the tail window handed to detectors — enough for the
/// five-bar Head & Shoulders skeleton plus a little slack.
const WINDOW_LOOKBACK: usize = 20;

#[derive(Debug, Clone)]
pub enum PatternScanOutcome {
    Detected(PatternInstanceRow),
    Confirmed(PatternInstanceRow),
    Invalidated(PatternInstanceRow),
}

/// Run one scan pass for a symbol/timeframe. Idempotent: re-running against
/// the same candle tail detects nothing new (the instance already exists,
/// §4.7's `(symbol, timeframe, pattern_code, detection_bar_ts)` unique
/// constraint) and re-checks the same FORMING instances the same way.
pub async fn scan(
    pool: &sqlx::PgPool,
    market_data: &dyn MarketDataPort,
    tenant_id: Uuid,
    symbol: &str,
    timeframe: &str,
    detectors: &[Box<dyn PatternDetector>],
) -> Result<Vec<PatternScanOutcome>> {
    let candles = market_data
        .klines(symbol, timeframe, WINDOW_LOOKBACK)
        .await
        .context("klines fetch failed")?;
    let window = CandleWindow::new(WINDOW_LOOKBACK, candles);

    let mut outcomes = Vec::new();

    for detector in detectors {
        for candidate in detector.detect(&window) {
            let new = rg_db::pattern::NewPatternInstance {
                pattern_instance_id: Uuid::new_v4(),
                tenant_id,
                pattern_code: candidate.pattern_code.to_string(),
                symbol: symbol.to_string(),
                timeframe: timeframe.to_string(),
                detection_bar_ts: candidate.detection_bar_ts,
                entry_price: candidate.evidence.entry_price,
                invalidation_price: candidate.evidence.invalidation_price,
                target_price: candidate.evidence.target_price,
                confidence: candidate.evidence.confidence.clone(),
                features: candidate.evidence.features.clone(),
            };
            let (instance, inserted) = rg_db::pattern::insert_or_get_instance(pool, &new).await?;
            if inserted {
                rg_db::pattern::insert_alert(
                    pool,
                    Uuid::new_v4(),
                    tenant_id,
                    instance.pattern_instance_id,
                    "DETECTED",
                )
                .await?;
                outcomes.push(PatternScanOutcome::Detected(instance));
            }
        }
    }

    let forming = rg_db::pattern::list_forming_instances(pool, tenant_id, symbol, timeframe).await?;
    for instance in forming {
        let Some(detector) = detectors.iter().find(|d| d.pattern_code() == instance.pattern_code) else {
            continue;
        };

        // Invalidation is checked first: a bar that both breaks the stop and
        // happens to also satisfy the confirmation predicate is a loss, not
        // a win (§4.7 edge case).
        if detector.check_invalidation(&instance, &window) {
            if rg_db::pattern::transition_instance(pool, instance.pattern_instance_id, "INVALIDATED").await? {
                rg_db::pattern::insert_alert(
                    pool,
                    Uuid::new_v4(),
                    tenant_id,
                    instance.pattern_instance_id,
                    "INVALIDATED",
                )
                .await?;
                outcomes.push(PatternScanOutcome::Invalidated(instance));
            }
            continue;
        }

        if detector.check_confirmation(&instance, &window) {
            if rg_db::pattern::transition_instance(pool, instance.pattern_instance_id, "CONFIRMED").await? {
                rg_db::pattern::insert_alert(
                    pool,
                    Uuid::new_v4(),
                    tenant_id,
                    instance.pattern_instance_id,
                    "CONFIRMED",
                )
                .await?;
                outcomes.push(PatternScanOutcome::Confirmed(instance));
            }
        }
    }

    Ok(outcomes)
}
