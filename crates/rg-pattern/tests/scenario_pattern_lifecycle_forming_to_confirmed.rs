use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use rg_execution::PaperMarketData;
use rg_pattern::{canonical_detectors, scan, PatternScanOutcome};
use rg_schemas::Candle;

async fn db_pool() -> Option<sqlx::PgPool> {
    match std::env::var(rg_db::ENV_DB_URL) {
        Ok(_) => Some(rg_db::testkit_db_pool().await.expect("testkit db pool")),
        Err(_) => {
            eprintln!("SKIP: {} not set", rg_db::ENV_DB_URL);
            None
        }
    }
}

fn candle(ts: i64, open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Candle {
    Candle {
        open_time: Utc.timestamp_opt(ts, 0).unwrap(),
        open,
        high,
        low,
        close,
        volume: dec!(10),
    }
}

/// §4.7 lifecycle: a fresh hammer is detected FORMING; a subsequent scan
/// over a bar that closes above the hammer's high confirms it (I9's
/// sticky-transition half, not the idempotency half — that's the bridge
/// test below).
#[tokio::test]
async fn hammer_forms_then_confirms_on_follow_through() -> anyhow::Result<()> {
    let Some(pool) = db_pool().await else { return Ok(()) };

    let tenant_id = Uuid::new_v4();
    let symbol = format!("BTCUSDT-{}", Uuid::new_v4());
    let timeframe = "1h";
    let market_data = PaperMarketData::new();
    let detectors = canonical_detectors();

    let downtrend = vec![
        candle(0, dec!(110), dec!(111), dec!(108), dec!(109)),
        candle(1, dec!(109), dec!(110), dec!(106), dec!(107)),
        candle(2, dec!(107), dec!(108), dec!(104), dec!(105)),
        candle(3, dec!(105), dec!(105.2), dec!(100), dec!(105.1)),
    ];
    market_data.set_klines(&symbol, timeframe, downtrend);

    let first_pass = scan(&pool, &market_data, tenant_id, &symbol, timeframe, &detectors).await?;
    let detected = first_pass
        .iter()
        .find(|o| matches!(o, PatternScanOutcome::Detected(i) if i.pattern_code == "HAMMER"));
    assert!(detected.is_some(), "expected a FORMING hammer instance");

    // Re-scanning the same candle tail is idempotent: no duplicate instance.
    let repeat_pass = scan(&pool, &market_data, tenant_id, &symbol, timeframe, &detectors).await?;
    assert!(
        repeat_pass.is_empty(),
        "rescanning unchanged candles must not re-detect or re-transition anything"
    );

    // A follow-through candle closing above the hammer's high confirms it.
    let mut with_follow_through = vec![
        candle(0, dec!(110), dec!(111), dec!(108), dec!(109)),
        candle(1, dec!(109), dec!(110), dec!(106), dec!(107)),
        candle(2, dec!(107), dec!(108), dec!(104), dec!(105)),
        candle(3, dec!(105), dec!(105.2), dec!(100), dec!(105.1)),
        candle(4, dec!(105.1), dec!(108), dec!(105), dec!(107)),
    ];
    with_follow_through.sort_by_key(|c| c.open_time);
    market_data.set_klines(&symbol, timeframe, with_follow_through);

    let third_pass = scan(&pool, &market_data, tenant_id, &symbol, timeframe, &detectors).await?;
    let confirmed = third_pass
        .iter()
        .any(|o| matches!(o, PatternScanOutcome::Confirmed(i) if i.pattern_code == "HAMMER"));
    assert!(confirmed, "expected the FORMING hammer to transition to CONFIRMED");

    Ok(())
}
