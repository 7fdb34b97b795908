use chrono::Utc;
use rg_db::audit::NewAuditTransaction;
use rg_execution::PaperMarketData;
use rg_portfolio::{calculate_profit_btc, PriceDiscovery};
use rust_decimal_macros::dec;
use uuid::Uuid;

async fn db_pool() -> Option<sqlx::PgPool> {
    match std::env::var(rg_db::ENV_DB_URL) {
        Ok(_) => Some(rg_db::testkit_db_pool().await.expect("testkit db pool")),
        Err(_) => {
            eprintln!("SKIP: {} not set", rg_db::ENV_DB_URL);
            None
        }
    }
}

fn deposit(tenant_id: Uuid, asset: &str, quantity: rust_decimal::Decimal) -> NewAuditTransaction {
    NewAuditTransaction {
        movement_id: Uuid::new_v4(),
        tenant_id,
        exchange_order_id: None,
        transaction_type: "DEPOSIT".to_string(),
        symbol: asset.to_string(),
        asset: asset.to_string(),
        quantity,
        price: None,
        total_value: None,
        fee: dec!(0),
        side: None,
        leverage: None,
        is_margin: false,
        stop_price: None,
        operation_id: None,
        raw_exchange_response: None,
        source: "test".to_string(),
        executed_at: Utc::now(),
        hash_prev: None,
        hash_self: None,
    }
}

fn withdrawal(tenant_id: Uuid, asset: &str, quantity: rust_decimal::Decimal) -> NewAuditTransaction {
    NewAuditTransaction {
        transaction_type: "WITHDRAWAL".to_string(),
        ..deposit(tenant_id, asset, quantity)
    }
}

/// §4.8: profit_btc = current_balance_btc + withdrawals_btc - deposits_btc.
/// A tenant deposits 1 BTC, later withdraws 0.2 BTC, and currently holds
/// 0.9 BTC — so profit is 0.9 + 0.2 - 1.0 = 0.1 BTC.
#[tokio::test]
async fn profit_formula_matches_deposits_withdrawals_and_current_balance() -> anyhow::Result<()> {
    let Some(pool) = db_pool().await else { return Ok(()) };
    let tenant_id = Uuid::new_v4();

    rg_db::audit::insert_movement(&pool, &deposit(tenant_id, "BTC", dec!(1))).await?;
    rg_db::audit::insert_movement(&pool, &withdrawal(tenant_id, "BTC", dec!(0.2))).await?;

    let market_data = PaperMarketData::new();
    market_data.set_balance("BTC", dec!(0.9), dec!(0));
    let discovery = PriceDiscovery::new();

    let summary = calculate_profit_btc(&pool, &market_data, &discovery, tenant_id, &[], None).await?;

    assert_eq!(summary.current_balance_btc, dec!(0.9));
    assert_eq!(summary.total_deposits_btc, dec!(1));
    assert_eq!(summary.total_withdrawals_btc, dec!(0.2));
    assert_eq!(summary.profit_btc, dec!(0.1));
    Ok(())
}

/// A non-BTC deposit is converted through the USDT route before being
/// folded into the profit formula.
#[tokio::test]
async fn deposits_in_other_assets_are_converted_via_price_discovery() -> anyhow::Result<()> {
    let Some(pool) = db_pool().await else { return Ok(()) };
    let tenant_id = Uuid::new_v4();

    rg_db::audit::insert_movement(&pool, &deposit(tenant_id, "ETH", dec!(10))).await?;

    let market_data = PaperMarketData::new();
    market_data.set_balance("BTC", dec!(0), dec!(0));
    market_data.set_price("ETHUSDT", dec!(2000), dec!(2001), Utc::now());
    market_data.set_price("BTCUSDT", dec!(95000), dec!(95001), Utc::now());
    let discovery = PriceDiscovery::new();

    let summary = calculate_profit_btc(&pool, &market_data, &discovery, tenant_id, &[], None).await?;

    let expected_deposit_btc = dec!(10) * (dec!(2000) / dec!(95000));
    assert_eq!(summary.total_deposits_btc, expected_deposit_btc);
    assert_eq!(summary.profit_btc, dec!(0) - expected_deposit_btc);
    Ok(())
}
