use rust_decimal_macros::dec;
use uuid::Uuid;

use rg_testkit::{db_pool, random_symbol};

/// I10: an Operation's terminal states (CLOSED, CANCELLED) never accept a
/// further transition — closing an already-closed Operation, or cancelling
/// a closed one, must fail rather than silently no-op or clobber state.
#[tokio::test]
async fn closed_operation_rejects_further_transitions() -> anyhow::Result<()> {
    let Some(pool) = db_pool().await else { return Ok(()) };

    let tenant_id = Uuid::new_v4();
    let intent_id = Uuid::new_v4();
    let operation_id = Uuid::new_v4();
    let symbol = random_symbol("BTCUSDT");

    rg_db::operation::insert_active_operation(
        &pool,
        operation_id,
        tenant_id,
        intent_id,
        Some("breakout"),
        &symbol,
        "BUY",
        &format!("order-{operation_id}"),
        dec!(59000),
        Some(dec!(63000)),
        dec!(0.1),
    )
    .await?;

    rg_db::operation::close_operation(&pool, operation_id, dec!(0.1), dec!(60500)).await?;

    let closed = rg_db::operation::fetch_operation(&pool, operation_id).await?;
    assert_eq!(closed.status, "CLOSED");

    let second_close = rg_db::operation::close_operation(&pool, operation_id, dec!(0.1), dec!(61000)).await;
    assert!(second_close.is_err(), "closing a CLOSED operation must fail");

    let cancel_after_close = rg_db::operation::cancel_operation(&pool, operation_id).await;
    assert!(cancel_after_close.is_err(), "cancelling a CLOSED operation must fail");

    // The failed transitions must not have touched the row.
    let still_closed = rg_db::operation::fetch_operation(&pool, operation_id).await?;
    assert_eq!(still_closed.status, "CLOSED");
    assert_eq!(still_closed.average_fill_price, Some(dec!(60500)));
    Ok(())
}

/// A cancelled Operation is equally terminal: it cannot later be closed.
#[tokio::test]
async fn cancelled_operation_rejects_close() -> anyhow::Result<()> {
    let Some(pool) = db_pool().await else { return Ok(()) };

    let tenant_id = Uuid::new_v4();
    let intent_id = Uuid::new_v4();
    let operation_id = Uuid::new_v4();
    let symbol = random_symbol("ETHUSDT");

    rg_db::operation::insert_active_operation(
        &pool,
        operation_id,
        tenant_id,
        intent_id,
        None,
        &symbol,
        "SELL",
        &format!("order-{operation_id}"),
        dec!(3100),
        None,
        dec!(2),
    )
    .await?;

    rg_db::operation::cancel_operation(&pool, operation_id).await?;

    let close_after_cancel = rg_db::operation::close_operation(&pool, operation_id, dec!(2), dec!(3000)).await;
    assert!(close_after_cancel.is_err(), "closing a CANCELLED operation must fail");
    Ok(())
}
