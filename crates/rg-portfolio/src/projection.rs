//! Portfolio Projection (C11, §4.8): folds account balances and Audit Log
//! movements into a BTC-denominated snapshot. Grounded on
//! `original_source/.../services/portfolio_btc_service.py`'s
//! `PortfolioBTCService`, reusing the teacher's `mqk-portfolio::metrics`
//! idea of a deterministic `BTreeMap`-keyed fold — the unit of account
//! changes from "equity in micros" to "BTC-denominated total value" and the
//! fold source changes from an in-memory fill ledger to the DB-backed
//! `AuditTransaction` log, but the shape (iterate once, accumulate into a
//! sorted map, return a summary struct) is the same.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rg_db::audit::AuditTransactionRow;
use rg_execution::MarketDataPort;
use rg_schemas::Money;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use uuid::Uuid;

use crate::price_discovery::PriceDiscovery;

#[derive(Clone, Debug, PartialEq)]
pub struct PortfolioSnapshot {
    pub tenant_id: Uuid,
    pub total_btc: Money,
    pub spot_btc: Money,
    pub margin_btc: Money,
    /// Per-asset BTC value, sorted by asset name for a deterministic
    /// report regardless of the balance map's iteration order.
    pub breakdown: BTreeMap<String, Money>,
}

/// Sum of `free + locked` for every asset with a non-zero total, converted
/// to BTC via [`PriceDiscovery`]. Assets that fail price discovery entirely
/// contribute 0 rather than aborting the whole snapshot (§4.8: a single
/// stale pair must not blank the other balances).
async fn spot_value_btc(
    market_data: &dyn MarketDataPort,
    discovery: &PriceDiscovery,
) -> anyhow::Result<(Money, BTreeMap<String, Money>)> {
    let balances = market_data
        .account_balances()
        .await
        .map_err(|e| anyhow::anyhow!("account_balances failed: {e}"))?;

    let mut breakdown = BTreeMap::new();
    let mut total = dec!(0);
    for (asset, balance) in balances {
        let held = balance.free + balance.locked;
        if held <= dec!(0) {
            continue;
        }
        let btc_value = discovery.convert_to_btc(market_data, &asset, held).await;
        if btc_value > dec!(0) {
            total += btc_value;
            breakdown.insert(asset, btc_value);
        }
    }
    Ok((total, breakdown))
}

/// Isolated-margin value for `symbol`: base and quote balances
/// (`free + locked`, per `AssetBalance`) each converted to BTC and summed.
/// `IsolatedMarginAccount` carries a `margin_level` health ratio but no
/// separate borrowed-amount field, so unlike the Python original there is
/// no gross debt figure to report independently — `margin_level` already
/// reflects leverage and is exposed to callers that need it by fetching
/// the account directly rather than through this sum.
async fn margin_value_btc(market_data: &dyn MarketDataPort, discovery: &PriceDiscovery, symbol: &str) -> anyhow::Result<Money> {
    let account = match market_data.isolated_margin_account(symbol).await {
        Ok(account) => account,
        Err(_) => return Ok(dec!(0)),
    };

    let base_total = account.base_balance.free + account.base_balance.locked;
    let quote_total = account.quote_balance.free + account.quote_balance.locked;

    let base_value = discovery.convert_to_btc(market_data, &account.base_asset, base_total).await;
    let quote_value = discovery.convert_to_btc(market_data, &account.quote_asset, quote_total).await;

    Ok(base_value + quote_value)
}

/// Total portfolio value in BTC: spot balances plus isolated-margin
/// positions across `margin_symbols`.
pub async fn total_portfolio_btc(
    market_data: &dyn MarketDataPort,
    discovery: &PriceDiscovery,
    tenant_id: Uuid,
    margin_symbols: &[String],
) -> anyhow::Result<PortfolioSnapshot> {
    let (spot_btc, breakdown) = spot_value_btc(market_data, discovery).await?;

    let mut margin_btc = dec!(0);
    for symbol in margin_symbols {
        margin_btc += margin_value_btc(market_data, discovery, symbol).await?;
    }

    Ok(PortfolioSnapshot {
        tenant_id,
        total_btc: spot_btc + margin_btc,
        spot_btc,
        margin_btc,
        breakdown,
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProfitSummary {
    pub tenant_id: Uuid,
    pub profit_btc: Money,
    pub profit_percent: Money,
    pub current_balance_btc: Money,
    pub total_deposits_btc: Money,
    pub total_withdrawals_btc: Money,
    pub net_inflows_btc: Money,
    pub start_date: Option<DateTime<Utc>>,
    pub calculated_at: DateTime<Utc>,
}

/// User's profit formula (§4.8, verbatim from `calculate_profit_btc`):
/// `profit = current_balance + withdrawals - deposits`. Withdrawals count
/// as realized profit (BTC the engine generated and the user pulled out);
/// deposits count as capital the user put in, not profit.
#[allow(clippy::too_many_arguments)]
pub async fn calculate_profit_btc(
    pool: &PgPool,
    market_data: &dyn MarketDataPort,
    discovery: &PriceDiscovery,
    tenant_id: Uuid,
    margin_symbols: &[String],
    since: Option<DateTime<Utc>>,
) -> anyhow::Result<ProfitSummary> {
    let snapshot = total_portfolio_btc(market_data, discovery, tenant_id, margin_symbols).await?;
    let movements = rg_db::audit::list_movements_for_tenant(pool, tenant_id).await?;

    let mut total_deposits_btc = dec!(0);
    let mut total_withdrawals_btc = dec!(0);
    let mut first_deposit_at: Option<DateTime<Utc>> = None;

    for m in &movements {
        if let Some(since) = since {
            if m.executed_at < since {
                continue;
            }
        }
        match m.transaction_type.as_str() {
            "DEPOSIT" => {
                let btc = discovery.convert_to_btc(market_data, &m.asset, m.quantity).await;
                total_deposits_btc += btc;
                if first_deposit_at.map_or(true, |d| m.executed_at < d) {
                    first_deposit_at = Some(m.executed_at);
                }
            }
            "WITHDRAWAL" => {
                let btc = discovery.convert_to_btc(market_data, &m.asset, m.quantity).await;
                total_withdrawals_btc += btc;
            }
            _ => {}
        }
    }

    let profit_btc = snapshot.total_btc + total_withdrawals_btc - total_deposits_btc;
    let net_inflows_btc = total_deposits_btc - total_withdrawals_btc;
    let profit_percent = if net_inflows_btc > dec!(0) {
        (profit_btc / net_inflows_btc) * dec!(100)
    } else {
        dec!(0)
    };

    Ok(ProfitSummary {
        tenant_id,
        profit_btc,
        profit_percent,
        current_balance_btc: snapshot.total_btc,
        total_deposits_btc,
        total_withdrawals_btc,
        net_inflows_btc,
        start_date: first_deposit_at.or(since),
        calculated_at: Utc::now(),
    })
}

/// BTC value of every movement for one Operation — the per-trade slice of
/// the audit trail a caller (e.g. `list_operations_with_movements`) wants
/// alongside the Operation row itself, not a portfolio-wide aggregate.
pub async fn operation_movements_btc(
    pool: &PgPool,
    market_data: &dyn MarketDataPort,
    discovery: &PriceDiscovery,
    operation_id: Uuid,
) -> anyhow::Result<Vec<(AuditTransactionRow, Money)>> {
    let movements = rg_db::audit::list_movements_for_operation(pool, operation_id).await?;
    let mut out = Vec::with_capacity(movements.len());
    for m in movements {
        let btc = discovery.convert_to_btc(market_data, &m.asset, m.quantity).await;
        out.push((m, btc));
    }
    Ok(out)
}
