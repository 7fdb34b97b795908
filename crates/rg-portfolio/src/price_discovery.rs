//! BTC price discovery (§4.8): given an asset, resolve its price in BTC
//! terms through a three-hop fallback chain — direct pair, via USDT, via
//! BUSD — and cache each resolution for 60 seconds. Grounded verbatim on
//! `original_source/.../services/btc_conversion_service.py`'s
//! `BTCConversionService.get_btc_price`, translated from Django's cache
//! framework to an in-process `dashmap` TTL cache.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rg_execution::MarketDataPort;
use rg_schemas::Money;
use rust_decimal_macros::dec;

const CACHE_TTL_SECONDS: i64 = 60;

/// Which hop in the fallback chain produced a price, or that none did —
/// kept on the result rather than discarded, so a caller debugging a
/// missing valuation can see exactly which pairs were tried (§4.8
/// supplement: the `PriceResolution` trace).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriceRoute {
    /// The asset itself is BTC; price is always 1.
    IsBtc,
    /// `{asset}BTC` had a usable bid.
    Direct,
    /// `{asset}USDT` / `BTCUSDT`.
    ViaUsdt,
    /// `{asset}BUSD` / `BTCBUSD`.
    ViaBusd,
    /// No route produced a usable price.
    GiveUp,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PriceResolution {
    pub asset: String,
    pub btc_price: Option<Money>,
    pub route: PriceRoute,
}

struct CacheEntry {
    price: Money,
    route: PriceRoute,
    resolved_at: DateTime<Utc>,
}

/// Per-process 60-second price cache. One instance is shared across a
/// tenant's portfolio recompute calls; construct fresh per orchestrator
/// lifetime (mirrors Django's process-wide cache framework, scoped here to
/// whatever owns the `PriceDiscovery` instance).
#[derive(Default)]
pub struct PriceDiscovery {
    cache: DashMap<String, CacheEntry>,
}

impl PriceDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `asset`'s price in BTC, trying the cache first, then the
    /// direct/USDT/BUSD chain in that order.
    pub async fn resolve_btc_price(&self, market_data: &dyn MarketDataPort, asset: &str) -> PriceResolution {
        if asset == "BTC" {
            return PriceResolution {
                asset: asset.to_string(),
                btc_price: Some(dec!(1)),
                route: PriceRoute::IsBtc,
            };
        }

        if let Some(entry) = self.cache.get(asset) {
            if (Utc::now() - entry.resolved_at).num_seconds() < CACHE_TTL_SECONDS {
                return PriceResolution {
                    asset: asset.to_string(),
                    btc_price: Some(entry.price),
                    route: entry.route,
                };
            }
        }

        let resolution = self.resolve_uncached(market_data, asset).await;
        if let Some(price) = resolution.btc_price {
            self.cache.insert(
                asset.to_string(),
                CacheEntry {
                    price,
                    route: resolution.route,
                    resolved_at: Utc::now(),
                },
            );
        }
        resolution
    }

    async fn resolve_uncached(&self, market_data: &dyn MarketDataPort, asset: &str) -> PriceResolution {
        if let Some(price) = via_direct_pair(market_data, asset).await {
            return PriceResolution {
                asset: asset.to_string(),
                btc_price: Some(price),
                route: PriceRoute::Direct,
            };
        }
        if let Some(price) = via_quote(market_data, asset, "USDT").await {
            return PriceResolution {
                asset: asset.to_string(),
                btc_price: Some(price),
                route: PriceRoute::ViaUsdt,
            };
        }
        if let Some(price) = via_quote(market_data, asset, "BUSD").await {
            return PriceResolution {
                asset: asset.to_string(),
                btc_price: Some(price),
                route: PriceRoute::ViaBusd,
            };
        }
        PriceResolution {
            asset: asset.to_string(),
            btc_price: None,
            route: PriceRoute::GiveUp,
        }
    }

    /// Convert a quantity of `asset` to BTC; `0` if no price route resolves
    /// (mirrors `convert_to_btc`'s fail-soft-to-zero behavior — a missing
    /// price should not crash a portfolio recompute, just under-report it).
    pub async fn convert_to_btc(&self, market_data: &dyn MarketDataPort, asset: &str, quantity: Money) -> Money {
        match self.resolve_btc_price(market_data, asset).await.btc_price {
            Some(price) => quantity * price,
            None => dec!(0),
        }
    }
}

async fn via_direct_pair(market_data: &dyn MarketDataPort, asset: &str) -> Option<Money> {
    let symbol = format!("{asset}BTC");
    let bid = market_data.best_bid(&symbol).await.ok()?;
    (bid > dec!(0)).then_some(bid)
}

async fn via_quote(market_data: &dyn MarketDataPort, asset: &str, quote: &str) -> Option<Money> {
    let asset_price = market_data.best_bid(&format!("{asset}{quote}")).await.ok()?;
    let btc_price = market_data.best_bid(&format!("BTC{quote}")).await.ok()?;
    if asset_price > dec!(0) && btc_price > dec!(0) {
        Some(asset_price / btc_price)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc as ChronoUtc;
    use rg_execution::PaperMarketData;

    #[tokio::test]
    async fn btc_resolves_to_one_without_touching_market_data() {
        let md = PaperMarketData::new();
        let discovery = PriceDiscovery::new();
        let r = discovery.resolve_btc_price(&md, "BTC").await;
        assert_eq!(r.btc_price, Some(dec!(1)));
        assert_eq!(r.route, PriceRoute::IsBtc);
    }

    #[tokio::test]
    async fn direct_pair_is_tried_before_usdt_route() {
        let md = PaperMarketData::new();
        md.set_price("ETHBTC", dec!(0.05), dec!(0.0501), ChronoUtc::now());
        let discovery = PriceDiscovery::new();
        let r = discovery.resolve_btc_price(&md, "ETH").await;
        assert_eq!(r.route, PriceRoute::Direct);
        assert_eq!(r.btc_price, Some(dec!(0.05)));
    }

    #[tokio::test]
    async fn falls_back_to_usdt_route_when_no_direct_pair() {
        let md = PaperMarketData::new();
        md.set_price("ETHUSDT", dec!(2000), dec!(2001), ChronoUtc::now());
        md.set_price("BTCUSDT", dec!(95000), dec!(95001), ChronoUtc::now());
        let discovery = PriceDiscovery::new();
        let r = discovery.resolve_btc_price(&md, "ETH").await;
        assert_eq!(r.route, PriceRoute::ViaUsdt);
        assert_eq!(r.btc_price, Some(dec!(2000) / dec!(95000)));
    }

    #[tokio::test]
    async fn gives_up_when_no_route_resolves() {
        let md = PaperMarketData::new();
        let discovery = PriceDiscovery::new();
        let r = discovery.resolve_btc_price(&md, "NOSUCHCOIN").await;
        assert_eq!(r.route, PriceRoute::GiveUp);
        assert_eq!(r.btc_price, None);
    }
}
