//! Portfolio Projection (C11, §4.8): a derived, BTC-denominated view over
//! account balances and the Audit Log, not a position-sizing engine. The
//! teacher's `mqk-portfolio` crate (FIFO lots, an allocator against
//! sector/weight/turnover constraints, exposure limits) has no counterpart
//! here — the spec doesn't ask for portfolio construction, only valuation
//! and profit reporting — so that module body was dropped rather than
//! adapted; see `DESIGN.md`.

pub mod price_discovery;
pub mod projection;

pub use price_discovery::{PriceDiscovery, PriceResolution, PriceRoute};
pub use projection::{calculate_profit_btc, operation_movements_btc, total_portfolio_btc, PortfolioSnapshot, ProfitSummary};
