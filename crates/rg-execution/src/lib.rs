pub mod execution;
pub mod market_data;
pub mod paper;
pub mod types;

pub use execution::ExecutionPort;
pub use market_data::MarketDataPort;
pub use paper::{PaperExchange, PaperMarketData};
pub use types::{
    AssetBalance, ExchangeError, Fill, IsolatedMarginAccount, OrderStatus, OrderType, PlacedOrder,
    Side, SideEffectType, TimeInForce, TransferDirection, TransferResult,
};
