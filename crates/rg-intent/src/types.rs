//! Intent Pipeline (C7, spec §4.4) domain types: the PLAN input a caller
//! supplies, the execution-mode split (dry-run vs. live), and the error
//! enum every pipeline phase returns through.

use rg_schemas::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use rg_schemas::Side;

/// Caller-supplied fields for PLAN. Only `symbol` and `timeframe` are
/// always mandatory; `side` and `entry_price` are required outright,
/// everything else is derived when absent (`stop_price` via the Technical
/// Stop Calculator, `quantity` via the Position Sizer).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanInput {
    pub symbol: String,
    pub timeframe: String,
    pub side: Option<Side>,
    pub entry_price: Option<Money>,
    pub stop_price: Option<Money>,
    pub target_price: Option<Money>,
    pub capital: Option<Money>,
    pub quantity: Option<Money>,
    /// Risk percent as a whole-number percentage (e.g. `1.0` for 1%), not a
    /// fraction. Defaults to the 1% rule when absent.
    pub risk_percent: Option<Money>,
    pub confidence: Option<String>,
    pub strategy: Option<String>,
    pub pattern_code: Option<String>,
    pub pattern_source: Option<String>,
    pub pattern_event_id: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionMode {
    DryRun,
    Live,
}

#[derive(Debug, Error)]
pub enum IntentError {
    #[error("intent failed field/risk validation: {0:?}")]
    Validation(Vec<String>),
    #[error("entry gate denied: {0:?}")]
    GateDenied(rg_gate::EntryGateDecision),
    #[error("invalid intent transition from {from} attempting {attempted}")]
    Conflict { from: String, attempted: String },
    #[error("pattern-triggered intents cannot execute LIVE in this MVP")]
    PatternLiveBlocked,
    #[error("exchange error: {0}")]
    Exchange(#[from] rg_execution::ExchangeError),
    #[error("could not derive a required field: {0}")]
    Derivation(String),
    #[error("database error: {0}")]
    Db(String),
}

impl From<anyhow::Error> for IntentError {
    fn from(e: anyhow::Error) -> Self {
        IntentError::Db(e.to_string())
    }
}
