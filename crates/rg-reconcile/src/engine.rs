//! Pure comparison step of the sweep: no IO, no clock, no randomness.
//! Grounded on the teacher's `reconcile`'s unknown-order detection
//! (`diffs.push(ReconcileDiff::UnknownOrder { .. })`) — generalized from
//! "halt on any order the broker knows about that we don't" to "surface
//! every such order so the caller can backfill it", since spec.md's sweep
//! heals the gap instead of halting on it.

use std::collections::HashSet;

use crate::types::ExchangeOrderRecord;

/// Every `history` entry whose `exchange_order_id` isn't in
/// `known_order_ids`, in the order `history` provided them.
pub fn find_missing(
    known_order_ids: &HashSet<String>,
    history: &[ExchangeOrderRecord],
) -> Vec<ExchangeOrderRecord> {
    history
        .iter()
        .filter(|rec| !known_order_ids.contains(&rec.exchange_order_id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rg_execution::types::Side;
    use rust_decimal_macros::dec;

    fn record(id: &str) -> ExchangeOrderRecord {
        ExchangeOrderRecord {
            exchange_order_id: id.to_string(),
            symbol: "BTCUSDT".to_string(),
            side: Side::Buy,
            asset: "BTC".to_string(),
            quantity: dec!(0.1),
            price: Some(dec!(50000)),
            fee: dec!(5),
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn known_orders_are_excluded() {
        let known: HashSet<String> = ["abc".to_string()].into_iter().collect();
        let history = vec![record("abc"), record("def")];
        let missing = find_missing(&known, &history);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].exchange_order_id, "def");
    }

    #[test]
    fn empty_history_has_no_gaps() {
        let known = HashSet::new();
        assert!(find_missing(&known, &[]).is_empty());
    }

    #[test]
    fn all_unknown_orders_surface() {
        let known = HashSet::new();
        let history = vec![record("a"), record("b")];
        assert_eq!(find_missing(&known, &history).len(), 2);
    }
}
