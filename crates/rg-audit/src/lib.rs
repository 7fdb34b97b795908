//! Audit Log (C3, §4.8): the append-only `AuditTransaction` ("Movement")
//! ledger. DB-backed via `rg-db::audit` (dedup on the
//! `(exchange_order_id, transaction_type)` unique constraint) instead of
//! the teacher's JSONL file, but the canonicalization/hash-chain algorithm
//! — sort keys recursively, hash the canonical bytes, chain `hash_prev` ->
//! `hash_self` — is reused verbatim from `mqk-audit`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

/// A Movement not yet assigned its place in the hash chain. Mirrors
/// `rg_db::audit::NewAuditTransaction` minus `hash_prev`/`hash_self`, which
/// [`AuditLog::record`] computes and fills in.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub movement_id: Uuid,
    pub tenant_id: Uuid,
    pub exchange_order_id: Option<String>,
    pub transaction_type: String,
    pub symbol: String,
    pub asset: String,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub total_value: Option<Decimal>,
    pub fee: Decimal,
    pub side: Option<String>,
    pub leverage: Option<Decimal>,
    pub is_margin: bool,
    pub stop_price: Option<Decimal>,
    pub operation_id: Option<Uuid>,
    pub raw_exchange_response: Option<Value>,
    pub source: String,
    pub executed_at: DateTime<Utc>,
}

/// Serializable projection of a Movement used only to compute its hash.
/// Deliberately excludes `hash_self` to avoid hashing a value into itself.
#[derive(Serialize)]
struct HashInput<'a> {
    movement_id: Uuid,
    tenant_id: Uuid,
    exchange_order_id: &'a Option<String>,
    transaction_type: &'a str,
    symbol: &'a str,
    asset: &'a str,
    quantity: Decimal,
    price: Option<Decimal>,
    total_value: Option<Decimal>,
    fee: Decimal,
    side: &'a Option<String>,
    operation_id: Option<Uuid>,
    source: &'a str,
    executed_at: DateTime<Utc>,
    hash_prev: &'a Option<String>,
}

/// Canonicalize by sorting object keys recursively, then compact-serialize —
/// one Movement's hash input always serializes to the same bytes regardless
/// of struct field order.
fn canonical_json(v: &impl Serialize) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize movement hash input failed")?;
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Hash one Movement given the chain's current `hash_prev`.
pub fn compute_movement_hash(m: &NewMovement, hash_prev: &Option<String>) -> Result<String> {
    let input = HashInput {
        movement_id: m.movement_id,
        tenant_id: m.tenant_id,
        exchange_order_id: &m.exchange_order_id,
        transaction_type: &m.transaction_type,
        symbol: &m.symbol,
        asset: &m.asset,
        quantity: m.quantity,
        price: m.price,
        total_value: m.total_value,
        fee: m.fee,
        side: &m.side,
        operation_id: m.operation_id,
        source: &m.source,
        executed_at: m.executed_at,
        hash_prev,
    };
    let canonical = canonical_json(&input)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Per-tenant handle onto the Movement ledger. Tracks the tail of the hash
/// chain in memory so consecutive `record` calls don't need a round trip to
/// read it back; construct with [`AuditLog::load`] to resume an existing
/// chain after a restart (mirrors `mqk-audit::AuditWriter::set_last_hash`).
pub struct AuditLog {
    pool: PgPool,
    tenant_id: Uuid,
    hash_chain: bool,
    last_hash: Option<String>,
}

impl AuditLog {
    /// Load the tenant's current chain tail from `audit_transactions` and
    /// resume from there.
    pub async fn load(pool: PgPool, tenant_id: Uuid, hash_chain: bool) -> Result<Self> {
        let last_hash = rg_db::audit::fetch_last_hash_for_tenant(&pool, tenant_id).await?;
        Ok(AuditLog {
            pool,
            tenant_id,
            hash_chain,
            last_hash,
        })
    }

    pub fn last_hash(&self) -> Option<String> {
        self.last_hash.clone()
    }

    /// Record one Movement. Returns `Ok(false)` without advancing the chain
    /// if the `(exchange_order_id, transaction_type)` pair was already
    /// recorded (§3 dedup invariant, I2) — a retried write is a no-op, not a
    /// duplicate entry.
    pub async fn record(&mut self, new: NewMovement) -> Result<bool> {
        let (hash_prev, hash_self) = if self.hash_chain {
            let prev = self.last_hash.clone();
            let self_hash = compute_movement_hash(&new, &prev)?;
            (prev, Some(self_hash))
        } else {
            (None, None)
        };

        let row = rg_db::audit::NewAuditTransaction {
            movement_id: new.movement_id,
            tenant_id: new.tenant_id,
            exchange_order_id: new.exchange_order_id,
            transaction_type: new.transaction_type,
            symbol: new.symbol,
            asset: new.asset,
            quantity: new.quantity,
            price: new.price,
            total_value: new.total_value,
            fee: new.fee,
            side: new.side,
            leverage: new.leverage,
            is_margin: new.is_margin,
            stop_price: new.stop_price,
            operation_id: new.operation_id,
            raw_exchange_response: new.raw_exchange_response,
            source: new.source,
            executed_at: new.executed_at,
            hash_prev: hash_prev.clone(),
            hash_self: hash_self.clone(),
        };

        let inserted = rg_db::audit::insert_movement(&self.pool, &row).await?;
        if inserted && self.hash_chain {
            self.last_hash = hash_self;
        }
        Ok(inserted)
    }

    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }
}

/// Result of verifying a tenant's recorded chain against its own stored
/// hashes — a periodic integrity check, not something the write path needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { rows: usize },
    Broken { movement_id: Uuid, reason: String },
}

/// Re-derive each row's hash from its own fields and check the chain links
/// up, in `executed_at` order (the order `record` wrote them in).
pub fn verify_chain(rows: &[rg_db::audit::AuditTransactionRow]) -> VerifyResult {
    let mut prev_hash: Option<String> = None;

    for row in rows {
        if row.hash_self.is_none() && row.hash_prev.is_none() {
            // Hash chain was disabled when this row was written; skip.
            continue;
        }

        if row.hash_prev != prev_hash {
            return VerifyResult::Broken {
                movement_id: row.movement_id,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, row.hash_prev
                ),
            };
        }

        if let Some(claimed) = &row.hash_self {
            let reconstructed = NewMovement {
                movement_id: row.movement_id,
                tenant_id: row.tenant_id,
                exchange_order_id: row.exchange_order_id.clone(),
                transaction_type: row.transaction_type.clone(),
                symbol: row.symbol.clone(),
                asset: row.asset.clone(),
                quantity: row.quantity,
                price: row.price,
                total_value: row.total_value,
                fee: row.fee,
                side: row.side.clone(),
                leverage: None,
                is_margin: row.is_margin,
                stop_price: None,
                operation_id: row.operation_id,
                raw_exchange_response: None,
                source: row.source.clone(),
                executed_at: row.executed_at,
            };
            let recomputed = match compute_movement_hash(&reconstructed, &row.hash_prev) {
                Ok(h) => h,
                Err(e) => {
                    return VerifyResult::Broken {
                        movement_id: row.movement_id,
                        reason: format!("hash recompute failed: {e}"),
                    }
                }
            };
            if *claimed != recomputed {
                return VerifyResult::Broken {
                    movement_id: row.movement_id,
                    reason: format!("hash_self mismatch: claimed {claimed}, recomputed {recomputed}"),
                };
            }
        }

        prev_hash = row.hash_self.clone();
    }

    VerifyResult::Valid { rows: rows.len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample(movement_id: Uuid, prev_exchange_order: Option<&str>) -> NewMovement {
        NewMovement {
            movement_id,
            tenant_id: Uuid::nil(),
            exchange_order_id: prev_exchange_order.map(|s| s.to_string()),
            transaction_type: "TRADE".to_string(),
            symbol: "BTCUSDT".to_string(),
            asset: "BTC".to_string(),
            quantity: dec!(0.1),
            price: Some(dec!(50000)),
            total_value: Some(dec!(5000)),
            fee: dec!(5),
            side: Some("BUY".to_string()),
            leverage: None,
            is_margin: false,
            stop_price: None,
            operation_id: None,
            raw_exchange_response: None,
            source: "binance".to_string(),
            executed_at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn hash_is_deterministic_given_same_chain_position() {
        let m = sample(Uuid::nil(), Some("order-1"));
        let a = compute_movement_hash(&m, &None).unwrap();
        let b = compute_movement_hash(&m, &None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn hash_prev_changes_hash_self() {
        let m = sample(Uuid::nil(), Some("order-1"));
        let a = compute_movement_hash(&m, &None).unwrap();
        let b = compute_movement_hash(&m, &Some("some-other-hash".to_string())).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn verify_chain_detects_broken_link() {
        let row_a_hash = {
            let m = sample(Uuid::new_v4(), Some("order-1"));
            compute_movement_hash(&m, &None).unwrap()
        };

        let row_b = rg_db::audit::AuditTransactionRow {
            movement_id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            exchange_order_id: Some("order-2".to_string()),
            transaction_type: "TRADE".to_string(),
            symbol: "BTCUSDT".to_string(),
            asset: "BTC".to_string(),
            quantity: dec!(0.1),
            price: Some(dec!(50000)),
            total_value: Some(dec!(5000)),
            fee: dec!(5),
            side: Some("BUY".to_string()),
            is_margin: false,
            operation_id: None,
            source: "binance".to_string(),
            executed_at: DateTime::<Utc>::from_timestamp(1_700_000_100, 0).unwrap(),
            hash_prev: Some("wrong-prev-hash".to_string()),
            hash_self: Some("whatever".to_string()),
        };
        let _ = row_a_hash;

        let result = verify_chain(&[row_b]);
        assert!(matches!(result, VerifyResult::Broken { .. }));
    }
}
