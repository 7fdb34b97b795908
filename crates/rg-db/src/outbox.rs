//! Outbox: event → message-bus delivery record (§3, §4.5 "Outbox"). Every
//! StopEvent write inserts one Outbox row in the same transaction; a
//! separate publisher polls unpublished rows and ships them out.

use anyhow::Context;
use anyhow::Result;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub outbox_id: i64,
    pub tenant_id: Uuid,
    pub event_id: Uuid,
    pub routing_key: String,
    pub exchange: String,
    pub payload: Value,
    pub retry_count: i32,
}

fn row_to_outbox(row: sqlx::postgres::PgRow) -> Result<OutboxRow, sqlx::Error> {
    Ok(OutboxRow {
        outbox_id: row.try_get("outbox_id")?,
        tenant_id: row.try_get("tenant_id")?,
        event_id: row.try_get("event_id")?,
        routing_key: row.try_get("routing_key")?,
        exchange: row.try_get("exchange")?,
        payload: row.try_get("payload")?,
        retry_count: row.try_get("retry_count")?,
    })
}

/// Enqueue a row inside a caller-owned transaction, so it commits atomically
/// with the domain write it documents (e.g. a StopEvent append).
pub async fn enqueue_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    event_id: Uuid,
    routing_key: &str,
    exchange: &str,
    payload: Value,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into outbox (tenant_id, event_id, routing_key, exchange, payload)
        values ($1, $2, $3, $4, $5)
        on conflict (event_id) do nothing
        "#,
    )
    .bind(tenant_id)
    .bind(event_id)
    .bind(routing_key)
    .bind(exchange)
    .bind(payload)
    .execute(&mut **tx)
    .await
    .context("outbox enqueue_in_tx failed")?;

    Ok(())
}

/// Mark a row published after a confirmed bus delivery. Combined with the
/// `published` flag this gives exactly-once publication (§4.5).
pub async fn mark_published(pool: &PgPool, outbox_id: i64) -> Result<()> {
    sqlx::query("update outbox set published = true, published_at = now() where outbox_id = $1")
        .bind(outbox_id)
        .execute(pool)
        .await
        .context("mark_published failed")?;
    Ok(())
}

pub async fn record_publish_failure(pool: &PgPool, outbox_id: i64, error: &str) -> Result<()> {
    sqlx::query(
        "update outbox set retry_count = retry_count + 1, last_error = $2 where outbox_id = $1",
    )
    .bind(outbox_id)
    .bind(error)
    .execute(pool)
    .await
    .context("record_publish_failure failed")?;
    Ok(())
}

/// Atomically claim up to `batch_size` unpublished rows for exclusive
/// dispatch. Uses `FOR UPDATE SKIP LOCKED` inside a CTE so concurrent
/// publishers never claim the same row — the claim itself is the update,
/// not a separate lock held across the call. Gated behind `runtime-claim` so
/// only the single designated publisher binary can call it (see Cargo.toml).
///
/// Callers must either [`mark_published`] after a confirmed bus delivery, or
/// [`release_claim`] on failure so the row becomes claimable again.
#[cfg(feature = "runtime-claim")]
pub async fn claim_batch(pool: &PgPool, batch_size: i64, dispatcher_id: &str) -> Result<Vec<OutboxRow>> {
    let rows = sqlx::query(
        r#"
        with to_claim as (
            select outbox_id
            from outbox
            where published = false and claimed_at is null
            order by outbox_id asc
            limit $1
            for update skip locked
        )
        update outbox
        set claimed_at = now(), claimed_by = $2
        where outbox_id in (select outbox_id from to_claim)
        returning outbox_id, tenant_id, event_id, routing_key, exchange, payload, retry_count
        "#,
    )
    .bind(batch_size)
    .bind(dispatcher_id)
    .fetch_all(pool)
    .await
    .context("claim_batch failed")?;

    rows.into_iter().map(|r| Ok(row_to_outbox(r)?)).collect()
}

/// Release a claimed row back to unclaimed (publish attempt failed before
/// confirmation).
#[cfg(feature = "runtime-claim")]
pub async fn release_claim(pool: &PgPool, outbox_id: i64) -> Result<()> {
    sqlx::query("update outbox set claimed_at = null, claimed_by = null where outbox_id = $1")
        .bind(outbox_id)
        .execute(pool)
        .await
        .context("release_claim failed")?;
    Ok(())
}
