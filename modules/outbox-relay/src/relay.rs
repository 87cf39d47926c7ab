use std::time::Duration;

use chrono::Utc;
use event_engine::{publish_from_outbox, NewMessage};
use queue_errors::{CoreError, CoreResult};
use retry::full_jitter_delay_ms;
use scope::Scope;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{EventOutboxRow, DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_MS};

/// Leases the next publishable outbox row for `worker_id` (spec.md §4.4
/// step 1): due-or-reclaimable, oldest first, `SKIP LOCKED`.
pub async fn acquire_due(
    pool: &PgPool,
    scope: &Scope,
    worker_id: &str,
    lease: Duration,
) -> CoreResult<Option<EventOutboxRow>> {
    let now = Utc::now();
    let locked_until = now + chrono::Duration::from_std(lease).unwrap_or_default();

    let row = sqlx::query_as::<_, EventOutboxRow>(
        r#"
        WITH candidate AS (
            SELECT id
            FROM event_outbox
            WHERE tenant_id = $1 AND namespace = $2
              AND (
                    (status = 'pending' AND next_attempt_at <= $3)
                 OR (status = 'publishing' AND locked_until < $3)
                  )
            ORDER BY next_attempt_at ASC, created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE event_outbox o
        SET status = 'publishing',
            attempt = o.attempt + 1,
            locked_by = $4,
            locked_until = $5,
            updated_at = $3
        FROM candidate
        WHERE o.id = candidate.id
        RETURNING o.*
        "#,
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(now)
    .bind(worker_id)
    .bind(locked_until)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Publishes a leased outbox row and resolves it to `published`,
/// jittered-retry `pending`, or, past `max_attempts`, `failed`
/// (spec.md §4.4 steps 2-5).
pub async fn relay_one(pool: &PgPool, scope: &Scope, row: EventOutboxRow) -> CoreResult<()> {
    let result = publish_from_outbox(
        pool,
        scope,
        row.topic_id,
        row.id,
        NewMessage {
            ordering_key: &row.ordering_key,
            payload: row.payload.clone(),
            headers: row.headers.clone(),
        },
    )
    .await;

    match result {
        Ok(published) => {
            mark_published(pool, scope, row.id, published.message.id).await?;
            info!(outbox_id = %row.id, message_id = %published.message.id, "outbox row published");
            Ok(())
        }
        Err(err) => {
            warn!(outbox_id = %row.id, error = %err, "outbox publish attempt failed");
            mark_failed_attempt(pool, scope, &row, &err.to_string()).await
        }
    }
}

async fn mark_published(pool: &PgPool, scope: &Scope, id: Uuid, message_id: Uuid) -> CoreResult<()> {
    let updated = sqlx::query(
        r#"
        UPDATE event_outbox
        SET status = 'published', message_id = $4, locked_by = NULL, locked_until = NULL, updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2 AND namespace = $3 AND status = 'publishing'
        "#,
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(message_id)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(CoreError::state_mismatch("outbox", id.to_string(), "publishing", "not publishing"));
    }
    Ok(())
}

async fn mark_failed_attempt(
    pool: &PgPool,
    scope: &Scope,
    row: &EventOutboxRow,
    error: &str,
) -> CoreResult<()> {
    let delay_ms = full_jitter_delay_ms(
        row.attempt.max(1) as u32,
        DEFAULT_BACKOFF_BASE_MS as u64,
        DEFAULT_BACKOFF_MAX_MS as u64,
    );
    let updated = sqlx::query(
        r#"
        UPDATE event_outbox
        SET status = CASE WHEN attempt >= max_attempts THEN 'failed' ELSE 'pending' END,
            last_error = $4,
            next_attempt_at = NOW() + ($5 || ' milliseconds')::interval,
            locked_by = NULL,
            locked_until = NULL,
            updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2 AND namespace = $3 AND status = 'publishing'
        "#,
    )
    .bind(row.id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(error)
    .bind(delay_ms.to_string())
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(CoreError::state_mismatch("outbox", row.id.to_string(), "publishing", "not publishing"));
    }
    Ok(())
}
