use std::time::Duration;

use chrono::Utc;
use queue_errors::{CoreError, CoreResult};
use retry::full_jitter_delay_ms;
use scope::Scope;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{DispatchableDelivery, EventDelivery, EventSubscriptionRow, WebhookConfig};

/// Leases the next dispatchable delivery for a subscription: due, not
/// rate-limited, under the in-flight cap, and not blocked by an older
/// unfinished delivery sharing its ordering key (spec.md §4.3, §5).
pub async fn acquire_due_delivery(
    pool: &PgPool,
    scope: &Scope,
    subscription_id: Uuid,
    worker_id: &str,
    lease: Duration,
) -> CoreResult<Option<DispatchableDelivery>> {
    let sub = sqlx::query_as::<_, EventSubscriptionRow>(
        "SELECT * FROM event_subscriptions WHERE id = $1 AND tenant_id = $2 AND namespace = $3 AND enabled = TRUE",
    )
    .bind(subscription_id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .fetch_optional(pool)
    .await?;
    let Some(sub) = sub else { return Ok(None) };

    if sub.rate_limit_per_sec > 0 {
        if let Some(last) = sub.last_dispatch_at {
            let min_gap_ms = 1000 / sub.rate_limit_per_sec.max(1) as i64;
            if (Utc::now() - last).num_milliseconds() < min_gap_ms {
                return Ok(None);
            }
        }
    }

    let lease_ms = lease.as_millis() as i64;
    let row = sqlx::query_as::<_, EventDelivery>(
        r#"
        WITH candidate AS (
            SELECT d.id
            FROM event_deliveries d
            WHERE d.tenant_id = $1
              AND d.namespace = $2
              AND d.subscription_id = $3
              AND d.status IN ('queued', 'running')
              AND d.next_run_at <= NOW()
              AND (d.status = 'queued' OR d.locked_until <= NOW())
              AND (
                  $4 = 0 OR (
                      SELECT COUNT(*) FROM event_deliveries i
                      WHERE i.subscription_id = d.subscription_id
                        AND i.status = 'running'
                  ) < $4
              )
              AND NOT EXISTS (
                  SELECT 1 FROM event_deliveries o
                  WHERE o.subscription_id = d.subscription_id
                    AND o.ordering_key = d.ordering_key
                    AND o.message_sequence < d.message_sequence
                    AND o.status IN ('queued', 'running')
              )
            ORDER BY d.message_sequence ASC
            FOR UPDATE OF d SKIP LOCKED
            LIMIT 1
        )
        UPDATE event_deliveries
        SET status = 'running',
            attempt = attempt + 1,
            locked_by = $5,
            locked_until = NOW() + ($6 || ' milliseconds')::interval,
            started_at = NOW(),
            updated_at = NOW()
        FROM candidate
        WHERE event_deliveries.id = candidate.id
        RETURNING event_deliveries.*
        "#,
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(subscription_id)
    .bind(sub.max_inflight)
    .bind(worker_id)
    .bind(lease_ms.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(delivery) = row else { return Ok(None) };

    sqlx::query("UPDATE event_subscriptions SET last_dispatch_at = NOW() WHERE id = $1")
        .bind(subscription_id)
        .execute(pool)
        .await?;

    Ok(Some(DispatchableDelivery {
        target: sub.target(),
        webhook: WebhookConfig {
            url: sub.webhook_url.clone(),
            method: sub.webhook_method.clone(),
            headers: sub.webhook_headers.clone(),
            signing_secret: sub.webhook_signing_secret.clone(),
            timeout_s: sub.webhook_timeout_s,
        },
        delivery,
    }))
}

pub async fn mark_succeeded(
    pool: &PgPool,
    scope: &Scope,
    delivery_id: Uuid,
    request_id: Option<&str>,
    output: Option<serde_json::Value>,
    duration_ms: i64,
    cold_start: bool,
) -> CoreResult<()> {
    let mut tx = pool.begin().await?;

    let delivery = sqlx::query_as::<_, EventDelivery>(
        r#"
        UPDATE event_deliveries
        SET status = 'succeeded', request_id = $4, output = $5, duration_ms = $6,
            cold_start = $7, completed_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2 AND namespace = $3 AND status = 'running'
        RETURNING *
        "#,
    )
    .bind(delivery_id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(request_id)
    .bind(output)
    .bind(duration_ms)
    .bind(cold_start)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(delivery) = delivery else {
        drop(tx);
        return Err(require_row_affected(pool, scope, delivery_id).await);
    };

    sqlx::query(
        r#"
        UPDATE event_subscriptions
        SET last_acked_sequence = GREATEST(last_acked_sequence, $2), last_acked_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(delivery.subscription_id)
    .bind(delivery.message_sequence)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn mark_retry(
    pool: &PgPool,
    scope: &Scope,
    delivery_id: Uuid,
    error: &str,
) -> CoreResult<()> {
    let sub: Option<(i32, i32, i64, i64)> = sqlx::query_as(
        r#"
        SELECT d.attempt, s.max_attempts, s.backoff_base_ms, s.backoff_max_ms
        FROM event_deliveries d JOIN event_subscriptions s ON s.id = d.subscription_id
        WHERE d.id = $1 AND d.tenant_id = $2 AND d.namespace = $3
        "#,
    )
    .bind(delivery_id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .fetch_optional(pool)
    .await?;
    let Some((attempt, max_attempts, backoff_base_ms, backoff_max_ms)) = sub else {
        return Err(CoreError::not_found("delivery", delivery_id.to_string()));
    };

    let delay_ms = full_jitter_delay_ms(attempt.max(1) as u32, backoff_base_ms as u64, backoff_max_ms as u64);

    let updated = sqlx::query(
        r#"
        UPDATE event_deliveries
        SET status = CASE WHEN attempt >= $4 THEN 'dlq' ELSE 'queued' END,
            last_error = $5,
            next_run_at = NOW() + ($6 || ' milliseconds')::interval,
            completed_at = CASE WHEN attempt >= $4 THEN NOW() ELSE completed_at END,
            locked_by = NULL,
            locked_until = NULL,
            updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2 AND namespace = $3 AND status = 'running'
        "#,
    )
    .bind(delivery_id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(max_attempts)
    .bind(error)
    .bind(delay_ms.to_string())
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(require_row_affected(pool, scope, delivery_id).await);
    }
    Ok(())
}

pub async fn mark_dlq(pool: &PgPool, scope: &Scope, delivery_id: Uuid, error: &str) -> CoreResult<()> {
    let updated = sqlx::query(
        r#"
        UPDATE event_deliveries
        SET status = 'dlq', last_error = $4, locked_by = NULL, locked_until = NULL,
            completed_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2 AND namespace = $3 AND status = 'running'
        "#,
    )
    .bind(delivery_id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(error)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(require_row_affected(pool, scope, delivery_id).await);
    }
    Ok(())
}

async fn require_row_affected(pool: &PgPool, scope: &Scope, id: Uuid) -> CoreError {
    let observed: Result<Option<String>, sqlx::Error> = sqlx::query_scalar(
        "SELECT status::text FROM event_deliveries WHERE id = $1 AND tenant_id = $2 AND namespace = $3",
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .fetch_optional(pool)
    .await;

    match observed {
        Ok(Some(status)) => CoreError::state_mismatch("delivery", id.to_string(), "running", status),
        Ok(None) => CoreError::not_found("delivery", id.to_string()),
        Err(e) => CoreError::Storage(e),
    }
}
