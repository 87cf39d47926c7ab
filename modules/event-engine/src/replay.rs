use chrono::{DateTime, Utc};
use queue_errors::{CoreError, CoreResult};
use scope::Scope;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::EventSubscriptionRow;

/// Re-queues deliveries for every retained message with `sequence >=
/// from_sequence` on the subscription's topic, up to `limit` messages,
/// oldest first (spec.md §4.3 Replay).
pub async fn replay(
    pool: &PgPool,
    scope: &Scope,
    subscription_id: Uuid,
    from_sequence: i64,
    limit: i64,
) -> CoreResult<i64> {
    let sub = sqlx::query_as::<_, EventSubscriptionRow>(
        "SELECT * FROM event_subscriptions WHERE id = $1 AND tenant_id = $2 AND namespace = $3",
    )
    .bind(subscription_id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| CoreError::not_found("subscription", subscription_id.to_string()))?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO event_deliveries (
            id, tenant_id, namespace, subscription_id, message_id, message_sequence,
            ordering_key, status, attempt, next_run_at, created_at, updated_at
        )
        SELECT gen_random_uuid(), m.tenant_id, m.namespace, $1, m.id, m.sequence,
               m.ordering_key, 'queued', 0, NOW(), NOW(), NOW()
        FROM event_messages m
        WHERE m.tenant_id = $2 AND m.namespace = $3 AND m.topic_id = $4 AND m.sequence >= $5
          AND NOT EXISTS (
              SELECT 1 FROM event_deliveries d
              WHERE d.subscription_id = $1 AND d.message_id = m.id
          )
        ORDER BY m.sequence ASC
        LIMIT $6
        "#,
    )
    .bind(subscription_id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(sub.topic_id)
    .bind(from_sequence)
    .bind(limit)
    .execute(pool)
    .await?;

    Ok(inserted.rows_affected() as i64)
}

/// Resolves a replay start time to the sequence of the first message
/// published at or after it, falling back to `max(sequence) + 1` (i.e.
/// "nothing to replay") when the topic has no such message.
pub async fn resolve_by_time(
    pool: &PgPool,
    scope: &Scope,
    topic_id: Uuid,
    from: DateTime<Utc>,
) -> CoreResult<i64> {
    let sequence: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT sequence FROM event_messages
        WHERE tenant_id = $1 AND namespace = $2 AND topic_id = $3 AND published_at >= $4
        ORDER BY sequence ASC
        LIMIT 1
        "#,
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(topic_id)
    .bind(from)
    .fetch_optional(pool)
    .await?;

    if let Some(seq) = sequence {
        return Ok(seq);
    }

    let max: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(sequence) FROM event_messages WHERE tenant_id = $1 AND namespace = $2 AND topic_id = $3",
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(topic_id)
    .fetch_one(pool)
    .await?;

    Ok(max.unwrap_or(0) + 1)
}
