use queue_errors::{CoreError, CoreResult};
use scope::Scope;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{EventSubscriptionRow, SubscriptionStats};

pub async fn subscription_stats(
    pool: &PgPool,
    scope: &Scope,
    subscription_id: Uuid,
) -> CoreResult<SubscriptionStats> {
    let sub = sqlx::query_as::<_, EventSubscriptionRow>(
        "SELECT * FROM event_subscriptions WHERE id = $1 AND tenant_id = $2 AND namespace = $3",
    )
    .bind(subscription_id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| CoreError::not_found("subscription", subscription_id.to_string()))?;

    let row: (i64, i64, i64, Option<chrono::DateTime<chrono::Utc>>) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE status = 'running') AS inflight,
            COUNT(*) FILTER (WHERE status = 'queued') AS queued,
            COUNT(*) FILTER (WHERE status = 'dlq') AS dlq,
            MIN(created_at) FILTER (WHERE status IN ('queued', 'running')) AS oldest_unacked_at
        FROM event_deliveries
        WHERE subscription_id = $1
        "#,
    )
    .bind(subscription_id)
    .fetch_one(pool)
    .await?;

    let latest_sequence: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(next_sequence) - 1 FROM event_topics WHERE id = $1",
    )
    .bind(sub.topic_id)
    .fetch_one(pool)
    .await?;
    let latest_sequence = latest_sequence.unwrap_or(0);

    Ok(SubscriptionStats {
        inflight_count: row.0,
        queued_count: row.1,
        dlq_count: row.2,
        latest_sequence,
        oldest_unacked_at: row.3,
        lag: (latest_sequence - sub.last_acked_sequence).max(0),
    })
}
