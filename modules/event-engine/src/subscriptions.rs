use queue_errors::{CoreError, CoreResult};
use scope::Scope;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{EventSubscriptionRow, SubscriptionTarget, WebhookConfig};
use crate::validation::{normalize_webhook_timeout, validate_name};

pub struct NewSubscription {
    pub topic_id: Uuid,
    pub name: String,
    pub consumer_group: String,
    pub target: SubscriptionTarget,
    pub max_attempts: i32,
    pub backoff_base_ms: i64,
    pub backoff_max_ms: i64,
    pub max_inflight: i32,
    pub rate_limit_per_sec: i32,
    pub webhook: WebhookConfig,
}

pub async fn create_subscription(
    pool: &PgPool,
    scope: &Scope,
    new: NewSubscription,
) -> CoreResult<EventSubscriptionRow> {
    validate_name(&new.name)?;
    validate_name(&new.consumer_group)?;

    let (target_type, function_id, function_name, workflow_id, workflow_name) = match &new.target {
        SubscriptionTarget::Function { id, name } => {
            ("function", Some(id.clone()), Some(name.clone()), None, None)
        }
        SubscriptionTarget::Workflow { id, name } => {
            ("workflow", None, None, Some(id.clone()), Some(name.clone()))
        }
    };

    let timeout_s = new.webhook.url.as_ref().map(|_| normalize_webhook_timeout(new.webhook.timeout_s));

    let conflict: Option<(String, String)> = sqlx::query_as(
        r#"
        SELECT name, consumer_group FROM event_subscriptions
        WHERE tenant_id = $1 AND namespace = $2 AND topic_id = $3
          AND (name = $4 OR consumer_group = $5)
        LIMIT 1
        "#,
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(new.topic_id)
    .bind(&new.name)
    .bind(&new.consumer_group)
    .fetch_optional(pool)
    .await?;
    if conflict.is_some() {
        return Err(CoreError::Conflict(format!(
            "subscription name {:?} or consumer_group {:?} already in use on this topic",
            new.name, new.consumer_group
        )));
    }

    let row = sqlx::query_as::<_, EventSubscriptionRow>(
        r#"
        INSERT INTO event_subscriptions (
            id, tenant_id, namespace, topic_id, name, consumer_group,
            target_type, function_id, function_name, workflow_id, workflow_name,
            enabled, max_attempts, backoff_base_ms, backoff_max_ms,
            max_inflight, rate_limit_per_sec, last_acked_sequence,
            webhook_url, webhook_method, webhook_headers, webhook_signing_secret, webhook_timeout_s,
            created_at, updated_at
        ) VALUES (
            $1, $2, $3, $4, $5, $6,
            $7, $8, $9, $10, $11,
            TRUE, $12, $13, $14,
            $15, $16, 0,
            $17, $18, $19, $20, $21,
            NOW(), NOW()
        )
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(new.topic_id)
    .bind(&new.name)
    .bind(&new.consumer_group)
    .bind(target_type)
    .bind(&function_id)
    .bind(&function_name)
    .bind(&workflow_id)
    .bind(&workflow_name)
    .bind(new.max_attempts)
    .bind(new.backoff_base_ms)
    .bind(new.backoff_max_ms)
    .bind(new.max_inflight)
    .bind(new.rate_limit_per_sec)
    .bind(&new.webhook.url)
    .bind(&new.webhook.method)
    .bind(&new.webhook.headers)
    .bind(&new.webhook.signing_secret)
    .bind(timeout_s)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_subscription(
    pool: &PgPool,
    scope: &Scope,
    id: Uuid,
) -> CoreResult<EventSubscriptionRow> {
    sqlx::query_as::<_, EventSubscriptionRow>(
        "SELECT * FROM event_subscriptions WHERE id = $1 AND tenant_id = $2 AND namespace = $3",
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| CoreError::not_found("subscription", id.to_string()))
}

pub async fn list_subscriptions_for_topic(
    pool: &PgPool,
    scope: &Scope,
    topic_id: Uuid,
) -> CoreResult<Vec<EventSubscriptionRow>> {
    let rows = sqlx::query_as::<_, EventSubscriptionRow>(
        r#"
        SELECT * FROM event_subscriptions
        WHERE tenant_id = $1 AND namespace = $2 AND topic_id = $3
        ORDER BY created_at ASC
        "#,
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(topic_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn set_enabled(pool: &PgPool, scope: &Scope, id: Uuid, enabled: bool) -> CoreResult<()> {
    let updated = sqlx::query(
        r#"
        UPDATE event_subscriptions
        SET enabled = $4, updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2 AND namespace = $3
        "#,
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(enabled)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(CoreError::not_found("subscription", id.to_string()));
    }
    Ok(())
}

/// Deletes the subscription and, via `ON DELETE CASCADE`, its deliveries
/// and inbox rows (spec.md §3 Ownership).
pub async fn delete_subscription(pool: &PgPool, scope: &Scope, id: Uuid) -> CoreResult<()> {
    let deleted = sqlx::query(
        "DELETE FROM event_subscriptions WHERE id = $1 AND tenant_id = $2 AND namespace = $3",
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .execute(pool)
    .await?;

    if deleted.rows_affected() == 0 {
        return Err(CoreError::not_found("subscription", id.to_string()));
    }
    Ok(())
}
