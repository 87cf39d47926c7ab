use queue_errors::{CoreError, CoreResult};
use scope::Scope;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::EventTopic;
use crate::validation::validate_name;

pub async fn create_topic(
    pool: &PgPool,
    scope: &Scope,
    name: &str,
    retention_hours: i32,
) -> CoreResult<EventTopic> {
    validate_name(name)?;

    let existing: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM event_topics WHERE tenant_id = $1 AND namespace = $2 AND name = $3",
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(name)
    .fetch_optional(pool)
    .await?;
    if existing.is_some() {
        return Err(CoreError::Conflict(format!("topic {name:?} already exists")));
    }

    let topic = sqlx::query_as::<_, EventTopic>(
        r#"
        INSERT INTO event_topics (id, tenant_id, namespace, name, retention_hours, next_sequence, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, 1, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(name)
    .bind(retention_hours)
    .fetch_one(pool)
    .await?;

    Ok(topic)
}

pub async fn get_topic(pool: &PgPool, scope: &Scope, id: Uuid) -> CoreResult<EventTopic> {
    sqlx::query_as::<_, EventTopic>(
        "SELECT * FROM event_topics WHERE id = $1 AND tenant_id = $2 AND namespace = $3",
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| CoreError::not_found("topic", id.to_string()))
}

pub async fn get_topic_by_name(pool: &PgPool, scope: &Scope, name: &str) -> CoreResult<EventTopic> {
    sqlx::query_as::<_, EventTopic>(
        "SELECT * FROM event_topics WHERE tenant_id = $1 AND namespace = $2 AND name = $3",
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(name)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| CoreError::not_found("topic", name.to_string()))
}

pub async fn list_topics(pool: &PgPool, scope: &Scope) -> CoreResult<Vec<EventTopic>> {
    let topics = sqlx::query_as::<_, EventTopic>(
        "SELECT * FROM event_topics WHERE tenant_id = $1 AND namespace = $2 ORDER BY created_at ASC",
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .fetch_all(pool)
    .await?;
    Ok(topics)
}

/// Deletes the topic and, via `ON DELETE CASCADE`, its subscriptions and
/// messages (spec.md §3 Ownership).
pub async fn delete_topic(pool: &PgPool, scope: &Scope, id: Uuid) -> CoreResult<()> {
    let deleted = sqlx::query(
        "DELETE FROM event_topics WHERE id = $1 AND tenant_id = $2 AND namespace = $3",
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .execute(pool)
    .await?;

    if deleted.rows_affected() == 0 {
        return Err(CoreError::not_found("topic", id.to_string()));
    }
    Ok(())
}
