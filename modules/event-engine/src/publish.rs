use queue_errors::{CoreError, CoreResult};
use scope::Scope;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{EventMessage, PublishResult};
use crate::validation::validate_ordering_key;

pub struct NewMessage<'a> {
    pub ordering_key: &'a str,
    pub payload: serde_json::Value,
    pub headers: Option<serde_json::Value>,
}

/// Publishes a message to a topic, stamping it with the topic's
/// monotonic sequence and fanning it out into one queued delivery per
/// enabled subscription, all inside a single transaction.
pub async fn publish(
    pool: &PgPool,
    scope: &Scope,
    topic_id: Uuid,
    msg: NewMessage<'_>,
) -> CoreResult<PublishResult> {
    validate_ordering_key(msg.ordering_key)?;

    let mut tx = pool.begin().await?;

    let sequence: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE event_topics
        SET next_sequence = next_sequence + 1, updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2 AND namespace = $3
        RETURNING next_sequence - 1
        "#,
    )
    .bind(topic_id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .fetch_optional(&mut *tx)
    .await?;
    let sequence = sequence.ok_or_else(|| CoreError::not_found("topic", topic_id.to_string()))?;

    let message = insert_message(&mut tx, scope, topic_id, sequence, msg.ordering_key, msg.payload, msg.headers, None).await?;
    let fanout_count = fan_out(&mut tx, scope, &message).await?;

    tx.commit().await?;

    Ok(PublishResult {
        message,
        fanout_count,
        newly_published: true,
    })
}

/// Outbox-relay entry point: identical to [`publish`] but deduplicates
/// on `source_outbox_id`, so a relay retry after a crash between commit
/// and ack never produces a second message (spec.md §4.4).
pub async fn publish_from_outbox(
    pool: &PgPool,
    scope: &Scope,
    topic_id: Uuid,
    source_outbox_id: Uuid,
    msg: NewMessage<'_>,
) -> CoreResult<PublishResult> {
    validate_ordering_key(msg.ordering_key)?;

    let mut tx = pool.begin().await?;

    let existing = sqlx::query_as::<_, EventMessage>(
        "SELECT * FROM event_messages WHERE tenant_id = $1 AND namespace = $2 AND source_outbox_id = $3",
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(source_outbox_id)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(message) = existing {
        tx.commit().await?;
        return Ok(PublishResult {
            message,
            fanout_count: 0,
            newly_published: false,
        });
    }

    let sequence: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE event_topics
        SET next_sequence = next_sequence + 1, updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2 AND namespace = $3
        RETURNING next_sequence - 1
        "#,
    )
    .bind(topic_id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .fetch_optional(&mut *tx)
    .await?;
    let sequence = sequence.ok_or_else(|| CoreError::not_found("topic", topic_id.to_string()))?;

    let message = insert_message(
        &mut tx,
        scope,
        topic_id,
        sequence,
        msg.ordering_key,
        msg.payload,
        msg.headers,
        Some(source_outbox_id),
    )
    .await?;
    let fanout_count = fan_out(&mut tx, scope, &message).await?;

    tx.commit().await?;

    Ok(PublishResult {
        message,
        fanout_count,
        newly_published: true,
    })
}

#[allow(clippy::too_many_arguments)]
async fn insert_message(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    scope: &Scope,
    topic_id: Uuid,
    sequence: i64,
    ordering_key: &str,
    payload: serde_json::Value,
    headers: Option<serde_json::Value>,
    source_outbox_id: Option<Uuid>,
) -> CoreResult<EventMessage> {
    let message = sqlx::query_as::<_, EventMessage>(
        r#"
        INSERT INTO event_messages (
            id, tenant_id, namespace, topic_id, sequence, ordering_key,
            payload, headers, source_outbox_id, published_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(topic_id)
    .bind(sequence)
    .bind(ordering_key)
    .bind(payload)
    .bind(headers)
    .bind(source_outbox_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(message)
}

async fn fan_out(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    scope: &Scope,
    message: &EventMessage,
) -> CoreResult<i64> {
    let subscription_ids: Vec<Uuid> = sqlx::query_scalar(
        r#"
        SELECT id FROM event_subscriptions
        WHERE tenant_id = $1 AND namespace = $2 AND topic_id = $3 AND enabled = TRUE
        ORDER BY created_at ASC
        "#,
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(message.topic_id)
    .fetch_all(&mut **tx)
    .await?;

    for sub_id in &subscription_ids {
        sqlx::query(
            r#"
            INSERT INTO event_deliveries (
                id, tenant_id, namespace, subscription_id, message_id, message_sequence,
                ordering_key, status, attempt, next_run_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, 'queued', 0, NOW(), NOW(), NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&scope.tenant_id)
        .bind(&scope.namespace)
        .bind(sub_id)
        .bind(message.id)
        .bind(message.sequence)
        .bind(&message.ordering_key)
        .execute(&mut **tx)
        .await?;
    }

    Ok(subscription_ids.len() as i64)
}
