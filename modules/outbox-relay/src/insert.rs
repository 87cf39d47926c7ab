use queue_errors::CoreResult;
use scope::Scope;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{EventOutboxRow, NewOutboxEntry, DEFAULT_MAX_ATTEMPTS};

/// Inserts an outbox row. Takes a [`PgExecutor`] so producers can write
/// this alongside their own business rows in the same transaction
/// (spec.md §4.4): `sqlx::query(...).execute(&mut *tx)` composes with
/// this the same way it would with a direct `INSERT`.
pub async fn insert_outbox<'e, E>(
    executor: E,
    scope: &Scope,
    entry: NewOutboxEntry,
) -> CoreResult<EventOutboxRow>
where
    E: PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, EventOutboxRow>(
        r#"
        INSERT INTO event_outbox (
            id, tenant_id, namespace, topic_id, ordering_key, payload, headers,
            status, attempt, max_attempts, next_attempt_at, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', 0, $8, NOW(), NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(entry.topic_id)
    .bind(&entry.ordering_key)
    .bind(entry.payload)
    .bind(entry.headers)
    .bind(DEFAULT_MAX_ATTEMPTS)
    .fetch_one(executor)
    .await?;

    Ok(row)
}
