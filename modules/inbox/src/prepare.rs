use queue_errors::CoreResult;
use scope::Scope;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{EventInboxRow, InboxStatus, PrepareOutcome};

/// Claims the inbox slot for `(subscription_id, message_id)` ahead of
/// executing a delivery (spec.md §4.5). If the slot is already
/// `succeeded`, the caller should skip execution and reuse the cached
/// result. Otherwise the row's `delivery_id` is moved to the current
/// attempt and the caller proceeds.
pub async fn prepare(
    pool: &PgPool,
    scope: &Scope,
    subscription_id: Uuid,
    message_id: Uuid,
    delivery_id: Uuid,
) -> CoreResult<PrepareOutcome> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO event_inbox (
            subscription_id, message_id, tenant_id, namespace, delivery_id,
            status, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, 'processing', NOW(), NOW())
        ON CONFLICT (subscription_id, message_id) DO NOTHING
        "#,
    )
    .bind(subscription_id)
    .bind(message_id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(delivery_id)
    .execute(&mut *tx)
    .await?;

    if inserted.rows_affected() > 0 {
        tx.commit().await?;
        return Ok(PrepareOutcome::Proceed);
    }

    let existing = sqlx::query_as::<_, EventInboxRow>(
        r#"
        SELECT * FROM event_inbox
        WHERE subscription_id = $1 AND message_id = $2
        FOR UPDATE
        "#,
    )
    .bind(subscription_id)
    .bind(message_id)
    .fetch_one(&mut *tx)
    .await?;

    if existing.status == InboxStatus::Succeeded {
        tx.commit().await?;
        return Ok(PrepareOutcome::Deduplicated(existing));
    }

    sqlx::query(
        r#"
        UPDATE event_inbox
        SET delivery_id = $3, updated_at = NOW()
        WHERE subscription_id = $1 AND message_id = $2
        "#,
    )
    .bind(subscription_id)
    .bind(message_id)
    .bind(delivery_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(PrepareOutcome::Proceed)
}
