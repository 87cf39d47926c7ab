use queue_errors::{CoreError, CoreResult};
use scope::Scope;
use sqlx::PgPool;
use uuid::Uuid;

/// Operator path: reset a `failed` outbox row back to `pending` so the
/// relay picks it up again (spec.md §4.4).
pub async fn requeue_outbox(pool: &PgPool, scope: &Scope, id: Uuid) -> CoreResult<()> {
    let updated = sqlx::query(
        r#"
        UPDATE event_outbox
        SET status = 'pending', attempt = 0, next_attempt_at = NOW(), last_error = NULL, updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2 AND namespace = $3 AND status = 'failed'
        "#,
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .execute(pool)
    .await?;

    if updated.rows_affected() > 0 {
        return Ok(());
    }

    let observed: Option<String> = sqlx::query_scalar(
        "SELECT status::text FROM event_outbox WHERE id = $1 AND tenant_id = $2 AND namespace = $3",
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .fetch_optional(pool)
    .await?;

    match observed {
        Some(status) => Err(CoreError::state_mismatch("outbox", id.to_string(), "failed", status)),
        None => Err(CoreError::not_found("outbox", id.to_string())),
    }
}
