use queue_errors::CoreResult;
use scope::Scope;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn mark_succeeded(
    pool: &PgPool,
    scope: &Scope,
    subscription_id: Uuid,
    message_id: Uuid,
    request_id: Option<&str>,
    output: Option<serde_json::Value>,
) -> CoreResult<()> {
    sqlx::query(
        r#"
        UPDATE event_inbox
        SET status = 'succeeded', request_id = $4, output = $5, last_error = NULL, updated_at = NOW()
        WHERE subscription_id = $1 AND message_id = $2 AND tenant_id = $3
        "#,
    )
    .bind(subscription_id)
    .bind(message_id)
    .bind(&scope.tenant_id)
    .bind(request_id)
    .bind(output)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(
    pool: &PgPool,
    scope: &Scope,
    subscription_id: Uuid,
    message_id: Uuid,
    error: &str,
) -> CoreResult<()> {
    sqlx::query(
        r#"
        UPDATE event_inbox
        SET status = 'failed', last_error = $4, updated_at = NOW()
        WHERE subscription_id = $1 AND message_id = $2 AND tenant_id = $3
        "#,
    )
    .bind(subscription_id)
    .bind(message_id)
    .bind(&scope.tenant_id)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}
