use chrono::Utc;
use queue_errors::{CoreError, CoreResult};
use scope::Scope;
use sqlx::PgPool;
use uuid::Uuid;

/// `queued -> paused`. Conditional on current status to avoid racing a lease.
pub async fn pause(pool: &PgPool, scope: &Scope, id: Uuid) -> CoreResult<()> {
    transition(pool, scope, id, "queued", "paused", None).await
}

/// `paused -> queued`, resetting `next_run_at = now`.
pub async fn resume(pool: &PgPool, scope: &Scope, id: Uuid) -> CoreResult<()> {
    transition(pool, scope, id, "paused", "queued", Some(Utc::now())).await
}

/// Pause every queued invocation for a function in one statement.
pub async fn pause_by_function(pool: &PgPool, scope: &Scope, function_id: &str) -> CoreResult<u64> {
    let res = sqlx::query(
        r#"
        UPDATE async_invocations
        SET status = 'paused', updated_at = NOW()
        WHERE tenant_id = $1 AND namespace = $2 AND function_id = $3 AND status = 'queued'
        "#,
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(function_id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

/// Resume every paused invocation for a function in one statement.
pub async fn resume_by_function(pool: &PgPool, scope: &Scope, function_id: &str) -> CoreResult<u64> {
    let now = Utc::now();
    let res = sqlx::query(
        r#"
        UPDATE async_invocations
        SET status = 'queued', next_run_at = $4, updated_at = $4
        WHERE tenant_id = $1 AND namespace = $2 AND function_id = $3 AND status = 'paused'
        "#,
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(function_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

pub async fn pause_by_workflow(pool: &PgPool, scope: &Scope, workflow_id: &str) -> CoreResult<u64> {
    let res = sqlx::query(
        r#"
        UPDATE async_invocations
        SET status = 'paused', updated_at = NOW()
        WHERE tenant_id = $1 AND namespace = $2 AND workflow_id = $3 AND status = 'queued'
        "#,
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(workflow_id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

pub async fn resume_by_workflow(pool: &PgPool, scope: &Scope, workflow_id: &str) -> CoreResult<u64> {
    let now = Utc::now();
    let res = sqlx::query(
        r#"
        UPDATE async_invocations
        SET status = 'queued', next_run_at = $4, updated_at = $4
        WHERE tenant_id = $1 AND namespace = $2 AND workflow_id = $3 AND status = 'paused'
        "#,
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(workflow_id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

/// Requeue from DLQ, optionally overriding `max_attempts`. The attempt
/// counter resets to zero.
pub async fn requeue_from_dlq(
    pool: &PgPool,
    scope: &Scope,
    id: Uuid,
    max_attempts_override: Option<i32>,
) -> CoreResult<()> {
    let now = Utc::now();
    let updated = sqlx::query(
        r#"
        UPDATE async_invocations
        SET status = 'queued',
            attempt = 0,
            max_attempts = COALESCE($4, max_attempts),
            next_run_at = $5,
            completed_at = NULL,
            last_error = NULL,
            updated_at = $5
        WHERE id = $1 AND tenant_id = $2 AND namespace = $3 AND status = 'dlq'
        "#,
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(max_attempts_override)
    .bind(now)
    .execute(pool)
    .await?;

    require_status(pool, scope, id, updated.rows_affected(), "dlq").await
}

/// Delete an invocation. Only permitted while `queued` or `paused`.
pub async fn delete(pool: &PgPool, scope: &Scope, id: Uuid) -> CoreResult<()> {
    let deleted = sqlx::query(
        r#"
        DELETE FROM async_invocations
        WHERE id = $1 AND tenant_id = $2 AND namespace = $3
          AND status IN ('queued', 'paused')
        "#,
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .execute(pool)
    .await?;

    if deleted.rows_affected() > 0 {
        return Ok(());
    }

    let observed: Option<String> = sqlx::query_scalar(
        "SELECT status::text FROM async_invocations WHERE id = $1 AND tenant_id = $2 AND namespace = $3",
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .fetch_optional(pool)
    .await?;

    match observed {
        Some(status) => Err(CoreError::state_mismatch(
            "invocation",
            id.to_string(),
            "queued or paused",
            status,
        )),
        None => Err(CoreError::not_found("invocation", id.to_string())),
    }
}

async fn transition(
    pool: &PgPool,
    scope: &Scope,
    id: Uuid,
    from: &'static str,
    to: &'static str,
    next_run_at: Option<chrono::DateTime<Utc>>,
) -> CoreResult<()> {
    let now = Utc::now();
    let updated = if let Some(next_run_at) = next_run_at {
        sqlx::query(
            r#"
            UPDATE async_invocations
            SET status = $5, next_run_at = $4, updated_at = $6
            WHERE id = $1 AND tenant_id = $2 AND namespace = $3 AND status = $7
            "#,
        )
        .bind(id)
        .bind(&scope.tenant_id)
        .bind(&scope.namespace)
        .bind(next_run_at)
        .bind(to)
        .bind(now)
        .bind(from)
        .execute(pool)
        .await?
    } else {
        sqlx::query(
            r#"
            UPDATE async_invocations
            SET status = $4, updated_at = $5
            WHERE id = $1 AND tenant_id = $2 AND namespace = $3 AND status = $6
            "#,
        )
        .bind(id)
        .bind(&scope.tenant_id)
        .bind(&scope.namespace)
        .bind(to)
        .bind(now)
        .bind(from)
        .execute(pool)
        .await?
    };

    require_status(pool, scope, id, updated.rows_affected(), from).await
}

async fn require_status(
    pool: &PgPool,
    scope: &Scope,
    id: Uuid,
    rows_affected: u64,
    expected: &str,
) -> CoreResult<()> {
    if rows_affected > 0 {
        return Ok(());
    }

    let observed: Option<String> = sqlx::query_scalar(
        "SELECT status::text FROM async_invocations WHERE id = $1 AND tenant_id = $2 AND namespace = $3",
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .fetch_optional(pool)
    .await?;

    match observed {
        Some(status) => Err(CoreError::state_mismatch(
            "invocation",
            id.to_string(),
            expected,
            status,
        )),
        None => Err(CoreError::not_found("invocation", id.to_string())),
    }
}
