use chrono::{DateTime, Duration, Utc};
use queue_errors::{CoreError, CoreResult};
use scope::Scope;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{AsyncInvocation, ResolutionResult};

/// Acquire one due invocation for `worker_id` (spec.md §4.2 Acquire-due).
///
/// A single statement selects the oldest due-or-reclaimable row, skipping
/// rows already locked by a concurrent acquirer, and flips it to
/// `running` in the same round trip. Reclaiming an expired lease does
/// **not** reset `attempt` — the already-counted attempt stands.
pub async fn acquire_due(
    pool: &PgPool,
    scope: &Scope,
    worker_id: &str,
    lease: Duration,
) -> CoreResult<Option<AsyncInvocation>> {
    let now = Utc::now();
    let locked_until = now + lease;

    let inv = sqlx::query_as::<_, AsyncInvocation>(
        r#"
        WITH candidate AS (
            SELECT id
            FROM async_invocations
            WHERE tenant_id = $1 AND namespace = $2
              AND (
                    (status = 'queued' AND next_run_at <= $3)
                 OR (status = 'running' AND locked_until < $3)
                  )
            ORDER BY next_run_at ASC, created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE async_invocations a
        SET status = 'running',
            attempt = a.attempt + 1,
            locked_by = $4,
            locked_until = $5,
            started_at = COALESCE(a.started_at, $3),
            updated_at = $3
        FROM candidate
        WHERE a.id = candidate.id
        RETURNING a.*
        "#,
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(now)
    .bind(worker_id)
    .bind(locked_until)
    .fetch_optional(pool)
    .await?;

    Ok(inv)
}

/// Mark a running invocation succeeded. A second call against an
/// already-succeeded row is a no-op error surfaced to the caller.
pub async fn mark_succeeded(
    pool: &PgPool,
    scope: &Scope,
    id: Uuid,
    result: ResolutionResult,
) -> CoreResult<()> {
    let now = Utc::now();
    let updated = sqlx::query(
        r#"
        UPDATE async_invocations
        SET status = 'succeeded',
            completed_at = $4,
            request_id = $5,
            output = $6,
            duration_ms = $7,
            cold_start = $8,
            locked_by = NULL,
            locked_until = NULL,
            updated_at = $4
        WHERE id = $1 AND tenant_id = $2 AND namespace = $3 AND status = 'running'
        "#,
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(now)
    .bind(&result.request_id)
    .bind(&result.output)
    .bind(result.duration_ms)
    .bind(result.cold_start)
    .execute(pool)
    .await?;

    require_row_affected(pool, scope, id, updated.rows_affected(), "running").await
}

/// Requeue a running invocation for retry at a caller-computed time.
pub async fn mark_retry(
    pool: &PgPool,
    scope: &Scope,
    id: Uuid,
    last_error: &str,
    next_run_at: DateTime<Utc>,
) -> CoreResult<()> {
    let now = Utc::now();
    let updated = sqlx::query(
        r#"
        UPDATE async_invocations
        SET status = 'queued',
            last_error = $4,
            next_run_at = $5,
            locked_by = NULL,
            locked_until = NULL,
            updated_at = $6
        WHERE id = $1 AND tenant_id = $2 AND namespace = $3 AND status = 'running'
        "#,
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(last_error)
    .bind(next_run_at)
    .bind(now)
    .execute(pool)
    .await?;

    require_row_affected(pool, scope, id, updated.rows_affected(), "running").await
}

/// Move a running invocation to the dead-letter queue.
pub async fn mark_dlq(pool: &PgPool, scope: &Scope, id: Uuid, last_error: &str) -> CoreResult<()> {
    let now = Utc::now();
    let updated = sqlx::query(
        r#"
        UPDATE async_invocations
        SET status = 'dlq',
            completed_at = $4,
            last_error = $5,
            locked_by = NULL,
            locked_until = NULL,
            updated_at = $4
        WHERE id = $1 AND tenant_id = $2 AND namespace = $3 AND status = 'running'
        "#,
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(now)
    .bind(last_error)
    .execute(pool)
    .await?;

    require_row_affected(pool, scope, id, updated.rows_affected(), "running").await
}

/// Compute the next retry time from the attempt count and backoff params
/// (spec.md §4.2: `delay = min(max, base * 2^(attempt-1))`, full jitter).
pub fn scheduled_retry_time(attempt: i32, backoff_base_ms: i64, backoff_max_ms: i64) -> DateTime<Utc> {
    let delay_ms = retry::full_jitter_delay_ms(
        attempt.max(1) as u32,
        backoff_base_ms.max(0) as u64,
        backoff_max_ms.max(0) as u64,
    );
    Utc::now() + Duration::milliseconds(delay_ms as i64)
}

async fn require_row_affected(
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
