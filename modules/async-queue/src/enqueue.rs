use chrono::{Duration, Utc};
use idempotency_keys::ClaimOutcome;
use queue_errors::{CoreError, CoreResult};
use scope::Scope;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    AsyncInvocation, NewInvocation, DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_MS,
    DEFAULT_MAX_ATTEMPTS,
};

const IDEMPOTENCY_SCOPE: &str = "invoke_async";

/// Insert a new invocation, filling in defaults (spec.md §4.2 Enqueue).
pub async fn enqueue(
    pool: &PgPool,
    scope: &Scope,
    new: NewInvocation,
) -> CoreResult<AsyncInvocation> {
    let mut tx = pool.begin().await?;
    let inv = insert_invocation(&mut tx, scope, &new).await?;
    tx.commit().await?;
    Ok(inv)
}

pub struct EnqueueIdempotentOutcome {
    pub invocation: AsyncInvocation,
    pub deduplicated: bool,
}

/// Enqueue with idempotency (spec.md §4.2 Enqueue with idempotency). TTL
/// is clamped to `[24h, 7d]`; `key` is limited to 256 bytes.
pub async fn enqueue_with_idempotency(
    pool: &PgPool,
    scope: &Scope,
    new: NewInvocation,
    key: &str,
    ttl: Option<Duration>,
) -> CoreResult<EnqueueIdempotentOutcome> {
    idempotency_keys::validate_key(key)?;
    let ttl = idempotency_keys::clamp_ttl(ttl);

    let mut attempted_repair = false;

    loop {
        let mut tx = pool.begin().await?;
        let outcome = idempotency_keys::claim(
            &mut tx,
            scope,
            &new.function_id,
            key,
            IDEMPOTENCY_SCOPE,
            ttl,
        )
        .await?;

        match outcome {
            ClaimOutcome::Claimed => {
                let inv = insert_invocation(&mut tx, scope, &new).await?;
                idempotency_keys::link(
                    &mut tx,
                    scope,
                    &new.function_id,
                    key,
                    &inv.id.to_string(),
                )
                .await?;
                tx.commit().await?;
                return Ok(EnqueueIdempotentOutcome {
                    invocation: inv,
                    deduplicated: false,
                });
            }
            ClaimOutcome::PendingElsewhere => {
                tx.rollback().await?;
                return Err(CoreError::Conflict(format!(
                    "idempotency key {key:?} is being claimed by a concurrent request"
                )));
            }
            ClaimOutcome::AlreadyLinked { resource_id } => {
                let id: Uuid = resource_id
                    .parse()
                    .map_err(|_| CoreError::Conflict("corrupt idempotency link".into()))?;
                match load_invocation(&mut tx, scope, id).await? {
                    Some(inv) => {
                        tx.commit().await?;
                        return Ok(EnqueueIdempotentOutcome {
                            invocation: inv,
                            deduplicated: true,
                        });
                    }
                    None if !attempted_repair => {
                        // Stale key: linked resource is missing. Repair
                        // once and retry the claim (spec.md §9).
                        idempotency_keys::delete_stale(&mut tx, scope, &new.function_id, key)
                            .await?;
                        tx.commit().await?;
                        attempted_repair = true;
                        continue;
                    }
                    None => {
                        tx.rollback().await?;
                        return Err(CoreError::Conflict(format!(
                            "idempotency key {key:?} could not be claimed after repair"
                        )));
                    }
                }
            }
        }
    }
}

async fn insert_invocation(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    scope: &Scope,
    new: &NewInvocation,
) -> CoreResult<AsyncInvocation> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let max_attempts = new.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
    let backoff_base_ms = new.backoff_base_ms.unwrap_or(DEFAULT_BACKOFF_BASE_MS);
    let backoff_max_ms = new.backoff_max_ms.unwrap_or(DEFAULT_BACKOFF_MAX_MS);

    let inv = sqlx::query_as::<_, AsyncInvocation>(
        r#"
        INSERT INTO async_invocations
            (id, tenant_id, namespace, function_id, function_name, workflow_id, workflow_name,
             payload, status, attempt, max_attempts, backoff_base_ms, backoff_max_ms,
             next_run_at, created_at, updated_at)
        VALUES
            ($1, $2, $3, $4, $5, $6, $7, $8, 'queued', 0, $9, $10, $11, $12, $12, $12)
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(&new.function_id)
    .bind(&new.function_name)
    .bind(&new.workflow_id)
    .bind(&new.workflow_name)
    .bind(&new.payload)
    .bind(max_attempts)
    .bind(backoff_base_ms)
    .bind(backoff_max_ms)
    .bind(now)
    .fetch_one(&mut **tx)
    .await?;

    Ok(inv)
}

async fn load_invocation(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    scope: &Scope,
    id: Uuid,
) -> CoreResult<Option<AsyncInvocation>> {
    let inv = sqlx::query_as::<_, AsyncInvocation>(
        r#"
        SELECT * FROM async_invocations
        WHERE id = $1 AND tenant_id = $2 AND namespace = $3
        "#,
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(inv)
}
