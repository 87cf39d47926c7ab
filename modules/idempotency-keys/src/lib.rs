//! Generic `(scope, scope_id, idempotency_key) -> resource_id` claim table
//! with TTL (spec.md §3, §4.2). Used directly by the async queue's
//! `EnqueueWithIdempotency`, and reusable as-is by event publish should a
//! caller want idempotent publishes keyed the same way.
//!
//! The table only ever stores a *claim* — the resource itself (e.g. the
//! `AsyncInvocation` row) is created by the caller in the same
//! transaction as [`link`]. This two-step claim-then-link shape is what
//! makes the "stale key" self-healing path possible: a claim can commit
//! while the resource insert that was supposed to follow it never does
//! (crash between the two statements), leaving a key that points at
//! nothing. [`resolve`] detects and repairs that case.

use chrono::{DateTime, Duration, Utc};
use queue_errors::{CoreError, CoreResult};
use scope::Scope;
use sqlx::{Postgres, Transaction};
use tracing::warn;

pub const DEFAULT_TTL_HOURS: i64 = 24;
pub const MAX_TTL_HOURS: i64 = 24 * 7;
pub const MAX_KEY_BYTES: usize = 256;

/// Clamp a caller-supplied TTL into `[24h, 7d]`, defaulting to 24h when
/// none is given.
pub fn clamp_ttl(requested: Option<Duration>) -> Duration {
    let requested = requested.unwrap_or_else(|| Duration::hours(DEFAULT_TTL_HOURS));
    let max = Duration::hours(MAX_TTL_HOURS);
    if requested > max {
        max
    } else if requested < Duration::zero() {
        Duration::hours(DEFAULT_TTL_HOURS)
    } else {
        requested
    }
}

pub fn validate_key(key: &str) -> CoreResult<()> {
    if key.is_empty() {
        return Err(CoreError::Validation("idempotency key must not be empty".into()));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(CoreError::Validation(format!(
            "idempotency key exceeds {MAX_KEY_BYTES} bytes"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The claim is ours (fresh insert, or takeover of an expired claim).
    /// The caller should now create the resource and call [`link`].
    Claimed,
    /// An unexpired claim already exists and is linked to a resource.
    AlreadyLinked { resource_id: String },
    /// An unexpired claim exists but has not yet been linked to a
    /// resource by whoever holds it (a concurrent enqueue is mid-flight).
    PendingElsewhere,
}

/// Attempt to claim `(scope, scope_id, key)`. One statement: insert, or
/// on conflict take over the row only if its `expires_at` has passed.
pub async fn claim(
    tx: &mut Transaction<'_, Postgres>,
    scope: &Scope,
    scope_id: &str,
    key: &str,
    resource_type: &str,
    ttl: Duration,
) -> CoreResult<ClaimOutcome> {
    validate_key(key)?;
    let expires_at = Utc::now() + ttl;

    #[derive(sqlx::FromRow)]
    struct Claimed {
        resource_id: Option<String>,
    }

    let claimed: Option<Claimed> = sqlx::query_as(
        r#"
        INSERT INTO idempotency_keys
            (tenant_id, namespace, scope_id, idempotency_key, resource_type, resource_id, expires_at)
        VALUES ($1, $2, $3, $4, $5, NULL, $6)
        ON CONFLICT (tenant_id, namespace, scope_id, idempotency_key) DO UPDATE
            SET resource_type = EXCLUDED.resource_type,
                resource_id = NULL,
                expires_at = EXCLUDED.expires_at
            WHERE idempotency_keys.expires_at <= NOW()
        RETURNING resource_id
        "#,
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(scope_id)
    .bind(key)
    .bind(resource_type)
    .bind(expires_at)
    .fetch_optional(&mut **tx)
    .await?;

    if claimed.is_some() {
        return Ok(ClaimOutcome::Claimed);
    }

    // Conflict occurred and the existing row hasn't expired — read it to
    // tell the caller whether it's already linked.
    #[derive(sqlx::FromRow)]
    struct Existing {
        resource_id: Option<String>,
    }

    let existing: Option<Existing> = sqlx::query_as(
        r#"
        SELECT resource_id
        FROM idempotency_keys
        WHERE tenant_id = $1 AND namespace = $2 AND scope_id = $3 AND idempotency_key = $4
          AND expires_at > NOW()
        "#,
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(scope_id)
    .bind(key)
    .fetch_optional(&mut **tx)
    .await?;

    match existing {
        Some(Existing {
            resource_id: Some(id),
        }) => Ok(ClaimOutcome::AlreadyLinked { resource_id: id }),
        Some(Existing { resource_id: None }) => Ok(ClaimOutcome::PendingElsewhere),
        // Raced with an expiry/delete between the two statements; treat as
        // re-claimable by the caller (it will retry).
        None => Ok(ClaimOutcome::Claimed),
    }
}

/// Link a claimed key to the resource the caller just created. Call this
/// in the same transaction as the resource insert.
pub async fn link(
    tx: &mut Transaction<'_, Postgres>,
    scope: &Scope,
    scope_id: &str,
    key: &str,
    resource_id: &str,
) -> CoreResult<()> {
    sqlx::query(
        r#"
        UPDATE idempotency_keys
        SET resource_id = $5
        WHERE tenant_id = $1 AND namespace = $2 AND scope_id = $3 AND idempotency_key = $4
        "#,
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(scope_id)
    .bind(key)
    .bind(resource_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Delete a claim whose linked resource turned out to be missing (the
/// "stale key" repair path, spec.md §9). Callers should log/metric this —
/// it firing regularly indicates a bug upstream, not steady-state
/// behavior.
pub async fn delete_stale(
    tx: &mut Transaction<'_, Postgres>,
    scope: &Scope,
    scope_id: &str,
    key: &str,
) -> CoreResult<()> {
    warn!(
        tenant_id = %scope.tenant_id,
        namespace = %scope.namespace,
        scope_id,
        key,
        "deleting stale idempotency key pointing at a missing resource"
    );
    sqlx::query(
        r#"
        DELETE FROM idempotency_keys
        WHERE tenant_id = $1 AND namespace = $2 AND scope_id = $3 AND idempotency_key = $4
        "#,
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(scope_id)
    .bind(key)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct LinkedKey {
    pub resource_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Load the resource a valid (non-expired) key currently points to.
pub async fn load_linked(
    tx: &mut Transaction<'_, Postgres>,
    scope: &Scope,
    scope_id: &str,
    key: &str,
) -> CoreResult<Option<LinkedKey>> {
    #[derive(sqlx::FromRow)]
    struct Row {
        resource_id: Option<String>,
        expires_at: DateTime<Utc>,
    }

    let row: Option<Row> = sqlx::query_as(
        r#"
        SELECT resource_id, expires_at
        FROM idempotency_keys
        WHERE tenant_id = $1 AND namespace = $2 AND scope_id = $3 AND idempotency_key = $4
          AND expires_at > NOW()
        "#,
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(scope_id)
    .bind(key)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.and_then(|r| {
        r.resource_id.map(|resource_id| LinkedKey {
            resource_id,
            expires_at: r.expires_at,
        })
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_ttl_defaults_to_24h() {
        let d = clamp_ttl(None);
        assert_eq!(d, Duration::hours(24));
    }

    #[test]
    fn clamp_ttl_caps_at_7d() {
        let d = clamp_ttl(Some(Duration::days(30)));
        assert_eq!(d, Duration::hours(MAX_TTL_HOURS));
    }

    #[test]
    fn clamp_ttl_rejects_negative_with_default() {
        let d = clamp_ttl(Some(Duration::hours(-5)));
        assert_eq!(d, Duration::hours(24));
    }

    #[test]
    fn validate_key_rejects_empty() {
        assert!(validate_key("").is_err());
    }

    #[test]
    fn validate_key_rejects_too_long() {
        let long = "a".repeat(MAX_KEY_BYTES + 1);
        assert!(validate_key(&long).is_err());
    }

    #[test]
    fn validate_key_accepts_max_length() {
        let ok = "a".repeat(MAX_KEY_BYTES);
        assert!(validate_key(&ok).is_ok());
    }
}
