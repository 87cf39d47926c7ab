use chrono::Utc;
use queue_errors::CoreResult;
use sqlx::PgPool;

use crate::models::{QuotaDecision, QuotaRow};

/// Windowed admission check for counter dimensions (`invocations`,
/// `event_publishes`). Locks the quota row, adds `amount` into the
/// current second-bucket, sums the trailing window, and compares
/// against `hard_limit + burst` (spec.md §4.6).
pub async fn check_and_consume(
    pool: &PgPool,
    tenant_id: &str,
    dimension: &str,
    amount: i64,
) -> CoreResult<QuotaDecision> {
    let mut tx = pool.begin().await?;

    let quota: Option<QuotaRow> = sqlx::query_as::<_, (i64, i64, i32)>(
        "SELECT hard_limit, burst, window_s FROM tenant_quotas WHERE tenant_id = $1 AND dimension = $2 FOR UPDATE",
    )
    .bind(tenant_id)
    .bind(dimension)
    .fetch_optional(&mut *tx)
    .await?
    .map(|(hard_limit, burst, window_s)| QuotaRow { hard_limit, burst, window_s });

    let Some(quota) = quota else {
        tx.commit().await?;
        return Ok(QuotaDecision {
            allowed: true,
            used: 0,
            limit: i64::MAX,
            window_s: 0,
            retry_after_s: 0,
        });
    };

    let now = Utc::now();
    let bucket = now.timestamp();

    sqlx::query(
        r#"
        INSERT INTO tenant_usage_timeseries (tenant_id, dimension, bucket_at, amount)
        VALUES ($1, $2, to_timestamp($3), $4)
        ON CONFLICT (tenant_id, dimension, bucket_at)
        DO UPDATE SET amount = tenant_usage_timeseries.amount + EXCLUDED.amount
        "#,
    )
    .bind(tenant_id)
    .bind(dimension)
    .bind(bucket as f64)
    .bind(amount)
    .execute(&mut *tx)
    .await?;

    let used: Option<i64> = sqlx::query_scalar(
        r#"
        SELECT SUM(amount) FROM tenant_usage_timeseries
        WHERE tenant_id = $1 AND dimension = $2
          AND bucket_at >= $3 - make_interval(secs => $4) AND bucket_at <= $3
        "#,
    )
    .bind(tenant_id)
    .bind(dimension)
    .bind(now)
    .bind(quota.window_s as f64)
    .fetch_one(&mut *tx)
    .await?;
    let used = used.unwrap_or(0);

    let limit = quota.hard_limit + quota.burst;

    if used > limit {
        tx.rollback().await?;
        return Ok(QuotaDecision {
            allowed: false,
            used,
            limit,
            window_s: quota.window_s,
            retry_after_s: quota.window_s,
        });
    }

    sqlx::query(
        r#"
        INSERT INTO tenant_usage_current (tenant_id, dimension, current_value, updated_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (tenant_id, dimension)
        DO UPDATE SET current_value = EXCLUDED.current_value, updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(tenant_id)
    .bind(dimension)
    .bind(used)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM tenant_usage_timeseries
        WHERE tenant_id = $1 AND dimension = $2 AND bucket_at < $3 - make_interval(secs => $4)
        "#,
    )
    .bind(tenant_id)
    .bind(dimension)
    .bind(now)
    .bind((quota.window_s * 10) as f64)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(QuotaDecision {
        allowed: true,
        used,
        limit,
        window_s: quota.window_s,
        retry_after_s: 0,
    })
}

/// Absolute-gauge check for dimensions like `memory_mb` or
/// `async_queue_depth`: the caller supplies the already-computed
/// current level and this compares it to `hard_limit + burst`.
pub async fn check_absolute(
    pool: &PgPool,
    tenant_id: &str,
    dimension: &str,
    value: i64,
) -> CoreResult<QuotaDecision> {
    let quota: Option<(i64, i64)> = sqlx::query_as(
        "SELECT hard_limit, burst FROM tenant_quotas WHERE tenant_id = $1 AND dimension = $2",
    )
    .bind(tenant_id)
    .bind(dimension)
    .fetch_optional(pool)
    .await?;

    let Some((hard_limit, burst)) = quota else {
        return Ok(QuotaDecision {
            allowed: true,
            used: value,
            limit: i64::MAX,
            window_s: 0,
            retry_after_s: 0,
        });
    };

    let limit = hard_limit + burst;
    Ok(QuotaDecision {
        allowed: value <= limit,
        used: value,
        limit,
        window_s: 0,
        retry_after_s: if value > limit { 1 } else { 0 },
    })
}
