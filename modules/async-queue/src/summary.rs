use queue_errors::CoreResult;
use scope::Scope;
use sqlx::PgPool;

use crate::models::QueueSummary;

/// One aggregation over the tenant's rows: per-status counts plus
/// successes in the last 60 and 300 seconds (spec.md §4.2 Summary).
pub async fn summary(pool: &PgPool, scope: &Scope) -> CoreResult<QueueSummary> {
    #[derive(sqlx::FromRow)]
    struct Row {
        queued: i64,
        running: i64,
        succeeded: i64,
        dlq: i64,
        paused: i64,
        succeeded_last_60s: i64,
        succeeded_last_300s: i64,
    }

    let row = sqlx::query_as::<_, Row>(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE status = 'queued') AS queued,
            COUNT(*) FILTER (WHERE status = 'running') AS running,
            COUNT(*) FILTER (WHERE status = 'succeeded') AS succeeded,
            COUNT(*) FILTER (WHERE status = 'dlq') AS dlq,
            COUNT(*) FILTER (WHERE status = 'paused') AS paused,
            COUNT(*) FILTER (WHERE status = 'succeeded' AND completed_at >= NOW() - INTERVAL '60 seconds') AS succeeded_last_60s,
            COUNT(*) FILTER (WHERE status = 'succeeded' AND completed_at >= NOW() - INTERVAL '300 seconds') AS succeeded_last_300s
        FROM async_invocations
        WHERE tenant_id = $1 AND namespace = $2
        "#,
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .fetch_one(pool)
    .await?;

    Ok(QueueSummary {
        queued: row.queued,
        running: row.running,
        succeeded: row.succeeded,
        dlq: row.dlq,
        paused: row.paused,
        succeeded_last_60s: row.succeeded_last_60s,
        succeeded_last_300s: row.succeeded_last_300s,
    })
}
