use std::str::FromStr;

use async_queue::NewInvocation;
use chrono::Utc;
use cron::Schedule as CronSchedule;
use queue_errors::CoreResult;
use scope::Scope;
use sqlx::PgPool;
use tracing::{error, warn};

use crate::models::Schedule;

/// Scans every enabled schedule across tenants (the bulk administrative
/// exception called out in spec.md §3) and fires the ones whose
/// cron-computed next run time has passed, enqueuing into the async
/// queue. Off the hot path: correctness over latency.
pub async fn tick(pool: &PgPool) -> CoreResult<usize> {
    let due: Vec<Schedule> = sqlx::query_as::<_, Schedule>(
        "SELECT * FROM schedules WHERE enabled = TRUE ORDER BY created_at ASC",
    )
    .fetch_all(pool)
    .await?;

    let mut fired = 0;
    let now = Utc::now();

    for schedule in due {
        let cron = match CronSchedule::from_str(&schedule.cron_expression) {
            Ok(c) => c,
            Err(e) => {
                warn!(schedule_id = %schedule.id, error = %e, "skipping schedule with unparsable cron expression");
                continue;
            }
        };

        let reference = schedule.last_run_at.unwrap_or(schedule.created_at);
        let Some(next_due) = cron.after(&reference).next() else {
            continue;
        };
        if next_due > now {
            continue;
        }

        if claim(pool, &schedule, schedule.last_run_at).await? {
            let scope = Scope::new(&schedule.tenant_id, &schedule.namespace);
            let result = async_queue::enqueue(
                pool,
                &scope,
                NewInvocation {
                    function_id: schedule.function_id.clone(),
                    function_name: schedule.function_name.clone(),
                    payload: schedule.input.clone().unwrap_or(serde_json::json!({})),
                    ..Default::default()
                },
            )
            .await;

            match result {
                Ok(_) => fired += 1,
                Err(e) => error!(schedule_id = %schedule.id, error = %e, "failed to enqueue scheduled invocation"),
            }
        }
    }

    Ok(fired)
}

/// Claims the schedule's fire slot with a compare-and-swap on
/// `last_run_at` so two scheduler instances ticking concurrently don't
/// double-fire the same cron tick.
async fn claim(
    pool: &PgPool,
    schedule: &Schedule,
    expected_last_run_at: Option<chrono::DateTime<Utc>>,
) -> CoreResult<bool> {
    let updated = sqlx::query(
        r#"
        UPDATE schedules
        SET last_run_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND last_run_at IS NOT DISTINCT FROM $2
        "#,
    )
    .bind(schedule.id)
    .bind(expected_last_run_at)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() > 0)
}
