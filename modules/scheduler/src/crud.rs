use std::str::FromStr;

use cron::Schedule as CronSchedule;
use queue_errors::{CoreError, CoreResult};
use scope::Scope;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{NewSchedule, Schedule};

pub async fn create_schedule(pool: &PgPool, scope: &Scope, new: NewSchedule) -> CoreResult<Schedule> {
    CronSchedule::from_str(&new.cron_expression)
        .map_err(|e| CoreError::Validation(format!("invalid cron expression: {e}")))?;

    let row = sqlx::query_as::<_, Schedule>(
        r#"
        INSERT INTO schedules (
            id, tenant_id, namespace, function_name, function_id, cron_expression,
            input, enabled, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(&new.function_name)
    .bind(&new.function_id)
    .bind(&new.cron_expression)
    .bind(&new.input)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

pub async fn get_schedule(pool: &PgPool, scope: &Scope, id: Uuid) -> CoreResult<Schedule> {
    sqlx::query_as::<_, Schedule>(
        "SELECT * FROM schedules WHERE id = $1 AND tenant_id = $2 AND namespace = $3",
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| CoreError::not_found("schedule", id.to_string()))
}

pub async fn list_schedules(pool: &PgPool, scope: &Scope) -> CoreResult<Vec<Schedule>> {
    let rows = sqlx::query_as::<_, Schedule>(
        "SELECT * FROM schedules WHERE tenant_id = $1 AND namespace = $2 ORDER BY created_at ASC",
    )
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn set_enabled(pool: &PgPool, scope: &Scope, id: Uuid, enabled: bool) -> CoreResult<()> {
    let updated = sqlx::query(
        r#"
        UPDATE schedules SET enabled = $4, updated_at = NOW()
        WHERE id = $1 AND tenant_id = $2 AND namespace = $3
        "#,
    )
    .bind(id)
    .bind(&scope.tenant_id)
    .bind(&scope.namespace)
    .bind(enabled)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(CoreError::not_found("schedule", id.to_string()));
    }
    Ok(())
}

pub async fn delete_schedule(pool: &PgPool, scope: &Scope, id: Uuid) -> CoreResult<()> {
    let deleted = sqlx::query("DELETE FROM schedules WHERE id = $1 AND tenant_id = $2 AND namespace = $3")
        .bind(id)
        .bind(&scope.tenant_id)
        .bind(&scope.namespace)
        .execute(pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(CoreError::not_found("schedule", id.to_string()));
    }
    Ok(())
}
