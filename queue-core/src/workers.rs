use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use event_engine::SubscriptionTarget;
use scope::Scope;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::executor::{Executor, WebhookClient};

const POLL_IDLE_BACKOFF: Duration = Duration::from_millis(250);

/// One long-running worker repeating lease/run/resolve against the
/// async invocation queue (spec.md §5 Scheduling model).
pub async fn async_queue_worker(
    pool: PgPool,
    scope: Scope,
    worker_id: String,
    executor: Arc<dyn Executor>,
    lease: Duration,
    token: CancellationToken,
) {
    while !token.is_cancelled() {
        let acquired = async_queue::acquire_due(&pool, &scope, &worker_id, lease).await;
        let invocation = match acquired {
            Ok(Some(inv)) => inv,
            Ok(None) => {
                tokio::time::sleep(POLL_IDLE_BACKOFF).await;
                continue;
            }
            Err(e) => {
                error!(error = %e, "async queue acquire failed");
                tokio::time::sleep(POLL_IDLE_BACKOFF).await;
                continue;
            }
        };

        let outcome = executor
            .invoke(&invocation.function_id, &invocation.payload, &serde_json::json!({}))
            .await;

        let result = match outcome {
            Ok(out) => {
                async_queue::mark_succeeded(
                    &pool,
                    &scope,
                    invocation.id,
                    async_queue::ResolutionResult {
                        request_id: Some(out.request_id),
                        output: Some(out.output),
                        duration_ms: Some(out.duration_ms),
                        cold_start: Some(out.cold_start),
                    },
                )
                .await
            }
            Err(err) if invocation.attempt >= invocation.max_attempts => {
                async_queue::mark_dlq(&pool, &scope, invocation.id, &err).await
            }
            Err(err) => {
                let next_run_at = async_queue::scheduled_retry_time(
                    invocation.attempt,
                    invocation.backoff_base_ms,
                    invocation.backoff_max_ms,
                );
                async_queue::mark_retry(&pool, &scope, invocation.id, &err, next_run_at).await
            }
        };

        if let Err(e) = result {
            error!(invocation_id = %invocation.id, error = %e, "failed to resolve invocation");
        }
    }
}

/// Leases outbox rows and relays them into the event engine
/// (spec.md §4.4).
pub async fn outbox_relay_worker(
    pool: PgPool,
    scope: Scope,
    worker_id: String,
    lease: Duration,
    token: CancellationToken,
) {
    while !token.is_cancelled() {
        match outbox_relay::acquire_due(&pool, &scope, &worker_id, lease).await {
            Ok(Some(row)) => {
                if let Err(e) = outbox_relay::relay_one(&pool, &scope, row).await {
                    error!(error = %e, "outbox relay attempt failed");
                }
            }
            Ok(None) => tokio::time::sleep(POLL_IDLE_BACKOFF).await,
            Err(e) => {
                error!(error = %e, "outbox acquire failed");
                tokio::time::sleep(POLL_IDLE_BACKOFF).await;
            }
        }
    }
}

/// Fires cron-scheduled invocations. Off the hot path, so ticks on a
/// coarse interval rather than tight polling (spec.md §3 Scheduler).
pub async fn scheduler_worker(pool: PgPool, interval: Duration, token: CancellationToken) {
    while !token.is_cancelled() {
        match scheduler::tick(&pool).await {
            Ok(fired) if fired > 0 => info!(fired, "scheduler tick fired invocations"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "scheduler tick failed"),
        }
        tokio::time::sleep(interval).await;
    }
}

/// Discovers enabled subscriptions for `scope` and spawns one dispatch
/// loop per subscription, tracking already-spawned ids so a later
/// rescan doesn't double-spawn (spec.md §5: one worker per subscription
/// family).
pub async fn event_dispatch_coordinator(
    pool: PgPool,
    scope: Scope,
    worker_id: String,
    executor: Arc<dyn Executor>,
    webhook: Arc<dyn WebhookClient>,
    lease: Duration,
    rescan_interval: Duration,
    token: CancellationToken,
) {
    let mut spawned: HashSet<Uuid> = HashSet::new();

    while !token.is_cancelled() {
        let topics = match event_engine::list_topics(&pool, &scope).await {
            Ok(t) => t,
            Err(e) => {
                error!(error = %e, "failed to list topics for dispatch scan");
                tokio::time::sleep(rescan_interval).await;
                continue;
            }
        };

        for topic in topics {
            let subs = match event_engine::list_subscriptions_for_topic(&pool, &scope, topic.id).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(topic_id = %topic.id, error = %e, "failed to list subscriptions");
                    continue;
                }
            };
            for sub in subs {
                if !sub.enabled || spawned.contains(&sub.id) {
                    continue;
                }
                spawned.insert(sub.id);
                tokio::spawn(event_dispatch_worker(
                    pool.clone(),
                    scope.clone(),
                    sub.id,
                    worker_id.clone(),
                    executor.clone(),
                    webhook.clone(),
                    lease,
                    token.clone(),
                ));
            }
        }

        tokio::time::sleep(rescan_interval).await;
    }
}

async fn event_dispatch_worker(
    pool: PgPool,
    scope: Scope,
    subscription_id: Uuid,
    worker_id: String,
    executor: Arc<dyn Executor>,
    webhook: Arc<dyn WebhookClient>,
    lease: Duration,
    token: CancellationToken,
) {
    while !token.is_cancelled() {
        let leased =
            event_engine::acquire_due_delivery(&pool, &scope, subscription_id, &worker_id, lease).await;
        let dispatchable = match leased {
            Ok(Some(d)) => d,
            Ok(None) => {
                tokio::time::sleep(POLL_IDLE_BACKOFF).await;
                continue;
            }
            Err(e) => {
                error!(error = %e, "event dispatch acquire failed");
                tokio::time::sleep(POLL_IDLE_BACKOFF).await;
                continue;
            }
        };

        let delivery = dispatchable.delivery;

        let prepare = inbox::prepare(&pool, &scope, subscription_id, delivery.message_id, delivery.id).await;
        let prepare = match prepare {
            Ok(p) => p,
            Err(e) => {
                error!(delivery_id = %delivery.id, error = %e, "inbox prepare failed");
                continue;
            }
        };

        if let inbox::PrepareOutcome::Deduplicated(cached) = prepare {
            let _ = event_engine::mark_succeeded(
                &pool,
                &scope,
                delivery.id,
                cached.request_id.as_deref(),
                cached.output.clone(),
                0,
                false,
            )
            .await;
            continue;
        }

        let outcome = match &dispatchable.target {
            SubscriptionTarget::Function { id, .. } => {
                executor
                    .invoke(id, &serde_json::json!({}), &serde_json::json!({}))
                    .await
                    .map(|o| (o.request_id, o.output, o.duration_ms, o.cold_start))
            }
            SubscriptionTarget::Workflow { .. } => match &dispatchable.webhook.url {
                Some(url) => webhook
                    .deliver(
                        url,
                        dispatchable.webhook.method.as_deref().unwrap_or("POST"),
                        dispatchable.webhook.headers.as_ref().unwrap_or(&serde_json::json!({})),
                        dispatchable.webhook.signing_secret.as_deref(),
                        dispatchable.webhook.timeout_s.unwrap_or(30),
                        &serde_json::json!({}),
                    )
                    .await
                    .map(|o| (String::new(), o.body, 0, false)),
                None => Err("workflow subscription has no webhook configured".to_string()),
            },
        };

        match outcome {
            Ok((request_id, output, duration_ms, cold_start)) => {
                let req_id = if request_id.is_empty() { None } else { Some(request_id) };
                if let Err(e) = event_engine::mark_succeeded(
                    &pool,
                    &scope,
                    delivery.id,
                    req_id.as_deref(),
                    Some(output.clone()),
                    duration_ms,
                    cold_start,
                )
                .await
                {
                    error!(delivery_id = %delivery.id, error = %e, "failed to mark delivery succeeded");
                }
                let _ = inbox::mark_succeeded(
                    &pool,
                    &scope,
                    subscription_id,
                    delivery.message_id,
                    req_id.as_deref(),
                    Some(output),
                )
                .await;
            }
            Err(err) => {
                let _ = inbox::mark_failed(&pool, &scope, subscription_id, delivery.message_id, &err).await;
                if let Err(e) = event_engine::mark_retry(&pool, &scope, delivery.id, &err).await {
                    error!(delivery_id = %delivery.id, error = %e, "failed to mark delivery for retry");
                }
            }
        }
    }
}
