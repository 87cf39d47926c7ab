//! Health and readiness endpoints mounted by every service binary.
//!
//! `/healthz` is pure liveness — it never touches the store. `/readyz`
//! calls [`ReadinessCheck::check`], which `queue-core` wires to a Postgres
//! `SELECT 1`; a failing dependency should make `/readyz` return 503 so a
//! load balancer stops sending traffic without restarting the process.

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    async fn check(&self) -> Result<(), String>;
}

#[derive(Clone)]
struct HealthState {
    service: &'static str,
    version: &'static str,
    readiness: Arc<dyn ReadinessCheck>,
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    checked_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    service: &'static str,
    checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Build the `/healthz` + `/readyz` router for `service`/`version`.
pub fn router(
    service: &'static str,
    version: &'static str,
    readiness: Arc<dyn ReadinessCheck>,
) -> Router {
    let state = HealthState {
        service,
        version,
        readiness,
    };

    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state)
}

async fn healthz(State(state): State<HealthState>) -> impl IntoResponse {
    Json(HealthBody {
        status: "healthy",
        service: state.service,
        version: state.version,
        checked_at: Utc::now(),
    })
}

async fn readyz(State(state): State<HealthState>) -> impl IntoResponse {
    match state.readiness.check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadyBody {
                status: "ready",
                service: state.service,
                checked_at: Utc::now(),
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody {
                status: "not_ready",
                service: state.service,
                checked_at: Utc::now(),
                error: Some(e),
            }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    struct AlwaysOk;
    #[async_trait]
    impl ReadinessCheck for AlwaysOk {
        async fn check(&self) -> Result<(), String> {
            Ok(())
        }
    }

    struct AlwaysDown;
    #[async_trait]
    impl ReadinessCheck for AlwaysDown {
        async fn check(&self) -> Result<(), String> {
            Err("db unreachable".to_string())
        }
    }

    #[tokio::test]
    async fn healthz_never_consults_readiness() {
        let app = router("queue-core", "0.1.0", Arc::new(AlwaysDown));
        let resp = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readyz_reflects_dependency_failure() {
        let app = router("queue-core", "0.1.0", Arc::new(AlwaysDown));
        let resp = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(v["status"], "not_ready");
    }

    #[tokio::test]
    async fn readyz_ok_when_dependency_healthy() {
        let app = router("queue-core", "0.1.0", Arc::new(AlwaysOk));
        let resp = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
