use async_trait::async_trait;

/// Invokes a function by id. Synchronous from the worker's perspective:
/// the call resolves to either a result or an error, never a partial
/// state (spec.md §6).
#[async_trait]
pub trait Executor: Send + Sync {
    async fn invoke(
        &self,
        function_id: &str,
        payload: &serde_json::Value,
        headers: &serde_json::Value,
    ) -> Result<InvocationOutcome, String>;
}

#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    pub request_id: String,
    pub output: serde_json::Value,
    pub duration_ms: i64,
    pub cold_start: bool,
    pub cold_start_reason: Option<String>,
}

/// Delivers a webhook call for workflow subscriptions. Non-2xx is
/// treated as a retryable failure by the caller.
#[async_trait]
pub trait WebhookClient: Send + Sync {
    async fn deliver(
        &self,
        url: &str,
        method: &str,
        headers: &serde_json::Value,
        signing_secret: Option<&str>,
        timeout_s: i32,
        body: &serde_json::Value,
    ) -> Result<WebhookOutcome, String>;
}

#[derive(Debug, Clone)]
pub struct WebhookOutcome {
    pub status_code: u16,
    pub body: serde_json::Value,
}

/// Test double that always succeeds immediately. Real executor/webhook
/// transports live outside this core.
pub struct NullExecutor;

#[async_trait]
impl Executor for NullExecutor {
    async fn invoke(
        &self,
        _function_id: &str,
        _payload: &serde_json::Value,
        _headers: &serde_json::Value,
    ) -> Result<InvocationOutcome, String> {
        Ok(InvocationOutcome {
            request_id: uuid::Uuid::new_v4().to_string(),
            output: serde_json::json!({}),
            duration_ms: 0,
            cold_start: false,
            cold_start_reason: None,
        })
    }
}

pub struct NullWebhookClient;

#[async_trait]
impl WebhookClient for NullWebhookClient {
    async fn deliver(
        &self,
        _url: &str,
        _method: &str,
        _headers: &serde_json::Value,
        _signing_secret: Option<&str>,
        _timeout_s: i32,
        _body: &serde_json::Value,
    ) -> Result<WebhookOutcome, String> {
        Ok(WebhookOutcome {
            status_code: 200,
            body: serde_json::json!({}),
        })
    }
}
