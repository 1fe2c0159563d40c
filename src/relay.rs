use std::{net::SocketAddr, sync::Arc, time::{Duration, Instant}};

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, USER_AGENT}},
    response::{IntoResponse, Response},
    routing::any,
};
use chrono::Utc;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::settings::{CompletionParams, RELAY_USER_AGENT, RelaySettings, resolve_completion_params};

#[derive(Clone)]
pub struct RelayState {
    pub settings: Arc<RelaySettings>,
    http: reqwest::Client,
}

impl RelayState {
    pub fn new(settings: RelaySettings) -> Self {
        Self { settings: Arc::new(settings), http: reqwest::Client::new() }
    }
}

#[derive(Debug)]
pub enum RelayError {
    MethodNotAllowed,
    Configuration,
    InvalidRequest(&'static str),
    Upstream { status: StatusCode, details: String },
    InvalidResponseFormat,
    Internal(String),
}

impl RelayError {
    fn outcome(&self) -> &'static str {
        match self {
            RelayError::MethodNotAllowed => "method_not_allowed",
            RelayError::Configuration => "configuration_error",
            RelayError::InvalidRequest(_) => "invalid_request",
            RelayError::Upstream { .. } => "upstream_error",
            RelayError::InvalidResponseFormat => "invalid_response_format",
            RelayError::Internal(_) => "internal_error",
        }
    }
}

fn upstream_error_label(status: StatusCode) -> &'static str {
    match status.as_u16() {
        401 => "Invalid API key",
        429 => "Upstream API rate limit exceeded",
        500 => "Upstream API server error",
        _ => "Upstream API request failed",
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        metrics::counter!("relay_requests_total", "outcome" => self.outcome()).increment(1);
        let (status, body) = match self {
            RelayError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                json!({"error": "Method not allowed", "message": "Only POST requests are supported"}),
            ),
            RelayError::Configuration => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "Configuration error",
                    "message": "Upstream API key is not configured",
                }),
            ),
            RelayError::InvalidRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({"error": "Invalid request", "message": message}),
            ),
            RelayError::Upstream { status, details } => (
                status,
                json!({
                    "error": upstream_error_label(status),
                    "details": details,
                    "status": status.as_u16(),
                }),
            ),
            RelayError::InvalidResponseFormat => (
                StatusCode::BAD_GATEWAY,
                json!({
                    "error": "Invalid response format",
                    "message": "Upstream API returned unexpected response format",
                }),
            ),
            RelayError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "error": "Internal server error",
                    "message": message,
                    "timestamp": Utc::now().to_rfc3339(),
                }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Checks the incoming body and returns its `messages` array.
pub fn validate_request(payload: &Value) -> Result<&Vec<Value>, RelayError> {
    let messages = payload
        .get("messages")
        .and_then(Value::as_array)
        .ok_or(RelayError::InvalidRequest("messages array is required"))?;
    for message in messages {
        let has = |field: &str| message.get(field).is_some_and(is_truthy);
        if !has("role") || !has("content") {
            return Err(RelayError::InvalidRequest(
                "Each message must have 'role' and 'content' fields",
            ));
        }
    }
    Ok(messages)
}

/// Builds the sanitized upstream body. Streaming is always off.
pub fn build_upstream_request(
    payload: &Value,
    messages: &[Value],
    defaults: &CompletionParams,
) -> Value {
    let requested = CompletionParams {
        model: payload.get("model").and_then(Value::as_str).map(str::to_string),
        max_tokens: payload
            .get("max_tokens")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok()),
        temperature: payload.get("temperature").and_then(Value::as_f64),
    };
    let eff = resolve_completion_params(defaults, &requested);
    json!({
        "model": eff.model,
        "messages": messages,
        "max_tokens": eff.max_tokens,
        "temperature": eff.temperature,
        "stream": false,
    })
}

async fn relay_completion(
    method: Method,
    State(state): State<RelayState>,
    body: Bytes,
) -> Result<Response, RelayError> {
    if method != Method::POST {
        return Err(RelayError::MethodNotAllowed);
    }
    let Some(api_key) = state.settings.api_key.as_deref() else {
        error!("upstream API key is not configured");
        return Err(RelayError::Configuration);
    };

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|_| RelayError::InvalidRequest("request body must be valid JSON"))?;
    let messages = validate_request(&payload)?;
    let upstream_body = build_upstream_request(&payload, messages, &state.settings.defaults);
    info!(
        model = %upstream_body["model"],
        messages = messages.len(),
        max_tokens = %upstream_body["max_tokens"],
        "relaying completion request"
    );

    let started = Instant::now();
    let resp = state
        .http
        .post(state.settings.completions_url())
        .bearer_auth(api_key)
        .header(USER_AGENT, RELAY_USER_AGENT)
        .json(&upstream_body)
        .send()
        .await
        .map_err(|e| {
            error!(error = %e, "upstream request failed");
            RelayError::Internal(e.to_string())
        })?;
    let status = resp.status();
    let data: Value = resp.json().await.map_err(|e| {
        error!(error = %e, "upstream returned unreadable body");
        RelayError::Internal(e.to_string())
    })?;
    metrics::histogram!("relay_upstream_latency_seconds").record(started.elapsed().as_secs_f64());
    info!(status = status.as_u16(), "upstream responded");

    if !status.is_success() {
        let details = data
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error")
            .to_string();
        warn!(status = status.as_u16(), %details, "upstream API error");
        return Err(RelayError::Upstream { status, details });
    }
    if !data.pointer("/choices/0").is_some_and(is_truthy) {
        error!("upstream response has no choices");
        return Err(RelayError::InvalidResponseFormat);
    }

    metrics::counter!("relay_requests_total", "outcome" => "ok").increment(1);
    Ok((StatusCode::OK, [(CACHE_CONTROL, "no-cache")], Json(data)).into_response())
}

pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(86400))
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/", any(relay_completion))
        .route("/v1/chat/completions", any(relay_completion))
        .layer(cors_layer())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: RelayState) -> anyhow::Result<()> {
    if state.settings.api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; completion requests will be rejected");
    }
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "relay listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("relay shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use std::sync::Mutex;

    type Seen = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    async fn spawn_upstream(status: StatusCode, body: Value) -> (SocketAddr, Seen) {
        let seen: Seen = Arc::default();
        let recorder = seen.clone();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let app = Router::new().route(
                "/v1/chat/completions",
                post(move |headers: HeaderMap, Json(req): Json<Value>| {
                    let recorder = recorder.clone();
                    let body = body.clone();
                    async move {
                        let auth = headers
                            .get(AUTHORIZATION)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        recorder.lock().unwrap().push((auth, req));
                        (status, Json(body))
                    }
                }),
            );
            axum::serve(listener, app).await.unwrap();
        });
        (addr, seen)
    }

    async fn spawn_relay(api_key: Option<&str>, upstream: SocketAddr) -> String {
        let settings = RelaySettings {
            api_key: api_key.map(str::to_string),
            upstream_base_url: format!("http://{}/v1", upstream),
            defaults: CompletionParams::default(),
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(RelayState::new(settings))).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn ok_body() -> Value {
        json!({"id": "cmpl-1", "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}}]})
    }

    fn chat_body() -> Value {
        json!({"messages": [{"role": "system", "content": "sys"}, {"role": "user", "content": "hi"}]})
    }

    #[tokio::test]
    async fn preflight_answers_with_cors_headers() {
        let (upstream, seen) = spawn_upstream(StatusCode::OK, ok_body()).await;
        let relay = spawn_relay(Some("sk-test"), upstream).await;
        let resp = reqwest::Client::new()
            .request(reqwest::Method::OPTIONS, &relay)
            .header("Origin", "http://localhost:8080")
            .header("Access-Control-Request-Method", "POST")
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
        let methods = resp.headers()["access-control-allow-methods"].to_str().unwrap().to_string();
        assert!(methods.contains("POST"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_post_is_rejected() {
        let (upstream, _) = spawn_upstream(StatusCode::OK, ok_body()).await;
        let relay = spawn_relay(Some("sk-test"), upstream).await;
        let resp = reqwest::get(&relay).await.unwrap();
        assert_eq!(resp.status().as_u16(), 405);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
        let v: Value = resp.json().await.unwrap();
        assert_eq!(v["error"], "Method not allowed");
    }

    #[tokio::test]
    async fn missing_credential_is_configuration_error() {
        let (upstream, seen) = spawn_upstream(StatusCode::OK, ok_body()).await;
        let relay = spawn_relay(None, upstream).await;
        let resp = reqwest::Client::new().post(&relay).json(&chat_body()).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 500);
        let v: Value = resp.json().await.unwrap();
        assert_eq!(v["error"], "Configuration error");
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_requests_are_rejected_before_forwarding() {
        let (upstream, seen) = spawn_upstream(StatusCode::OK, ok_body()).await;
        let relay = spawn_relay(Some("sk-test"), upstream).await;
        let client = reqwest::Client::new();

        for body in [
            json!({"messages": {}}),
            json!({"model": "gpt-4o"}),
            json!({"messages": [{"role": "user"}]}),
            json!({"messages": [{"role": "", "content": "hi"}]}),
            json!({"messages": ["hi"]}),
        ] {
            let resp = client.post(&relay).json(&body).send().await.unwrap();
            assert_eq!(resp.status().as_u16(), 400, "body: {}", body);
            let v: Value = resp.json().await.unwrap();
            assert!(v["error"].is_string());
        }

        let resp = client.post(&relay).body("{not json").send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 400);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn forwards_sanitized_request_and_returns_body_verbatim() {
        let (upstream, seen) = spawn_upstream(StatusCode::OK, ok_body()).await;
        let relay = spawn_relay(Some("sk-test"), upstream).await;
        let mut body = chat_body();
        body["stream"] = json!(true);

        let resp = reqwest::Client::new().post(&relay).json(&body).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
        assert_eq!(resp.headers()["cache-control"], "no-cache");
        let v: Value = resp.json().await.unwrap();
        assert_eq!(v, ok_body());

        let seen = seen.lock().unwrap();
        let (auth, forwarded) = &seen[0];
        assert_eq!(auth.as_deref(), Some("Bearer sk-test"));
        assert_eq!(forwarded["model"], "gpt-4o");
        assert_eq!(forwarded["max_tokens"], 600);
        assert_eq!(forwarded["temperature"], 0.7);
        assert_eq!(forwarded["stream"], false);
        assert_eq!(forwarded["messages"], chat_body()["messages"]);
    }

    #[tokio::test]
    async fn upstream_errors_are_mapped() {
        let cases = [
            (StatusCode::UNAUTHORIZED, "Invalid API key"),
            (StatusCode::TOO_MANY_REQUESTS, "Upstream API rate limit exceeded"),
            (StatusCode::INTERNAL_SERVER_ERROR, "Upstream API server error"),
            (StatusCode::NOT_FOUND, "Upstream API request failed"),
        ];
        for (status, label) in cases {
            let (upstream, _) = spawn_upstream(status, json!({"error": {"message": "nope"}})).await;
            let relay = spawn_relay(Some("sk-test"), upstream).await;
            let resp = reqwest::Client::new().post(&relay).json(&chat_body()).send().await.unwrap();
            assert_eq!(resp.status(), status);
            let v: Value = resp.json().await.unwrap();
            assert_eq!(v["error"], label);
            assert_eq!(v["details"], "nope");
            assert_eq!(v["status"], status.as_u16());
        }
    }

    #[tokio::test]
    async fn missing_choices_is_bad_gateway() {
        let (upstream, _) = spawn_upstream(StatusCode::OK, json!({"choices": []})).await;
        let relay = spawn_relay(Some("sk-test"), upstream).await;
        let resp = reqwest::Client::new().post(&relay).json(&chat_body()).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 502);
        let v: Value = resp.json().await.unwrap();
        assert_eq!(v["error"], "Invalid response format");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_internal_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = listener.local_addr().unwrap();
        drop(listener);
        let relay = spawn_relay(Some("sk-test"), dead).await;
        let resp = reqwest::Client::new().post(&relay).json(&chat_body()).send().await.unwrap();
        assert_eq!(resp.status().as_u16(), 500);
        let v: Value = resp.json().await.unwrap();
        assert_eq!(v["error"], "Internal server error");
        assert!(v["timestamp"].is_string());
    }

    #[tokio::test]
    async fn relay_client_round_trip_through_relay() {
        use crate::completion::{CompletionClient, RelayClient};
        use crate::conversation::Transcript;

        let (upstream, seen) = spawn_upstream(StatusCode::OK, ok_body()).await;
        let relay = spawn_relay(Some("sk-test"), upstream).await;
        let client = RelayClient::new(url::Url::parse(&relay).unwrap(), "gpt-4o");
        let mut transcript = Transcript::new();
        transcript.append_user("hi");

        let content = client.request_completion(&transcript, "be brief", 600, 0.7).await.unwrap();
        assert_eq!(content, "hello");
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].1["messages"][0], json!({"role": "system", "content": "be brief"}));
    }

    #[test]
    fn explicit_zero_temperature_is_kept() {
        let payload = json!({"messages": [], "temperature": 0.0, "max_tokens": 50, "model": "gpt-4o-mini"});
        let body = build_upstream_request(&payload, &[], &CompletionParams::default());
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["max_tokens"], 50);
        assert_eq!(body["model"], "gpt-4o-mini");
    }
}
