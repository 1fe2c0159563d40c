use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::conversation::{Message, Transcript};
use crate::error::CompletionError;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// One request/response exchange with the relay. Implementations never touch
/// the transcript; appending the result is the caller's job.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn request_completion(
        &self,
        transcript: &Transcript,
        system_prompt: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<String, CompletionError>;
}

#[derive(Clone)]
pub struct RelayClient {
    pub endpoint: url::Url,
    pub model: String,
    client: reqwest::Client,
}

impl RelayClient {
    pub fn new(endpoint: url::Url, model: impl Into<String>) -> Self {
        Self { endpoint, model: model.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl CompletionClient for RelayClient {
    async fn request_completion(
        &self,
        transcript: &Transcript,
        system_prompt: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<String, CompletionError> {
        let body = CompletionRequest {
            model: self.model.clone(),
            messages: transcript.build_outbound_request(system_prompt),
            max_tokens,
            temperature,
        };
        debug!(model = %body.model, messages = body.messages.len(), "sending completion request");
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;
        let status = resp.status();
        let raw = resp.text().await.map_err(|e| CompletionError::Transport(e.to_string()))?;
        let result = interpret_response(status.as_u16(), &raw);
        if let Err(e) = &result {
            warn!(status = status.as_u16(), error = %e, "completion request failed");
        }
        result
    }
}

/// Maps a relay response to the assistant content or a typed failure.
pub fn interpret_response(status: u16, raw: &str) -> Result<String, CompletionError> {
    let parsed: Result<Value, _> = serde_json::from_str(raw);
    let success = (200..300).contains(&status);

    if !success {
        let message = parsed
            .ok()
            .and_then(|v| error_message(&v))
            .unwrap_or_else(|| status_reason(status));
        return Err(CompletionError::Remote(status, message));
    }

    let body = parsed
        .map_err(|e| CompletionError::Transport(format!("invalid JSON from relay: {}", e)))?;
    if let Some(message) = error_message(&body) {
        return Err(CompletionError::Remote(status, message));
    }
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(CompletionError::MalformedResponse)
}

fn error_message(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    let head = match error {
        Value::String(s) => s.clone(),
        Value::Object(o) => {
            o.get("message").and_then(Value::as_str).unwrap_or("Unknown error").to_string()
        }
        Value::Null => return None,
        other => other.to_string(),
    };
    let tail = body
        .get("details")
        .and_then(Value::as_str)
        .or_else(|| body.get("message").and_then(Value::as_str));
    Some(match tail {
        Some(t) => format!("{}: {}", head, t),
        None => head,
    })
}

fn status_reason(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("request failed")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};
    use serde_json::json;

    #[test]
    fn success_extracts_first_choice() {
        let raw = json!({"choices": [{"message": {"role": "assistant", "content": "hello"}}]}).to_string();
        assert_eq!(interpret_response(200, &raw), Ok("hello".to_string()));
    }

    #[test]
    fn missing_choice_is_malformed() {
        assert_eq!(interpret_response(200, r#"{"choices":[]}"#), Err(CompletionError::MalformedResponse));
        assert_eq!(interpret_response(200, r#"{"id":"x"}"#), Err(CompletionError::MalformedResponse));
    }

    #[test]
    fn non_json_success_is_transport_error() {
        assert!(matches!(interpret_response(200, "<html>"), Err(CompletionError::Transport(_))));
    }

    #[test]
    fn relay_error_body_becomes_remote() {
        let raw = json!({"error": "Upstream API rate limit exceeded", "details": "slow down", "status": 429}).to_string();
        assert_eq!(
            interpret_response(429, &raw),
            Err(CompletionError::Remote(429, "Upstream API rate limit exceeded: slow down".into()))
        );

        let raw = json!({"error": "Invalid request", "message": "messages array is required"}).to_string();
        assert_eq!(
            interpret_response(400, &raw),
            Err(CompletionError::Remote(400, "Invalid request: messages array is required".into()))
        );
    }

    #[test]
    fn error_payload_with_ok_status_is_remote() {
        let raw = json!({"error": {"message": "model overloaded"}}).to_string();
        assert_eq!(interpret_response(200, &raw), Err(CompletionError::Remote(200, "model overloaded".into())));
    }

    #[test]
    fn non_json_failure_uses_status_reason() {
        assert_eq!(
            interpret_response(503, "upstream down"),
            Err(CompletionError::Remote(503, "Service Unavailable".into()))
        );
    }

    #[tokio::test]
    async fn relay_client_posts_request_body() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let app = Router::new().route(
                "/",
                post(|Json(body): Json<Value>| async move {
                    // Echo what was received so the test can inspect it.
                    let summary = format!(
                        "{}|{}|{}|{}",
                        body["model"].as_str().unwrap_or_default(),
                        body["messages"].as_array().map(|a| a.len()).unwrap_or(0),
                        body["messages"][0]["role"].as_str().unwrap_or_default(),
                        body["max_tokens"]
                    );
                    (StatusCode::OK, Json(json!({"choices": [{"message": {"content": summary}}]})))
                }),
            );
            axum::serve(listener, app).await.unwrap();
        });

        let client = RelayClient::new(url::Url::parse(&format!("http://{}/", addr)).unwrap(), "gpt-4o");
        let mut transcript = Transcript::new();
        transcript.append_user("hi");
        let content = client.request_completion(&transcript, "sys", 600, 0.7).await.unwrap();
        assert_eq!(content, "gpt-4o|2|system|600");
    }

    #[tokio::test]
    async fn relay_client_reports_unreachable_relay() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RelayClient::new(url::Url::parse(&format!("http://{}/", addr)).unwrap(), "gpt-4o");
        let err = client.request_completion(&Transcript::new(), "sys", 600, 0.7).await.unwrap_err();
        assert!(matches!(err, CompletionError::Transport(_)));
    }
}
