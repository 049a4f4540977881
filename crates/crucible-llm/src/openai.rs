use async_trait::async_trait;
use serde_json::json;

use crate::{ProviderAdapter, RawResponse, Request, ToolChoice, Usage};
use crucible_types::CrucibleError;

use crate::provider::{transport_error, DEFAULT_REQUEST_TIMEOUT};

// ---------------------------------------------------------------------------
// OpenAiAdapter
// ---------------------------------------------------------------------------

/// Chat Completions adapter. Tool calls come back as
/// `choices[0].message.tool_calls`, or `function_call` on older deployments.
#[derive(Debug)]
pub struct OpenAiAdapter {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    timeout: std::time::Duration,
    default_model: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            base_url: "https://api.openai.com".to_string(),
            default_model: "gpt-4o".to_string(),
        }
    }

    pub fn from_env() -> Result<Self, CrucibleError> {
        let key = std::env::var("OPENAI_API_KEY").map_err(|_| CrucibleError::AuthError {
            provider: "openai".into(),
        })?;
        let mut adapter = Self::new(key);
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            adapter = adapter.with_base_url(url);
        }
        Ok(adapter)
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Abort a request that has not completed within `timeout`.
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_request_body(&self, request: &Request) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|msg| json!({ "role": msg.role.as_str(), "content": msg.content }))
            .collect();

        let mut body = json!({
            "model": request.model,
            "messages": messages,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = json!(tools);

            if let Some(ref choice) = request.tool_choice {
                body["tool_choice"] = match choice {
                    ToolChoice::Auto => json!("auto"),
                    ToolChoice::None => json!("none"),
                    ToolChoice::Required => json!("required"),
                    ToolChoice::Specific(name) => {
                        json!({ "type": "function", "function": { "name": name } })
                    }
                };
            }
        }

        body
    }
}

fn parse_usage(body: &serde_json::Value) -> Usage {
    let usage_obj = &body["usage"];
    let input_tokens = usage_obj["prompt_tokens"].as_u64().unwrap_or(0);
    let output_tokens = usage_obj["completion_tokens"].as_u64().unwrap_or(0);
    Usage {
        input_tokens,
        output_tokens,
        total_tokens: usage_obj["total_tokens"]
            .as_u64()
            .unwrap_or(input_tokens + output_tokens),
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_error(status: reqwest::StatusCode, body: &str) -> CrucibleError {
    let status_u16 = status.as_u16();
    match status_u16 {
        429 => {
            let retry_ms = serde_json::from_str::<serde_json::Value>(body)
                .ok()
                .and_then(|v| v["error"]["retry_after"].as_f64())
                .map(|s| (s * 1000.0) as u64)
                .unwrap_or(1000);
            CrucibleError::RateLimited {
                provider: "openai".into(),
                retry_after_ms: retry_ms,
            }
        }
        401 => CrucibleError::AuthError {
            provider: "openai".into(),
        },
        400 => {
            let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
            let code = parsed
                .as_ref()
                .and_then(|v| v["error"]["code"].as_str().map(String::from));
            let message = extract_error_message(body);
            if code.as_deref() == Some("context_length_exceeded") {
                CrucibleError::ContextLengthExceeded {
                    provider: "openai".into(),
                    message,
                }
            } else {
                CrucibleError::ProviderError {
                    provider: "openai".into(),
                    status: 400,
                    message,
                    retryable: false,
                }
            }
        }
        500 | 502 | 503 => CrucibleError::ProviderError {
            provider: "openai".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => CrucibleError::ProviderError {
            provider: "openai".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: false,
        },
    }
}

fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.to_string())
}

// ---------------------------------------------------------------------------
// ProviderAdapter implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    async fn complete(&self, request: &Request) -> Result<RawResponse, CrucibleError> {
        let body = self.build_request_body(request);

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error("openai", e, self.timeout))?;

        let status = resp.status();
        let response_body = resp
            .text()
            .await
            .map_err(|e| transport_error("openai", e, self.timeout))?;

        if !status.is_success() {
            return Err(map_error(status, &response_body));
        }

        let json: serde_json::Value =
            serde_json::from_str(&response_body).map_err(|e| CrucibleError::ProviderError {
                provider: "openai".into(),
                status: status.as_u16(),
                message: format!("Failed to parse response JSON: {e}"),
                retryable: false,
            })?;

        Ok(RawResponse {
            provider: "openai".into(),
            model: json["model"].as_str().unwrap_or(&request.model).to_string(),
            usage: parse_usage(&json),
            body: json,
        })
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Message, ToolDefinition};

    fn make_basic_request() -> Request {
        Request {
            model: "gpt-4o".into(),
            messages: vec![Message::system("You are helpful."), Message::user("Hello")],
            tools: vec![],
            tool_choice: None,
            max_tokens: Some(2048),
            temperature: Some(0.7),
            provider: Some("openai".into()),
        }
    }

    #[test]
    fn build_request_body_produces_correct_structure() {
        let adapter = OpenAiAdapter::new("test-key".into());
        let body = adapter.build_request_body(&make_basic_request());

        assert_eq!(body["model"], "gpt-4o");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "Hello");
        assert_eq!(body["max_tokens"], 2048);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn build_request_body_forces_function() {
        let adapter = OpenAiAdapter::new("test-key".into());
        let mut req = make_basic_request();
        req.tools = vec![ToolDefinition {
            name: "create_spell".into(),
            description: "Create a spell".into(),
            parameters: json!({"type": "object"}),
        }];
        req.tool_choice = Some(ToolChoice::Specific("create_spell".into()));

        let body = adapter.build_request_body(&req);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "create_spell");
        assert_eq!(body["tool_choice"]["function"]["name"], "create_spell");
    }

    #[test]
    fn parse_usage_reads_chat_completion_fields() {
        let usage = parse_usage(&json!({
            "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
        }));
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.output_tokens, 8);
        assert_eq!(usage.total_tokens, 20);
    }

    #[test]
    fn with_base_url_trims_trailing_slash() {
        let adapter = OpenAiAdapter::new("k".into()).with_base_url("http://localhost:8080/".into());
        assert_eq!(adapter.base_url, "http://localhost:8080");
    }

    #[test]
    fn error_mapping_context_length() {
        let err = map_error(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error": {"message": "too many tokens", "code": "context_length_exceeded"}}"#,
        );
        assert!(matches!(err, CrucibleError::ContextLengthExceeded { .. }));
    }

    #[test]
    fn error_mapping_500_retryable() {
        let err = map_error(
            reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"error": {"message": "server error"}}"#,
        );
        assert!(matches!(
            err,
            CrucibleError::ProviderError { status: 500, retryable: true, .. }
        ));
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        // Accepts the connection at the socket level but never answers.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let adapter = OpenAiAdapter::new("k".into())
            .with_base_url(format!("http://{addr}"))
            .with_timeout(std::time::Duration::from_millis(100));
        let err = adapter.complete(&make_basic_request()).await.unwrap_err();
        match err {
            CrucibleError::RequestTimeout { provider, timeout_ms } => {
                assert_eq!(provider, "openai");
                assert_eq!(timeout_ms, 100);
            }
            other => panic!("expected a timeout, got {other:?}"),
        }
        drop(listener);
    }

    #[test]
    fn error_mapping_401_auth() {
        let err = map_error(reqwest::StatusCode::UNAUTHORIZED, "{}");
        assert!(matches!(err, CrucibleError::AuthError { .. }));
    }
}
