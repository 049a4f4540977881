use async_trait::async_trait;
use serde_json::json;

use crate::{Message, ProviderAdapter, RawResponse, Request, Role, ToolChoice, ToolDefinition, Usage};
use crucible_types::CrucibleError;

use crate::provider::{transport_error, DEFAULT_REQUEST_TIMEOUT};

// ---------------------------------------------------------------------------
// AnthropicAdapter
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AnthropicAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: std::time::Duration,
}

impl AnthropicAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            api_key,
            base_url: "https://api.anthropic.com".to_string(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// Abort a request that has not completed within `timeout`.
    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_env() -> Result<Self, CrucibleError> {
        let key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| CrucibleError::AuthError {
            provider: "anthropic".into(),
        })?;
        Ok(Self::new(key))
    }
}

// ---------------------------------------------------------------------------
// Request translation (Unified → Anthropic JSON)
// ---------------------------------------------------------------------------

fn build_request_body(request: &Request) -> serde_json::Value {
    // 1. System messages become the top-level system blocks
    let system_parts: Vec<serde_json::Value> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| {
            json!({
                "type": "text",
                "text": m.content,
                "cache_control": { "type": "ephemeral" }
            })
        })
        .collect();

    // 2. Remaining messages, merging consecutive turns of the same role
    let messages = convert_messages(
        &request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect::<Vec<_>>(),
    );

    let mut body = json!({
        "model": request.model,
        "max_tokens": request.max_tokens.unwrap_or(4096),
        "messages": messages,
    });

    if !system_parts.is_empty() {
        body["system"] = json!(system_parts);
    }

    // 3. Tools and forced tool selection
    if !request.tools.is_empty() {
        body["tools"] = json!(request
            .tools
            .iter()
            .map(convert_tool_definition)
            .collect::<Vec<_>>());

        if let Some(ref choice) = request.tool_choice {
            body["tool_choice"] = match choice {
                ToolChoice::Auto | ToolChoice::None => json!({ "type": "auto" }),
                ToolChoice::Required => json!({ "type": "any" }),
                ToolChoice::Specific(name) => json!({ "type": "tool", "name": name }),
            };
        }
    }

    if let Some(temp) = request.temperature {
        body["temperature"] = json!(temp);
    }

    body
}

fn convert_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    let mut result: Vec<serde_json::Value> = Vec::new();

    for msg in messages {
        let role = msg.role.as_str();
        let block = json!({ "type": "text", "text": msg.content });
        if let Some(last) = result.last_mut() {
            if last["role"] == role {
                if let Some(arr) = last["content"].as_array_mut() {
                    arr.push(block);
                    continue;
                }
            }
        }
        result.push(json!({ "role": role, "content": [block] }));
    }

    result
}

fn convert_tool_definition(tool: &ToolDefinition) -> serde_json::Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters
    })
}

// ---------------------------------------------------------------------------
// Response translation
// ---------------------------------------------------------------------------

fn parse_usage(body: &serde_json::Value) -> Usage {
    let usage_obj = &body["usage"];
    let input_tokens = usage_obj["input_tokens"].as_u64().unwrap_or(0);
    let output_tokens = usage_obj["output_tokens"].as_u64().unwrap_or(0);
    Usage {
        input_tokens,
        output_tokens,
        total_tokens: input_tokens + output_tokens,
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
                provider: "anthropic".into(),
                retry_after_ms: retry_ms,
            }
        }
        401 => CrucibleError::AuthError {
            provider: "anthropic".into(),
        },
        400 => {
            let message = extract_error_message(body);
            if message.contains("prompt is too long") {
                CrucibleError::ContextLengthExceeded {
                    provider: "anthropic".into(),
                    message,
                }
            } else {
                CrucibleError::ProviderError {
                    provider: "anthropic".into(),
                    status: 400,
                    message,
                    retryable: false,
                }
            }
        }
        500 | 529 => CrucibleError::ProviderError {
            provider: "anthropic".into(),
            status: status_u16,
            message: extract_error_message(body),
            retryable: true,
        },
        _ => CrucibleError::ProviderError {
            provider: "anthropic".into(),
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
impl ProviderAdapter for AnthropicAdapter {
    async fn complete(&self, request: &Request) -> Result<RawResponse, CrucibleError> {
        let body = build_request_body(request);

        let resp = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error("anthropic", e, self.timeout))?;

        let status = resp.status();
        let response_body = resp
            .text()
            .await
            .map_err(|e| transport_error("anthropic", e, self.timeout))?;

        if !status.is_success() {
            return Err(map_error(status, &response_body));
        }

        let json: serde_json::Value =
            serde_json::from_str(&response_body).map_err(|e| CrucibleError::ProviderError {
                provider: "anthropic".into(),
                status: status.as_u16(),
                message: format!("Failed to parse response JSON: {e}"),
                retryable: false,
            })?;

        Ok(RawResponse {
            provider: "anthropic".into(),
            model: json["model"].as_str().unwrap_or(&request.model).to_string(),
            usage: parse_usage(&json),
            body: json,
        })
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        "claude-sonnet-4-5-20250929"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DynProvider;

    fn make_basic_request() -> Request {
        Request {
            model: "claude-sonnet-4-5-20250929".into(),
            messages: vec![Message::system("You are a rules designer."), Message::user("Hello")],
            tools: vec![],
            tool_choice: None,
            max_tokens: Some(1024),
            temperature: None,
            provider: Some("anthropic".into()),
        }
    }

    #[test]
    fn build_request_body_extracts_system_messages() {
        let body = build_request_body(&make_basic_request());

        let system = body["system"].as_array().expect("system should be an array");
        assert_eq!(system.len(), 1);
        assert_eq!(system[0]["text"], "You are a rules designer.");
        assert_eq!(system[0]["cache_control"]["type"], "ephemeral");

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(body["max_tokens"], 1024);
    }

    #[test]
    fn build_request_body_forces_specific_tool() {
        let mut req = make_basic_request();
        req.tools = vec![ToolDefinition {
            name: "create_feat".into(),
            description: "Create a feat".into(),
            parameters: json!({"type": "object"}),
        }];
        req.tool_choice = Some(ToolChoice::Specific("create_feat".into()));

        let body = build_request_body(&req);
        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools[0]["name"], "create_feat");
        assert_eq!(tools[0]["input_schema"]["type"], "object");
        assert_eq!(body["tool_choice"]["type"], "tool");
        assert_eq!(body["tool_choice"]["name"], "create_feat");
    }

    #[test]
    fn consecutive_user_messages_merge() {
        let messages = vec![Message::user("brief"), Message::user("prompt")];
        let converted = convert_messages(&messages);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0]["content"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn parse_usage_sums_tokens() {
        let usage = parse_usage(&json!({"usage": {"input_tokens": 100, "output_tokens": 50}}));
        assert_eq!(usage.total_tokens, 150);
        assert_eq!(parse_usage(&json!({})), Usage::default());
    }

    #[test]
    fn from_env_returns_auth_error_when_key_not_set() {
        std::env::remove_var("ANTHROPIC_API_KEY");
        let err = AnthropicAdapter::from_env().unwrap_err();
        assert!(matches!(err, CrucibleError::AuthError { provider } if provider == "anthropic"));
    }

    #[test]
    fn adapter_defaults() {
        let provider = DynProvider::new(AnthropicAdapter::new("test-key".into()));
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.default_model(), "claude-sonnet-4-5-20250929");
        assert!(provider.supports_forced_tools());
    }

    #[test]
    fn error_mapping_429_rate_limited() {
        let err = map_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error": {"message": "rate limited", "retry_after": 2.5}}"#,
        );
        assert!(matches!(err, CrucibleError::RateLimited { retry_after_ms: 2500, .. }));
    }

    #[test]
    fn error_mapping_400_prompt_too_long() {
        let err = map_error(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error": {"message": "prompt is too long: 210000 tokens"}}"#,
        );
        assert!(matches!(err, CrucibleError::ContextLengthExceeded { .. }));
    }

    #[test]
    fn error_mapping_529_retryable() {
        let err = map_error(
            reqwest::StatusCode::from_u16(529).unwrap(),
            r#"{"error": {"message": "overloaded"}}"#,
        );
        match &err {
            CrucibleError::ProviderError { retryable, status, .. } => {
                assert!(*retryable);
                assert_eq!(*status, 529);
            }
            _ => panic!("expected ProviderError"),
        }
    }
}
