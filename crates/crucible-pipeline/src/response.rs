//! Payload extraction from raw service responses.
//!
//! Providers and deployments disagree on where a forced function call's
//! arguments land. Five shapes are tried in a fixed order; the first that
//! yields a syntactically valid JSON object wins.

use serde::Serialize;
use serde_json::{Map, Value};

use crucible_llm::RawResponse;

use crate::candidate::CandidateObject;
use crate::random_choice::strip_markup;
use crate::schema::ContentSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// `tool_calls[0].function.arguments`
    MultiToolCall,
    /// `function_call.arguments`
    LegacyFunctionCall,
    /// `content[] -> {type: "tool_use"}.input`
    ContentToolUseList,
    /// `content -> {type: "tool_use"}.input`
    ContentToolUseSingle,
    /// First `{` to last `}` of the text content.
    RawText,
}

impl ExtractionStrategy {
    pub const ORDER: [ExtractionStrategy; 5] = [
        ExtractionStrategy::MultiToolCall,
        ExtractionStrategy::LegacyFunctionCall,
        ExtractionStrategy::ContentToolUseList,
        ExtractionStrategy::ContentToolUseSingle,
        ExtractionStrategy::RawText,
    ];
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("no strategy produced a JSON object")]
    NoPayload,
    #[error("description is {chars} characters, at least {min} required")]
    DescriptionTooShort { chars: usize, min: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub strategy: ExtractionStrategy,
    pub payload: Map<String, Value>,
}

/// The message object: `choices[0].message` if present, else the body.
fn message_of(body: &Value) -> &Value {
    body.pointer("/choices/0/message").unwrap_or(body)
}

/// Accept an object, or a string that parses to one.
fn as_object(value: &Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

fn is_tool_use(value: &Value) -> bool {
    value.get("type").and_then(Value::as_str) == Some("tool_use")
}

fn try_strategy(strategy: ExtractionStrategy, message: &Value) -> Option<Map<String, Value>> {
    match strategy {
        ExtractionStrategy::MultiToolCall => {
            let call = message.pointer("/tool_calls/0")?;
            call.pointer("/function/arguments")
                .and_then(as_object)
                .or_else(|| call.get("arguments").and_then(as_object))
        }
        ExtractionStrategy::LegacyFunctionCall => message
            .pointer("/function_call/arguments")
            .and_then(as_object),
        ExtractionStrategy::ContentToolUseList => message
            .get("content")?
            .as_array()?
            .iter()
            .find(|block| is_tool_use(block))
            .and_then(|block| block.get("input"))
            .and_then(as_object),
        ExtractionStrategy::ContentToolUseSingle => {
            let content = message.get("content")?;
            if content.is_object() && is_tool_use(content) {
                content.get("input").and_then(as_object)
            } else {
                None
            }
        }
        ExtractionStrategy::RawText => {
            let text = message_text(message)?;
            match scan_json_object(&text)? {
                Value::Object(map) => Some(map),
                _ => None,
            }
        }
    }
}

/// Text content of a message: a string, or the joined `text` parts of a
/// content array.
pub fn message_text(message: &Value) -> Option<String> {
    match message.get("content")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let text: Vec<&str> = parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect();
            if text.is_empty() {
                None
            } else {
                Some(text.join("\n"))
            }
        }
        _ => None,
    }
}

/// Text content of a raw response.
pub fn response_text(raw: &RawResponse) -> Option<String> {
    message_text(message_of(&raw.body))
}

/// Parse the span from the first `{` to the last `}`.
pub fn scan_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&text[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// Run the fallback chain over a raw response.
pub fn extract_payload(raw: &RawResponse) -> Result<Extracted, ParseFailure> {
    let message = message_of(&raw.body);
    for strategy in ExtractionStrategy::ORDER {
        if let Some(payload) = try_strategy(strategy, message) {
            tracing::debug!(?strategy, "Extracted payload");
            return Ok(Extracted { strategy, payload });
        }
    }
    Err(ParseFailure::NoPayload)
}

/// Extract a candidate and check its minimum content.
pub fn parse_candidate(
    raw: &RawResponse,
    schema: &ContentSchema,
) -> Result<(CandidateObject, ExtractionStrategy), ParseFailure> {
    let Extracted { strategy, payload } = extract_payload(raw)?;
    let candidate = CandidateObject::new(payload);
    let chars = candidate
        .get_str(&schema.description_path)
        .map(|d| strip_markup(d).trim().chars().count())
        .unwrap_or(0);
    if chars < schema.min_description_chars {
        return Err(ParseFailure::DescriptionTooShort {
            chars,
            min: schema.min_description_chars,
        });
    }
    Ok((candidate, strategy))
}
