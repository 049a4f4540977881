use async_trait::async_trait;

use crate::{Message, RawResponse, ToolChoice, ToolDefinition};

// ---------------------------------------------------------------------------
// CallOptions
// ---------------------------------------------------------------------------

/// Per-call options for a [`GenerativeService`].
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Backing model selector; `None` lets the service pick its default.
    pub model: Option<String>,
    /// Function-call contract the response should satisfy.
    pub tool: Option<ToolDefinition>,
    pub tool_choice: Option<ToolChoice>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CallOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Offer `tool` and force the model to call it.
    pub fn forcing_tool(mut self, tool: ToolDefinition) -> Self {
        self.tool_choice = Some(ToolChoice::Specific(tool.name.clone()));
        self.tool = Some(tool);
        self
    }
}

// ---------------------------------------------------------------------------
// GenerativeService
// ---------------------------------------------------------------------------

/// The external generative-language service as seen by the pipeline.
///
/// Implementations own transport concerns, including bounding hung calls.
#[async_trait]
pub trait GenerativeService: Send + Sync {
    async fn call(
        &self,
        messages: &[Message],
        options: &CallOptions,
    ) -> crucible_types::Result<RawResponse>;
}
