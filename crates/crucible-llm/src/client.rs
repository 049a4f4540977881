use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use crucible_types::CrucibleError;

use crate::{
    CallOptions, DynProvider, GenerativeService, Message, ProviderAdapter, RawResponse, Request,
    ToolChoice,
};

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

/// Hooks run around every provider call, in registration order.
pub trait Middleware: Send + Sync {
    fn before(&self, _request: &mut Request) {}
    fn after(&self, _request: &Request, _response: &mut RawResponse) {}
}

/// Logs one line per outbound call and one per response.
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn before(&self, request: &mut Request) {
        let forced = match &request.tool_choice {
            Some(ToolChoice::Specific(name)) => name.as_str(),
            _ => "",
        };
        tracing::info!(
            model = %request.model,
            messages = request.messages.len(),
            forced_tool = forced,
            "Generation call"
        );
    }

    fn after(&self, _request: &Request, response: &mut RawResponse) {
        tracing::info!(
            provider = %response.provider,
            model = %response.model,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Generation returned"
        );
    }
}

/// Token totals across calls. Clones share the same counters.
#[derive(Clone, Default)]
pub struct UsageTrackingMiddleware {
    input: Arc<AtomicU64>,
    output: Arc<AtomicU64>,
}

impl UsageTrackingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_tokens(&self) -> u64 {
        self.input.load(Ordering::Relaxed)
    }

    pub fn output_tokens(&self) -> u64 {
        self.output.load(Ordering::Relaxed)
    }
}

impl Middleware for UsageTrackingMiddleware {
    fn after(&self, _request: &Request, response: &mut RawResponse) {
        self.input.fetch_add(response.usage.input_tokens, Ordering::Relaxed);
        self.output.fetch_add(response.usage.output_tokens, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Model catalog
// ---------------------------------------------------------------------------

/// `(model id, provider)`; every entry supports forced tool calls.
const KNOWN_MODELS: &[(&str, &str)] = &[
    ("claude-opus-4-1", "anthropic"),
    ("claude-sonnet-4-5-20250929", "anthropic"),
    ("claude-haiku-4-5-20251001", "anthropic"),
    ("gpt-4o", "openai"),
    ("gpt-4o-mini", "openai"),
    ("gpt-4.1", "openai"),
    ("gpt-4.1-mini", "openai"),
];

/// Maps model selectors to the provider that serves them.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: HashMap<&'static str, &'static str>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self {
            models: KNOWN_MODELS.iter().copied().collect(),
        }
    }

    pub fn provider_of(&self, model: &str) -> Option<&str> {
        self.models.get(model).copied()
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// LlmClient
// ---------------------------------------------------------------------------

/// Routes generation calls to registered provider adapters.
///
/// Resolution order: the request's explicit provider, then the catalog
/// entry for its model, then the first adapter registered.
#[derive(Default)]
pub struct LlmClient {
    adapters: HashMap<String, DynProvider>,
    registration_order: Vec<String>,
    catalog: ModelCatalog,
    middleware: Vec<Box<dyn Middleware>>,
}

impl LlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_provider(&mut self, adapter: impl ProviderAdapter + 'static) {
        let name = adapter.name().to_string();
        if !self.registration_order.contains(&name) {
            self.registration_order.push(name.clone());
        }
        self.adapters.insert(name, DynProvider::new(adapter));
    }

    pub fn with_middleware(mut self, m: impl Middleware + 'static) -> Self {
        self.middleware.push(Box::new(m));
        self
    }

    pub async fn complete(&self, request: &Request) -> Result<RawResponse, CrucibleError> {
        let adapter = self.adapter_for(request)?;
        if matches!(request.tool_choice, Some(ToolChoice::Specific(_)))
            && !adapter.supports_forced_tools()
        {
            return Err(CrucibleError::Config(format!(
                "provider '{}' cannot force a function call",
                adapter.name()
            )));
        }
        let mut outbound = request.clone();
        self.middleware.iter().for_each(|m| m.before(&mut outbound));
        let mut response = adapter.complete(&outbound).await?;
        self.middleware
            .iter()
            .for_each(|m| m.after(&outbound, &mut response));
        Ok(response)
    }

    fn primary(&self) -> Option<&DynProvider> {
        self.registration_order
            .first()
            .and_then(|name| self.adapters.get(name))
    }

    fn adapter_for(&self, request: &Request) -> Result<&DynProvider, CrucibleError> {
        if let Some(name) = &request.provider {
            return self
                .adapters
                .get(name)
                .ok_or_else(|| CrucibleError::Config(format!("provider '{name}' is not registered")));
        }
        let by_model = self
            .catalog
            .provider_of(&request.model)
            .and_then(|name| self.adapters.get(name));
        by_model
            .or_else(|| self.primary())
            .ok_or_else(|| CrucibleError::Config("no generation provider registered".into()))
    }

    /// Register every provider whose API key is set in the environment.
    pub fn from_env() -> Result<Self, CrucibleError> {
        let mut client = Self::new().with_middleware(LoggingMiddleware);
        if let Ok(adapter) = crate::AnthropicAdapter::from_env() {
            client.register_provider(adapter);
        }
        if let Ok(adapter) = crate::OpenAiAdapter::from_env() {
            client.register_provider(adapter);
        }
        if client.adapters.is_empty() {
            return Err(CrucibleError::Config(
                "no generation provider configured: set ANTHROPIC_API_KEY or OPENAI_API_KEY".into(),
            ));
        }
        Ok(client)
    }
}

#[async_trait]
impl GenerativeService for LlmClient {
    async fn call(
        &self,
        messages: &[Message],
        options: &CallOptions,
    ) -> crucible_types::Result<RawResponse> {
        let model = match options.model.as_deref().filter(|m| !m.is_empty()) {
            Some(model) => model.to_string(),
            None => self
                .primary()
                .map(|adapter| adapter.default_model().to_string())
                .ok_or_else(|| CrucibleError::Config("no generation provider registered".into()))?,
        };

        let request = Request {
            model,
            messages: messages.to_vec(),
            tools: options.tool.iter().cloned().collect(),
            tool_choice: options.tool_choice.clone(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            provider: None,
        };
        self.complete(&request).await
    }
}
