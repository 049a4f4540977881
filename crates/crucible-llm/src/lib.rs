//! Generative service boundary and unified LLM client (OpenAI, Anthropic).
//!
//! Provides the `GenerativeService` trait the synthesis pipeline talks to, the
//! `ProviderAdapter` trait with its `DynProvider` wrapper, a middleware chain,
//! a model catalog, and `LlmClient` for routing requests by provider.
//! Adapters return the provider's response body untouched as a `RawResponse`;
//! interpreting its shape is the caller's job.

#[cfg(feature = "providers")]
mod anthropic;
#[cfg(feature = "providers")]
mod client;
#[cfg(feature = "providers")]
mod openai;
mod provider;
mod service;
mod types;

#[cfg(feature = "providers")]
pub use anthropic::AnthropicAdapter;
#[cfg(feature = "providers")]
pub use client::*;
#[cfg(feature = "providers")]
pub use openai::OpenAiAdapter;
pub use provider::*;
pub use service::*;
pub use types::*;
