use async_trait::async_trait;

use crate::{RawResponse, Request};

// ---------------------------------------------------------------------------
// ProviderAdapter
// ---------------------------------------------------------------------------

/// One vendor's HTTP API. Adapters translate the unified [`Request`] to the
/// vendor's wire format and hand the response body back untouched.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn complete(&self, request: &Request) -> crucible_types::Result<RawResponse>;

    fn name(&self) -> &str;

    /// Model used when the caller leaves the selector empty.
    fn default_model(&self) -> &str;

    /// Whether the API honours "call exactly this function".
    fn supports_forced_tools(&self) -> bool {
        true
    }
}

/// Per-request timeout the HTTP adapters apply unless told otherwise.
pub const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

/// Map a transport failure (no HTTP status) onto the error taxonomy.
#[cfg(feature = "providers")]
pub(crate) fn transport_error(
    provider: &str,
    err: reqwest::Error,
    timeout: std::time::Duration,
) -> crucible_types::CrucibleError {
    if err.is_timeout() {
        crucible_types::CrucibleError::RequestTimeout {
            provider: provider.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        crucible_types::CrucibleError::ProviderError {
            provider: provider.to_string(),
            status: 0,
            message: err.to_string(),
            retryable: true,
        }
    }
}

// ---------------------------------------------------------------------------
// DynProvider
// ---------------------------------------------------------------------------

pub struct DynProvider(Box<dyn ProviderAdapter>);

impl DynProvider {
    pub fn new(adapter: impl ProviderAdapter + 'static) -> Self {
        Self(Box::new(adapter))
    }

    pub async fn complete(&self, request: &Request) -> crucible_types::Result<RawResponse> {
        self.0.complete(request).await
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn default_model(&self) -> &str {
        self.0.default_model()
    }

    pub fn supports_forced_tools(&self) -> bool {
        self.0.supports_forced_tools()
    }
}
