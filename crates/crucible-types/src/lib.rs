//! Shared types, errors, and diagnostics for the Crucible synthesis pipeline.
//!
//! This crate provides the foundational types used across all other Crucible crates:
//! - `CrucibleError`: unified error taxonomy
//! - `Diagnostic`: non-fatal finding attached to a successful synthesis
//! - `StageStatus`: how a pipeline stage ended

use serde::{Deserialize, Serialize};

/// Unified error type for all Crucible subsystems.
#[derive(Debug, thiserror::Error)]
pub enum CrucibleError {
    // === LLM Provider Errors ===
    #[error("Provider {provider} returned HTTP {status}: {message}")]
    ProviderError {
        provider: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthError { provider: String },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    RequestTimeout {
        provider: String,
        timeout_ms: u64,
    },

    #[error("Context length exceeded for {provider}: {message}")]
    ContextLengthExceeded { provider: String, message: String },

    // === Synthesis Errors (caller-visible) ===
    #[error("Material '{display_name}' ({item_id}) could not be assigned a role")]
    Classification {
        item_id: String,
        display_name: String,
    },

    #[error("Material requirements not met: {}", .errors.join("; "))]
    Requirement { errors: Vec<String> },

    #[error("Generation failed after {attempts} attempts: {reason}")]
    GenerationFailed { attempts: usize, reason: String },

    #[error("Quota exceeded for '{identity}': {required} point(s) required")]
    QuotaExceeded { identity: String, required: u64 },

    // === Configuration ===
    #[error("Configuration error: {0}")]
    Config(String),

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CrucibleError {
    /// Returns `true` for the four errors a synthesis caller is expected to handle.
    pub fn is_caller_visible(&self) -> bool {
        matches!(
            self,
            CrucibleError::Classification { .. }
                | CrucibleError::Requirement { .. }
                | CrucibleError::GenerationFailed { .. }
                | CrucibleError::QuotaExceeded { .. }
        )
    }
}

/// A convenience alias for `Result<T, CrucibleError>`.
pub type Result<T> = std::result::Result<T, CrucibleError>;

// ---------------------------------------------------------------------------
// Diagnostic: non-fatal finding recorded during a synthesis run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Diagnostic {
    pub fn warning(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            severity: Severity::Warning,
            message: message.into(),
            field: None,
        }
    }

    pub fn info(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            severity: Severity::Info,
            message: message.into(),
            field: None,
        }
    }

    /// Attach the JSON pointer of the field the finding is about.
    pub fn at(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

// ---------------------------------------------------------------------------
// StageStatus: how a pipeline stage ended
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    /// The stage failed but the pipeline continued with the prior result.
    Degraded,
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_provider_error() {
        let err = CrucibleError::ProviderError {
            provider: "openai".into(),
            status: 500,
            message: "internal server error".into(),
            retryable: true,
        };
        assert_eq!(
            err.to_string(),
            "Provider openai returned HTTP 500: internal server error"
        );
    }

    #[test]
    fn error_display_classification() {
        let err = CrucibleError::Classification {
            item_id: "item-7".into(),
            display_name: "Odd Pebble".into(),
        };
        assert_eq!(
            err.to_string(),
            "Material 'Odd Pebble' (item-7) could not be assigned a role"
        );
    }

    #[test]
    fn error_display_requirement_joins_errors() {
        let err = CrucibleError::Requirement {
            errors: vec!["first".into(), "second".into()],
        };
        assert_eq!(err.to_string(), "Material requirements not met: first; second");
    }

    #[test]
    fn error_display_generation_failed() {
        let err = CrucibleError::GenerationFailed {
            attempts: 3,
            reason: "no payload".into(),
        };
        assert_eq!(
            err.to_string(),
            "Generation failed after 3 attempts: no payload"
        );
    }

    #[test]
    fn error_display_quota_exceeded() {
        let err = CrucibleError::QuotaExceeded {
            identity: "alice".into(),
            required: 1,
        };
        assert_eq!(
            err.to_string(),
            "Quota exceeded for 'alice': 1 point(s) required"
        );
    }

    // --- caller visibility ---

    #[test]
    fn caller_visible_covers_the_four_synthesis_errors() {
        let visible = [
            CrucibleError::Classification {
                item_id: "a".into(),
                display_name: "b".into(),
            },
            CrucibleError::Requirement { errors: vec![] },
            CrucibleError::GenerationFailed {
                attempts: 3,
                reason: "r".into(),
            },
            CrucibleError::QuotaExceeded {
                identity: "i".into(),
                required: 1,
            },
        ];
        for err in &visible {
            assert!(err.is_caller_visible(), "{err} should be caller-visible");
        }
        assert!(!CrucibleError::Config("x".into()).is_caller_visible());
        assert!(!CrucibleError::RequestTimeout {
            provider: "x".into(),
            timeout_ms: 10
        }
        .is_caller_visible());
        assert!(!CrucibleError::AuthError {
            provider: "x".into()
        }
        .is_caller_visible());
    }

    // --- From impls ---

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: CrucibleError = json_err.into();
        assert!(matches!(err, CrucibleError::Json(_)));
    }

    // --- Diagnostic ---

    #[test]
    fn diagnostic_constructors_and_field() {
        let d = Diagnostic::warning("enum_coerced", "bad rarity").at("/system/traits/rarity");
        assert_eq!(d.severity, Severity::Warning);
        assert_eq!(d.rule, "enum_coerced");
        assert_eq!(d.field.as_deref(), Some("/system/traits/rarity"));

        let json = serde_json::to_value(Diagnostic::info("trait_dropped", "x")).unwrap();
        assert_eq!(json["severity"], "info");
        assert!(json.get("field").is_none());
    }

    // --- StageStatus ---

    #[test]
    fn stage_status_serializes_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&StageStatus::Success).unwrap(),
            "\"success\""
        );
        assert_eq!(
            serde_json::to_string(&StageStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&StageStatus::Skipped).unwrap(),
            "\"skipped\""
        );
    }
}
