//! Synthesis pipeline: prompt composition, staged generation, response
//! parsing, and sanitization.
//!
//! The [`Orchestrator`] drives a validated [`crucible_materials::SynthesisRequest`]
//! through the Design, Generate and Format stages against a
//! [`crucible_llm::GenerativeService`], repairs the result, and charges the
//! caller's [`QuotaLedger`].

pub mod candidate;
pub mod config;
pub mod design;
pub mod engine;
pub mod events;
pub mod prompt;
pub mod quota;
pub mod random_choice;
pub mod response;
pub mod retry;
pub mod sanitize;
pub mod schema;

pub use candidate::CandidateObject;
pub use config::PipelineConfig;
pub use design::{parse_design_plan, DesignPlan};
pub use engine::{
    Orchestrator, RunReport, StageRecord, SynthesisOutcome, GENERATE_MAX_ATTEMPTS,
};
pub use events::{EventEmitter, SynthesisEvent};
pub use prompt::{ComposedPrompt, PromptComposer, PromptSection};
pub use quota::{Identity, InMemoryQuotaLedger, QuotaLedger};
pub use random_choice::{process_random_prompt, strip_markup};
pub use response::{
    extract_payload, parse_candidate, ExtractionStrategy, Extracted, ParseFailure,
};
pub use retry::{retry_attempts, BackoffPolicy, RetriesExhausted};
pub use sanitize::{has_trigger, sanitize, strip_trigger};
pub use schema::{ContentSchema, EnumField, IntegerDefault, IntegerField};
