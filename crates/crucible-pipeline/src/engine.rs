//! Pipeline orchestrator: Design? → Generate → Format? → Sanitize → Quota.
//!
//! Each stage runs at most once per request. Design and Format degrade on
//! failure; Generate is retried up to [`GENERATE_MAX_ATTEMPTS`] times. The
//! ledger is touched only after a sanitized object exists, so a run that is
//! dropped mid-flight never consumes quota.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crucible_llm::{CallOptions, GenerativeService, Message, ToolDefinition};
use crucible_materials::{
    KnowledgeBase, RawItem, Role, SynthesisRequest, TargetSpec, ValidationResult,
};
use crucible_types::{CrucibleError, Diagnostic, Result, StageStatus};

use crate::candidate::CandidateObject;
use crate::config::PipelineConfig;
use crate::design::{parse_design_plan, DesignPlan};
use crate::events::{EventEmitter, SynthesisEvent};
use crate::prompt::{ComposedPrompt, PromptComposer};
use crate::quota::{Identity, QuotaLedger};
use crate::response::{parse_candidate, response_text, ExtractionStrategy, ParseFailure};
use crate::retry::retry_attempts;
use crate::sanitize::sanitize;
use crate::schema::ContentSchema;

pub const GENERATE_MAX_ATTEMPTS: usize = 3;

const DESIGN_STAGE: &str = "design";
const GENERATE_STAGE: &str = "generate";
const FORMAT_STAGE: &str = "format";
const SANITIZE_STAGE: &str = "sanitize";

const DESIGN_SYSTEM: &str = "You are a game designer sketching a single new rules entry. \
Propose one concept that fits the materials below.";

const DESIGN_INSTRUCTIONS: &str = "Respond with the concept only, using exactly these labels:\n\
Name: <name>\n\
Rationale: <one or two sentences tying the concept to the materials>\n\
Mechanism: <what the entry does, in plain words>\n\n\
Do not include numbers, statistics, or schema fields.";

const GENERATE_SYSTEM: &str = "You are a game designer writing a complete rules entry. \
Call the provided function exactly once with the finished entry.";

const FORMAT_SYSTEM: &str = "You are a rules editor. Repair the structure of the entry \
you are given without rewriting it.";

const FORMAT_INSTRUCTIONS: &str = "Return the entry below through the provided function.\n\
- Preserve all narrative text verbatim.\n\
- Repair only structure and value types.\n\
- List any numeric values that look out of band for the level in `balance_warnings`; \
do not change them.";

// ---------------------------------------------------------------------------
// Run results
// ---------------------------------------------------------------------------

/// How one stage ended.
#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub stage: String,
    pub status: StageStatus,
    pub attempts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ExtractionStrategy>,
}

impl StageRecord {
    fn new(stage: &str, status: StageStatus, attempts: usize) -> Self {
        Self {
            stage: stage.to_string(),
            status,
            attempts,
            strategy: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub request_id: Uuid,
    pub stages: Vec<StageRecord>,
    pub generate_attempts: usize,
    pub design_plan: Option<DesignPlan>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.stage == name)
    }
}

/// A sanitized object plus everything non-fatal that happened on the way.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisOutcome {
    pub object: CandidateObject,
    pub diagnostics: Vec<Diagnostic>,
    pub report: RunReport,
}

/// A single Generate attempt's failure.
#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error("service error: {0}")]
    Service(#[from] CrucibleError),
    #[error("unusable response: {0}")]
    Parse(#[from] ParseFailure),
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    service: Arc<dyn GenerativeService>,
    knowledge: Arc<KnowledgeBase>,
    ledger: Arc<dyn QuotaLedger>,
    config: PipelineConfig,
    events: EventEmitter,
}

impl Orchestrator {
    pub fn new(
        service: Arc<dyn GenerativeService>,
        knowledge: Arc<KnowledgeBase>,
        ledger: Arc<dyn QuotaLedger>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            service,
            knowledge,
            ledger,
            config,
            events: EventEmitter::default(),
        }
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Classify and gate raw items. No service calls are made.
    pub fn prepare(
        &self,
        items: &[RawItem],
        target: TargetSpec,
    ) -> Result<(SynthesisRequest, ValidationResult)> {
        SynthesisRequest::assemble(items, target, &self.knowledge)
    }

    pub async fn synthesize_items(
        &self,
        items: &[RawItem],
        target: TargetSpec,
        identity: &Identity,
    ) -> Result<SynthesisOutcome> {
        let (request, _) = self.prepare(items, target)?;
        self.synthesize(&request, identity).await
    }

    /// Run every stage for a validated request and charge the identity.
    pub async fn synthesize(
        &self,
        request: &SynthesisRequest,
        identity: &Identity,
    ) -> Result<SynthesisOutcome> {
        let span = tracing::info_span!(
            "synthesis",
            request_id = %request.id(),
            kind = %request.target().kind,
            identity = %identity.id,
        );
        let result = self.run(request, identity).instrument(span).await;
        if let Err(e) = &result {
            tracing::warn!(request_id = %request.id(), error = %e, "Synthesis failed");
            self.events.emit(SynthesisEvent::RunFailed {
                request_id: request.id(),
                error: e.to_string(),
            });
        }
        result
    }

    async fn run(&self, request: &SynthesisRequest, identity: &Identity) -> Result<SynthesisOutcome> {
        let request_id = request.id();
        let started_at = Utc::now();
        let run_start = Instant::now();
        self.events.emit(SynthesisEvent::RunStarted {
            request_id,
            kind: request.target().kind.to_string(),
            material_count: request.materials().len() + 1,
        });

        let schema = ContentSchema::builtin(request.target().kind);
        let prompt = {
            let mut rng = match self.config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            PromptComposer::compose(request, &schema, &mut rng)
        };

        let mut diagnostics = Vec::new();
        let mut stages = Vec::new();

        // Design
        let design_plan = self
            .design_stage(request, &prompt, &mut stages, &mut diagnostics)
            .await;

        // Generate
        let (candidate, attempts, strategy) = self
            .generate_stage(request_id, &prompt, design_plan.as_ref(), &schema)
            .await?;
        let mut record = StageRecord::new(GENERATE_STAGE, StageStatus::Success, attempts);
        record.strategy = Some(strategy);
        stages.push(record);

        // Format
        let candidate = self
            .format_stage(request_id, candidate, &schema, &mut stages, &mut diagnostics)
            .await;

        // Sanitize
        let (object, findings) = sanitize(
            candidate,
            &schema,
            request.target(),
            request.effective_level(),
            &self.knowledge,
        );
        tracing::debug!(findings = findings.len(), "Sanitized candidate");
        diagnostics.extend(findings);
        stages.push(StageRecord::new(SANITIZE_STAGE, StageStatus::Success, 1));

        // Quota
        self.charge(request_id, identity).await?;

        let duration_ms = run_start.elapsed().as_millis() as u64;
        tracing::info!(
            diagnostics = diagnostics.len(),
            generate_attempts = attempts,
            duration_ms,
            "Synthesis completed"
        );
        self.events.emit(SynthesisEvent::RunCompleted {
            request_id,
            diagnostics: diagnostics.len(),
            duration_ms,
        });

        Ok(SynthesisOutcome {
            object,
            diagnostics,
            report: RunReport {
                request_id,
                stages,
                generate_attempts: attempts,
                design_plan,
                started_at,
                finished_at: Utc::now(),
            },
        })
    }

    fn options(&self, model: &Option<String>, temperature: f32) -> CallOptions {
        let mut options = CallOptions::default().with_temperature(temperature);
        if let Some(model) = model {
            options = options.with_model(model.clone());
        }
        options.max_tokens = Some(self.config.max_tokens);
        options
    }

    fn skip(&self, request_id: Uuid, stage: &str, reason: &str, stages: &mut Vec<StageRecord>) {
        tracing::info!(stage, reason, "Stage skipped");
        self.events.emit(SynthesisEvent::StageSkipped {
            request_id,
            stage: stage.to_string(),
            reason: reason.to_string(),
        });
        stages.push(StageRecord::new(stage, StageStatus::Skipped, 0));
    }

    fn degrade(
        &self,
        request_id: Uuid,
        stage: &str,
        reason: String,
        stages: &mut Vec<StageRecord>,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        tracing::warn!(stage, reason = %reason, "Stage degraded");
        self.events.emit(SynthesisEvent::StageDegraded {
            request_id,
            stage: stage.to_string(),
            reason: reason.clone(),
        });
        diagnostics.push(Diagnostic::warning(format!("{stage}_degraded"), reason));
        stages.push(StageRecord::new(stage, StageStatus::Degraded, 1));
    }

    fn completed(&self, request_id: Uuid, stage: &str, started: Instant) {
        self.events.emit(SynthesisEvent::StageCompleted {
            request_id,
            stage: stage.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    async fn design_stage(
        &self,
        request: &SynthesisRequest,
        prompt: &ComposedPrompt,
        stages: &mut Vec<StageRecord>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<DesignPlan> {
        let request_id = request.id();
        if !self.config.design_stage_enabled {
            self.skip(request_id, DESIGN_STAGE, "disabled", stages);
            return None;
        }
        if request.has_role(Role::Catalyst) {
            self.skip(request_id, DESIGN_STAGE, "catalyst present", stages);
            return None;
        }

        self.events.emit(SynthesisEvent::StageStarted {
            request_id,
            stage: DESIGN_STAGE.into(),
        });
        let started = Instant::now();
        let messages = vec![
            Message::system(DESIGN_SYSTEM),
            Message::user(format!("{}\n\n{}", prompt.text, DESIGN_INSTRUCTIONS)),
        ];
        let options = self.options(&self.config.design_model, self.config.design_temperature);

        let raw = match self.service.call(&messages, &options).await {
            Ok(raw) => raw,
            Err(e) => {
                self.degrade(request_id, DESIGN_STAGE, e.to_string(), stages, diagnostics);
                return None;
            }
        };
        match response_text(&raw).as_deref().and_then(parse_design_plan) {
            Some(plan) => {
                tracing::info!(name = %plan.name, "Design plan accepted");
                self.completed(request_id, DESIGN_STAGE, started);
                stages.push(StageRecord::new(DESIGN_STAGE, StageStatus::Success, 1));
                Some(plan)
            }
            None => {
                self.degrade(
                    request_id,
                    DESIGN_STAGE,
                    "response did not contain a name and mechanism".into(),
                    stages,
                    diagnostics,
                );
                None
            }
        }
    }

    async fn generate_stage(
        &self,
        request_id: Uuid,
        prompt: &ComposedPrompt,
        plan: Option<&DesignPlan>,
        schema: &ContentSchema,
    ) -> Result<(CandidateObject, usize, ExtractionStrategy)> {
        self.events.emit(SynthesisEvent::StageStarted {
            request_id,
            stage: GENERATE_STAGE.into(),
        });
        let started = Instant::now();

        let user = match plan {
            Some(plan) => format!("{}\n\n{}", plan.to_brief(), prompt.text),
            None => prompt.text.clone(),
        };
        let messages = vec![Message::system(GENERATE_SYSTEM), Message::user(user)];
        let options = self
            .options(&self.config.generate_model, self.config.generate_temperature)
            .forcing_tool(schema.tool_definition());

        let service = &self.service;
        let events = &self.events;
        let messages = &messages;
        let options = &options;
        let outcome = retry_attempts(
            |attempt| async move {
                if attempt > 1 {
                    events.emit(SynthesisEvent::StageRetrying {
                        request_id,
                        stage: GENERATE_STAGE.into(),
                        attempt,
                    });
                }
                let raw = service.call(messages, options).await?;
                Ok::<_, AttemptError>(parse_candidate(&raw, schema)?)
            },
            GENERATE_MAX_ATTEMPTS,
            &self.config.retry_policy(),
            GENERATE_STAGE,
        )
        .await;

        match outcome {
            Ok(((candidate, strategy), attempts)) => {
                tracing::info!(attempts, ?strategy, "Candidate generated");
                self.completed(request_id, GENERATE_STAGE, started);
                Ok((candidate, attempts, strategy))
            }
            Err(exhausted) => Err(CrucibleError::GenerationFailed {
                attempts: exhausted.attempts,
                reason: exhausted.last_error.to_string(),
            }),
        }
    }

    async fn format_stage(
        &self,
        request_id: Uuid,
        candidate: CandidateObject,
        schema: &ContentSchema,
        stages: &mut Vec<StageRecord>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> CandidateObject {
        if !self.config.format_stage_enabled {
            self.skip(request_id, FORMAT_STAGE, "disabled", stages);
            return candidate;
        }

        self.events.emit(SynthesisEvent::StageStarted {
            request_id,
            stage: FORMAT_STAGE.into(),
        });
        let started = Instant::now();
        let messages = vec![
            Message::system(FORMAT_SYSTEM),
            Message::user(format!(
                "{}\n\n```json\n{}\n```",
                FORMAT_INSTRUCTIONS,
                candidate.to_pretty_json()
            )),
        ];
        let options = self
            .options(&self.config.format_model, self.config.format_temperature)
            .forcing_tool(format_tool(schema));

        let parsed = match self.service.call(&messages, &options).await {
            Ok(raw) => parse_candidate(&raw, schema).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match parsed {
            Ok((formatted, strategy)) => {
                diagnostics.extend(balance_warnings(&formatted));
                self.completed(request_id, FORMAT_STAGE, started);
                let mut record = StageRecord::new(FORMAT_STAGE, StageStatus::Success, 1);
                record.strategy = Some(strategy);
                stages.push(record);
                formatted
            }
            Err(reason) => {
                self.degrade(request_id, FORMAT_STAGE, reason, stages, diagnostics);
                candidate
            }
        }
    }

    async fn charge(&self, request_id: Uuid, identity: &Identity) -> Result<()> {
        if identity.privileged {
            tracing::debug!(identity = %identity.id, "Privileged identity, ledger bypassed");
            return Ok(());
        }
        let amount = self.config.synthesis_cost;
        if !self.ledger.try_consume(identity, amount).await? {
            return Err(CrucibleError::QuotaExceeded {
                identity: identity.id.clone(),
                required: amount,
            });
        }
        self.events.emit(SynthesisEvent::QuotaConsumed {
            request_id,
            identity: identity.id.clone(),
            amount,
        });
        Ok(())
    }
}

/// The schema's tool with a `balance_warnings` list added.
fn format_tool(schema: &ContentSchema) -> ToolDefinition {
    let mut tool = schema.tool_definition();
    if let Some(props) = tool
        .parameters
        .get_mut("properties")
        .and_then(Value::as_object_mut)
    {
        props.insert(
            "balance_warnings".into(),
            serde_json::json!({
                "type": "array",
                "items": {"type": "string"},
                "description": "Numeric values that look out of band for the level"
            }),
        );
    }
    tool
}

fn balance_warnings(candidate: &CandidateObject) -> Vec<Diagnostic> {
    candidate
        .get("/balance_warnings")
        .and_then(Value::as_array)
        .map(|warnings| {
            warnings
                .iter()
                .filter_map(Value::as_str)
                .filter(|w| !w.trim().is_empty())
                .map(|w| Diagnostic::warning("balance_warning", w.trim()))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_materials::ContentKind;
    use serde_json::json;

    #[test]
    fn format_tool_adds_balance_warnings() {
        let schema = ContentSchema::builtin(ContentKind::Spell);
        let tool = format_tool(&schema);
        assert_eq!(tool.name, "create_spell");
        assert!(tool.parameters.pointer("/properties/balance_warnings").is_some());
        assert!(schema
            .tool_definition()
            .parameters
            .pointer("/properties/balance_warnings")
            .is_none());
    }

    #[test]
    fn balance_warnings_become_diagnostics() {
        let candidate = CandidateObject::from_value(json!({
            "name": "x",
            "balance_warnings": ["Damage 12d6 is high for level 3", " ", 7]
        }))
        .unwrap();
        let diags = balance_warnings(&candidate);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].rule, "balance_warning");
        assert_eq!(diags[0].message, "Damage 12d6 is high for level 3");
    }

    #[test]
    fn report_finds_stage() {
        let report = RunReport {
            request_id: Uuid::nil(),
            stages: vec![StageRecord::new(DESIGN_STAGE, StageStatus::Skipped, 0)],
            generate_attempts: 1,
            design_plan: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        assert_eq!(report.stage("design").unwrap().status, StageStatus::Skipped);
        assert!(report.stage("format").is_none());
    }
}
