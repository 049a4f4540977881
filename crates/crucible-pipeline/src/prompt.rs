//! Prompt composition from a classified material set.
//!
//! Sections appear in a fixed order: vessel guidance, templates, catalysts,
//! modifiers, target specification. Empty sections are left out entirely.

use rand::Rng;
use serde::Serialize;
use serde_json::Value;

use crucible_materials::{Material, Role, SynthesisRequest};

use crate::random_choice::{process_random_prompt, strip_markup};
use crate::schema::ContentSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptSection {
    pub heading: String,
    pub body: String,
    priority: u8, // 0 = first
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComposedPrompt {
    pub text: String,
    pub sections: Vec<PromptSection>,
}

impl ComposedPrompt {
    pub fn section(&self, heading: &str) -> Option<&PromptSection> {
        self.sections.iter().find(|s| s.heading == heading)
    }
}

pub const VESSEL_GUIDANCE: &str = "Vessel Guidance";
pub const TEMPLATES: &str = "Templates";
pub const CATALYSTS: &str = "Catalysts";
pub const MODIFIERS: &str = "Modifiers";
pub const TARGET_SPECIFICATION: &str = "Target Specification";

/// Builds the prompt for one request. Stateless; the caller owns the rng.
#[derive(Debug, Default)]
pub struct PromptComposer {
    sections: Vec<PromptSection>,
}

impl PromptComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compose<R: Rng>(
        request: &SynthesisRequest,
        schema: &ContentSchema,
        rng: &mut R,
    ) -> ComposedPrompt {
        Self::new()
            .with_vessel(request.vessel())
            .with_templates(&request.by_role(Role::Template), schema)
            .with_directives(CATALYSTS, 2, &request.by_role(Role::Catalyst), rng)
            .with_directives(MODIFIERS, 3, &request.by_role(Role::Modifier), rng)
            .with_target(request)
            .build()
    }

    fn push(&mut self, heading: &str, body: String, priority: u8) {
        if !body.trim().is_empty() {
            self.sections.push(PromptSection {
                heading: heading.to_string(),
                body,
                priority,
            });
        }
    }

    /// Guidance, theme, and principles blocks from the vessel configuration.
    pub fn with_vessel(mut self, vessel: &Material) -> Self {
        let mut parts = Vec::new();
        if let Some(config) = vessel.vessel_config() {
            if let Some(guidance) = &config.guidance {
                parts.push(guidance.clone());
            }
            if let Some(theme) = &config.theme {
                parts.push(format!("Theme: {theme}"));
            }
            if let Some(principles) = &config.principles {
                parts.push(format!("Principles:\n{principles}"));
            }
            for (header, body) in &config.other_sections {
                parts.push(format!("{header}:\n{body}"));
            }
            if !config.settings.is_empty() {
                let settings: Vec<String> = config
                    .settings
                    .iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect();
                parts.push(settings.join("\n"));
            }
        }
        self.push(VESSEL_GUIDANCE, parts.join("\n\n"), 0);
        self
    }

    pub fn with_templates(mut self, templates: &[&Material], schema: &ContentSchema) -> Self {
        let body = templates
            .iter()
            .map(|t| {
                let text = match t.structured_reference() {
                    Some(reference) => describe_reference(reference, schema),
                    None => strip_markup(t.directive_text()),
                };
                format!("**{}**\n{}", t.display_name(), text)
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        self.push(TEMPLATES, body, 1);
        self
    }

    /// Directive text with random choices resolved.
    pub fn with_directives<R: Rng>(
        mut self,
        heading: &str,
        priority: u8,
        materials: &[&Material],
        rng: &mut R,
    ) -> Self {
        let body = materials
            .iter()
            .filter_map(|m| {
                let text = process_random_prompt(m.directive_text(), rng);
                if text.is_empty() {
                    None
                } else {
                    Some(format!("**{}**\n{}", m.display_name(), text))
                }
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        self.push(heading, body, priority);
        self
    }

    pub fn with_target(mut self, request: &SynthesisRequest) -> Self {
        let target = request.target();
        let mut lines = vec![format!("Content type: {}", target.kind)];
        if let Some(level) = request.effective_level() {
            lines.push(format!("Level: {level}"));
        }
        if let Some(subtype) = &target.subtype {
            lines.push(format!("Subtype: {subtype}"));
        }
        if !target.required_traits.is_empty() {
            lines.push(format!("Required traits: {}", target.required_traits.join(", ")));
        }
        for (key, value) in &target.notes {
            lines.push(format!("{key}: {value}"));
        }
        self.push(TARGET_SPECIFICATION, lines.join("\n"), 4);
        self
    }

    pub fn build(mut self) -> ComposedPrompt {
        self.sections.sort_by_key(|s| s.priority);
        let text = self
            .sections
            .iter()
            .map(|s| format!("# {}\n\n{}", s.heading, s.body))
            .collect::<Vec<_>>()
            .join("\n\n");
        ComposedPrompt {
            text,
            sections: self.sections,
        }
    }
}

/// Render a prior object through the schema's field paths.
fn describe_reference(reference: &Value, schema: &ContentSchema) -> String {
    let mut lines = Vec::new();
    if let Some(name) = reference.pointer(&schema.name_path).and_then(Value::as_str) {
        lines.push(format!("Name: {name}"));
    }
    if let Some(level) = reference.pointer(&schema.level_path).and_then(Value::as_i64) {
        lines.push(format!("Level: {level}"));
    }
    if let Some(traits) = reference.pointer(&schema.traits_path).and_then(Value::as_array) {
        let names: Vec<&str> = traits.iter().filter_map(Value::as_str).collect();
        if !names.is_empty() {
            lines.push(format!("Traits: {}", names.join(", ")));
        }
    }
    if let Some(rule) = &schema.activation {
        if let Some(class) = reference.pointer(&rule.path).and_then(Value::as_str) {
            match reference.pointer(&rule.action_count_path).and_then(Value::as_i64) {
                Some(count) => lines.push(format!("Activation: {class} ({count})")),
                None => lines.push(format!("Activation: {class}")),
            }
        }
    }
    if let Some(description) = reference.pointer(&schema.description_path).and_then(Value::as_str) {
        lines.push(format!("Description: {}", strip_markup(description)));
    }
    lines.join("\n")
}
