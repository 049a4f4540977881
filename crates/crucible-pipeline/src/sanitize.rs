//! Consistency validation and auto-repair of a generated object.
//!
//! Runs once after the last executed stage and never fails: every problem
//! is either repaired in place or recorded as a [`Diagnostic`].

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crucible_materials::{KnowledgeBase, TargetSpec};
use crucible_types::Diagnostic;

use crate::candidate::CandidateObject;
use crate::schema::{ActivationRule, ContentSchema, IntegerDefault, IntegerField};

// The precondition label: "Trigger" wrapped in emphasis, or followed by a
// colon. A sentence that merely opens with the verb is not a label.
const TRIGGER_LABEL: &str = r"(?:<(?:strong|b)>[ \t]*Trigger[ \t]*:?[ \t]*</(?:strong|b)>|(?:\*\*|__)[ \t]*Trigger[ \t]*:?[ \t]*(?:\*\*|__)|Trigger[ \t]*:)";

fn trigger_paragraph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?s)<p\b[^>]*>\s*{TRIGGER_LABEL}.*?</p\s*>\s*(?:<hr\s*/?>\s*)?"
        ))
        .expect("valid regex")
    })
}

fn trigger_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?m)^[ \t]*{TRIGGER_LABEL}[^\n]*(?:\n|$)")).expect("valid regex")
    })
}

/// `true` if the narrative carries a trigger paragraph or line.
pub fn has_trigger(text: &str) -> bool {
    trigger_paragraph_re().is_match(text) || trigger_line_re().is_match(text)
}

/// Remove every trigger paragraph and line.
pub fn strip_trigger(text: &str) -> String {
    let without_paragraphs = trigger_paragraph_re().replace_all(text, "");
    trigger_line_re()
        .replace_all(&without_paragraphs, "")
        .trim()
        .to_string()
}

/// Validate and repair `candidate`.
///
/// `level` is the effective target level, used as the default for level
/// fields the object leaves out.
pub fn sanitize(
    mut candidate: CandidateObject,
    schema: &ContentSchema,
    target: &TargetSpec,
    level: Option<i64>,
    kb: &KnowledgeBase,
) -> (CandidateObject, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();

    coerce_enums(&mut candidate, schema, &mut diagnostics);
    for field in &schema.integer_fields {
        coerce_integer(&mut candidate, field, level, &mut diagnostics);
    }
    if let Some(rule) = &schema.activation {
        repair_activation(&mut candidate, rule, &schema.description_path, &mut diagnostics);
    }
    clean_traits(&mut candidate, schema, target, kb, &mut diagnostics);
    strip_bookkeeping(&mut candidate, schema);

    (candidate, diagnostics)
}

fn coerce_enums(candidate: &mut CandidateObject, schema: &ContentSchema, diagnostics: &mut Vec<Diagnostic>) {
    for field in &schema.enum_fields {
        let current = candidate.get(&field.path).cloned();
        let matched = current.as_ref().and_then(Value::as_str).and_then(|raw| {
            field
                .allowed
                .iter()
                .find(|allowed| allowed.eq_ignore_ascii_case(raw.trim()))
        });
        match matched {
            Some(allowed) => {
                if current.as_ref().and_then(Value::as_str) != Some(allowed.as_str()) {
                    candidate.set(&field.path, json!(allowed));
                }
            }
            None => {
                let shown = current.as_ref().map_or("nothing".to_string(), Value::to_string);
                tracing::info!(field = %field.path, value = %shown, default = %field.default, "Coerced enumeration");
                diagnostics.push(
                    Diagnostic::warning(
                        "enum_coerced",
                        format!("{} was {}, replaced with '{}'", field.path, shown, field.default),
                    )
                    .at(&field.path),
                );
                candidate.set(&field.path, json!(field.default));
            }
        }
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.round() as i64))
        }
        _ => None,
    }
}

fn coerce_integer(
    candidate: &mut CandidateObject,
    field: &IntegerField,
    level: Option<i64>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let current = candidate.get(&field.path).cloned();
    let default = match field.default {
        IntegerDefault::TargetLevel(fallback) => level.unwrap_or(fallback),
        IntegerDefault::Value(v) => v,
    }
    .clamp(field.min, field.max);

    let coerced = match current.as_ref().and_then(as_integer) {
        Some(n) => n.clamp(field.min, field.max),
        None => default,
    };
    let unchanged = current.as_ref().and_then(Value::as_i64) == Some(coerced);
    if !unchanged {
        let shown = current.as_ref().map_or("nothing".to_string(), Value::to_string);
        diagnostics.push(
            Diagnostic::info(
                "integer_coerced",
                format!("{} was {}, set to {}", field.path, shown, coerced),
            )
            .at(&field.path),
        );
        candidate.set(&field.path, json!(coerced));
    }
}

fn repair_activation(
    candidate: &mut CandidateObject,
    rule: &ActivationRule,
    description_path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Some(class) = candidate.get_str(&rule.path).map(str::to_string) else {
        return;
    };
    let description = candidate.get_str(description_path).unwrap_or("").to_string();

    if !rule.permits(&class) && has_trigger(&description) {
        tracing::info!(class = %class, "Stripped trigger from a class that does not permit one");
        candidate.set(description_path, json!(strip_trigger(&description)));
        diagnostics.push(
            Diagnostic::warning(
                "trigger_stripped",
                format!("'{class}' abilities have no trigger; the trigger text was removed"),
            )
            .at(description_path),
        );
    } else if rule.requires(&class) && !has_trigger(&description) {
        diagnostics.push(
            Diagnostic::warning("trigger_missing", format!("'{class}' abilities need a trigger"))
                .at(description_path),
        );
    }

    let current = candidate.get(&rule.action_count_path).cloned();
    let repaired = if class == "action" {
        json!(current.as_ref().and_then(as_integer).unwrap_or(1).clamp(1, 3))
    } else {
        Value::Null
    };
    if current.as_ref() != Some(&repaired) {
        if current.as_ref().is_some_and(|v| !v.is_null()) {
            diagnostics.push(
                Diagnostic::info(
                    "action_count_coerced",
                    format!("action count set to {repaired} for '{class}'"),
                )
                .at(&rule.action_count_path),
            );
        }
        candidate.set(&rule.action_count_path, repaired);
    }
}

fn clean_traits(
    candidate: &mut CandidateObject,
    schema: &ContentSchema,
    target: &TargetSpec,
    kb: &KnowledgeBase,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let raw: Vec<String> = match candidate.get(&schema.traits_path) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        Some(Value::String(s)) => s.split(',').map(String::from).collect(),
        _ => Vec::new(),
    };

    let vocabulary = kb.trait_vocabulary(schema.kind);
    let mut seen = BTreeSet::new();
    let mut traits = Vec::new();
    for t in raw {
        let normalized = t.trim().to_lowercase();
        if normalized.is_empty() || !seen.insert(normalized.clone()) {
            continue;
        }
        if let Some(known) = vocabulary {
            if !known.contains(&normalized) {
                tracing::info!(trait_name = %normalized, kind = %schema.kind, "Dropped unknown trait");
                diagnostics.push(
                    Diagnostic::info("trait_dropped", format!("unknown trait '{normalized}' removed"))
                        .at(&schema.traits_path),
                );
                continue;
            }
        }
        traits.push(normalized);
    }

    for required in &target.required_traits {
        let normalized = required.trim().to_lowercase();
        if !normalized.is_empty() && !traits.contains(&normalized) {
            traits.push(normalized);
        }
    }

    candidate.set(&schema.traits_path, json!(traits));
}

fn strip_bookkeeping(candidate: &mut CandidateObject, schema: &ContentSchema) {
    candidate.fields_mut().retain(|key, _| {
        let internal = key.starts_with('_') || schema.internal_fields.iter().any(|f| f == key);
        if internal {
            tracing::debug!(key = %key, "Stripped bookkeeping field");
        }
        !internal
    });
}
