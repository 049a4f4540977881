//! Design-plan parsing.
//!
//! The design stage returns free text. A plan is accepted as a JSON object
//! or as labelled lines:
//!
//! ```text
//! **Name:** Dawnward Parry
//! Rationale: The shrine favours reactive defenses.
//! Mechanism: When an ally is hit, you
//! interpose your shield.
//! ```

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::response::scan_json_object;

/// A short concept brief produced before generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignPlan {
    pub name: String,
    #[serde(default)]
    pub rationale: String,
    pub mechanism: String,
}

impl DesignPlan {
    /// Render as the authoritative brief placed ahead of the generation prompt.
    pub fn to_brief(&self) -> String {
        let mut brief = format!(
            "# Design Brief (authoritative)\n\nFollow this concept exactly.\n\nName: {}\n",
            self.name
        );
        if !self.rationale.is_empty() {
            brief.push_str(&format!("Rationale: {}\n", self.rationale));
        }
        brief.push_str(&format!("Mechanism: {}", self.mechanism));
        brief
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Name,
    Rationale,
    Mechanism,
}

fn label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:#+\s*)?(?:[-*]\s+)?(?:\*\*|__)?\s*(name|rationale|mechanism)\s*(?:\*\*|__)?\s*:\s*(?:\*\*|__)?\s*(.*)$")
            .expect("valid regex")
    })
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn from_json(value: &Value) -> Option<DesignPlan> {
    let field = |key: &str| value.get(key).and_then(Value::as_str).and_then(non_empty);
    Some(DesignPlan {
        name: field("name")?,
        rationale: field("rationale").unwrap_or_default(),
        mechanism: field("mechanism")?,
    })
}

fn from_labels(text: &str) -> Option<DesignPlan> {
    let mut name: Vec<String> = Vec::new();
    let mut rationale: Vec<String> = Vec::new();
    let mut mechanism: Vec<String> = Vec::new();
    let mut current: Option<Label> = None;

    for line in text.lines() {
        if let Some(caps) = label_re().captures(line) {
            let label = match caps[1].to_lowercase().as_str() {
                "name" => Label::Name,
                "rationale" => Label::Rationale,
                _ => Label::Mechanism,
            };
            current = Some(label);
            let target = match label {
                Label::Name => &mut name,
                Label::Rationale => &mut rationale,
                Label::Mechanism => &mut mechanism,
            };
            target.clear();
            let rest = caps[2].trim().trim_end_matches("**").trim();
            if !rest.is_empty() {
                target.push(rest.to_string());
            }
            continue;
        }
        let target = match current {
            Some(Label::Name) => &mut name,
            Some(Label::Rationale) => &mut rationale,
            Some(Label::Mechanism) => &mut mechanism,
            None => continue,
        };
        if !line.trim().is_empty() {
            target.push(line.trim().to_string());
        }
    }

    Some(DesignPlan {
        name: non_empty(&name.join(" "))?,
        rationale: rationale.join(" "),
        mechanism: non_empty(&mechanism.join(" "))?,
    })
}

/// Parse a design plan; `None` if neither form yields a name and mechanism.
pub fn parse_design_plan(text: &str) -> Option<DesignPlan> {
    scan_json_object(text)
        .as_ref()
        .and_then(from_json)
        .or_else(|| from_labels(text))
}
