//! Parser for the free-text configuration a vessel carries.
//!
//! Grammar, line oriented:
//!
//! ```text
//! KEY: value            key = [A-Z][A-Z0-9_]*, separator ':' or '：'
//! 【Header】 text...     opens a block (also `[Header]`); the block runs until
//!                        the next header line or the end of the text
//! ```
//!
//! A `KEY: value` line is always a key line, even inside a block. Anything
//! the grammar does not recognise is ignored; a section or key that does not
//! appear is simply absent. The only errors are malformed count bounds.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crucible_types::{CrucibleError, Result};

use crate::material::{RequirementBounds, Role, RoleBounds};

/// Parsed vessel configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VesselConfig {
    pub guidance: Option<String>,
    pub theme: Option<String>,
    pub principles: Option<String>,
    /// Declared identity (`IDENTITY: ...`), compared against catalysts.
    pub identity: Option<String>,
    pub bounds: RequirementBounds,
    /// Other `KEY: value` pairs, keyed by the upper-case key.
    pub settings: BTreeMap<String, String>,
    /// Blocks under headers other than guidance/theme/principles.
    pub other_sections: BTreeMap<String, String>,
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:【\s*([^】]+?)\s*】|\[\s*([^\]]+?)\s*\])\s*(.*)$").expect("valid regex")
    })
}

fn key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([A-Z][A-Z0-9_]*)\s*[:：]\s*(.*?)\s*$").expect("valid regex")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Guidance,
    Theme,
    Principles,
}

fn known_section(header: &str) -> Option<Section> {
    match header.trim().to_lowercase().as_str() {
        "guidance" | "design guidance" => Some(Section::Guidance),
        "theme" => Some(Section::Theme),
        "principles" | "design principles" => Some(Section::Principles),
        _ => None,
    }
}

/// Declared bound keys, before defaults are applied.
#[derive(Debug, Default)]
struct DeclaredBounds {
    min: BTreeMap<Role, u32>,
    max: BTreeMap<Role, Option<u32>>,
}

fn bound_key(key: &str) -> Option<(Role, bool)> {
    let (role, side) = key.rsplit_once('_')?;
    let role = Role::parse(role).filter(|r| *r != Role::Vessel)?;
    match side {
        "MIN" => Some((role, true)),
        "MAX" => Some((role, false)),
        _ => None,
    }
}

fn parse_count(key: &str, value: &str) -> Result<u32> {
    value.trim().parse::<u32>().map_err(|_| {
        CrucibleError::Config(format!("{key} must be a non-negative integer, got '{value}'"))
    })
}

fn parse_max(key: &str, value: &str) -> Result<Option<u32>> {
    match value.trim().to_lowercase().as_str() {
        "*" | "unbounded" | "none" | "∞" => Ok(None),
        _ => parse_count(key, value).map(Some),
    }
}

impl VesselConfig {
    /// Parse vessel configuration text.
    pub fn parse(text: &str) -> Result<Self> {
        let mut config = VesselConfig::default();
        let mut declared = DeclaredBounds::default();

        let mut current: Option<(String, Vec<String>)> = None;
        let mut blocks: Vec<(String, Vec<String>)> = Vec::new();

        for line in text.lines() {
            if let Some(caps) = header_re().captures(line) {
                if let Some(done) = current.take() {
                    blocks.push(done);
                }
                let header = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                let rest = caps.get(3).map(|m| m.as_str().trim()).unwrap_or("");
                let mut lines = Vec::new();
                if !rest.is_empty() {
                    lines.push(rest.to_string());
                }
                current = Some((header, lines));
                continue;
            }

            if let Some(caps) = key_re().captures(line) {
                let key = caps[1].to_string();
                let value = caps[2].to_string();
                if let Some((role, is_min)) = bound_key(&key) {
                    if is_min {
                        declared.min.insert(role, parse_count(&key, &value)?);
                    } else {
                        declared.max.insert(role, parse_max(&key, &value)?);
                    }
                } else if key == "IDENTITY" {
                    if !value.is_empty() {
                        config.identity = Some(value);
                    }
                } else {
                    config.settings.insert(key, value);
                }
                continue;
            }

            if let Some((_, ref mut lines)) = current {
                lines.push(line.trim_end().to_string());
            }
        }
        if let Some(done) = current.take() {
            blocks.push(done);
        }

        for (header, lines) in blocks {
            let body = lines.join("\n").trim().to_string();
            if body.is_empty() {
                continue;
            }
            match known_section(&header) {
                Some(Section::Guidance) => config.guidance = Some(body),
                Some(Section::Theme) => config.theme = Some(body),
                Some(Section::Principles) => config.principles = Some(body),
                None => {
                    config.other_sections.insert(header, body);
                }
            }
        }

        config.bounds = resolve_bounds(&declared)?;
        Ok(config)
    }
}

/// Apply defaults to the declared bounds. A declared minimum above the
/// default maximum raises that maximum to the minimum.
fn resolve_bounds(declared: &DeclaredBounds) -> Result<RequirementBounds> {
    let defaults = RequirementBounds::default();
    let mut resolved = defaults;
    for role in Role::BOUNDED {
        let default = defaults.for_role(role).unwrap_or(RoleBounds::unbounded(0));
        let min = declared.min.get(&role).copied().unwrap_or(default.min());
        let max = match declared.max.get(&role) {
            Some(explicit) => *explicit,
            None => default.max().map(|m| m.max(min)),
        };
        let bounds = RoleBounds::new(min, max).map_err(|e| {
            CrucibleError::Config(format!("{} bounds: {}", role.label(), e))
        })?;
        match role {
            Role::Catalyst => resolved.catalyst = bounds,
            Role::Template => resolved.template = bounds,
            Role::Modifier => resolved.modifier = bounds,
            Role::Vessel => {}
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_defaults() {
        let config = VesselConfig::parse("").unwrap();
        assert_eq!(config, VesselConfig::default());
        assert!(config.identity.is_none());
        assert_eq!(config.bounds, RequirementBounds::default());
    }

    #[test]
    fn parses_bounds_and_identity() {
        let config = VesselConfig::parse(
            "CATALYST_MIN: 0\nCATALYST_MAX: 2\nTEMPLATE_MAX: 1\nMODIFIER_MIN: 1\nMODIFIER_MAX: 3\nIDENTITY: Sarenrae",
        )
        .unwrap();
        assert_eq!(config.bounds.catalyst, RoleBounds::new(0, Some(2)).unwrap());
        assert_eq!(config.bounds.template, RoleBounds::new(0, Some(1)).unwrap());
        assert_eq!(config.bounds.modifier, RoleBounds::new(1, Some(3)).unwrap());
        assert_eq!(config.identity.as_deref(), Some("Sarenrae"));
    }

    #[test]
    fn unbounded_max_markers() {
        for marker in ["*", "unbounded", "None"] {
            let config = VesselConfig::parse(&format!("MODIFIER_MAX: {marker}")).unwrap();
            assert_eq!(config.bounds.modifier.max(), None, "marker {marker}");
        }
    }

    #[test]
    fn fullwidth_colon_is_accepted() {
        let config = VesselConfig::parse("CATALYST_MAX：3").unwrap();
        assert_eq!(config.bounds.catalyst.max(), Some(3));
    }

    #[test]
    fn min_above_default_max_raises_max() {
        let config = VesselConfig::parse("CATALYST_MIN: 2").unwrap();
        assert_eq!(config.bounds.catalyst.min(), 2);
        assert_eq!(config.bounds.catalyst.max(), Some(2));
    }

    #[test]
    fn explicit_max_below_min_is_an_error() {
        let err = VesselConfig::parse("MODIFIER_MIN: 3\nMODIFIER_MAX: 1").unwrap_err();
        assert!(err.to_string().contains("Modifier bounds"));
    }

    #[test]
    fn malformed_count_is_an_error() {
        let err = VesselConfig::parse("TEMPLATE_MIN: lots").unwrap_err();
        assert!(matches!(err, CrucibleError::Config(_)));
        assert!(err.to_string().contains("TEMPLATE_MIN"));
    }

    #[test]
    fn bracketed_blocks_are_extracted() {
        let text = "\
【Guidance】
Favor reactive defenses.
Keep numbers modest.
【Theme】 Dawn and renewal
[Principles]
One clear trigger per ability.
MODIFIER_MAX: 2
Never stack healing.";
        let config = VesselConfig::parse(text).unwrap();
        assert_eq!(
            config.guidance.as_deref(),
            Some("Favor reactive defenses.\nKeep numbers modest.")
        );
        assert_eq!(config.theme.as_deref(), Some("Dawn and renewal"));
        assert_eq!(
            config.principles.as_deref(),
            Some("One clear trigger per ability.\nNever stack healing."),
            "key lines inside a block are not block text"
        );
        assert_eq!(config.bounds.modifier.max(), Some(2));
    }

    #[test]
    fn unmatched_text_is_not_an_error() {
        let config = VesselConfig::parse("just some prose\nwith no structure at all").unwrap();
        assert_eq!(config, VesselConfig::default());
    }

    #[test]
    fn unknown_headers_and_keys_are_kept_aside() {
        let config = VesselConfig::parse("【Lore】\nAncient.\nSTYLE: terse\n【Theme】\n").unwrap();
        assert_eq!(config.other_sections.get("Lore").map(String::as_str), Some("Ancient."));
        assert_eq!(config.settings.get("STYLE").map(String::as_str), Some("terse"));
        assert!(config.theme.is_none(), "empty block is absent");
    }
}
