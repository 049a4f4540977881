//! What the caller wants synthesized.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::material::{LevelAdjustment, Material};

/// Highest level a synthesized object may carry.
pub const MAX_LEVEL: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Feat,
    Spell,
    Equipment,
}

impl ContentKind {
    pub const ALL: [ContentKind; 3] = [ContentKind::Feat, ContentKind::Spell, ContentKind::Equipment];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Feat => "feat",
            ContentKind::Spell => "spell",
            ContentKind::Equipment => "equipment",
        }
    }

    pub fn parse(s: &str) -> Option<ContentKind> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feat" => Some(ContentKind::Feat),
            "spell" => Some(ContentKind::Spell),
            "equipment" | "item" => Some(ContentKind::Equipment),
            _ => None,
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target content kind plus caller-supplied parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub kind: ContentKind,
    #[serde(default)]
    pub level: Option<i64>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub required_traits: Vec<String>,
    #[serde(default)]
    pub notes: BTreeMap<String, String>,
}

impl TargetSpec {
    pub fn new(kind: ContentKind) -> Self {
        Self {
            kind,
            level: None,
            subtype: None,
            required_traits: Vec::new(),
            notes: BTreeMap::new(),
        }
    }

    pub fn with_level(mut self, level: i64) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    pub fn with_required_trait(mut self, t: impl Into<String>) -> Self {
        self.required_traits.push(t.into());
        self
    }

    pub fn with_note(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.notes.insert(key.into(), value.into());
        self
    }

    /// The level after catalyst adjustments.
    ///
    /// The last absolute adjustment replaces the base; relative adjustments
    /// are then summed on top. The result is clamped to `0..=MAX_LEVEL`.
    /// With neither a base level nor an absolute adjustment there is no level.
    pub fn effective_level(&self, catalysts: &[&Material]) -> Option<i64> {
        let mut base = self.level;
        let mut delta = 0i64;
        for adjustment in catalysts.iter().filter_map(|m| m.level_adjustment()) {
            match adjustment {
                LevelAdjustment::Absolute(level) => base = Some(level),
                LevelAdjustment::Relative(d) => delta = delta.saturating_add(d),
            }
        }
        base.map(|level| level.saturating_add(delta).clamp(0, MAX_LEVEL))
    }
}
