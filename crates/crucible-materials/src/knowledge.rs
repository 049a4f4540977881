//! Domain vocabulary: recognised catalyst names, consumable content types,
//! and the trait vocabulary per content kind.
//!
//! The built-in tables cover a Pathfinder-style rules domain. Deployments for
//! other domains load their own tables from TOML:
//!
//! ```toml
//! catalyst_names = ["Sarenrae", "Desna"]
//! consumable_content_types = ["feat", "spell"]
//!
//! [traits]
//! feat = ["general", "skill"]
//! spell = ["fire", "healing"]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;

use crucible_types::{CrucibleError, Result};

use crate::target::ContentKind;

const BUILTIN_CATALYST_NAMES: &[&str] = &[
    "Abadar", "Asmodeus", "Calistria", "Cayden Cailean", "Desna", "Erastil", "Gorum", "Gozreh",
    "Iomedae", "Irori", "Lamashtu", "Nethys", "Norgorber", "Pharasma", "Rovagug", "Sarenrae",
    "Shelyn", "Torag", "Urgathoa", "Zon-Kuthon",
];

const BUILTIN_CONSUMABLE_TYPES: &[&str] = &["feat", "spell", "equipment", "consumable"];

const BUILTIN_FEAT_TRAITS: &[&str] = &[
    "general", "skill", "ancestry", "class", "archetype", "dedication", "multiclass", "fortune",
    "misfortune", "flourish", "press", "open", "stance", "manipulate", "concentrate", "move",
    "attack", "emotion", "mental", "fear", "visual", "auditory", "linguistic", "divine", "arcane",
    "occult", "primal", "healing", "necromancy", "secret", "exploration", "downtime",
];

const BUILTIN_SPELL_TRAITS: &[&str] = &[
    "cantrip", "focus", "ritual", "uncommon", "rare", "arcane", "divine", "occult", "primal",
    "abjuration", "conjuration", "divination", "enchantment", "evocation", "illusion",
    "necromancy", "transmutation", "acid", "air", "cold", "earth", "electricity", "fire", "water",
    "force", "sonic", "light", "darkness", "healing", "positive", "negative", "good", "evil",
    "lawful", "chaotic", "mental", "emotion", "fear", "attack", "incapacitation", "polymorph",
    "teleportation", "manipulate", "concentrate", "death", "poison", "disease", "curse",
    "prediction", "scrying", "detection", "visual", "auditory", "linguistic",
];

const BUILTIN_EQUIPMENT_TRAITS: &[&str] = &[
    "magical", "invested", "consumable", "potion", "elixir", "alchemical", "scroll", "talisman",
    "oil", "bomb", "poison", "ammunition", "worn", "held", "shield", "armor", "weapon", "agile",
    "finesse", "reach", "thrown", "versatile", "deadly", "fatal", "forceful", "sweep", "trip",
    "disarm", "shove", "grapple", "two-hand", "light", "fire", "cold", "electricity", "acid",
    "sonic", "healing", "divine", "arcane", "occult", "primal", "abjuration", "evocation",
    "necromancy", "transmutation", "artifact", "cursed", "intelligent", "staff", "wand",
];

/// Normalize a name for registry lookups: trimmed, lower-cased, inner
/// whitespace collapsed.
fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct KnowledgeFile {
    catalyst_names: Vec<String>,
    consumable_content_types: Vec<String>,
    traits: BTreeMap<String, Vec<String>>,
}

impl Default for KnowledgeFile {
    fn default() -> Self {
        Self {
            catalyst_names: Vec::new(),
            consumable_content_types: BUILTIN_CONSUMABLE_TYPES.iter().map(|s| s.to_string()).collect(),
            traits: BTreeMap::new(),
        }
    }
}

/// Read-only domain vocabulary shared by classification and sanitization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnowledgeBase {
    catalyst_names: BTreeSet<String>,
    consumable_types: BTreeSet<String>,
    traits: BTreeMap<ContentKind, BTreeSet<String>>,
}

impl KnowledgeBase {
    /// An empty knowledge base: no recognised names, no consumable types,
    /// and no trait vocabulary (trait cleanup is skipped).
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in tables.
    pub fn builtin() -> Self {
        let mut kb = Self::empty();
        kb.catalyst_names = BUILTIN_CATALYST_NAMES.iter().map(|n| normalize(n)).collect();
        kb.consumable_types = BUILTIN_CONSUMABLE_TYPES.iter().map(|n| normalize(n)).collect();
        for (kind, traits) in [
            (ContentKind::Feat, BUILTIN_FEAT_TRAITS),
            (ContentKind::Spell, BUILTIN_SPELL_TRAITS),
            (ContentKind::Equipment, BUILTIN_EQUIPMENT_TRAITS),
        ] {
            kb.traits
                .insert(kind, traits.iter().map(|t| normalize(t)).collect());
        }
        kb
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: KnowledgeFile = toml::from_str(text)
            .map_err(|e| CrucibleError::Config(format!("invalid knowledge base: {e}")))?;

        let mut kb = Self::empty();
        kb.catalyst_names = file.catalyst_names.iter().map(|n| normalize(n)).collect();
        kb.consumable_types = file
            .consumable_content_types
            .iter()
            .map(|n| normalize(n))
            .collect();
        for (kind, traits) in file.traits {
            let kind = ContentKind::parse(&kind).ok_or_else(|| {
                CrucibleError::Config(format!("unknown content kind '{kind}' in [traits]"))
            })?;
            kb.traits
                .insert(kind, traits.iter().map(|t| normalize(t)).collect());
        }
        tracing::debug!(
            catalysts = kb.catalyst_names.len(),
            kinds = kb.traits.len(),
            "Loaded knowledge base"
        );
        Ok(kb)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn with_catalyst_name(mut self, name: &str) -> Self {
        self.catalyst_names.insert(normalize(name));
        self
    }

    pub fn with_traits<I, S>(mut self, kind: ContentKind, traits: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.traits
            .entry(kind)
            .or_default()
            .extend(traits.into_iter().map(|t| normalize(t.as_ref())));
        self
    }

    pub fn is_known_catalyst(&self, name: &str) -> bool {
        self.catalyst_names.contains(&normalize(name))
    }

    pub fn is_consumable(&self, content_type: &str) -> bool {
        !content_type.trim().is_empty() && self.consumable_types.contains(&normalize(content_type))
    }

    /// Known traits for a content kind, or `None` if no vocabulary is loaded.
    pub fn trait_vocabulary(&self, kind: ContentKind) -> Option<&BTreeSet<String>> {
        self.traits.get(&kind).filter(|set| !set.is_empty())
    }
}
