//! The classified material record and the raw item shape it is built from.

use std::fmt;

use serde::{Deserialize, Serialize};

use crucible_types::{CrucibleError, Result};

use crate::vessel_config::VesselConfig;

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Vessel,
    Catalyst,
    Template,
    Modifier,
}

impl Role {
    /// The roles whose counts a vessel constrains.
    pub const BOUNDED: [Role; 3] = [Role::Catalyst, Role::Template, Role::Modifier];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Vessel => "vessel",
            Role::Catalyst => "catalyst",
            Role::Template => "template",
            Role::Modifier => "modifier",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Vessel => "Vessel",
            Role::Catalyst => "Catalyst",
            Role::Template => "Template",
            Role::Modifier => "Modifier",
        }
    }

    /// Parse a role marker, case-insensitively.
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vessel" => Some(Role::Vessel),
            "catalyst" => Some(Role::Catalyst),
            "template" => Some(Role::Template),
            "modifier" => Some(Role::Modifier),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// RarityTier
// ---------------------------------------------------------------------------

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RarityTier {
    #[default]
    Common,
    Uncommon,
    Rare,
    Unique,
}

impl RarityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RarityTier::Common => "common",
            RarityTier::Uncommon => "uncommon",
            RarityTier::Rare => "rare",
            RarityTier::Unique => "unique",
        }
    }

    pub fn parse(s: &str) -> Option<RarityTier> {
        match s.trim().to_ascii_lowercase().as_str() {
            "common" => Some(RarityTier::Common),
            "uncommon" => Some(RarityTier::Uncommon),
            "rare" => Some(RarityTier::Rare),
            "unique" => Some(RarityTier::Unique),
            _ => None,
        }
    }
}

impl fmt::Display for RarityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// LevelAdjustment
// ---------------------------------------------------------------------------

/// A catalyst's effect on the target level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LevelAdjustment {
    Absolute(i64),
    Relative(i64),
}

// ---------------------------------------------------------------------------
// Requirement bounds
// ---------------------------------------------------------------------------

/// Inclusive count bounds for one role. `max == None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoleBounds {
    min: u32,
    max: Option<u32>,
}

impl RoleBounds {
    pub fn new(min: u32, max: Option<u32>) -> Result<Self> {
        if let Some(max) = max {
            if max < min {
                return Err(CrucibleError::Config(format!(
                    "maximum {max} is below minimum {min}"
                )));
            }
        }
        Ok(Self { min, max })
    }

    pub const fn unbounded(min: u32) -> Self {
        Self { min, max: None }
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> Option<u32> {
        self.max
    }

    pub fn is_below(&self, count: usize) -> bool {
        count < self.min as usize
    }

    pub fn is_above(&self, count: usize) -> bool {
        self.max.is_some_and(|max| count > max as usize)
    }
}

impl fmt::Display for RoleBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{}..={}", self.min, max),
            None => write!(f, "{}..", self.min),
        }
    }
}

/// Per-role bounds declared by a vessel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RequirementBounds {
    pub catalyst: RoleBounds,
    pub template: RoleBounds,
    pub modifier: RoleBounds,
}

impl RequirementBounds {
    /// Bounds for a non-vessel role. Vessels are always exactly one.
    pub fn for_role(&self, role: Role) -> Option<RoleBounds> {
        match role {
            Role::Catalyst => Some(self.catalyst),
            Role::Template => Some(self.template),
            Role::Modifier => Some(self.modifier),
            Role::Vessel => None,
        }
    }
}

impl Default for RequirementBounds {
    fn default() -> Self {
        Self {
            catalyst: RoleBounds { min: 0, max: Some(1) },
            template: RoleBounds { min: 0, max: Some(1) },
            modifier: RoleBounds { min: 0, max: Some(3) },
        }
    }
}

// ---------------------------------------------------------------------------
// Material
// ---------------------------------------------------------------------------

/// Role-specific payload, resolved once at classification time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum RoleData {
    Vessel {
        config: VesselConfig,
    },
    Catalyst {
        level_adjustment: Option<LevelAdjustment>,
        identity: Option<String>,
    },
    Template {
        structured_reference: Option<serde_json::Value>,
    },
    Modifier,
}

impl RoleData {
    pub fn role(&self) -> Role {
        match self {
            RoleData::Vessel { .. } => Role::Vessel,
            RoleData::Catalyst { .. } => Role::Catalyst,
            RoleData::Template { .. } => Role::Template,
            RoleData::Modifier => Role::Modifier,
        }
    }
}

/// One classified input unit. The role cannot change after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Material {
    id: String,
    display_name: String,
    public_text: String,
    private_text: Option<String>,
    rarity: RarityTier,
    data: RoleData,
}

impl Material {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, data: RoleData) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            public_text: String::new(),
            private_text: None,
            rarity: RarityTier::Common,
            data,
        }
    }

    pub fn with_public_text(mut self, text: impl Into<String>) -> Self {
        self.public_text = text.into();
        self
    }

    pub fn with_private_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.private_text = if text.trim().is_empty() { None } else { Some(text) };
        self
    }

    pub fn with_rarity(mut self, rarity: RarityTier) -> Self {
        self.rarity = rarity;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn public_text(&self) -> &str {
        &self.public_text
    }

    pub fn private_text(&self) -> Option<&str> {
        self.private_text.as_deref()
    }

    /// The directive text fed to the pipeline: private text if present, else public.
    pub fn directive_text(&self) -> &str {
        self.private_text.as_deref().unwrap_or(&self.public_text)
    }

    pub fn rarity(&self) -> RarityTier {
        self.rarity
    }

    pub fn role(&self) -> Role {
        self.data.role()
    }

    pub fn data(&self) -> &RoleData {
        &self.data
    }

    /// The vessel's configuration, if this is a vessel.
    pub fn vessel_config(&self) -> Option<&VesselConfig> {
        match &self.data {
            RoleData::Vessel { config } => Some(config),
            _ => None,
        }
    }

    /// The declared identity: a vessel's `IDENTITY` key or a catalyst's identity.
    pub fn identity(&self) -> Option<&str> {
        match &self.data {
            RoleData::Vessel { config } => config.identity.as_deref(),
            RoleData::Catalyst { identity, .. } => identity.as_deref(),
            _ => None,
        }
    }

    pub fn level_adjustment(&self) -> Option<LevelAdjustment> {
        match &self.data {
            RoleData::Catalyst {
                level_adjustment, ..
            } => *level_adjustment,
            _ => None,
        }
    }

    pub fn structured_reference(&self) -> Option<&serde_json::Value> {
        match &self.data {
            RoleData::Template {
                structured_reference,
            } => structured_reference.as_ref(),
            _ => None,
        }
    }

    pub fn to_ref(&self) -> MaterialRef {
        MaterialRef {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
        }
    }
}

/// A lightweight pointer to a material, used in validation breakdowns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRef {
    pub id: String,
    pub display_name: String,
}

// ---------------------------------------------------------------------------
// RawItem: the material source's shape
// ---------------------------------------------------------------------------

/// An unclassified item as supplied by the material source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawItem {
    pub id: String,
    pub display_name: String,
    pub tags: Vec<String>,
    pub content_type: String,
    /// Explicit role marker, e.g. `"catalyst"`.
    pub role: Option<String>,
    /// Flavor text shown to end users.
    pub description: Option<String>,
    /// Hidden directive text consumed by the pipeline.
    pub directive: Option<String>,
    pub rarity: Option<String>,
    pub level_adjustment: Option<LevelAdjustment>,
    pub identity: Option<String>,
    /// Vessel configuration text (`KEY: value` lines and `【Header】` blocks).
    pub configuration: Option<String>,
    /// A complete prior object, for templates.
    pub structured_reference: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_is_case_insensitive() {
        assert_eq!(Role::parse(" Catalyst "), Some(Role::Catalyst));
        assert_eq!(Role::parse("VESSEL"), Some(Role::Vessel));
        assert_eq!(Role::parse("banana"), None);
        assert_eq!(Role::Modifier.to_string(), "Modifier");
    }

    #[test]
    fn rarity_is_ordinal() {
        assert!(RarityTier::Common < RarityTier::Uncommon);
        assert!(RarityTier::Rare < RarityTier::Unique);
        assert_eq!(RarityTier::parse("Rare"), Some(RarityTier::Rare));
        assert_eq!(RarityTier::default(), RarityTier::Common);
    }

    #[test]
    fn role_bounds_reject_max_below_min() {
        assert!(RoleBounds::new(2, Some(1)).is_err());
        let b = RoleBounds::new(1, Some(3)).unwrap();
        assert!(b.is_below(0));
        assert!(!b.is_below(1));
        assert!(b.is_above(4));
        assert!(!b.is_above(3));
        assert_eq!(b.to_string(), "1..=3");
    }

    #[test]
    fn unbounded_max_is_never_exceeded() {
        let b = RoleBounds::unbounded(0);
        assert!(!b.is_above(10_000));
        assert_eq!(b.to_string(), "0..");
    }

    #[test]
    fn default_bounds() {
        let b = RequirementBounds::default();
        assert_eq!(b.catalyst.max(), Some(1));
        assert_eq!(b.modifier.max(), Some(3));
        assert_eq!(b.modifier.min(), 0);
        assert!(b.for_role(Role::Vessel).is_none());
    }

    #[test]
    fn level_adjustment_serde_shape() {
        let adj: LevelAdjustment =
            serde_json::from_value(serde_json::json!({"kind": "relative", "value": -2})).unwrap();
        assert_eq!(adj, LevelAdjustment::Relative(-2));
    }

    #[test]
    fn material_accessors_follow_role_data() {
        let m = Material::new(
            "c1",
            "Sunfire Essence",
            RoleData::Catalyst {
                level_adjustment: Some(LevelAdjustment::Relative(1)),
                identity: Some("Sarenrae".into()),
            },
        )
        .with_public_text("Warm to the touch.")
        .with_private_text("   ");

        assert_eq!(m.role(), Role::Catalyst);
        assert_eq!(m.identity(), Some("Sarenrae"));
        assert_eq!(m.level_adjustment(), Some(LevelAdjustment::Relative(1)));
        assert!(m.private_text().is_none(), "blank private text is dropped");
        assert_eq!(m.directive_text(), "Warm to the touch.");
        assert!(m.structured_reference().is_none());
        assert!(m.vessel_config().is_none());
    }

    #[test]
    fn raw_item_deserializes_with_defaults() {
        let item: RawItem = serde_json::from_value(serde_json::json!({
            "id": "x1",
            "display_name": "Ember Shard",
            "tags": ["fragment"]
        }))
        .unwrap();
        assert_eq!(item.content_type, "");
        assert!(item.role.is_none());
        assert_eq!(item.tags, vec!["fragment"]);
    }
}
