//! Assigns each raw item exactly one role.
//!
//! Rules are tried in order and the first match wins:
//!
//! 1. An explicit role marker on the item, or the caller's hint.
//! 2. Recognised tags, checked per role in the order Catalyst, Template,
//!    Vessel, Modifier.
//! 3. A display name found in the knowledge base's catalyst registry.
//! 4. A consumable content type, which makes the item a Template.
//!
//! Anything else is [`ClassifiedRole::Unknown`], which callers must turn into
//! an error. There is no default role.

use uuid::Uuid;

use crucible_types::{CrucibleError, Result};

use crate::knowledge::KnowledgeBase;
use crate::material::{Material, RarityTier, RawItem, Role, RoleData};
use crate::vessel_config::VesselConfig;

const CATALYST_TAGS: &[&str] = &["catalyst", "essence", "divinity"];
const TEMPLATE_TAGS: &[&str] = &["template", "blueprint"];
const VESSEL_TAGS: &[&str] = &["vessel", "shrine", "crucible"];
const MODIFIER_TAGS: &[&str] = &["modifier", "fragment", "shard"];

const TAG_RULES: [(Role, &[&str]); 4] = [
    (Role::Catalyst, CATALYST_TAGS),
    (Role::Template, TEMPLATE_TAGS),
    (Role::Vessel, VESSEL_TAGS),
    (Role::Modifier, MODIFIER_TAGS),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifiedRole {
    Known(Role),
    Unknown,
}

impl ClassifiedRole {
    pub fn role(&self) -> Option<Role> {
        match self {
            ClassifiedRole::Known(role) => Some(*role),
            ClassifiedRole::Unknown => None,
        }
    }
}

/// Classify one item.
pub fn classify(item: &RawItem, hint: Option<Role>, kb: &KnowledgeBase) -> ClassifiedRole {
    if let Some(role) = item.role.as_deref().and_then(Role::parse).or(hint) {
        return ClassifiedRole::Known(role);
    }

    for (role, tags) in TAG_RULES {
        let tagged = item
            .tags
            .iter()
            .any(|t| tags.iter().any(|known| t.trim().eq_ignore_ascii_case(known)));
        if tagged {
            return ClassifiedRole::Known(role);
        }
    }

    if kb.is_known_catalyst(&item.display_name) {
        return ClassifiedRole::Known(Role::Catalyst);
    }

    if kb.is_consumable(&item.content_type) {
        return ClassifiedRole::Known(Role::Template);
    }

    ClassifiedRole::Unknown
}

/// Build the normalized material for an item already assigned `role`.
///
/// Vessels parse their configuration text here, so malformed bounds surface
/// as a `Config` error before any validation runs.
pub fn extract_material(item: &RawItem, role: Role) -> Result<Material> {
    let data = match role {
        Role::Vessel => RoleData::Vessel {
            config: VesselConfig::parse(item.configuration.as_deref().unwrap_or(""))?,
        },
        Role::Catalyst => RoleData::Catalyst {
            level_adjustment: item.level_adjustment,
            identity: item
                .identity
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        },
        Role::Template => RoleData::Template {
            structured_reference: item.structured_reference.clone(),
        },
        Role::Modifier => RoleData::Modifier,
    };

    let id = if item.id.trim().is_empty() {
        Uuid::new_v4().to_string()
    } else {
        item.id.clone()
    };

    let rarity = match item.rarity.as_deref() {
        None => RarityTier::Common,
        Some(raw) => RarityTier::parse(raw).unwrap_or_else(|| {
            tracing::warn!(item = %id, rarity = raw, "Unrecognised rarity, treating as common");
            RarityTier::Common
        }),
    };

    let mut material = Material::new(id, item.display_name.clone(), data)
        .with_public_text(item.description.clone().unwrap_or_default())
        .with_rarity(rarity);
    if let Some(directive) = &item.directive {
        material = material.with_private_text(directive.clone());
    }
    Ok(material)
}

/// Classify and extract every item, failing on the first one without a role.
pub fn classify_all(items: &[RawItem], kb: &KnowledgeBase) -> Result<Vec<Material>> {
    items
        .iter()
        .map(|item| match classify(item, None, kb) {
            ClassifiedRole::Known(role) => {
                tracing::debug!(item = %item.id, role = %role, "Classified material");
                extract_material(item, role)
            }
            ClassifiedRole::Unknown => Err(CrucibleError::Classification {
                item_id: item.id.clone(),
                display_name: item.display_name.clone(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::LevelAdjustment;

    fn item(name: &str) -> RawItem {
        RawItem {
            id: name.to_lowercase().replace(' ', "-"),
            display_name: name.into(),
            ..RawItem::default()
        }
    }

    fn tagged(name: &str, tags: &[&str]) -> RawItem {
        RawItem {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..item(name)
        }
    }

    #[test]
    fn explicit_marker_beats_tags() {
        let kb = KnowledgeBase::builtin();
        let mut it = tagged("Odd Shard", &["shard"]);
        it.role = Some("Vessel".into());
        assert_eq!(classify(&it, None, &kb), ClassifiedRole::Known(Role::Vessel));
    }

    #[test]
    fn hint_applies_when_no_marker() {
        let kb = KnowledgeBase::builtin();
        let it = tagged("Odd Shard", &["shard"]);
        assert_eq!(
            classify(&it, Some(Role::Template), &kb),
            ClassifiedRole::Known(Role::Template)
        );
    }

    #[test]
    fn tag_order_prefers_catalyst() {
        let kb = KnowledgeBase::empty();
        let it = tagged("Ambiguous", &["fragment", "vessel", "essence"]);
        assert_eq!(classify(&it, None, &kb), ClassifiedRole::Known(Role::Catalyst));
        let it = tagged("Ambiguous", &["fragment", "shrine"]);
        assert_eq!(classify(&it, None, &kb), ClassifiedRole::Known(Role::Vessel));
        let it = tagged("Ambiguous", &["Blueprint", "shard"]);
        assert_eq!(classify(&it, None, &kb), ClassifiedRole::Known(Role::Template));
    }

    #[test]
    fn recognised_name_is_catalyst() {
        let kb = KnowledgeBase::builtin();
        assert_eq!(
            classify(&item("Sarenrae"), None, &kb),
            ClassifiedRole::Known(Role::Catalyst)
        );
    }

    #[test]
    fn consumable_content_type_is_template() {
        let kb = KnowledgeBase::builtin();
        let mut it = item("Fireball");
        it.content_type = "spell".into();
        assert_eq!(classify(&it, None, &kb), ClassifiedRole::Known(Role::Template));
    }

    #[test]
    fn unmatched_item_is_unknown() {
        let kb = KnowledgeBase::builtin();
        let it = tagged("Pebble", &["rock"]);
        assert_eq!(classify(&it, None, &kb), ClassifiedRole::Unknown);
        assert!(ClassifiedRole::Unknown.role().is_none());
    }

    #[test]
    fn classify_all_fails_on_first_unknown() {
        let kb = KnowledgeBase::builtin();
        let items = vec![tagged("Shrine", &["vessel"]), item("Pebble"), item("Stone")];
        let err = classify_all(&items, &kb).unwrap_err();
        match err {
            CrucibleError::Classification { item_id, display_name } => {
                assert_eq!(item_id, "pebble");
                assert_eq!(display_name, "Pebble");
            }
            other => panic!("expected Classification, got {other:?}"),
        }
    }

    #[test]
    fn classify_assigns_one_role_per_item() {
        let kb = KnowledgeBase::builtin();
        let items = vec![
            tagged("Shrine", &["vessel"]),
            tagged("Dawn Essence", &["essence"]),
            tagged("Ember Shard", &["shard", "fragment"]),
        ];
        let materials = classify_all(&items, &kb).unwrap();
        let roles: Vec<Role> = materials.iter().map(Material::role).collect();
        assert_eq!(roles, vec![Role::Vessel, Role::Catalyst, Role::Modifier]);
    }

    #[test]
    fn extract_vessel_parses_configuration() {
        let mut it = tagged("Shrine", &["vessel"]);
        it.configuration = Some("MODIFIER_MIN: 1\nIDENTITY: Desna".into());
        it.rarity = Some("rare".into());
        let m = extract_material(&it, Role::Vessel).unwrap();
        assert_eq!(m.vessel_config().unwrap().bounds.modifier.min(), 1);
        assert_eq!(m.identity(), Some("Desna"));
        assert_eq!(m.rarity(), RarityTier::Rare);
    }

    #[test]
    fn extract_vessel_with_bad_bounds_fails() {
        let mut it = tagged("Shrine", &["vessel"]);
        it.configuration = Some("MODIFIER_MIN: many".into());
        assert!(matches!(
            extract_material(&it, Role::Vessel),
            Err(CrucibleError::Config(_))
        ));
    }

    #[test]
    fn extract_catalyst_reads_adjustment_and_directive() {
        let mut it = item("Dawn Essence");
        it.level_adjustment = Some(LevelAdjustment::Relative(2));
        it.identity = Some("  ".into());
        it.description = Some("A warm glow.".into());
        it.directive = Some("Grant fire resistance.".into());
        let m = extract_material(&it, Role::Catalyst).unwrap();
        assert_eq!(m.level_adjustment(), Some(LevelAdjustment::Relative(2)));
        assert_eq!(m.identity(), None);
        assert_eq!(m.public_text(), "A warm glow.");
        assert_eq!(m.directive_text(), "Grant fire resistance.");
    }

    #[test]
    fn extract_generates_missing_id() {
        let mut it = item("Nameless");
        it.id = String::new();
        let m = extract_material(&it, Role::Modifier).unwrap();
        assert!(Uuid::parse_str(m.id()).is_ok());
    }
}
