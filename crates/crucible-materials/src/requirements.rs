//! Gates a material set against the vessel's declared quantity bounds.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::material::{Material, MaterialRef, RequirementBounds, Role};

/// Outcome of requirement validation.
///
/// Ordering is deterministic: messages follow role order, and the
/// breakdown keeps input order within each role.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    pub breakdown: BTreeMap<Role, Vec<MaterialRef>>,
}

impl ValidationResult {
    pub fn count(&self, role: Role) -> usize {
        self.breakdown.get(&role).map_or(0, Vec::len)
    }
}

/// Validate using the bounds declared by the set's vessel, or the default
/// bounds when there is not exactly one vessel.
pub fn validate_materials(materials: &[Material]) -> ValidationResult {
    let mut vessels = materials.iter().filter_map(Material::vessel_config);
    let bounds = match (vessels.next(), vessels.next()) {
        (Some(config), None) => config.bounds,
        _ => RequirementBounds::default(),
    };
    validate_requirements(materials, &bounds)
}

/// Validate `materials` (vessel included) against `bounds`. Pure.
pub fn validate_requirements(materials: &[Material], bounds: &RequirementBounds) -> ValidationResult {
    let mut breakdown: BTreeMap<Role, Vec<MaterialRef>> = [
        Role::Vessel,
        Role::Catalyst,
        Role::Template,
        Role::Modifier,
    ]
    .into_iter()
    .map(|role| (role, Vec::new()))
    .collect();
    for material in materials {
        breakdown
            .entry(material.role())
            .or_default()
            .push(material.to_ref());
    }

    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut suggestions = Vec::new();

    let vessels: Vec<&Material> = materials.iter().filter(|m| m.role() == Role::Vessel).collect();
    if vessels.len() != 1 {
        errors.push(format!(
            "Exactly one Vessel is required, found {}",
            vessels.len()
        ));
    }

    let mut seen = BTreeSet::new();
    for material in materials {
        if !seen.insert(material.id()) {
            errors.push(format!("Material id '{}' appears more than once", material.id()));
        }
    }

    for role in Role::BOUNDED {
        let Some(role_bounds) = bounds.for_role(role) else {
            continue;
        };
        let count = breakdown.get(&role).map_or(0, Vec::len);
        if role_bounds.is_below(count) {
            errors.push(format!(
                "{role} minimum is {}, found {count}",
                role_bounds.min()
            ));
        }
        if let (true, Some(max)) = (role_bounds.is_above(count), role_bounds.max()) {
            warnings.push(format!("{role} maximum is {max}, found {count}"));
        }
    }

    if let [vessel] = vessels.as_slice() {
        if let Some(vessel_identity) = vessel.identity() {
            for catalyst in materials.iter().filter(|m| m.role() == Role::Catalyst) {
                if let Some(identity) = catalyst.identity() {
                    if !identity.trim().eq_ignore_ascii_case(vessel_identity.trim()) {
                        warnings.push(format!(
                            "Catalyst '{}' is aligned with {identity}, but the vessel is aligned with {vessel_identity}",
                            catalyst.display_name()
                        ));
                    }
                }
            }
        }

        for material in materials.iter().filter(|m| m.role() != Role::Vessel) {
            if material.rarity() > vessel.rarity() {
                warnings.push(format!(
                    "{} '{}' is {}, above the vessel's {} rarity",
                    material.role(),
                    material.display_name(),
                    material.rarity(),
                    vessel.rarity()
                ));
            }
        }
    }

    if breakdown.get(&Role::Modifier).map_or(true, Vec::is_empty) {
        suggestions.push("Add a Modifier to give the result a distinctive twist".to_string());
    }
    if breakdown.get(&Role::Template).map_or(true, Vec::is_empty) {
        suggestions.push("Add a Template to anchor the result's structure".to_string());
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        suggestions,
        breakdown,
    }
}
