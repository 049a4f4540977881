use serde::Serialize;
use uuid::Uuid;

use crucible_types::{CrucibleError, Result};

use crate::classifier::classify_all;
use crate::knowledge::KnowledgeBase;
use crate::material::{Material, RawItem, Role};
use crate::requirements::{validate_materials, ValidationResult};
use crate::target::TargetSpec;

/// A classified, validated material set plus its target. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisRequest {
    id: Uuid,
    vessel: Material,
    materials: Vec<Material>,
    target: TargetSpec,
}

impl SynthesisRequest {
    /// Classify raw items and gate them on the vessel's requirements.
    pub fn assemble(
        items: &[RawItem],
        target: TargetSpec,
        kb: &KnowledgeBase,
    ) -> Result<(Self, ValidationResult)> {
        let materials = classify_all(items, kb)?;
        Self::from_materials(materials, target)
    }

    /// Gate already-classified materials. `materials` must include the vessel.
    pub fn from_materials(
        materials: Vec<Material>,
        target: TargetSpec,
    ) -> Result<(Self, ValidationResult)> {
        let validation = validate_materials(&materials);
        if !validation.is_valid {
            tracing::info!(errors = validation.errors.len(), "Material requirements not met");
            return Err(CrucibleError::Requirement {
                errors: validation.errors,
            });
        }

        let mut vessel = None;
        let mut rest = Vec::with_capacity(materials.len().saturating_sub(1));
        for material in materials {
            if material.role() == Role::Vessel && vessel.is_none() {
                vessel = Some(material);
            } else {
                rest.push(material);
            }
        }
        // A valid set always has exactly one vessel.
        let vessel = vessel.ok_or_else(|| CrucibleError::Requirement {
            errors: vec!["Exactly one Vessel is required, found 0".into()],
        })?;

        let request = Self {
            id: Uuid::new_v4(),
            vessel,
            materials: rest,
            target,
        };
        Ok((request, validation))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn vessel(&self) -> &Material {
        &self.vessel
    }

    /// Non-vessel materials, in input order.
    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn target(&self) -> &TargetSpec {
        &self.target
    }

    pub fn by_role(&self, role: Role) -> Vec<&Material> {
        if role == Role::Vessel {
            return vec![&self.vessel];
        }
        self.materials.iter().filter(|m| m.role() == role).collect()
    }

    pub fn has_role(&self, role: Role) -> bool {
        role == Role::Vessel || self.materials.iter().any(|m| m.role() == role)
    }

    /// Target level after catalyst adjustments.
    pub fn effective_level(&self) -> Option<i64> {
        self.target.effective_level(&self.by_role(Role::Catalyst))
    }
}
