//! Material classification, vessel configuration parsing, and requirement validation.
//!
//! Raw items from the material source are classified into exactly one role
//! (Vessel, Catalyst, Template, Modifier), normalized into [`Material`]
//! records, and gated by the vessel's declared quantity bounds before any
//! generative service is involved.

pub mod classifier;
pub mod knowledge;
pub mod material;
pub mod request;
pub mod requirements;
pub mod target;
pub mod vessel_config;

pub use classifier::{classify, classify_all, extract_material, ClassifiedRole};
pub use knowledge::KnowledgeBase;
pub use material::{
    LevelAdjustment, Material, MaterialRef, RarityTier, RawItem, RequirementBounds, Role,
    RoleBounds, RoleData,
};
pub use request::SynthesisRequest;
pub use requirements::{validate_materials, validate_requirements, ValidationResult};
pub use target::{ContentKind, TargetSpec};
pub use vessel_config::VesselConfig;
