//! Content schema descriptors.
//!
//! Each content kind is described as data: where its fields live (JSON
//! pointers), which fields are enumerations or bounded integers, how its
//! activation class relates to a trigger, and the function-call contract the
//! generative service is forced to satisfy. The pipeline itself has no
//! per-kind code paths.

use serde_json::{json, Value};

use crucible_llm::ToolDefinition;
use crucible_materials::ContentKind;
use crucible_materials::target::MAX_LEVEL;

pub const RARITIES: &[&str] = &["common", "uncommon", "rare", "unique"];
pub const ACTION_TYPES: &[&str] = &["action", "reaction", "free", "passive"];

#[derive(Debug, Clone, PartialEq)]
pub struct EnumField {
    pub path: String,
    pub allowed: Vec<String>,
    pub default: String,
}

impl EnumField {
    pub fn new(path: &str, allowed: &[&str], default: &str) -> Self {
        Self {
            path: path.to_string(),
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
            default: default.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerDefault {
    /// The effective target level, falling back to the given value.
    TargetLevel(i64),
    Value(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegerField {
    pub path: String,
    pub min: i64,
    pub max: i64,
    pub default: IntegerDefault,
}

/// How an activation class constrains triggers and action counts.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationRule {
    /// Enum path holding the activation class.
    pub path: String,
    /// Classes whose text may carry a trigger.
    pub permits_precondition: Vec<String>,
    /// Classes whose text must carry a trigger.
    pub requires_precondition: Vec<String>,
    /// Path of the action count; only meaningful for `action`.
    pub action_count_path: String,
}

impl ActivationRule {
    pub fn permits(&self, class: &str) -> bool {
        self.permits_precondition.iter().any(|c| c == class)
    }

    pub fn requires(&self, class: &str) -> bool {
        self.requires_precondition.iter().any(|c| c == class)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContentSchema {
    pub kind: ContentKind,
    pub tool_name: String,
    pub tool_description: String,
    pub parameters: Value,
    pub name_path: String,
    pub description_path: String,
    pub level_path: String,
    pub traits_path: String,
    pub min_description_chars: usize,
    pub enum_fields: Vec<EnumField>,
    pub activation: Option<ActivationRule>,
    pub integer_fields: Vec<IntegerField>,
    /// Top-level bookkeeping keys that never leave the pipeline.
    pub internal_fields: Vec<String>,
}

const INTERNAL_FIELDS: &[&str] = &["balance_warnings", "attempts", "raw_stage_payloads"];

fn common_properties() -> serde_json::Map<String, Value> {
    let mut props = serde_json::Map::new();
    props.insert("name".into(), json!({ "type": "string" }));
    props.insert(
        "system".into(),
        json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "object",
                    "properties": { "value": { "type": "string", "description": "Rules text, HTML allowed" } },
                    "required": ["value"]
                },
                "level": {
                    "type": "object",
                    "properties": { "value": { "type": "integer", "minimum": 0, "maximum": MAX_LEVEL } }
                },
                "traits": {
                    "type": "object",
                    "properties": {
                        "value": { "type": "array", "items": { "type": "string" } },
                        "rarity": { "type": "string", "enum": RARITIES }
                    }
                }
            },
            "required": ["description"]
        }),
    );
    props
}

fn parameters_with(extra_system: Value) -> Value {
    let mut props = common_properties();
    if let (Some(Value::Object(system_props)), Value::Object(extra)) = (
        props
            .get_mut("system")
            .and_then(|s| s.get_mut("properties")),
        extra_system,
    ) {
        system_props.extend(extra);
    }
    json!({
        "type": "object",
        "properties": props,
        "required": ["name", "system"]
    })
}

fn activation_properties() -> Value {
    json!({
        "actionType": {
            "type": "object",
            "properties": { "value": { "type": "string", "enum": ACTION_TYPES } }
        },
        "actions": {
            "type": "object",
            "properties": { "value": { "type": ["integer", "null"], "minimum": 1, "maximum": 3 } }
        }
    })
}

fn activation_rule() -> ActivationRule {
    ActivationRule {
        path: "/system/actionType/value".into(),
        permits_precondition: vec!["reaction".into(), "free".into()],
        requires_precondition: vec!["reaction".into()],
        action_count_path: "/system/actions/value".into(),
    }
}

fn level_field() -> IntegerField {
    IntegerField {
        path: "/system/level/value".into(),
        min: 0,
        max: MAX_LEVEL,
        default: IntegerDefault::TargetLevel(1),
    }
}

impl ContentSchema {
    /// The built-in descriptor for `kind`.
    pub fn builtin(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Feat => Self::feat(),
            ContentKind::Spell => Self::spell(),
            ContentKind::Equipment => Self::equipment(),
        }
    }

    fn base(kind: ContentKind, description: &str, extra_system: Value) -> Self {
        Self {
            kind,
            tool_name: format!("create_{}", kind.as_str()),
            tool_description: description.to_string(),
            parameters: parameters_with(extra_system),
            name_path: "/name".into(),
            description_path: "/system/description/value".into(),
            level_path: "/system/level/value".into(),
            traits_path: "/system/traits/value".into(),
            min_description_chars: 40,
            enum_fields: vec![EnumField::new("/system/traits/rarity", RARITIES, "common")],
            activation: None,
            integer_fields: vec![level_field()],
            internal_fields: INTERNAL_FIELDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn feat() -> Self {
        let categories = ["general", "skill", "ancestry", "class", "archetype", "bonus"];
        let mut extra = activation_properties();
        extra["category"] = json!({ "type": "string", "enum": categories });
        extra["prerequisites"] = json!({
            "type": "object",
            "properties": { "value": { "type": "array", "items": { "type": "object" } } }
        });

        let mut schema = Self::base(ContentKind::Feat, "Create a complete feat entry", extra);
        schema
            .enum_fields
            .push(EnumField::new("/system/actionType/value", ACTION_TYPES, "passive"));
        schema
            .enum_fields
            .push(EnumField::new("/system/category", &categories, "general"));
        schema.activation = Some(activation_rule());
        schema
    }

    fn spell() -> Self {
        let categories = ["spell", "focus", "ritual", "cantrip"];
        let mut extra = activation_properties();
        extra["category"] = json!({ "type": "string", "enum": categories });
        extra["range"] = json!({ "type": "object", "properties": { "value": { "type": "string" } } });
        extra["duration"] = json!({ "type": "object", "properties": { "value": { "type": "string" } } });

        let mut schema = Self::base(ContentKind::Spell, "Create a complete spell entry", extra);
        schema
            .enum_fields
            .push(EnumField::new("/system/actionType/value", ACTION_TYPES, "action"));
        schema
            .enum_fields
            .push(EnumField::new("/system/category", &categories, "spell"));
        schema.activation = Some(activation_rule());
        schema
    }

    fn equipment() -> Self {
        let categories = ["weapon", "armor", "shield", "consumable", "equipment", "treasure"];
        let extra = json!({
            "category": { "type": "string", "enum": categories },
            "price": {
                "type": "object",
                "properties": { "value": { "type": "object", "properties": { "gp": { "type": "integer", "minimum": 0 } } } }
            },
            "bulk": { "type": "object", "properties": { "value": { "type": "string" } } }
        });

        let mut schema = Self::base(
            ContentKind::Equipment,
            "Create a complete equipment entry",
            extra,
        );
        schema
            .enum_fields
            .push(EnumField::new("/system/category", &categories, "equipment"));
        schema.integer_fields.push(IntegerField {
            path: "/system/price/value/gp".into(),
            min: 0,
            max: 1_000_000,
            default: IntegerDefault::Value(0),
        });
        schema
    }

    /// The forced function-call contract.
    pub fn tool_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.tool_name.clone(),
            description: self.tool_description.clone(),
            parameters: self.parameters.clone(),
        }
    }

    pub fn enum_field(&self, path: &str) -> Option<&EnumField> {
        self.enum_fields.iter().find(|f| f.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tool_names() {
        for kind in ContentKind::ALL {
            let schema = ContentSchema::builtin(kind);
            assert_eq!(schema.tool_definition().name, format!("create_{kind}"));
            assert_eq!(schema.parameters["type"], "object");
            assert!(schema.parameters["properties"]["system"]["properties"]["description"].is_object());
        }
    }

    #[test]
    fn feat_activation_rule() {
        let schema = ContentSchema::builtin(ContentKind::Feat);
        let rule = schema.activation.as_ref().unwrap();
        assert!(rule.permits("reaction"));
        assert!(rule.permits("free"));
        assert!(!rule.permits("action"));
        assert!(rule.requires("reaction"));
        assert!(!rule.requires("free"));
        let action_type = schema.enum_field(&rule.path).unwrap();
        assert_eq!(action_type.allowed, vec!["action", "reaction", "free", "passive"]);
    }

    #[test]
    fn equipment_has_no_activation() {
        let schema = ContentSchema::builtin(ContentKind::Equipment);
        assert!(schema.activation.is_none());
        assert!(schema.enum_field("/system/category").unwrap().allowed.contains(&"shield".to_string()));
        assert_eq!(schema.integer_fields.len(), 2);
        assert!(schema.parameters["properties"]["system"]["properties"]["price"].is_object());
    }

    #[test]
    fn spell_categories() {
        let schema = ContentSchema::builtin(ContentKind::Spell);
        let category = schema.enum_field("/system/category").unwrap();
        assert_eq!(category.default, "spell");
        assert!(category.allowed.contains(&"cantrip".to_string()));
        assert!(schema.internal_fields.contains(&"balance_warnings".to_string()));
    }
}
