//! The structured object produced by a synthesis run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A generated content object, addressed by JSON pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateObject(Map<String, Value>);

impl CandidateObject {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap a value if it is a JSON object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, pointer: &str) -> Option<&Value> {
        if pointer.is_empty() {
            return None;
        }
        let mut segments = split_pointer(pointer);
        let first = segments.next()?;
        segments.try_fold(self.0.get(&first)?, |value, segment| match value {
            Value::Object(map) => map.get(&segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
    }

    pub fn get_str(&self, pointer: &str) -> Option<&str> {
        self.get(pointer).and_then(Value::as_str)
    }

    /// Set the value at `pointer`, creating intermediate objects and
    /// replacing any non-object that is in the way.
    pub fn set(&mut self, pointer: &str, value: Value) {
        let segments: Vec<String> = split_pointer(pointer).collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };
        let mut current = &mut self.0;
        for segment in parents {
            let entry = current
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            current = match entry {
                Value::Object(map) => map,
                _ => return,
            };
        }
        current.insert(last.clone(), value);
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }

    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_default()
    }
}

fn split_pointer(pointer: &str) -> impl Iterator<Item = String> + '_ {
    pointer
        .trim_start_matches('/')
        .split('/')
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(value: Value) -> CandidateObject {
        CandidateObject::from_value(value).unwrap()
    }

    #[test]
    fn get_follows_pointer() {
        let c = candidate(json!({"system": {"level": {"value": 3}, "list": ["a", "b"]}}));
        assert_eq!(c.get("/system/level/value"), Some(&json!(3)));
        assert_eq!(c.get_str("/system/list/1"), Some("b"));
        assert!(c.get("/system/missing").is_none());
        assert!(c.get("").is_none());
    }

    #[test]
    fn set_creates_intermediates() {
        let mut c = candidate(json!({"system": "oops"}));
        c.set("/system/actions/value", json!(2));
        assert_eq!(c.get("/system/actions/value"), Some(&json!(2)));
        c.set("/name", json!("Dawnstrike"));
        assert_eq!(c.get_str("/name"), Some("Dawnstrike"));
    }

    #[test]
    fn from_value_rejects_non_objects() {
        assert!(CandidateObject::from_value(json!([1, 2])).is_none());
        assert!(CandidateObject::from_value(json!("text")).is_none());
    }
}
