//! Slot value model.
//!
//! # Responsibility
//! - Define the dynamic value stored in one slot storage cell.
//! - Name the builtin type kinds used by declared value types.
//! - Convert plain (node-free) values to and from JSON.
//!
//! # Invariants
//! - `SlotValue::Node` always carries the type name the node was
//!   instantiated with; node types never change after instantiation.
//! - `to_json` returns `None` for any value holding a node reference.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Stable, process-unique node identifier. Also serves as the node hash.
pub type NodeId = Uuid;

/// Kind name of the null value.
pub const KIND_NULL: &str = "Null";
/// Kind name of boolean values.
pub const KIND_BOOLEAN: &str = "Boolean";
/// Kind name of numeric values.
pub const KIND_NUMBER: &str = "Number";
/// Kind name of string values.
pub const KIND_STRING: &str = "String";
/// Kind name of ordered list values.
pub const KIND_ARRAY: &str = "Array";
/// Kind name of string-keyed map values.
pub const KIND_OBJECT: &str = "Object";
/// Opaque kind accepting any JSON-representable value.
pub const KIND_JSON: &str = "JSON";
/// Kind used by action slots; never carries data and yields no schema.
pub const KIND_ACTION: &str = "Action";

const BUILTIN_KINDS: &[&str] = &[
    KIND_NULL,
    KIND_BOOLEAN,
    KIND_NUMBER,
    KIND_STRING,
    KIND_ARRAY,
    KIND_OBJECT,
    KIND_JSON,
    KIND_ACTION,
];

/// Returns whether `name` is one of the builtin type kinds.
pub fn is_builtin_kind(name: &str) -> bool {
    BUILTIN_KINDS.contains(&name)
}

/// Typed reference to a node living in a `NodeTree`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: NodeId,
    pub type_name: String,
}

impl NodeRef {
    pub fn new(id: NodeId, type_name: impl Into<String>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
        }
    }
}

/// Dynamic value held by one slot.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SlotValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<SlotValue>),
    Map(BTreeMap<String, SlotValue>),
    Node(NodeRef),
}

impl SlotValue {
    /// Kind name of this value. Node values report their registered type.
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Null => KIND_NULL,
            Self::Bool(_) => KIND_BOOLEAN,
            Self::Number(_) => KIND_NUMBER,
            Self::Text(_) => KIND_STRING,
            Self::List(_) => KIND_ARRAY,
            Self::Map(_) => KIND_OBJECT,
            Self::Node(node) => node.type_name.as_str(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_node(&self) -> Option<&NodeRef> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SlotValue]> {
        match self {
            Self::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Returns the integer value when this is a finite whole number.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Number(value)
                if value.is_finite()
                    && value.fract() == 0.0
                    && value.abs() < MAX_EXACT_INTEGER =>
            {
                Some(*value as i64)
            }
            _ => None,
        }
    }

    /// Returns whether this value can be represented as plain JSON.
    ///
    /// Node references and non-finite numbers are not JSON-compatible.
    pub fn is_json_compatible(&self) -> bool {
        match self {
            Self::Null | Self::Bool(_) | Self::Text(_) => true,
            Self::Number(value) => value.is_finite(),
            Self::List(items) => items.iter().all(Self::is_json_compatible),
            Self::Map(entries) => entries.values().all(Self::is_json_compatible),
            Self::Node(_) => false,
        }
    }

    /// Converts a plain JSON value. Objects become `Map` values.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(flag) => Self::Bool(*flag),
            serde_json::Value::Number(number) => {
                number.as_f64().map(Self::Number).unwrap_or(Self::Null)
            }
            serde_json::Value::String(text) => Self::Text(text.clone()),
            serde_json::Value::Array(items) => {
                Self::List(items.iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), Self::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Converts to plain JSON, or `None` when the value holds a node.
    ///
    /// Whole numbers are emitted as JSON integers.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Self::Null => Some(serde_json::Value::Null),
            Self::Bool(flag) => Some(serde_json::Value::Bool(*flag)),
            Self::Number(_) => number_to_json(self),
            Self::Text(text) => Some(serde_json::Value::String(text.clone())),
            Self::List(items) => items
                .iter()
                .map(Self::to_json)
                .collect::<Option<Vec<_>>>()
                .map(serde_json::Value::Array),
            Self::Map(entries) => entries
                .iter()
                .map(|(key, value)| value.to_json().map(|json| (key.clone(), json)))
                .collect::<Option<serde_json::Map<_, _>>>()
                .map(serde_json::Value::Object),
            Self::Node(_) => None,
        }
    }
}

const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

fn number_to_json(value: &SlotValue) -> Option<serde_json::Value> {
    if let Some(integer) = value.as_integer() {
        return Some(serde_json::Value::from(integer));
    }
    value
        .as_f64()
        .and_then(serde_json::Number::from_f64)
        .map(serde_json::Value::Number)
}

impl From<bool> for SlotValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for SlotValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for SlotValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for SlotValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<&str> for SlotValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SlotValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<NodeRef> for SlotValue {
    fn from(value: NodeRef) -> Self {
        Self::Node(value)
    }
}

impl From<Vec<SlotValue>> for SlotValue {
    fn from(value: Vec<SlotValue>) -> Self {
        Self::List(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{is_builtin_kind, NodeRef, SlotValue, KIND_ARRAY, KIND_NUMBER, KIND_OBJECT};
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn kind_names_follow_variants() {
        assert_eq!(SlotValue::from(3).kind_name(), KIND_NUMBER);
        assert_eq!(SlotValue::List(vec![]).kind_name(), KIND_ARRAY);
        assert_eq!(SlotValue::from_json(&json!({"a": 1})).kind_name(), KIND_OBJECT);

        let node = SlotValue::Node(NodeRef::new(Uuid::new_v4(), "Folder"));
        assert_eq!(node.kind_name(), "Folder");
    }

    #[test]
    fn json_conversion_keeps_integers_integral() {
        let value = SlotValue::from_json(&json!({"count": 5, "ratio": 0.5, "tags": ["a"]}));
        let back = value.to_json().expect("plain value converts");
        assert_eq!(back, json!({"count": 5, "ratio": 0.5, "tags": ["a"]}));
        assert!(back["count"].is_i64());
    }

    #[test]
    fn node_values_are_not_json_compatible() {
        let node = SlotValue::Node(NodeRef::new(Uuid::new_v4(), "Folder"));
        let list = SlotValue::List(vec![SlotValue::from("x"), node]);
        assert!(!list.is_json_compatible());
        assert!(list.to_json().is_none());
        assert!(!SlotValue::Number(f64::NAN).is_json_compatible());
    }

    #[test]
    fn builtin_kinds_are_recognized() {
        assert!(is_builtin_kind("JSON"));
        assert!(is_builtin_kind("Number"));
        assert!(!is_builtin_kind("Folder"));
    }
}
