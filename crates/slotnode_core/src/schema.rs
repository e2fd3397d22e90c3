//! JSON Schema (draft-07) synthesis from registered types.
//!
//! # Responsibility
//! - Derive per-slot property schemas from slot descriptors.
//! - Assemble a root schema whose cross-type references all point into one
//!   flat `definitions` map.
//!
//! # Invariants
//! - Node-typed slots never inline the referenced type; they emit
//!   `#/definitions/<Type>` and record the type in the shared ref-set.
//! - Every type reached by synthesis has a non-empty description.

use crate::model::value::{
    KIND_ACTION, KIND_ARRAY, KIND_BOOLEAN, KIND_JSON, KIND_NULL, KIND_NUMBER, KIND_OBJECT,
    KIND_STRING,
};
use crate::registry::{RegistryError, TypeRegistry};
use crate::slot::{SlotDescriptor, ValidItem};
use log::debug;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// `$schema` URI written on root schemas.
pub const SCHEMA_DRAFT_URI: &str = "http://json-schema.org/draft-07/schema#";

const DEFINITIONS_PREFIX: &str = "#/definitions/";

/// Result type used by schema synthesis.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Schema synthesis errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Type reached by synthesis has no description.
    DescriptionMissing(String),
    Registry(RegistryError),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DescriptionMissing(type_name) => {
                write!(f, "type {type_name} needs a description to appear in a JSON schema")
            }
            Self::Registry(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SchemaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registry(err) => Some(err),
            Self::DescriptionMissing(_) => None,
        }
    }
}

impl From<RegistryError> for SchemaError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

/// Returns the `$ref` pointer of a type inside `definitions`.
pub fn definition_ref(type_name: &str) -> String {
    format!("{DEFINITIONS_PREFIX}{type_name}")
}

impl SlotDescriptor {
    /// Property schema of this slot, or `None` for action slots.
    ///
    /// Referenced node types are added to `refs`.
    pub fn as_json_schema(&self, refs: &mut BTreeSet<String>) -> Option<Value> {
        if let Some(literal) = self.json_schema_override() {
            return Some(literal.clone());
        }
        if self.declared_value_type() == Some(KIND_ACTION) {
            return None;
        }

        let mut schema = Map::new();
        if let Some(declared) = self.declared_value_type() {
            match schema_type_name(declared) {
                TypeMapping::Primitive(name) => {
                    schema.insert("type".to_string(), Value::String(name.to_string()));
                }
                TypeMapping::Untyped => {}
                TypeMapping::Reference => {
                    refs.insert(declared.to_string());
                    schema.insert("$ref".to_string(), Value::String(definition_ref(declared)));
                }
            }
        }
        if let Some(description) = self.description() {
            schema.insert("description".to_string(), Value::String(description.to_string()));
        }
        if let Some(items_type) = self.json_schema_items_type() {
            schema.insert("items".to_string(), items_schema(items_type, refs));
        }
        if self.read_only() {
            schema.insert("readOnly".to_string(), Value::Bool(true));
        }
        if !self.initial_value().is_null() {
            if let Some(default) = self.initial_value().to_json() {
                schema.insert("default".to_string(), default);
            }
        }
        if !self.examples().is_empty() {
            schema.insert("examples".to_string(), Value::Array(self.examples().to_vec()));
        }
        self.insert_value_set(&mut schema);
        Some(Value::Object(schema))
    }

    fn insert_value_set(&self, schema: &mut Map<String, Value>) {
        let items = self.valid_items();
        if items.is_empty() {
            return;
        }
        if !self.allows_multiple_picks() {
            if let Some((min, max)) = contiguous_integer_range(&items) {
                schema.insert("minimum".to_string(), json!(min));
                schema.insert("maximum".to_string(), json!(max));
                return;
            }
        }

        let values = Value::Array(items.iter().filter_map(|item| item.value.to_json()).collect());
        if self.allows_multiple_picks() {
            let items_schema = schema
                .entry("items".to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(items_schema) = items_schema {
                items_schema.insert("enum".to_string(), values);
            }
        } else {
            schema.insert("enum".to_string(), values);
        }
    }
}

fn contiguous_integer_range(items: &[ValidItem]) -> Option<(i64, i64)> {
    let mut integers = items
        .iter()
        .map(|item| item.value.as_integer())
        .collect::<Option<Vec<i64>>>()?;
    integers.sort_unstable();
    integers.dedup();
    if !integers.windows(2).all(|pair| pair[1] - pair[0] == 1) {
        return None;
    }
    Some((*integers.first()?, *integers.last()?))
}

enum TypeMapping {
    Primitive(&'static str),
    Untyped,
    Reference,
}

fn schema_type_name(declared: &str) -> TypeMapping {
    match declared {
        KIND_NULL => TypeMapping::Primitive("null"),
        KIND_BOOLEAN => TypeMapping::Primitive("boolean"),
        KIND_NUMBER => TypeMapping::Primitive("number"),
        KIND_STRING => TypeMapping::Primitive("string"),
        KIND_ARRAY => TypeMapping::Primitive("array"),
        KIND_OBJECT => TypeMapping::Primitive("object"),
        KIND_JSON | KIND_ACTION => TypeMapping::Untyped,
        _ => TypeMapping::Reference,
    }
}

fn items_schema(items_type: &str, refs: &mut BTreeSet<String>) -> Value {
    match schema_type_name(items_type) {
        TypeMapping::Primitive(name) => json!({ "type": name }),
        TypeMapping::Untyped => json!({}),
        TypeMapping::Reference => {
            refs.insert(items_type.to_string());
            json!({ "$ref": definition_ref(items_type) })
        }
    }
}

impl TypeRegistry {
    /// Object schema of one type: its schema-visible slots as properties.
    ///
    /// # Errors
    /// - `DescriptionMissing` when the type has no non-empty description.
    /// - `MissingTypeDescriptor` when the type is not registered.
    pub fn type_json_schema(
        &self,
        type_name: &str,
        refs: &mut BTreeSet<String>,
    ) -> SchemaResult<Value> {
        let descriptor = self.require(type_name)?;
        let description = descriptor
            .description()
            .map(str::trim)
            .filter(|description| !description.is_empty())
            .ok_or_else(|| SchemaError::DescriptionMissing(type_name.to_string()))?;

        let mut properties = Map::new();
        let mut required = Vec::new();
        for slot in self.all_slots(type_name)? {
            if !slot.is_in_json_schema() {
                continue;
            }
            let Some(property) = slot.as_json_schema(refs) else {
                continue;
            };
            if slot.is_required() {
                required.push(Value::String(slot.name().to_string()));
            }
            properties.insert(slot.name().to_string(), property);
        }

        let mut schema = Map::new();
        schema.insert("type".to_string(), Value::String("object".to_string()));
        schema.insert("title".to_string(), Value::String(type_name.to_string()));
        schema.insert("description".to_string(), Value::String(description.to_string()));
        schema.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".to_string(), Value::Array(required));
        }
        Ok(Value::Object(schema))
    }

    /// Root schema of `type_name` with every referenced type in `definitions`.
    ///
    /// The root is inlined; it appears in `definitions` only when some type
    /// refers back to it.
    pub fn as_root_json_schema(&self, type_name: &str, schema_id: &str) -> SchemaResult<Value> {
        let mut refs = BTreeSet::new();
        let root = self.type_json_schema(type_name, &mut refs)?;

        let mut definitions = Map::new();
        loop {
            let next = refs
                .iter()
                .find(|name| !definitions.contains_key(name.as_str()))
                .cloned();
            let Some(name) = next else {
                break;
            };
            let schema = self.type_json_schema(&name, &mut refs)?;
            definitions.insert(name, schema);
        }

        let mut document = Map::new();
        document.insert("$id".to_string(), Value::String(schema_id.to_string()));
        document.insert("$schema".to_string(), Value::String(SCHEMA_DRAFT_URI.to_string()));
        if let Value::Object(fields) = root {
            document.extend(fields);
        }
        debug!(
            "event=schema_exported module=schema status=ok root={} definitions={}",
            type_name,
            definitions.len()
        );
        document.insert("definitions".to_string(), Value::Object(definitions));
        Ok(Value::Object(document))
    }
}

#[cfg(test)]
mod tests {
    use super::SchemaError;
    use crate::registry::{TypeDescriptor, TypeRegistry};
    use crate::slot::{SlotDescriptor, ValidItem};
    use serde_json::json;
    use std::collections::BTreeSet;

    #[test]
    fn contiguous_integer_items_become_a_range() {
        let slot = SlotDescriptor::builder("rating")
            .declared_type("Number")
            .initial_value(1)
            .valid_items((1..=5).map(|n| ValidItem::new(n.to_string(), n)).collect())
            .build()
            .expect("slot");
        let schema = slot.as_json_schema(&mut BTreeSet::new()).expect("schema");
        assert_eq!(
            schema,
            json!({"type": "number", "default": 1, "minimum": 1, "maximum": 5})
        );
    }

    #[test]
    fn other_items_become_an_enum() {
        let slot = SlotDescriptor::builder("size")
            .declared_type("String")
            .valid_items(vec![ValidItem::new("S", "s"), ValidItem::new("L", "l")])
            .description("Size.")
            .read_only(true)
            .build()
            .expect("slot");
        let schema = slot.as_json_schema(&mut BTreeSet::new()).expect("schema");
        assert_eq!(
            schema,
            json!({"type": "string", "description": "Size.", "readOnly": true, "enum": ["s", "l"]})
        );
    }

    #[test]
    fn action_slots_have_no_schema_and_overrides_win() {
        let action = SlotDescriptor::builder("run").declared_type("Action").build().unwrap();
        assert!(action.as_json_schema(&mut BTreeSet::new()).is_none());

        let literal = SlotDescriptor::builder("blob")
            .declared_type("JSON")
            .json_schema(json!({"type": "object", "additionalProperties": true}))
            .build()
            .unwrap();
        assert_eq!(
            literal.as_json_schema(&mut BTreeSet::new()).unwrap(),
            json!({"type": "object", "additionalProperties": true})
        );
    }

    #[test]
    fn node_items_are_referenced() {
        let slot = SlotDescriptor::builder("tags")
            .declared_type("Array")
            .items_type("Tag")
            .build()
            .unwrap();
        let mut refs = BTreeSet::new();
        let schema = slot.as_json_schema(&mut refs).unwrap();
        assert_eq!(schema["items"], json!({"$ref": "#/definitions/Tag"}));
        assert!(refs.contains("Tag"));
    }

    #[test]
    fn undocumented_types_are_rejected() {
        let mut registry = TypeRegistry::with_base_node_type().expect("base registry");
        registry.register(TypeDescriptor::new("Bare")).expect("register");
        let err = registry.as_root_json_schema("Bare", "urn:bare").unwrap_err();
        assert_eq!(err, SchemaError::DescriptionMissing("Bare".to_string()));
    }

    #[test]
    fn self_reference_keeps_root_in_definitions() {
        let mut registry = TypeRegistry::with_base_node_type().expect("base registry");
        registry
            .register(
                TypeDescriptor::new("Chain")
                    .with_description("Linked chain.")
                    .with_slot(
                        SlotDescriptor::builder("next")
                            .declared_type("Chain")
                            .in_json_schema(true)
                            .build()
                            .unwrap(),
                    ),
            )
            .expect("register");
        let schema = registry.as_root_json_schema("Chain", "urn:chain").unwrap();
        assert_eq!(schema["properties"]["next"]["$ref"], "#/definitions/Chain");
        assert!(schema["definitions"].get("Chain").is_some());
    }
}
