use serde_json::json;
use slotnode_core::{
    RegistryError, SchemaError, SlotDescriptor, TypeDescriptor, TypeRegistry, BASE_NODE_TYPE,
    SCHEMA_DRAFT_URI,
};

fn two_type_registry(b_description: Option<&str>) -> TypeRegistry {
    let mut registry = TypeRegistry::with_base_node_type().unwrap();
    let mut b = TypeDescriptor::new("B").with_slot(
        SlotDescriptor::builder("label")
            .declared_type("String")
            .initial_value("")
            .in_json_schema(true)
            .required(true)
            .build()
            .unwrap(),
    );
    if let Some(description) = b_description {
        b = b.with_description(description);
    }
    registry.register(b).unwrap();
    registry
        .register(
            TypeDescriptor::new("A")
                .with_description("Refers to B twice.")
                .with_slot(
                    SlotDescriptor::builder("primary")
                        .declared_type("B")
                        .in_json_schema(true)
                        .build()
                        .unwrap(),
                )
                .with_slot(
                    SlotDescriptor::builder("backups")
                        .declared_type("Array")
                        .items_type("B")
                        .in_json_schema(true)
                        .build()
                        .unwrap(),
                ),
        )
        .unwrap();
    registry
}

#[test]
fn referenced_type_lives_in_definitions() {
    let registry = two_type_registry(Some("Referenced type."));

    let schema = registry.as_root_json_schema("A", "urn:test:a").unwrap();

    assert_eq!(schema["$id"], "urn:test:a");
    assert_eq!(schema["$schema"], SCHEMA_DRAFT_URI);
    assert_eq!(schema["title"], "A");
    assert_eq!(schema["properties"]["primary"], json!({"$ref": "#/definitions/B"}));
    assert_eq!(
        schema["properties"]["backups"],
        json!({"type": "array", "items": {"$ref": "#/definitions/B"}})
    );
    let definitions = schema["definitions"].as_object().unwrap();
    assert_eq!(definitions.keys().collect::<Vec<_>>(), vec!["B"]);
    assert_eq!(definitions["B"]["required"], json!(["label"]));
    assert_eq!(definitions["B"]["properties"]["label"]["type"], "string");
}

#[test]
fn inherited_schema_slots_are_included() {
    let registry = two_type_registry(Some("Referenced type."));

    let schema = registry.as_root_json_schema("A", "urn:test:a").unwrap();

    assert_eq!(
        schema["properties"]["title"],
        json!({"type": "string", "description": "Display title of the node.", "default": ""})
    );
    assert!(schema["properties"].get("subnodes").is_none());
}

#[test]
fn undocumented_referenced_type_fails_export() {
    let registry = two_type_registry(None);

    let err = registry.as_root_json_schema("A", "urn:test:a").unwrap_err();

    assert_eq!(err, SchemaError::DescriptionMissing("B".to_string()));
}

#[test]
fn unregistered_reference_fails_export() {
    let mut registry = TypeRegistry::with_base_node_type().unwrap();
    registry
        .register(
            TypeDescriptor::new("Orphan")
                .with_description("Points nowhere.")
                .with_slot(
                    SlotDescriptor::builder("target")
                        .declared_type("Nowhere")
                        .in_json_schema(true)
                        .build()
                        .unwrap(),
                ),
        )
        .unwrap();

    let err = registry.as_root_json_schema("Orphan", "urn:test:orphan").unwrap_err();

    assert_eq!(
        err,
        SchemaError::Registry(RegistryError::MissingTypeDescriptor("Nowhere".to_string()))
    );
}

#[test]
fn base_node_schema_is_self_contained() {
    let registry = TypeRegistry::with_base_node_type().unwrap();

    let schema = registry
        .as_root_json_schema(BASE_NODE_TYPE, "slotnode://Node")
        .unwrap();

    assert_eq!(schema["type"], "object");
    assert_eq!(schema["definitions"], json!({}));
}
