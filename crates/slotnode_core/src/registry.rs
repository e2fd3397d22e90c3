//! Type registry for slot-bearing instance types.
//!
//! # Responsibility
//! - Map type names to their descriptors (parent, description, own slots).
//! - Resolve the ordered slot set of a type including inherited slots.
//! - Answer hierarchical "is-kind-of" queries for slot validation.
//!
//! # Invariants
//! - Type names are unique and never shadow a builtin kind name.
//! - A parent type is registered before any of its children.
//! - Slot names are unique among one type's own slots; a child slot with an
//!   inherited name replaces the inherited descriptor in place.

use crate::model::value::{is_builtin_kind, NodeId, SlotValue, KIND_ARRAY, KIND_STRING};
use crate::slot::{DuplicateOp, SlotDescriptor, SlotError};
use crate::tree::{NodeTree, SUBNODES_SLOT};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Name of the root node type registered by `TypeRegistry::with_base_node_type`.
pub const BASE_NODE_TYPE: &str = "Node";

static TYPE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z0-9_]*$").expect("valid type name regex"));

/// Result type used by registry lookups.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry registration and lookup errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Type name is empty, not capitalized, or shadows a builtin kind.
    InvalidTypeName(String),
    /// Type name already registered.
    DuplicateTypeName(String),
    /// Declared parent type is not registered.
    UnknownParentType { type_name: String, parent: String },
    /// A referenced type name is not registered.
    MissingTypeDescriptor(String),
    /// Two own slots of one type share a name.
    DuplicateSlotName { type_name: String, slot: String },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTypeName(name) => write!(f, "type name is invalid: `{name}`"),
            Self::DuplicateTypeName(name) => write!(f, "type already registered: {name}"),
            Self::UnknownParentType { type_name, parent } => {
                write!(f, "type {type_name} declares unregistered parent {parent}")
            }
            Self::MissingTypeDescriptor(name) => {
                write!(f, "no type descriptor registered for `{name}`")
            }
            Self::DuplicateSlotName { type_name, slot } => {
                write!(f, "type {type_name} declares slot `{slot}` twice")
            }
        }
    }
}

impl Error for RegistryError {}

/// Called on each child after its parent's subnode order changed.
pub type ReorderHook = Arc<dyn Fn(&mut NodeTree, NodeId) + Send + Sync>;

/// Type-level node hooks.
#[derive(Clone, Default)]
pub struct NodeHooks {
    pub did_reorder_parent_subnodes: Option<ReorderHook>,
}

/// Declared instance type: parent, description and own slots.
#[derive(Clone)]
pub struct TypeDescriptor {
    name: String,
    parent: Option<String>,
    description: Option<String>,
    slots: Vec<Arc<SlotDescriptor>>,
    subnode_classes: Vec<String>,
    should_store_subnodes: bool,
    hooks: NodeHooks,
}

impl TypeDescriptor {
    /// Creates a type deriving from the base node type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: Some(BASE_NODE_TYPE.to_string()),
            description: None,
            slots: Vec::new(),
            subnode_classes: Vec::new(),
            should_store_subnodes: true,
            hooks: NodeHooks::default(),
        }
    }

    /// Creates a type without a parent.
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            parent: None,
            ..Self::new(name)
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_slot(mut self, slot: SlotDescriptor) -> Self {
        self.slots.push(Arc::new(slot));
        self
    }

    /// Adds a type to the default subnode allow-list of new instances.
    pub fn with_subnode_class(mut self, type_name: impl Into<String>) -> Self {
        self.subnode_classes.push(type_name.into());
        self
    }

    pub fn with_should_store_subnodes(mut self, value: bool) -> Self {
        self.should_store_subnodes = value;
        self
    }

    pub fn on_did_reorder_parent_subnodes(
        mut self,
        hook: impl Fn(&mut NodeTree, NodeId) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.did_reorder_parent_subnodes = Some(Arc::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Own slots in declaration order; inherited slots are not included.
    pub fn own_slots(&self) -> &[Arc<SlotDescriptor>] {
        &self.slots
    }

    pub fn subnode_classes(&self) -> &[String] {
        &self.subnode_classes
    }

    pub fn should_store_subnodes(&self) -> bool {
        self.should_store_subnodes
    }

    pub fn hooks(&self) -> &NodeHooks {
        &self.hooks
    }
}

impl std::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("description", &self.description)
            .field("slots", &self.slots)
            .field("subnode_classes", &self.subnode_classes)
            .field("should_store_subnodes", &self.should_store_subnodes)
            .finish_non_exhaustive()
    }
}

/// Explicit name → type map consulted by validation and schema synthesis.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the base `Node` type.
    ///
    /// The base type declares `title`, `subtitle` and `subnodes`.
    pub fn with_base_node_type() -> Result<Self, SlotError> {
        let mut registry = Self::new();
        registry.register(base_node_type()?)?;
        Ok(registry)
    }

    /// Registers one type after name, parent and slot checks.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> RegistryResult<()> {
        let name = descriptor.name.trim().to_string();
        if !is_valid_type_name(&name) {
            return Err(RegistryError::InvalidTypeName(descriptor.name.clone()));
        }
        if self.types.contains_key(&name) {
            return Err(RegistryError::DuplicateTypeName(name));
        }
        if let Some(parent) = descriptor.parent.as_deref() {
            if !self.types.contains_key(parent) {
                return Err(RegistryError::UnknownParentType {
                    type_name: name,
                    parent: parent.to_string(),
                });
            }
        }

        let mut seen = BTreeSet::new();
        for slot in &descriptor.slots {
            if !seen.insert(slot.name().to_string()) {
                return Err(RegistryError::DuplicateSlotName {
                    type_name: name,
                    slot: slot.name().to_string(),
                });
            }
        }

        debug!(
            "event=type_registered module=registry status=ok type={} parent={} slots={}",
            name,
            descriptor.parent.as_deref().unwrap_or("-"),
            descriptor.slots.len()
        );
        self.types.insert(
            name.clone(),
            Arc::new(TypeDescriptor {
                name,
                ..descriptor
            }),
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn get(&self, type_name: &str) -> Option<&Arc<TypeDescriptor>> {
        self.types.get(type_name)
    }

    /// Returns the descriptor or `MissingTypeDescriptor`.
    pub fn require(&self, type_name: &str) -> RegistryResult<&Arc<TypeDescriptor>> {
        self.types
            .get(type_name)
            .ok_or_else(|| RegistryError::MissingTypeDescriptor(type_name.to_string()))
    }

    /// Returns sorted registered type names.
    pub fn type_names(&self) -> Vec<String> {
        self.types.keys().cloned().collect()
    }

    /// Returns the type followed by its ancestors, most-derived first.
    pub fn lineage(&self, type_name: &str) -> RegistryResult<Vec<Arc<TypeDescriptor>>> {
        let mut chain = Vec::new();
        let mut cursor = Some(type_name.to_string());
        while let Some(current) = cursor {
            let descriptor = self.require(&current)?;
            if chain
                .iter()
                .any(|seen: &Arc<TypeDescriptor>| seen.name == descriptor.name)
            {
                break;
            }
            cursor = descriptor.parent.clone();
            chain.push(Arc::clone(descriptor));
        }
        Ok(chain)
    }

    /// Returns whether `type_name` is `ancestor` or derives from it.
    pub fn is_kind_of(&self, type_name: &str, ancestor: &str) -> RegistryResult<bool> {
        self.require(ancestor)?;
        Ok(self
            .lineage(type_name)?
            .iter()
            .any(|descriptor| descriptor.name == ancestor))
    }

    /// Returns all slots of a type, ancestors first, overrides in place.
    pub fn all_slots(&self, type_name: &str) -> RegistryResult<Vec<Arc<SlotDescriptor>>> {
        let mut slots: Vec<Arc<SlotDescriptor>> = Vec::new();
        for descriptor in self.lineage(type_name)?.iter().rev() {
            for slot in &descriptor.slots {
                match slots.iter().position(|known| known.name() == slot.name()) {
                    Some(index) => slots[index] = Arc::clone(slot),
                    None => slots.push(Arc::clone(slot)),
                }
            }
        }
        Ok(slots)
    }

    /// Finds one slot by name, searching from the most-derived type up.
    pub fn slot(
        &self,
        type_name: &str,
        slot_name: &str,
    ) -> RegistryResult<Option<Arc<SlotDescriptor>>> {
        for descriptor in self.lineage(type_name)? {
            if let Some(slot) = descriptor.slots.iter().find(|slot| slot.name() == slot_name) {
                return Ok(Some(Arc::clone(slot)));
            }
        }
        Ok(None)
    }

    /// Returns the first type-level reorder hook found along the lineage.
    pub fn reorder_hook(&self, type_name: &str) -> RegistryResult<Option<ReorderHook>> {
        Ok(self
            .lineage(type_name)?
            .iter()
            .find_map(|descriptor| descriptor.hooks.did_reorder_parent_subnodes.clone()))
    }
}

fn is_valid_type_name(name: &str) -> bool {
    !is_builtin_kind(name) && TYPE_NAME_RE.is_match(name)
}

fn base_node_type() -> Result<TypeDescriptor, SlotError> {
    Ok(TypeDescriptor::root(BASE_NODE_TYPE)
        .with_description("A node in an owned document tree.")
        .with_slot(
            SlotDescriptor::builder("title")
                .declared_type(KIND_STRING)
                .initial_value("")
                .allows_null(false)
                .should_store(true)
                .should_json_archive(true)
                .in_json_schema(true)
                .description("Display title of the node.")
                .duplicate_op(DuplicateOp::CopyValue)
                .build()?,
        )
        .with_slot(
            SlotDescriptor::builder("subtitle")
                .declared_type(KIND_STRING)
                .should_store(true)
                .should_json_archive(true)
                .description("Secondary display text.")
                .duplicate_op(DuplicateOp::CopyValue)
                .build()?,
        )
        .with_slot(
            SlotDescriptor::builder(SUBNODES_SLOT)
                .declared_type(KIND_ARRAY)
                .initial_value(SlotValue::List(Vec::new()))
                .allows_null(false)
                .should_store(true)
                .should_json_archive(true)
                .description("Owned child nodes in display order.")
                .duplicate_op(DuplicateOp::Duplicate)
                .build()?,
        ))
}

#[cfg(test)]
mod tests {
    use super::{RegistryError, TypeDescriptor, TypeRegistry, BASE_NODE_TYPE};
    use crate::slot::SlotDescriptor;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::with_base_node_type().expect("base registry");
        registry
            .register(
                TypeDescriptor::new("Folder")
                    .with_description("Folder")
                    .with_slot(SlotDescriptor::builder("color").build().expect("slot")),
            )
            .expect("register Folder");
        registry
            .register(
                TypeDescriptor::new("Album")
                    .with_parent("Folder")
                    .with_description("Album")
                    .with_slot(
                        SlotDescriptor::builder("title")
                            .initial_value("Untitled album")
                            .build()
                            .expect("slot"),
                    ),
            )
            .expect("register Album");
        registry
    }

    #[test]
    fn is_kind_of_walks_the_parent_chain() {
        let registry = registry();
        assert!(registry.is_kind_of("Album", "Folder").expect("lookup"));
        assert!(registry.is_kind_of("Album", BASE_NODE_TYPE).expect("lookup"));
        assert!(!registry.is_kind_of("Folder", "Album").expect("lookup"));
    }

    #[test]
    fn is_kind_of_rejects_unregistered_ancestor() {
        let registry = registry();
        let err = registry
            .is_kind_of("Album", "Photo")
            .expect_err("unknown ancestor must fail");
        assert_eq!(err, RegistryError::MissingTypeDescriptor("Photo".to_string()));
    }

    #[test]
    fn all_slots_lists_inherited_slots_with_overrides_in_place() {
        let registry = registry();
        let slots = registry.all_slots("Album").expect("slots");
        let names: Vec<&str> = slots.iter().map(|slot| slot.name()).collect();
        assert_eq!(names, vec!["title", "subtitle", "subnodes", "color"]);
        assert_eq!(
            slots[0].initial_value().as_str(),
            Some("Untitled album")
        );
    }

    #[test]
    fn register_rejects_unknown_parent_and_duplicates() {
        let mut registry = registry();
        let err = registry
            .register(TypeDescriptor::new("Photo").with_parent("Gallery"))
            .expect_err("unknown parent must fail");
        assert!(matches!(err, RegistryError::UnknownParentType { .. }));

        let err = registry
            .register(TypeDescriptor::new("Folder"))
            .expect_err("duplicate must fail");
        assert_eq!(err, RegistryError::DuplicateTypeName("Folder".to_string()));
    }

    #[test]
    fn register_rejects_builtin_and_lowercase_names() {
        let mut registry = registry();
        assert!(matches!(
            registry.register(TypeDescriptor::new("Number")),
            Err(RegistryError::InvalidTypeName(_))
        ));
        assert!(matches!(
            registry.register(TypeDescriptor::new("folder")),
            Err(RegistryError::InvalidTypeName(_))
        ));
    }

    #[test]
    fn register_rejects_duplicate_own_slot_names() {
        let mut registry = registry();
        let err = registry
            .register(
                TypeDescriptor::new("Photo")
                    .with_slot(SlotDescriptor::builder("path").build().expect("slot"))
                    .with_slot(SlotDescriptor::builder("path").build().expect("slot")),
            )
            .expect_err("duplicate slot must fail");
        assert!(matches!(err, RegistryError::DuplicateSlotName { .. }));
    }
}
