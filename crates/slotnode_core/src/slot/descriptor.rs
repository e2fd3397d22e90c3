//! Slot descriptor declaration, validation and setter resolution.
//!
//! # Responsibility
//! - Describe one named attribute: default, validation, duplication,
//!   storage, ownership and schema policy.
//! - Validate candidate values and repair invalid input through the
//!   coercion/fallback ladder.
//!
//! # Invariants
//! - A built descriptor's initial value passes its own validation.
//! - `validate_value` never mutates anything.
//! - The accessor kind is fixed when the descriptor is built.

use crate::model::value::{
    is_builtin_kind, NodeId, SlotValue, KIND_JSON, KIND_NUMBER, KIND_STRING,
};
use crate::registry::{RegistryError, RegistryResult, TypeRegistry};
use crate::tree::{NodeTree, TreeResult};
use log::{error, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

static SLOT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][A-Za-z0-9_]*$").expect("valid slot name regex"));
static NUMERIC_STRING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*[-+]?(\d+\.?\d*|\.\d+)([eE][-+]?\d+)?\s*$").expect("valid numeric regex")
});

/// Result type used by slot operations.
pub type SlotResult<T> = Result<T, SlotError>;

/// Slot declaration and value errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotError {
    /// Slot name is empty or not a lower camel-case identifier.
    InvalidSlotName(String),
    /// Initial value fails the descriptor's own validation.
    InconsistentInitialValue { slot: String },
    /// Setter received a value no fallback could repair.
    ValidationFailure { slot: String, value: String },
    /// Type declares no slot with this name.
    UnknownSlot { type_name: String, slot: String },
    /// Registry lookup failed during validation.
    Registry(RegistryError),
}

impl Display for SlotError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSlotName(name) => write!(f, "slot name is invalid: `{name}`"),
            Self::InconsistentInitialValue { slot } => {
                write!(f, "initial value of slot `{slot}` fails its own validation")
            }
            Self::ValidationFailure { slot, value } => {
                write!(f, "slot `{slot}` rejected value {value} and no fallback validates")
            }
            Self::UnknownSlot { type_name, slot } => {
                write!(f, "type {type_name} has no slot `{slot}`")
            }
            Self::Registry(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SlotError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Registry(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RegistryError> for SlotError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

/// What happens to a slot value when its owning instance is duplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateOp {
    /// Destination keeps its initial value.
    #[default]
    Nop,
    /// Destination receives the same value (node values are shared).
    CopyValue,
    /// Destination receives a deep duplicate of node values.
    Duplicate,
}

/// How the setter reacts to a value failing validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Repair through coercion, initial value, then first valid item.
    #[default]
    Lenient,
    /// Fail on the first invalid value.
    Strict,
}

/// How `get_slot`/`set_slot` reach the storage cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessorKind {
    /// Plain read/write; no hook is declared.
    Direct,
    /// At least one get/update hook is declared.
    Hooked,
    /// The owning type supplies its own getter or setter.
    Custom,
}

/// One entry of an enumerable value set.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidItem {
    pub label: String,
    pub value: SlotValue,
    pub subtitle: Option<String>,
}

impl ValidItem {
    pub fn new(label: impl Into<String>, value: impl Into<SlotValue>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            subtitle: None,
        }
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }
}

pub type ValidItemsProvider = Arc<dyn Fn() -> Vec<ValidItem> + Send + Sync>;
pub type GetHook = Arc<dyn Fn(&NodeTree, NodeId) + Send + Sync>;
pub type UndefinedGetHook = Arc<dyn Fn(&NodeTree, NodeId) -> SlotValue + Send + Sync>;
/// Receives `(tree, node, old_value, new_value)`.
pub type UpdateHook = Arc<dyn Fn(&mut NodeTree, NodeId, &SlotValue, &SlotValue) + Send + Sync>;
pub type FinalizeHook = Arc<dyn Fn(&mut NodeTree, NodeId) + Send + Sync>;
pub type ShouldStoreHook = Arc<dyn Fn(&NodeTree, NodeId) -> bool + Send + Sync>;
pub type CustomGetter = Arc<dyn Fn(&NodeTree, NodeId) -> SlotValue + Send + Sync>;
pub type CustomSetter =
    Arc<dyn Fn(&mut NodeTree, NodeId, SlotValue) -> TreeResult<()> + Send + Sync>;

/// Optional lifecycle callbacks of one slot.
#[derive(Clone, Default)]
pub struct SlotHooks {
    pub before_get: Option<GetHook>,
    pub on_undefined_get: Option<UndefinedGetHook>,
    pub before_update: Option<UpdateHook>,
    pub after_update: Option<UpdateHook>,
    pub on_finalize: Option<FinalizeHook>,
    pub should_store: Option<ShouldStoreHook>,
}

impl SlotHooks {
    /// Returns whether any hook runs inside get/set.
    pub fn affects_accessors(&self) -> bool {
        self.before_get.is_some()
            || self.on_undefined_get.is_some()
            || self.before_update.is_some()
            || self.after_update.is_some()
    }
}

/// Attribute definition of one named slot.
#[derive(Clone)]
pub struct SlotDescriptor {
    name: String,
    private_storage_key: String,
    setter_name: String,
    initial_value: SlotValue,
    initial_proto: Option<String>,
    declared_value_type: Option<String>,
    allows_null_value: bool,
    validates_on_set: bool,
    validation_mode: ValidationMode,
    valid_items: Vec<ValidItem>,
    valid_items_provider: Option<ValidItemsProvider>,
    allows_multiple_picks: bool,
    hooks: SlotHooks,
    custom_getter: Option<CustomGetter>,
    custom_setter: Option<CustomSetter>,
    accessor_kind: AccessorKind,
    duplicate_op: DuplicateOp,
    owns_value: bool,
    should_store_slot: bool,
    should_json_archive: bool,
    is_subnode: bool,
    is_in_json_schema: bool,
    is_required: bool,
    read_only: bool,
    description: Option<String>,
    examples: Vec<serde_json::Value>,
    json_schema_items_type: Option<String>,
    json_schema_override: Option<serde_json::Value>,
}

impl SlotDescriptor {
    /// Starts a descriptor declaration for `name`.
    pub fn builder(name: impl Into<String>) -> SlotDescriptorBuilder {
        SlotDescriptorBuilder::new(name.into())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key of the per-instance storage cell (`_<name>`).
    pub fn private_storage_key(&self) -> &str {
        &self.private_storage_key
    }

    pub fn getter_name(&self) -> &str {
        &self.name
    }

    /// Canonical setter name (`set<Name>`).
    pub fn setter_name(&self) -> &str {
        &self.setter_name
    }

    pub fn initial_value(&self) -> &SlotValue {
        &self.initial_value
    }

    /// Type instantiated and assigned when an owning instance is created.
    pub fn initial_proto(&self) -> Option<&str> {
        self.initial_proto.as_deref()
    }

    pub fn declared_value_type(&self) -> Option<&str> {
        self.declared_value_type.as_deref()
    }

    pub fn allows_null_value(&self) -> bool {
        self.allows_null_value
    }

    pub fn validates_on_set(&self) -> bool {
        self.validates_on_set
    }

    pub fn validation_mode(&self) -> ValidationMode {
        self.validation_mode
    }

    pub fn allows_multiple_picks(&self) -> bool {
        self.allows_multiple_picks
    }

    pub fn hooks(&self) -> &SlotHooks {
        &self.hooks
    }

    pub fn accessor_kind(&self) -> AccessorKind {
        self.accessor_kind
    }

    pub(crate) fn custom_getter(&self) -> Option<&CustomGetter> {
        self.custom_getter.as_ref()
    }

    pub(crate) fn custom_setter(&self) -> Option<&CustomSetter> {
        self.custom_setter.as_ref()
    }

    pub fn duplicate_op(&self) -> DuplicateOp {
        self.duplicate_op
    }

    pub fn owns_value(&self) -> bool {
        self.owns_value
    }

    pub fn should_store_slot(&self) -> bool {
        self.should_store_slot
    }

    pub fn should_json_archive(&self) -> bool {
        self.should_json_archive
    }

    /// Whether the value must also appear in the owner's subnodes.
    pub fn is_subnode(&self) -> bool {
        self.is_subnode
    }

    pub fn is_in_json_schema(&self) -> bool {
        self.is_in_json_schema
    }

    pub fn is_required(&self) -> bool {
        self.is_required
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn examples(&self) -> &[serde_json::Value] {
        &self.examples
    }

    pub fn json_schema_items_type(&self) -> Option<&str> {
        self.json_schema_items_type.as_deref()
    }

    pub fn json_schema_override(&self) -> Option<&serde_json::Value> {
        self.json_schema_override.as_ref()
    }

    /// Current enumerable value set; the provider wins when present.
    pub fn valid_items(&self) -> Cow<'_, [ValidItem]> {
        match &self.valid_items_provider {
            Some(provider) => Cow::Owned(provider()),
            None => Cow::Borrowed(self.valid_items.as_slice()),
        }
    }

    /// Per-instance storage policy; the should-store hook overrides the flag.
    pub fn should_store_slot_on_instance(&self, tree: &NodeTree, node: NodeId) -> bool {
        match &self.hooks.should_store {
            Some(hook) => hook(tree, node),
            None => self.should_store_slot,
        }
    }

    /// Checks `value` against this descriptor.
    ///
    /// # Errors
    /// - `MissingTypeDescriptor` when the declared type is neither builtin
    ///   nor registered and the value needs a hierarchical check.
    pub fn validate_value(
        &self,
        value: &SlotValue,
        registry: &TypeRegistry,
    ) -> RegistryResult<bool> {
        self.check_value(value, Some(registry))
    }

    fn check_value(
        &self,
        value: &SlotValue,
        registry: Option<&TypeRegistry>,
    ) -> RegistryResult<bool> {
        if value.is_null() {
            return Ok(self.allows_null_value);
        }

        let items = self.valid_items();
        if self.allows_multiple_picks {
            let Some(picks) = value.as_list() else {
                return Ok(false);
            };
            return Ok(picks
                .iter()
                .all(|pick| items.iter().any(|item| &item.value == pick)));
        }
        if !items.is_empty() {
            return Ok(items.iter().any(|item| &item.value == value));
        }

        let Some(declared) = self.declared_value_type.as_deref() else {
            return Ok(true);
        };
        if declared == KIND_JSON {
            return Ok(value.is_json_compatible());
        }
        if value.kind_name() == declared {
            return Ok(true);
        }
        if is_builtin_kind(declared) {
            return Ok(false);
        }
        match registry {
            Some(registry) => {
                registry.require(declared)?;
                match value.as_node() {
                    Some(node) => registry.is_kind_of(&node.type_name, declared),
                    None => Ok(false),
                }
            }
            None => Ok(false),
        }
    }

    /// Resolves the value a setter stores for `value`.
    ///
    /// Invalid input is repaired by, in order: a narrow coercion matching the
    /// declared type, the initial value, the first valid item. Every repair
    /// logs a warning. `ValidationMode::Strict` skips the repairs.
    pub fn resolve_set_value(
        &self,
        value: SlotValue,
        registry: &TypeRegistry,
    ) -> SlotResult<SlotValue> {
        if !self.validates_on_set || self.validate_value(&value, registry)? {
            return Ok(value);
        }

        if self.validation_mode == ValidationMode::Lenient {
            if let Some(coerced) = self.coerce(&value) {
                if self.validate_value(&coerced, registry)? {
                    warn!(
                        "event=slot_value_coerced module=slot status=warn slot={} from_kind={} to_kind={}",
                        self.name,
                        value.kind_name(),
                        coerced.kind_name()
                    );
                    return Ok(coerced);
                }
            }

            if self.validate_value(&self.initial_value, registry)? {
                warn!(
                    "event=slot_value_fallback module=slot status=warn slot={} fallback=initial_value rejected_kind={}",
                    self.name,
                    value.kind_name()
                );
                return Ok(self.initial_value.clone());
            }

            let first_item = self.valid_items().first().map(|item| item.value.clone());
            if let Some(first) = first_item {
                if self.validate_value(&first, registry)? {
                    warn!(
                        "event=slot_value_fallback module=slot status=warn slot={} fallback=first_valid_item rejected_kind={}",
                        self.name,
                        value.kind_name()
                    );
                    return Ok(first);
                }
            }
        }

        error!(
            "event=slot_validation_failed module=slot status=error slot={} kind={} mode={:?}",
            self.name,
            value.kind_name(),
            self.validation_mode
        );
        Err(SlotError::ValidationFailure {
            slot: self.name.clone(),
            value: describe_value(&value),
        })
    }

    fn coerce(&self, value: &SlotValue) -> Option<SlotValue> {
        match (self.declared_value_type.as_deref(), value) {
            (Some(KIND_NUMBER), SlotValue::Text(text)) if NUMERIC_STRING_RE.is_match(text) => {
                text.trim().parse::<f64>().ok().map(SlotValue::Number)
            }
            (Some(KIND_STRING), SlotValue::Number(number)) if number.is_finite() => {
                Some(SlotValue::Text(format_number(value, *number)))
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for SlotDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotDescriptor")
            .field("name", &self.name)
            .field("declared_value_type", &self.declared_value_type)
            .field("initial_value", &self.initial_value)
            .field("accessor_kind", &self.accessor_kind)
            .field("duplicate_op", &self.duplicate_op)
            .field("owns_value", &self.owns_value)
            .field("is_subnode", &self.is_subnode)
            .finish_non_exhaustive()
    }
}

fn format_number(value: &SlotValue, number: f64) -> String {
    match value.as_integer() {
        Some(integer) => integer.to_string(),
        None => number.to_string(),
    }
}

fn describe_value(value: &SlotValue) -> String {
    match value.to_json() {
        Some(json) => json.to_string(),
        None => format!("<{}>", value.kind_name()),
    }
}

fn setter_name_for(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => format!("set{}{}", first.to_ascii_uppercase(), chars.as_str()),
        None => "set".to_string(),
    }
}

/// Builder for `SlotDescriptor`.
///
/// Defaults: any type, null allowed, validation on set (lenient), no
/// ownership, not stored, not archived, not in schema, `DuplicateOp::Nop`.
pub struct SlotDescriptorBuilder {
    slot: SlotDescriptor,
}

impl SlotDescriptorBuilder {
    fn new(name: String) -> Self {
        Self {
            slot: SlotDescriptor {
                private_storage_key: format!("_{name}"),
                setter_name: setter_name_for(&name),
                name,
                initial_value: SlotValue::Null,
                initial_proto: None,
                declared_value_type: None,
                allows_null_value: true,
                validates_on_set: true,
                validation_mode: ValidationMode::Lenient,
                valid_items: Vec::new(),
                valid_items_provider: None,
                allows_multiple_picks: false,
                hooks: SlotHooks::default(),
                custom_getter: None,
                custom_setter: None,
                accessor_kind: AccessorKind::Direct,
                duplicate_op: DuplicateOp::Nop,
                owns_value: false,
                should_store_slot: false,
                should_json_archive: false,
                is_subnode: false,
                is_in_json_schema: false,
                is_required: false,
                read_only: false,
                description: None,
                examples: Vec::new(),
                json_schema_items_type: None,
                json_schema_override: None,
            },
        }
    }

    pub fn initial_value(mut self, value: impl Into<SlotValue>) -> Self {
        self.slot.initial_value = value.into();
        self
    }

    /// Instantiates `type_name` for each new owning instance.
    pub fn initial_proto(mut self, type_name: impl Into<String>) -> Self {
        self.slot.initial_proto = Some(type_name.into());
        self
    }

    pub fn declared_type(mut self, type_name: impl Into<String>) -> Self {
        self.slot.declared_value_type = Some(type_name.into());
        self
    }

    pub fn allows_null(mut self, value: bool) -> Self {
        self.slot.allows_null_value = value;
        self
    }

    pub fn validates_on_set(mut self, value: bool) -> Self {
        self.slot.validates_on_set = value;
        self
    }

    pub fn validation_mode(mut self, mode: ValidationMode) -> Self {
        self.slot.validation_mode = mode;
        self
    }

    pub fn valid_items(mut self, items: Vec<ValidItem>) -> Self {
        self.slot.valid_items = items;
        self
    }

    pub fn valid_items_provider(
        mut self,
        provider: impl Fn() -> Vec<ValidItem> + Send + Sync + 'static,
    ) -> Self {
        self.slot.valid_items_provider = Some(Arc::new(provider));
        self
    }

    pub fn allows_multiple_picks(mut self, value: bool) -> Self {
        self.slot.allows_multiple_picks = value;
        self
    }

    pub fn before_get(mut self, hook: impl Fn(&NodeTree, NodeId) + Send + Sync + 'static) -> Self {
        self.slot.hooks.before_get = Some(Arc::new(hook));
        self
    }

    pub fn on_undefined_get(
        mut self,
        hook: impl Fn(&NodeTree, NodeId) -> SlotValue + Send + Sync + 'static,
    ) -> Self {
        self.slot.hooks.on_undefined_get = Some(Arc::new(hook));
        self
    }

    pub fn before_update(
        mut self,
        hook: impl Fn(&mut NodeTree, NodeId, &SlotValue, &SlotValue) + Send + Sync + 'static,
    ) -> Self {
        self.slot.hooks.before_update = Some(Arc::new(hook));
        self
    }

    pub fn after_update(
        mut self,
        hook: impl Fn(&mut NodeTree, NodeId, &SlotValue, &SlotValue) + Send + Sync + 'static,
    ) -> Self {
        self.slot.hooks.after_update = Some(Arc::new(hook));
        self
    }

    pub fn on_finalize(
        mut self,
        hook: impl Fn(&mut NodeTree, NodeId) + Send + Sync + 'static,
    ) -> Self {
        self.slot.hooks.on_finalize = Some(Arc::new(hook));
        self
    }

    pub fn should_store_when(
        mut self,
        hook: impl Fn(&NodeTree, NodeId) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.slot.hooks.should_store = Some(Arc::new(hook));
        self
    }

    /// Owner-supplied getter; replaces the generated one.
    pub fn custom_getter(
        mut self,
        getter: impl Fn(&NodeTree, NodeId) -> SlotValue + Send + Sync + 'static,
    ) -> Self {
        self.slot.custom_getter = Some(Arc::new(getter));
        self
    }

    /// Owner-supplied setter; replaces the generated one.
    pub fn custom_setter(
        mut self,
        setter: impl Fn(&mut NodeTree, NodeId, SlotValue) -> TreeResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.slot.custom_setter = Some(Arc::new(setter));
        self
    }

    pub fn duplicate_op(mut self, op: DuplicateOp) -> Self {
        self.slot.duplicate_op = op;
        self
    }

    pub fn owns_value(mut self, value: bool) -> Self {
        self.slot.owns_value = value;
        self
    }

    pub fn should_store(mut self, value: bool) -> Self {
        self.slot.should_store_slot = value;
        self
    }

    pub fn should_json_archive(mut self, value: bool) -> Self {
        self.slot.should_json_archive = value;
        self
    }

    pub fn is_subnode(mut self, value: bool) -> Self {
        self.slot.is_subnode = value;
        self
    }

    pub fn in_json_schema(mut self, value: bool) -> Self {
        self.slot.is_in_json_schema = value;
        self
    }

    pub fn required(mut self, value: bool) -> Self {
        self.slot.is_required = value;
        self
    }

    pub fn read_only(mut self, value: bool) -> Self {
        self.slot.read_only = value;
        self
    }

    pub fn description(mut self, value: impl Into<String>) -> Self {
        self.slot.description = Some(value.into());
        self
    }

    pub fn example(mut self, value: serde_json::Value) -> Self {
        self.slot.examples.push(value);
        self
    }

    /// Item type of array slots, used by schema synthesis.
    pub fn items_type(mut self, type_name: impl Into<String>) -> Self {
        self.slot.json_schema_items_type = Some(type_name.into());
        self
    }

    /// Literal schema fragment returned verbatim by schema synthesis.
    pub fn json_schema(mut self, schema: serde_json::Value) -> Self {
        self.slot.json_schema_override = Some(schema);
        self
    }

    /// Finishes the declaration.
    ///
    /// # Errors
    /// - `InvalidSlotName` when the name is not a lower camel-case identifier.
    /// - `InconsistentInitialValue` when the initial value fails validation.
    pub fn build(self) -> SlotResult<SlotDescriptor> {
        let mut slot = self.slot;
        if !SLOT_NAME_RE.is_match(&slot.name) {
            return Err(SlotError::InvalidSlotName(slot.name));
        }

        slot.accessor_kind = if slot.custom_getter.is_some() || slot.custom_setter.is_some() {
            AccessorKind::Custom
        } else if slot.hooks.affects_accessors() {
            AccessorKind::Hooked
        } else {
            AccessorKind::Direct
        };

        if !slot.check_value(&slot.initial_value, None)? {
            return Err(SlotError::InconsistentInitialValue { slot: slot.name });
        }
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessorKind, SlotDescriptor, SlotError, ValidItem, ValidationMode};
    use crate::model::value::SlotValue;
    use crate::registry::{RegistryError, TypeRegistry};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn registry() -> TypeRegistry {
        TypeRegistry::with_base_node_type().expect("base registry")
    }

    #[test]
    fn derives_accessor_names() {
        let slot = SlotDescriptor::builder("fontSize").build().expect("slot");
        assert_eq!(slot.getter_name(), "fontSize");
        assert_eq!(slot.setter_name(), "setFontSize");
        assert_eq!(slot.private_storage_key(), "_fontSize");
        assert_eq!(slot.accessor_kind(), AccessorKind::Direct);
    }

    #[test]
    fn rejects_invalid_slot_names() {
        let err = SlotDescriptor::builder("Font size").build().unwrap_err();
        assert_eq!(err, SlotError::InvalidSlotName("Font size".to_string()));
    }

    #[test]
    fn rejects_initial_value_failing_own_validation() {
        let err = SlotDescriptor::builder("count")
            .declared_type("Number")
            .initial_value("zero")
            .build()
            .unwrap_err();
        assert!(matches!(err, SlotError::InconsistentInitialValue { .. }));

        let err = SlotDescriptor::builder("count")
            .declared_type("Number")
            .allows_null(false)
            .build()
            .unwrap_err();
        assert!(matches!(err, SlotError::InconsistentInitialValue { .. }));
    }

    #[test]
    fn hooks_select_hooked_accessors() {
        let slot = SlotDescriptor::builder("name")
            .after_update(|_, _, _, _| {})
            .build()
            .expect("slot");
        assert_eq!(slot.accessor_kind(), AccessorKind::Hooked);

        let slot = SlotDescriptor::builder("name")
            .on_finalize(|_, _| {})
            .build()
            .expect("slot");
        assert_eq!(slot.accessor_kind(), AccessorKind::Direct);

        let slot = SlotDescriptor::builder("name")
            .custom_getter(|_, _| SlotValue::Null)
            .build()
            .expect("slot");
        assert_eq!(slot.accessor_kind(), AccessorKind::Custom);
    }

    #[test]
    fn validation_checks_null_policy_first() {
        let registry = registry();
        let nullable = SlotDescriptor::builder("a").declared_type("Number").build().unwrap();
        let strict = SlotDescriptor::builder("b")
            .declared_type("Number")
            .initial_value(0)
            .allows_null(false)
            .build()
            .unwrap();
        assert!(nullable.validate_value(&SlotValue::Null, &registry).unwrap());
        assert!(!strict.validate_value(&SlotValue::Null, &registry).unwrap());
    }

    #[test]
    fn valid_items_short_circuit_type_checks() {
        let registry = registry();
        let slot = SlotDescriptor::builder("size")
            .declared_type("String")
            .initial_value("small")
            .valid_items(vec![ValidItem::new("Small", "small"), ValidItem::new("Auto", 0)])
            .build()
            .unwrap();
        assert!(slot.validate_value(&SlotValue::from(0), &registry).unwrap());
        assert!(slot.validate_value(&SlotValue::from("small"), &registry).unwrap());
        assert!(!slot.validate_value(&SlotValue::from("large"), &registry).unwrap());
    }

    #[test]
    fn multiple_picks_require_arrays_of_valid_values() {
        let registry = registry();
        let slot = SlotDescriptor::builder("tags")
            .allows_multiple_picks(true)
            .initial_value(SlotValue::List(vec![]))
            .valid_items(vec![ValidItem::new("A", "a"), ValidItem::new("B", "b")])
            .build()
            .unwrap();
        let picks = SlotValue::List(vec![SlotValue::from("a"), SlotValue::from("b")]);
        assert!(slot.validate_value(&picks, &registry).unwrap());
        let bad = SlotValue::List(vec![SlotValue::from("a"), SlotValue::from("c")]);
        assert!(!slot.validate_value(&bad, &registry).unwrap());
        assert!(!slot.validate_value(&SlotValue::from("a"), &registry).unwrap());
    }

    #[test]
    fn json_kind_accepts_plain_structures() {
        let registry = registry();
        let slot = SlotDescriptor::builder("payload").declared_type("JSON").build().unwrap();
        let value = SlotValue::from_json(&serde_json::json!({"a": [1, 2, {"b": true}]}));
        assert!(slot.validate_value(&value, &registry).unwrap());
    }

    #[test]
    fn unregistered_declared_type_is_reported() {
        let registry = registry();
        let slot = SlotDescriptor::builder("owner").declared_type("Person").build().unwrap();
        let err = slot
            .validate_value(&SlotValue::from("bob"), &registry)
            .unwrap_err();
        assert_eq!(err, RegistryError::MissingTypeDescriptor("Person".to_string()));
    }

    #[test]
    fn validation_is_idempotent() {
        let registry = registry();
        let slot = SlotDescriptor::builder("count")
            .declared_type("Number")
            .initial_value(0)
            .build()
            .unwrap();
        let value = SlotValue::from("7");
        let first = slot.validate_value(&value, &registry).unwrap();
        let second = slot.validate_value(&value, &registry).unwrap();
        assert_eq!(first, second);
        assert_eq!(value, SlotValue::from("7"));
    }

    #[test]
    fn resolve_coerces_numeric_strings_and_numbers() {
        let registry = registry();
        let count = SlotDescriptor::builder("count")
            .declared_type("Number")
            .initial_value(0)
            .build()
            .unwrap();
        assert_eq!(
            count.resolve_set_value(SlotValue::from("5"), &registry).unwrap(),
            SlotValue::Number(5.0)
        );

        let label = SlotDescriptor::builder("label")
            .declared_type("String")
            .initial_value("")
            .build()
            .unwrap();
        assert_eq!(
            label.resolve_set_value(SlotValue::from(12), &registry).unwrap(),
            SlotValue::from("12")
        );
    }

    #[test]
    fn resolve_falls_back_to_initial_value() {
        let registry = registry();
        let count = SlotDescriptor::builder("count")
            .declared_type("Number")
            .initial_value(3)
            .build()
            .unwrap();
        assert_eq!(
            count.resolve_set_value(SlotValue::from("many"), &registry).unwrap(),
            SlotValue::from(3)
        );

        let size = SlotDescriptor::builder("size")
            .valid_items(vec![ValidItem::new("Small", "small"), ValidItem::new("Large", "large")])
            .build()
            .unwrap();
        assert_eq!(
            size.resolve_set_value(SlotValue::from(true), &registry).unwrap(),
            SlotValue::Null
        );
    }

    #[test]
    fn resolve_uses_first_item_when_initial_is_invalid() {
        let registry = registry();
        let size = SlotDescriptor::builder("size")
            .allows_null(false)
            .initial_value("small")
            .valid_items_provider(|| vec![ValidItem::new("Small", "small")])
            .build()
            .unwrap();
        assert_eq!(
            size.resolve_set_value(SlotValue::from("huge"), &registry).unwrap(),
            SlotValue::from("small")
        );
    }

    #[test]
    fn strict_mode_fails_without_repair() {
        let registry = registry();
        let count = SlotDescriptor::builder("count")
            .declared_type("Number")
            .initial_value(0)
            .validation_mode(ValidationMode::Strict)
            .build()
            .unwrap();
        let err = count
            .resolve_set_value(SlotValue::from("5"), &registry)
            .unwrap_err();
        assert!(matches!(err, SlotError::ValidationFailure { .. }));
    }

    #[test]
    fn unrepairable_values_fail_hard() {
        let registry = registry();
        let items_retired = Arc::new(AtomicBool::new(false));
        let retired = Arc::clone(&items_retired);
        let level = SlotDescriptor::builder("level")
            .declared_type("Number")
            .allows_null(false)
            .initial_value("auto")
            .valid_items_provider(move || {
                if retired.load(Ordering::SeqCst) {
                    Vec::new()
                } else {
                    vec![ValidItem::new("Auto", "auto")]
                }
            })
            .build()
            .unwrap();

        items_retired.store(true, Ordering::SeqCst);
        let err = level
            .resolve_set_value(SlotValue::from("high"), &registry)
            .unwrap_err();
        assert_eq!(
            err,
            SlotError::ValidationFailure {
                slot: "level".to_string(),
                value: "\"high\"".to_string(),
            }
        );
    }
}
