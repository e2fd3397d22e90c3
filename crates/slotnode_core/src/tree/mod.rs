//! Owned node tree.
//!
//! # Responsibility
//! - Own every instance in one arena keyed by `NodeId`.
//! - Route slot reads/writes through slot descriptors.
//! - Keep parent/subnode back-references consistent under mutation.
//!
//! # Invariants
//! - `n.parent_node() == Some(p)` exactly when `p.subnodes()` contains `n`.
//! - `subnodes()` never holds duplicates and never holds the node itself.
//! - Attaching a node under one of its descendants is rejected.
//! - Only `&mut NodeTree` mutates; exclusive ownership replaces locking.

pub mod archive;
mod mutation;
mod node;
mod propagation;
mod subnodes;

pub use archive::{ArchiveIssue, ArchiveReport};
pub use node::Node;
pub use subnodes::SubnodeList;

use crate::model::value::{NodeId, NodeRef, SlotValue};
use crate::notify::{NotificationCenter, NotificationObserver};
use crate::registry::{RegistryError, TypeRegistry};
use crate::slot::{DuplicateOp, SlotDescriptor, SlotError};
use crate::store::ObjectStore;
use log::{debug, warn};
use std::collections::{HashMap, HashSet, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

/// Name of the slot exposing a node's owned children.
pub const SUBNODES_SLOT: &str = "subnodes";

const DEFAULT_MAX_SCHEDULED_PASSES: usize = 1024;

/// Result type used by tree operations.
pub type TreeResult<T> = Result<T, TreeError>;

/// Errors from tree operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Node id is not in this tree.
    NodeNotFound(NodeId),
    /// Child is already a subnode of the parent.
    DuplicateSubnode { parent: NodeId, child: NodeId },
    /// Child type is not in the parent's allow-list.
    InvalidSubnodeType { parent: NodeId, type_name: String },
    /// Node cannot be its own subnode.
    SelfSubnode(NodeId),
    /// Attaching would make a node its own ancestor.
    CycleDetected { node: NodeId, parent: NodeId },
    /// Insert position is past the end of the subnode list.
    IndexOutOfBounds { index: usize, len: usize },
    /// Node is not a subnode of the parent.
    SubnodeNotFound { parent: NodeId, child: NodeId },
    /// A type's initial protos instantiate the type itself again.
    RecursiveInitialProto(String),
    /// Archive payload is malformed.
    InvalidArchive(String),
    Slot(SlotError),
    Registry(RegistryError),
}

impl Display for TreeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodeNotFound(id) => write!(f, "node not found: {id}"),
            Self::DuplicateSubnode { parent, child } => {
                write!(f, "node {child} is already a subnode of {parent}")
            }
            Self::InvalidSubnodeType { parent, type_name } => {
                write!(f, "node {parent} does not accept subnodes of type {type_name}")
            }
            Self::SelfSubnode(id) => write!(f, "node {id} cannot be its own subnode"),
            Self::CycleDetected { node, parent } => {
                write!(f, "attaching node {node} under {parent} would create a cycle")
            }
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "subnode index {index} is out of bounds for length {len}")
            }
            Self::SubnodeNotFound { parent, child } => {
                write!(f, "node {child} is not a subnode of {parent}")
            }
            Self::RecursiveInitialProto(type_name) => {
                write!(f, "initial protos of type {type_name} recurse into itself")
            }
            Self::InvalidArchive(message) => write!(f, "invalid archive: {message}"),
            Self::Slot(err) => write!(f, "{err}"),
            Self::Registry(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TreeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Slot(err) => Some(err),
            Self::Registry(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SlotError> for TreeError {
    fn from(value: SlotError) -> Self {
        match value {
            SlotError::Registry(err) => Self::Registry(err),
            other => Self::Slot(other),
        }
    }
}

impl From<RegistryError> for TreeError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

/// Per-tree behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Walk the parent chain on attach to reject deep cycles.
    pub detect_cycles_on_attach: bool,
    /// Upper bound of deferred passes executed by one `run_scheduled` call.
    pub max_scheduled_passes: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            detect_cycles_on_attach: true,
            max_scheduled_passes: DEFAULT_MAX_SCHEDULED_PASSES,
        }
    }
}

/// Arena owning every node of one document graph.
pub struct NodeTree {
    registry: Arc<TypeRegistry>,
    config: TreeConfig,
    nodes: HashMap<NodeId, Node>,
    notifications: NotificationCenter,
    store: Option<Arc<dyn ObjectStore>>,
    scheduled: VecDeque<NodeId>,
    scheduled_set: HashSet<NodeId>,
}

impl NodeTree {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self::with_config(registry, TreeConfig::default())
    }

    pub fn with_config(registry: Arc<TypeRegistry>, config: TreeConfig) -> Self {
        Self {
            registry,
            config,
            nodes: HashMap::new(),
            notifications: NotificationCenter::new(),
            store: None,
            scheduled: VecDeque::new(),
            scheduled_set: HashSet::new(),
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn config(&self) -> TreeConfig {
        self.config
    }

    /// Attaches the persistence collaborator told about stored writes.
    pub fn set_store(&mut self, store: Arc<dyn ObjectStore>) {
        self.store = Some(store);
    }

    pub fn add_observer(&mut self, observer: Arc<dyn NotificationObserver>) {
        self.notifications.add_observer(observer);
    }

    pub fn notification_center(&self) -> &NotificationCenter {
        &self.notifications
    }

    pub fn notification_center_mut(&mut self) -> &mut NotificationCenter {
        &mut self.notifications
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> TreeResult<&Node> {
        self.nodes.get(&id).ok_or(TreeError::NodeNotFound(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> TreeResult<&mut Node> {
        self.nodes.get_mut(&id).ok_or(TreeError::NodeNotFound(id))
    }

    pub fn node_ref(&self, id: NodeId) -> TreeResult<NodeRef> {
        Ok(self.node(id)?.node_ref())
    }

    /// Creates and initializes one instance of `type_name`.
    ///
    /// Slots start at their initial values, initial protos are instantiated
    /// and assigned through the setter, then on-finalize hooks run.
    pub fn instantiate(&mut self, type_name: &str) -> TreeResult<NodeId> {
        self.instantiate_supplied(type_name, &HashSet::new())
    }

    /// Like `instantiate`, but leaves the initial protos of `supplied` slots
    /// unbuilt because the caller assigns those slots right away.
    pub(crate) fn instantiate_supplied(
        &mut self,
        type_name: &str,
        supplied: &HashSet<String>,
    ) -> TreeResult<NodeId> {
        let mut in_progress = Vec::new();
        self.instantiate_guarded(type_name, supplied, &mut in_progress)
    }

    fn instantiate_guarded(
        &mut self,
        type_name: &str,
        supplied: &HashSet<String>,
        in_progress: &mut Vec<String>,
    ) -> TreeResult<NodeId> {
        if in_progress.iter().any(|pending| pending == type_name) {
            return Err(TreeError::RecursiveInitialProto(type_name.to_string()));
        }
        let registry = Arc::clone(&self.registry);
        let descriptor = registry.require(type_name)?;
        let slots = registry.all_slots(type_name)?;
        let subnode_classes = registry
            .lineage(type_name)?
            .iter()
            .map(|ancestor| ancestor.subnode_classes())
            .find(|classes| !classes.is_empty())
            .map(<[String]>::to_vec)
            .unwrap_or_default();

        let mut node = Node::new(Uuid::new_v4(), descriptor.name());
        node.set_subnode_classes(subnode_classes);
        for slot in slots.iter().filter(|slot| slot.name() != SUBNODES_SLOT) {
            node.write_storage(slot.private_storage_key(), slot.initial_value().clone());
        }
        let id = node.id();
        self.nodes.insert(id, node);

        in_progress.push(type_name.to_string());
        let assigned = self.assign_initial_protos(id, &slots, supplied, in_progress);
        in_progress.pop();
        if let Err(err) = assigned {
            self.discard_subtree(id)?;
            return Err(err);
        }

        for slot in &slots {
            if let Some(hook) = slot.hooks().on_finalize.clone() {
                hook(self, id);
            }
        }
        self.node_mut(id)?.mark_initialized();
        debug!(
            "event=node_instantiated module=tree status=ok type={} node={}",
            type_name, id
        );
        Ok(id)
    }

    fn assign_initial_protos(
        &mut self,
        id: NodeId,
        slots: &[Arc<SlotDescriptor>],
        supplied: &HashSet<String>,
        in_progress: &mut Vec<String>,
    ) -> TreeResult<()> {
        for slot in slots.iter().filter(|slot| !supplied.contains(slot.name())) {
            if let Some(proto) = slot.initial_proto() {
                let value_id = self.instantiate_guarded(proto, &HashSet::new(), in_progress)?;
                let value = SlotValue::Node(self.node_ref(value_id)?);
                if let Err(err) = slot.set_on(self, id, value) {
                    self.discard_subtree(value_id)?;
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Returns the descriptor of slot `name` on the node's type.
    pub fn slot_descriptor(&self, id: NodeId, name: &str) -> TreeResult<Arc<SlotDescriptor>> {
        let type_name = self.node(id)?.type_name();
        self.registry
            .slot(type_name, name)?
            .ok_or_else(|| {
                TreeError::Slot(SlotError::UnknownSlot {
                    type_name: type_name.to_string(),
                    slot: name.to_string(),
                })
            })
    }

    /// Reads one slot through its descriptor's getter.
    pub fn get_slot(&self, id: NodeId, name: &str) -> TreeResult<SlotValue> {
        if name == SUBNODES_SLOT {
            return self.subnodes_value(id);
        }
        let slot = self.slot_descriptor(id, name)?;
        slot.get_on(self, id)
    }

    /// Writes one slot through its descriptor's setter.
    ///
    /// Writing `subnodes` canonicalizes the raw list.
    pub fn set_slot(
        &mut self,
        id: NodeId,
        name: &str,
        value: impl Into<SlotValue>,
    ) -> TreeResult<()> {
        let value = value.into();
        let slot = self.slot_descriptor(id, name)?;
        if name == SUBNODES_SLOT {
            let resolved = slot.resolve_set_value(value, &self.registry)?;
            let raw = match resolved {
                SlotValue::List(items) => items,
                _ => Vec::new(),
            };
            let mut ids = Vec::with_capacity(raw.len());
            for item in raw {
                match item.as_node() {
                    Some(node) => ids.push(node.id),
                    None => warn!(
                        "event=subnode_entry_stripped module=tree status=warn node={} kind={}",
                        id,
                        item.kind_name()
                    ),
                }
            }
            return self.set_subnodes(id, ids);
        }
        slot.set_on(self, id, value)
    }

    fn subnodes_value(&self, id: NodeId) -> TreeResult<SlotValue> {
        let node = self.node(id)?;
        let mut items = Vec::with_capacity(node.subnodes().len());
        for child in node.subnodes().iter() {
            items.push(SlotValue::Node(self.node_ref(child)?));
        }
        Ok(SlotValue::List(items))
    }

    /// Storage policy of slot `name` on one instance.
    pub fn should_store_slot_on_instance(&self, id: NodeId, name: &str) -> TreeResult<bool> {
        if name == SUBNODES_SLOT {
            return self.should_store_subnodes(id);
        }
        let slot = self.slot_descriptor(id, name)?;
        Ok(slot.should_store_slot_on_instance(self, id))
    }

    /// Node override first, then the type's subnode storage policy.
    pub fn should_store_subnodes(&self, id: NodeId) -> TreeResult<bool> {
        let node = self.node(id)?;
        if let Some(value) = node.should_store_subnodes_override() {
            return Ok(value);
        }
        Ok(self.registry.require(node.type_name())?.should_store_subnodes())
    }

    pub fn set_should_store_subnodes(&mut self, id: NodeId, value: Option<bool>) -> TreeResult<()> {
        self.node_mut(id)?.set_should_store_subnodes(value);
        Ok(())
    }

    /// Replaces the node's subnode allow-list. Existing children are kept.
    pub fn set_subnode_classes(&mut self, id: NodeId, classes: Vec<String>) -> TreeResult<()> {
        for class in &classes {
            self.registry.require(class)?;
        }
        self.node_mut(id)?.set_subnode_classes(classes);
        Ok(())
    }

    pub(crate) fn read_storage(&self, id: NodeId, key: &str) -> TreeResult<SlotValue> {
        Ok(self.node(id)?.storage(key).cloned().unwrap_or_default())
    }

    pub(crate) fn write_storage(
        &mut self,
        id: NodeId,
        key: &str,
        value: SlotValue,
    ) -> TreeResult<()> {
        self.node_mut(id)?.write_storage(key, value);
        Ok(())
    }

    /// Moves the owner back-reference from `old` to `new` for node values.
    pub(crate) fn transfer_ownership(&mut self, owner: NodeId, old: &SlotValue, new: &SlotValue) {
        if let Some(old_ref) = old.as_node() {
            if let Some(previous) = self.nodes.get_mut(&old_ref.id) {
                if previous.owner_node() == Some(owner) {
                    previous.set_owner_node(None);
                }
            }
        }
        if let Some(new_ref) = new.as_node() {
            if let Some(value) = self.nodes.get_mut(&new_ref.id) {
                if let Some(previous_owner) = value.owner_node().filter(|prev| *prev != owner) {
                    debug!(
                        "event=owner_transferred module=tree status=ok node={} from={} to={}",
                        new_ref.id, previous_owner, owner
                    );
                }
                value.set_owner_node(Some(owner));
            }
        }
    }

    /// Post-write bookkeeping shared by all setter variants.
    pub(crate) fn did_update_slot(
        &mut self,
        id: NodeId,
        slot: &SlotDescriptor,
        old: &SlotValue,
        new: &SlotValue,
    ) -> TreeResult<()> {
        if slot.is_subnode() {
            if let Some(old_ref) = old.as_node() {
                if self.has_subnode(id, old_ref.id)? {
                    self.remove_subnode(id, old_ref.id)?;
                }
            }
            if let Some(new_ref) = new.as_node() {
                if !self.has_subnode(id, new_ref.id)? {
                    self.add_subnode(id, new_ref.id)?;
                }
            }
        }
        if slot.should_store_slot_on_instance(self, id) {
            self.mark_dirty(id);
        }
        self.did_update_node_if_initialized(id)
    }

    pub(crate) fn mark_dirty(&self, id: NodeId) {
        if let Some(store) = &self.store {
            store.did_mutate_instance(id);
        }
    }

    /// Creates a copy of `id` applying each slot's duplication policy.
    ///
    /// A node reached twice during one duplication is copied once.
    pub fn duplicate_node(&mut self, id: NodeId) -> TreeResult<NodeId> {
        let mut copies = HashMap::new();
        let mut in_progress = HashSet::new();
        self.duplicate_guarded(id, &mut copies, &mut in_progress)
    }

    fn duplicate_guarded(
        &mut self,
        id: NodeId,
        copies: &mut HashMap<NodeId, NodeId>,
        in_progress: &mut HashSet<NodeId>,
    ) -> TreeResult<NodeId> {
        in_progress.insert(id);
        let (type_name, classes, store_override) = {
            let node = self.node(id)?;
            (
                node.type_name().to_string(),
                node.subnode_classes().to_vec(),
                node.should_store_subnodes_override(),
            )
        };
        let registry = Arc::clone(&self.registry);
        let slots = registry.all_slots(&type_name)?;
        let supplied: HashSet<String> = slots
            .iter()
            .filter(|slot| copies_slot(slot))
            .map(|slot| slot.name().to_string())
            .collect();
        let copy = self.instantiate_supplied(&type_name, &supplied)?;
        copies.insert(id, copy);
        {
            let node = self.node_mut(copy)?;
            node.set_subnode_classes(classes);
            node.set_should_store_subnodes(store_override);
        }

        for slot in slots.iter().filter(|slot| copies_slot(slot)) {
            let value = match slot.duplicate_op() {
                DuplicateOp::Duplicate if slot.name() == SUBNODES_SLOT => {
                    self.duplicate_subnodes(id, copy, copies, in_progress)?
                }
                DuplicateOp::Duplicate => {
                    let value = self.get_slot(id, slot.name())?;
                    self.duplicate_value(&value, copies, in_progress)?
                }
                _ => self.get_slot(id, slot.name())?,
            };
            self.set_slot(copy, slot.name(), value)?;
        }
        in_progress.remove(&id);
        debug!(
            "event=node_duplicated module=tree status=ok type={} source={} copy={}",
            type_name, id, copy
        );
        Ok(copy)
    }

    /// Copy's current subnodes followed by copies of the source's subnodes.
    ///
    /// Children held by subnode slots are left to those slots.
    fn duplicate_subnodes(
        &mut self,
        source: NodeId,
        copy: NodeId,
        copies: &mut HashMap<NodeId, NodeId>,
        in_progress: &mut HashSet<NodeId>,
    ) -> TreeResult<SlotValue> {
        let held = self.subnode_slot_children(source)?;
        let mut items = match self.subnodes_value(copy)? {
            SlotValue::List(items) => items,
            _ => Vec::new(),
        };
        let children = self.node(source)?.subnodes().to_vec();
        for child in children {
            if held.contains(&child) {
                continue;
            }
            let value = SlotValue::Node(self.node_ref(child)?);
            items.push(self.duplicate_value(&value, copies, in_progress)?);
        }
        Ok(SlotValue::List(items))
    }

    /// Nodes currently held by the subnode slots of `id`.
    pub(crate) fn subnode_slot_children(&self, id: NodeId) -> TreeResult<HashSet<NodeId>> {
        let type_name = self.node(id)?.type_name();
        let mut held = HashSet::new();
        for slot in self.registry.all_slots(type_name)? {
            if !slot.is_subnode() {
                continue;
            }
            if let Some(child) = self.read_storage(id, slot.private_storage_key())?.as_node() {
                held.insert(child.id);
            }
        }
        Ok(held)
    }

    fn duplicate_value(
        &mut self,
        value: &SlotValue,
        copies: &mut HashMap<NodeId, NodeId>,
        in_progress: &mut HashSet<NodeId>,
    ) -> TreeResult<SlotValue> {
        match value {
            SlotValue::Node(node) => {
                if in_progress.contains(&node.id) {
                    return Ok(value.clone());
                }
                if let Some(copy) = copies.get(&node.id).copied() {
                    return Ok(SlotValue::Node(self.node_ref(copy)?));
                }
                let copy = self.duplicate_guarded(node.id, copies, in_progress)?;
                Ok(SlotValue::Node(self.node_ref(copy)?))
            }
            SlotValue::List(items) => {
                let mut duplicated = Vec::with_capacity(items.len());
                for item in items {
                    duplicated.push(self.duplicate_value(item, copies, in_progress)?);
                }
                Ok(SlotValue::List(duplicated))
            }
            other => Ok(other.clone()),
        }
    }
}

/// Whether duplication assigns this slot on the copy.
fn copies_slot(slot: &SlotDescriptor) -> bool {
    match slot.duplicate_op() {
        DuplicateOp::Nop => false,
        // a shared child would end up with two parents
        DuplicateOp::CopyValue => !slot.is_subnode() && slot.name() != SUBNODES_SLOT,
        DuplicateOp::Duplicate => true,
    }
}

impl std::fmt::Debug for NodeTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeTree")
            .field("nodes", &self.nodes.len())
            .field("registry_types", &self.registry.len())
            .field("config", &self.config)
            .field("scheduled", &self.scheduled.len())
            .finish_non_exhaustive()
    }
}
