//! Node record stored in a `NodeTree` arena.
//!
//! A node is one instance: its slot storage cells plus the tree fields
//! (parent back-reference, owned subnodes, slot-owner back-reference).

use crate::model::value::{NodeId, NodeRef, SlotValue};
use crate::tree::subnodes::SubnodeList;
use std::collections::BTreeMap;

/// One instance participating in the owned tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: NodeId,
    type_name: String,
    parent_node: Option<NodeId>,
    owner_node: Option<NodeId>,
    subnodes: SubnodeList,
    subnode_classes: Vec<String>,
    should_store_subnodes: Option<bool>,
    storage: BTreeMap<String, SlotValue>,
    is_initialized: bool,
    is_shut_down: bool,
}

impl Node {
    pub(crate) fn new(id: NodeId, type_name: impl Into<String>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            parent_node: None,
            owner_node: None,
            subnodes: SubnodeList::new(),
            subnode_classes: Vec::new(),
            should_store_subnodes: None,
            storage: BTreeMap::new(),
            is_initialized: false,
            is_shut_down: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Membership hash; the process-unique id.
    pub fn hash(&self) -> NodeId {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn node_ref(&self) -> NodeRef {
        NodeRef::new(self.id, self.type_name.clone())
    }

    pub fn parent_node(&self) -> Option<NodeId> {
        self.parent_node
    }

    /// Node holding this one in an ownership-transferring slot.
    pub fn owner_node(&self) -> Option<NodeId> {
        self.owner_node
    }

    pub fn subnodes(&self) -> &SubnodeList {
        &self.subnodes
    }

    /// Allowed child types; empty means unrestricted.
    pub fn subnode_classes(&self) -> &[String] {
        &self.subnode_classes
    }

    /// Per-node override of the type's subnode storage policy.
    pub fn should_store_subnodes_override(&self) -> Option<bool> {
        self.should_store_subnodes
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    pub fn is_shut_down(&self) -> bool {
        self.is_shut_down
    }

    /// Raw storage cell keyed by a slot's private storage key.
    pub fn storage(&self, key: &str) -> Option<&SlotValue> {
        self.storage.get(key)
    }

    pub(crate) fn write_storage(&mut self, key: &str, value: SlotValue) {
        self.storage.insert(key.to_string(), value);
    }

    pub(crate) fn set_parent_node(&mut self, parent: Option<NodeId>) {
        self.parent_node = parent;
    }

    pub(crate) fn set_owner_node(&mut self, owner: Option<NodeId>) {
        self.owner_node = owner;
    }

    pub(crate) fn subnodes_mut(&mut self) -> &mut SubnodeList {
        &mut self.subnodes
    }

    pub(crate) fn replace_subnodes(&mut self, subnodes: SubnodeList) {
        self.subnodes = subnodes;
    }

    pub(crate) fn set_subnode_classes(&mut self, classes: Vec<String>) {
        self.subnode_classes = classes;
    }

    pub(crate) fn set_should_store_subnodes(&mut self, value: Option<bool>) {
        self.should_store_subnodes = value;
    }

    pub(crate) fn mark_initialized(&mut self) {
        self.is_initialized = true;
    }

    pub(crate) fn mark_shut_down(&mut self) {
        self.is_shut_down = true;
    }
}
