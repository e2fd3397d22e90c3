//! Generated getter/setter behavior of slot descriptors.
//!
//! # Invariants
//! - The setter stores only values that passed validation or were repaired.
//! - Storing a value equal to the current one is a no-op: no hooks run and
//!   nothing is posted.
//! - Ownership transfer happens before the raw assignment.
//! - A subnode slot value the parent cannot attach is rejected before any
//!   hook, ownership change or write.

use crate::model::value::{NodeId, SlotValue};
use crate::slot::descriptor::{AccessorKind, SlotDescriptor};
use crate::tree::{NodeTree, TreeResult};
use std::sync::Arc;

impl SlotDescriptor {
    /// Reads this slot on `node`.
    pub fn get_on(&self, tree: &NodeTree, node: NodeId) -> TreeResult<SlotValue> {
        if let Some(getter) = self.custom_getter() {
            return Ok(getter(tree, node));
        }
        if self.accessor_kind() == AccessorKind::Direct {
            return tree.read_storage(node, self.private_storage_key());
        }

        if let Some(hook) = &self.hooks().before_get {
            hook(tree, node);
        }
        let value = tree.read_storage(node, self.private_storage_key())?;
        match &self.hooks().on_undefined_get {
            Some(hook) if value.is_null() => Ok(hook(tree, node)),
            _ => Ok(value),
        }
    }

    /// Writes this slot on `node` through validation, hooks and ownership.
    pub fn set_on(&self, tree: &mut NodeTree, node: NodeId, value: SlotValue) -> TreeResult<()> {
        if let Some(setter) = self.custom_setter().cloned() {
            return setter(tree, node, value);
        }

        let new_value = self.resolve_set_value(value, tree.registry())?;
        let old_value = tree.read_storage(node, self.private_storage_key())?;
        if old_value == new_value {
            return Ok(());
        }
        if self.is_subnode() {
            if let Some(new_ref) = new_value.as_node() {
                if !tree.has_subnode(node, new_ref.id)? {
                    tree.ensure_can_attach(node, new_ref.id)?;
                }
            }
        }

        if let Some(hook) = self.hooks().before_update.as_ref().map(Arc::clone) {
            hook(tree, node, &old_value, &new_value);
        }
        if self.owns_value() {
            tree.transfer_ownership(node, &old_value, &new_value);
        }
        tree.write_storage(node, self.private_storage_key(), new_value.clone())?;
        if let Some(hook) = self.hooks().after_update.as_ref().map(Arc::clone) {
            hook(tree, node, &old_value, &new_value);
        }
        tree.did_update_slot(node, self, &old_value, &new_value)
    }

    /// Copies this slot from `source` to `target` through getter and setter.
    pub fn copy_value_from_instance_to(
        &self,
        tree: &mut NodeTree,
        source: NodeId,
        target: NodeId,
    ) -> TreeResult<()> {
        let value = self.get_on(tree, source)?;
        self.set_on(tree, target, value)
    }
}
