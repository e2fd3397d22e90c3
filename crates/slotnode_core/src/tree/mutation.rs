//! Structural edits of the subnode tree.
//!
//! Every edit validates first, then mutates, then fixes back-references and
//! signals the change. A failed precondition leaves the tree untouched.
//! A detached child is also cleared from every subnode slot of its former
//! parent, so a subnode slot never names a node outside `subnodes`.

use super::{NodeTree, SubnodeList, TreeError, TreeResult};
use crate::model::value::{NodeId, SlotValue};
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::Arc;

impl NodeTree {
    /// Inserts `child` into `parent`'s subnodes at `index`.
    ///
    /// # Errors
    /// - `SelfSubnode`, `DuplicateSubnode`, `InvalidSubnodeType` or
    ///   `CycleDetected` when `child` cannot be attached.
    /// - `IndexOutOfBounds` when `index` is past the end.
    pub fn add_subnode_at(
        &mut self,
        parent: NodeId,
        child: NodeId,
        index: usize,
    ) -> TreeResult<()> {
        self.ensure_can_attach(parent, child)?;
        let len = self.node(parent)?.subnodes().len();
        if index > len {
            return Err(TreeError::IndexOutOfBounds { index, len });
        }

        self.detach_from_previous_parent(child, parent)?;
        self.node_mut(parent)?.subnodes_mut().insert(index, child);
        self.node_mut(child)?.set_parent_node(Some(parent));
        debug!(
            "event=subnode_added module=tree status=ok parent={} child={} index={}",
            parent, child, index
        );
        self.did_mutate_subnodes(parent)
    }

    /// Appends `child` to `parent`'s subnodes.
    pub fn add_subnode(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        let len = self.subnode_count(parent)?;
        self.add_subnode_at(parent, child, len)
    }

    /// Appends several children. All of them are checked before any is added.
    pub fn add_subnodes(&mut self, parent: NodeId, children: &[NodeId]) -> TreeResult<()> {
        let mut batch = HashSet::new();
        for child in children {
            if !batch.insert(*child) {
                return Err(TreeError::DuplicateSubnode {
                    parent,
                    child: *child,
                });
            }
            self.ensure_can_attach(parent, *child)?;
        }
        for child in children {
            self.add_subnode(parent, *child)?;
        }
        Ok(())
    }

    /// Detaches `child` from `parent`, clearing its parent back-reference.
    pub fn remove_subnode(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        self.node(child)?;
        if self.node_mut(parent)?.subnodes_mut().remove(child).is_none() {
            return Err(TreeError::SubnodeNotFound { parent, child });
        }
        self.clear_parent_if(child, parent);
        self.release_subnode_slots(parent, child)?;
        debug!(
            "event=subnode_removed module=tree status=ok parent={} child={}",
            parent, child
        );
        self.did_mutate_subnodes(parent)
    }

    /// Detaches every child of `parent`. Returns the detached ids in order.
    pub fn remove_all_subnodes(&mut self, parent: NodeId) -> TreeResult<Vec<NodeId>> {
        let removed = self.node_mut(parent)?.subnodes_mut().clear();
        for child in &removed {
            self.clear_parent_if(*child, parent);
            self.release_subnode_slots(parent, *child)?;
        }
        self.did_mutate_subnodes(parent)?;
        Ok(removed)
    }

    /// Detaches `child` from whatever parent holds it.
    ///
    /// Returns the former parent, or `None` for a root.
    pub fn remove_from_parent_node(&mut self, child: NodeId) -> TreeResult<Option<NodeId>> {
        match self.node(child)?.parent_node() {
            Some(parent) => {
                self.remove_subnode(parent, child)?;
                Ok(Some(parent))
            }
            None => Ok(None),
        }
    }

    /// Moves `child` under `parent`, or detaches it for `None`.
    pub fn set_parent_node(&mut self, child: NodeId, parent: Option<NodeId>) -> TreeResult<()> {
        match parent {
            Some(parent) if self.node(child)?.parent_node() == Some(parent) => Ok(()),
            Some(parent) => self.add_subnode(parent, child),
            None => self.remove_from_parent_node(child).map(|_| ()),
        }
    }

    /// Puts `replacement` at the position of `existing`.
    pub fn replace_subnode_with(
        &mut self,
        parent: NodeId,
        existing: NodeId,
        replacement: NodeId,
    ) -> TreeResult<()> {
        let index = self
            .index_of_subnode(parent, existing)?
            .ok_or(TreeError::SubnodeNotFound {
                parent,
                child: existing,
            })?;
        if existing == replacement {
            return Ok(());
        }
        self.ensure_can_attach(parent, replacement)?;

        self.detach_from_previous_parent(replacement, parent)?;
        {
            let list = self.node_mut(parent)?.subnodes_mut();
            list.remove(existing);
            list.insert(index, replacement);
        }
        self.clear_parent_if(existing, parent);
        self.release_subnode_slots(parent, existing)?;
        self.node_mut(replacement)?.set_parent_node(Some(parent));
        self.did_mutate_subnodes(parent)
    }

    /// Moves `children` to `index`, keeping their relative order.
    ///
    /// `index` counts positions among the remaining children and is clamped
    /// to the end of the list.
    pub fn move_subnodes_to_index(
        &mut self,
        parent: NodeId,
        children: &[NodeId],
        index: usize,
    ) -> TreeResult<()> {
        let mut moving = Vec::with_capacity(children.len());
        {
            let list = self.node(parent)?.subnodes();
            for child in children {
                if !list.contains(*child) {
                    return Err(TreeError::SubnodeNotFound {
                        parent,
                        child: *child,
                    });
                }
                if !moving.contains(child) {
                    moving.push(*child);
                }
            }
        }

        let list = self.node_mut(parent)?.subnodes_mut();
        for child in &moving {
            list.remove(*child);
        }
        let mut position = index.min(list.len());
        for child in moving {
            list.insert(position, child);
            position += 1;
        }
        self.did_mutate_subnodes(parent)
    }

    pub fn order_subnode_first(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        self.move_subnodes_to_index(parent, &[child], 0)
    }

    pub fn order_subnode_last(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        self.move_subnodes_to_index(parent, &[child], usize::MAX)
    }

    /// Replaces `parent`'s subnodes with a raw id list.
    ///
    /// Unknown ids and the parent itself are stripped, duplicates keep their
    /// first occurrence, and back-references of added and dropped children
    /// are fixed. A reorder pass is always scheduled.
    pub fn set_subnodes(&mut self, parent: NodeId, raw: Vec<NodeId>) -> TreeResult<()> {
        self.node(parent)?;
        let raw_len = raw.len();
        let known: Vec<NodeId> = raw
            .into_iter()
            .filter(|id| *id != parent && self.contains(*id))
            .collect();
        if known.len() != raw_len {
            warn!(
                "event=subnode_entries_stripped module=tree status=warn parent={} stripped={}",
                parent,
                raw_len - known.len()
            );
        }
        let (canonical, duplicates) = SubnodeList::from_raw(known);
        if duplicates > 0 {
            warn!(
                "event=subnode_duplicates_dropped module=tree status=warn parent={} duplicates={}",
                parent, duplicates
            );
        }

        let previous = self.node(parent)?.subnodes().clone();
        for child in canonical.iter().filter(|child| !previous.contains(*child)) {
            self.check_subnode_class(parent, child)?;
            self.check_cycle(parent, child)?;
        }

        for child in previous.iter().filter(|child| !canonical.contains(*child)) {
            self.clear_parent_if(child, parent);
            self.release_subnode_slots(parent, child)?;
        }
        for child in canonical.iter() {
            self.detach_from_previous_parent(child, parent)?;
            self.node_mut(child)?.set_parent_node(Some(parent));
        }
        self.node_mut(parent)?.replace_subnodes(canonical);
        self.did_mutate_subnodes(parent)
    }

    /// Applies a raw edit to `parent`'s subnode ids, then canonicalizes it.
    pub fn edit_subnodes<F>(&mut self, parent: NodeId, edit: F) -> TreeResult<()>
    where
        F: FnOnce(&mut Vec<NodeId>),
    {
        let mut raw = self.node(parent)?.subnodes().to_vec();
        edit(&mut raw);
        self.set_subnodes(parent, raw)
    }

    pub fn subnode_at(&self, parent: NodeId, index: usize) -> TreeResult<Option<NodeId>> {
        Ok(self.node(parent)?.subnodes().get(index))
    }

    pub fn index_of_subnode(&self, parent: NodeId, child: NodeId) -> TreeResult<Option<usize>> {
        Ok(self.node(parent)?.subnodes().index_of(child))
    }

    pub fn subnode_count(&self, parent: NodeId) -> TreeResult<usize> {
        Ok(self.node(parent)?.subnodes().len())
    }

    pub fn has_subnode(&self, parent: NodeId, child: NodeId) -> TreeResult<bool> {
        Ok(self.node(parent)?.subnodes().contains(child))
    }

    /// Ancestors of `id`, nearest first.
    pub fn parent_chain(&self, id: NodeId) -> TreeResult<Vec<NodeId>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut cursor = self.node(id)?.parent_node();
        while let Some(current) = cursor {
            if !visited.insert(current) {
                break;
            }
            chain.push(current);
            cursor = self.node(current)?.parent_node();
        }
        Ok(chain)
    }

    pub(crate) fn ensure_can_attach(&self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        self.node(child)?;
        if parent == child {
            return Err(TreeError::SelfSubnode(child));
        }
        if self.node(parent)?.subnodes().contains(child) {
            return Err(TreeError::DuplicateSubnode { parent, child });
        }
        self.check_subnode_class(parent, child)?;
        self.check_cycle(parent, child)
    }

    pub(super) fn check_subnode_class(&self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        let classes = self.node(parent)?.subnode_classes();
        if classes.is_empty() {
            return Ok(());
        }
        let child_type = self.node(child)?.type_name();
        for class in classes {
            if self.registry().is_kind_of(child_type, class)? {
                return Ok(());
            }
        }
        Err(TreeError::InvalidSubnodeType {
            parent,
            type_name: child_type.to_string(),
        })
    }

    fn check_cycle(&self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        if self.config().detect_cycles_on_attach && self.would_create_cycle(parent, child)? {
            return Err(TreeError::CycleDetected {
                node: child,
                parent,
            });
        }
        Ok(())
    }

    /// Returns whether `child` is `parent` or one of its ancestors.
    fn would_create_cycle(&self, parent: NodeId, child: NodeId) -> TreeResult<bool> {
        Ok(parent == child || self.parent_chain(parent)?.contains(&child))
    }

    fn detach_from_previous_parent(&mut self, child: NodeId, new_parent: NodeId) -> TreeResult<()> {
        let Some(previous) = self.node(child)?.parent_node() else {
            return Ok(());
        };
        if previous == new_parent {
            return Ok(());
        }
        warn!(
            "event=owner_conflict module=tree status=warn child={} previous_parent={} new_parent={}",
            child, previous, new_parent
        );
        let removed = match self.nodes.get_mut(&previous) {
            Some(node) => node.subnodes_mut().remove(child).is_some(),
            None => false,
        };
        self.node_mut(child)?.set_parent_node(None);
        if removed {
            self.release_subnode_slots(previous, child)?;
            self.did_mutate_subnodes(previous)?;
        }
        Ok(())
    }

    /// Clears subnode slots of `parent` that still hold `child`.
    fn release_subnode_slots(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        let Some(type_name) = self.nodes.get(&parent).map(|node| node.type_name().to_string())
        else {
            return Ok(());
        };
        let registry = Arc::clone(&self.registry);
        for slot in registry.all_slots(&type_name)? {
            if !slot.is_subnode() {
                continue;
            }
            let held = self.read_storage(parent, slot.private_storage_key())?;
            if held.as_node().map(|node| node.id) != Some(child) {
                continue;
            }
            if slot.owns_value() {
                self.transfer_ownership(parent, &held, &SlotValue::Null);
            }
            self.write_storage(parent, slot.private_storage_key(), SlotValue::Null)?;
            debug!(
                "event=subnode_slot_released module=tree status=ok parent={} slot={} child={}",
                parent,
                slot.name(),
                child
            );
        }
        Ok(())
    }

    fn clear_parent_if(&mut self, child: NodeId, parent: NodeId) {
        if let Some(node) = self.nodes.get_mut(&child) {
            if node.parent_node() == Some(parent) {
                node.set_parent_node(None);
            }
        }
    }

    fn did_mutate_subnodes(&mut self, parent: NodeId) -> TreeResult<()> {
        self.did_change_subnode_list(parent)?;
        if self.should_store_subnodes(parent)? {
            self.mark_dirty(parent);
        }
        self.did_update_node_if_initialized(parent)
    }
}
