//! Change propagation, deferred reorder passes and shutdown.
//!
//! # Invariants
//! - `didUpdateNode` is posted synchronously and bubbles up through
//!   initialized ancestors.
//! - Reorder passes are queued at most once per node until they run.
//! - Shut-down nodes post nothing.

use super::{NodeTree, TreeResult};
use crate::model::value::{NodeId, SlotValue};
use crate::notify::{Notification, NotificationName};
use log::{debug, warn};
use std::collections::HashSet;

impl NodeTree {
    /// Posts `didUpdateNode` for `id` and each initialized ancestor.
    pub fn did_update_node(&mut self, id: NodeId) -> TreeResult<()> {
        let mut visited = HashSet::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if !visited.insert(current) {
                break;
            }
            let node = self.node(current)?;
            if node.is_shut_down() {
                break;
            }
            let parent = node.parent_node();
            self.notifications.post(Notification {
                name: NotificationName::DidUpdateNode,
                sender: current,
                payload: None,
            });
            cursor = match parent {
                Some(parent) if self.node(parent)?.is_initialized() => Some(parent),
                _ => None,
            };
        }
        Ok(())
    }

    /// Same as `did_update_node`, but silent while `id` is being built.
    pub fn did_update_node_if_initialized(&mut self, id: NodeId) -> TreeResult<()> {
        if self.node(id)?.is_initialized() {
            self.did_update_node(id)?;
        }
        Ok(())
    }

    /// Asks observers to focus `subnode` inside `parent`.
    pub fn should_focus_subnode(&mut self, parent: NodeId, subnode: NodeId) -> TreeResult<()> {
        self.post_focus(NotificationName::ShouldFocusSubnode, parent, subnode)
    }

    pub fn should_focus_and_expand_subnode(
        &mut self,
        parent: NodeId,
        subnode: NodeId,
    ) -> TreeResult<()> {
        self.post_focus(NotificationName::ShouldFocusAndExpandSubnode, parent, subnode)
    }

    fn post_focus(
        &mut self,
        name: NotificationName,
        parent: NodeId,
        subnode: NodeId,
    ) -> TreeResult<()> {
        self.node(subnode)?;
        if self.node(parent)?.is_shut_down() {
            return Ok(());
        }
        self.notifications.post(Notification {
            name,
            sender: parent,
            payload: Some(subnode),
        });
        Ok(())
    }

    /// Queues a reorder pass for `parent`. Repeated calls collapse into one.
    pub fn did_change_subnode_list(&mut self, parent: NodeId) -> TreeResult<()> {
        self.node(parent)?;
        if self.scheduled_set.insert(parent) {
            self.scheduled.push_back(parent);
        }
        Ok(())
    }

    pub fn has_scheduled_work(&self) -> bool {
        !self.scheduled.is_empty()
    }

    pub fn is_scheduled(&self, parent: NodeId) -> bool {
        self.scheduled_set.contains(&parent)
    }

    /// Runs queued reorder passes. Returns how many ran.
    ///
    /// Passes queued while running are picked up in the same call, up to
    /// `TreeConfig::max_scheduled_passes`.
    pub fn run_scheduled(&mut self) -> TreeResult<usize> {
        let limit = self.config.max_scheduled_passes;
        let mut passes = 0;
        while passes < limit {
            let Some(parent) = self.scheduled.pop_front() else {
                break;
            };
            self.scheduled_set.remove(&parent);
            match self.nodes.get(&parent) {
                Some(node) if !node.is_shut_down() => {}
                _ => continue,
            }
            self.on_did_reorder_subnodes(parent)?;
            passes += 1;
        }
        if !self.scheduled.is_empty() {
            warn!(
                "event=scheduled_passes_capped module=tree status=warn ran={} pending={}",
                passes,
                self.scheduled.len()
            );
        }
        Ok(passes)
    }

    /// Calls each child's type-level reorder hook.
    pub fn on_did_reorder_subnodes(&mut self, parent: NodeId) -> TreeResult<()> {
        let children = self.node(parent)?.subnodes().to_vec();
        for child in children {
            let Some(node) = self.nodes.get(&child) else {
                continue;
            };
            let type_name = node.type_name().to_string();
            if let Some(hook) = self.registry.reorder_hook(&type_name)? {
                hook(self, child);
            }
        }
        Ok(())
    }

    /// Shuts down `id`, its subnodes and owned slot values.
    ///
    /// Returns how many nodes were shut down by this call.
    pub fn node_shutdown(&mut self, id: NodeId) -> TreeResult<usize> {
        self.node(id)?;
        let reached = self.owned_closure(id)?;
        let mut count = 0;
        for node_id in reached {
            if let Some(node) = self.nodes.get_mut(&node_id) {
                if !node.is_shut_down() {
                    node.mark_shut_down();
                    count += 1;
                }
            }
        }
        debug!(
            "event=node_shutdown module=tree status=ok root={} nodes={}",
            id, count
        );
        Ok(count)
    }

    /// Detaches `id` and drops it with everything it owns from the arena.
    pub(crate) fn discard_subtree(&mut self, id: NodeId) -> TreeResult<()> {
        self.remove_from_parent_node(id)?;
        for node_id in self.owned_closure(id)? {
            self.nodes.remove(&node_id);
            if self.scheduled_set.remove(&node_id) {
                self.scheduled.retain(|queued| *queued != node_id);
            }
        }
        Ok(())
    }

    /// `id` plus every node reachable through subnodes and owned slot values.
    fn owned_closure(&self, id: NodeId) -> TreeResult<Vec<NodeId>> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            order.push(current);
            stack.extend(node.subnodes().iter());
            for slot in self.registry.all_slots(node.type_name())? {
                if !slot.owns_value() {
                    continue;
                }
                if let Some(SlotValue::Node(value)) = node.storage(slot.private_storage_key()) {
                    if self.nodes.get(&value.id).and_then(|owned| owned.owner_node())
                        == Some(current)
                    {
                        stack.push(value.id);
                    }
                }
            }
        }
        Ok(order)
    }
}
