//! Persistence collaborator contract.
//!
//! The tree never performs I/O. Storage policy comes from slot descriptors
//! (`should_store_slot_on_instance`) and node overrides; the store is only
//! told which instances changed in stored slots.

use crate::model::value::NodeId;

/// External object store notified about writes to stored slots.
pub trait ObjectStore: Send + Sync {
    /// Marks `node` dirty after a stored slot or stored subnode list changed.
    fn did_mutate_instance(&self, node: NodeId);
}
