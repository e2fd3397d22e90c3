//! Slot descriptors and the owned node tree.
//!
//! Types are registered in an explicit `TypeRegistry`; instances live in a
//! `NodeTree` arena and are read and written through their slot descriptors.

pub mod logging;
pub mod model;
pub mod notify;
pub mod registry;
pub mod schema;
pub mod slot;
pub mod store;
pub mod tree;

pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::value::{NodeId, NodeRef, SlotValue};
pub use notify::{Notification, NotificationCenter, NotificationName, NotificationObserver};
pub use registry::{
    NodeHooks, RegistryError, RegistryResult, TypeDescriptor, TypeRegistry, BASE_NODE_TYPE,
};
pub use schema::{SchemaError, SchemaResult, SCHEMA_DRAFT_URI};
pub use slot::{
    AccessorKind, DuplicateOp, SlotDescriptor, SlotDescriptorBuilder, SlotError, SlotResult,
    ValidItem, ValidationMode,
};
pub use store::ObjectStore;
pub use tree::{
    ArchiveIssue, ArchiveReport, Node, NodeTree, SubnodeList, TreeConfig, TreeError, TreeResult,
    SUBNODES_SLOT,
};

/// Minimal health-check API for embedding hosts.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
