//! Dynamic value model shared by slots, nodes and archives.
//!
//! # Invariants
//! - Node values are references (`NodeRef`); the owning `NodeTree` holds
//!   the node records.

pub mod value;
