//! JSON archive of node subtrees.
//!
//! # Responsibility
//! - Write `{ "type": <TypeName>, <slot>: value, ... }` for archived slots.
//! - Rebuild nodes by replaying archived keys through slot setters.
//!
//! # Invariants
//! - `json_archive(from_json_archive(a)) == a` for archives written here.
//! - Unknown keys never abort a restore; they are logged and reported.

use super::{NodeTree, TreeError, TreeResult, SUBNODES_SLOT};
use crate::model::value::{NodeId, SlotValue};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Key holding the type name of an archived node.
pub const TYPE_KEY: &str = "type";

/// Non-fatal problem found while restoring an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArchiveIssue {
    /// Key matches no slot of the archived type.
    UnknownKey { type_name: String, key: String },
    /// Required slot absent from the archive.
    MissingRequiredSlot { type_name: String, slot: String },
    /// Child archive could not be attached and was dropped.
    RejectedSubnode { parent_type: String, reason: String },
}

/// Restored node plus every issue met on the way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveReport {
    pub node: NodeId,
    pub issues: Vec<ArchiveIssue>,
}

impl ArchiveReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestoreMode {
    /// Child problems fail the restore.
    Archive,
    /// Child problems are reported and the child is dropped.
    Schema,
}

/// Bookkeeping of one restore call.
struct RestoreState {
    mode: RestoreMode,
    issues: Vec<ArchiveIssue>,
    /// Every node instantiated so far, in creation order.
    created: Vec<NodeId>,
}

impl RestoreState {
    fn new(mode: RestoreMode) -> Self {
        Self {
            mode,
            issues: Vec::new(),
            created: Vec::new(),
        }
    }
}

impl NodeTree {
    /// Archives `id` with its archived slots and subnodes.
    pub fn json_archive(&self, id: NodeId) -> TreeResult<Value> {
        let mut visited = HashSet::new();
        self.archive_node(id, &mut visited)
    }

    fn archive_node(&self, id: NodeId, visited: &mut HashSet<NodeId>) -> TreeResult<Value> {
        let type_name = self.node(id)?.type_name().to_string();
        if !visited.insert(id) {
            warn!(
                "event=archive_cycle_skipped module=archive status=warn node={} type={}",
                id, type_name
            );
            return Ok(Value::Null);
        }

        let slots = self.registry().all_slots(&type_name)?;
        // children held by subnode slots are archived once, under their slot
        let slot_children = self.subnode_slot_children(id)?;

        let mut object = Map::new();
        object.insert(TYPE_KEY.to_string(), Value::String(type_name.clone()));
        for slot in &slots {
            if !slot.should_json_archive() {
                continue;
            }
            let mut value = self.get_slot(id, slot.name())?;
            if slot.name() == SUBNODES_SLOT {
                if let SlotValue::List(items) = &mut value {
                    items.retain(|item| {
                        item.as_node()
                            .map_or(true, |child| !slot_children.contains(&child.id))
                    });
                }
            }
            object.insert(slot.name().to_string(), self.archive_value(&value, visited)?);
        }
        visited.remove(&id);
        Ok(Value::Object(object))
    }

    fn archive_value(&self, value: &SlotValue, visited: &mut HashSet<NodeId>) -> TreeResult<Value> {
        match value {
            SlotValue::Node(node) => self.archive_node(node.id, visited),
            SlotValue::List(items) => {
                let mut archived = Vec::with_capacity(items.len());
                for item in items {
                    archived.push(self.archive_value(item, visited)?);
                }
                Ok(Value::Array(archived))
            }
            SlotValue::Map(entries) => {
                let mut archived = Map::new();
                for (key, item) in entries {
                    archived.insert(key.clone(), self.archive_value(item, visited)?);
                }
                Ok(Value::Object(archived))
            }
            other => Ok(other.to_json().unwrap_or(Value::Null)),
        }
    }

    /// Rebuilds a node from an archive written by `json_archive`.
    ///
    /// On failure every node created by this call is removed again.
    ///
    /// # Errors
    /// - `InvalidArchive` when the payload is not an object with a `type`.
    /// - `MissingTypeDescriptor` when the type is not registered.
    /// - Any setter or subnode error met while replaying keys.
    pub fn from_json_archive(&mut self, archive: &Value) -> TreeResult<NodeId> {
        let mut state = RestoreState::new(RestoreMode::Archive);
        self.restore(archive, &mut state)
    }

    /// Rebuilds a node from schema-shaped JSON, collecting issues.
    ///
    /// Children are rebuilt from their own `type`; children the parent does
    /// not accept are dropped and reported. Missing required slots are
    /// reported, not fatal.
    pub fn from_json_schema(&mut self, json: &Value) -> TreeResult<ArchiveReport> {
        let mut state = RestoreState::new(RestoreMode::Schema);
        let node = self.restore(json, &mut state)?;
        Ok(ArchiveReport {
            node,
            issues: state.issues,
        })
    }

    fn restore(&mut self, archive: &Value, state: &mut RestoreState) -> TreeResult<NodeId> {
        let mark = state.created.len();
        match self.restore_node(archive, state) {
            Ok(id) => Ok(id),
            Err(err) => {
                self.discard_restored(state, mark)?;
                Err(err)
            }
        }
    }

    fn restore_node(&mut self, archive: &Value, state: &mut RestoreState) -> TreeResult<NodeId> {
        let object = archive
            .as_object()
            .ok_or_else(|| TreeError::InvalidArchive("expected a JSON object".to_string()))?;
        let type_name = object
            .get(TYPE_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| TreeError::InvalidArchive("missing string `type` key".to_string()))?;

        // archived values replace initial protos, so those are never built
        let supplied: HashSet<String> = object
            .keys()
            .filter(|key| key.as_str() != TYPE_KEY)
            .cloned()
            .collect();
        let id = self.instantiate_supplied(type_name, &supplied)?;
        state.created.push(id);
        self.restore_fields(id, type_name, object, state)?;
        Ok(id)
    }

    /// Drops every node created since `mark`, newest first.
    fn discard_restored(&mut self, state: &mut RestoreState, mark: usize) -> TreeResult<()> {
        let created: Vec<NodeId> = state.created.drain(mark..).rev().collect();
        for id in created {
            if self.contains(id) {
                self.discard_subtree(id)?;
            }
        }
        Ok(())
    }

    fn restore_fields(
        &mut self,
        id: NodeId,
        type_name: &str,
        object: &Map<String, Value>,
        state: &mut RestoreState,
    ) -> TreeResult<()> {
        let slots = self.registry().all_slots(type_name)?;
        for (key, _) in object.iter().filter(|(key, _)| key.as_str() != TYPE_KEY) {
            if !slots.iter().any(|slot| slot.name() == key.as_str()) {
                warn!(
                    "event=archive_key_unknown module=archive status=warn type={} key={}",
                    type_name, key
                );
                state.issues.push(ArchiveIssue::UnknownKey {
                    type_name: type_name.to_string(),
                    key: key.clone(),
                });
            }
        }

        for slot in &slots {
            let Some(json) = object.get(slot.name()) else {
                if state.mode == RestoreMode::Schema && slot.is_required() {
                    warn!(
                        "event=archive_required_slot_missing module=archive status=warn type={} slot={}",
                        type_name,
                        slot.name()
                    );
                    state.issues.push(ArchiveIssue::MissingRequiredSlot {
                        type_name: type_name.to_string(),
                        slot: slot.name().to_string(),
                    });
                }
                continue;
            };
            if slot.name() == SUBNODES_SLOT {
                let children = self.restore_subnodes(id, type_name, json, state)?;
                self.set_subnodes(id, children)?;
                continue;
            }
            let value = self.restore_value(json, state)?;
            self.set_slot(id, slot.name(), value)?;
        }
        Ok(())
    }

    fn restore_subnodes(
        &mut self,
        parent: NodeId,
        parent_type: &str,
        json: &Value,
        state: &mut RestoreState,
    ) -> TreeResult<Vec<NodeId>> {
        let Some(entries) = json.as_array() else {
            return Err(TreeError::InvalidArchive(format!(
                "`{SUBNODES_SLOT}` of {parent_type} must be an array"
            )));
        };

        let mut children = Vec::with_capacity(entries.len());
        for entry in entries {
            match self.restore_subnode(parent, entry, state) {
                Ok(child) => children.push(child),
                Err(err) if state.mode == RestoreMode::Schema => {
                    self.reject_subnode(parent_type, err.to_string(), state);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(children)
    }

    fn restore_subnode(
        &mut self,
        parent: NodeId,
        entry: &Value,
        state: &mut RestoreState,
    ) -> TreeResult<NodeId> {
        let mark = state.created.len();
        let child = self.restore(entry, state)?;
        if let Err(err) = self.check_subnode_class(parent, child) {
            self.discard_restored(state, mark)?;
            return Err(err);
        }
        Ok(child)
    }

    fn reject_subnode(&self, parent_type: &str, reason: String, state: &mut RestoreState) {
        warn!(
            "event=archive_subnode_rejected module=archive status=warn parent_type={} reason={}",
            parent_type, reason
        );
        state.issues.push(ArchiveIssue::RejectedSubnode {
            parent_type: parent_type.to_string(),
            reason,
        });
    }

    fn restore_value(&mut self, json: &Value, state: &mut RestoreState) -> TreeResult<SlotValue> {
        match json {
            Value::Object(object) if self.is_node_archive(object) => {
                let id = self.restore(json, state)?;
                Ok(SlotValue::Node(self.node_ref(id)?))
            }
            Value::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.restore_value(item, state)?);
                }
                Ok(SlotValue::List(values))
            }
            Value::Object(object) => {
                let mut entries = std::collections::BTreeMap::new();
                for (key, item) in object {
                    entries.insert(key.clone(), self.restore_value(item, state)?);
                }
                Ok(SlotValue::Map(entries))
            }
            other => Ok(SlotValue::from_json(other)),
        }
    }

    fn is_node_archive(&self, object: &Map<String, Value>) -> bool {
        object
            .get(TYPE_KEY)
            .and_then(Value::as_str)
            .is_some_and(|type_name| self.registry().contains(type_name))
    }
}
