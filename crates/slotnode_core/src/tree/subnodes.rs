//! Canonical ordered, duplicate-free child collection.

use crate::model::value::NodeId;
use std::collections::HashSet;

/// Ordered unique list of child node ids with an always-current hash index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubnodeList {
    order: Vec<NodeId>,
    index: HashSet<NodeId>,
}

impl SubnodeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a canonical list from raw ids, keeping first occurrences.
    ///
    /// Returns the list and the number of dropped duplicates.
    pub fn from_raw(raw: impl IntoIterator<Item = NodeId>) -> (Self, usize) {
        let mut list = Self::new();
        let mut duplicates = 0;
        for id in raw {
            if !list.push(id) {
                duplicates += 1;
            }
        }
        (list, duplicates)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.index.contains(&id)
    }

    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.order.get(index).copied()
    }

    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        self.order.iter().position(|candidate| *candidate == id)
    }

    pub fn as_slice(&self) -> &[NodeId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<NodeId> {
        self.order.clone()
    }

    pub(crate) fn push(&mut self, id: NodeId) -> bool {
        if !self.index.insert(id) {
            return false;
        }
        self.order.push(id);
        true
    }

    /// Inserts at `index`; callers check bounds first.
    pub(crate) fn insert(&mut self, index: usize, id: NodeId) -> bool {
        if !self.index.insert(id) {
            return false;
        }
        let index = index.min(self.order.len());
        self.order.insert(index, id);
        true
    }

    pub(crate) fn remove(&mut self, id: NodeId) -> Option<usize> {
        if !self.index.remove(&id) {
            return None;
        }
        let position = self.order.iter().position(|candidate| *candidate == id)?;
        self.order.remove(position);
        Some(position)
    }

    pub(crate) fn clear(&mut self) -> Vec<NodeId> {
        self.index.clear();
        std::mem::take(&mut self.order)
    }
}

#[cfg(test)]
mod tests {
    use super::SubnodeList;
    use uuid::Uuid;

    #[test]
    fn from_raw_keeps_first_occurrences() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let (list, duplicates) = SubnodeList::from_raw(vec![a, b, a, b, a]);
        assert_eq!(list.as_slice(), &[a, b]);
        assert_eq!(duplicates, 3);
    }

    #[test]
    fn index_tracks_every_mutation() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let mut list = SubnodeList::new();
        assert!(list.push(a));
        assert!(list.insert(0, b));
        assert!(!list.insert(1, a));
        assert_eq!(list.as_slice(), &[b, a]);

        assert_eq!(list.remove(b), Some(0));
        assert!(!list.contains(b));
        assert_eq!(list.index_of(a), Some(0));
        assert_eq!(list.remove(c), None);

        let cleared = list.clear();
        assert_eq!(cleared, vec![a]);
        assert!(list.is_empty());
        assert!(!list.contains(a));
    }
}
