use slotnode_core::{NodeId, NodeTree, SlotValue, TreeError, TypeDescriptor, TypeRegistry};
use std::collections::HashSet;
use std::sync::Arc;

fn setup() -> NodeTree {
    let mut registry = TypeRegistry::with_base_node_type().unwrap();
    registry
        .register(TypeDescriptor::new("TypeX").with_description("Accepted child."))
        .unwrap();
    registry
        .register(
            TypeDescriptor::new("TypeXPrime")
                .with_parent("TypeX")
                .with_description("Accepted child subtype."),
        )
        .unwrap();
    registry
        .register(TypeDescriptor::new("TypeY").with_description("Rejected child."))
        .unwrap();
    registry
        .register(
            TypeDescriptor::new("Holder")
                .with_description("Holds TypeX children.")
                .with_subnode_class("TypeX"),
        )
        .unwrap();
    NodeTree::new(Arc::new(registry))
}

fn node_ref(tree: &NodeTree, id: NodeId) -> SlotValue {
    SlotValue::Node(tree.node_ref(id).unwrap())
}

fn assert_consistent(tree: &NodeTree, ids: &[NodeId]) {
    for id in ids {
        let node = tree.node(*id).unwrap();
        if let Some(parent) = node.parent_node() {
            assert!(
                tree.has_subnode(parent, *id).unwrap(),
                "parent {parent} does not list child {id}"
            );
        }
        let children = node.subnodes().to_vec();
        let unique: HashSet<_> = children.iter().copied().collect();
        assert_eq!(unique.len(), children.len(), "duplicate subnodes under {id}");
        assert!(!unique.contains(id), "node {id} is its own subnode");
        for child in children {
            assert_eq!(tree.node(child).unwrap().parent_node(), Some(*id));
        }
    }
}

#[test]
fn disallowed_subnode_type_is_rejected() {
    let mut tree = setup();
    let holder = tree.instantiate("Holder").unwrap();
    let x = tree.instantiate("TypeX").unwrap();
    let x_prime = tree.instantiate("TypeXPrime").unwrap();
    let y = tree.instantiate("TypeY").unwrap();

    tree.add_subnode(holder, x).unwrap();
    tree.add_subnode(holder, x_prime).unwrap();
    let err = tree.add_subnode(holder, y).unwrap_err();

    assert_eq!(
        err,
        TreeError::InvalidSubnodeType {
            parent: holder,
            type_name: "TypeY".to_string(),
        }
    );
    assert_eq!(tree.node(y).unwrap().parent_node(), None);
    assert_eq!(tree.subnode_count(holder).unwrap(), 2);
}

#[test]
fn removed_subnode_loses_parent() {
    let mut tree = setup();
    let parent = tree.instantiate("Node").unwrap();
    let child = tree.instantiate("Node").unwrap();
    tree.add_subnode(parent, child).unwrap();

    tree.remove_subnode(parent, child).unwrap();

    assert_eq!(tree.node(child).unwrap().parent_node(), None);
    assert!(!tree.has_subnode(parent, child).unwrap());
    assert_eq!(
        tree.remove_subnode(parent, child).unwrap_err(),
        TreeError::SubnodeNotFound { parent, child }
    );
}

#[test]
fn raw_subnode_list_is_normalized() {
    let mut tree = setup();
    let parent = tree.instantiate("Node").unwrap();
    let a = tree.instantiate("Node").unwrap();
    let b = tree.instantiate("Node").unwrap();
    let c = tree.instantiate("Node").unwrap();

    let raw = SlotValue::List(vec![
        node_ref(&tree, a),
        node_ref(&tree, b),
        node_ref(&tree, a),
        SlotValue::from("not a node"),
        node_ref(&tree, c),
        node_ref(&tree, b),
    ]);
    tree.set_slot(parent, "subnodes", raw).unwrap();

    assert_eq!(tree.node(parent).unwrap().subnodes().as_slice(), &[a, b, c]);
    assert!(tree.is_scheduled(parent));
    assert_consistent(&tree, &[parent, a, b, c]);
    assert_eq!(
        tree.get_slot(parent, "subnodes").unwrap(),
        SlotValue::List(vec![node_ref(&tree, a), node_ref(&tree, b), node_ref(&tree, c)])
    );
}

#[test]
fn duplicate_add_is_rejected() {
    let mut tree = setup();
    let parent = tree.instantiate("Node").unwrap();
    let child = tree.instantiate("Node").unwrap();
    tree.add_subnode(parent, child).unwrap();

    assert_eq!(
        tree.add_subnode(parent, child).unwrap_err(),
        TreeError::DuplicateSubnode { parent, child }
    );
    assert_eq!(tree.add_subnode(parent, parent).unwrap_err(), TreeError::SelfSubnode(parent));
    assert_eq!(tree.subnode_count(parent).unwrap(), 1);
}

#[test]
fn set_parent_node_moves_between_parents() {
    let mut tree = setup();
    let first = tree.instantiate("Node").unwrap();
    let second = tree.instantiate("Node").unwrap();
    let child = tree.instantiate("Node").unwrap();

    tree.set_parent_node(child, Some(first)).unwrap();
    tree.set_parent_node(child, Some(second)).unwrap();
    assert_consistent(&tree, &[first, second, child]);
    assert!(!tree.has_subnode(first, child).unwrap());

    tree.set_parent_node(child, None).unwrap();
    assert_eq!(tree.node(child).unwrap().parent_node(), None);
    assert_eq!(tree.subnode_count(second).unwrap(), 0);
}

#[test]
fn mutation_sequence_keeps_back_references() {
    let mut tree = setup();
    let ids: Vec<NodeId> = (0..8).map(|_| tree.instantiate("Node").unwrap()).collect();

    let mut seed: u64 = 0x5eed;
    let mut next = |bound: usize| {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((seed >> 33) as usize) % bound
    };

    for _ in 0..300 {
        let parent = ids[next(ids.len())];
        let child = ids[next(ids.len())];
        let _ = match next(6) {
            0 => tree.add_subnode(parent, child),
            1 => tree.remove_from_parent_node(child).map(|_| ()),
            2 => {
                let index = next(4);
                tree.add_subnode_at(parent, child, index)
            }
            3 => tree.order_subnode_first(parent, child),
            4 => {
                let other = ids[next(ids.len())];
                tree.replace_subnode_with(parent, child, other)
            }
            _ => tree.edit_subnodes(parent, |raw| {
                raw.push(child);
                raw.push(child);
            }),
        };
        assert_consistent(&tree, &ids);
    }
}

#[test]
fn duplicate_node_deep_copies_subnodes() {
    let mut tree = setup();
    let root = tree.instantiate("Node").unwrap();
    let child = tree.instantiate("Node").unwrap();
    tree.set_slot(root, "title", "Root").unwrap();
    tree.set_slot(child, "title", "Child").unwrap();
    tree.add_subnode(root, child).unwrap();

    let copy = tree.duplicate_node(root).unwrap();

    assert_ne!(copy, root);
    assert_eq!(tree.get_slot(copy, "title").unwrap(), SlotValue::from("Root"));
    let copied_child = tree.subnode_at(copy, 0).unwrap().expect("copied child");
    assert_ne!(copied_child, child);
    assert_eq!(tree.get_slot(copied_child, "title").unwrap(), SlotValue::from("Child"));
    assert_eq!(tree.node(child).unwrap().parent_node(), Some(root));
    assert_consistent(&tree, &[root, child, copy, copied_child]);
}

#[test]
fn missing_nodes_are_reported() {
    let mut tree = setup();
    let parent = tree.instantiate("Node").unwrap();
    let ghost = uuid::Uuid::new_v4();

    assert_eq!(tree.add_subnode(parent, ghost).unwrap_err(), TreeError::NodeNotFound(ghost));
    assert_eq!(tree.node(ghost).unwrap_err(), TreeError::NodeNotFound(ghost));
}
