extern crate std;

use core::fmt::Write;
use std::{collections::BTreeSet, ops::Range, prelude::v1::*};

use proptest::prelude::*;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::model::{self, TestNode};

use super::*;

fn build(keys: &[u32]) -> AvlTree<TestNode> {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in keys {
        assert!(tree.insert(TestNode::new(key)).is_ok(), "{key} inserted twice");
        tree.assert_invariants();
    }

    tree
}

fn keys<'a>(iter: impl Iterator<Item = &'a TestNode>) -> Vec<u32> {
    iter.map(|node| node.key).collect()
}

// Renders the tree as `key(left,right)`, with `-` for a missing child.
fn shape(tree: &AvlTree<TestNode>) -> String {
    fn render(node: Link<TestNode>, out: &mut String) {
        let Some(node) = node else {
            out.push('-');
            return;
        };

        unsafe {
            write!(out, "{}", node.as_ref().key).unwrap();

            let (left, right) = (links(node).left(), links(node).right());
            if left.is_some() || right.is_some() {
                out.push('(');
                render(left, out);
                out.push(',');
                render(right, out);
                out.push(')');
            }
        }
    }

    let mut out = String::new();
    render(tree.root, &mut out);
    out
}

fn balance_of(tree: &AvlTree<TestNode>, key: u32) -> i8 {
    let node = tree
        .find_raw(&mut |node: &TestNode| key.cmp(&node.key))
        .expect("item not found");
    unsafe { links(node).balance() }
}

fn insert_find_all(keys: &[u32]) {
    let tree = build(keys);

    for key in keys {
        let node = tree.get(key).expect("item not found");
        assert_eq!(node.key, *key);
    }
}

#[test]
fn zero_elems_find() {
    insert_find_all(&[]);
}

#[test]
fn single_elem_find() {
    insert_find_all(&[0]);
}

#[test]
fn two_elems_find() {
    insert_find_all(&[0, 1]);
    insert_find_all(&[1, 0]);
}

#[test]
fn three_elems_find() {
    insert_find_all(&[0, 1, 2]);
    insert_find_all(&[0, 2, 1]);
    insert_find_all(&[1, 0, 2]);
    insert_find_all(&[1, 2, 0]);
    insert_find_all(&[2, 0, 1]);
    insert_find_all(&[2, 1, 0]);
}

#[test]
fn four_elems_find() {
    insert_find_all(&[0, 1, 2, 3]);
    insert_find_all(&[0, 1, 3, 2]);
    insert_find_all(&[0, 2, 1, 3]);
    insert_find_all(&[0, 2, 3, 1]);
    insert_find_all(&[0, 3, 1, 2]);
    insert_find_all(&[0, 3, 2, 1]);

    insert_find_all(&[1, 0, 2, 3]);
    insert_find_all(&[1, 0, 3, 2]);
    insert_find_all(&[1, 2, 0, 3]);
    insert_find_all(&[1, 2, 3, 0]);
    insert_find_all(&[1, 3, 0, 2]);
    insert_find_all(&[1, 3, 2, 0]);

    insert_find_all(&[2, 0, 1, 3]);
    insert_find_all(&[2, 0, 3, 1]);
    insert_find_all(&[2, 1, 0, 3]);
    insert_find_all(&[2, 1, 3, 0]);
    insert_find_all(&[2, 3, 0, 1]);
    insert_find_all(&[2, 3, 1, 0]);

    insert_find_all(&[3, 0, 1, 2]);
    insert_find_all(&[3, 0, 2, 1]);
    insert_find_all(&[3, 1, 0, 2]);
    insert_find_all(&[3, 1, 2, 0]);
    insert_find_all(&[3, 2, 0, 1]);
    insert_find_all(&[3, 2, 1, 0]);
}

fn insert_remove_all(keys: &[u32]) {
    let mut tree = build(keys);

    for key in keys {
        let node = tree.remove(key).expect("item not found");
        assert!(node.links.is_unlinked());
        tree.assert_invariants();
    }

    assert!(tree.is_empty());

    for &key in keys {
        assert!(tree.insert(TestNode::new(key)).is_ok());
        tree.assert_invariants();
    }

    for key in keys.iter().rev() {
        assert!(tree.remove(key).is_some());
        tree.assert_invariants();
    }

    assert!(tree.root.is_none());
}

#[test]
fn remove_one() {
    insert_remove_all(&[0]);
}

#[test]
fn remove_two() {
    insert_remove_all(&[0, 1]);
    insert_remove_all(&[1, 0]);
}

#[test]
fn remove_three() {
    insert_remove_all(&[0, 1, 2]);
    insert_remove_all(&[0, 2, 1]);
    insert_remove_all(&[1, 0, 2]);
    insert_remove_all(&[1, 2, 0]);
    insert_remove_all(&[2, 0, 1]);
    insert_remove_all(&[2, 1, 0]);
}

#[test]
fn remove_four() {
    insert_remove_all(&[0, 1, 2, 3]);
    insert_remove_all(&[0, 1, 3, 2]);
    insert_remove_all(&[0, 2, 1, 3]);
    insert_remove_all(&[0, 2, 3, 1]);
    insert_remove_all(&[0, 3, 1, 2]);
    insert_remove_all(&[0, 3, 2, 1]);

    insert_remove_all(&[1, 0, 2, 3]);
    insert_remove_all(&[1, 0, 3, 2]);
    insert_remove_all(&[1, 2, 0, 3]);
    insert_remove_all(&[1, 2, 3, 0]);
    insert_remove_all(&[1, 3, 0, 2]);
    insert_remove_all(&[1, 3, 2, 0]);

    insert_remove_all(&[2, 0, 1, 3]);
    insert_remove_all(&[2, 0, 3, 1]);
    insert_remove_all(&[2, 1, 0, 3]);
    insert_remove_all(&[2, 1, 3, 0]);
    insert_remove_all(&[2, 3, 0, 1]);
    insert_remove_all(&[2, 3, 1, 0]);

    insert_remove_all(&[3, 0, 1, 2]);
    insert_remove_all(&[3, 0, 2, 1]);
    insert_remove_all(&[3, 1, 0, 2]);
    insert_remove_all(&[3, 1, 2, 0]);
    insert_remove_all(&[3, 2, 0, 1]);
    insert_remove_all(&[3, 2, 1, 0]);
}

#[test]
fn balanced_seven() {
    let tree = build(&[5, 3, 8, 1, 4, 7, 9]);

    assert_eq!(shape(&tree), "5(3(1,4),8(7,9))");
    for key in [5, 3, 8, 1, 4, 7, 9] {
        assert_eq!(balance_of(&tree, key), 0);
    }

    assert_eq!(keys(tree.iter()), [1, 3, 4, 5, 7, 8, 9]);
    assert_eq!(keys(tree.iter_rev()), [9, 8, 7, 5, 4, 3, 1]);
    assert_eq!(keys(tree.postorder()), [1, 4, 3, 7, 9, 8, 5]);
}

#[test]
fn remove_root_promotes_successor() {
    let mut tree = build(&[5, 3, 8, 1, 4, 7, 9]);

    let removed = tree.remove(&5).expect("item not found");
    assert_eq!(removed.key, 5);
    tree.assert_invariants();

    assert_eq!(tree.root().map(|root| root.key), Some(7));
    assert_eq!(shape(&tree), "7(3(1,4),8(-,9))");
    assert_eq!(balance_of(&tree, 7), 0);
    assert_eq!(balance_of(&tree, 8), 1);
    assert_eq!(keys(tree.iter()), [1, 3, 4, 7, 8, 9]);
}

#[test]
fn remove_successor_is_right_child() {
    let mut tree = build(&[2, 1, 3, 4]);

    assert!(tree.remove(&2).is_some());
    tree.assert_invariants();
    assert_eq!(shape(&tree), "3(1,4)");
}

#[test]
fn ascending_insert_rotates_left() {
    let tree = build(&[1, 2, 3]);

    assert_eq!(shape(&tree), "2(1,3)");
    for key in [1, 2, 3] {
        assert_eq!(balance_of(&tree, key), 0);
    }
}

#[test]
fn descending_insert_rotates_right() {
    let tree = build(&[3, 2, 1]);

    assert_eq!(shape(&tree), "2(1,3)");
}

#[test]
fn zigzag_insert_rotates_twice() {
    assert_eq!(shape(&build(&[1, 3, 2])), "2(1,3)");
    assert_eq!(shape(&build(&[3, 1, 2])), "2(1,3)");

    // Double rotation with subtrees to hand over.
    let tree = build(&[50, 20, 80, 10, 30, 25]);
    assert_eq!(shape(&tree), "30(20(10,25),50(-,80))");
    assert_eq!(balance_of(&tree, 50), 1);
    assert_eq!(balance_of(&tree, 20), 0);
}

#[test]
fn removal_rotates_more_than_once() {
    // A minimal AVL tree of height 4 leaning left; removing its rightmost leaf forces rotations
    // at two levels.
    let mut tree = build(&[8, 5, 11, 3, 7, 10, 12, 2, 4, 6, 9, 1]);

    assert!(tree.remove(&12).is_some());
    tree.assert_invariants();
    assert_eq!(keys(tree.iter()), [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
}

#[test]
fn duplicate_is_rejected() {
    let mut tree = build(&[2, 1, 3]);
    let before = shape(&tree);

    let dup = tree.insert(TestNode::new(1)).unwrap_err();
    assert_eq!(dup.existing().key, 1);
    assert_eq!(std::format!("{dup}"), "an equal element is already in the tree");

    let rejected = dup.into_item();
    assert_eq!(rejected.key, 1);
    assert!(rejected.links.is_unlinked());

    assert_eq!(shape(&tree), before);
    assert_eq!(tree.len(), 3);
    assert_eq!(keys(tree.iter()), [1, 2, 3]);
}

#[test]
fn links_track_membership() {
    let mut tree = build(&[10, 20]);

    assert!(!tree.get(&10).unwrap().links.is_unlinked());

    let mut node = tree.remove(&10).unwrap();
    assert!(node.links.is_unlinked());

    // Removed nodes may go straight back in.
    node.key = 30;
    assert!(tree.insert(node).is_ok());
    tree.assert_invariants();
    assert_eq!(keys(tree.iter()), [20, 30]);

    let mut links: Links<TestNode> = Links::default();
    assert!(links.is_unlinked());
    links.mark_unlinked();
    assert!(links.is_unlinked());
}

#[test]
fn parent_links() {
    let tree = build(&[5, 3, 8, 1]);

    unsafe {
        let one = tree.get(&1).unwrap();
        assert_eq!(tree.parent_of(&one).map(|p| p.key), Some(3));

        let root = tree.root().unwrap();
        assert!(tree.parent_of(&root).is_none());
    }
}

#[test]
fn custom_comparator() {
    let mut tree: AvlTree<TestNode> = AvlTree::new();
    let descending = |a: &TestNode, b: &TestNode| b.key.cmp(&a.key);

    for key in [4, 9, 1, 7, 3] {
        assert!(tree.insert_by(TestNode::new(key), descending).is_ok());
        tree.assert_invariants();
    }

    assert!(tree.insert_by(TestNode::new(7), descending).is_err());
    assert_eq!(keys(tree.iter()), [9, 7, 4, 3, 1]);

    let probe = TestNode::new(3);
    assert_eq!(tree.find_node_by(&probe, descending).map(|n| n.key), Some(3));
    assert_eq!(tree.find_by(|node| node.key.cmp(&4)).map(|n| n.key), Some(4));
    assert!(tree.find_by(|node| node.key.cmp(&5)).is_none());

    assert_eq!(tree.remove_by(|node| node.key.cmp(&9)).map(|n| n.key), Some(9));
    tree.assert_invariants();
    assert_eq!(keys(tree.iter()), [7, 4, 3, 1]);
}

#[test]
fn first_last_pop() {
    let mut tree = build(&[5, 3, 8, 1, 4, 7, 9]);

    assert_eq!(tree.first().map(|n| n.key), Some(1));
    assert_eq!(tree.last().map(|n| n.key), Some(9));

    assert_eq!(tree.pop_first().map(|n| n.key), Some(1));
    assert_eq!(tree.pop_last().map(|n| n.key), Some(9));
    tree.assert_invariants();
    assert_eq!(keys(tree.iter()), [3, 4, 5, 7, 8]);

    let mut empty: AvlTree<TestNode> = AvlTree::new();
    assert!(empty.first().is_none());
    assert!(empty.pop_last().is_none());
    assert_eq!(empty.iter().count(), 0);
    assert_eq!(empty.postorder().count(), 0);
}

#[test]
fn traversal_steps_from_any_node() {
    let tree = build(&(0..64).collect::<Vec<_>>());

    for key in 0..64u32 {
        let node = tree
            .find_raw(&mut |node: &TestNode| key.cmp(&node.key))
            .unwrap();

        unsafe {
            let next = traverse::next_in_order(node).map(|n| n.as_ref().key);
            let prev = traverse::prev_in_order(node).map(|n| n.as_ref().key);

            assert_eq!(next, key.checked_add(1).filter(|&k| k < 64));
            assert_eq!(prev, key.checked_sub(1));
        }
    }
}

#[test]
fn entry_api() {
    let mut tree = build(&[2, 4]);

    match tree.entry(&3) {
        Entry::Vacant(entry) => assert_eq!(entry.insert(TestNode::new(3)).key, 3),
        Entry::Occupied(_) => panic!("3 is not in the tree"),
    }
    tree.assert_invariants();

    match tree.entry(&4) {
        Entry::Occupied(mut entry) => {
            let old = entry.replace(TestNode::new(4));
            assert!(old.links.is_unlinked());
            assert_eq!(entry.get().key, 4);
        }
        Entry::Vacant(_) => panic!("4 is in the tree"),
    }
    tree.assert_invariants();

    assert!(tree.entry(&2).is_occupied());
    if let Entry::Occupied(entry) = tree.entry(&2) {
        assert_eq!(entry.remove().key, 2);
    }
    tree.assert_invariants();
    assert_eq!(keys(tree.iter()), [3, 4]);
}

#[test]
fn cursor_restarts_anywhere() {
    let tree = build(&[10, 20, 30, 40]);

    let mut cursor = tree.cursor_at_by(|node| 30.cmp(&node.key));
    assert_eq!(cursor.get().map(|n| n.key), Some(30));
    assert_eq!(cursor.peek_prev().map(|n| n.key), Some(20));

    cursor.move_next();
    assert_eq!(cursor.get().map(|n| n.key), Some(40));
    cursor.move_next();
    assert!(cursor.get().is_none());
    cursor.move_next();
    assert_eq!(cursor.get().map(|n| n.key), Some(10));

    let ghost = tree.cursor_at_by(|node| 25.cmp(&node.key));
    assert!(ghost.get().is_none());
    assert_eq!(ghost.peek_next().map(|n| n.key), Some(10));
    assert_eq!(tree.cursor_last().get().map(|n| n.key), Some(40));
}

#[test]
fn cursor_mut_removes() {
    let mut tree = build(&[1, 2, 3, 4, 5]);

    let mut cursor = tree.cursor_at_by_mut(|node| 3.cmp(&node.key));
    assert_eq!(cursor.remove_current().map(|n| n.key), Some(3));
    assert_eq!(cursor.get().map(|n| n.key), Some(4));
    assert_eq!(cursor.as_cursor().peek_prev().map(|n| n.key), Some(2));
    assert_eq!(
        cursor.remove_current_and_move_prev().map(|n| n.key),
        Some(4)
    );
    assert_eq!(cursor.get().map(|n| n.key), Some(2));

    let last = tree.cursor_last_mut();
    assert_eq!(last.get().map(|n| n.key), Some(5));

    tree.assert_invariants();
    assert_eq!(keys(tree.iter()), [1, 2, 5]);
}

fn shuffled(range: Range<u32>, seed: u64) -> Vec<u32> {
    let mut keys: Vec<u32> = range.collect();
    keys.shuffle(&mut StdRng::seed_from_u64(seed));
    keys
}

#[test]
fn round_trip_random_order() {
    let mut rng = StdRng::seed_from_u64(0xa71);

    for round in 0..8 {
        let inserted = shuffled(0..300, round);
        let mut tree = build(&inserted);

        assert_eq!(keys(tree.iter()), (0..300).collect::<Vec<_>>());

        let mut removal = inserted.clone();
        removal.shuffle(&mut rng);

        for (i, key) in removal.iter().enumerate() {
            assert_eq!(tree.remove(key).map(|n| n.key), Some(*key));
            tree.assert_invariants();
            assert_eq!(tree.len(), removal.len() - i - 1);
        }

        assert!(tree.root().is_none());
        assert!(tree.is_empty());
    }
}

#[test]
fn drain_postorder_frees_as_it_goes() {
    let inserted = shuffled(0..1500, 7);
    let mut tree = build(&inserted);

    let expected = keys(tree.postorder());

    let mut seen = BTreeSet::new();
    let mut visited = Vec::new();

    for node in tree.drain_postorder() {
        assert!(node.links.is_unlinked());
        assert!(seen.insert(node.key), "{} visited twice", node.key);
        visited.push(node.key);
        // `node` is freed here.
    }

    assert_eq!(visited, expected);
    assert_eq!(seen.len(), 1500);
    assert!(tree.is_empty());
    tree.assert_invariants();

    // The tree is usable again afterwards.
    assert!(tree.insert(TestNode::new(1)).is_ok());
    tree.assert_invariants();
}

#[test]
fn raw_postorder_tolerates_freed_nodes() {
    let inserted = shuffled(0..1024, 99);
    let mut tree = build(&inserted);

    // Take ownership of every node away from the tree, then free them one by one.
    let root = tree.root.take();
    tree.len = 0;

    let mut seen = BTreeSet::new();

    unsafe {
        let mut opt_cur = traverse::first_in_postorder(root);

        while let Some(cur) = opt_cur {
            let parent = links(cur).parent();

            assert!(seen.insert(cur.as_ref().key));
            drop(TestNode::from_ptr(cur));

            opt_cur = traverse::next_in_postorder(cur, parent);
        }
    }

    assert_eq!(seen.len(), 1024);
}

#[test]
fn drop_partially_drained() {
    let mut tree = build(&shuffled(0..100, 3));

    let mut drain = tree.drain_postorder();
    assert_eq!(drain.len(), 100);
    assert!(drain.next().is_some());
    drop(drain);

    assert!(tree.is_empty());
}

#[test]
fn clear_empties_tree() {
    let mut tree = build(&shuffled(0..200, 11));

    tree.clear();
    assert!(tree.is_empty());
    assert!(tree.first().is_none());
    tree.assert_invariants();
}

#[cfg(miri)]
const FUZZ_RANGE: Range<usize> = 0..10;

#[cfg(not(miri))]
const FUZZ_RANGE: Range<usize> = 0..1000;

proptest::proptest! {
    #![proptest_config(ProptestConfig {
        max_shrink_iters: 65536,
        .. ProptestConfig::default()
    })]

    #[test]
    fn btree_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_btree_equivalence(ops);
    }

    #[test]
    fn cursor_equivalence(
        values in proptest::collection::vec(0u32..1000, 0..100),
        ops in proptest::collection::vec(model::cursor_op_strategy(), FUZZ_RANGE),
    ) {
        model::run_cursor_equivalence(values, ops);
    }

    #[test]
    fn in_order_is_sorted(keys in proptest::collection::vec(any::<u32>(), 0..500)) {
        let mut tree: AvlTree<TestNode> = AvlTree::new();

        for key in keys {
            let _ = tree.insert(TestNode::new(key));
        }

        tree.assert_invariants();

        let in_order: Vec<u32> = tree.iter().map(|node| node.key).collect();
        prop_assert!(in_order.windows(2).all(|w| w[0] < w[1]));
    }
}
