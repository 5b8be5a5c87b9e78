extern crate std;

use std::{ops::Range, prelude::v1::*, ptr::NonNull};

use proptest::prelude::*;

use crate::model::{self, MapNode};

use super::*;

fn keys_of<C>(map: &MultiMap<MapNode, u32, C>) -> Vec<u32> {
    map.iter().map(|(&key, _)| key).collect()
}

fn ids_of<C>(map: &MultiMap<MapNode, u32, C>) -> Vec<u32> {
    map.iter().map(|(_, node)| node.id).collect()
}

fn insert_find_all(keys: &[u32]) {
    let mut tree: MultiMap<MapNode, u32> = MultiMap::new();

    for (id, &key) in keys.iter().enumerate() {
        tree.insert(key, MapNode::new(id as u32));
        tree.assert_invariants();
    }

    for (id, key) in keys.iter().enumerate() {
        let curs = tree.find(key);
        assert_eq!(curs.key(), Some(key), "item not found");
        assert_eq!(curs.get().map(|node| node.id), Some(id as u32));
    }

    tree.delete_all();
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

// Calls `f` with every permutation of `items`.
fn permutations(items: &mut Vec<u32>, k: usize, f: &mut dyn FnMut(&[u32])) {
    if k == items.len() {
        f(items);
        return;
    }

    for i in k..items.len() {
        items.swap(k, i);
        permutations(items, k + 1, f);
        items.swap(k, i);
    }
}

#[test]
fn five_elems_find() {
    permutations(&mut vec![0, 1, 2, 3, 4], 0, &mut |keys| insert_find_all(keys));
}

fn insert_remove_all(keys: &[u32]) {
    let mut tree: MultiMap<MapNode, u32> = MultiMap::new();

    for &key in keys {
        tree.insert(key, MapNode::new(key));
        tree.assert_invariants();
    }

    for key in keys {
        let node = tree.find(key).as_ptr().expect("item not found");
        let removed = unsafe { tree.remove(node) };
        assert_eq!(removed.id, *key);
        assert!(!removed.links.is_linked());
        tree.assert_invariants();
    }

    assert!(tree.is_empty());

    for &key in keys {
        tree.insert(key, MapNode::new(key));
        tree.assert_invariants();
    }

    for key in keys.iter().rev() {
        let node = tree.find(key).as_ptr().expect("item not found");
        unsafe { tree.remove(node) };
        tree.assert_invariants();
    }

    assert!(tree.is_empty());
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
fn remove_six() {
    permutations(&mut vec![0, 1, 2, 3, 4, 5], 0, &mut |keys| insert_remove_all(keys));
}

#[test]
fn ascending_and_descending_runs_stay_balanced() {
    let mut tree: MultiMap<MapNode, u32> = MultiMap::new();

    for key in 0..256 {
        tree.insert(key, MapNode::new(key));
    }
    for key in (256..512).rev() {
        tree.insert(key, MapNode::new(key));
    }
    tree.assert_invariants();

    assert_eq!(keys_of(&tree), (0..512).collect::<Vec<_>>());

    // Remove every other element, then the rest.
    for key in (0..512).step_by(2) {
        assert!(tree.pop_key(&key).is_some());
    }
    tree.assert_invariants();
    assert_eq!(tree.len(), 256);

    while tree.pop_first().is_some() {
        tree.assert_invariants();
    }
}

#[test]
fn iterates_in_key_order() {
    let mut tree: MultiMap<MapNode, u32> = MultiMap::new();

    for key in [10, 20, 5] {
        tree.insert(key, MapNode::new(key));
    }

    assert_eq!(keys_of(&tree), [5, 10, 20]);
    assert_eq!(tree.first().map(|node| node.id), Some(5));
    assert_eq!(tree.last().map(|node| node.id), Some(20));

    let rev: Vec<u32> = tree.iter().rev().map(|(&key, _)| key).collect();
    assert_eq!(rev, [20, 10, 5]);

    // Three steps from the first element reach the ghost.
    let mut curs = tree.cursor_first();
    curs.move_next();
    curs.move_next();
    assert_eq!(curs.key(), Some(&20));
    curs.move_next();
    assert!(curs.get().is_none());
    assert!(curs.key().is_none());

    assert_eq!(tree.equal_range(&20).count(), 1);
    assert_eq!(tree.count(&20), 1);

    tree.delete_all();
}

#[test]
fn duplicates_keep_insertion_order() {
    let mut tree: MultiMap<MapNode, u32> = MultiMap::new();

    // ids record the insertion order.
    for (id, key) in [5, 3, 5, 1, 5].into_iter().enumerate() {
        tree.insert(key, MapNode::new(id as u32));
        tree.assert_invariants();
    }

    assert_eq!(keys_of(&tree), [1, 3, 5, 5, 5]);
    assert_eq!(ids_of(&tree), [3, 1, 0, 2, 4]);

    assert_eq!(tree.count(&5), 3);
    assert_eq!(tree.count(&3), 1);
    assert_eq!(tree.count(&4), 0);

    let fives: Vec<u32> = tree.equal_range(&5).map(|(_, node)| node.id).collect();
    assert_eq!(fives, [0, 2, 4]);

    // `find` and `get` return the oldest duplicate.
    assert_eq!(tree.find(&5).get().map(|node| node.id), Some(0));
    assert_eq!(tree.get(&5).map(|node| node.id), Some(0));

    // The last element is the newest of the maximum keys.
    assert_eq!(tree.last().map(|node| node.id), Some(4));

    assert_eq!(tree.lower_bound(&4).get().map(|node| node.id), Some(0));
    assert!(tree.upper_bound(&5).get().is_none());
    assert_eq!(tree.upper_bound(&3).get().map(|node| node.id), Some(0));

    assert_eq!(tree.remove_key(&5), 3);
    tree.assert_invariants();
    assert_eq!(keys_of(&tree), [1, 3]);
    assert_eq!(tree.last().map(|node| node.id), Some(1));

    tree.delete_all();
}

#[test]
fn bounds() {
    let mut tree: MultiMap<MapNode, u32> = MultiMap::new();

    for (id, key) in [10, 20, 20, 30].into_iter().enumerate() {
        tree.insert(key, MapNode::new(id as u32));
    }

    assert_eq!(tree.lower_bound(&20).get().map(|node| node.id), Some(1));
    assert_eq!(tree.upper_bound(&20).key(), Some(&30));
    assert_eq!(tree.lower_bound(&15).key(), Some(&20));
    assert_eq!(tree.upper_bound(&5).key(), Some(&10));
    assert!(tree.lower_bound(&31).get().is_none());
    assert!(tree.upper_bound(&30).get().is_none());

    assert!(tree.find(&25).get().is_none());
    assert!(!tree.contains_key(&25));
    assert!(tree.contains_key(&30));
    assert_eq!(tree.equal_range(&25).count(), 0);

    // A ghost cursor wraps around to the ends.
    let mut ghost = tree.upper_bound(&30);
    ghost.move_prev();
    assert_eq!(ghost.key(), Some(&30));
    ghost.move_next();
    ghost.move_next();
    assert_eq!(ghost.key(), Some(&10));

    tree.delete_all();
}

#[test]
fn equal_range_is_double_ended() {
    let mut tree: MultiMap<MapNode, u32> = MultiMap::new();

    for id in 0..5 {
        tree.insert(7, MapNode::new(id));
    }
    tree.insert(1, MapNode::new(100));
    tree.insert(9, MapNode::new(200));

    let mut range = tree.equal_range(&7);
    assert_eq!(range.next().map(|(_, node)| node.id), Some(0));
    assert_eq!(range.next_back().map(|(_, node)| node.id), Some(4));
    assert_eq!(range.next().map(|(_, node)| node.id), Some(1));
    assert_eq!(range.next_back().map(|(_, node)| node.id), Some(3));
    assert_eq!(range.next().map(|(_, node)| node.id), Some(2));
    assert!(range.next().is_none());
    assert!(range.next_back().is_none());

    tree.delete_all();
}

#[test]
fn removal_api() {
    let mut tree: MultiMap<MapNode, u32> = MultiMap::new();

    for (id, key) in [1, 2, 2, 2, 3, 4, 4, 5].into_iter().enumerate() {
        tree.insert(key, MapNode::new(id as u32));
    }

    assert_eq!(tree.remove_key(&2), 3);
    assert_eq!(tree.remove_key(&2), 0);
    tree.assert_invariants();
    assert_eq!(keys_of(&tree), [1, 3, 4, 4, 5]);

    assert_eq!(tree.pop_key(&4).map(|node| node.id), Some(5));
    assert_eq!(tree.pop_key(&7).map(|node| node.id), None);

    assert_eq!(tree.pop_first().map(|node| node.id), Some(0));
    assert_eq!(tree.pop_last().map(|node| node.id), Some(7));
    tree.assert_invariants();
    assert_eq!(keys_of(&tree), [3, 4]);

    let three = tree.find(&3).as_ptr().unwrap();
    assert!(unsafe { tree.remove_node_if(three, |&key, _| key == 4) }.is_none());
    let removed = unsafe { tree.remove_node_if(three, |&key, node| key == 3 && node.id == 4) };
    assert_eq!(removed.map(|node| node.id), Some(4));
    tree.assert_invariants();
    assert_eq!(keys_of(&tree), [4]);

    tree.delete_all();
}

#[test]
fn remove_range_and_remove_if() {
    let mut tree: MultiMap<MapNode, u32> = MultiMap::new();

    for key in 0..20 {
        tree.insert(key, MapNode::new(key));
    }

    // [5, 10)
    let first = tree.find(&5).as_ptr().unwrap();
    let last = tree.find(&10).as_ptr();
    assert_eq!(unsafe { tree.remove_range(first, last) }, 5);
    tree.assert_invariants();

    // [15, end)
    let first = tree.find(&15).as_ptr().unwrap();
    assert_eq!(unsafe { tree.remove_range(first, None) }, 5);
    tree.assert_invariants();

    assert_eq!(keys_of(&tree), [0, 1, 2, 3, 4, 10, 11, 12, 13, 14]);

    assert_eq!(tree.remove_if(|&key, _| key % 2 == 1), 4);
    tree.assert_invariants();
    assert_eq!(keys_of(&tree), [0, 2, 4, 10, 12, 14]);
    assert_eq!(tree.first().map(|node| node.id), Some(0));
    assert_eq!(tree.last().map(|node| node.id), Some(14));

    tree.delete_all();
}

#[test]
fn remove_all_visits_every_element() {
    let mut tree: MultiMap<MapNode, u32> = MultiMap::new();

    for key in [4, 2, 6, 1, 3, 5, 7] {
        tree.insert(key, MapNode::new(key));
    }

    let mut seen = Vec::new();
    let removed = tree.remove_all(|node| {
        assert!(!node.links.is_linked());
        seen.push(node.id);
    });

    assert_eq!(removed, 7);
    assert!(tree.is_empty());
    assert!(tree.first().is_none());
    assert!(tree.last().is_none());
    tree.assert_invariants();

    // Right subtree, then node, then left subtree: descending key order.
    assert_eq!(seen, [7, 6, 5, 4, 3, 2, 1]);

    tree.insert(1, MapNode::new(1));
    tree.delete_all();
    assert!(tree.is_empty());
}

#[test]
fn custom_comparators() {
    let mut tree: MultiMap<MapNode, u32, Descending> = MultiMap::default();

    for key in [3, 1, 4, 1, 5] {
        tree.insert(key, MapNode::new(key));
    }
    tree.assert_invariants();
    assert_eq!(keys_of(&tree), [5, 4, 3, 1, 1]);
    assert_eq!(tree.lower_bound(&2).key(), Some(&1));
    tree.delete_all();

    let by_low_digit = |a: &u32, b: &u32| (a % 10).cmp(&(b % 10));
    let mut tree = MultiMap::<MapNode, u32, _>::with_comparator(by_low_digit);

    for key in [21, 13, 32, 11] {
        tree.insert(key, MapNode::new(key));
    }
    tree.assert_invariants();
    assert_eq!(keys_of(&tree), [21, 11, 32, 13]);
    assert_eq!(tree.count(&1), 2);
    tree.delete_all();
}

#[test]
fn cursor_removal() {
    let mut tree: MultiMap<MapNode, u32> = MultiMap::new();

    for key in 0..6 {
        tree.insert(key, MapNode::new(key));
    }

    let mut curs = tree.lower_bound_mut(&2);
    assert_eq!(curs.remove_current().map(|node| node.id), Some(2));
    assert_eq!(curs.key(), Some(&3));
    assert_eq!(curs.remove_current_and_move_prev().map(|node| node.id), Some(3));
    assert_eq!(curs.key(), Some(&1));
    assert_eq!(curs.peek_next().map(|node| node.id), Some(4));
    assert_eq!(curs.as_cursor().peek_prev().map(|node| node.id), Some(0));

    tree.assert_invariants();
    assert_eq!(keys_of(&tree), [0, 1, 4, 5]);

    let five = tree.find(&5).as_ptr().unwrap();
    let mut curs = unsafe { tree.cursor_from_ptr_mut(five) };
    assert_eq!(curs.remove_current().map(|node| node.id), Some(5));
    assert!(curs.get().is_none());
    assert!(curs.remove_current().is_none());

    tree.delete_all();
}

#[test]
fn insert_returns_cursor_at_new_element() {
    let mut tree: MultiMap<MapNode, u32> = MultiMap::new();

    tree.insert(1, MapNode::new(0));
    tree.insert(3, MapNode::new(1));

    let curs = tree.insert(1, MapNode::new(2));
    assert_eq!(curs.get().map(|node| node.id), Some(2));
    assert_eq!(curs.peek_prev().map(|node| node.id), Some(0));
    assert_eq!(curs.peek_next().map(|node| node.id), Some(1));

    let node = tree.last().unwrap();
    assert_eq!(unsafe { tree.key_of(&node) }, &3);

    tree.delete_all();
}

#[derive(Debug)]
#[repr(C)]
struct Borrowed {
    links: Links<Borrowed, u32>,
}

unsafe impl Linked<Links<Borrowed, u32>> for Borrowed {
    type Handle = NonNull<Borrowed>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        r
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        ptr
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<Borrowed, u32>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

#[test]
fn borrowed_handles_survive_delete_all() {
    let nodes: Vec<Box<Borrowed>> = (0..4)
        .map(|_| Box::new(Borrowed { links: Links::new() }))
        .collect();

    let mut tree: MultiMap<Borrowed, u32> = MultiMap::new();
    for (key, node) in nodes.iter().enumerate() {
        tree.insert(key as u32, NonNull::from(&**node));
    }
    tree.assert_invariants();
    assert!(nodes.iter().all(|node| node.links.is_linked()));

    // Dropping borrowed handles unlinks every node without freeing any.
    tree.delete_all();
    assert!(nodes.iter().all(|node| !node.links.is_linked()));

    // Unlinked nodes can be reinserted.
    let mut tree: MultiMap<Borrowed, u32> = MultiMap::new();
    for node in &nodes {
        tree.insert(0, NonNull::from(&**node));
    }
    assert_eq!(tree.count(&0), 4);
    tree.delete_all();
}

#[cfg(any(debug_assertions, feature = "ownership-checks"))]
#[test]
#[should_panic(expected = "already linked")]
fn double_insert_panics() {
    let node = Box::new(Borrowed { links: Links::new() });
    let ptr = NonNull::from(&*node);

    let mut tree: MultiMap<Borrowed, u32> = MultiMap::new();
    tree.insert(0, ptr);
    tree.insert(1, ptr);
}

#[cfg(any(debug_assertions, feature = "ownership-checks"))]
#[test]
#[should_panic(expected = "not owned")]
fn removing_foreign_node_panics() {
    let mut a: MultiMap<MapNode, u32> = MultiMap::new();
    let mut b: MultiMap<MapNode, u32> = MultiMap::new();

    a.insert(0, MapNode::new(0));
    let foreign = b.insert(0, MapNode::new(1)).as_ptr().unwrap();

    drop(unsafe { a.remove(foreign) });
}

#[cfg(any(debug_assertions, feature = "ownership-checks"))]
#[test]
#[should_panic(expected = "not owned")]
fn remove_range_with_foreign_end_panics() {
    let mut a: MultiMap<MapNode, u32> = MultiMap::new();
    let mut b: MultiMap<MapNode, u32> = MultiMap::new();

    for key in 0..4 {
        a.insert(key, MapNode::new(key));
    }
    let foreign = b.insert(2, MapNode::new(10)).as_ptr();

    let first = a.find(&1).as_ptr().unwrap();
    unsafe { a.remove_range(first, foreign) };
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "dropping a non-empty container")]
fn dropping_non_empty_map_panics() {
    let mut tree: MultiMap<MapNode, u32> = MultiMap::new();
    tree.insert(1, MapNode::new(1));
    drop(tree);
}

#[test]
fn validate_reports_broken_structure() {
    let mut tree: MultiMap<MapNode, u32> = MultiMap::new();

    for key in 0..7 {
        tree.insert(key, MapNode::new(key));
    }
    assert_eq!(tree.validate(), Ok(()));

    tree.len += 1;
    assert_eq!(
        tree.validate(),
        Err(InvariantError::LengthMismatch {
            expected: 8,
            actual: 7
        })
    );
    tree.len -= 1;

    let root = tree.root.unwrap();
    unsafe { links::<MapNode, u32>(root).set_color(Color::Red) };
    assert_eq!(tree.validate(), Err(InvariantError::RedRoot));
    unsafe { links::<MapNode, u32>(root).set_color(Color::Black) };

    let stale = tree.first.take();
    assert_eq!(
        tree.validate(),
        Err(InvariantError::StaleBound { which: "first" })
    );
    tree.first = stale;

    assert_eq!(tree.validate(), Ok(()));
    tree.delete_all();
}

#[test]
fn dotgraph_renders_every_node() {
    let mut tree: MultiMap<MapNode, u32> = MultiMap::new();

    let mut empty = String::new();
    tree.dotgraph("empty", &mut empty).unwrap();
    assert_eq!(empty, "digraph \"graph-empty\" {}");

    for key in [2, 1, 3] {
        tree.insert(key, MapNode::new(key));
    }

    let mut out = String::new();
    tree.dotgraph("small", &mut out).unwrap();

    assert!(out.starts_with("digraph \"graph-small\""));
    for key in 1..=3 {
        assert!(out.contains(&format!("label=\"{key}\"")));
    }
    assert_eq!(out.matches("fillcolor=black").count(), 1);
    assert_eq!(out.matches("fillcolor=red").count(), 2);
    assert_eq!(out.matches("shape=point").count(), 4);

    tree.delete_all();
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
    fn btreemap_equivalence(ops in proptest::collection::vec(model::map_op_strategy(), FUZZ_RANGE)) {
        model::run_multimap_equivalence(ops);
    }

    #[test]
    fn cursor_equivalence(
        keys in proptest::collection::vec(0u32..32, 0..100),
        ops in proptest::collection::vec(model::cursor_op_strategy(), FUZZ_RANGE),
    ) {
        model::run_cursor_equivalence(keys, ops);
    }
}
