//! Model-based equivalence checks, shared by the unit tests and the fuzz targets.
//!
//! Each runner replays a sequence of operations against one of the intrusive containers and
//! against a standard library collection, asserting after every step that both agree and that
//! the container's invariants hold.

extern crate std;

use std::{
    collections::{BTreeMap, VecDeque},
    ops::Bound,
    prelude::v1::*,
    ptr::NonNull,
};

use arbitrary::Arbitrary;
use cordyceps::Linked;
use proptest::strategy::{Just, Strategy};

use crate::{list, multimap, List, MultiMap};

#[derive(Debug)]
#[repr(C)]
pub struct ListNode {
    pub links: list::Links<ListNode>,
    pub value: u32,
}

impl ListNode {
    pub fn new(value: u32) -> Box<ListNode> {
        Box::new(ListNode {
            links: list::Links::new(),
            value,
        })
    }
}

unsafe impl Linked<list::Links<ListNode>> for ListNode {
    type Handle = Box<ListNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::new(Box::into_raw(r)).unwrap()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<list::Links<ListNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl PartialEq for ListNode {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for ListNode {}

impl PartialOrd for ListNode {
    fn partial_cmp(&self, other: &Self) -> Option<core::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ListNode {
    fn cmp(&self, other: &Self) -> core::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

#[derive(Debug)]
#[repr(C)]
pub struct MapNode {
    pub links: multimap::Links<MapNode, u32>,
    pub id: u32,
}

impl MapNode {
    pub fn new(id: u32) -> Box<MapNode> {
        Box::new(MapNode {
            links: multimap::Links::new(),
            id,
        })
    }
}

unsafe impl Linked<multimap::Links<MapNode, u32>> for MapNode {
    type Handle = Box<MapNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::new(Box::into_raw(r)).unwrap()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<multimap::Links<MapNode, u32>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

// List ========================================================================

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ListOp {
    PushFront(u32),
    PushBack(u32),
    PopFront,
    PopBack,
    Insert(usize, u32),
    Remove(usize),
    MoveBefore(usize, usize),
    RemoveRange(usize, usize),
    RemoveAllIf(u8),
    Rotate(usize),
    Sort,
    Unique,
}

pub fn list_op_strategy() -> impl Strategy<Value = ListOp> {
    // Values are kept small so that `Unique` and `Sort` see plenty of ties.
    proptest::prop_oneof![
        (0u32..16).prop_map(ListOp::PushFront),
        (0u32..16).prop_map(ListOp::PushBack),
        Just(ListOp::PopFront),
        Just(ListOp::PopBack),
        (0usize..1000, 0u32..16).prop_map(|(i, v)| ListOp::Insert(i, v)),
        (0usize..1000).prop_map(ListOp::Remove),
        (0usize..1000, 0usize..1000).prop_map(|(a, b)| ListOp::MoveBefore(a, b)),
        (0usize..1000, 0usize..1000).prop_map(|(a, b)| ListOp::RemoveRange(a, b)),
        proptest::num::u8::ANY.prop_map(ListOp::RemoveAllIf),
        (0usize..1000).prop_map(ListOp::Rotate),
        Just(ListOp::Sort),
        Just(ListOp::Unique),
    ]
}

fn nth_ptr(list: &List<ListNode>, index: usize) -> Option<NonNull<ListNode>> {
    list.iter().nth(index).map(NonNull::from)
}

fn values(list: &List<ListNode>) -> Vec<u32> {
    list.iter().map(|node| node.value).collect()
}

pub fn run_list_equivalence(ops: Vec<ListOp>) {
    let mut model = VecDeque::new();
    let mut list: List<ListNode> = List::new();

    for (op_id, op) in ops.into_iter().enumerate() {
        let len = model.len();

        match op {
            ListOp::PushFront(value) => {
                model.push_front(value);
                list.push_front(ListNode::new(value));
            }

            ListOp::PushBack(value) => {
                model.push_back(value);
                list.push_back(ListNode::new(value));
            }

            ListOp::PopFront => {
                let from_model = model.pop_front();
                let from_list = list.pop_front().map(|node| node.value);

                assert_eq!(from_model, from_list, "ListOp #{op_id}: {op:?}");
            }

            ListOp::PopBack => {
                let from_model = model.pop_back();
                let from_list = list.pop_back().map(|node| node.value);

                assert_eq!(from_model, from_list, "ListOp #{op_id}: {op:?}");
            }

            ListOp::Insert(index, value) => {
                let index = index % (len + 1);
                let pos = nth_ptr(&list, index);

                model.insert(index, value);
                unsafe { list.insert_before(pos, ListNode::new(value)) };
            }

            ListOp::Remove(index) => {
                if len == 0 {
                    continue;
                }

                let index = index % len;
                let node = nth_ptr(&list, index).unwrap();

                let from_model = model.remove(index);
                let from_list = unsafe { list.remove(node) }.value;

                assert_eq!(from_model, Some(from_list), "ListOp #{op_id}: {op:?}");
            }

            ListOp::MoveBefore(from, to) => {
                if len == 0 {
                    continue;
                }

                let from = from % len;
                let to = to % (len + 1);
                let node = nth_ptr(&list, from).unwrap();
                let pos = nth_ptr(&list, to);

                unsafe { list.move_before(node, pos) };

                if to != from && to != from + 1 {
                    let value = model.remove(from).unwrap();
                    model.insert(if to > from { to - 1 } else { to }, value);
                }
            }

            ListOp::RemoveRange(start, count) => {
                if len == 0 {
                    continue;
                }

                let start = start % len;
                let end = start + count % (len - start + 1);
                let first = nth_ptr(&list, start).unwrap();
                let last = nth_ptr(&list, end);

                let from_model: Vec<u32> = model.drain(start..end).collect();
                let mut removed = unsafe { list.remove_range(first, last) };
                removed.assert_invariants();

                assert_eq!(from_model, values(&removed), "ListOp #{op_id}: {op:?}");
                removed.delete_all();
            }

            ListOp::RemoveAllIf(modulus) => {
                let modulus = u32::from(modulus % 4) + 2;

                let from_model: Vec<u32> = model
                    .iter()
                    .copied()
                    .filter(|value| value % modulus == 0)
                    .collect();
                model.retain(|value| value % modulus != 0);

                let mut removed = list.remove_all_if(|node| node.value % modulus == 0);
                removed.assert_invariants();

                assert_eq!(from_model, values(&removed), "ListOp #{op_id}: {op:?}");
                removed.delete_all();
            }

            ListOp::Rotate(mid) => {
                if len == 0 {
                    continue;
                }

                // Moves `[mid, len)` to the front.
                let mid = mid % len;
                let first = nth_ptr(&list, mid).unwrap();
                let mut tail = unsafe { list.remove_range(first, None) };
                list.prepend(&mut tail);
                assert!(tail.is_empty());

                model.rotate_left(mid);
            }

            ListOp::Sort => {
                model.make_contiguous().sort();
                list.sort();
            }

            ListOp::Unique => {
                let mut kept = VecDeque::new();
                let mut from_model = Vec::new();
                for value in model.drain(..) {
                    if kept.back() == Some(&value) {
                        from_model.push(value);
                    } else {
                        kept.push_back(value);
                    }
                }
                model = kept;

                let mut removed = list.unique();
                removed.assert_invariants();

                assert_eq!(from_model, values(&removed), "ListOp #{op_id}: {op:?}");
                removed.delete_all();
            }
        }

        list.assert_invariants();
        assert_eq!(model.len(), list.len());
        assert!(model.iter().eq(list.iter().map(|node| &node.value)));
        assert!(model.iter().rev().eq(list.iter().rev().map(|node| &node.value)));
    }

    list.delete_all();
}

// MultiMap ====================================================================

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    Index(usize),
    Random(u32),
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in 0u32..100,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

fn value_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum MapOp {
    Insert(ItemValue),
    Get(ItemValue),
    Count(ItemValue),
    LowerBound(ItemValue),
    UpperBound(ItemValue),
    PopKey(ItemValue),
    RemoveKey(ItemValue),
    RemoveIf(u8),
    First,
    PopFirst,
    Last,
    PopLast,
}

impl MapOp {
    fn finalize(self, keys: &[u32]) -> FinalOp {
        fn get_value(v: &[u32], i: ItemValue) -> u32 {
            match i {
                ItemValue::Index(idx) => {
                    if v.is_empty() {
                        idx as u32
                    } else {
                        v[idx % v.len()]
                    }
                }
                ItemValue::Random(v) => v,
            }
        }

        match self {
            MapOp::Insert(item) => FinalOp::Insert(get_value(keys, item)),
            MapOp::Get(item) => FinalOp::Get(get_value(keys, item)),
            MapOp::Count(item) => FinalOp::Count(get_value(keys, item)),
            MapOp::LowerBound(item) => FinalOp::LowerBound(get_value(keys, item)),
            MapOp::UpperBound(item) => FinalOp::UpperBound(get_value(keys, item)),
            MapOp::PopKey(item) => FinalOp::PopKey(get_value(keys, item)),
            MapOp::RemoveKey(item) => FinalOp::RemoveKey(get_value(keys, item)),
            MapOp::RemoveIf(modulus) => FinalOp::RemoveIf(u32::from(modulus % 4) + 2),
            MapOp::First => FinalOp::First,
            MapOp::PopFirst => FinalOp::PopFirst,
            MapOp::Last => FinalOp::Last,
            MapOp::PopLast => FinalOp::PopLast,
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum FinalOp {
    Insert(u32),
    Get(u32),
    Count(u32),
    LowerBound(u32),
    UpperBound(u32),
    PopKey(u32),
    RemoveKey(u32),
    RemoveIf(u32),
    First,
    PopFirst,
    Last,
    PopLast,
}

pub fn map_op_strategy() -> impl Strategy<Value = MapOp> {
    proptest::prop_oneof![
        3 => value_strategy().prop_map(MapOp::Insert),
        1 => value_strategy().prop_map(MapOp::Get),
        1 => value_strategy().prop_map(MapOp::Count),
        1 => value_strategy().prop_map(MapOp::LowerBound),
        1 => value_strategy().prop_map(MapOp::UpperBound),
        1 => value_strategy().prop_map(MapOp::PopKey),
        1 => value_strategy().prop_map(MapOp::RemoveKey),
        1 => proptest::num::u8::ANY.prop_map(MapOp::RemoveIf),
        1 => Just(MapOp::First),
        1 => Just(MapOp::PopFirst),
        1 => Just(MapOp::Last),
        1 => Just(MapOp::PopLast),
    ]
}

// Every queue in the model is non-empty; ids within a queue are in insertion order.
type Model = BTreeMap<u32, VecDeque<u32>>;

fn model_pop(model: &mut Model, key: u32, back: bool) -> Option<u32> {
    let queue = model.get_mut(&key)?;
    let id = if back {
        queue.pop_back()
    } else {
        queue.pop_front()
    };

    if queue.is_empty() {
        model.remove(&key);
    }

    id
}

pub fn run_multimap_equivalence(ops: Vec<MapOp>) {
    let mut model = Model::new();
    let mut map: MultiMap<MapNode, u32> = MultiMap::new();
    let mut next_id = 0;

    #[inline]
    #[allow(clippy::boxed_local)]
    fn node_id(node: Box<MapNode>) -> u32 {
        node.id
    }

    for (op_id, op) in ops.into_iter().enumerate() {
        let keys: Vec<u32> = model.keys().copied().collect();
        let final_op = op.finalize(&keys);

        match final_op {
            FinalOp::Insert(key) => {
                model.entry(key).or_default().push_back(next_id);

                let curs = map.insert(key, MapNode::new(next_id));
                assert_eq!(curs.key(), Some(&key), "FinalOp #{op_id}: {final_op:?}");

                next_id += 1;
            }

            FinalOp::Get(key) => {
                let from_model = model.get(&key).and_then(|q| q.front().copied());
                let from_map = map.get(&key).map(|node| node.id);

                assert_eq!(from_model, from_map, "FinalOp #{op_id}: {final_op:?}");
                assert_eq!(from_model.is_some(), map.contains_key(&key));
            }

            FinalOp::Count(key) => {
                let from_model: Vec<u32> = model
                    .get(&key)
                    .map(|q| q.iter().copied().collect())
                    .unwrap_or_default();
                let from_map: Vec<u32> = map.equal_range(&key).map(|(_, node)| node.id).collect();

                assert_eq!(from_model, from_map, "FinalOp #{op_id}: {final_op:?}");
                assert_eq!(from_model.len(), map.count(&key));

                let reversed: Vec<u32> = map
                    .equal_range(&key)
                    .rev()
                    .map(|(_, node)| node.id)
                    .collect();
                assert!(from_model.iter().rev().eq(reversed.iter()));
            }

            FinalOp::LowerBound(key) => {
                let from_model = model.range(key..).next().map(|(&k, q)| (k, q[0]));
                let curs = map.lower_bound(&key);
                let from_map = curs.key().copied().zip(curs.get().map(|node| node.id));

                assert_eq!(from_model, from_map, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::UpperBound(key) => {
                let from_model = model
                    .range((Bound::Excluded(key), Bound::Unbounded))
                    .next()
                    .map(|(&k, q)| (k, q[0]));
                let curs = map.upper_bound(&key);
                let from_map = curs.key().copied().zip(curs.get().map(|node| node.id));

                assert_eq!(from_model, from_map, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopKey(key) => {
                let from_model = model_pop(&mut model, key, false);
                let from_map = map.pop_key(&key).map(node_id);

                assert_eq!(from_model, from_map, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::RemoveKey(key) => {
                let from_model = model.remove(&key).map_or(0, |q| q.len());
                let from_map = map.remove_key(&key);

                assert_eq!(from_model, from_map, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::RemoveIf(modulus) => {
                let mut from_model = 0;
                for (key, queue) in model.iter_mut() {
                    let before = queue.len();
                    queue.retain(|id| (key + id) % modulus != 0);
                    from_model += before - queue.len();
                }
                model.retain(|_, queue| !queue.is_empty());

                let from_map = map.remove_if(|key, node| (key + node.id) % modulus == 0);

                assert_eq!(from_model, from_map, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::First => {
                let from_model = model.values().next().map(|q| q[0]);
                let from_map = map.first().map(|node| node.id);

                assert_eq!(from_model, from_map, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopFirst => {
                let first = model.keys().next().copied();
                let from_model = first.and_then(|key| model_pop(&mut model, key, false));
                let from_map = map.pop_first().map(node_id);

                assert_eq!(from_model, from_map, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Last => {
                let from_model = model.values().next_back().and_then(|q| q.back().copied());
                let from_map = map.last().map(|node| node.id);

                assert_eq!(from_model, from_map, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopLast => {
                let last = model.keys().next_back().copied();
                let from_model = last.and_then(|key| model_pop(&mut model, key, true));
                let from_map = map.pop_last().map(node_id);

                assert_eq!(from_model, from_map, "FinalOp #{op_id}: {final_op:?}");
            }
        }

        map.assert_invariants();

        let flat: Vec<(u32, u32)> = model
            .iter()
            .flat_map(|(&key, q)| q.iter().map(move |&id| (key, id)))
            .collect();

        assert_eq!(flat.len(), map.len());
        assert!(flat
            .iter()
            .eq(map.iter().map(|(&key, node)| (key, node.id)).collect::<Vec<_>>().iter()));
        assert!(flat
            .iter()
            .rev()
            .eq(map.iter().rev().map(|(&key, node)| (key, node.id)).collect::<Vec<_>>().iter()));
    }
    map.delete_all();
}

#[derive(Clone, Debug, Arbitrary)]
pub enum CursorOp {
    // Get is not an operation as it's executed on every loop iteration to check equivalence.
    MovePrev,
    MoveNext,
    PeekNext,
    PeekPrev,
    RemoveCurrent,
    RemoveCurrentMovePrev,
}

pub fn cursor_op_strategy() -> impl Strategy<Value = CursorOp> {
    proptest::prop_oneof![
        Just(CursorOp::MovePrev),
        Just(CursorOp::MoveNext),
        Just(CursorOp::PeekNext),
        Just(CursorOp::PeekPrev),
        Just(CursorOp::RemoveCurrent),
        Just(CursorOp::RemoveCurrentMovePrev),
    ]
}

#[derive(Clone, Debug)]
pub struct CursorEquivalenceInput {
    pub keys: Vec<u32>,
    pub ops: Vec<CursorOp>,
}

impl<'a> arbitrary::Arbitrary<'a> for CursorEquivalenceInput {
    fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
        // Few distinct keys, so that runs of duplicates are common.
        fn key(u: &mut arbitrary::Unstructured<'_>) -> u32 {
            u8::arbitrary(u).map_or(0, |k| u32::from(k % 32))
        }

        fn op(u: &mut arbitrary::Unstructured<'_>) -> CursorOp {
            CursorOp::arbitrary(u).unwrap_or(CursorOp::MoveNext)
        }

        let num_keys = u8::arbitrary(u)? % 100;
        let num_ops = u16::arbitrary(u)? % 1000;

        let keys = core::iter::repeat_with(|| key(u))
            .take(num_keys.into())
            .collect();

        let ops = core::iter::repeat_with(|| op(u))
            .take(num_ops.into())
            .collect();

        Ok(CursorEquivalenceInput { keys, ops })
    }
}

pub fn run_cursor_equivalence(keys: Vec<u32>, ops: Vec<CursorOp>) {
    // (key, id) pairs in the order the map should yield them: a stable sort keeps equal keys in
    // insertion order.
    let mut vec: Vec<(u32, u32)> = keys.iter().copied().zip(0..).collect();
    vec.sort_by_key(|&(key, _)| key);

    let mut map: MultiMap<MapNode, u32> = MultiMap::new();

    for (id, key) in keys.into_iter().enumerate() {
        map.insert(key, MapNode::new(id as u32));
    }

    fn vec_curs_prev(v: &[(u32, u32)], curs: Option<usize>) -> Option<usize> {
        match curs {
            Some(i) => i.checked_sub(1),
            None => v.len().checked_sub(1),
        }
    }

    fn vec_curs_next(v: &[(u32, u32)], curs: Option<usize>) -> Option<usize> {
        match curs {
            Some(i) => i.checked_add(1).filter(|&i| i < v.len()),
            None => (!v.is_empty()).then_some(0),
        }
    }

    let mut vec_curs = vec_curs_next(&vec, None);
    let mut map_curs = map.cursor_first_mut();

    // Check that the initial states are equivalent.
    {
        let v = vec_curs.map(|i| vec[i].1);
        let m = map_curs.get().map(|node| node.id);

        assert_eq!(v, m);
    }

    for op in ops {
        match op {
            CursorOp::MoveNext => {
                vec_curs = vec_curs_next(&vec, vec_curs);
                map_curs.move_next();
            }

            CursorOp::MovePrev => {
                vec_curs = vec_curs_prev(&vec, vec_curs);
                map_curs.move_prev();
            }

            CursorOp::PeekNext => {
                let v = vec_curs_next(&vec, vec_curs).map(|i| vec[i].1);
                let m = map_curs.peek_next().map(|node| node.id);

                assert_eq!(v, m);
            }

            CursorOp::PeekPrev => {
                let v = vec_curs_prev(&vec, vec_curs).map(|i| vec[i].1);
                let m = map_curs.peek_prev().map(|node| node.id);

                assert_eq!(v, m);
            }

            CursorOp::RemoveCurrent => {
                let v = vec_curs.map(|i| vec.remove(i).1);

                if vec_curs == Some(vec.len()) {
                    vec_curs = None;
                }

                let m = map_curs.remove_current().map(|node| node.id);

                assert_eq!(v, m);
            }

            CursorOp::RemoveCurrentMovePrev => {
                let new_v_curs = vec_curs.is_some().then(|| vec_curs_prev(&vec, vec_curs));
                let v = vec_curs.map(|i| vec.remove(i).1);

                if let Some(vc) = new_v_curs {
                    vec_curs = vc;
                }

                let m = map_curs
                    .remove_current_and_move_prev()
                    .map(|node| node.id);

                assert_eq!(v, m);
            }
        }

        let v = vec_curs.map(|i| vec[i]);
        let m = map_curs.key().copied().zip(map_curs.get().map(|node| node.id));

        assert_eq!(v, m);
    }

    drop(map_curs);
    map.assert_invariants();
    assert_eq!(vec.len(), map.len());

    map.delete_all();
}
