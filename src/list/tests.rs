extern crate std;

use std::{ops::Range, prelude::v1::*};

use proptest::prelude::*;

use crate::model::{self, ListNode};

use super::*;

fn values(list: &List<ListNode>) -> Vec<u32> {
    list.iter().map(|node| node.value).collect()
}

fn list_of(items: &[u32]) -> List<ListNode> {
    let mut list = List::new();
    for &value in items {
        list.push_back(ListNode::new(value));
    }
    list
}

fn nth(list: &List<ListNode>, index: usize) -> NonNull<ListNode> {
    list.iter().nth(index).map(NonNull::from).expect("index out of range")
}

#[test]
fn push_pop() {
    let mut list: List<ListNode> = List::new();
    assert!(list.is_empty());
    assert!(list.pop_front().is_none());
    assert!(list.pop_back().is_none());

    list.push_back(ListNode::new(2));
    list.push_back(ListNode::new(3));
    list.push_front(ListNode::new(1));
    list.assert_invariants();

    assert_eq!(values(&list), [1, 2, 3]);
    assert_eq!(list.len(), 3);
    assert_eq!(list.front().map(|node| node.value), Some(1));
    assert_eq!(list.back().map(|node| node.value), Some(3));

    let front = list.pop_front().unwrap();
    assert_eq!(front.value, 1);
    assert!(!front.links.is_linked());

    assert_eq!(list.pop_back().map(|node| node.value), Some(3));
    assert_eq!(list.pop_back().map(|node| node.value), Some(2));
    assert!(list.is_empty());
    list.assert_invariants();
}

#[test]
fn iterates_both_ways() {
    let mut list = list_of(&[1, 2, 3, 4]);

    let rev: Vec<u32> = list.iter().rev().map(|node| node.value).collect();
    assert_eq!(rev, [4, 3, 2, 1]);

    let mut iter = list.iter();
    assert_eq!(iter.len(), 4);
    assert_eq!(iter.next().map(|node| node.value), Some(1));
    assert_eq!(iter.next_back().map(|node| node.value), Some(4));
    assert_eq!(iter.len(), 2);
    assert_eq!(iter.next().map(|node| node.value), Some(2));
    assert_eq!(iter.next_back().map(|node| node.value), Some(3));
    assert!(iter.next().is_none());
    assert!(iter.next_back().is_none());

    assert_eq!((&list).into_iter().count(), 4);
    list.delete_all();
}

#[test]
fn insert_and_remove_at_positions() {
    let mut list = list_of(&[1, 3]);

    let three = nth(&list, 1);
    let two = unsafe { list.insert_before(Some(three), ListNode::new(2)) };
    unsafe { list.insert_before(None, ListNode::new(4)) };
    list.assert_invariants();
    assert_eq!(values(&list), [1, 2, 3, 4]);

    let removed = unsafe { list.remove(two) };
    assert_eq!(removed.value, 2);
    assert!(!removed.links.is_linked());
    list.assert_invariants();
    assert_eq!(values(&list), [1, 3, 4]);

    let four = nth(&list, 2);
    assert!(unsafe { list.remove_if(four, |node| node.value == 5) }.is_none());
    assert_eq!(
        unsafe { list.remove_if(four, |node| node.value == 4) }.map(|node| node.value),
        Some(4)
    );
    assert_eq!(values(&list), [1, 3]);
    list.delete_all();
}

#[test]
fn remove_ranges() {
    let mut list = list_of(&[0, 1, 2, 3, 4, 5, 6]);

    // [2, 5)
    let (two, five) = (nth(&list, 2), nth(&list, 5));
    let mut removed = unsafe { list.remove_range(two, Some(five)) };
    removed.assert_invariants();
    list.assert_invariants();
    assert_eq!(values(&removed), [2, 3, 4]);
    assert_eq!(values(&list), [0, 1, 5, 6]);
    removed.delete_all();

    // Empty range.
    let one = nth(&list, 1);
    let removed = unsafe { list.remove_range(one, Some(one)) };
    assert!(removed.is_empty());

    // To the end.
    let mut removed = unsafe { list.remove_range(one, None) };
    assert_eq!(values(&removed), [1, 5, 6]);
    assert_eq!(values(&list), [0]);
    list.assert_invariants();

    removed.delete_all();
    list.delete_all();
}

#[test]
fn remove_all_if_keeps_order() {
    let mut list = list_of(&[1, 2, 3, 4, 5, 6]);

    let mut evens = list.remove_all_if(|node| node.value % 2 == 0);
    evens.assert_invariants();
    list.assert_invariants();

    assert_eq!(values(&evens), [2, 4, 6]);
    assert_eq!(values(&list), [1, 3, 5]);

    evens.delete_all();
    list.delete_all();
}

#[test]
fn drain_and_delete_all() {
    let mut list = list_of(&[1, 2, 3, 4]);

    let mut drain = list.remove_all();
    assert_eq!(drain.len(), 4);
    assert_eq!(drain.next().map(|node| node.value), Some(1));
    assert_eq!(drain.next_back().map(|node| node.value), Some(4));
    drop(drain);

    // The rest was dropped along with the iterator.
    assert!(list.is_empty());
    list.assert_invariants();

    let mut list = list_of(&[1, 2, 3]);
    list.delete_all();
    assert!(list.is_empty());
    list.assert_invariants();
}

#[test]
fn splicing() {
    let mut a = list_of(&[1, 5]);
    let mut b = list_of(&[2, 3, 4]);

    let five = nth(&a, 1);
    unsafe { a.splice(Some(five), &mut b) };
    a.assert_invariants();
    b.assert_invariants();
    assert!(b.is_empty());
    assert_eq!(values(&a), [1, 2, 3, 4, 5]);

    let mut c = list_of(&[0]);
    a.prepend(&mut c);
    let mut d = list_of(&[6, 7]);
    a.append(&mut d);
    assert_eq!(values(&a), [0, 1, 2, 3, 4, 5, 6, 7]);

    // Move [2, 5) of `a` to the front of `b`.
    let (two, five) = (nth(&a, 2), nth(&a, 5));
    unsafe { b.splice_range(None, &mut a, two, Some(five)) };
    a.assert_invariants();
    b.assert_invariants();
    assert_eq!(values(&a), [0, 1, 5, 6, 7]);
    assert_eq!(values(&b), [2, 3, 4]);

    // Single element, and the moved node now belongs to `b`.
    let seven = nth(&a, 4);
    let three = nth(&b, 1);
    unsafe { b.splice_one(Some(three), &mut a, seven) };
    a.assert_invariants();
    b.assert_invariants();
    assert_eq!(values(&a), [0, 1, 5, 6]);
    assert_eq!(values(&b), [2, 7, 3, 4]);

    let removed = unsafe { b.remove(seven) };
    assert_eq!(removed.value, 7);

    a.delete_all();
    b.delete_all();
}

#[test]
fn move_and_swap() {
    let mut list = list_of(&[1, 2, 3, 4]);

    let one = nth(&list, 0);
    unsafe { list.move_before(one, None) };
    assert_eq!(values(&list), [2, 3, 4, 1]);

    let four = nth(&list, 2);
    let two = nth(&list, 0);
    unsafe { list.move_before(four, Some(two)) };
    assert_eq!(values(&list), [4, 2, 3, 1]);

    // Moving in front of itself or its successor is a no-op.
    let three = nth(&list, 2);
    unsafe { list.move_before(three, Some(three)) };
    let one = nth(&list, 3);
    unsafe { list.move_before(three, Some(one)) };
    assert_eq!(values(&list), [4, 2, 3, 1]);
    list.assert_invariants();

    let mut other = list_of(&[9]);
    list.swap(&mut other);
    list.assert_invariants();
    other.assert_invariants();
    assert_eq!(values(&list), [9]);
    assert_eq!(values(&other), [4, 2, 3, 1]);

    // Nodes follow their contents across the swap.
    assert_eq!(unsafe { other.remove(three) }.value, 3);

    list.delete_all();
    other.delete_all();
}

#[test]
fn sort_is_stable() {
    #[derive(Debug)]
    #[repr(C)]
    struct Pair {
        links: Links<Pair>,
        key: u32,
        seq: u32,
    }

    unsafe impl Linked<Links<Pair>> for Pair {
        type Handle = Box<Pair>;

        fn into_ptr(r: Self::Handle) -> NonNull<Self> {
            NonNull::new(Box::into_raw(r)).unwrap()
        }

        unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
            unsafe { Box::from_raw(ptr.as_ptr()) }
        }

        unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<Pair>> {
            // SAFETY: Self is #[repr(C)] and `links` is first field
            ptr.cast()
        }
    }

    let keys = [3, 1, 2, 1, 3, 2, 1, 0, 3];
    let mut list: List<Pair> = List::new();
    for (seq, &key) in keys.iter().enumerate() {
        list.push_back(Box::new(Pair {
            links: Links::new(),
            key,
            seq: seq as u32,
        }));
    }

    list.sort_by_key(|pair| pair.key);
    list.assert_invariants();

    let sorted: Vec<(u32, u32)> = list.iter().map(|pair| (pair.key, pair.seq)).collect();
    let mut expected: Vec<(u32, u32)> = keys.iter().copied().zip(0..).collect();
    expected.sort_by_key(|&(key, _)| key);
    assert_eq!(sorted, expected);

    list.delete_all();
}

#[test]
fn sort_merge_unique() {
    let mut list = list_of(&[5, 1, 4, 1, 5, 9, 2, 6]);
    list.sort();
    list.assert_invariants();
    assert_eq!(values(&list), [1, 1, 2, 4, 5, 5, 6, 9]);

    let mut other = list_of(&[0, 3, 5, 10]);
    list.merge(&mut other);
    list.assert_invariants();
    other.assert_invariants();
    assert!(other.is_empty());
    assert_eq!(values(&list), [0, 1, 1, 2, 3, 4, 5, 5, 5, 6, 9, 10]);

    let mut dups = list.unique();
    dups.assert_invariants();
    list.assert_invariants();
    assert_eq!(values(&list), [0, 1, 2, 3, 4, 5, 6, 9, 10]);
    assert_eq!(values(&dups), [1, 5, 5]);
    dups.delete_all();
    list.delete_all();

    // Runs are compared against the first element kept.
    let mut list = list_of(&[1, 2, 3, 10, 11, 20]);
    let mut removed = list.unique_by(|a, b| (a.value / 10).cmp(&(b.value / 10)));
    assert_eq!(values(&list), [1, 10, 20]);
    assert_eq!(values(&removed), [2, 3, 11]);
    removed.delete_all();
    list.delete_all();

    let mut empty: List<ListNode> = List::new();
    empty.sort();
    assert!(empty.unique().is_empty());
}

#[test]
fn cursors() {
    let mut list = list_of(&[1, 2, 3]);

    let mut curs = list.cursor_front();
    assert_eq!(curs.get().map(|node| node.value), Some(1));
    curs.move_prev();
    assert!(curs.get().is_none());
    assert_eq!(curs.peek_next().map(|node| node.value), Some(1));
    assert_eq!(curs.peek_prev().map(|node| node.value), Some(3));
    curs.move_prev();
    assert_eq!(curs.get().map(|node| node.value), Some(3));

    let mut curs = list.cursor_back_mut();
    curs.insert_after(ListNode::new(4));
    curs.insert_before(ListNode::new(25));
    assert_eq!(curs.get().map(|node| node.value), Some(3));
    curs.move_prev();
    assert_eq!(curs.remove_current().map(|node| node.value), Some(25));
    assert_eq!(curs.get().map(|node| node.value), Some(3));

    let mut extra = list_of(&[8, 9]);
    curs.move_next();
    curs.move_next();
    assert!(curs.get().is_none());
    curs.splice_before(&mut extra);
    assert_eq!(curs.as_cursor().peek_prev().map(|node| node.value), Some(9));

    let mut extra = list_of(&[0]);
    curs.splice_after(&mut extra);
    assert_eq!(curs.peek_next().map(|node| node.value), Some(0));

    list.assert_invariants();
    assert_eq!(values(&list), [0, 1, 2, 3, 4, 8, 9]);

    let two = nth(&list, 2);
    let mut curs = unsafe { list.cursor_from_ptr_mut(two) };
    assert_eq!(curs.remove_current_and_move_prev().map(|node| node.value), Some(2));
    assert_eq!(curs.get().map(|node| node.value), Some(1));
    assert_eq!(values(&list), [0, 1, 3, 4, 8, 9]);

    list.delete_all();
}

// An element that sits in two lists at once, with borrowed handles. Each list sees the task
// through its own transparent wrapper, which picks the link record to use.
#[derive(Debug)]
struct Task {
    ready: Links<In<ReadyQueue>>,
    all: Links<In<AllTasks>>,
    id: u32,
}

#[derive(Debug)]
struct ReadyQueue;

#[derive(Debug)]
struct AllTasks;

trait Membership: Sized {
    unsafe fn links(task: NonNull<Task>) -> NonNull<Links<In<Self>>>;
}

impl Membership for ReadyQueue {
    unsafe fn links(task: NonNull<Task>) -> NonNull<Links<In<Self>>> {
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*task.as_ptr()).ready)) }
    }
}

impl Membership for AllTasks {
    unsafe fn links(task: NonNull<Task>) -> NonNull<Links<In<Self>>> {
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*task.as_ptr()).all)) }
    }
}

#[derive(Debug)]
#[repr(transparent)]
struct In<M> {
    task: Task,
    _m: core::marker::PhantomData<M>,
}

unsafe impl<M: Membership> Linked<Links<In<M>>> for In<M> {
    type Handle = NonNull<In<M>>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        r
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        ptr
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<In<M>>> {
        // SAFETY: `In<M>` is a transparent wrapper around `Task`
        unsafe { M::links(ptr.cast()) }
    }
}

#[test]
fn element_in_two_lists() {
    let tasks: Vec<Box<Task>> = (0..4)
        .map(|id| {
            Box::new(Task {
                ready: Links::new(),
                all: Links::new(),
                id,
            })
        })
        .collect();
    let task = |i: usize| NonNull::from(&*tasks[i]);

    let mut all: List<In<AllTasks>> = List::new();
    let mut ready: List<In<ReadyQueue>> = List::new();

    for i in 0..4 {
        all.push_back(task(i).cast());
    }
    ready.push_back(task(2).cast());
    ready.push_back(task(0).cast());
    all.assert_invariants();
    ready.assert_invariants();

    assert!(tasks[0].ready.is_linked());
    assert!(!tasks[1].ready.is_linked());
    assert!(tasks[1].all.is_linked());

    let ids: Vec<u32> = ready.iter().map(|t| t.task.id).collect();
    assert_eq!(ids, [2, 0]);

    // Leaving one list does not affect the other.
    let popped = ready.pop_front().unwrap();
    assert_eq!(unsafe { popped.as_ref() }.task.id, 2);
    assert!(!tasks[2].ready.is_linked());
    assert!(tasks[2].all.is_linked());
    assert_eq!(all.len(), 4);

    ready.delete_all();
    all.delete_all();
    assert!(tasks.iter().all(|t| !t.ready.is_linked() && !t.all.is_linked()));
}

#[cfg(any(debug_assertions, feature = "ownership-checks"))]
#[test]
#[should_panic(expected = "already linked")]
fn double_insert_panics() {
    let task = Box::new(Task {
        ready: Links::new(),
        all: Links::new(),
        id: 0,
    });
    let ptr = NonNull::from(&*task).cast::<In<ReadyQueue>>();

    let mut a: List<In<ReadyQueue>> = List::new();
    let mut b: List<In<ReadyQueue>> = List::new();
    a.push_back(ptr);
    b.push_back(ptr);
}

#[cfg(any(debug_assertions, feature = "ownership-checks"))]
#[test]
#[should_panic(expected = "not owned")]
fn removing_foreign_node_panics() {
    let mut a = list_of(&[1]);
    let b = list_of(&[2]);

    let foreign = nth(&b, 0);
    drop(unsafe { a.remove(foreign) });
}

#[cfg(any(debug_assertions, feature = "ownership-checks"))]
#[test]
#[should_panic(expected = "not owned")]
fn remove_range_with_foreign_end_panics() {
    let mut a = list_of(&[1, 2, 3]);
    let b = list_of(&[4]);

    let first = nth(&a, 0);
    let foreign = nth(&b, 0);
    drop(unsafe { a.remove_range(first, Some(foreign)) });
}

#[cfg(any(debug_assertions, feature = "ownership-checks"))]
#[test]
#[should_panic(expected = "not owned")]
fn splice_range_with_foreign_end_panics() {
    let mut a = list_of(&[1]);
    let mut b = list_of(&[2, 3]);
    let c = list_of(&[4]);

    let first = nth(&b, 0);
    let foreign = nth(&c, 0);
    unsafe { a.splice_range(None, &mut b, first, Some(foreign)) };
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "dropping a non-empty container")]
fn dropping_non_empty_list_panics() {
    let list = list_of(&[1]);
    drop(list);
}

#[test]
fn validate_reports_broken_structure() {
    let mut list = list_of(&[1, 2, 3]);
    assert_eq!(list.validate(), Ok(()));

    list.len = 4;
    assert!(matches!(
        list.validate(),
        Err(InvariantError::LengthMismatch { .. })
    ));
    list.len = 3;

    let stale = list.tail.take();
    assert!(list.validate().is_err());
    list.tail = stale;

    assert_eq!(list.validate(), Ok(()));
    list.delete_all();
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
    fn vecdeque_equivalence(ops in proptest::collection::vec(model::list_op_strategy(), FUZZ_RANGE)) {
        model::run_list_equivalence(ops);
    }
}
