// Bottom-up merge sort over raw link chains.
//
// Elements are taken one at a time from the front of the list and carried into an array of
// buckets, where bucket `i` is either empty or holds a sorted run of `2^i` elements. When a carry
// meets an occupied bucket the two are merged and the result moves one bucket up. Once the source
// is exhausted the remaining buckets are merged together.
//
// Runs are plain chains of nodes still tagged as owned by the list being sorted, so nothing is
// allocated and no ownership bookkeeping happens until the result is installed back.

use core::{cmp::Ordering, mem, ptr::NonNull};

use cordyceps::Linked;

use super::{links, Link, Links, List};
use crate::owner::Tracker;

// A bucket `i` holds `2^i` elements, so this covers any list that fits in memory.
const MAX_BUCKETS: usize = usize::BITS as usize;

struct Run<T: ?Sized> {
    head: Link<T>,
    tail: Link<T>,
    len: usize,
}

impl<T: ?Sized> Default for Run<T> {
    fn default() -> Self {
        Run {
            head: None,
            tail: None,
            len: 0,
        }
    }
}

impl<T> Run<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn is_empty(&self) -> bool {
        self.len == 0
    }

    unsafe fn pop_front(&mut self) -> Link<T> {
        let head = self.head?;

        unsafe {
            let next = links(head).set_next(None);
            match next {
                Some(next) => {
                    links(next).set_prev(None);
                }
                None => self.tail = None,
            }
            self.head = next;
        }

        self.len -= 1;
        Some(head)
    }

    unsafe fn push_back(&mut self, node: NonNull<T>) {
        unsafe {
            links(node).set_prev(self.tail);
            links(node).set_next(None);

            match self.tail {
                Some(tail) => {
                    links(tail).set_next(Some(node));
                }
                None => self.head = Some(node),
            }
        }

        self.tail = Some(node);
        self.len += 1;
    }

    // Appends the whole of `other`, leaving it empty.
    unsafe fn append(&mut self, other: &mut Run<T>) {
        let Some(other_head) = other.head else {
            return;
        };

        unsafe {
            links(other_head).set_prev(self.tail);
            match self.tail {
                Some(tail) => {
                    links(tail).set_next(Some(other_head));
                }
                None => self.head = Some(other_head),
            }
        }

        self.tail = other.tail;
        self.len += other.len;
        *other = Run::default();
    }

    // Stable merge: on ties, elements of `left` come first.
    unsafe fn merge<F>(mut left: Run<T>, mut right: Run<T>, compare: &mut F) -> Run<T>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let mut out = Run::default();

        unsafe {
            while let (Some(l), Some(r)) = (left.head, right.head) {
                let node = if compare(r.as_ref(), l.as_ref()) == Ordering::Less {
                    right.pop_front()
                } else {
                    left.pop_front()
                };

                if let Some(node) = node {
                    out.push_back(node);
                }
            }

            out.append(&mut left);
            out.append(&mut right);
        }

        out
    }
}

impl<T> List<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    /// Sorts the list with a comparator function. The sort is stable.
    ///
    /// This operation completes in _O(n log(n))_ time and does not allocate. If `compare` panics,
    /// the elements of the list are leaked.
    pub fn sort_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        if self.len < 2 {
            return;
        }

        let len = self.len;
        let mut source = self.take_run();
        let mut buckets: [Run<T>; MAX_BUCKETS] = core::array::from_fn(|_| Run::default());
        let mut fill = 0;

        unsafe {
            while let Some(node) = source.pop_front() {
                let mut carry = Run::default();
                carry.push_back(node);

                let mut i = 0;
                while i < fill && !buckets[i].is_empty() {
                    // Bucket contents came from earlier in the list, so they go on the left.
                    carry = Run::merge(mem::take(&mut buckets[i]), carry, &mut compare);
                    i += 1;
                }

                debug_assert!(i < MAX_BUCKETS);
                buckets[i] = carry;

                if i == fill {
                    fill += 1;
                }
            }

            let mut sorted = Run::default();
            for bucket in buckets[..fill].iter_mut() {
                sorted = Run::merge(mem::take(bucket), sorted, &mut compare);
            }

            self.install_run(sorted);
        }

        log::trace!("sort: sorted {len} elements using {fill} buckets");
    }

    /// Merges the sorted list `other` into this sorted list with a comparator function, leaving
    /// `other` empty.
    ///
    /// The merge is stable: on ties, elements already in `self` come first. This operation completes
    /// in _O(n + m)_ time.
    pub fn merge_by<F>(&mut self, other: &mut List<T>, mut compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        if Tracker::ENABLED {
            let mut opt_cur = other.head;
            while let Some(cur) = opt_cur {
                unsafe {
                    self.owner.adopt(&other.owner, links(cur).tag_mut());
                    opt_cur = links(cur).next();
                }
            }
        }

        let merged_len = other.len;
        let left = self.take_run();
        let right = other.take_run();

        unsafe {
            let merged = Run::merge(left, right, &mut compare);
            self.install_run(merged);
        }

        log::trace!("merge: merged {merged_len} elements, list now holds {}", self.len);
    }

    // Detaches every node into a raw run. Nodes keep their owner tags and linked flags.
    fn take_run(&mut self) -> Run<T> {
        let run = Run {
            head: self.head.take(),
            tail: self.tail.take(),
            len: self.len,
        };
        self.len = 0;
        run
    }

    unsafe fn install_run(&mut self, run: Run<T>) {
        debug_assert!(self.is_empty());

        self.head = run.head;
        self.tail = run.tail;
        self.len = run.len;
    }
}
