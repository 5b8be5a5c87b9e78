//! An intrusive ordered multimap, backed by a red-black tree.
//!
//! Elements embed a [`Links`] record and implement [`Linked<Links<Self, K>>`]. The key an element
//! is filed under lives in its link record: [`MultiMap::insert`] moves the key into the record, and
//! every removal takes it back out and drops it. The element type itself never has to mention the
//! key, and `K` needs neither `Default` nor `Ord` (ordering comes from the map's [`Compare`]).
//!
//! Duplicate keys are allowed. A newly inserted key is placed after every existing equal key, and
//! rebalancing never reorders the in-order sequence, so elements with equal keys are always visited
//! in the order they were inserted.

// Red-black invariants maintained by every mutating method:
// 1. Every node is red or black; the root is black.
// 2. A red node never has a red child.
// 3. Every path from a node to a missing child passes through the same number of black nodes.
//
// Missing children count as black. Rebalancing follows the usual bottom-up insert and delete
// fixups; `rotate_at` is the only primitive that changes the shape of the tree.

use core::{
    cell::UnsafeCell,
    cmp::Ordering,
    fmt,
    marker::{PhantomData, PhantomPinned},
    ops::Not,
    pin::Pin,
    ptr::{self, NonNull},
};

use cordyceps::Linked;

use crate::{
    error::InvariantError,
    owner::{Tag, Tracker},
};

mod compare;
mod cursor;
mod debug;
mod iter;

#[cfg(test)]
mod tests;

pub use self::{
    compare::{Ascending, Compare, Descending},
    cursor::{Cursor, CursorMut},
    iter::{Iter, Range},
};

/// An intrusive ordered multimap.
///
/// `C` orders the keys; it defaults to [`Ascending`], which uses `K: Ord`.
pub struct MultiMap<T, K, C = Ascending>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    root: Link<T>,
    // Cached extremes, so that `first` and `last` are O(1).
    first: Link<T>,
    last: Link<T>,
    len: usize,
    compare: C,
    owner: Tracker,
    _key: PhantomData<K>,
}

/// Links embedded in an element of a [`MultiMap`], including the slot for the element's key.
pub struct Links<T: ?Sized, K> {
    inner: UnsafeCell<LinksInner<T, K>>,
}

/// The color of a tree node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Color {
    Red,
    Black,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized, K> {
    parent: Link<T>,
    children: [Link<T>; 2],
    color: Color,
    // `Some` exactly while the node is linked into a map.
    key: Option<K>,
    tag: Tag,
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

#[inline]
unsafe fn links<'a, T, K>(ptr: NonNull<T>) -> &'a Links<T, K>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    unsafe { T::links(ptr).as_ref() }
}

/// Returns the color of the pointed-to node; missing nodes are black.
#[inline]
unsafe fn color<T, K>(node: Link<T>) -> Color
where
    T: Linked<Links<T, K>> + ?Sized,
{
    match node {
        Some(node) => unsafe { links::<T, K>(node).color() },
        None => Color::Black,
    }
}

// Returns the in-order neighbor of `node` in direction `dir`.
unsafe fn neighbor<T, K>(node: NonNull<T>, dir: Dir) -> Link<T>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    unsafe {
        // The nearest node in `dir` is the extreme `!dir` node of the `dir` subtree, if any.
        if let Some(mut cur) = links::<T, K>(node).child(dir) {
            while let Some(next) = links::<T, K>(cur).child(!dir) {
                cur = next;
            }
            return Some(cur);
        }

        // Otherwise it is the first ancestor reached from its `!dir` side.
        let mut cur = node;
        while let Some(parent) = links::<T, K>(cur).parent() {
            if links::<T, K>(parent).child(!dir) == Some(cur) {
                return Some(parent);
            }
            cur = parent;
        }

        None
    }
}

#[inline]
unsafe fn successor<T, K>(node: NonNull<T>) -> Link<T>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    unsafe { neighbor::<T, K>(node, Dir::Right) }
}

#[inline]
unsafe fn predecessor<T, K>(node: NonNull<T>) -> Link<T>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    unsafe { neighbor::<T, K>(node, Dir::Left) }
}

impl<T, K> MultiMap<T, K, Ascending>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    /// Returns a new empty map ordered by `K: Ord`.
    pub const fn new() -> Self {
        Self::with_comparator(Ascending)
    }
}

impl<T, K, C> MultiMap<T, K, C>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    /// Returns a new empty map ordered by `compare`.
    pub const fn with_comparator(compare: C) -> Self {
        MultiMap {
            root: None,
            first: None,
            last: None,
            len: 0,
            compare,
            owner: Tracker::new(),
            _key: PhantomData,
        }
    }

    /// Returns `true` if the map contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of elements in the map.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns the comparator ordering this map.
    pub fn comparator(&self) -> &C {
        &self.compare
    }

    /// Returns the element with the minimum key.
    ///
    /// Among equal keys, this is the one inserted first. This operation completes in _O(1)_ time.
    pub fn first(&self) -> Option<Pin<&T>> {
        self.first
            .map(|first| unsafe { Pin::new_unchecked(first.as_ref()) })
    }

    /// Returns the element with the maximum key.
    ///
    /// Among equal keys, this is the one inserted last. This operation completes in _O(1)_ time.
    pub fn last(&self) -> Option<Pin<&T>> {
        self.last
            .map(|last| unsafe { Pin::new_unchecked(last.as_ref()) })
    }

    /// Returns the key `item` is filed under.
    ///
    /// # Safety
    ///
    /// `item` must be an element of `self`.
    pub unsafe fn key_of(&self, item: &T) -> &K {
        let ptr = NonNull::from(item);

        unsafe {
            self.owner.assert_owns(links(ptr).tag());
            links(ptr).key()
        }
    }

    /// Removes and returns the element with the minimum key.
    pub fn pop_first(&mut self) -> Option<T::Handle> {
        let first = self.first?;
        Some(unsafe { self.remove(first) })
    }

    /// Removes and returns the element with the maximum key.
    pub fn pop_last(&mut self) -> Option<T::Handle> {
        let last = self.last?;
        Some(unsafe { self.remove(last) })
    }

    /// Returns an iterator over the entries of the map, in key order.
    pub fn iter(&self) -> Iter<'_, T, K> {
        Iter::new(self.first, self.last, self.len)
    }

    /// Returns a cursor pointing to the first element of the map.
    pub fn cursor_first(&self) -> Cursor<'_, T, K, C> {
        Cursor::new(self, self.first)
    }

    /// Returns a cursor pointing to the last element of the map.
    pub fn cursor_last(&self) -> Cursor<'_, T, K, C> {
        Cursor::new(self, self.last)
    }

    /// Returns a mutable cursor pointing to the first element of the map.
    pub fn cursor_first_mut(&mut self) -> CursorMut<'_, T, K, C> {
        let first = self.first;
        CursorMut::new(self, first)
    }

    /// Returns a mutable cursor pointing to the last element of the map.
    pub fn cursor_last_mut(&mut self) -> CursorMut<'_, T, K, C> {
        let last = self.last;
        CursorMut::new(self, last)
    }

    /// Returns a cursor pointing to `node`.
    ///
    /// # Safety
    ///
    /// `node` must be an element of `self`.
    pub unsafe fn cursor_from_ptr(&self, node: NonNull<T>) -> Cursor<'_, T, K, C> {
        self.assert_owns(node);
        Cursor::new(self, Some(node))
    }

    /// Returns a mutable cursor pointing to `node`.
    ///
    /// # Safety
    ///
    /// `node` must be an element of `self`.
    pub unsafe fn cursor_from_ptr_mut(&mut self, node: NonNull<T>) -> CursorMut<'_, T, K, C> {
        self.assert_owns(node);
        CursorMut::new(self, Some(node))
    }

    /// Removes an arbitrary node from the map, dropping its key.
    ///
    /// This operation completes in _O(log(n))_ time.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    /// other map.
    pub unsafe fn remove(&mut self, node: NonNull<T>) -> T::Handle {
        unsafe {
            let node_links = links(node);
            self.owner.release(node_links.tag_mut());

            if self.first == Some(node) {
                self.first = self.successor_raw(node);
            }

            if self.last == Some(node) {
                self.last = self.predecessor_raw(node);
            }

            self.unlink(node);
            self.len -= 1;

            drop(node_links.clear());

            T::from_ptr(node)
        }
    }

    /// Removes `node` if `pred` returns `true` for it and its key.
    ///
    /// # Safety
    ///
    /// `node` must be an element of `self`.
    pub unsafe fn remove_node_if<F>(&mut self, node: NonNull<T>, pred: F) -> Option<T::Handle>
    where
        F: FnOnce(&K, &T) -> bool,
    {
        self.assert_owns(node);

        let matches = unsafe { pred(links(node).key(), node.as_ref()) };
        if matches {
            Some(unsafe { self.remove(node) })
        } else {
            None
        }
    }

    /// Removes the elements in `[first, last)`, in key order, dropping their handles.
    ///
    /// A `last` of `None` removes everything from `first` to the end. Returns the number of removed
    /// elements.
    ///
    /// # Safety
    ///
    /// `first` must be an element of `self`, and `last`, if `Some`, must be an element of `self`
    /// that does not precede `first`.
    pub unsafe fn remove_range(&mut self, first: NonNull<T>, last: Option<NonNull<T>>) -> usize {
        self.assert_owns(first);
        if let Some(last) = last {
            self.assert_owns(last);
        }

        let mut removed = 0;
        let mut opt_cur = Some(first);

        while let Some(cur) = opt_cur.filter(|&cur| Some(cur) != last) {
            unsafe {
                opt_cur = self.successor_raw(cur);
                drop(self.remove(cur));
            }
            removed += 1;
        }

        removed
    }

    /// Removes every element for which `pred` returns `true`, dropping their handles.
    ///
    /// Returns the number of removed elements.
    pub fn remove_if<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&K, &T) -> bool,
    {
        let mut removed = 0;
        let mut opt_cur = self.first;

        while let Some(cur) = opt_cur {
            unsafe {
                opt_cur = self.successor_raw(cur);

                if pred(links(cur).key(), cur.as_ref()) {
                    drop(self.remove(cur));
                    removed += 1;
                }
            }
        }

        log::trace!("remove_if: removed {removed} elements, {} remain", self.len);

        removed
    }

    /// Removes every element, passing each handle to `f`.
    ///
    /// Elements are visited right subtree first, then the subtree root, then the left subtree, so
    /// the map is never rebalanced. Returns the number of removed elements.
    pub fn remove_all<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(T::Handle),
    {
        let len = self.len;
        let root = self.root.take();

        self.first = None;
        self.last = None;
        self.len = 0;

        unsafe { self.remove_subtree(root, &mut f) };

        if len > 0 {
            log::trace!("remove_all: removed {len} elements");
        }

        len
    }

    /// Removes every element and drops its handle.
    ///
    /// For owning handles such as `Box<T>` this destroys the elements; for borrowed handles it
    /// only unlinks them.
    pub fn delete_all(&mut self) {
        self.remove_all(drop);

        debug_assert!(self.root.is_none());
        debug_assert_eq!(self.len(), 0);
    }

    // Support methods ========================================================

    #[inline]
    fn assert_owns(&self, node: NonNull<T>) {
        unsafe { self.owner.assert_owns(links(node).tag()) }
    }

    unsafe fn remove_subtree<F>(&self, opt_node: Link<T>, f: &mut F)
    where
        F: FnMut(T::Handle),
    {
        let Some(node) = opt_node else {
            return;
        };

        unsafe {
            let node_links = links(node);
            self.remove_subtree(node_links.right(), f);

            // The handle may free the node, so read the left link first.
            let left = node_links.left();

            self.owner.release(node_links.tag_mut());
            drop(node_links.clear());
            f(T::from_ptr(node));

            self.remove_subtree(left, f);
        }
    }

    #[inline]
    pub(crate) unsafe fn successor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe { successor::<T, K>(node) }
    }

    #[inline]
    pub(crate) unsafe fn predecessor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe { predecessor::<T, K>(node) }
    }

    #[inline]
    unsafe fn min_in_subtree(&self, root: NonNull<T>) -> NonNull<T> {
        let mut cur = root;

        while let Some(left) = unsafe { links(cur).left() } {
            cur = left;
        }

        cur
    }

    #[inline]
    unsafe fn max_in_subtree(&self, root: NonNull<T>) -> NonNull<T> {
        let mut cur = root;

        while let Some(right) = unsafe { links(cur).right() } {
            cur = right;
        }

        cur
    }

    #[inline]
    unsafe fn which_child(&self, parent: NonNull<T>, child: NonNull<T>) -> Dir {
        if unsafe { links(parent).left() } == Some(child) {
            Dir::Left
        } else {
            Dir::Right
        }
    }

    #[inline]
    unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { links(node).set_parent(parent) };
    }

    #[inline]
    unsafe fn replace_child_or_set_root(&mut self, parent: Link<T>, old_child: NonNull<T>, new_child: Link<T>) {
        match parent {
            Some(parent) => unsafe { self.replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that `old_child` is a child node of `parent`.
    unsafe fn replace_child(&mut self, parent: NonNull<T>, old_child: NonNull<T>, new_child: Link<T>) {
        unsafe {
            let parent_links = links(parent);

            if parent_links.left() == Some(old_child) {
                parent_links.set_child(Dir::Left, new_child);
            } else {
                debug_assert_eq!(
                    parent_links.right(),
                    Some(old_child),
                    "`old_child` must be a child of `parent`"
                );
                parent_links.set_child(Dir::Right, new_child);
            }
        }
    }

    // Performs a rotation at `down`, moving its `!dir` child up into its place and `down` itself
    // down toward `dir`.
    //
    // Colors are not updated.
    unsafe fn rotate_at(&mut self, down: NonNull<T>, dir: Dir) {
        unsafe {
            let up = links(down)
                .child(!dir)
                .expect("rotation needs a child to move up");

            // `across` goes from the `dir` child of `up` to the `!dir` child of `down`.
            let across = links(up).child(dir);
            links(down).set_child(!dir, across);
            self.maybe_set_parent(across, Some(down));

            links(up).set_child(dir, Some(down));
            let parent = links(down).set_parent(Some(up));
            links(up).set_parent(parent);

            self.replace_child_or_set_root(parent, down, Some(up));
        }
    }

    // Performs a bottom-up rebalance of the tree after the insertion of the red leaf `node`.
    unsafe fn rebalance_inserted(&mut self, node: NonNull<T>) {
        let mut x = node;

        unsafe {
            loop {
                let Some(parent) = links(x).parent() else {
                    // `x` is the root.
                    links(x).set_color(Color::Black);
                    return;
                };

                if links(parent).color() == Color::Black {
                    return;
                }

                // A red node is never the root, so `parent` has a parent.
                let grandparent = links(parent)
                    .parent()
                    .expect("red node must not be the tree root");
                let parent_dir = self.which_child(grandparent, parent);
                let uncle = links(grandparent).child(!parent_dir);

                match uncle {
                    Some(uncle) if links(uncle).color() == Color::Red => {
                        // Push the grandparent's blackness down one level and continue upward.
                        links(parent).set_color(Color::Black);
                        links(uncle).set_color(Color::Black);
                        links(grandparent).set_color(Color::Red);
                        x = grandparent;
                    }

                    _ => {
                        let mut parent = parent;

                        // Straighten an inner grandchild into an outer one first.
                        if self.which_child(parent, x) != parent_dir {
                            self.rotate_at(parent, parent_dir);
                            parent = x;
                        }

                        links(parent).set_color(Color::Black);
                        links(grandparent).set_color(Color::Red);
                        self.rotate_at(grandparent, !parent_dir);
                        return;
                    }
                }
            }
        }
    }

    // Unlinks `node` from the tree structure and restores the red-black invariants.
    //
    // The node's own links, key and tag are left untouched.
    unsafe fn unlink(&mut self, node: NonNull<T>) {
        unsafe {
            let left = links(node).left();
            let right = links(node).right();

            // `spliced` is the node that actually leaves its position: `node` itself if it has at
            // most one child, otherwise its successor, which then takes over `node`'s position.
            let spliced = match (left, right) {
                (Some(_), Some(right)) => self.min_in_subtree(right),
                _ => node,
            };

            // `spliced` has at most one child, which is raised into its place.
            let child = links(spliced).left().or(links(spliced).right());
            let spliced_parent = links(spliced).parent();
            let removed_color = links(spliced).color();

            self.maybe_set_parent(child, spliced_parent);
            self.replace_child_or_set_root(spliced_parent, spliced, child);

            let mut child_parent = spliced_parent;

            if !ptr::addr_eq(spliced.as_ptr(), node.as_ptr()) {
                if child_parent == Some(node) {
                    child_parent = Some(spliced);
                }

                // Move the successor into `node`'s position, taking its color.
                let parent = links(node).parent();
                links(spliced).set_parent(parent);
                self.replace_child_or_set_root(parent, node, Some(spliced));

                let left = links(node).left();
                links(spliced).set_child(Dir::Left, left);
                self.maybe_set_parent(left, Some(spliced));

                let right = links(node).right();
                links(spliced).set_child(Dir::Right, right);
                self.maybe_set_parent(right, Some(spliced));

                links(spliced).set_color(links(node).color());
            }

            // Removing a red node never changes a black height.
            if removed_color == Color::Black {
                self.rebalance_removed(child, child_parent);
            }
        }
    }

    // Restores the black-height invariant after a black node was removed above `x`.
    //
    // `x` carries an extra unit of blackness. It may be a missing child, so its parent is passed
    // separately.
    unsafe fn rebalance_removed(&mut self, mut x: Link<T>, mut parent: Link<T>) {
        unsafe {
            while x != self.root && color::<T, K>(x) == Color::Black {
                let Some(p) = parent else {
                    break;
                };

                let dir = if links(p).left() == x {
                    Dir::Left
                } else {
                    Dir::Right
                };

                // `x` is doubly black, so its sibling has a black height of at least one.
                let mut sibling = links(p)
                    .child(!dir)
                    .expect("doubly black node must have a sibling");

                if links(sibling).color() == Color::Red {
                    links(sibling).set_color(Color::Black);
                    links(p).set_color(Color::Red);
                    self.rotate_at(p, dir);
                    sibling = links(p)
                        .child(!dir)
                        .expect("doubly black node must have a sibling");
                }

                let near = links(sibling).child(dir);
                let far = links(sibling).child(!dir);

                if color::<T, K>(near) == Color::Black && color::<T, K>(far) == Color::Black {
                    // Move the extra blackness up to the parent.
                    links(sibling).set_color(Color::Red);
                    x = Some(p);
                    parent = links(p).parent();
                    continue;
                }

                if color::<T, K>(far) == Color::Black {
                    // The near nephew is red; rotate it into the far position.
                    if let Some(near) = near {
                        links(near).set_color(Color::Black);
                    }
                    links(sibling).set_color(Color::Red);
                    self.rotate_at(sibling, !dir);
                    sibling = links(p)
                        .child(!dir)
                        .expect("doubly black node must have a sibling");
                }

                links(sibling).set_color(links(p).color());
                links(p).set_color(Color::Black);
                if let Some(far) = links(sibling).child(!dir) {
                    links(far).set_color(Color::Black);
                }
                self.rotate_at(p, dir);

                x = self.root;
                break;
            }

            if let Some(x) = x {
                links(x).set_color(Color::Black);
            }
        }
    }
}

impl<T, K, C> MultiMap<T, K, C>
where
    T: Linked<Links<T, K>> + ?Sized,
    C: Compare<K>,
{
    /// Inserts an element under `key`.
    ///
    /// The key is moved into the element's links. If elements with an equal key are already present,
    /// the new element is placed after all of them. Returns a cursor pointing at the new element.
    ///
    /// This operation completes in _O(log(n))_ time.
    ///
    /// # Panics
    ///
    /// With ownership checks enabled, panics if the element is already linked into a map.
    pub fn insert(&mut self, key: K, item: T::Handle) -> CursorMut<'_, T, K, C> {
        let ptr = T::into_ptr(item);

        unsafe {
            let ptr_links = links(ptr);
            debug_assert!(!ptr_links.is_linked(), "node is already linked into a map");
            self.owner.claim(ptr_links.tag_mut());

            let mut opt_parent = None;
            let mut dir = Dir::Left;
            let mut is_first = true;
            let mut is_last = true;

            // Descend the tree, looking for a suitable leaf. Equal keys go right.
            let mut opt_cur = self.root;
            while let Some(cur) = opt_cur {
                dir = match self.compare.compare(&key, links(cur).key()) {
                    Ordering::Less => Dir::Left,
                    Ordering::Equal | Ordering::Greater => Dir::Right,
                };

                match dir {
                    Dir::Left => is_last = false,
                    Dir::Right => is_first = false,
                }

                opt_parent = Some(cur);
                opt_cur = links(cur).child(dir);
            }

            ptr_links.init(key, opt_parent);

            match opt_parent {
                Some(parent) => {
                    links(parent).set_child(dir, Some(ptr));
                }
                None => self.root = Some(ptr),
            }

            if is_first {
                self.first = Some(ptr);
            }

            if is_last {
                self.last = Some(ptr);
            }

            self.len += 1;
            self.rebalance_inserted(ptr);
        }

        CursorMut::new(self, Some(ptr))
    }

    /// Returns a cursor pointing at the first element with a key equal to `key`.
    ///
    /// If there is no such element, the cursor points to the "ghost" non-element.
    pub fn find(&self, key: &K) -> Cursor<'_, T, K, C> {
        Cursor::new(self, self.find_raw(key))
    }

    /// Returns a mutable cursor pointing at the first element with a key equal to `key`.
    pub fn find_mut(&mut self, key: &K) -> CursorMut<'_, T, K, C> {
        let found = self.find_raw(key);
        CursorMut::new(self, found)
    }

    /// Returns a reference to the first element with a key equal to `key`.
    pub fn get(&self, key: &K) -> Option<Pin<&T>> {
        let ptr = self.find_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns `true` if the map contains an element with a key equal to `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.find_raw(key).is_some()
    }

    /// Returns a cursor pointing at the first element whose key is not less than `key`.
    pub fn lower_bound(&self, key: &K) -> Cursor<'_, T, K, C> {
        Cursor::new(self, self.lower_bound_raw(key))
    }

    /// Returns a mutable cursor pointing at the first element whose key is not less than `key`.
    pub fn lower_bound_mut(&mut self, key: &K) -> CursorMut<'_, T, K, C> {
        let bound = self.lower_bound_raw(key);
        CursorMut::new(self, bound)
    }

    /// Returns a cursor pointing at the first element whose key is greater than `key`.
    pub fn upper_bound(&self, key: &K) -> Cursor<'_, T, K, C> {
        Cursor::new(self, self.upper_bound_raw(key))
    }

    /// Returns a mutable cursor pointing at the first element whose key is greater than `key`.
    pub fn upper_bound_mut(&mut self, key: &K) -> CursorMut<'_, T, K, C> {
        let bound = self.upper_bound_raw(key);
        CursorMut::new(self, bound)
    }

    /// Returns an iterator over every element with a key equal to `key`, in insertion order.
    ///
    /// Locating the range completes in _O(log(n))_ time.
    pub fn equal_range(&self, key: &K) -> Range<'_, T, K> {
        let lower = self.lower_bound_raw(key);
        let upper = self.upper_bound_raw(key);

        if lower == upper {
            return Range::empty();
        }

        let back = match upper {
            Some(upper) => unsafe { self.predecessor_raw(upper) },
            None => self.last,
        };

        Range::new(lower, back)
    }

    /// Returns the number of elements with a key equal to `key`.
    ///
    /// This operation completes in _O(log(n) + k)_ time, where _k_ is the returned count.
    pub fn count(&self, key: &K) -> usize {
        self.equal_range(key).count()
    }

    /// Removes every element with a key equal to `key`, dropping their handles.
    ///
    /// Returns the number of removed elements.
    pub fn remove_key(&mut self, key: &K) -> usize {
        let Some(first) = self.lower_bound_raw(key) else {
            return 0;
        };
        let end = self.upper_bound_raw(key);

        let removed = unsafe { self.remove_range(first, end) };

        log::trace!("remove_key: removed {removed} elements");

        removed
    }

    /// Removes the first element with a key equal to `key` and returns it.
    pub fn pop_key(&mut self, key: &K) -> Option<T::Handle> {
        let found = self.find_raw(key)?;
        Some(unsafe { self.remove(found) })
    }

    /// Checks every structural invariant of the tree: parent links, key slots, ownership, the
    /// red-black rules, key order, the cached extremes and the stored length.
    ///
    /// This operation completes in _O(n)_ time.
    pub fn validate(&self) -> Result<(), InvariantError> {
        let result = self.validate_inner();

        if let Err(ref error) = result {
            log::debug!("multimap failed validation: {error}");
        }

        result
    }

    fn validate_inner(&self) -> Result<(), InvariantError> {
        let Some(root) = self.root else {
            if self.len != 0 {
                return Err(InvariantError::LengthMismatch {
                    expected: self.len,
                    actual: 0,
                });
            }

            if self.first.is_some() {
                return Err(InvariantError::StaleBound { which: "first" });
            }

            if self.last.is_some() {
                return Err(InvariantError::StaleBound { which: "last" });
            }

            return Ok(());
        };

        unsafe {
            if links(root).parent().is_some() {
                return Err(InvariantError::BrokenBackLink { position: 0 });
            }

            if links(root).is_linked() && links(root).color() == Color::Red {
                return Err(InvariantError::RedRoot);
            }

            let mut walk = Walk {
                position: 0,
                prev: None,
            };
            self.check_subtree(root, &mut walk)?;

            if walk.position != self.len {
                return Err(InvariantError::LengthMismatch {
                    expected: self.len,
                    actual: walk.position,
                });
            }

            if self.first != Some(self.min_in_subtree(root)) {
                return Err(InvariantError::StaleBound { which: "first" });
            }

            if self.last != Some(self.max_in_subtree(root)) {
                return Err(InvariantError::StaleBound { which: "last" });
            }
        }

        Ok(())
    }

    // Checks the subtree rooted at `node` in order, returning its black height.
    unsafe fn check_subtree(&self, node: NonNull<T>, walk: &mut Walk<T>) -> Result<usize, InvariantError> {
        unsafe {
            let node_links = links(node);

            let left_height = match node_links.left() {
                Some(left) => {
                    self.check_child(node, left, walk)?;
                    self.check_subtree(left, walk)?
                }
                None => 0,
            };

            // Visit the node itself.
            let position = walk.position;

            if !node_links.is_linked() {
                return Err(InvariantError::NotContained { position });
            }

            if !self.owner.owns(node_links.tag()) {
                return Err(InvariantError::ForeignNode { position });
            }

            if let Some(prev) = walk.prev {
                if self.compare.compare(node_links.key(), links(prev).key()) == Ordering::Less {
                    return Err(InvariantError::OutOfOrder { position });
                }
            }

            walk.position += 1;
            walk.prev = Some(node);

            // Bail out before recursing forever on a cycle.
            if walk.position > self.len {
                return Err(InvariantError::LengthMismatch {
                    expected: self.len,
                    actual: walk.position,
                });
            }

            let right_height = match node_links.right() {
                Some(right) => {
                    self.check_child(node, right, walk)?;
                    self.check_subtree(right, walk)?
                }
                None => 0,
            };

            if node_links.color() == Color::Red
                && (color::<T, K>(node_links.left()) == Color::Red
                    || color::<T, K>(node_links.right()) == Color::Red)
            {
                return Err(InvariantError::RedRed { position });
            }

            if left_height != right_height {
                return Err(InvariantError::BlackHeight {
                    position,
                    left: left_height,
                    right: right_height,
                });
            }

            Ok(left_height + usize::from(node_links.color() == Color::Black))
        }
    }

    unsafe fn check_child(&self, node: NonNull<T>, child: NonNull<T>, walk: &Walk<T>) -> Result<(), InvariantError> {
        if unsafe { links(child).parent() } != Some(node) {
            return Err(InvariantError::BrokenBackLink {
                position: walk.position,
            });
        }

        Ok(())
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        if let Err(error) = self.validate() {
            panic!("multimap invariant violated: {error}");
        }
    }

    fn find_raw(&self, key: &K) -> Link<T> {
        let lower = self.lower_bound_raw(key)?;

        match self.compare.compare(key, unsafe { links(lower).key() }) {
            Ordering::Less => None,
            Ordering::Equal | Ordering::Greater => Some(lower),
        }
    }

    fn lower_bound_raw(&self, key: &K) -> Link<T> {
        let mut bound = None;
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                let cur_links = links(cur);
                if self.compare.compare(cur_links.key(), key) == Ordering::Less {
                    opt_cur = cur_links.right();
                } else {
                    bound = Some(cur);
                    opt_cur = cur_links.left();
                }
            }
        }

        bound
    }

    fn upper_bound_raw(&self, key: &K) -> Link<T> {
        let mut bound = None;
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                let cur_links = links(cur);
                if self.compare.compare(key, cur_links.key()) == Ordering::Less {
                    bound = Some(cur);
                    opt_cur = cur_links.left();
                } else {
                    opt_cur = cur_links.right();
                }
            }
        }

        bound
    }
}

// In-order traversal state for `validate`.
struct Walk<T: ?Sized> {
    position: usize,
    prev: Link<T>,
}

impl<T, K, C> Drop for MultiMap<T, K, C>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    fn drop(&mut self) {
        debug_assert!(
            self.is_empty() || std::thread::panicking(),
            "dropping a non-empty container"
        );
        self.delete_all();
    }
}

impl<T, K, C> Default for MultiMap<T, K, C>
where
    T: Linked<Links<T, K>> + ?Sized,
    C: Default,
{
    fn default() -> Self {
        Self::with_comparator(C::default())
    }
}

impl<T, K, C> fmt::Debug for MultiMap<T, K, C>
where
    T: Linked<Links<T, K>> + ?Sized,
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter().map(|(key, _)| key)).finish()
    }
}

impl<'tree, T, K, C> IntoIterator for &'tree MultiMap<T, K, C>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    type Item = (&'tree K, &'tree T);
    type IntoIter = Iter<'tree, T, K>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

unsafe impl<T, K, C> Send for MultiMap<T, K, C>
where
    T: Linked<Links<T, K>> + Send + ?Sized,
    K: Send,
    C: Send,
{
}

impl<T: ?Sized, K> Links<T, K> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                color: Color::Black,
                key: None,
                tag: Tag::new(),
                _unpin: PhantomPinned,
            }),
        }
    }

    /// Returns `true` if the element is currently linked into a map.
    #[inline]
    pub fn is_linked(&self) -> bool {
        unsafe { (*self.inner.get()).key.is_some() }
    }

    // Prepares a free node to become a red leaf under `parent`.
    #[inline]
    fn init(&self, key: K, parent: Link<T>) {
        let inner = self.inner.get();

        unsafe {
            (*inner).parent = parent;
            (*inner).children = [None; 2];
            (*inner).color = Color::Red;
            (*inner).key = Some(key);
        }
    }

    // Returns a removed node to the free state, handing back its key.
    #[inline]
    fn clear(&self) -> Option<K> {
        let inner = self.inner.get();

        unsafe {
            (*inner).parent = None;
            (*inner).children = [None; 2];
            (*inner).color = Color::Black;
            (*inner).key.take()
        }
    }

    #[inline]
    fn key(&self) -> &K {
        match unsafe { &(*self.inner.get()).key } {
            Some(key) => key,
            None => unreachable!("key slot of a linked node is empty"),
        }
    }

    #[inline]
    fn color(&self) -> Color {
        unsafe { (*self.inner.get()).color }
    }

    #[inline]
    fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    fn tag(&self) -> &Tag {
        unsafe { &(*self.inner.get()).tag }
    }

    #[inline]
    #[allow(clippy::mut_from_ref)]
    unsafe fn tag_mut(&self) -> &mut Tag {
        unsafe { &mut (*self.inner.get()).tag }
    }

    #[inline]
    fn set_parent(&self, parent: Link<T>) -> Link<T> {
        unsafe { ptr::replace(ptr::addr_of_mut!((*self.inner.get()).parent), parent) }
    }

    #[inline]
    fn set_child(&self, dir: Dir, child: Link<T>) -> Link<T> {
        unsafe {
            ptr::replace(
                ptr::addr_of_mut!((*self.inner.get()).children[dir as usize]),
                child,
            )
        }
    }

    #[inline]
    fn set_color(&self, color: Color) {
        unsafe { (*self.inner.get()).color = color };
    }
}

impl<T: ?Sized, K> Default for Links<T, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized, K> fmt::Debug for Links<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .field("color", &self.color())
            .field("linked", &self.is_linked())
            .finish()
    }
}

unsafe impl<T: Send + ?Sized, K: Send> Send for Links<T, K> {}
