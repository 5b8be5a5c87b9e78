//! An intrusive doubly-linked list.
//!
//! Elements embed a [`Links`] record and implement [`Linked<Links<Self>>`]. The list only threads
//! existing elements together: it never allocates, and the element's [`Linked::Handle`] type decides
//! whether handing an element to the list transfers ownership (`Box<T>`) or merely lends it
//! (`NonNull<T>`, `Pin<&T>`).
//!
//! The past-the-end position is represented explicitly as `None`. Methods taking a position accept
//! an `Option<NonNull<T>>`, where `None` means "the end of the list".

use core::{
    cell::UnsafeCell,
    cmp::Ordering,
    fmt,
    marker::PhantomPinned,
    mem,
    pin::Pin,
    ptr::{self, NonNull},
};

use cordyceps::Linked;

use crate::{
    error::InvariantError,
    owner::{Tag, Tracker},
};

mod cursor;
mod iter;
mod sort;

#[cfg(test)]
mod tests;

pub use self::{
    cursor::{Cursor, CursorMut},
    iter::{Drain, Iter},
};

/// An intrusive doubly-linked list.
pub struct List<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    head: Link<T>,
    tail: Link<T>,
    len: usize,
    owner: Tracker,
}

/// Links embedded in an element of a [`List`].
pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    next: Link<T>,
    prev: Link<T>,
    linked: bool,
    tag: Tag,
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

#[inline]
unsafe fn links<'a, T>(ptr: NonNull<T>) -> &'a Links<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    unsafe { T::links(ptr).as_ref() }
}

impl<T> List<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    /// Returns a new empty list.
    pub const fn new() -> List<T> {
        List {
            head: None,
            tail: None,
            len: 0,
            owner: Tracker::new(),
        }
    }

    /// Returns `true` if the list contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.head.is_none());
        }

        empty
    }

    /// Returns the number of elements in the list.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns a reference to the first element of the list.
    pub fn front(&self) -> Option<Pin<&T>> {
        self.head.map(|head| unsafe { Pin::new_unchecked(head.as_ref()) })
    }

    /// Returns a reference to the last element of the list.
    pub fn back(&self) -> Option<Pin<&T>> {
        self.tail.map(|tail| unsafe { Pin::new_unchecked(tail.as_ref()) })
    }

    /// Appends an element to the front of the list, returning a pointer to it.
    ///
    /// The returned pointer may later be used as a position or passed to [`List::remove`].
    ///
    /// # Panics
    ///
    /// With ownership checks enabled, panics if the element is already linked into a list.
    pub fn push_front(&mut self, item: T::Handle) -> NonNull<T> {
        let ptr = T::into_ptr(item);
        unsafe { self.link_before(self.head, ptr) };
        ptr
    }

    /// Appends an element to the back of the list, returning a pointer to it.
    ///
    /// # Panics
    ///
    /// With ownership checks enabled, panics if the element is already linked into a list.
    pub fn push_back(&mut self, item: T::Handle) -> NonNull<T> {
        let ptr = T::into_ptr(item);
        unsafe { self.link_before(None, ptr) };
        ptr
    }

    /// Removes the first element of the list and returns it.
    pub fn pop_front(&mut self) -> Option<T::Handle> {
        let head = self.head?;
        Some(unsafe { self.remove(head) })
    }

    /// Removes the last element of the list and returns it.
    pub fn pop_back(&mut self) -> Option<T::Handle> {
        let tail = self.tail?;
        Some(unsafe { self.remove(tail) })
    }

    /// Inserts an element before `pos`, or at the back of the list if `pos` is `None`.
    ///
    /// # Safety
    ///
    /// If `pos` is `Some`, it must point to an element of `self`.
    pub unsafe fn insert_before(&mut self, pos: Option<NonNull<T>>, item: T::Handle) -> NonNull<T> {
        if let Some(pos) = pos {
            self.assert_owns(pos);
        }

        let ptr = T::into_ptr(item);
        unsafe { self.link_before(pos, ptr) };
        ptr
    }

    /// Removes an arbitrary element from the list.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    /// other list.
    pub unsafe fn remove(&mut self, node: NonNull<T>) -> T::Handle {
        unsafe {
            self.unlink(node);
            T::from_ptr(node)
        }
    }

    /// Removes `node` from the list if `pred` returns `true` for it.
    ///
    /// # Safety
    ///
    /// `node` must be an element of `self`.
    pub unsafe fn remove_if<F>(&mut self, node: NonNull<T>, pred: F) -> Option<T::Handle>
    where
        F: FnOnce(&T) -> bool,
    {
        self.assert_owns(node);

        if pred(unsafe { node.as_ref() }) {
            Some(unsafe { self.remove(node) })
        } else {
            None
        }
    }

    /// Removes the elements in `[first, last)` and returns them as a new list.
    ///
    /// A `last` of `None` removes everything from `first` to the end.
    ///
    /// This operation completes in _O(k)_ time, where _k_ is the number of removed elements.
    ///
    /// # Safety
    ///
    /// `first` must be an element of `self`, and `last`, if `Some`, must be an element of `self`
    /// at or after `first`.
    pub unsafe fn remove_range(&mut self, first: NonNull<T>, last: Option<NonNull<T>>) -> List<T> {
        let mut removed = List::new();
        unsafe { removed.splice_range(None, self, first, last) };
        removed
    }

    /// Removes every element for which `pred` returns `true`, returning them in their original
    /// order as a new list.
    pub fn remove_all_if<F>(&mut self, mut pred: F) -> List<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut removed = List::new();
        let mut opt_cur = self.head;

        while let Some(cur) = opt_cur {
            unsafe {
                opt_cur = links(cur).next();

                if pred(cur.as_ref()) {
                    removed.splice_one(None, self, cur);
                }
            }
        }

        log::trace!(
            "remove_all_if: removed {} elements, {} remain",
            removed.len(),
            self.len
        );

        removed
    }

    /// Removes every element, yielding each one front to back.
    ///
    /// Elements not consumed from the returned iterator are removed and dropped when it is dropped.
    pub fn remove_all(&mut self) -> Drain<'_, T> {
        Drain::new(self)
    }

    /// Removes every element and drops its handle.
    ///
    /// For owning handles such as `Box<T>` this destroys the elements; for borrowed handles it
    /// only unlinks them.
    pub fn delete_all(&mut self) {
        let len = self.len;

        while let Some(item) = self.pop_front() {
            drop(item);
        }

        if len > 0 {
            log::trace!("delete_all: dropped {len} elements");
        }

        debug_assert!(self.head.is_none());
        debug_assert_eq!(self.len(), 0);
    }

    /// Moves every element of `other` in front of `pos` (or to the back if `pos` is `None`),
    /// leaving `other` empty.
    ///
    /// This operation completes in _O(1)_ time; with ownership checks enabled it is _O(n)_ in the
    /// length of `other`.
    ///
    /// # Safety
    ///
    /// If `pos` is `Some`, it must point to an element of `self`.
    pub unsafe fn splice(&mut self, pos: Option<NonNull<T>>, other: &mut List<T>) {
        if let Some(pos) = pos {
            self.assert_owns(pos);
        }

        let (Some(first), Some(last)) = (other.head, other.tail) else {
            return;
        };
        let len = other.len;

        if Tracker::ENABLED {
            let mut opt_cur = Some(first);
            while let Some(cur) = opt_cur {
                unsafe {
                    self.owner.adopt(&other.owner, links(cur).tag_mut());
                    opt_cur = links(cur).next();
                }
            }
        }

        other.head = None;
        other.tail = None;
        other.len = 0;

        unsafe { self.link_segment_before(pos, first, last, len) };
    }

    /// Moves the single element `node` from `other` in front of `pos`.
    ///
    /// # Safety
    ///
    /// `node` must be an element of `other`, and `pos`, if `Some`, must be an element of `self`.
    pub unsafe fn splice_one(&mut self, pos: Option<NonNull<T>>, other: &mut List<T>, node: NonNull<T>) {
        if let Some(pos) = pos {
            self.assert_owns(pos);
        }

        unsafe {
            self.owner.adopt(&other.owner, links(node).tag_mut());
            other.unlink_segment(node, node, 1);
            self.link_segment_before(pos, node, node, 1);
        }
    }

    /// Moves the elements `[first, last)` of `other` in front of `pos`.
    ///
    /// A `last` of `None` moves everything from `first` to the end of `other`. This operation
    /// completes in _O(k)_ time, where _k_ is the number of moved elements.
    ///
    /// # Safety
    ///
    /// `first` must be an element of `other`; `last`, if `Some`, must be an element of `other` at
    /// or after `first`; `pos`, if `Some`, must be an element of `self`.
    pub unsafe fn splice_range(
        &mut self,
        pos: Option<NonNull<T>>,
        other: &mut List<T>,
        first: NonNull<T>,
        last: Option<NonNull<T>>,
    ) {
        if let Some(pos) = pos {
            self.assert_owns(pos);
        }
        other.assert_owns(first);
        if let Some(last) = last {
            other.assert_owns(last);
        }

        if Some(first) == last {
            return;
        }

        // Find the final element of the range, counting and re-tagging on the way.
        let mut len = 0;
        let mut cur = first;
        let end = loop {
            unsafe {
                self.owner.adopt(&other.owner, links(cur).tag_mut());
                len += 1;

                let next = links(cur).next();
                if next == last {
                    break cur;
                }

                cur = next.expect("`last` must follow `first` in the source list");
            }
        };

        unsafe {
            other.unlink_segment(first, end, len);
            self.link_segment_before(pos, first, end, len);
        }
    }

    /// Moves every element of `other` to the back of this list.
    pub fn append(&mut self, other: &mut List<T>) {
        unsafe { self.splice(None, other) }
    }

    /// Moves every element of `other` to the front of this list.
    pub fn prepend(&mut self, other: &mut List<T>) {
        unsafe { self.splice(self.head, other) }
    }

    /// Repositions `node` in front of `pos` (or at the back if `pos` is `None`).
    ///
    /// # Safety
    ///
    /// `node` and `pos` (if `Some`) must both be elements of `self`.
    pub unsafe fn move_before(&mut self, node: NonNull<T>, pos: Option<NonNull<T>>) {
        self.assert_owns(node);
        if let Some(pos) = pos {
            self.assert_owns(pos);
        }

        unsafe {
            if Some(node) == pos || links(node).next() == pos {
                return;
            }

            self.unlink_segment(node, node, 1);
            self.link_segment_before(pos, node, node, 1);
        }
    }

    /// Swaps the contents of two lists in _O(1)_ time.
    pub fn swap(&mut self, other: &mut List<T>) {
        mem::swap(self, other);
    }

    /// Returns an iterator over the elements of the list, front to back.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    /// Returns a cursor pointing to the first element of the list.
    pub fn cursor_front(&self) -> Cursor<'_, T> {
        Cursor::new(self, self.head)
    }

    /// Returns a cursor pointing to the last element of the list.
    pub fn cursor_back(&self) -> Cursor<'_, T> {
        Cursor::new(self, self.tail)
    }

    /// Returns a mutable cursor pointing to the first element of the list.
    pub fn cursor_front_mut(&mut self) -> CursorMut<'_, T> {
        let head = self.head;
        CursorMut::new(self, head)
    }

    /// Returns a mutable cursor pointing to the last element of the list.
    pub fn cursor_back_mut(&mut self) -> CursorMut<'_, T> {
        let tail = self.tail;
        CursorMut::new(self, tail)
    }

    /// Returns a cursor pointing to `node`.
    ///
    /// # Safety
    ///
    /// `node` must be an element of `self`.
    pub unsafe fn cursor_from_ptr(&self, node: NonNull<T>) -> Cursor<'_, T> {
        self.assert_owns(node);
        Cursor::new(self, Some(node))
    }

    /// Returns a mutable cursor pointing to `node`.
    ///
    /// # Safety
    ///
    /// `node` must be an element of `self`.
    pub unsafe fn cursor_from_ptr_mut(&mut self, node: NonNull<T>) -> CursorMut<'_, T> {
        self.assert_owns(node);
        CursorMut::new(self, Some(node))
    }

    /// Walks the whole list, checking that forward and backward links agree and that the stored
    /// length matches the number of reachable elements.
    ///
    /// This operation completes in _O(n)_ time.
    pub fn validate(&self) -> Result<(), InvariantError> {
        let result = self.validate_inner();

        if let Err(ref error) = result {
            log::debug!("list failed validation: {error}");
        }

        result
    }

    fn validate_inner(&self) -> Result<(), InvariantError> {
        let mut prev = None;
        let mut opt_cur = self.head;
        let mut position = 0;

        while let Some(cur) = opt_cur {
            let cur_links = unsafe { links(cur) };

            if !cur_links.is_linked() {
                return Err(InvariantError::NotContained { position });
            }

            if !self.owner.owns(cur_links.tag()) {
                return Err(InvariantError::ForeignNode { position });
            }

            if cur_links.prev() != prev {
                return Err(InvariantError::BrokenBackLink { position });
            }

            position += 1;

            // Bail out before looping forever on a cycle.
            if position > self.len {
                return Err(InvariantError::LengthMismatch {
                    expected: self.len,
                    actual: position,
                });
            }

            prev = Some(cur);
            opt_cur = cur_links.next();
        }

        if self.tail != prev {
            return Err(InvariantError::StaleBound { which: "last" });
        }

        if position != self.len {
            return Err(InvariantError::LengthMismatch {
                expected: self.len,
                actual: position,
            });
        }

        Ok(())
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        if let Err(error) = self.validate() {
            panic!("list invariant violated: {error}");
        }
    }

    // Support methods ========================================================

    #[inline]
    fn assert_owns(&self, node: NonNull<T>) {
        unsafe { self.owner.assert_owns(links(node).tag()) }
    }

    // Marks a free element as linked and threads it in front of `pos`.
    unsafe fn link_before(&mut self, pos: Link<T>, ptr: NonNull<T>) {
        unsafe {
            let ptr_links = links(ptr);
            debug_assert!(
                !ptr_links.is_linked(),
                "node is already linked into a list"
            );

            self.owner.claim(ptr_links.tag_mut());
            ptr_links.set_linked(true);
            self.link_segment_before(pos, ptr, ptr, 1);
        }
    }

    // Unlinks an element of this list and marks it free.
    unsafe fn unlink(&mut self, node: NonNull<T>) {
        unsafe {
            let node_links = links(node);
            self.owner.release(node_links.tag_mut());
            self.unlink_segment(node, node, 1);
            node_links.set_linked(false);
        }
    }

    // Threads the detached chain `first..=last` of `len` elements in front of `pos`.
    //
    // Owner tags are not touched.
    unsafe fn link_segment_before(&mut self, pos: Link<T>, first: NonNull<T>, last: NonNull<T>, len: usize) {
        unsafe {
            let prev = match pos {
                Some(pos) => links(pos).prev(),
                None => self.tail,
            };

            links(first).set_prev(prev);
            links(last).set_next(pos);

            match prev {
                Some(prev) => {
                    links(prev).set_next(Some(first));
                }
                None => self.head = Some(first),
            }

            match pos {
                Some(pos) => {
                    links(pos).set_prev(Some(last));
                }
                None => self.tail = Some(last),
            }
        }

        self.len += len;
    }

    // Detaches the chain `first..=last` of `len` elements, leaving its outer links cleared.
    //
    // Owner tags are not touched.
    unsafe fn unlink_segment(&mut self, first: NonNull<T>, last: NonNull<T>, len: usize) {
        unsafe {
            let prev = links(first).set_prev(None);
            let next = links(last).set_next(None);

            match prev {
                Some(prev) => {
                    links(prev).set_next(next);
                }
                None => self.head = next,
            }

            match next {
                Some(next) => {
                    links(next).set_prev(prev);
                }
                None => self.tail = prev,
            }
        }

        self.len -= len;
    }
}

impl<T> List<T>
where
    T: Linked<Links<T>> + Ord + ?Sized,
{
    /// Sorts the list in ascending order. The sort is stable.
    pub fn sort(&mut self) {
        self.sort_by(T::cmp);
    }

    /// Merges the sorted list `other` into this sorted list, leaving `other` empty.
    pub fn merge(&mut self, other: &mut List<T>) {
        self.merge_by(other, T::cmp);
    }

    /// Removes consecutive equal elements, keeping the first of each run.
    ///
    /// The removed elements are returned in their original order as a new list.
    pub fn unique(&mut self) -> List<T> {
        self.unique_by(T::cmp)
    }
}

impl<T> List<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    /// Sorts the list by the key extracted with `f`. The sort is stable.
    pub fn sort_by_key<K, F>(&mut self, mut f: F)
    where
        K: Ord,
        F: FnMut(&T) -> K,
    {
        self.sort_by(|a, b| f(a).cmp(&f(b)));
    }

    /// Removes consecutive elements that `compare` considers equal, keeping the first of each run.
    ///
    /// The removed elements are returned in their original order as a new list.
    pub fn unique_by<F>(&mut self, mut compare: F) -> List<T>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let mut removed = List::new();

        let Some(mut kept) = self.head else {
            return removed;
        };

        let mut opt_cur = unsafe { links(kept).next() };

        while let Some(cur) = opt_cur {
            unsafe {
                opt_cur = links(cur).next();

                if compare(kept.as_ref(), cur.as_ref()) == Ordering::Equal {
                    removed.splice_one(None, self, cur);
                } else {
                    kept = cur;
                }
            }
        }

        log::trace!("unique: removed {} duplicates", removed.len());

        removed
    }
}

impl<T> Drop for List<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        debug_assert!(
            self.is_empty() || std::thread::panicking(),
            "dropping a non-empty container"
        );
        self.delete_all();
    }
}

impl<T> Default for List<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for List<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List")
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("len", &self.len)
            .finish()
    }
}

impl<'list, T> IntoIterator for &'list List<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    type Item = &'list T;
    type IntoIter = Iter<'list, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

unsafe impl<T> Send for List<T> where T: Linked<Links<T>> + Send + ?Sized {}

impl<T: ?Sized> Links<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                next: None,
                prev: None,
                linked: false,
                tag: Tag::new(),
                _unpin: PhantomPinned,
            }),
        }
    }

    /// Returns `true` if the element is currently linked into a list.
    #[inline]
    pub fn is_linked(&self) -> bool {
        unsafe { (*self.inner.get()).linked }
    }

    #[inline]
    fn next(&self) -> Link<T> {
        unsafe { (*self.inner.get()).next }
    }

    #[inline]
    fn prev(&self) -> Link<T> {
        unsafe { (*self.inner.get()).prev }
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
    fn set_next(&self, next: Link<T>) -> Link<T> {
        unsafe { ptr::replace(ptr::addr_of_mut!((*self.inner.get()).next), next) }
    }

    #[inline]
    fn set_prev(&self, prev: Link<T>) -> Link<T> {
        unsafe { ptr::replace(ptr::addr_of_mut!((*self.inner.get()).prev), prev) }
    }

    #[inline]
    fn set_linked(&self, linked: bool) {
        unsafe { (*self.inner.get()).linked = linked };
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("next", &self.next())
            .field("prev", &self.prev())
            .field("linked", &self.is_linked())
            .finish()
    }
}

unsafe impl<T: Send + ?Sized> Send for Links<T> {}
