use core::{marker::PhantomData, pin::Pin, ptr::NonNull};

use cordyceps::Linked;

use super::{links, Link, Links, MultiMap};

/// A cursor over a [`MultiMap`].
///
/// A cursor points either to an element of the map or to a "ghost" non-element that sits past the
/// last element and before the first.
pub struct Cursor<'map, T, K, C>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    curs: CursorRaw<T, K, C>,
    phantom: PhantomData<&'map MultiMap<T, K, C>>,
}

impl<'map, T, K, C> Cursor<'map, T, K, C>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    pub(super) fn new(map: &'map MultiMap<T, K, C>, ptr: Link<T>) -> Self {
        Cursor {
            curs: CursorRaw {
                map: map.into(),
                ptr,
            },
            phantom: PhantomData,
        }
    }

    /// Moves the cursor to the next element of the `MultiMap`.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method moves it to the first
    /// element. If it is pointing to the last element, this method moves it to the "ghost"
    /// non-element.
    pub fn move_next(&mut self) {
        unsafe { self.curs.move_next() }
    }

    /// Moves the cursor to the previous element of the `MultiMap`.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method moves it to the last
    /// element. If it is pointing to the first element, this method moves it to the "ghost"
    /// non-element.
    pub fn move_prev(&mut self) {
        unsafe { self.curs.move_prev() }
    }

    /// Returns a reference to the item pointed to by the cursor.
    ///
    /// This returns `None` if the cursor is currently pointing to the "ghost" non-element.
    pub fn get(&self) -> Option<&'map T> {
        self.curs.ptr.map(|p| unsafe { p.as_ref() })
    }

    /// Returns the key of the item pointed to by the cursor.
    pub fn key(&self) -> Option<&'map K> {
        self.curs.ptr.map(|p| unsafe { links(p).key() })
    }

    /// Returns a pointer to the current element, usable as a position in [`MultiMap`] methods.
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.curs.ptr
    }

    /// Returns a reference to the next item.
    pub fn peek_next(&self) -> Option<&'map T> {
        unsafe { self.curs.peek_next().map(|p| p.as_ref()) }
    }

    /// Returns a reference to the previous item.
    pub fn peek_prev(&self) -> Option<&'map T> {
        unsafe { self.curs.peek_prev().map(|p| p.as_ref()) }
    }
}

impl<'map, T, K, C> Clone for Cursor<'map, T, K, C>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    fn clone(&self) -> Self {
        Cursor {
            curs: CursorRaw {
                map: self.curs.map,
                ptr: self.curs.ptr,
            },
            phantom: PhantomData,
        }
    }
}

/// A cursor over a [`MultiMap`] which supports editing operations.
///
/// Keys are immutable while an element is linked, so the only edits are removals.
pub struct CursorMut<'map, T, K, C>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    curs: CursorRaw<T, K, C>,
    phantom: PhantomData<&'map mut MultiMap<T, K, C>>,
}

impl<'map, T, K, C> CursorMut<'map, T, K, C>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    pub(super) fn new(map: &'map mut MultiMap<T, K, C>, ptr: Link<T>) -> Self {
        CursorMut {
            curs: CursorRaw {
                map: map.into(),
                ptr,
            },
            phantom: PhantomData,
        }
    }

    /// Returns a read-only cursor pointing to the current element.
    ///
    /// The `CursorMut` remains immutably borrowed for the lifetime of the returned `Cursor`.
    pub fn as_cursor(&self) -> Cursor<'_, T, K, C> {
        Cursor {
            curs: CursorRaw {
                map: self.curs.map,
                ptr: self.curs.ptr,
            },
            phantom: PhantomData,
        }
    }

    /// Moves the cursor to the next element of the `MultiMap`.
    pub fn move_next(&mut self) {
        unsafe { self.curs.move_next() }
    }

    /// Moves the cursor to the previous element of the `MultiMap`.
    pub fn move_prev(&mut self) {
        unsafe { self.curs.move_prev() }
    }

    /// Returns a reference to the item pointed to by the cursor.
    ///
    /// This returns `None` if the cursor is currently pointing to the "ghost" non-element.
    pub fn get(&self) -> Option<&T> {
        self.curs.ptr.map(|p| unsafe { p.as_ref() })
    }

    /// Returns a pinned mutable reference to the item pointed to by the cursor.
    ///
    /// # Safety
    ///
    /// The caller must not modify the links of the returned item.
    pub unsafe fn get_mut(&mut self) -> Option<Pin<&mut T>> {
        self.curs
            .ptr
            .map(|mut p| unsafe { Pin::new_unchecked(p.as_mut()) })
    }

    /// Returns the key of the item pointed to by the cursor.
    pub fn key(&self) -> Option<&K> {
        self.curs.ptr.map(|p| unsafe { links(p).key() })
    }

    /// Returns a pointer to the current element, usable as a position in [`MultiMap`] methods.
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.curs.ptr
    }

    /// Returns a reference to the next item.
    pub fn peek_next(&self) -> Option<&T> {
        unsafe { self.curs.peek_next().map(|p| p.as_ref()) }
    }

    /// Returns a reference to the previous item.
    pub fn peek_prev(&self) -> Option<&T> {
        unsafe { self.curs.peek_prev().map(|p| p.as_ref()) }
    }

    /// Removes the current element from the `MultiMap`.
    ///
    /// This returns the removed element and moves the cursor to the next element. If the cursor is
    /// pointing to the "ghost" non-element, this method returns `None`, and neither the map nor the
    /// cursor is modified.
    pub fn remove_current(&mut self) -> Option<T::Handle> {
        let remove = self.curs.ptr?;

        unsafe {
            self.curs.move_next();
            Some(self.curs.map.as_mut().remove(remove))
        }
    }

    /// Removes the current element from the `MultiMap` and moves the cursor to the previous
    /// element.
    pub fn remove_current_and_move_prev(&mut self) -> Option<T::Handle> {
        let remove = self.curs.ptr?;

        unsafe {
            self.curs.move_prev();
            Some(self.curs.map.as_mut().remove(remove))
        }
    }
}

struct CursorRaw<T, K, C>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    map: NonNull<MultiMap<T, K, C>>,
    ptr: Link<T>,
}

impl<T, K, C> CursorRaw<T, K, C>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    unsafe fn move_next(&mut self) {
        self.ptr = unsafe { self.peek_next() };
    }

    unsafe fn move_prev(&mut self) {
        self.ptr = unsafe { self.peek_prev() };
    }

    unsafe fn peek_next(&self) -> Link<T> {
        unsafe {
            let map = self.map.as_ref();
            match self.ptr {
                Some(p) => map.successor_raw(p),
                None => map.first,
            }
        }
    }

    unsafe fn peek_prev(&self) -> Link<T> {
        unsafe {
            let map = self.map.as_ref();
            match self.ptr {
                Some(p) => map.predecessor_raw(p),
                None => map.last,
            }
        }
    }
}
