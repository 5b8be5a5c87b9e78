use core::{marker::PhantomData, pin::Pin, ptr::NonNull};

use cordyceps::Linked;

use super::{links, Link, Links, List};

/// A cursor over a [`List`].
///
/// A cursor points either to an element of the list or to a "ghost" non-element that sits past
/// the tail and before the head.
pub struct Cursor<'list, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    curs: CursorRaw<T>,
    phantom: PhantomData<&'list List<T>>,
}

impl<'list, T> Cursor<'list, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    pub(super) fn new(list: &'list List<T>, ptr: Link<T>) -> Cursor<'list, T> {
        Cursor {
            curs: CursorRaw {
                list: list.into(),
                ptr,
            },
            phantom: PhantomData,
        }
    }

    /// Moves the cursor to the next element of the `List`.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method moves it to the first
    /// element. If it is pointing to the last element, this method moves it to the "ghost"
    /// non-element.
    pub fn move_next(&mut self) {
        unsafe { self.curs.move_next() }
    }

    /// Moves the cursor to the previous element of the `List`.
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
    pub fn get(&self) -> Option<&'list T> {
        self.curs.ptr.map(|p| unsafe { p.as_ref() })
    }

    /// Returns a pointer to the current element, usable as a position in [`List`] methods.
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.curs.ptr
    }

    /// Returns a reference to the next item.
    pub fn peek_next(&self) -> Option<&'list T> {
        unsafe { self.curs.peek_next().map(|p| p.as_ref()) }
    }

    /// Returns a reference to the previous item.
    pub fn peek_prev(&self) -> Option<&'list T> {
        unsafe { self.curs.peek_prev().map(|p| p.as_ref()) }
    }
}

impl<'list, T> Clone for Cursor<'list, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn clone(&self) -> Self {
        Cursor {
            curs: CursorRaw {
                list: self.curs.list,
                ptr: self.curs.ptr,
            },
            phantom: PhantomData,
        }
    }
}

/// A cursor over a [`List`] which supports editing operations.
///
/// A cursor points either to an element of the list or to a "ghost" non-element that sits past
/// the tail and before the head.
pub struct CursorMut<'list, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    curs: CursorRaw<T>,
    phantom: PhantomData<&'list mut List<T>>,
}

impl<'list, T> CursorMut<'list, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    pub(super) fn new(list: &'list mut List<T>, ptr: Link<T>) -> CursorMut<'list, T> {
        CursorMut {
            curs: CursorRaw {
                list: list.into(),
                ptr,
            },
            phantom: PhantomData,
        }
    }

    /// Returns a read-only cursor pointing to the current element.
    ///
    /// The `CursorMut` remains immutably borrowed for the lifetime of the returned `Cursor`.
    pub fn as_cursor(&self) -> Cursor<'_, T> {
        Cursor {
            curs: CursorRaw {
                list: self.curs.list,
                ptr: self.curs.ptr,
            },
            phantom: PhantomData,
        }
    }

    /// Moves the cursor to the next element of the `List`.
    ///
    /// If the cursor is pointing to the "ghost" non-element, this method will move it to the first
    /// element. If it is pointing to the last element, this method will move it to the "ghost"
    /// non-element.
    pub fn move_next(&mut self) {
        unsafe { self.curs.move_next() }
    }

    /// Moves the cursor to the previous element of the `List`.
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

    /// Returns a pointer to the current element, usable as a position in [`List`] methods.
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

    /// Removes the current element from the list.
    ///
    /// This returns the removed element and moves the cursor to the next element. If the cursor is
    /// pointing to the "ghost" non-element, this method returns `None`, and neither the list nor
    /// the cursor is modified.
    pub fn remove_current(&mut self) -> Option<T::Handle> {
        let remove = self.curs.ptr?;

        unsafe {
            self.curs.move_next();
            Some(self.curs.list.as_mut().remove(remove))
        }
    }

    /// Removes the current element from the list and moves the cursor to the previous element.
    pub fn remove_current_and_move_prev(&mut self) -> Option<T::Handle> {
        let remove = self.curs.ptr?;

        unsafe {
            self.curs.move_prev();
            Some(self.curs.list.as_mut().remove(remove))
        }
    }

    /// Inserts an element before the current one.
    ///
    /// If the cursor is pointing at the "ghost" non-element, the element is inserted at the back of
    /// the list. The cursor does not move.
    pub fn insert_before(&mut self, item: T::Handle) -> NonNull<T> {
        unsafe { self.curs.list.as_mut().insert_before(self.curs.ptr, item) }
    }

    /// Inserts an element after the current one.
    ///
    /// If the cursor is pointing at the "ghost" non-element, the element is inserted at the front
    /// of the list. The cursor does not move.
    pub fn insert_after(&mut self, item: T::Handle) -> NonNull<T> {
        unsafe {
            let pos = self.curs.peek_next();
            self.curs.list.as_mut().insert_before(pos, item)
        }
    }

    /// Moves every element of `other` in front of the current element.
    ///
    /// If the cursor is pointing at the "ghost" non-element, the elements are appended to the back.
    pub fn splice_before(&mut self, other: &mut List<T>) {
        unsafe { self.curs.list.as_mut().splice(self.curs.ptr, other) }
    }

    /// Moves every element of `other` after the current element.
    ///
    /// If the cursor is pointing at the "ghost" non-element, the elements are prepended to the
    /// front.
    pub fn splice_after(&mut self, other: &mut List<T>) {
        unsafe {
            let pos = self.curs.peek_next();
            self.curs.list.as_mut().splice(pos, other)
        }
    }
}

struct CursorRaw<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    list: NonNull<List<T>>,
    ptr: Link<T>,
}

impl<T> CursorRaw<T>
where
    T: Linked<Links<T>> + ?Sized,
{
    unsafe fn move_next(&mut self) {
        self.ptr = unsafe { self.peek_next() };
    }

    unsafe fn move_prev(&mut self) {
        self.ptr = unsafe { self.peek_prev() };
    }

    unsafe fn peek_next(&self) -> Link<T> {
        unsafe {
            match self.ptr {
                Some(p) => links(p).next(),
                None => self.list.as_ref().head,
            }
        }
    }

    unsafe fn peek_prev(&self) -> Link<T> {
        unsafe {
            match self.ptr {
                Some(p) => links(p).prev(),
                None => self.list.as_ref().tail,
            }
        }
    }
}
