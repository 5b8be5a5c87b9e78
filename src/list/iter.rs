use core::{iter::FusedIterator, marker::PhantomData};

use cordyceps::Linked;

use super::{links, Link, Links, List};

/// An iterator over the elements of a [`List`].
///
/// Iterating in reverse (via [`DoubleEndedIterator`]) walks the `prev` links from the back.
pub struct Iter<'list, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    front: Link<T>,
    back: Link<T>,
    len: usize,
    _list: PhantomData<&'list List<T>>,
}

impl<'list, T> Iter<'list, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    pub(super) fn new(list: &'list List<T>) -> Self {
        Iter {
            front: list.head,
            back: list.tail,
            len: list.len(),
            _list: PhantomData,
        }
    }
}

impl<'list, T> Iterator for Iter<'list, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    type Item = &'list T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let cur = self.front?;

        unsafe {
            self.front = links(cur).next();
            self.len -= 1;

            Some(cur.as_ref())
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<'list, T> DoubleEndedIterator for Iter<'list, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let cur = self.back?;

        unsafe {
            self.back = links(cur).prev();
            self.len -= 1;

            Some(cur.as_ref())
        }
    }
}

impl<'list, T> ExactSizeIterator for Iter<'list, T> where T: Linked<Links<T>> + ?Sized {}

impl<'list, T> FusedIterator for Iter<'list, T> where T: Linked<Links<T>> + ?Sized {}

impl<'list, T> Clone for Iter<'list, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn clone(&self) -> Self {
        Iter {
            front: self.front,
            back: self.back,
            len: self.len,
            _list: PhantomData,
        }
    }
}

/// A draining iterator over a [`List`], returned by [`List::remove_all`].
///
/// Each element is unlinked as it is yielded. Dropping the iterator removes and drops whatever
/// remains.
pub struct Drain<'list, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    list: &'list mut List<T>,
}

impl<'list, T> Drain<'list, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    pub(super) fn new(list: &'list mut List<T>) -> Self {
        Drain { list }
    }
}

impl<'list, T> Iterator for Drain<'list, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    type Item = T::Handle;

    fn next(&mut self) -> Option<Self::Item> {
        self.list.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.list.len(), Some(self.list.len()))
    }
}

impl<'list, T> DoubleEndedIterator for Drain<'list, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn next_back(&mut self) -> Option<Self::Item> {
        self.list.pop_back()
    }
}

impl<'list, T> ExactSizeIterator for Drain<'list, T> where T: Linked<Links<T>> + ?Sized {}

impl<'list, T> Drop for Drain<'list, T>
where
    T: Linked<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.list.delete_all();
    }
}
