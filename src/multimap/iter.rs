use core::{iter::FusedIterator, marker::PhantomData};

use cordyceps::Linked;

use super::{links, predecessor, successor, Link, Links};

/// An iterator over the entries of a [`MultiMap`](super::MultiMap), in key order.
pub struct Iter<'tree, T, K>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    front: Link<T>,
    back: Link<T>,
    len: usize,
    _tree: PhantomData<(&'tree T, &'tree K)>,
}

impl<'tree, T, K> Iter<'tree, T, K>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    pub(super) fn new(front: Link<T>, back: Link<T>, len: usize) -> Self {
        Iter {
            front,
            back,
            len,
            _tree: PhantomData,
        }
    }
}

impl<'tree, T, K> Iterator for Iter<'tree, T, K>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    type Item = (&'tree K, &'tree T);

    fn next(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let cur = self.front?;

        unsafe {
            self.front = successor::<T, K>(cur);
            self.len -= 1;

            Some((links(cur).key(), cur.as_ref()))
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<'tree, T, K> DoubleEndedIterator for Iter<'tree, T, K>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let cur = self.back?;

        unsafe {
            self.back = predecessor::<T, K>(cur);
            self.len -= 1;

            Some((links(cur).key(), cur.as_ref()))
        }
    }
}

impl<'tree, T, K> ExactSizeIterator for Iter<'tree, T, K> where T: Linked<Links<T, K>> + ?Sized {}

impl<'tree, T, K> FusedIterator for Iter<'tree, T, K> where T: Linked<Links<T, K>> + ?Sized {}

impl<'tree, T, K> Clone for Iter<'tree, T, K>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    fn clone(&self) -> Self {
        Iter::new(self.front, self.back, self.len)
    }
}

/// An iterator over a contiguous run of entries, returned by
/// [`MultiMap::equal_range`](super::MultiMap::equal_range).
///
/// Both ends are inclusive; the iterator is exhausted once they cross.
pub struct Range<'tree, T, K>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    front: Link<T>,
    back: Link<T>,
    _tree: PhantomData<(&'tree T, &'tree K)>,
}

impl<'tree, T, K> Range<'tree, T, K>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    pub(super) fn new(front: Link<T>, back: Link<T>) -> Self {
        Range {
            front,
            back,
            _tree: PhantomData,
        }
    }

    pub(super) fn empty() -> Self {
        Range::new(None, None)
    }
}

impl<'tree, T, K> Iterator for Range<'tree, T, K>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    type Item = (&'tree K, &'tree T);

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.front?;

        if Some(cur) == self.back {
            self.front = None;
            self.back = None;
        } else {
            self.front = unsafe { successor::<T, K>(cur) };
        }

        unsafe { Some((links(cur).key(), cur.as_ref())) }
    }
}

impl<'tree, T, K> DoubleEndedIterator for Range<'tree, T, K>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    fn next_back(&mut self) -> Option<Self::Item> {
        let cur = self.back?;

        if Some(cur) == self.front {
            self.front = None;
            self.back = None;
        } else {
            self.back = unsafe { predecessor::<T, K>(cur) };
        }

        unsafe { Some((links(cur).key(), cur.as_ref())) }
    }
}

impl<'tree, T, K> FusedIterator for Range<'tree, T, K> where T: Linked<Links<T, K>> + ?Sized {}

impl<'tree, T, K> Clone for Range<'tree, T, K>
where
    T: Linked<Links<T, K>> + ?Sized,
{
    fn clone(&self) -> Self {
        Range::new(self.front, self.back)
    }
}
