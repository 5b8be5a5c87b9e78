use core::cmp::Ordering;

/// A total order over keys, used by [`MultiMap`](super::MultiMap) in place of [`Ord`].
///
/// Stateless comparators such as [`Ascending`] are zero-sized and add nothing to the size of the
/// map. Any `Fn(&K, &K) -> Ordering` closure is also a comparator.
pub trait Compare<K: ?Sized> {
    /// Compares two keys.
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Orders keys by their [`Ord`] implementation, smallest first.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Ascending;

/// Orders keys by their [`Ord`] implementation, largest first.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Descending;

impl<K: Ord + ?Sized> Compare<K> for Ascending {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

impl<K: Ord + ?Sized> Compare<K> for Descending {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        b.cmp(a)
    }
}

impl<K: ?Sized, F> Compare<K> for F
where
    F: Fn(&K, &K) -> Ordering,
{
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        self(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders() {
        assert_eq!(Ascending.compare(&1, &2), Ordering::Less);
        assert_eq!(Descending.compare(&1, &2), Ordering::Greater);

        let by_low_bits = |a: &u32, b: &u32| (a & 0xff).cmp(&(b & 0xff));
        assert_eq!(by_low_bits.compare(&0x1ff, &0x2fe), Ordering::Greater);
    }

    #[test]
    fn stateless_comparators_are_zero_sized() {
        assert_eq!(core::mem::size_of::<Ascending>(), 0);
        assert_eq!(core::mem::size_of::<Descending>(), 0);
    }
}
