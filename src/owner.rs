//! Node ownership tracking.
//!
//! Every container carries a [`Tracker`] and every link record carries a [`Tag`]. While tracking
//! is enabled (debug builds, or the `ownership-checks` feature), a tag names the container that
//! currently holds the node, and containers assert on every mutation that they only touch nodes
//! they own. With tracking disabled both types are zero-sized and every check compiles away.

#[cfg(any(debug_assertions, feature = "ownership-checks"))]
mod imp {
    use core::{
        num::NonZeroUsize,
        sync::atomic::{AtomicUsize, Ordering},
    };

    static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

    fn next_id() -> NonZeroUsize {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        NonZeroUsize::new(id).expect("container id counter overflowed")
    }

    /// Identity of a container instance.
    ///
    /// Ids are drawn lazily so that containers can still be built in `const` contexts.
    #[derive(Debug, Default)]
    pub(crate) struct Tracker {
        id: Option<NonZeroUsize>,
    }

    /// The owner of a single link record, or `None` while the node is free.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub(crate) struct Tag {
        owner: Option<NonZeroUsize>,
    }

    impl Tracker {
        pub(crate) const fn new() -> Self {
            Tracker { id: None }
        }

        fn id(&mut self) -> NonZeroUsize {
            *self.id.get_or_insert_with(next_id)
        }

        /// Marks a free node as owned by this container.
        pub(crate) fn claim(&mut self, tag: &mut Tag) {
            assert!(
                tag.owner.is_none(),
                "node is already linked into a container"
            );
            tag.owner = Some(self.id());
        }

        /// Returns an owned node to the free state.
        pub(crate) fn release(&self, tag: &mut Tag) {
            self.assert_owns(tag);
            tag.owner = None;
        }

        /// Moves a node owned by `from` over to this container.
        pub(crate) fn adopt(&mut self, from: &Tracker, tag: &mut Tag) {
            from.assert_owns(tag);
            tag.owner = Some(self.id());
        }

        pub(crate) fn assert_owns(&self, tag: &Tag) {
            assert!(
                self.id.is_some() && tag.owner == self.id,
                "node is not owned by this container"
            );
        }

        pub(crate) fn owns(&self, tag: &Tag) -> bool {
            self.id.is_some() && tag.owner == self.id
        }

        pub(crate) const ENABLED: bool = true;
    }

    impl Tag {
        pub(crate) const fn new() -> Self {
            Tag { owner: None }
        }
    }
}

#[cfg(not(any(debug_assertions, feature = "ownership-checks")))]
mod imp {
    #[derive(Debug, Default)]
    pub(crate) struct Tracker;

    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub(crate) struct Tag;

    impl Tracker {
        pub(crate) const fn new() -> Self {
            Tracker
        }

        #[inline(always)]
        pub(crate) fn claim(&mut self, _tag: &mut Tag) {}

        #[inline(always)]
        pub(crate) fn release(&self, _tag: &mut Tag) {}

        #[inline(always)]
        pub(crate) fn adopt(&mut self, _from: &Tracker, _tag: &mut Tag) {}

        #[inline(always)]
        pub(crate) fn assert_owns(&self, _tag: &Tag) {}

        #[inline(always)]
        pub(crate) fn owns(&self, _tag: &Tag) -> bool {
            true
        }

        pub(crate) const ENABLED: bool = false;
    }

    impl Tag {
        pub(crate) const fn new() -> Self {
            Tag
        }
    }
}

pub(crate) use imp::{Tag, Tracker};
