//! Intrusive containers: a doubly-linked list and an ordered multimap.
//!
//! Both containers thread together elements that carry their own link records, so inserting never
//! allocates and one element can live in several containers at once (one link record per
//! membership). Elements describe how to reach their links by implementing [`Linked`], whose
//! `Handle` type also decides who owns an element while it is linked: `Box<T>` hands ownership to
//! the container, while `NonNull<T>` or `Pin<&T>` only lend the element to it.
//!
//! - [`List`] is a doubly-linked list with O(1) splicing, stable merge sort and cursors.
//! - [`MultiMap`] is a red-black tree keyed by a value stored in the element's links. Equal keys
//!   are allowed and stay in insertion order.
//!
//! In debug builds (or with the `ownership-checks` feature) every container tags the nodes it
//! holds, and panics when asked to operate on a node that belongs to another container or is
//! already linked somewhere else.

pub mod list;
pub mod multimap;

mod error;
mod owner;

#[cfg(any(test, feature = "model"))]
pub mod model;

pub use cordyceps::Linked;

pub use crate::{
    error::InvariantError,
    list::List,
    multimap::{Ascending, Compare, Descending, MultiMap},
};
