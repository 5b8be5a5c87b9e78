//! Structural self-check failures.

use thiserror::Error;

/// A broken structural invariant, reported by `validate()` on a container.
///
/// Positions count from the front of the container in iteration order. Seeing one of these means
/// a container was corrupted, usually by violating the safety contract of an `unsafe` method.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantError {
    /// The stored element count disagrees with the number of reachable elements.
    #[error("length mismatch: header says {expected}, found {actual} reachable elements")]
    LengthMismatch {
        /// The count stored in the container header.
        expected: usize,
        /// The number of elements actually reached by walking the links.
        actual: usize,
    },

    /// A node's back link does not point at the node it was reached from.
    #[error("broken back link at position {position}")]
    BrokenBackLink {
        /// Position of the node whose back link is wrong.
        position: usize,
    },

    /// The header's head or tail (list) or cached first or last (map) is stale.
    #[error("header {which} does not point at the true {which} element")]
    StaleBound {
        /// Which bound is wrong: `"first"` or `"last"`.
        which: &'static str,
    },

    /// A reachable node is not marked as linked, or has an empty key slot.
    #[error("node at position {position} is not marked as contained")]
    NotContained {
        /// Position of the offending node.
        position: usize,
    },

    /// A reachable node is tagged with a different owner.
    #[error("node at position {position} is owned by another container")]
    ForeignNode {
        /// Position of the offending node.
        position: usize,
    },

    /// The tree root is red.
    #[error("tree root is red")]
    RedRoot,

    /// A red node has a red child.
    #[error("red node at position {position} has a red child")]
    RedRed {
        /// In-order position of the red parent.
        position: usize,
    },

    /// Two root-to-leaf paths have different numbers of black nodes.
    #[error("black height mismatch below position {position}: {left} on the left, {right} on the right")]
    BlackHeight {
        /// In-order position of the node whose subtrees disagree.
        position: usize,
        /// Black height of the left subtree.
        left: usize,
        /// Black height of the right subtree.
        right: usize,
    },

    /// In-order traversal found a key smaller than its predecessor.
    #[error("key at position {position} sorts before its predecessor")]
    OutOfOrder {
        /// In-order position of the out-of-order key.
        position: usize,
    },
}
