//! An in-memory indexed interval store for labeled ranges over a 2D text
//! buffer.
//!
//! A [`MarkerIndex`] tracks many labeled, possibly-overlapping
//! `(start, end)` ranges ("markers") anchored to `(row, column)`
//! coordinates, and keeps every marker's position correct as the
//! underlying buffer is edited via [`MarkerIndex::splice`] -- in
//! O(log n) amortized time rather than by touching every marker on every
//! edit. Positions are stored relative to their neighbors in a splay tree
//! (`tree`), which is what makes the remap on splice cheap: shifting
//! "everything after this point" is a single node's delta update rather
//! than a pass over the whole index.
//!
//! Module layout:
//! - [`point`] -- the `(row, column)` position and range algebra everything
//!   else is built on.
//! - [`marker_set`] -- the small sorted-`Vec`-backed id set used for every
//!   per-node marker bookkeeping.
//! - [`tree`] -- the splay tree of distinguished positions.
//! - [`index`] -- the public facade, [`MarkerIndex`].
//! - [`error`] -- the small error enum surfaced at the public boundary.

pub mod error;
pub mod index;
pub mod marker_set;
pub mod point;
mod tree;

pub use error::MarkerIndexError;
pub use index::{Bias, MarkerIndex, SpliceResult};
pub use marker_set::{MarkerId, MarkerIdSet};
pub use point::{Point, Range};
