//! The public `MarkerIndex` facade (C4): the surface every other component
//! is built to support. Mirrors `marker.rs`'s `MarkerList`, generalized from
//! a single affinity map plus interval tree into the full splay-tree-backed
//! index with splice remapping.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::MarkerIndexError;
use crate::marker_set::{MarkerId, MarkerIdSet};
use crate::point::{Point, Range};
use crate::tree::{self, NodeRef, SplayTree};

/// How a marker's endpoint reacts to an insertion exactly at its position.
/// Inclusive endpoints "stick" to the text they already cover; exclusive
/// endpoints "float" past an insertion at the same point. See
/// `SetExclusive`'s note on when a change takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Bias {
    #[default]
    Inclusive,
    Exclusive,
}

/// The four buckets a marker can fall into relative to a spliced range `R`,
/// per the classification table in the base spec's splice algorithm.
#[derive(Debug, Clone, Default)]
pub struct SpliceResult {
    /// Markers whose range intersects `R`, or that have an endpoint exactly
    /// at one of `R`'s boundaries.
    pub touch: MarkerIdSet,
    /// Touching markers fully contained within `R`.
    pub inside: MarkerIdSet,
    /// Touching markers that partially overlap `R` without either
    /// containing the other.
    pub overlap: MarkerIdSet,
    /// Touching markers that fully contain `R`.
    pub surround: MarkerIdSet,
}

struct MarkerEndpoints {
    start: NodeRef,
    end: NodeRef,
}

/// An in-memory indexed interval store for labeled ranges over a 2D text
/// buffer. See the crate-level documentation for the full data model.
#[derive(Default)]
pub struct MarkerIndex {
    tree: SplayTree,
    endpoints: HashMap<MarkerId, MarkerEndpoints>,
    exclusive: MarkerIdSet,
}

impl MarkerIndex {
    pub fn new() -> Self {
        Self {
            tree: SplayTree::new(),
            endpoints: HashMap::new(),
            exclusive: MarkerIdSet::new(),
        }
    }

    // --- id maps ------------------------------------------------------

    fn end_position(&self, id: MarkerId) -> Point {
        self.endpoints
            .get(&id)
            .map(|e| tree::absolute_position(&e.end))
            .unwrap_or(Point::zero())
    }

    fn local_max_end_for(&self, node: &NodeRef) -> Point {
        let n = node.borrow();
        let own = tree::absolute_position(node);
        n.starting_markers
            .iter()
            .fold(own, |acc, id| Point::max(acc, self.end_position(id)))
    }

    fn refresh_stats_around(&self, node: &NodeRef) {
        let local = self.local_max_end_for(node);
        self.tree.refresh_stats_from(node, local);
    }

    // --- C4.1 insert / lifecycle ---------------------------------------

    /// Registers a new marker spanning `range`. Fails with
    /// [`MarkerIndexError::DuplicateMarker`] if `id` is already present, or
    /// [`MarkerIndexError::InvalidRange`] if `range.end < range.start`.
    pub fn insert(&mut self, id: MarkerId, range: Range) -> Result<(), MarkerIndexError> {
        if self.endpoints.contains_key(&id) {
            return Err(MarkerIndexError::DuplicateMarker);
        }
        if !range.is_valid() {
            return Err(MarkerIndexError::InvalidRange);
        }
        let start_node = self.tree.find_or_insert(range.start);
        let end_node = if range.start == range.end {
            start_node.clone()
        } else {
            self.tree.find_or_insert(range.end)
        };
        start_node.borrow_mut().starting_markers.insert(id);
        end_node.borrow_mut().ending_markers.insert(id);
        self.endpoints.insert(
            id,
            MarkerEndpoints {
                start: start_node.clone(),
                end: end_node.clone(),
            },
        );
        self.refresh_stats_around(&start_node);
        self.refresh_stats_around(&end_node);
        tracing::trace!(id, %range.start, %range.end, "inserted marker");
        Ok(())
    }

    /// Sets whether `id`'s endpoints float past an insertion exactly at
    /// their position. Takes effect for future splices only -- exclusivity
    /// is read live from the current set at splice time, never snapshotted,
    /// so changing it after a splice has already happened has no
    /// retroactive effect (see `DESIGN.md`).
    pub fn set_exclusive(&mut self, id: MarkerId, bias: Bias) {
        match bias {
            Bias::Exclusive => self.exclusive.insert(id),
            Bias::Inclusive => self.exclusive.erase(id),
        }
    }

    /// Removes `id` from the index. A marker id that isn't present is a
    /// silent no-op, per the base spec's error-handling design.
    pub fn delete(&mut self, id: MarkerId) {
        let Some(MarkerEndpoints { start, end }) = self.endpoints.remove(&id) else {
            return;
        };
        self.exclusive.erase(id);
        start.borrow_mut().starting_markers.erase(id);
        end.borrow_mut().ending_markers.erase(id);
        self.refresh_stats_around(&start);
        if !std::rc::Rc::ptr_eq(&start, &end) {
            self.refresh_stats_around(&end);
        }
        // A point marker has start and end as the same node; calling
        // delete_node_if_empty on it twice would re-enter an
        // already-detached node and clobber whatever the first call just
        // reattached in its place.
        self.tree.delete_node_if_empty(&start);
        if !std::rc::Rc::ptr_eq(&start, &end) {
            self.tree.delete_node_if_empty(&end);
        }
    }

    // --- C4.2 position queries -------------------------------------------

    pub fn get_start(&self, id: MarkerId) -> Option<Point> {
        self.endpoints.get(&id).map(|e| tree::absolute_position(&e.start))
    }

    pub fn get_end(&self, id: MarkerId) -> Option<Point> {
        self.endpoints.get(&id).map(|e| tree::absolute_position(&e.end))
    }

    pub fn get_range(&self, id: MarkerId) -> Option<Range> {
        match (self.get_start(id), self.get_end(id)) {
            (Some(s), Some(e)) => Some(Range::new(s, e)),
            _ => None,
        }
    }

    /// Orders by `start`, then by *descending* `end` on a tie -- the marker
    /// enclosing more of the buffer (the outer range of a nested pair) sorts
    /// first. `None` if either id is unknown.
    pub fn compare(&self, a: MarkerId, b: MarkerId) -> Option<Ordering> {
        let ra = self.get_range(a)?;
        let rb = self.get_range(b)?;
        Some(ra.start.cmp(&rb.start).then_with(|| rb.end.cmp(&ra.end)))
    }

    fn range_of(&self, id: MarkerId) -> Range {
        self.get_range(id).expect("id came from a live endpoint map entry")
    }

    // --- C4.3 spatial queries --------------------------------------------

    /// All markers with at least one endpoint in `[lo, hi]` (a bounded
    /// in-order walk, sub-linear in the size of the rest of the tree).
    fn nodes_in_range(&self, lo: Point, hi: Point) -> Vec<NodeRef> {
        fn walk(node: &NodeRef, lo: Point, hi: Point, out: &mut Vec<NodeRef>) {
            let pos = tree::absolute_position(node);
            let n = node.borrow();
            let left = n.left.clone();
            let right = n.right.clone();
            drop(n);
            if pos > lo {
                if let Some(l) = &left {
                    walk(l, lo, hi, out);
                }
            }
            if pos >= lo && pos <= hi {
                out.push(node.clone());
            }
            if pos < hi {
                if let Some(r) = &right {
                    walk(r, lo, hi, out);
                }
            }
        }
        let mut out = Vec::new();
        if let Some(root) = &self.tree.root {
            walk(root, lo, hi, &mut out);
        }
        out
    }

    fn find_starting_in_impl(&self, lo: Point, hi: Point) -> MarkerIdSet {
        self.nodes_in_range(lo, hi)
            .into_iter()
            .flat_map(|n| n.borrow().starting_markers.iter().collect::<Vec<_>>())
            .collect()
    }

    fn find_ending_in_impl(&self, lo: Point, hi: Point) -> MarkerIdSet {
        self.nodes_in_range(lo, hi)
            .into_iter()
            .flat_map(|n| n.borrow().ending_markers.iter().collect::<Vec<_>>())
            .collect()
    }

    /// Markers with a start position in `[lo, hi]`. Fails with
    /// [`MarkerIndexError::InvalidRange`] if `hi < lo`.
    pub fn find_starting_in(&self, lo: Point, hi: Point) -> Result<MarkerIdSet, MarkerIndexError> {
        if lo > hi {
            return Err(MarkerIndexError::InvalidRange);
        }
        Ok(self.find_starting_in_impl(lo, hi))
    }

    /// Markers with an end position in `[lo, hi]`. Fails with
    /// [`MarkerIndexError::InvalidRange`] if `hi < lo`.
    pub fn find_ending_in(&self, lo: Point, hi: Point) -> Result<MarkerIdSet, MarkerIndexError> {
        if lo > hi {
            return Err(MarkerIndexError::InvalidRange);
        }
        Ok(self.find_ending_in_impl(lo, hi))
    }

    pub fn find_starting_at(&self, at: Point) -> Result<MarkerIdSet, MarkerIndexError> {
        self.find_starting_in(at, at)
    }

    pub fn find_ending_at(&self, at: Point) -> Result<MarkerIdSet, MarkerIndexError> {
        self.find_ending_in(at, at)
    }

    /// Markers overlapping `[lo, hi]` (inclusive). Prunes subtrees whose
    /// `subtree_max_end` can't reach `lo`, the same technique
    /// `marker_tree.rs`'s `query_recursive` uses with its per-node
    /// `max_end`, generalized to a node's *set* of starting markers.
    fn find_intersecting_impl(&self, lo: Point, hi: Point) -> MarkerIdSet {
        fn walk(node: &NodeRef, lo: Point, hi: Point, index: &MarkerIndex, out: &mut Vec<MarkerId>) {
            let n = node.borrow();
            if n.subtree_max_end < lo {
                return;
            }
            let pos = tree::absolute_position(node);
            let left = n.left.clone();
            let right = n.right.clone();
            let starting: Vec<_> = n.starting_markers.iter().collect();
            drop(n);

            if let Some(l) = &left {
                walk(l, lo, hi, index, out);
            }
            if pos <= hi {
                for id in starting {
                    if index.end_position(id) >= lo {
                        out.push(id);
                    }
                }
                if let Some(r) = &right {
                    walk(r, lo, hi, index, out);
                }
            }
        }
        let mut out = Vec::new();
        if let Some(root) = &self.tree.root {
            walk(root, lo, hi, self, &mut out);
        }
        out.into_iter().collect()
    }

    /// Markers overlapping `[lo, hi]` (inclusive). Fails with
    /// [`MarkerIndexError::InvalidRange`] if `hi < lo`.
    pub fn find_intersecting(&self, lo: Point, hi: Point) -> Result<MarkerIdSet, MarkerIndexError> {
        if lo > hi {
            return Err(MarkerIndexError::InvalidRange);
        }
        Ok(self.find_intersecting_impl(lo, hi))
    }

    fn find_contained_in_impl(&self, lo: Point, hi: Point) -> MarkerIdSet {
        self.nodes_in_range(lo, hi)
            .into_iter()
            .flat_map(|n| n.borrow().starting_markers.iter().collect::<Vec<_>>())
            .filter(|&id| self.end_position(id) <= hi)
            .collect()
    }

    /// Markers fully contained within `[lo, hi]`. Fails with
    /// [`MarkerIndexError::InvalidRange`] if `hi < lo`.
    pub fn find_contained_in(&self, lo: Point, hi: Point) -> Result<MarkerIdSet, MarkerIndexError> {
        if lo > hi {
            return Err(MarkerIndexError::InvalidRange);
        }
        Ok(self.find_contained_in_impl(lo, hi))
    }

    /// Markers that fully contain `[lo, hi]`. Fails with
    /// [`MarkerIndexError::InvalidRange`] if `hi < lo`.
    pub fn find_containing(&self, lo: Point, hi: Point) -> Result<MarkerIdSet, MarkerIndexError> {
        if lo > hi {
            return Err(MarkerIndexError::InvalidRange);
        }
        Ok(self
            .find_intersecting_impl(Point::zero(), hi)
            .iter()
            .filter(|&id| {
                let r = self.range_of(id);
                r.start <= lo && hi <= r.end
            })
            .collect())
    }

    // --- C4.4 splice -------------------------------------------------------

    fn classify(range: Range, lo: Point, hi: Point) -> (bool, bool, bool) {
        let touches = range.intersects(&Range::new(lo, hi));
        let inside = lo <= range.start && range.end <= hi;
        let surround = range.start < lo && hi < range.end;
        (touches, inside, surround)
    }

    fn harvest_window(node: Option<NodeRef>, starts: &mut MarkerIdSet, ends: &mut MarkerIdSet) {
        let Some(node) = node else { return };
        let n = node.borrow();
        let left = n.left.clone();
        let right = n.right.clone();
        for id in n.starting_markers.iter() {
            starts.insert(id);
        }
        for id in n.ending_markers.iter() {
            ends.insert(id);
        }
        drop(n);
        Self::harvest_window(left, starts, ends);
        Self::harvest_window(right, starts, ends);
    }

    /// Replaces the `old_extent`-sized span starting at `start` with a span
    /// of `new_extent`, remapping every marker position and returning how
    /// each touched marker related to the replaced span. See
    /// `SPEC_FULL.md`'s splice section for the full classification table.
    pub fn splice(&mut self, start: Point, old_extent: Point, new_extent: Point) -> SpliceResult {
        let deleted_end = Point::traverse(start, old_extent);
        let inserted_end = Point::traverse(start, new_extent);

        let touch_candidates = if old_extent.is_zero() && new_extent.is_zero() {
            self.find_intersecting_impl(start, start)
        } else {
            self.find_intersecting_impl(start, deleted_end)
        };
        let touched: Vec<(MarkerId, Range)> = touch_candidates
            .iter()
            .map(|id| (id, self.range_of(id)))
            .collect();

        if old_extent.is_zero() && new_extent.is_zero() {
            let mut result = SpliceResult::default();
            for (id, range) in &touched {
                let (_, inside, surround) = Self::classify(*range, start, deleted_end);
                result.touch.insert(*id);
                if *surround {
                    result.surround.insert(*id);
                } else if *inside {
                    result.inside.insert(*id);
                } else {
                    result.overlap.insert(*id);
                }
            }
            return result;
        }

        let start_node = self.tree.find_or_insert(start);

        // Always materialize exactly at `deleted_end`, never just the
        // nearest existing node after it -- end_node.left must be exactly
        // the deleted window, nothing more, and end_node itself must always
        // re-key to exactly `inserted_end` below (see the retarget step),
        // so that boundary-exact exclusive markers float to precisely that
        // position instead of inheriting whatever shift unrelated further
        // content happens to need. For a pure insertion (old_extent is
        // zero) `deleted_end` coincides with `start`, which
        // `find_or_insert_in_right_subtree` handles the same way it always
        // does: by materializing a fresh leftmost node in the right
        // subtree, leaving any real further content as that node's right
        // descendant, untouched until the retarget step below shifts it.
        let end_node = self.tree.find_or_insert_in_right_subtree(&start_node, deleted_end);

        // Detach whatever sits strictly between start_node and end_node --
        // this is the span being deleted/replaced.
        let window = if !std::rc::Rc::ptr_eq(&start_node, &end_node) {
            end_node.borrow_mut().left.take()
        } else {
            None
        };

        let mut window_starts = MarkerIdSet::new();
        let mut window_ends = MarkerIdSet::new();
        Self::harvest_window(window, &mut window_starts, &mut window_ends);

        let mut result = SpliceResult::default();
        for (id, range) in &touched {
            let (_, inside, surround) = Self::classify(*range, start, deleted_end);
            result.touch.insert(*id);
            if *surround {
                result.surround.insert(*id);
            } else if *inside {
                result.inside.insert(*id);
            } else {
                result.overlap.insert(*id);
            }
        }

        // Fully-consumed markers are removed outright.
        for id in window_starts.iter() {
            if window_ends.contains(id) {
                self.endpoints.remove(&id);
                self.exclusive.erase(id);
            }
        }
        // Collapse single-sided markers onto the boundary their exclusivity
        // bias dictates.
        for id in window_starts.iter() {
            if window_ends.contains(id) {
                continue;
            }
            let target = if self.exclusive.contains(id) { &end_node } else { &start_node };
            target.borrow_mut().starting_markers.insert(id);
            if let Some(e) = self.endpoints.get_mut(&id) {
                e.start = target.clone();
            }
        }
        for id in window_ends.iter() {
            if window_starts.contains(id) {
                continue;
            }
            let target = if self.exclusive.contains(id) { &end_node } else { &start_node };
            target.borrow_mut().ending_markers.insert(id);
            if let Some(e) = self.endpoints.get_mut(&id) {
                e.end = target.clone();
            }
        }

        // Boundary-exact markers at start_node: exclusive ones float past
        // the insertion onto end_node.
        if !std::rc::Rc::ptr_eq(&start_node, &end_node) {
            let starting_here: Vec<_> = start_node.borrow().starting_markers.iter().collect();
            for id in starting_here {
                if self.exclusive.contains(id) {
                    start_node.borrow_mut().starting_markers.erase(id);
                    end_node.borrow_mut().starting_markers.insert(id);
                    if let Some(e) = self.endpoints.get_mut(&id) {
                        e.start = end_node.clone();
                    }
                }
            }
            let ending_here: Vec<_> = start_node.borrow().ending_markers.iter().collect();
            for id in ending_here {
                if self.exclusive.contains(id) {
                    start_node.borrow_mut().ending_markers.erase(id);
                    end_node.borrow_mut().ending_markers.insert(id);
                    if let Some(e) = self.endpoints.get_mut(&id) {
                        e.end = end_node.clone();
                    }
                }
            }
        }

        // Re-key end_node (and, transitively, its whole right subtree) to
        // its post-splice position. `end_node` is always a proper
        // descendant of `start_node` (never `start_node` itself --
        // `find_or_insert_in_right_subtree` only ever materializes within
        // `start_node`'s right subtree), so this always runs; the
        // ptr_eq guard stays as a defensive invariant check.
        let mut end_node_merged = false;
        if !std::rc::Rc::ptr_eq(&start_node, &end_node) {
            let old_end_pos = tree::absolute_position(&end_node);
            let new_end_pos = Point::traverse(inserted_end, Point::traversal(old_end_pos, deleted_end));
            let root_pos = tree::absolute_position(&start_node);
            end_node.borrow_mut().distance_from_left_ancestor = Point::traversal(new_end_pos, root_pos);

            if new_end_pos == root_pos {
                // new_extent collapsed end_node onto start_node; splice it out.
                // end_node's right subtree still carries deltas relative to
                // end_node itself, so its contribution has to be pushed down
                // into the child that's about to become start_node's direct
                // right child -- otherwise the shift we just folded into
                // end_node's own delta would be dropped for everything under it.
                let left = end_node.borrow_mut().left.take();
                debug_assert!(left.is_none());
                let right = end_node.borrow_mut().right.take();
                let end_node_delta = end_node.borrow().distance_from_left_ancestor;
                if let Some(r) = &right {
                    let pushed = Point::traverse(end_node_delta, r.borrow().distance_from_left_ancestor);
                    r.borrow_mut().distance_from_left_ancestor = pushed;
                    r.borrow_mut().parent = std::rc::Rc::downgrade(&start_node);
                }
                start_node.borrow_mut().right = right;

                let moved_starts: Vec<_> = end_node.borrow().starting_markers.iter().collect();
                let moved_ends: Vec<_> = end_node.borrow().ending_markers.iter().collect();
                for id in moved_starts {
                    start_node.borrow_mut().starting_markers.insert(id);
                    if let Some(e) = self.endpoints.get_mut(&id) {
                        e.start = start_node.clone();
                    }
                }
                for id in moved_ends {
                    start_node.borrow_mut().ending_markers.insert(id);
                    if let Some(e) = self.endpoints.get_mut(&id) {
                        e.end = start_node.clone();
                    }
                }

                // end_node is no longer reachable from the root; detach it
                // fully so it can't be mistaken for live tree state and
                // doesn't get a stats refresh below.
                end_node.borrow_mut().parent = std::rc::Weak::new();
                end_node_merged = true;
            }
        }

        self.refresh_stats_around(&start_node);
        if !end_node_merged && !std::rc::Rc::ptr_eq(&start_node, &end_node) {
            self.refresh_stats_around(&end_node);
        }

        tracing::trace!(%start, %old_extent, %new_extent, touched = result.touch.len(), "spliced");
        result
    }

    // --- debug -------------------------------------------------------------

    /// A human-readable listing of every live marker's current range, for
    /// tests and debugging.
    pub fn dump(&self) -> Vec<(MarkerId, Range)> {
        let mut out: Vec<_> = self
            .endpoints
            .keys()
            .map(|&id| (id, self.range_of(id)))
            .collect();
        out.sort_by_key(|(id, _)| *id);
        out
    }

    pub fn get_dot_graph(&self) -> String {
        self.tree.dot_graph()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_rejects_duplicate_id() {
        let mut idx = MarkerIndex::new();
        idx.insert(1, Range::new(Point::new(0, 0), Point::new(0, 5))).unwrap();
        assert_eq!(
            idx.insert(1, Range::new(Point::new(0, 1), Point::new(0, 2))),
            Err(MarkerIndexError::DuplicateMarker)
        );
        // The original marker is untouched by the rejected insert.
        assert_eq!(idx.get_range(1), Some(Range::new(Point::new(0, 0), Point::new(0, 5))));
    }

    #[test]
    fn insert_rejects_inverted_range() {
        let mut idx = MarkerIndex::new();
        assert_eq!(
            idx.insert(1, Range::new(Point::new(0, 5), Point::new(0, 2))),
            Err(MarkerIndexError::InvalidRange)
        );
        assert_eq!(idx.get_range(1), None);
    }

    #[test]
    fn spatial_queries_reject_inverted_range() {
        let mut idx = MarkerIndex::new();
        idx.insert(1, Range::new(Point::new(0, 0), Point::new(0, 5))).unwrap();
        let lo = Point::new(0, 5);
        let hi = Point::new(0, 0);

        assert_eq!(idx.find_intersecting(lo, hi), Err(MarkerIndexError::InvalidRange));
        assert_eq!(idx.find_containing(lo, hi), Err(MarkerIndexError::InvalidRange));
        assert_eq!(idx.find_contained_in(lo, hi), Err(MarkerIndexError::InvalidRange));
        assert_eq!(idx.find_starting_in(lo, hi), Err(MarkerIndexError::InvalidRange));
        assert_eq!(idx.find_ending_in(lo, hi), Err(MarkerIndexError::InvalidRange));
    }
}
