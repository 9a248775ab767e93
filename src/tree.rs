//! The splay tree of buffer positions (C2) and the per-node marker-set
//! summaries that ride on top of it (C3).
//!
//! Nodes are reference-counted with non-owning (weak) parent links, the
//! same shape `marker_tree.rs`'s AVL tree uses for its `Node` type --
//! exclusive downward ownership, parent pointers that never outlive their
//! child. Unlike that AVL tree (one node == one marker interval), a node
//! here is a *distinguished position*: many markers can start or end at
//! the same node, and a marker's two endpoints are two (possibly
//! identical) node handles that stay valid across rotations.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::marker_set::MarkerIdSet;
use crate::point::Point;

pub(crate) type NodeRef = Rc<RefCell<Node>>;
pub(crate) type NodePtr = Option<NodeRef>;
type WeakNodePtr = Weak<RefCell<Node>>;

/// Which side of an ancestor the node was dropped down from -- not a
/// persisted field, just what `child_side` reports while walking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Left,
    Right,
}

#[derive(Debug)]
pub(crate) struct Node {
    pub parent: WeakNodePtr,
    pub left: NodePtr,
    pub right: NodePtr,

    /// Delta from this node's nearest ancestor with a strictly smaller
    /// position ("left ancestor"), or the absolute position itself when no
    /// such ancestor exists (i.e. this node has no parent, or every step to
    /// the root was a left descent). See the rotation contract in
    /// `rotate_left`/`rotate_right` for how this is kept consistent.
    pub distance_from_left_ancestor: Point,

    pub starting_markers: MarkerIdSet,
    pub ending_markers: MarkerIdSet,

    /// Kept for introspection (`dot_graph`) and as a record of which side of
    /// the marker's span this node anchors; see `DESIGN.md` for why these
    /// are not incrementally re-keyed through every node a marker's span
    /// passes over the way the base spec's prose describes. Rotations never
    /// need to touch these because they only ever live on a marker's fixed
    /// start/end node handles.
    pub markers_to_left_ancestor: MarkerIdSet,
    pub markers_to_right_ancestor: MarkerIdSet,

    /// Subtree augmentation used to prune spatial queries: the largest end
    /// position, among markers that *start* in this subtree, of the marker
    /// they belong to. Mirrors `marker_tree.rs`'s `max_end`, generalized
    /// from "one interval per node" to "a set of markers starting here".
    pub subtree_max_end: Point,
}

impl Node {
    fn leaf(distance_from_left_ancestor: Point) -> NodeRef {
        Rc::new(RefCell::new(Node {
            parent: Weak::new(),
            left: None,
            right: None,
            distance_from_left_ancestor,
            starting_markers: MarkerIdSet::new(),
            ending_markers: MarkerIdSet::new(),
            markers_to_left_ancestor: MarkerIdSet::new(),
            markers_to_right_ancestor: MarkerIdSet::new(),
            subtree_max_end: Point::zero(),
        }))
    }

    fn is_marker_endpoint(&self) -> bool {
        !self.starting_markers.is_empty() || !self.ending_markers.is_empty()
    }
}

fn side_of(parent: &NodeRef, child: &NodeRef) -> Option<Side> {
    let p = parent.borrow();
    if matches!(&p.left, Some(l) if Rc::ptr_eq(l, child)) {
        Some(Side::Left)
    } else if matches!(&p.right, Some(r) if Rc::ptr_eq(r, child)) {
        Some(Side::Right)
    } else {
        None
    }
}

/// Walks from `node` to the root, composing `distance_from_left_ancestor`
/// fields, to recover the node's current absolute position. O(depth).
pub(crate) fn absolute_position(node: &NodeRef) -> Point {
    let mut acc = node.borrow().distance_from_left_ancestor;
    let mut current = Rc::clone(node);
    loop {
        let parent = current.borrow().parent.upgrade();
        let Some(parent_rc) = parent else { break };
        if side_of(&parent_rc, &current) == Some(Side::Right) {
            let parent_delta = parent_rc.borrow().distance_from_left_ancestor;
            acc = Point::traverse(parent_delta, acc);
        }
        current = parent_rc;
    }
    acc
}

/// The absolute position of `node`'s nearest ancestor with a strictly
/// smaller position, if any.
fn nearest_left_ancestor_position(node: &NodeRef) -> Option<Point> {
    let mut current = Rc::clone(node);
    loop {
        let parent = current.borrow().parent.upgrade()?;
        if side_of(&parent, &current) == Some(Side::Right) {
            return Some(absolute_position(&parent));
        }
        current = parent;
    }
}

/// The splay tree of distinguished positions, plus the id-to-node maps that
/// let the facade jump straight to a marker's endpoints without a search.
#[derive(Debug, Default)]
pub(crate) struct SplayTree {
    pub root: NodePtr,
}

impl SplayTree {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    // --- rotations -------------------------------------------------------

    /// Right-rotation of `x` (whose left child becomes the new local
    /// subtree root). Per the rotation contract: `x`'s former left child and
    /// that child's former right child keep their `distance_from_left_ancestor`
    /// unchanged; only `x` needs a new delta (relative to its new parent,
    /// the former left child). Returns the new local subtree root; the
    /// caller is responsible for relinking it into `x`'s old slot.
    fn rotate_right(x: &NodeRef) -> NodeRef {
        let pos_x = absolute_position(x);
        let l = x.borrow_mut().left.take().expect("rotate_right needs a left child");
        let pos_l = absolute_position(&l);
        let c = l.borrow_mut().right.take();

        if let Some(ref c) = c {
            c.borrow_mut().parent = Rc::downgrade(x);
        }
        x.borrow_mut().left = c;
        x.borrow_mut().distance_from_left_ancestor = Point::traversal(pos_x, pos_l);
        x.borrow_mut().parent = Rc::downgrade(&l);
        l.borrow_mut().right = Some(Rc::clone(x));

        Self::update_subtree_stats(x);
        Self::update_subtree_stats(&l);
        l
    }

    /// Left-rotation of `x` (whose right child becomes the new local
    /// subtree root). Unlike the right case, `x`'s own delta is unchanged;
    /// the new root and the displaced middle child both need new deltas,
    /// because a right child's nearest left ancestor is a single step away
    /// (its old parent) while a left child's is found by skipping upward --
    /// see `DESIGN.md` for the worked derivation.
    fn rotate_left(x: &NodeRef) -> NodeRef {
        let pos_x = absolute_position(x);
        let outer_left_ancestor = nearest_left_ancestor_position(x);

        let r = x.borrow_mut().right.take().expect("rotate_left needs a right child");
        let pos_r = absolute_position(&r);
        let c = r.borrow_mut().left.take();
        let pos_c = c.as_ref().map(absolute_position);

        if let Some(ref c) = c {
            c.borrow_mut().parent = Rc::downgrade(x);
        }
        x.borrow_mut().right = c;
        // x's own delta is unchanged (it is still reached from its new
        // parent `r` via a left-step, which never contributes a delta).
        // c's delta is unchanged too, for the same reason: c is still a
        // right child of its new parent x? No -- c was r's left child and
        // becomes x's right child, i.e. a right-step either way, so its
        // delta needs no adjustment -- the node it's stepping right *from*
        // changed identity (r -> x) but not position.
        let _ = pos_c;

        r.borrow_mut().distance_from_left_ancestor = match outer_left_ancestor {
            Some(e) => Point::traversal(pos_r, e),
            None => pos_r,
        };
        // `r`'s parent link is left stale here (still pointing wherever `x`'s
        // did) -- `rotate_and_relink` overwrites it with `x`'s *original*
        // parent, captured before this function ran. Reading `x.parent` at
        // this point would already reflect the rotation and be wrong.
        x.borrow_mut().parent = Rc::downgrade(&r);
        r.borrow_mut().left = Some(Rc::clone(x));
        let _ = pos_x;

        Self::update_subtree_stats(x);
        Self::update_subtree_stats(&r);
        r
    }

    /// Rotates `pivot` (lifting its left child if `side == Left`, i.e. a
    /// right-rotation, or its right child if `side == Right`) and relinks
    /// the resulting local subtree root into whatever slot `pivot` used to
    /// occupy. `pivot`'s original parent/side must be captured by the
    /// caller *before* rotating -- the rotation itself overwrites `pivot`'s
    /// parent pointer, so reading it afterward would see the wrong node.
    fn rotate_and_relink(&mut self, pivot: &NodeRef, side: Side) -> NodeRef {
        let original_parent = pivot.borrow().parent.upgrade();
        let original_side = original_parent.as_ref().map(|p| side_of(p, pivot).unwrap());

        let new_root = match side {
            Side::Left => Self::rotate_right(pivot),
            Side::Right => Self::rotate_left(pivot),
        };

        match original_parent {
            None => {
                self.root = Some(Rc::clone(&new_root));
                new_root.borrow_mut().parent = Weak::new();
            }
            Some(parent) => {
                match original_side.unwrap() {
                    Side::Left => parent.borrow_mut().left = Some(Rc::clone(&new_root)),
                    Side::Right => parent.borrow_mut().right = Some(Rc::clone(&new_root)),
                }
                new_root.borrow_mut().parent = Rc::downgrade(&parent);
            }
        }
        new_root
    }

    /// Splays `node` to the root of the whole tree via repeated zig /
    /// zig-zig / zig-zag rotations.
    pub fn splay(&mut self, node: &NodeRef) {
        loop {
            let Some(parent) = node.borrow().parent.upgrade() else {
                break;
            };
            let node_side = side_of(&parent, node).expect("node must be a child of its parent");

            match parent.borrow().parent.upgrade() {
                None => {
                    // zig
                    self.rotate_and_relink(&parent, node_side);
                }
                Some(grandparent) => {
                    let parent_side =
                        side_of(&grandparent, &parent).expect("parent must be a child of grandparent");
                    match (parent_side, node_side) {
                        (Side::Left, Side::Left) => {
                            self.rotate_and_relink(&grandparent, Side::Left);
                            self.rotate_and_relink(&parent, Side::Left);
                        }
                        (Side::Right, Side::Right) => {
                            self.rotate_and_relink(&grandparent, Side::Right);
                            self.rotate_and_relink(&parent, Side::Right);
                        }
                        (Side::Left, Side::Right) => {
                            self.rotate_and_relink(&parent, Side::Right);
                            self.rotate_and_relink(&grandparent, Side::Left);
                        }
                        (Side::Right, Side::Left) => {
                            self.rotate_and_relink(&parent, Side::Left);
                            self.rotate_and_relink(&grandparent, Side::Right);
                        }
                    }
                }
            }
        }
        tracing::trace!("splayed node to root");
    }

    /// Runs `f` against `subtree` as if it were an independent whole tree
    /// (its local root's parent link is cleared for the duration), then
    /// returns whatever `f` leaves as that tree's root. `self.root` is
    /// saved and restored around the call so `f` can freely use
    /// `self`-based search/splay methods.
    fn with_detached_subtree<F: FnOnce(&mut SplayTree)>(&mut self, subtree: NodePtr, f: F) -> NodePtr {
        let saved_root = self.root.take();
        self.root = subtree;
        if let Some(r) = &self.root {
            r.borrow_mut().parent = Weak::new();
        }
        f(self);
        let result = self.root.take();
        self.root = saved_root;
        result
    }

    /// Finds or creates the node at `target` within `parent`'s right
    /// subtree specifically, leaving it as `parent.right` on return. Used
    /// by splice, which needs a boundary node guaranteed to be a direct
    /// child of the already-splayed `start` node.
    ///
    /// `target` is a true, absolute position. Once detached, a subtree's
    /// local root has no parent, so [`absolute_position`] reads its stored
    /// delta as if it *were* absolute — every position computed inside the
    /// detached search is really "true position minus `parent`'s true
    /// position". `target` has to be translated into that same frame before
    /// the search, or the comparisons it drives (and the delta stamped on
    /// any freshly materialized node) land on the wrong side of `parent`
    /// entirely once the subtree is reattached.
    pub fn find_or_insert_in_right_subtree(&mut self, parent: &NodeRef, target: Point) -> NodeRef {
        let parent_pos = absolute_position(parent);
        let local_target = Point::traversal(target, parent_pos);
        let subtree = parent.borrow_mut().right.take();
        let mut found = None;
        let new_subtree = self.with_detached_subtree(subtree, |t| {
            found = Some(t.find_or_insert(local_target));
        });
        parent.borrow_mut().right = new_subtree;
        if let Some(n) = parent.borrow().right.clone() {
            n.borrow_mut().parent = Rc::downgrade(parent);
        }
        found.expect("find_or_insert always returns a node")
    }

    // --- search / materialize --------------------------------------------

    /// Finds (without materializing) the node at exactly `target`, if any,
    /// and splays it to the root. Returns `false` (tree unchanged other
    /// than the splay of the closest node visited) if no exact match
    /// exists.
    pub fn find(&mut self, target: Point) -> bool {
        let Some(mut current) = self.root.clone() else {
            return false;
        };
        loop {
            let pos = absolute_position(&current);
            let next = if target == pos {
                self.splay(&current);
                return true;
            } else if target < pos {
                current.borrow().left.clone()
            } else {
                current.borrow().right.clone()
            };
            match next {
                Some(n) => current = n,
                None => {
                    self.splay(&current);
                    return false;
                }
            }
        }
    }

    /// Finds or creates the node at `target`, splaying it to the root.
    pub fn find_or_insert(&mut self, target: Point) -> NodeRef {
        let Some(root) = self.root.clone() else {
            let node = Node::leaf(target);
            self.root = Some(Rc::clone(&node));
            return node;
        };

        let mut current = root;
        loop {
            let pos = absolute_position(&current);
            if target == pos {
                self.splay(&current);
                return current;
            }
            // A new right child's nearest left ancestor is always `current`
            // itself, one right-step away, so `pos` is the right reference
            // frame. A new left child's nearest left ancestor is whatever
            // `current`'s own is (the left-child edge contributes nothing to
            // that walk, exactly as `absolute_position` skips it) -- using
            // `pos` there instead would stamp the new leaf with a delta
            // relative to the wrong node whenever `current` itself has a
            // left ancestor above it. Mirrors `rotate_left`'s
            // `outer_left_ancestor` handling for the same reason.
            let delta = if target < pos {
                match nearest_left_ancestor_position(&current) {
                    Some(la) => Point::traversal(target, la),
                    None => target,
                }
            } else {
                Point::traversal(target, pos)
            };
            let side = if target < pos {
                current.borrow().left.clone()
            } else {
                current.borrow().right.clone()
            };
            match side {
                Some(next) => current = next,
                None => {
                    let new_node = Node::leaf(delta);
                    new_node.borrow_mut().parent = Rc::downgrade(&current);
                    if target < pos {
                        current.borrow_mut().left = Some(Rc::clone(&new_node));
                    } else {
                        current.borrow_mut().right = Some(Rc::clone(&new_node));
                    }
                    self.splay(&new_node);
                    return new_node;
                }
            }
        }
    }

    /// Splays the greatest node with position `<= target` (or `< target`
    /// when `!inclusive`) to the root. Returns `None` if no such node
    /// exists (tree is left unchanged).
    pub fn splay_greatest_lower_bound(&mut self, target: Point, inclusive: bool) -> NodePtr {
        let mut current = self.root.clone()?;
        let mut best: NodePtr = None;
        loop {
            let pos = absolute_position(&current);
            let qualifies = if inclusive { pos <= target } else { pos < target };
            if qualifies {
                best = Some(Rc::clone(&current));
                match current.borrow().right.clone() {
                    Some(r) => current = r,
                    None => break,
                }
            } else {
                match current.borrow().left.clone() {
                    Some(l) => current = l,
                    None => break,
                }
            }
        }
        if let Some(ref n) = best {
            self.splay(n);
        }
        best
    }

    /// Symmetric to [`Self::splay_greatest_lower_bound`].
    pub fn splay_least_upper_bound(&mut self, target: Point, inclusive: bool) -> NodePtr {
        let mut current = self.root.clone()?;
        let mut best: NodePtr = None;
        loop {
            let pos = absolute_position(&current);
            let qualifies = if inclusive { pos >= target } else { pos > target };
            if qualifies {
                best = Some(Rc::clone(&current));
                match current.borrow().left.clone() {
                    Some(l) => current = l,
                    None => break,
                }
            } else {
                match current.borrow().right.clone() {
                    Some(r) => current = r,
                    None => break,
                }
            }
        }
        if let Some(ref n) = best {
            self.splay(n);
        }
        best
    }

    // --- augmentation maintenance ------------------------------------------

    fn update_subtree_stats(node: &NodeRef) {
        let mut n = node.borrow_mut();
        let left_max = n.left.as_ref().map(|l| l.borrow().subtree_max_end);
        let right_max = n.right.as_ref().map(|r| r.borrow().subtree_max_end);
        let mut max_end = n.subtree_max_end;
        if let Some(l) = left_max {
            max_end = Point::max(max_end, l);
        }
        if let Some(r) = right_max {
            max_end = Point::max(max_end, r);
        }
        n.subtree_max_end = max_end;
    }

    /// Recomputes `subtree_max_end` for `node` from its own starting-marker
    /// endpoints (supplied by the caller, which owns the id maps) and its
    /// children, then propagates upward to the root.
    pub fn refresh_stats_from(&self, node: &NodeRef, own_local_max_end: Point) {
        let mut current = Rc::clone(node);
        let mut local = own_local_max_end;
        loop {
            {
                let mut n = current.borrow_mut();
                let left_max = n.left.as_ref().map(|l| l.borrow().subtree_max_end);
                let right_max = n.right.as_ref().map(|r| r.borrow().subtree_max_end);
                let mut max_end = local;
                if let Some(l) = left_max {
                    max_end = Point::max(max_end, l);
                }
                if let Some(r) = right_max {
                    max_end = Point::max(max_end, r);
                }
                n.subtree_max_end = max_end;
            }
            let Some(parent) = current.borrow().parent.upgrade() else {
                break;
            };
            // A parent's own local contribution is whatever it already had;
            // only its children (one of which we just updated) changed.
            local = parent.borrow().subtree_max_end;
            local = Point::max(local, current.borrow().subtree_max_end);
            current = parent;
        }
    }

    // --- structural deletion ----------------------------------------------

    /// Removes `node` from the tree once it has no starting/ending markers
    /// left and is not otherwise needed (data-model invariant 3).
    pub fn delete_node_if_empty(&mut self, node: &NodeRef) {
        if node.borrow().is_marker_endpoint() {
            return;
        }
        self.splay(node);
        let left = node.borrow_mut().left.take();
        let right = node.borrow_mut().right.take();
        match (left, right) {
            (None, None) => {
                self.root = None;
            }
            (Some(l), None) => {
                l.borrow_mut().parent = Weak::new();
                self.root = Some(l);
            }
            (None, Some(r)) => {
                r.borrow_mut().parent = Weak::new();
                self.root = Some(r);
            }
            (Some(l), Some(r)) => {
                // Splay the in-order predecessor of `r` (its minimum) so it
                // has no left child, then hang `l` off it.
                let mut min = Rc::clone(&r);
                loop {
                    let next = min.borrow().left.clone();
                    match next {
                        Some(n) => min = n,
                        None => break,
                    }
                }
                r.borrow_mut().parent = Weak::new();
                self.root = Some(r);
                self.splay(&min);
                min.borrow_mut().left = Some(Rc::clone(&l));
                l.borrow_mut().parent = Rc::downgrade(&min);
                self.root = Some(min.clone());
                Self::update_subtree_stats(&min);
            }
        }
    }

    // --- debug -------------------------------------------------------------

    pub fn dot_graph(&self) -> String {
        let mut out = String::from("digraph MarkerIndex {\n");
        if let Some(root) = &self.root {
            write_dot(root, &mut out);
        }
        out.push_str("}\n");
        out
    }
}

fn write_dot(node: &NodeRef, out: &mut String) {
    let pos = absolute_position(node);
    let n = node.borrow();
    out.push_str(&format!(
        "  \"{:p}\" [label=\"{} start={:?} end={:?}\"];\n",
        Rc::as_ptr(node),
        pos,
        n.starting_markers.iter().collect::<Vec<_>>(),
        n.ending_markers.iter().collect::<Vec<_>>(),
    ));
    if let Some(l) = &n.left {
        out.push_str(&format!(
            "  \"{:p}\" -> \"{:p}\" [label=L];\n",
            Rc::as_ptr(node),
            Rc::as_ptr(l)
        ));
    }
    if let Some(r) = &n.right {
        out.push_str(&format!(
            "  \"{:p}\" -> \"{:p}\" [label=R];\n",
            Rc::as_ptr(node),
            Rc::as_ptr(r)
        ));
    }
    let left = n.left.clone();
    let right = n.right.clone();
    drop(n);
    if let Some(l) = left {
        write_dot(&l, out);
    }
    if let Some(r) = right {
        write_dot(&r, out);
    }
}
