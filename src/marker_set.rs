//! A specialized unordered-but-unique collection of marker ids.
//!
//! Not a general-purpose abstraction: a sorted `Vec` with merge-style set
//! operations is the appropriate representation for the heavy
//! insert/erase/union/difference workload rotations and splices put on
//! these sets (see the design note in the base spec's DESIGN NOTES
//! section).

use std::collections::HashSet;
use std::ops::{Add, Sub};

pub type MarkerId = u64;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerIdSet {
    ids: Vec<MarkerId>,
}

impl MarkerIdSet {
    pub fn new() -> Self {
        Self { ids: Vec::new() }
    }

    pub fn from_ids(mut ids: Vec<MarkerId>) -> Self {
        ids.sort_unstable();
        ids.dedup();
        Self { ids }
    }

    pub fn insert(&mut self, id: MarkerId) {
        if let Err(i) = self.ids.binary_search(&id) {
            self.ids.insert(i, id);
        }
    }

    pub fn erase(&mut self, id: MarkerId) {
        if let Ok(i) = self.ids.binary_search(&id) {
            self.ids.remove(i);
        }
    }

    pub fn contains(&self, id: MarkerId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = MarkerId> + '_ {
        self.ids.iter().copied()
    }

    pub fn union(&self, other: &MarkerIdSet) -> MarkerIdSet {
        let mut out = Vec::with_capacity(self.ids.len() + other.ids.len());
        let (mut i, mut j) = (0, 0);
        while i < self.ids.len() && j < other.ids.len() {
            match self.ids[i].cmp(&other.ids[j]) {
                std::cmp::Ordering::Less => {
                    out.push(self.ids[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    out.push(other.ids[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    out.push(self.ids[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&self.ids[i..]);
        out.extend_from_slice(&other.ids[j..]);
        MarkerIdSet { ids: out }
    }

    pub fn difference(&self, other: &MarkerIdSet) -> MarkerIdSet {
        let ids = self
            .ids
            .iter()
            .copied()
            .filter(|id| !other.contains(*id))
            .collect();
        MarkerIdSet { ids }
    }

    pub fn to_hash_set(&self) -> HashSet<MarkerId> {
        self.ids.iter().copied().collect()
    }
}

impl Add for &MarkerIdSet {
    type Output = MarkerIdSet;
    fn add(self, rhs: &MarkerIdSet) -> MarkerIdSet {
        self.union(rhs)
    }
}

impl Sub for &MarkerIdSet {
    type Output = MarkerIdSet;
    fn sub(self, rhs: &MarkerIdSet) -> MarkerIdSet {
        self.difference(rhs)
    }
}

impl FromIterator<MarkerId> for MarkerIdSet {
    fn from_iter<T: IntoIterator<Item = MarkerId>>(iter: T) -> Self {
        MarkerIdSet::from_ids(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a MarkerIdSet {
    type Item = MarkerId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, MarkerId>>;
    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter().copied()
    }
}
