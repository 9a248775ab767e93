//! Error taxonomy for the marker index. Deliberately small: most failure
//! modes (`Get*`/`Delete`/`SetExclusive` on an unknown id) are recovered
//! locally as no-ops per the base spec's error-handling design and never
//! reach this enum.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerIndexError {
    /// `insert` called with an id that is already present.
    DuplicateMarker,
    /// A query or `splice` was given a range with `end < start`.
    InvalidRange,
}

impl fmt::Display for MarkerIndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerIndexError::DuplicateMarker => write!(f, "marker id already exists"),
            MarkerIndexError::InvalidRange => write!(f, "range end precedes range start"),
        }
    }
}

impl std::error::Error for MarkerIndexError {}
