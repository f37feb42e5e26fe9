use thiserror::Error;

use crate::context::Algorithm;
use crate::node::MAX_CATEGORIES;

/// Errors raised while assembling a context or validating a classify call.
///
/// Nothing inside the stepping loop can fail; every check happens once, up
/// front.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AclError {
    #[error("transition table exceeds the addressable size")]
    TableFull,

    #[error("range node with {bounds} bounds needs bounds + 1 children, got {children}")]
    RangeArity { bounds: usize, children: usize },

    #[error("range bounds must be strictly ascending and below 0xff")]
    UnsortedBounds,

    #[error("record 0 must be the idle transition")]
    MissingIdle,

    #[error("match slot 0 must be the no-match sentinel")]
    MissingNoMatch,

    #[error("transition {index} uses the reserved node type")]
    ReservedNodeType { index: usize },

    #[error("transition {index} reaches record {target}, table has {len}")]
    TransitionOutOfBounds {
        index: usize,
        target: usize,
        len: usize,
    },

    #[error("transition {index} has DFA group {group} offset past its own group")]
    BadGroupOffset { index: usize, group: usize },

    #[error("transition {index} references match {match_index}, table has {len}")]
    MatchOutOfBounds {
        index: usize,
        match_index: u32,
        len: usize,
    },

    #[error("trie {trie} root {root} does not fit a 256-entry node in a table of {len}")]
    RootOutOfBounds { trie: usize, root: u32, len: usize },

    #[error("context needs between 1 and {max} tries, got {got}")]
    TrieCount { got: usize, max: usize },

    #[error("categories must be within 1..={max}, got {0}", max = MAX_CATEGORIES)]
    InvalidCategories(u32),

    #[error("results buffer holds {got} entries, need {need}")]
    ResultsTooSmall { got: usize, need: usize },

    #[error("algorithm {0} is not supported on this CPU")]
    Unsupported(Algorithm),

    #[error("unknown classify algorithm {0:?}")]
    UnknownAlgorithm(String),
}

pub type Result<T, E = AclError> = std::result::Result<T, E>;
