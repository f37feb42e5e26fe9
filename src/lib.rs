//! # acl-trie
//!
//! Batched classification of byte keys against compiled access control
//! rules.
//!
//! Rules are compiled (elsewhere) into one or more multi-bit tries that share
//! a flat transition table. Each trie consumes key bytes at the offsets named
//! by its data index and ends on a MATCH record pointing at per-category
//! priorities and results. A classify call walks many keys through every trie
//! in parallel lanes and, per key and category, keeps the result of the
//! highest priority match.
//!
//! ## Example
//!
//! ```rust
//! use acl_trie::{AclContext, MatchResults, TableBuilder, TrieDesc};
//!
//! let mut b = TableBuilder::new();
//! let low = b.add_match(MatchResults::uniform(10, 1)).unwrap();
//! let high = b.add_match(MatchResults::uniform(5, 2)).unwrap();
//!
//! let mut root = [low; 256];
//! root[128..].fill(high);
//! let root = b.add_root(&root).unwrap();
//!
//! let ctx = AclContext::from_builder("example", b, vec![TrieDesc::sequential(root, 1)]).unwrap();
//!
//! let keys: [&[u8]; 3] = [&[0x01], &[0x90], &[]];
//! let mut results = [0u32; 3];
//! ctx.classify(&keys, &mut results, 1).unwrap();
//! assert_eq!(results, [1, 2, 1]);
//! ```
//!
//! ## Table layout
//!
//! Record 0 of every transition table is the idle node and match slot 0 is
//! the no-match entry; [`TableBuilder::new`] seeds both. A context validates
//! its tables once on construction, after which every search is safe.

#![deny(unsafe_op_in_unsafe_fn)]

#[cfg(target_arch = "x86_64")]
mod avx2;
mod context;
mod error;
mod flow;
mod node;
mod resolve;
mod scalar;
mod step;
mod table;

pub use context::{AclContext, Algorithm, TrieDesc, BATCH_LANES, MAX_FLOWS, MAX_TRIES};
pub use error::{AclError, Result};
pub use node::{MatchResults, NodeType, Transition, MAX_CATEGORIES, MAX_INDEX};
pub use step::LoadWidth;
pub use table::TableBuilder;

#[cfg(test)]
mod proptests;
