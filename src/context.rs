//! Compiled context and the classify entry points.

use std::fmt;
use std::str::FromStr;

use log::{debug, trace};

#[cfg(target_arch = "x86_64")]
use crate::avx2::Avx2;
use crate::error::{AclError, Result};
use crate::flow::FlowContext;
use crate::node::{MatchResults, Transition, MAX_CATEGORIES, NO_MATCH_INDEX};
use crate::resolve::{
    resolve_mc_narrow, resolve_mc_wide, resolve_scalar, resolve_single, CATEGORY_GROUP,
};
use crate::scalar;
use crate::step::{LoadWidth, Portable, Stepper};
use crate::table::{self, TableBuilder};

// =============================================================================
// Configuration
// =============================================================================

/// Maximum number of tries in one context.
pub const MAX_TRIES: usize = 8;

/// Lanes per batch in the batched search.
pub const BATCH_LANES: usize = 16;

/// Keys walked concurrently by the batched search (two batches).
pub const MAX_FLOWS: usize = 2 * BATCH_LANES;

/// Classify implementation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Best implementation the running CPU supports.
    #[default]
    Default,
    /// Sequential byte-by-byte walk per key.
    Scalar,
    /// Batched lane walk without ISA-specific code.
    Portable,
    /// Batched lane walk on AVX2 (x86_64 only).
    Avx2,
}

impl Algorithm {
    pub const ALL: [Algorithm; 4] = [
        Algorithm::Default,
        Algorithm::Scalar,
        Algorithm::Portable,
        Algorithm::Avx2,
    ];

    pub fn is_supported(self) -> bool {
        match self {
            Algorithm::Default | Algorithm::Scalar | Algorithm::Portable => true,
            #[cfg(target_arch = "x86_64")]
            Algorithm::Avx2 => Avx2::detect().is_some(),
            #[cfg(not(target_arch = "x86_64"))]
            Algorithm::Avx2 => false,
        }
    }

    /// Replaces [`Algorithm::Default`] with the concrete choice.
    pub fn resolve(self) -> Algorithm {
        match self {
            Algorithm::Default if Algorithm::Avx2.is_supported() => Algorithm::Avx2,
            Algorithm::Default => Algorithm::Portable,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Default => "default",
            Algorithm::Scalar => "scalar",
            Algorithm::Portable => "portable",
            Algorithm::Avx2 => "avx2",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self> {
        Algorithm::ALL
            .into_iter()
            .find(|alg| alg.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AclError::UnknownAlgorithm(s.to_owned()))
    }
}

// =============================================================================
// Tries
// =============================================================================

/// Where one trie starts and which key bytes it reads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrieDesc {
    /// First record of the 256-entry root node.
    pub root_index: u32,
    /// Byte offset in the key of every load, in walk order. Load 0 is
    /// `first_load` wide, the rest are four bytes.
    pub data_index: Vec<u32>,
    /// Width of load 0. Only its low byte is consumed.
    pub first_load: LoadWidth,
}

impl TrieDesc {
    pub fn new(root_index: u32, data_index: Vec<u32>, first_load: LoadWidth) -> Self {
        Self {
            root_index,
            data_index,
            first_load,
        }
    }

    /// A trie that consumes the key front to back, for keys of up to `len`
    /// bytes.
    pub fn sequential(root_index: u32, len: usize) -> Self {
        let mut data_index = vec![0u32];
        data_index.extend((1..len.max(1)).step_by(4).map(|off| off as u32));
        Self::new(root_index, data_index, LoadWidth::One)
    }
}

// =============================================================================
// Context
// =============================================================================

/// Immutable, validated rule tables plus the tries that walk them.
///
/// A context is never modified by a search, so it can be shared between
/// threads; replace the whole context (e.g. behind an `Arc`) to update rules.
pub struct AclContext {
    name: String,
    trans: Box<[Transition]>,
    match_results: Box<[MatchResults]>,
    tries: Vec<TrieDesc>,
    alg: Algorithm,
}

impl AclContext {
    /// Validates the tables and every trie root.
    pub fn new(
        name: impl Into<String>,
        trans: Vec<Transition>,
        match_results: Vec<MatchResults>,
        tries: Vec<TrieDesc>,
    ) -> Result<Self> {
        let name = name.into();
        if tries.is_empty() || tries.len() > MAX_TRIES {
            return Err(AclError::TrieCount {
                got: tries.len(),
                max: MAX_TRIES,
            });
        }
        table::validate(&trans, &match_results)?;
        for (i, trie) in tries.iter().enumerate() {
            table::validate_root(i, trie.root_index, trans.len())?;
        }

        let alg = Algorithm::Default.resolve();
        debug!(
            "acl context {name:?}: {} tries, {} transitions, {} match slots, algorithm {alg}",
            tries.len(),
            trans.len(),
            match_results.len(),
        );
        Ok(Self {
            name,
            trans: trans.into_boxed_slice(),
            match_results: match_results.into_boxed_slice(),
            tries,
            alg,
        })
    }

    /// Builds a context straight from a [`TableBuilder`].
    pub fn from_builder(
        name: impl Into<String>,
        builder: TableBuilder,
        tries: Vec<TrieDesc>,
    ) -> Result<Self> {
        let (trans, match_results) = builder.build();
        Self::new(name, trans, match_results, tries)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tries(&self) -> &[TrieDesc] {
        &self.tries
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.trans
    }

    pub fn match_results(&self) -> &[MatchResults] {
        &self.match_results
    }

    /// The concrete algorithm used by [`AclContext::classify`].
    pub fn algorithm(&self) -> Algorithm {
        self.alg
    }

    pub fn set_algorithm(&mut self, alg: Algorithm) -> Result<()> {
        if !alg.is_supported() {
            return Err(AclError::Unsupported(alg));
        }
        self.alg = alg.resolve();
        debug!("acl context {:?}: algorithm {}", self.name, self.alg);
        Ok(())
    }

    /// Classifies `keys`, writing `categories` results per key.
    ///
    /// `results[k * categories + c]` receives the result of the highest
    /// priority rule matching key `k` in category `c`, or
    /// [`MatchResults::NO_MATCH_RESULT`].
    pub fn classify(&self, keys: &[&[u8]], results: &mut [u32], categories: u32) -> Result<()> {
        self.classify_alg(keys, results, categories, self.alg)
    }

    /// [`AclContext::classify`] with an explicit algorithm.
    pub fn classify_alg(
        &self,
        keys: &[&[u8]],
        results: &mut [u32],
        categories: u32,
        alg: Algorithm,
    ) -> Result<()> {
        let nb_cat = categories as usize;
        if nb_cat == 0 || nb_cat > MAX_CATEGORIES {
            return Err(AclError::InvalidCategories(categories));
        }
        let need = keys.len() * nb_cat;
        if results.len() < need {
            return Err(AclError::ResultsTooSmall {
                got: results.len(),
                need,
            });
        }
        if keys.is_empty() {
            return Ok(());
        }

        let alg = alg.resolve();
        trace!(
            "acl context {:?}: classify {} keys, {nb_cat} categories, {alg}",
            self.name,
            keys.len()
        );

        let mut matches = vec![NO_MATCH_INDEX; self.tries.len() * keys.len()];
        match alg {
            Algorithm::Scalar => {
                scalar::search(&self.trans, &self.tries, keys, &mut matches);
                resolve_scalar(
                    results,
                    &self.match_results,
                    &matches,
                    keys.len(),
                    nb_cat,
                    self.tries.len(),
                );
            }
            #[cfg(target_arch = "x86_64")]
            Algorithm::Avx2 => {
                let simd = Avx2::detect().ok_or(AclError::Unsupported(alg))?;
                self.search_lanes::<BATCH_LANES, _>(simd, keys, &mut matches);
                if nb_cat == 1 {
                    simd.resolve_single(
                        results,
                        &self.match_results,
                        &matches,
                        keys.len(),
                        self.tries.len(),
                    );
                } else {
                    self.resolve_multi(results, &matches, keys.len(), nb_cat);
                }
            }
            #[cfg(not(target_arch = "x86_64"))]
            Algorithm::Avx2 => return Err(AclError::Unsupported(alg)),
            Algorithm::Portable | Algorithm::Default => {
                self.classify_lanes::<BATCH_LANES>(keys, results, nb_cat, &mut matches);
            }
        }
        Ok(())
    }

    /// Portable batched classify at lane width `W`.
    pub(crate) fn classify_lanes<const W: usize>(
        &self,
        keys: &[&[u8]],
        results: &mut [u32],
        nb_cat: usize,
        matches: &mut [u32],
    ) {
        self.search_lanes::<W, _>(Portable, keys, matches);
        if nb_cat == 1 {
            resolve_single(
                results,
                &self.match_results,
                matches,
                keys.len(),
                self.tries.len(),
            );
        } else {
            self.resolve_multi(results, matches, keys.len(), nb_cat);
        }
    }

    fn search_lanes<const W: usize, S: Stepper<W>>(
        &self,
        stepper: S,
        keys: &[&[u8]],
        matches: &mut [u32],
    ) {
        for (trie, out) in self.tries.iter().zip(matches.chunks_exact_mut(keys.len())) {
            FlowContext::new(&self.trans, trie, keys, out).search::<W, S>(stepper);
        }
    }

    fn resolve_multi(&self, results: &mut [u32], matches: &[u32], nb_pkt: usize, nb_cat: usize) {
        let nb_trie = self.tries.len();
        if nb_cat <= CATEGORY_GROUP {
            resolve_mc_narrow(results, &self.match_results, matches, nb_pkt, nb_cat, nb_trie);
        } else {
            resolve_mc_wide(results, &self.match_results, matches, nb_pkt, nb_cat, nb_trie);
        }
    }
}

impl fmt::Debug for AclContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AclContext")
            .field("name", &self.name)
            .field("tries", &self.tries.len())
            .field("transitions", &self.trans.len())
            .field("match_results", &self.match_results.len())
            .field("algorithm", &self.alg)
            .finish()
    }
}
