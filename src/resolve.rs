//! Match resolution.
//!
//! `matches` is trie-major: the match index of key `k` in trie `t` lives at
//! `matches[t * nb_pkt + k]`. For every key and category the entry with the
//! greatest priority wins; a later trie only replaces the running best when
//! its priority is strictly greater, so ties go to the earlier trie.
//!
//! `results` is key-major: `results[k * nb_cat + c]`.

use crate::node::{MatchResults, MAX_CATEGORIES};

/// Keys resolved per pass of the single category path.
pub(crate) const RESOLVE_CHUNK: usize = 16;

/// Categories resolved per pass of the multi category paths.
pub(crate) const CATEGORY_GROUP: usize = MAX_CATEGORIES / 2;

/// Reference resolver: one key, one category, one trie at a time.
pub(crate) fn resolve_scalar(
    results: &mut [u32],
    pr: &[MatchResults],
    matches: &[u32],
    nb_pkt: usize,
    nb_cat: usize,
    nb_trie: usize,
) {
    for k in 0..nb_pkt {
        for c in 0..nb_cat {
            let first = &pr[matches[k] as usize];
            let mut priority = first.priority[c];
            let mut result = first.results[c];
            for t in 1..nb_trie {
                let m = &pr[matches[t * nb_pkt + k] as usize];
                if m.priority[c] > priority {
                    priority = m.priority[c];
                    result = m.results[c];
                }
            }
            results[k * nb_cat + c] = result;
        }
    }
}

/// Keeps `cur` where it is at least as good as `new`.
#[inline]
fn select<const N: usize>(cp: &mut [i32; N], cr: &mut [u32; N], np: &[i32; N], nr: &[u32; N]) {
    for i in 0..N {
        let take = np[i] > cp[i];
        cp[i] = if take { np[i] } else { cp[i] };
        cr[i] = if take { nr[i] } else { cr[i] };
    }
}

/// Single category, [`RESOLVE_CHUNK`] keys per pass.
pub(crate) fn resolve_single(
    results: &mut [u32],
    pr: &[MatchResults],
    matches: &[u32],
    nb_pkt: usize,
    nb_trie: usize,
) {
    for (chunk, out) in results[..nb_pkt].chunks_mut(RESOLVE_CHUNK).enumerate() {
        let base = chunk * RESOLVE_CHUNK;
        let n = out.len();

        // Short chunks are padded with the no-match slot.
        let gather = |t: usize| {
            let mut p = [0i32; RESOLVE_CHUNK];
            let mut r = [0u32; RESOLVE_CHUNK];
            for i in 0..n {
                let m = &pr[matches[t * nb_pkt + base + i] as usize];
                p[i] = m.priority[0];
                r[i] = m.results[0];
            }
            (p, r)
        };

        let (mut cp, mut cr) = gather(0);
        for t in 1..nb_trie {
            let (np, nr) = gather(t);
            select(&mut cp, &mut cr, &np, &nr);
        }
        out.copy_from_slice(&cr[..n]);
    }
}

/// Loads one category group of a match slot.
#[inline]
fn load_group(m: &MatchResults, g: usize) -> ([i32; CATEGORY_GROUP], [u32; CATEGORY_GROUP]) {
    let mut p = [0i32; CATEGORY_GROUP];
    let mut r = [0u32; CATEGORY_GROUP];
    p.copy_from_slice(&m.priority[g..g + CATEGORY_GROUP]);
    r.copy_from_slice(&m.results[g..g + CATEGORY_GROUP]);
    (p, r)
}

/// Up to [`CATEGORY_GROUP`] categories: every category of a key in one pass.
pub(crate) fn resolve_mc_narrow(
    results: &mut [u32],
    pr: &[MatchResults],
    matches: &[u32],
    nb_pkt: usize,
    nb_cat: usize,
    nb_trie: usize,
) {
    debug_assert!(nb_cat <= CATEGORY_GROUP);
    for (k, out) in results.chunks_exact_mut(nb_cat).take(nb_pkt).enumerate() {
        let (mut cp, mut cr) = load_group(&pr[matches[k] as usize], 0);
        for t in 1..nb_trie {
            let (np, nr) = load_group(&pr[matches[t * nb_pkt + k] as usize], 0);
            select(&mut cp, &mut cr, &np, &nr);
        }
        out.copy_from_slice(&cr[..nb_cat]);
    }
}

/// More than [`CATEGORY_GROUP`] categories: per key, one pass per group.
pub(crate) fn resolve_mc_wide(
    results: &mut [u32],
    pr: &[MatchResults],
    matches: &[u32],
    nb_pkt: usize,
    nb_cat: usize,
    nb_trie: usize,
) {
    debug_assert!(nb_cat <= MAX_CATEGORIES);
    for (k, out) in results.chunks_exact_mut(nb_cat).take(nb_pkt).enumerate() {
        for g in (0..nb_cat).step_by(CATEGORY_GROUP) {
            let (mut cp, mut cr) = load_group(&pr[matches[k] as usize], g);
            for t in 1..nb_trie {
                let (np, nr) = load_group(&pr[matches[t * nb_pkt + k] as usize], g);
                select(&mut cp, &mut cr, &np, &nr);
            }
            let n = CATEGORY_GROUP.min(nb_cat - g);
            out[g..g + n].copy_from_slice(&cr[..n]);
        }
    }
}
