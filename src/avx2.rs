//! AVX2 stepper and single category resolver.
//!
//! A batch of 16 lanes is held as two 8-lane halves. Byte fetch stays on the
//! shared per-lane loader: AVX2 has no byte gather.

use std::arch::x86_64::*;

use crate::node::{
    MatchResults, Transition, MATCH_LOG, MAX_CATEGORIES, NODE_INDEX, NODE_MATCH, RANGE_BIAS,
};
use crate::step::Stepper;

/// Lanes per 256-bit register.
const HALF: usize = 8;

/// Proof that the running CPU has AVX2.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Avx2 {
    _private: (),
}

impl Avx2 {
    pub(crate) fn detect() -> Option<Self> {
        if std::is_x86_feature_detected!("avx2") {
            Some(Self { _private: () })
        } else {
            None
        }
    }

    /// Same contract as [`crate::resolve::resolve_single`].
    pub(crate) fn resolve_single(
        self,
        results: &mut [u32],
        pr: &[MatchResults],
        matches: &[u32],
        nb_pkt: usize,
        nb_trie: usize,
    ) {
        for (chunk, out) in results[..nb_pkt].chunks_mut(HALF).enumerate() {
            // SAFETY: AVX2 is proven by `self`. Every match index comes from a
            // validated MATCH transition, and short chunks are padded with
            // the no-match slot, so all gathers stay inside `pr`.
            let best = unsafe {
                resolve_pri8(pr.as_ptr(), matches, chunk * HALF, out.len(), nb_pkt, nb_trie)
            };
            out.copy_from_slice(&best[..out.len()]);
        }
    }
}

impl Stepper<16> for Avx2 {
    #[inline]
    fn transition4(
        self,
        trans: &[Transition],
        input: [u32; 16],
        lo: &mut [u32; 16],
        hi: &mut [u32; 16],
    ) {
        // SAFETY: AVX2 is proven by `self`; the table has been validated so
        // every address the kernel computes is inside `trans`.
        unsafe {
            transition4x8(trans, &input[..HALF], &mut lo[..HALF], &mut hi[..HALF]);
            transition4x8(trans, &input[HALF..], &mut lo[HALF..], &mut hi[HALF..]);
        }
    }
}

/// Loads eight lanes, steps them four times and stores them back.
#[target_feature(enable = "avx2")]
unsafe fn transition4x8(trans: &[Transition], input: &[u32], lo: &mut [u32], hi: &mut [u32]) {
    debug_assert!(input.len() == HALF && lo.len() == HALF && hi.len() == HALF);
    unsafe {
        let tr = trans.as_ptr() as *const i32;
        let mut next = _mm256_loadu_si256(input.as_ptr() as *const __m256i);
        let mut tr_lo = _mm256_loadu_si256(lo.as_ptr() as *const __m256i);
        let mut tr_hi = _mm256_loadu_si256(hi.as_ptr() as *const __m256i);

        for _ in 0..4 {
            next = transition8(tr, next, &mut tr_lo, &mut tr_hi);
        }

        _mm256_storeu_si256(lo.as_mut_ptr() as *mut __m256i, tr_lo);
        _mm256_storeu_si256(hi.as_mut_ptr() as *mut __m256i, tr_hi);
    }
}

/// Next transition address for eight lanes.
///
/// DFA nodes: the top two input bits pick one of the four group offset bytes
/// of `tr_hi` (a byte shuffle), and the offset is `input - group_offset`.
/// Range nodes: a signed byte compare of the biased input against the four
/// boundaries, then a horizontal byte sum of the compare mask per lane.
#[target_feature(enable = "avx2")]
unsafe fn calc_addr8(next_input: __m256i, tr_lo: __m256i, tr_hi: __m256i) -> __m256i {
    unsafe {
        let index_mask = _mm256_set1_epi32(NODE_INDEX as i32);
        let shuffle_input = _mm256_setr_epi32(
            0x0000_0000,
            0x0404_0404,
            0x0808_0808,
            0x0c0c_0c0c,
            0x0000_0000,
            0x0404_0404,
            0x0808_0808,
            0x0c0c_0c0c,
        );
        let range_base = _mm256_setr_epi32(
            0xffff_ff00_u32 as i32,
            0xffff_ff04_u32 as i32,
            0xffff_ff08_u32 as i32,
            0xffff_ff0c_u32 as i32,
            0xffff_ff00_u32 as i32,
            0xffff_ff04_u32 as i32,
            0xffff_ff08_u32 as i32,
            0xffff_ff0c_u32 as i32,
        );
        let zero = _mm256_setzero_si256();

        // Broadcast each lane's low input byte into all four of its bytes.
        let input = _mm256_shuffle_epi8(next_input, shuffle_input);

        let node_type = _mm256_andnot_si256(index_mask, tr_lo);
        let addr = _mm256_and_si256(index_mask, tr_lo);
        let dfa_msk = _mm256_cmpeq_epi32(node_type, zero);

        // DFA
        let r = _mm256_srli_epi32::<30>(input);
        let r = _mm256_add_epi8(r, range_base);
        let t = _mm256_srli_epi32::<24>(input);
        let r = _mm256_shuffle_epi8(tr_hi, r);
        let dfa_ofs = _mm256_sub_epi32(t, r);

        // RANGE
        let biased = _mm256_xor_si256(input, _mm256_set1_epi8(RANGE_BIAS as i8));
        let gt = _mm256_cmpgt_epi8(biased, tr_hi);
        let ones = _mm256_and_si256(gt, _mm256_set1_epi32(0x0101_0101));
        let sum = _mm256_mullo_epi32(ones, _mm256_set1_epi32(0x0101_0101));
        let quad_ofs = _mm256_srli_epi32::<24>(sum);

        let ofs = _mm256_blendv_epi8(quad_ofs, dfa_ofs, dfa_msk);
        _mm256_add_epi32(addr, ofs)
    }
}

/// One transition for eight lanes. Lanes holding a MATCH keep it.
#[target_feature(enable = "avx2")]
unsafe fn transition8(
    tr: *const i32,
    next_input: __m256i,
    tr_lo: &mut __m256i,
    tr_hi: &mut __m256i,
) -> __m256i {
    unsafe {
        let match_mask = _mm256_set1_epi32(NODE_MATCH as i32);
        let keep = _mm256_cmpeq_epi32(_mm256_and_si256(*tr_lo, match_mask), match_mask);

        let addr = calc_addr8(next_input, *tr_lo, *tr_hi);
        // Matched lanes read the idle record instead of chasing their index.
        let addr = _mm256_andnot_si256(keep, addr);

        let lo = _mm256_i32gather_epi32::<8>(tr, addr);
        let hi = _mm256_i32gather_epi32::<8>(tr.add(1), addr);
        *tr_lo = _mm256_blendv_epi8(lo, *tr_lo, keep);
        *tr_hi = _mm256_blendv_epi8(hi, *tr_hi, keep);

        _mm256_srli_epi32::<8>(next_input)
    }
}

/// Resolves `n <= 8` keys starting at key `first` across all tries.
#[target_feature(enable = "avx2")]
unsafe fn resolve_pri8(
    pr: *const MatchResults,
    matches: &[u32],
    first: usize,
    n: usize,
    nb_pkt: usize,
    nb_trie: usize,
) -> [u32; HALF] {
    unsafe {
        let pri = pr as *const i32;
        let res = pri.add(MAX_CATEGORIES);

        let mut cp = _mm256_setzero_si256();
        let mut cr = _mm256_setzero_si256();

        for t in 0..nb_trie {
            let mut row = [0i32; HALF];
            for (i, slot) in row.iter_mut().enumerate().take(n) {
                *slot = matches[t * nb_pkt + first + i] as i32;
            }
            let mch = _mm256_loadu_si256(row.as_ptr() as *const __m256i);
            let mch = _mm256_slli_epi32::<{ MATCH_LOG as i32 }>(mch);
            let np = _mm256_i32gather_epi32::<4>(pri, mch);
            let nr = _mm256_i32gather_epi32::<4>(res, mch);
            if t == 0 {
                cp = np;
                cr = nr;
            } else {
                let m = _mm256_cmpgt_epi32(np, cp);
                cr = _mm256_blendv_epi8(cr, nr, m);
                cp = _mm256_blendv_epi8(cp, np, m);
            }
        }

        let mut best = [0u32; HALF];
        _mm256_storeu_si256(best.as_mut_ptr() as *mut __m256i, cr);
        best
    }
}
