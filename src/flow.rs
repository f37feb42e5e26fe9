//! Lane management for the batched search.
//!
//! A search runs two batches of `W` lanes side by side. Every lane walks one
//! key at a time; when a lane reaches a MATCH its match index is written to
//! the key's slot, the lane is parked on the idle node and immediately handed
//! the next unstarted key. A trie is done once no lane is active and every key
//! has been started.

use crate::context::TrieDesc;
use crate::node::{Transition, IDLE_HI, IDLE_LO, NODE_INDEX, NODE_MATCH};
use crate::step::{load, LoadWidth, Stepper};

/// Bit mask with the low `w` lanes set.
#[inline]
const fn lane_mask(w: usize) -> u32 {
    if w >= 32 {
        u32::MAX
    } else {
        (1u32 << w) - 1
    }
}

/// Iterates set lanes of `mask` in ascending order.
#[inline]
fn lanes_of(mut mask: u32) -> impl Iterator<Item = usize> {
    std::iter::from_fn(move || {
        if mask == 0 {
            return None;
        }
        let lane = mask.trailing_zeros() as usize;
        mask &= mask - 1;
        Some(lane)
    })
}

#[inline]
fn pdep_u32_fallback(mut value: u32, mut mask: u32) -> u32 {
    let mut out = 0u32;
    while mask != 0 {
        let lsb = mask & mask.wrapping_neg();
        if value & 1 != 0 {
            out |= lsb;
        }
        value >>= 1;
        mask ^= lsb;
    }
    out
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "bmi2")]
unsafe fn pdep_u32_bmi2(value: u32, mask: u32) -> u32 {
    // SAFETY: Caller guarantees BMI2.
    unsafe { core::arch::x86_64::_pdep_u32(value, mask) }
}

/// Deposits the low bits of `value` into the set bits of `mask`.
#[inline]
fn pdep_u32(value: u32, mask: u32) -> u32 {
    #[cfg(target_arch = "x86_64")]
    {
        if std::is_x86_feature_detected!("bmi2") {
            // SAFETY: feature detected at runtime.
            return unsafe { pdep_u32_bmi2(value, mask) };
        }
    }
    pdep_u32_fallback(value, mask)
}

/// One batch of `W` lanes.
pub(crate) struct Lanes<'a, const W: usize> {
    /// Key bytes per lane; idle lanes point at an empty slice.
    data: [&'a [u8]; W],
    /// Key position, which is also the lane's match slot.
    slot: [u32; W],
    /// Next load per lane, an index into the trie's data index.
    di: [u32; W],
    lo: [u32; W],
    hi: [u32; W],
    /// Lanes with a walk in progress.
    active: u32,
}

impl<'a, const W: usize> Lanes<'a, W> {
    const WIDTH_OK: () = assert!(W >= 1 && W <= 32, "lane masks are 32 bits wide");

    fn new() -> Self {
        let () = Self::WIDTH_OK;
        Self {
            data: [&[]; W],
            slot: [0; W],
            di: [0; W],
            lo: [IDLE_LO; W],
            hi: [IDLE_HI; W],
            active: 0,
        }
    }

    /// Lanes currently holding a MATCH.
    #[inline]
    fn match_mask(&self) -> u32 {
        let mut mask = 0u32;
        for i in 0..W {
            mask |= u32::from(self.lo[i] & NODE_MATCH != 0) << i;
        }
        mask
    }
}

/// Walk state for one trie over one batch of keys.
pub(crate) struct FlowContext<'a> {
    trans: &'a [Transition],
    root_index: u32,
    data_index: &'a [u32],
    first_load: LoadWidth,
    keys: &'a [&'a [u8]],
    /// Next key to start.
    started: usize,
    /// Match index per key, indexed by key position.
    matches: &'a mut [u32],
}

impl<'a> FlowContext<'a> {
    pub(crate) fn new(
        trans: &'a [Transition],
        trie: &'a TrieDesc,
        keys: &'a [&'a [u8]],
        matches: &'a mut [u32],
    ) -> Self {
        debug_assert_eq!(keys.len(), matches.len());
        Self {
            trans,
            root_index: trie.root_index,
            data_index: &trie.data_index,
            first_load: trie.first_load,
            keys,
            started: 0,
            matches,
        }
    }

    #[inline]
    fn remaining(&self) -> usize {
        self.keys.len() - self.started
    }

    /// Hands the next keys, in input order, to the lanes in `mask`.
    fn start_flows<const W: usize>(&mut self, lanes: &mut Lanes<'a, W>, mask: u32) {
        debug_assert!(mask.count_ones() as usize <= self.remaining());
        for lane in lanes_of(mask) {
            lanes.data[lane] = self.keys[self.started];
            lanes.slot[lane] = self.started as u32;
            lanes.di[lane] = 0;
            self.started += 1;
        }
    }

    /// Loads the next input for the lanes in `mask`; other lanes read zero.
    fn next_bytes<const W: usize>(
        &self,
        lanes: &mut Lanes<'a, W>,
        mask: u32,
        width: LoadWidth,
    ) -> [u32; W] {
        let mut input = [0u32; W];
        for lane in lanes_of(mask) {
            input[lane] = load(lanes.data[lane], self.data_index, lanes.di[lane], width);
            lanes.di[lane] += 1;
        }
        input
    }

    /// Root transition for freshly started lanes.
    fn first_transition<const W: usize>(&self, lanes: &mut Lanes<'a, W>, input: [u32; W], mask: u32) {
        for lane in lanes_of(mask) {
            let t = self.trans[(self.root_index + (input[lane] & 0xff)) as usize];
            lanes.lo[lane] = t.lo();
            lanes.hi[lane] = t.hi();
        }
    }

    /// Shrinks `rmsk` to the lanes that can be refilled and drops the rest
    /// from the active set. Returns how many lanes get a new key.
    fn update_flow_mask<const W: usize>(&self, lanes: &mut Lanes<'a, W>, rmsk: &mut u32) -> u32 {
        let n = rmsk.count_ones().min(self.remaining() as u32);
        let refill = pdep_u32(lane_mask(n as usize), *rmsk);
        lanes.active ^= *rmsk ^ refill;
        *rmsk = refill;
        n
    }

    /// Records matches for the lanes in `rmsk` and starts new keys in them.
    ///
    /// On return `rmsk` holds the lanes that received a new key.
    fn match_process<const W: usize>(&mut self, lanes: &mut Lanes<'a, W>, rmsk: &mut u32) -> u32 {
        if *rmsk == 0 {
            return 0;
        }

        for lane in lanes_of(*rmsk) {
            self.matches[lanes.slot[lane] as usize] = lanes.lo[lane] & NODE_INDEX;
            lanes.lo[lane] = IDLE_LO;
            lanes.hi[lane] = IDLE_HI;
            lanes.data[lane] = &[];
        }

        let n = self.update_flow_mask(lanes, rmsk);
        self.start_flows(lanes, *rmsk);
        n
    }

    /// Processes matches in both batches until every active lane is mid-walk.
    fn match_check_process<const W: usize>(&mut self, lanes: &mut [Lanes<'a, W>; 2]) {
        let mut rm = [lanes[0].match_mask(), lanes[1].match_mask()];

        while (rm[0] | rm[1]) != 0 {
            for b in 0..2 {
                let n = self.match_process(&mut lanes[b], &mut rm[b]);
                if n != 0 {
                    let input = self.next_bytes(&mut lanes[b], rm[b], self.first_load);
                    self.first_transition(&mut lanes[b], input, rm[b]);
                    rm[b] = lanes[b].match_mask();
                }
            }
        }
    }

    /// Walks every key through the trie, leaving one match index per key.
    pub(crate) fn search<const W: usize, S: Stepper<W>>(mut self, stepper: S) {
        let mut lanes = [Lanes::<W>::new(), Lanes::<W>::new()];

        for batch in lanes.iter_mut() {
            let n = self.remaining().min(W);
            let mask = lane_mask(n);
            self.start_flows(batch, mask);
            let input = self.next_bytes(batch, mask, self.first_load);
            self.first_transition(batch, input, mask);
            batch.active = mask;
        }

        self.match_check_process(&mut lanes);

        while (lanes[0].active | lanes[1].active) != 0 {
            for batch in lanes.iter_mut() {
                let active = batch.active;
                let input = self.next_bytes(batch, active, LoadWidth::Four);
                stepper.transition4(self.trans, input, &mut batch.lo, &mut batch.hi);
            }
            self.match_check_process(&mut lanes);
        }

        debug_assert_eq!(self.remaining(), 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_mask() {
        assert_eq!(lane_mask(0), 0);
        assert_eq!(lane_mask(1), 1);
        assert_eq!(lane_mask(16), 0xffff);
        assert_eq!(lane_mask(32), u32::MAX);
    }

    #[test]
    fn test_lanes_of() {
        assert_eq!(lanes_of(0).count(), 0);
        assert_eq!(lanes_of(0b1010_0110).collect::<Vec<_>>(), vec![1, 2, 5, 7]);
        assert_eq!(lanes_of(1 << 31).collect::<Vec<_>>(), vec![31]);
    }

    #[test]
    fn test_pdep_picks_lowest_lanes() {
        for (value, mask, expected) in [
            (0b0, 0b1011, 0b0),
            (0b1, 0b1010, 0b10),
            (0b11, 0b1010_0100, 0b0010_0100),
            (0b111, 0b1011, 0b1011),
            (0b1111, 0b1011, 0b1011),
        ] {
            assert_eq!(pdep_u32_fallback(value, mask), expected);
            assert_eq!(pdep_u32(value, mask), expected);
        }
    }
}
