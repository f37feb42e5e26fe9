//! Byte fetch and the portable transition stepper.

use crate::node::{Transition, NODE_DFA, NODE_INDEX, NODE_MATCH, NODE_TYPE, RANGE_BIAS};

/// Bytes read by one load.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoadWidth {
    #[default]
    One = 1,
    Four = 4,
}

/// Reads the `di`-th load of `key`, little-endian packed into a `u32`.
///
/// Bytes past the end of the key, and loads past the end of `data_index`,
/// read as zero.
#[inline]
pub(crate) fn load(key: &[u8], data_index: &[u32], di: u32, width: LoadWidth) -> u32 {
    let Some(&off) = data_index.get(di as usize) else {
        return 0;
    };
    let off = off as usize;
    match width {
        LoadWidth::One => key.get(off).copied().map_or(0, u32::from),
        LoadWidth::Four => match key.get(off..off + 4) {
            Some(b) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            None => {
                let tail = key.get(off..).unwrap_or(&[]);
                let mut buf = [0u8; 4];
                buf[..tail.len()].copy_from_slice(tail);
                u32::from_le_bytes(buf)
            }
        },
    }
}

/// Advances a batch of `W` lanes through the transition table.
///
/// Implementations must leave lanes that already hold a MATCH untouched, so
/// the first match a key reaches is the one reported.
pub(crate) trait Stepper<const W: usize>: Copy {
    /// Four transitions per lane, consuming `input` from the low byte up.
    fn transition4(
        self,
        trans: &[Transition],
        input: [u32; W],
        lo: &mut [u32; W],
        hi: &mut [u32; W],
    );
}

/// Lane-by-lane stepper without ISA-specific code. At `W = 1` it degenerates
/// to a plain scalar walk.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Portable;

impl<const W: usize> Stepper<W> for Portable {
    #[inline]
    fn transition4(
        self,
        trans: &[Transition],
        mut input: [u32; W],
        lo: &mut [u32; W],
        hi: &mut [u32; W],
    ) {
        for _ in 0..4 {
            let mut addr = [0u32; W];
            let mut keep = [0u32; W];
            for i in 0..W {
                keep[i] = 0u32.wrapping_sub(u32::from(lo[i] & NODE_MATCH != 0));
                addr[i] = calc_addr(input[i], lo[i], hi[i]) & !keep[i];
                input[i] >>= 8;
            }
            for i in 0..W {
                let t = trans[addr[i] as usize];
                lo[i] = (t.lo() & !keep[i]) | (lo[i] & keep[i]);
                hi[i] = (t.hi() & !keep[i]) | (hi[i] & keep[i]);
            }
        }
    }
}

/// Next transition address for one lane, computing both the DFA and the
/// range offset and selecting by node type.
#[inline]
pub(crate) fn calc_addr(input: u32, lo: u32, hi: u32) -> u32 {
    let b = input & 0xff;

    let dfa_ofs = b.wrapping_sub((hi >> ((b >> 6) * 8)) & 0xff);

    let x = (b as u8 ^ RANGE_BIAS) as i8;
    let quad_ofs: u32 = hi
        .to_le_bytes()
        .iter()
        .map(|&bound| u32::from(x > bound as i8))
        .sum();

    let dfa = 0u32.wrapping_sub(u32::from(lo & NODE_TYPE == NODE_DFA));
    (lo & NODE_INDEX).wrapping_add((dfa_ofs & dfa) | (quad_ofs & !dfa))
}
