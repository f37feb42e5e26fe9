//! Transition record encoding.
//!
//! A trie is stored as a flat array of 64-bit transitions. The transition
//! that leads *into* a node describes that node:
//!
//! ```text
//!  63            32 31 30 29                     0
//! [      hi        |type |        address        ]
//! ```
//!
//! - `type = 0b00` (DFA): `hi` holds four group offsets, one per 64-byte
//!   slice of the input alphabet. The child for byte `b` is stored at
//!   `address + b - hi.byte[b >> 6]`.
//! - `type = 0b01` (RANGE): `hi` holds four ascending boundaries. The child
//!   for byte `b` is stored at `address + |{bound < b}|`.
//! - `type = 0b10` (MATCH): `address` is a match index into the
//!   [`MatchResults`] table. Match nodes have no children.
//!
//! Range boundaries are kept as `bound ^ 0x80` so that a signed byte compare
//! (the only kind most vector ISAs have) orders them like unsigned bytes.

use std::fmt;

// =============================================================================
// Layout constants
// =============================================================================

pub(crate) const TYPE_SHIFT: u32 = 30;

pub(crate) const NODE_DFA: u32 = 0;
pub(crate) const NODE_RANGE: u32 = 1 << TYPE_SHIFT;
pub(crate) const NODE_MATCH: u32 = 2 << TYPE_SHIFT;
pub(crate) const NODE_TYPE: u32 = 3 << TYPE_SHIFT;
pub(crate) const NODE_INDEX: u32 = !NODE_TYPE;

/// Largest addressable record or match index.
pub const MAX_INDEX: u32 = NODE_INDEX;

/// Children per DFA node.
pub(crate) const DFA_SIZE: usize = 256;
/// Inputs covered by one DFA group.
pub(crate) const DFA_GROUP_SIZE: usize = 64;
pub(crate) const DFA_GROUPS: usize = DFA_SIZE / DFA_GROUP_SIZE;

/// Boundaries per range node.
pub(crate) const RANGE_BOUNDS: usize = 4;

/// Sign flip applied to range boundaries and input bytes.
pub(crate) const RANGE_BIAS: u8 = 0x80;

/// High half of a range node with every boundary unused.
pub(crate) const RANGE_UNUSED: u32 = 0x7f7f_7f7f;

/// Address of the idle self-loop. Record 0 of every table holds it.
pub(crate) const IDLE_ADDR: u32 = 0;
pub(crate) const IDLE_LO: u32 = NODE_RANGE | IDLE_ADDR;
pub(crate) const IDLE_HI: u32 = RANGE_UNUSED;

/// Match index of the no-match slot.
pub(crate) const NO_MATCH_INDEX: u32 = 0;

/// Maximum number of result categories per classify call.
pub const MAX_CATEGORIES: usize = 32;

/// `size_of::<MatchResults>() == 1 << (MATCH_LOG + 2)`.
pub(crate) const MATCH_LOG: u32 = 6;

const _: () = assert!(std::mem::size_of::<MatchResults>() == 1 << (MATCH_LOG + 2));
const _: () = assert!(std::mem::size_of::<Transition>() == 8);

// =============================================================================
// Transition
// =============================================================================

/// Kind of node a transition leads into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    Dfa,
    Range,
    Match,
    /// Terminal no-op used to park vacated lanes.
    Idle,
}

/// One 64-bit transition record.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct Transition(u64);

impl Transition {
    /// The idle self-loop.
    pub const IDLE: Transition = Transition::from_parts(IDLE_LO, IDLE_HI);

    /// Leads to match slot 0, the "no rule applies" result.
    pub const NO_MATCH: Transition = Transition::from_parts(NODE_MATCH | NO_MATCH_INDEX, 0);

    #[inline]
    pub const fn from_parts(lo: u32, hi: u32) -> Self {
        Self((lo as u64) | ((hi as u64) << 32))
    }

    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn lo(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    pub const fn hi(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Type tag bits, still in place.
    #[inline]
    pub(crate) const fn type_bits(self) -> u32 {
        self.lo() & NODE_TYPE
    }

    #[inline]
    pub const fn address(self) -> u32 {
        self.lo() & NODE_INDEX
    }

    #[inline]
    pub const fn is_match(self) -> bool {
        self.lo() & NODE_MATCH != 0
    }

    /// Match index of a MATCH transition.
    #[inline]
    pub fn match_index(self) -> u32 {
        debug_assert!(self.is_match());
        self.address()
    }

    /// `None` for the reserved tag.
    pub fn node_type(self) -> Option<NodeType> {
        match self.type_bits() {
            NODE_DFA => Some(NodeType::Dfa),
            NODE_RANGE if self == Self::IDLE => Some(NodeType::Idle),
            NODE_RANGE => Some(NodeType::Range),
            NODE_MATCH => Some(NodeType::Match),
            _ => None,
        }
    }

    pub(crate) fn dfa(address: u32, group_offsets: [u8; DFA_GROUPS]) -> Self {
        debug_assert!(address <= MAX_INDEX);
        Self::from_parts(NODE_DFA | address, u32::from_le_bytes(group_offsets))
    }

    /// `bounds` must be ascending; at most [`RANGE_BOUNDS`] of them.
    pub(crate) fn range(address: u32, bounds: &[u8]) -> Self {
        debug_assert!(address <= MAX_INDEX);
        debug_assert!(bounds.len() <= RANGE_BOUNDS);
        let mut hi = [u8::MAX ^ RANGE_BIAS; RANGE_BOUNDS];
        for (slot, &bound) in hi.iter_mut().zip(bounds) {
            *slot = bound ^ RANGE_BIAS;
        }
        Self::from_parts(NODE_RANGE | address, u32::from_le_bytes(hi))
    }

    pub(crate) fn matched(index: u32) -> Self {
        debug_assert!(index <= MAX_INDEX);
        Self::from_parts(NODE_MATCH | index, 0)
    }

    /// DFA group offset for inputs in group `g`.
    #[inline]
    pub(crate) fn group_offset(self, g: usize) -> u32 {
        (self.hi() >> (8 * g)) & 0xff
    }

    /// Range boundaries with the sign flip undone.
    pub fn range_bounds(self) -> [u8; RANGE_BOUNDS] {
        self.hi().to_le_bytes().map(|b| b ^ RANGE_BIAS)
    }

    /// Address of the child selected by `byte`.
    ///
    /// Plain per-record version of the stepping arithmetic; the batched
    /// steppers compute the same thing branch-free across lanes.
    #[inline]
    pub fn next_address(self, byte: u8) -> u32 {
        let b = u32::from(byte);
        let ofs = if self.type_bits() == NODE_DFA {
            b - self.group_offset(b as usize / DFA_GROUP_SIZE)
        } else {
            self.range_bounds().iter().filter(|&&bound| bound < byte).count() as u32
        };
        self.address() + ofs
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node_type() {
            Some(NodeType::Dfa) => write!(f, "Dfa({}, {:08x})", self.address(), self.hi()),
            Some(NodeType::Range) => {
                write!(f, "Range({}, {:?})", self.address(), self.range_bounds())
            }
            Some(NodeType::Match) => write!(f, "Match({})", self.address()),
            Some(NodeType::Idle) => f.write_str("Idle"),
            None => write!(f, "Reserved({:016x})", self.0),
        }
    }
}

// =============================================================================
// Match results
// =============================================================================

/// Per-category priority and result of one match node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct MatchResults {
    pub priority: [i32; MAX_CATEGORIES],
    pub results: [u32; MAX_CATEGORIES],
}

impl MatchResults {
    /// Priority carried by the no-match slot; no rule can lose to it.
    pub const NO_MATCH_PRIORITY: i32 = i32::MIN;

    /// Result reported for a key no rule applies to.
    pub const NO_MATCH_RESULT: u32 = 0;

    /// Every category unmatched.
    pub const NO_MATCH: MatchResults = MatchResults {
        priority: [Self::NO_MATCH_PRIORITY; MAX_CATEGORIES],
        results: [Self::NO_MATCH_RESULT; MAX_CATEGORIES],
    };

    /// Same priority and result in every category.
    pub fn uniform(priority: i32, result: u32) -> Self {
        Self {
            priority: [priority; MAX_CATEGORIES],
            results: [result; MAX_CATEGORIES],
        }
    }

    /// Sets one category, leaving the others untouched.
    ///
    /// Panics if `category >= MAX_CATEGORIES`.
    pub fn with(mut self, category: usize, priority: i32, result: u32) -> Self {
        self.priority[category] = priority;
        self.results[category] = result;
        self
    }
}

impl Default for MatchResults {
    fn default() -> Self {
        Self::NO_MATCH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_resolves_to_itself() {
        for b in 0..=255u8 {
            assert_eq!(Transition::IDLE.next_address(b), IDLE_ADDR);
        }
        assert_eq!(Transition::IDLE.node_type(), Some(NodeType::Idle));
    }

    #[test]
    fn test_range_counts_smaller_bounds() {
        let t = Transition::range(100, &[0x10, 0x7f, 0x80, 0xf0]);
        assert_eq!(t.range_bounds(), [0x10, 0x7f, 0x80, 0xf0]);
        assert_eq!(t.next_address(0x00), 100);
        assert_eq!(t.next_address(0x10), 100);
        assert_eq!(t.next_address(0x11), 101);
        assert_eq!(t.next_address(0x80), 102);
        assert_eq!(t.next_address(0x81), 103);
        assert_eq!(t.next_address(0xff), 104);
    }

    #[test]
    fn test_range_unused_bounds_never_count() {
        let t = Transition::range(7, &[0x7f]);
        assert_eq!(t.next_address(0x7f), 7);
        assert_eq!(t.next_address(0x80), 8);
        assert_eq!(t.next_address(0xff), 8);
    }

    #[test]
    fn test_dfa_group_offsets() {
        // Groups 0 and 2 share storage; group 1 and 3 are stored after it.
        let t = Transition::dfa(1000, [0, 0, 128, 64]);
        assert_eq!(t.next_address(5), 1005);
        assert_eq!(t.next_address(64 + 5), 1000 + 64 + 5);
        assert_eq!(t.next_address(128 + 5), 1005);
        assert_eq!(t.next_address(192 + 5), 1000 + 128 + 5);
    }

    #[test]
    fn test_match_index() {
        let t = Transition::matched(42);
        assert!(t.is_match());
        assert_eq!(t.match_index(), 42);
        assert_eq!(t.node_type(), Some(NodeType::Match));
        assert!(!Transition::IDLE.is_match());
        assert_eq!(Transition::NO_MATCH.match_index(), NO_MATCH_INDEX);
    }

    #[test]
    fn test_reserved_type() {
        let t = Transition::from_parts(NODE_TYPE | 3, 0);
        assert_eq!(t.node_type(), None);
    }
}
