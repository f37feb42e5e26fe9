//! Transition table assembly and validation.
//!
//! [`TableBuilder`] only encodes nodes; deciding which nodes a rule set needs
//! is the job of a rule compiler sitting on top of it. Children must be
//! encoded before their parent, so a trie is emitted bottom-up.
//!
//! Table layout:
//! ```text
//! [0]        idle self-loop
//! [1..]      node storage, in the order nodes were added
//! ```
//! Match slot 0 is always the no-match sentinel.

use crate::error::{AclError, Result};
use crate::node::{
    MatchResults, NodeType, Transition, DFA_GROUPS, DFA_GROUP_SIZE, DFA_SIZE, IDLE_ADDR,
    MAX_INDEX, NO_MATCH_INDEX, RANGE_BOUNDS,
};

/// Encoder for transition tables.
#[derive(Clone, Debug)]
pub struct TableBuilder {
    transitions: Vec<Transition>,
    matches: Vec<MatchResults>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self {
            transitions: vec![Transition::IDLE],
            matches: vec![MatchResults::NO_MATCH],
        }
    }

    /// Records emitted so far, including the idle slot.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Registers a match node and returns the transition leading into it.
    pub fn add_match(&mut self, results: MatchResults) -> Result<Transition> {
        let index = self.matches.len();
        if index > MAX_INDEX as usize {
            return Err(AclError::TableFull);
        }
        self.matches.push(results);
        Ok(Transition::matched(index as u32))
    }

    /// Emits a range node.
    ///
    /// `bounds` must be strictly ascending with at most four entries;
    /// `children[i]` covers inputs in `(bounds[i-1], bounds[i]]` and the last
    /// child covers everything above the last bound.
    pub fn add_range(&mut self, bounds: &[u8], children: &[Transition]) -> Result<Transition> {
        if bounds.len() > RANGE_BOUNDS || children.len() != bounds.len() + 1 {
            return Err(AclError::RangeArity {
                bounds: bounds.len(),
                children: children.len(),
            });
        }
        if bounds.windows(2).any(|w| w[0] >= w[1]) || bounds.last() == Some(&u8::MAX) {
            return Err(AclError::UnsortedBounds);
        }

        let address = self.reserve(children.len())?;
        let at = address as usize;
        self.transitions[at..at + children.len()].copy_from_slice(children);
        Ok(Transition::range(address, bounds))
    }

    /// Emits a DFA node, storing each distinct 64-input group once.
    pub fn add_dfa(&mut self, children: &[Transition; DFA_SIZE]) -> Result<Transition> {
        let groups: Vec<&[Transition]> = children.chunks_exact(DFA_GROUP_SIZE).collect();

        // Storage slot for each group, deduplicated against earlier groups.
        let mut storage = [0usize; DFA_GROUPS];
        let mut stored = 0usize;
        for g in 0..DFA_GROUPS {
            match (0..g).find(|&prev| groups[prev] == groups[g]) {
                Some(prev) => storage[g] = storage[prev],
                None => {
                    storage[g] = stored;
                    stored += 1;
                }
            }
        }

        let address = self.reserve(stored * DFA_GROUP_SIZE)?;
        let mut offsets = [0u8; DFA_GROUPS];
        for g in 0..DFA_GROUPS {
            let start = storage[g] * DFA_GROUP_SIZE;
            // start <= g * 64 since groups are only ever shared backwards.
            offsets[g] = (g * DFA_GROUP_SIZE - start) as u8;
            let at = address as usize + start;
            self.transitions[at..at + DFA_GROUP_SIZE].copy_from_slice(groups[g]);
        }
        Ok(Transition::dfa(address, offsets))
    }

    /// Emits an uncompressed root node and returns its index.
    pub fn add_root(&mut self, children: &[Transition; DFA_SIZE]) -> Result<u32> {
        let address = self.reserve(DFA_SIZE)?;
        let at = address as usize;
        self.transitions[at..at + DFA_SIZE].copy_from_slice(children);
        Ok(address)
    }

    pub fn build(self) -> (Vec<Transition>, Vec<MatchResults>) {
        (self.transitions, self.matches)
    }

    fn reserve(&mut self, n: usize) -> Result<u32> {
        let address = self.transitions.len();
        if address + n > MAX_INDEX as usize {
            return Err(AclError::TableFull);
        }
        self.transitions.resize(address + n, Transition::IDLE);
        Ok(address as u32)
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks every record so that no reachable address leaves the tables.
///
/// The vector steppers gather without bounds checks; this is what makes that
/// sound.
pub(crate) fn validate(transitions: &[Transition], matches: &[MatchResults]) -> Result<()> {
    let len = transitions.len();
    if len > MAX_INDEX as usize + 1 {
        return Err(AclError::TableFull);
    }
    if transitions.get(IDLE_ADDR as usize) != Some(&Transition::IDLE) {
        return Err(AclError::MissingIdle);
    }
    if matches.get(NO_MATCH_INDEX as usize) != Some(&MatchResults::NO_MATCH) {
        return Err(AclError::MissingNoMatch);
    }

    for (index, &t) in transitions.iter().enumerate() {
        let address = t.address() as usize;
        let last = match t.node_type() {
            None => return Err(AclError::ReservedNodeType { index }),
            Some(NodeType::Match) => {
                if address >= matches.len() {
                    return Err(AclError::MatchOutOfBounds {
                        index,
                        match_index: t.address(),
                        len: matches.len(),
                    });
                }
                continue;
            }
            // Unused boundaries (0xff) never count towards the offset.
            Some(NodeType::Range) | Some(NodeType::Idle) => {
                address + t.range_bounds().iter().filter(|&&b| b != u8::MAX).count()
            }
            Some(NodeType::Dfa) => {
                let mut max_ofs = 0usize;
                for g in 0..DFA_GROUPS {
                    let ofs = t.group_offset(g) as usize;
                    if ofs > g * DFA_GROUP_SIZE {
                        return Err(AclError::BadGroupOffset { index, group: g });
                    }
                    max_ofs = max_ofs.max((g + 1) * DFA_GROUP_SIZE - 1 - ofs);
                }
                address + max_ofs
            }
        };
        if last >= len {
            return Err(AclError::TransitionOutOfBounds {
                index,
                target: last,
                len,
            });
        }
    }
    Ok(())
}

/// Roots are consumed by the first transition as `root + byte`.
pub(crate) fn validate_root(trie: usize, root: u32, len: usize) -> Result<()> {
    if root as usize + DFA_SIZE > len {
        return Err(AclError::RootOutOfBounds { trie, root, len });
    }
    Ok(())
}
