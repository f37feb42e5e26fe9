//! Sequential reference walk: one key, one trie, one byte at a time.

use crate::context::TrieDesc;
use crate::node::Transition;
use crate::step::{load, LoadWidth};

/// Match index reached by `key` in `trie`.
///
/// Loops forever on a trie with a cycle; tries are trusted to end every path
/// in a MATCH.
pub(crate) fn walk(trans: &[Transition], trie: &TrieDesc, key: &[u8]) -> u32 {
    let mut di = 0u32;
    let first = load(key, &trie.data_index, di, trie.first_load);
    di += 1;

    let mut t = trans[(trie.root_index + (first & 0xff)) as usize];
    while !t.is_match() {
        let mut input = load(key, &trie.data_index, di, LoadWidth::Four);
        di += 1;
        for _ in 0..4 {
            t = trans[t.next_address(input as u8) as usize];
            if t.is_match() {
                break;
            }
            input >>= 8;
        }
    }
    t.match_index()
}

/// Fills `matches` (trie-major) for every key and trie.
pub(crate) fn search(trans: &[Transition], tries: &[TrieDesc], keys: &[&[u8]], matches: &mut [u32]) {
    for (trie, out) in tries.iter().zip(matches.chunks_exact_mut(keys.len())) {
        for (slot, key) in out.iter_mut().zip(keys) {
            *slot = walk(trans, trie, key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{MatchResults, DFA_SIZE};
    use crate::table::TableBuilder;

    #[test]
    fn test_walk_depths() {
        let mut b = TableBuilder::new();
        let shallow = b.add_match(MatchResults::uniform(1, 1)).unwrap();
        let deep = b.add_match(MatchResults::uniform(2, 2)).unwrap();
        let other = b.add_match(MatchResults::uniform(3, 3)).unwrap();

        // byte0 == 1 -> shallow; byte0 == 2 -> byte1..=byte5 must be 0xaa.
        let mut node = deep;
        for _ in 0..5 {
            node = b.add_range(&[0xa9, 0xaa], &[other, node, other]).unwrap();
        }
        let mut root = [Transition::NO_MATCH; DFA_SIZE];
        root[1] = shallow;
        root[2] = node;
        let root = b.add_root(&root).unwrap();
        let (trans, _) = b.build();
        let trie = TrieDesc::sequential(root, 6);

        assert_eq!(walk(&trans, &trie, &[1]), 1);
        assert_eq!(walk(&trans, &trie, &[2, 0xaa, 0xaa, 0xaa, 0xaa, 0xaa]), 2);
        assert_eq!(walk(&trans, &trie, &[2, 0xaa, 0xaa, 0xab, 0xaa, 0xaa]), 3);
        // Missing bytes read as zero.
        assert_eq!(walk(&trans, &trie, &[2, 0xaa]), 3);
        assert_eq!(walk(&trans, &trie, &[0]), 0);
        assert_eq!(walk(&trans, &trie, &[]), 0);
    }

    #[test]
    fn test_walk_follows_data_index() {
        let mut b = TableBuilder::new();
        let hit = b.add_match(MatchResults::uniform(1, 1)).unwrap();
        let miss = Transition::NO_MATCH;
        let inner = b.add_range(&[0x41, 0x42], &[miss, hit, miss]).unwrap();
        let mut root = [Transition::NO_MATCH; DFA_SIZE];
        root[0x10] = inner;
        let root = b.add_root(&root).unwrap();
        let (trans, _) = b.build();

        // First byte from offset 3 (a four byte load), second from offset 1.
        let trie = TrieDesc::new(root, vec![3, 1], LoadWidth::Four);
        assert_eq!(walk(&trans, &trie, &[0, 0x42, 0, 0x10, 0xff]), 1);
        assert_eq!(walk(&trans, &trie, &[0, 0x43, 0, 0x10]), 0);
        assert_eq!(walk(&trans, &trie, &[0, 0x42, 0, 0x11]), 0);
    }
}
