use super::*;

use proptest::prelude::*;
use proptest_derive::Arbitrary;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Bytes consumed below a root before every path is forced into a MATCH.
const MAX_DEPTH: usize = 10;
const MAX_KEY_LEN: usize = 16;

#[derive(Clone, Debug, Arbitrary)]
struct Shape {
    #[proptest(strategy = "1usize..=4")]
    tries: usize,
    #[proptest(strategy = "1u32..=32")]
    categories: u32,
    #[proptest(strategy = "0usize..=80")]
    keys: usize,
    seed: u64,
}

fn leaf(rng: &mut StdRng, leaves: &[Transition]) -> Transition {
    if rng.gen_ratio(1, 6) {
        Transition::NO_MATCH
    } else {
        leaves[rng.gen_range(0..leaves.len())]
    }
}

fn subtree(
    rng: &mut StdRng,
    b: &mut TableBuilder,
    leaves: &[Transition],
    depth: usize,
) -> Transition {
    if depth == 0 || rng.gen_ratio(1, 4) {
        return leaf(rng, leaves);
    }
    if rng.gen_ratio(1, 3) {
        let children = fan_out(rng, b, leaves, depth - 1);
        return b.add_dfa(&children).unwrap();
    }

    let n = rng.gen_range(0..=4);
    let mut bounds: Vec<u8> = (0..n).map(|_| rng.gen_range(0..0xff)).collect();
    bounds.sort_unstable();
    bounds.dedup();
    let parts = [
        subtree(rng, b, leaves, depth - 1),
        subtree(rng, b, leaves, depth - 1),
    ];
    let children: Vec<Transition> = (0..=bounds.len())
        .map(|_| {
            if rng.gen_ratio(1, 3) {
                leaf(rng, leaves)
            } else {
                parts[rng.gen_range(0..parts.len())]
            }
        })
        .collect();
    b.add_range(&bounds, &children).unwrap()
}

/// 256 children built from a few subtrees laid out in runs, so some groups
/// repeat.
fn fan_out(
    rng: &mut StdRng,
    b: &mut TableBuilder,
    leaves: &[Transition],
    depth: usize,
) -> [Transition; 256] {
    let parts = [
        subtree(rng, b, leaves, depth),
        subtree(rng, b, leaves, depth),
        leaf(rng, leaves),
    ];
    let mut children = [Transition::NO_MATCH; 256];
    let mut pick = parts[0];
    for (i, c) in children.iter_mut().enumerate() {
        if i == 0 || rng.gen_ratio(1, 40) {
            pick = parts[rng.gen_range(0..parts.len())];
        }
        *c = pick;
    }
    children
}

fn random_context(shape: &Shape) -> (AclContext, Vec<Vec<u8>>) {
    let mut rng = StdRng::seed_from_u64(shape.seed);
    let mut b = TableBuilder::new();

    let leaves: Vec<Transition> = (0..rng.gen_range(1..=8))
        .map(|_| {
            let mut m = MatchResults::NO_MATCH;
            for c in 0..MAX_CATEGORIES {
                m.priority[c] = rng.gen_range(-4..=4);
                m.results[c] = rng.gen();
            }
            b.add_match(m).unwrap()
        })
        .collect();

    let mut tries = Vec::new();
    for _ in 0..shape.tries {
        let children = fan_out(&mut rng, &mut b, &leaves, MAX_DEPTH - 1);
        let root = b.add_root(&children).unwrap();
        // Sometimes shorter than the walk, so late loads run off the end.
        let data_index: Vec<u32> = (0..rng.gen_range(1..=5))
            .map(|_| rng.gen_range(0..MAX_KEY_LEN as u32 + 4))
            .collect();
        let first_load = if rng.gen() {
            LoadWidth::Four
        } else {
            LoadWidth::One
        };
        tries.push(TrieDesc::new(root, data_index, first_load));
    }

    let keys: Vec<Vec<u8>> = (0..shape.keys)
        .map(|_| {
            let len = rng.gen_range(0..=MAX_KEY_LEN);
            (0..len).map(|_| rng.gen::<u8>()).collect()
        })
        .collect();

    let ctx = AclContext::from_builder("prop", b, tries).unwrap();
    (ctx, keys)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_batched_equals_scalar(shape in any::<Shape>()) {
        let (ctx, keys) = random_context(&shape);
        let refs: Vec<&[u8]> = keys.iter().map(Vec::as_slice).collect();
        let nb_cat = shape.categories as usize;
        let n = refs.len() * nb_cat;

        let mut want = vec![u32::MAX; n];
        ctx.classify_alg(&refs, &mut want, shape.categories, Algorithm::Scalar).unwrap();

        for alg in [Algorithm::Default, Algorithm::Portable, Algorithm::Avx2] {
            if !alg.is_supported() {
                continue;
            }
            let mut got = vec![u32::MAX; n];
            ctx.classify_alg(&refs, &mut got, shape.categories, alg).unwrap();
            prop_assert_eq!(&got, &want, "algorithm {}", alg);
        }

        if !refs.is_empty() {
            let mut matches = vec![0u32; ctx.tries().len() * refs.len()];
            let mut got = vec![u32::MAX; n];
            ctx.classify_lanes::<1>(&refs, &mut got, nb_cat, &mut matches);
            prop_assert_eq!(&got, &want, "one lane");
            let mut got = vec![u32::MAX; n];
            ctx.classify_lanes::<4>(&refs, &mut got, nb_cat, &mut matches);
            prop_assert_eq!(&got, &want, "four lanes");
            let mut got = vec![u32::MAX; n];
            ctx.classify_lanes::<16>(&refs, &mut got, nb_cat, &mut matches);
            prop_assert_eq!(&got, &want, "sixteen lanes");
        }
    }

    #[test]
    fn prop_result_independent_of_batch(shape in any::<Shape>()) {
        let (ctx, keys) = random_context(&shape);
        let refs: Vec<&[u8]> = keys.iter().map(Vec::as_slice).collect();
        let nb_cat = shape.categories as usize;

        let mut batch = vec![0u32; refs.len() * nb_cat];
        ctx.classify(&refs, &mut batch, shape.categories).unwrap();

        for (k, key) in refs.iter().enumerate() {
            let mut alone = vec![0u32; nb_cat];
            ctx.classify(&[*key], &mut alone, shape.categories).unwrap();
            prop_assert_eq!(&alone[..], &batch[k * nb_cat..(k + 1) * nb_cat], "key {}", k);
        }
    }
}

#[test]
fn exhaustive_single_byte_keys() {
    for seed in 0..8 {
        let shape = Shape {
            tries: 1 + seed as usize % 4,
            categories: 1,
            keys: 0,
            seed,
        };
        let (ctx, _) = random_context(&shape);
        let data: Vec<[u8; 1]> = (0..=255u8).map(|b| [b]).collect();
        let refs: Vec<&[u8]> = data.iter().map(|k| k.as_slice()).collect();

        let mut want = vec![0u32; refs.len()];
        ctx.classify_alg(&refs, &mut want, 1, Algorithm::Scalar).unwrap();
        let mut got = vec![0u32; refs.len()];
        ctx.classify(&refs, &mut got, 1).unwrap();
        assert_eq!(got, want, "seed {seed}");
    }
}
