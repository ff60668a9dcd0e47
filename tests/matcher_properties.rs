use lshtrack::lowlevel::{gather_candidates, nearest_pair, BitPositionSampler, CandidateScratch};
use lshtrack::{
    aggregate_stats, hamming_distance, match_descriptors, Descriptor, LshConfig, LshIndex, Match,
    MatchConfig, Matcher,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

fn random_descriptor(rng: &mut StdRng) -> Descriptor {
    let mut desc = [0u8; 32];
    for byte in desc.iter_mut() {
        *byte = rng.random_range(0..=255);
    }
    desc
}

/// Bit positions read by at least one table of an index built with `cfg`.
fn hashed_bits(cfg: &LshConfig) -> BTreeSet<u16> {
    (0..cfg.num_tables as u32)
        .flat_map(|t| BitPositionSampler::generate(cfg.key_bits, cfg.seed_base + t * 101))
        .collect()
}

fn unhashed_bits(cfg: &LshConfig) -> Vec<u16> {
    let hashed = hashed_bits(cfg);
    (0..256u16).filter(|pos| !hashed.contains(pos)).collect()
}

fn flip(desc: &mut Descriptor, pos: u16) {
    desc[pos as usize / 8] ^= 1 << (pos % 8);
}

/// Copy of `base` with `count` distinct bits flipped, all outside every hash
/// key, so the copy lands in the same bucket as `base` in every table.
fn same_bucket_variant(
    base: &Descriptor,
    free: &[u16],
    count: usize,
    rng: &mut StdRng,
) -> Descriptor {
    let mut out = *base;
    let mut picked = BTreeSet::new();
    while picked.len() < count {
        picked.insert(free[rng.random_range(0..free.len())]);
    }
    for pos in picked {
        flip(&mut out, pos);
    }
    out
}

#[test]
fn hamming_is_symmetric_and_zero_on_self() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..200 {
        let a = random_descriptor(&mut rng);
        let b = random_descriptor(&mut rng);
        let expected: u32 = a.iter().zip(&b).map(|(x, y)| (x ^ y).count_ones()).sum();
        assert_eq!(hamming_distance(&a, &b), expected);
        assert_eq!(hamming_distance(&a, &b), hamming_distance(&b, &a));
        assert_eq!(hamming_distance(&a, &a), 0);
        if a != b {
            assert!(hamming_distance(&a, &b) > 0);
        }
    }
}

#[test]
fn exact_copy_matches_its_reference_row() {
    let cfg = LshConfig::default();
    let free = unhashed_bits(&cfg);
    assert!(free.len() >= 100);

    let mut rng = StdRng::seed_from_u64(11);
    let target = random_descriptor(&mut rng);
    let mut corpus: Vec<Descriptor> = (0..64)
        .map(|_| {
            let flips = rng.random_range(30..60);
            same_bucket_variant(&target, &free, flips, &mut rng)
        })
        .collect();
    corpus[42] = target;

    let index = LshIndex::from_descriptors(&corpus, cfg).unwrap();
    let matches = match_descriptors(&index, &target, 1, &MatchConfig::default()).unwrap();
    assert_eq!(
        matches,
        vec![Some(Match {
            query_idx: 42,
            train_idx: 0,
            distance: 0,
        })]
    );
}

#[test]
fn duplicate_reference_rows_fail_ratio_test() {
    let cfg = LshConfig::default();
    let free = unhashed_bits(&cfg);
    let mut rng = StdRng::seed_from_u64(12);
    let target = random_descriptor(&mut rng);
    let mut corpus: Vec<Descriptor> = (0..16)
        .map(|_| same_bucket_variant(&target, &free, 40, &mut rng))
        .collect();
    corpus[5] = target;
    corpus[9] = target;

    let index = LshIndex::from_descriptors(&corpus, cfg).unwrap();
    let matches = match_descriptors(&index, &target, 1, &MatchConfig::default()).unwrap();
    assert_eq!(matches, vec![None]);

    // Breaking the tie restores the match.
    flip(&mut corpus[9], free[0]);
    flip(&mut corpus[9], free[1]);
    flip(&mut corpus[9], free[2]);
    let index = LshIndex::from_descriptors(&corpus, LshConfig::default()).unwrap();
    let matches = match_descriptors(&index, &target, 1, &MatchConfig::default()).unwrap();
    assert_eq!(matches[0].map(|m| m.query_idx), Some(5));
}

#[test]
fn one_bit_neighbor_is_accepted() {
    let cfg = LshConfig::default();
    let free = unhashed_bits(&cfg);
    let mut rng = StdRng::seed_from_u64(13);
    let target = random_descriptor(&mut rng);

    // The far row shares every hashed bit with the target, so it is always a
    // candidate, yet differs everywhere else.
    let mut far = target;
    for &pos in &free {
        flip(&mut far, pos);
    }
    assert!(hamming_distance(&target, &far) >= 100);

    let index = LshIndex::from_descriptors(&[target, far], cfg).unwrap();
    let mut query = target;
    flip(&mut query, free[free.len() / 2]);

    let matches = match_descriptors(&index, &query, 1, &MatchConfig::default()).unwrap();
    assert_eq!(
        matches,
        vec![Some(Match {
            query_idx: 0,
            train_idx: 0,
            distance: 1,
        })]
    );
}

#[test]
fn absolute_threshold_rejects_distant_best() {
    let cfg = LshConfig::default();
    let free = unhashed_bits(&cfg);
    let mut rng = StdRng::seed_from_u64(14);
    let target = random_descriptor(&mut rng);
    let near = same_bucket_variant(&target, &free, 20, &mut rng);
    let mut far = target;
    for &pos in &free {
        flip(&mut far, pos);
    }

    let index = LshIndex::from_descriptors(&[near, far], cfg).unwrap();
    let accepted = match_descriptors(&index, &target, 1, &MatchConfig::default()).unwrap();
    assert_eq!(accepted[0].map(|m| m.distance), Some(20));

    let strict = MatchConfig {
        max_hamming: Some(19),
        ..MatchConfig::default()
    };
    let rejected = match_descriptors(&index, &target, 1, &strict).unwrap();
    assert_eq!(rejected, vec![None]);
}

/// Anchors with variants that flip a few random bits, hashed ones included,
/// so clusters straddle neighboring buckets.
fn clustered_corpus(anchors: usize, variants: usize, rng: &mut StdRng) -> Vec<Descriptor> {
    let mut corpus = Vec::with_capacity(anchors * variants);
    for _ in 0..anchors {
        let anchor = random_descriptor(rng);
        for _ in 0..variants {
            let mut desc = anchor;
            for _ in 0..rng.random_range(0..12) {
                flip(&mut desc, rng.random_range(0..256));
            }
            corpus.push(desc);
        }
    }
    corpus
}

fn finds_true_nearest(
    index: &LshIndex,
    query: &Descriptor,
    cfg: &MatchConfig,
    true_nn: u32,
    scratch: &mut CandidateScratch,
) -> (bool, usize) {
    let candidates = gather_candidates(index, query, cfg, scratch).to_vec();
    let hit = nearest_pair(index, query, &candidates)
        .best
        .is_some_and(|(_, d)| d == true_nn);
    (hit, candidates.len())
}

fn check_multi_probe_monotonic(corpus: &[Descriptor], caps: &[usize], seed: u64) {
    let index = LshIndex::from_descriptors(corpus, LshConfig::default()).unwrap();
    let mut scratch = CandidateScratch::for_index(&index);
    let mut rng = StdRng::seed_from_u64(seed);

    let queries: Vec<Descriptor> = (0..300)
        .map(|_| {
            let mut q = corpus[rng.random_range(0..corpus.len())];
            for _ in 0..rng.random_range(1..16) {
                flip(&mut q, rng.random_range(0..256));
            }
            q
        })
        .collect();

    let mut cap_reached = false;
    for &cap in caps {
        let without_probe = MatchConfig {
            max_candidates: cap,
            use_multi_probe: false,
            ..MatchConfig::default()
        };
        let with_probe = MatchConfig {
            use_multi_probe: true,
            ..without_probe.clone()
        };

        let mut found_with = 0;
        let mut found_without = 0;
        for query in &queries {
            let true_nn = corpus
                .iter()
                .map(|reference| hamming_distance(query, reference))
                .min()
                .unwrap();
            let (plain_hit, plain_len) =
                finds_true_nearest(&index, query, &without_probe, true_nn, &mut scratch);
            let (probed_hit, probed_len) =
                finds_true_nearest(&index, query, &with_probe, true_nn, &mut scratch);

            cap_reached |= plain_len == cap;
            assert!(probed_len >= plain_len, "cap {cap}");
            assert!(!plain_hit || probed_hit, "cap {cap}");
            found_without += plain_hit as usize;
            found_with += probed_hit as usize;
        }
        assert!(found_with >= found_without, "cap {cap}");
    }
    assert!(cap_reached);
}

#[test]
fn multi_probe_never_loses_nearest_neighbors_under_tight_caps() {
    let mut rng = StdRng::seed_from_u64(21);
    let corpus = clustered_corpus(200, 20, &mut rng);
    check_multi_probe_monotonic(&corpus, &[4, 8, 16, 32], 22);
}

#[test]
fn multi_probe_never_loses_nearest_neighbors_with_default_cap() {
    let mut rng = StdRng::seed_from_u64(23);
    let corpus: Vec<Descriptor> = (0..300).map(|_| random_descriptor(&mut rng)).collect();
    check_multi_probe_monotonic(&corpus, &[1, 2, 600], 24);
}

#[test]
fn matches_are_aligned_with_live_rows() {
    let cfg = LshConfig::default();
    let free = unhashed_bits(&cfg);
    let mut rng = StdRng::seed_from_u64(31);

    let anchors: Vec<Descriptor> = (0..8).map(|_| random_descriptor(&mut rng)).collect();
    let mut corpus = Vec::new();
    for anchor in &anchors {
        corpus.push(*anchor);
        corpus.push(same_bucket_variant(anchor, &free, 50, &mut rng));
    }
    let matcher = Matcher::new(LshIndex::from_descriptors(&corpus, cfg).unwrap());

    let mut live: Vec<Descriptor> = anchors
        .iter()
        .map(|a| same_bucket_variant(a, &free, 2, &mut rng))
        .collect();
    live.push(random_descriptor(&mut rng));
    let matches = matcher.match_descriptors(&live).unwrap();

    assert_eq!(matches.len(), live.len());
    for (train_idx, m) in matches.iter().take(anchors.len()).enumerate() {
        let m = m.expect("anchor copies should match");
        assert_eq!(m.train_idx, train_idx);
        assert_eq!(m.query_idx, train_idx * 2);
        assert_eq!(m.distance, 2);
    }
    assert_eq!(matches[anchors.len()], None);

    let stats = aggregate_stats(&matches);
    assert_eq!(stats.count, anchors.len());
    assert_eq!(stats.min_dist, 2);
    assert_eq!(stats.max_dist, 2);
    assert!((stats.median_dist - 2.0).abs() < 1e-6);
}
