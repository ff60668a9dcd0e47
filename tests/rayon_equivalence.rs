#![cfg(feature = "rayon")]

use lshtrack::{
    match_descriptors, match_descriptors_par, Descriptor, LshConfig, LshIndex, MatchConfig,
    Matcher,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn make_corpus(rng: &mut StdRng, anchors: usize) -> Vec<Descriptor> {
    // Clusters of near-duplicates that differ only in the trailing bytes, which
    // an 18-bit key never reads, so every cluster shares buckets.
    let mut corpus = Vec::new();
    for _ in 0..anchors {
        let mut anchor = [0u8; 32];
        for byte in anchor.iter_mut() {
            *byte = rng.random_range(0..=255);
        }
        for variant in 0..4u8 {
            let mut desc = anchor;
            for byte in desc.iter_mut().skip(20) {
                if variant > 0 {
                    *byte ^= rng.random_range(0..=255);
                }
            }
            corpus.push(desc);
        }
    }
    corpus
}

#[test]
fn parallel_matches_sequential() {
    let mut rng = StdRng::seed_from_u64(99);
    let corpus = make_corpus(&mut rng, 150);
    let index = LshIndex::from_descriptors(&corpus, LshConfig::default()).unwrap();

    let live: Vec<Descriptor> = (0..400)
        .map(|i| {
            let mut desc = corpus[(i * 13) % corpus.len()];
            desc[30] ^= 1 << (i % 8);
            if i % 5 == 0 {
                desc[3] ^= 0x40;
            }
            desc
        })
        .collect();
    let live_bytes = live.as_flattened();

    let cfg = MatchConfig::default();
    let sequential = match_descriptors(&index, live_bytes, live.len(), &cfg).unwrap();
    let parallel = match_descriptors_par(&index, live_bytes, live.len(), &cfg).unwrap();
    assert_eq!(sequential, parallel);
    assert!(sequential.iter().flatten().count() > 0);

    let matcher = Matcher::new(index).with_config(MatchConfig {
        parallel: true,
        ..MatchConfig::default()
    });
    assert_eq!(matcher.match_descriptors(&live).unwrap(), sequential);
}
