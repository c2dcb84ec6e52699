use std::collections::{HashMap, HashSet};

use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use seahash::hash;

use crate::features::FeatureVector;
use crate::model::Handle;
use crate::vector::Metric;

pub const NUM_PERMUTATIONS: usize = 128;

/// 16 bands of 8 rows over a 128-permutation signature approximates a
/// Jaccard similarity threshold of ~0.5.
const BANDS: usize = 16;
const ROWS_PER_BAND: usize = 8;

/// Fixed seed so that building twice over the same vectors yields the
/// same buckets.
const PERMUTATION_SEED: u64 = 0x5EA_4A5_4;
const MERSENNE_PRIME: u64 = (1 << 61) - 1;

type Signature = [u64; NUM_PERMUTATIONS];

/// MinHash permutations: affine maps `(a*h + b) mod p` over a base
/// seahash, the classic substitute for truly independent hash functions.
struct MinHasher {
    perms: Vec<(u64, u64)>,
}

impl MinHasher {
    fn new() -> Self {
        let mut rng = StdRng::seed_from_u64(PERMUTATION_SEED);
        let perms = (0..NUM_PERMUTATIONS)
            .map(|_| {
                (
                    rng.gen_range(1..MERSENNE_PRIME),
                    rng.gen_range(0..MERSENNE_PRIME),
                )
            })
            .collect();
        Self { perms }
    }

    /// Discretize each dimension into a token and fold the token multiset
    /// into a MinHash signature.
    fn signature(&self, vector: &FeatureVector) -> Signature {
        let mut sig = [u64::MAX; NUM_PERMUTATIONS];
        for (i, value) in vector.iter().enumerate() {
            let token = format!("f{i}:{}", (value * 1000.0) as i64);
            let base = hash(token.as_bytes());
            for (slot, &(a, b)) in sig.iter_mut().zip(&self.perms) {
                let permuted =
                    ((a as u128 * base as u128 + b as u128) % MERSENNE_PRIME as u128) as u64;
                if permuted < *slot {
                    *slot = permuted;
                }
            }
        }
        sig
    }
}

fn band_key(band: usize, sig: &Signature) -> (usize, u64) {
    let slice = &sig[band * ROWS_PER_BAND..(band + 1) * ROWS_PER_BAND];
    let mut bytes = Vec::with_capacity(ROWS_PER_BAND * 8);
    for v in slice {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    (band, hash(&bytes))
}

/// Locality-sensitive approximate index. Trades recall for speed: a query
/// with no bucket collision legitimately returns nothing, which is a valid
/// outcome and not an error.
pub struct LshIndex {
    points: Vec<FeatureVector>,
    buckets: HashMap<(usize, u64), Vec<Handle>>,
    hasher: MinHasher,
}

impl LshIndex {
    pub fn build(vectors: &[FeatureVector]) -> Self {
        let hasher = MinHasher::new();
        let mut buckets: HashMap<(usize, u64), Vec<Handle>> = HashMap::new();
        for (h, vector) in vectors.iter().enumerate() {
            let sig = hasher.signature(vector);
            for band in 0..BANDS {
                buckets.entry(band_key(band, &sig)).or_default().push(h);
            }
        }
        Self {
            points: vectors.to_vec(),
            buckets,
            hasher,
        }
    }
}

impl crate::index::VectorIndex for LshIndex {
    fn query(&self, query: &FeatureVector, k: usize) -> Vec<(Handle, f64)> {
        if k == 0 {
            return vec![];
        }
        let sig = self.hasher.signature(query);

        let mut candidates = HashSet::new();
        for band in 0..BANDS {
            if let Some(bucket) = self.buckets.get(&band_key(band, &sig)) {
                candidates.extend(bucket.iter().copied());
            }
        }

        // Re-rank the candidate set by exact distance, truncated to k.
        let mut ranked: Vec<(Handle, f64)> = candidates
            .into_iter()
            .map(|h| (h, Metric::Euclidean.distance(query, &self.points[h])))
            .collect();
        ranked.sort_by(|a, b| {
            OrderedFloat(a.1)
                .cmp(&OrderedFloat(b.1))
                .then(a.0.cmp(&b.0))
        });
        ranked.truncate(k);
        ranked
    }
}
