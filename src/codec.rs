//! The one external-collaborator boundary the core crosses: a fitted PQ (or
//! OPQ) codec exposing `encode`/`codewords`/an optional pre-rotation. Modeled
//! on `other_examples/.../ivf_pq/pq.rs`'s per-subquantizer codebook structure
//! and the `nanopq.PQ`/`nanopq.OPQ` contract exercised in
//! `original_source/tests/test_rii.py`.
//!
//! Codebook training itself is explicitly out of the core's tested scope, but
//! a concrete trainer ships here so the crate is runnable standalone.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::distances::squared_l2;
use crate::error::{EngineError, Result};
use crate::linalg;

/// Element type of a PQ code row. `Ks` never needs more than 16 bits in
/// practice, so every code element is stored as `u16` uniformly rather than
/// switching between `u8` and `u16` per `Ks` the way the teacher's generic
/// `ComponentType` trait does — half the footprint of the `u32` this used to
/// be, at the cost of not shrinking further to `u8` when `Ks <= 256`.
pub type Code = u16;

/// Capability surface the core consumes for a fitted codec. Two concrete
/// variants are provided: plain PQ and rotated OPQ.
pub trait PqCodec: Send + Sync {
    /// Number of sub-quantizers.
    fn m(&self) -> usize;
    /// Codebook size per sub-quantizer.
    fn ks(&self) -> usize;
    /// Sub-vector dimensionality (`D / M`).
    fn ds(&self) -> usize;
    /// Full vector dimensionality.
    fn d(&self) -> usize {
        self.m() * self.ds()
    }
    /// `M x Ks` codebook tensor; codeword `[m][k]` has length `Ds`.
    fn codewords(&self) -> &[Vec<Vec<f32>>];
    /// Applies any codec pre-rotation to a raw (or query) vector. The
    /// identity for plain PQ.
    fn apply_rotation(&self, raw: &[f32]) -> Vec<f32>;
    /// Encodes a single (already-rotated-by-the-caller-if-needed) raw vector
    /// into its nearest PQ code.
    fn encode_one(&self, raw: &[f32]) -> Vec<Code>;

    /// Encodes `n` row-major vectors of width `self.d()`, in parallel.
    fn encode(&self, raw: &[f32], n: usize) -> Result<Vec<Code>> {
        let d = self.d();
        if raw.len() != n * d {
            return Err(EngineError::ShapeMismatch {
                expected: n * d,
                got: raw.len(),
            });
        }
        let rows: Vec<Vec<Code>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let row = &raw[i * d..(i + 1) * d];
                let rotated = self.apply_rotation(row);
                self.encode_one(&rotated)
            })
            .collect();
        Ok(rows.into_iter().flatten().collect())
    }
}

/// Plain product quantizer: `M` independently-trained `Ks`-entry codebooks,
/// no pre-rotation.
pub struct ProductQuantizer {
    m: usize,
    ks: usize,
    ds: usize,
    codewords: Vec<Vec<Vec<f32>>>,
}

impl ProductQuantizer {
    /// Trains a PQ codec on `n` row-major vectors of width `m * ds`, via
    /// independent k-means (Lloyd's algorithm) per sub-quantizer.
    pub fn train(vectors: &[f32], n: usize, m: usize, ks: usize, ds: usize, seed: u64, max_iter: usize) -> Result<Self> {
        if m == 0 || ks == 0 || ds == 0 {
            return Err(EngineError::InvalidArgument(
                "m, ks and ds must all be positive".into(),
            ));
        }
        let d = m * ds;
        if vectors.len() != n * d {
            return Err(EngineError::ShapeMismatch {
                expected: n * d,
                got: vectors.len(),
            });
        }
        if n < ks {
            return Err(EngineError::TooFewItems { nlist: ks, n });
        }

        log::info!("training PQ codec: m={m} ks={ks} ds={ds} n={n}");

        let codewords: Vec<Vec<Vec<f32>>> = (0..m)
            .into_par_iter()
            .map(|sub| {
                let subvectors: Vec<&[f32]> = (0..n)
                    .map(|i| &vectors[i * d + sub * ds..i * d + (sub + 1) * ds])
                    .collect();
                kmeans_train(&subvectors, ks, ds, seed.wrapping_add(sub as u64), max_iter)
            })
            .collect();

        Ok(Self { m, ks, ds, codewords })
    }
}

impl PqCodec for ProductQuantizer {
    fn m(&self) -> usize {
        self.m
    }
    fn ks(&self) -> usize {
        self.ks
    }
    fn ds(&self) -> usize {
        self.ds
    }
    fn codewords(&self) -> &[Vec<Vec<f32>>] {
        &self.codewords
    }
    fn apply_rotation(&self, raw: &[f32]) -> Vec<f32> {
        raw.to_vec()
    }
    fn encode_one(&self, raw: &[f32]) -> Vec<Code> {
        encode_with_codebooks(raw, &self.codewords, self.m, self.ds)
    }
}

/// PQ preceded by a learned orthonormal rotation. From the core's viewpoint
/// it is just a codec that rotates queries and raw vectors before table
/// construction / encoding.
pub struct OpqQuantizer {
    pq: ProductQuantizer,
    rotation: Vec<f32>,
    d: usize,
}

impl OpqQuantizer {
    /// Trains an OPQ codec: alternates fixing the rotation and re-fitting PQ
    /// codebooks, then fixing the codebooks and re-solving the rotation via
    /// an orthogonal Procrustes step, for `outer_iters` rounds.
    pub fn train(
        vectors: &[f32],
        n: usize,
        m: usize,
        ks: usize,
        ds: usize,
        seed: u64,
        max_iter: usize,
        outer_iters: usize,
    ) -> Result<Self> {
        let d = m * ds;
        if vectors.len() != n * d {
            return Err(EngineError::ShapeMismatch {
                expected: n * d,
                got: vectors.len(),
            });
        }

        let mut rotation = identity_matrix(d);
        let mut pq = ProductQuantizer::train(vectors, n, m, ks, ds, seed, max_iter)?;

        for outer in 0..outer_iters.max(1) {
            let rotated: Vec<f32> = (0..n)
                .into_par_iter()
                .flat_map_iter(|i| linalg::apply_rotation(&rotation, &vectors[i * d..(i + 1) * d], d))
                .collect();

            pq = ProductQuantizer::train(&rotated, n, m, ks, ds, seed.wrapping_add(outer as u64 + 1), max_iter)?;

            let codes = pq.encode(&rotated, n)?;
            let reconstructed: Vec<f32> = (0..n)
                .into_par_iter()
                .flat_map_iter(|i| reconstruct(&codes[i * m..(i + 1) * m], &pq.codewords, ds))
                .collect();

            let mut cross_cov = vec![0.0f32; d * d];
            for i in 0..n {
                let x = &vectors[i * d..(i + 1) * d];
                let y = &reconstructed[i * d..(i + 1) * d];
                for r in 0..d {
                    for c in 0..d {
                        cross_cov[r * d + c] += x[r] * y[c];
                    }
                }
            }
            rotation = linalg::orthogonal_procrustes(&cross_cov, d);
            log::debug!("opq rotation refinement: outer iter {outer} done");
        }

        Ok(Self { pq, rotation, d })
    }
}

impl PqCodec for OpqQuantizer {
    fn m(&self) -> usize {
        self.pq.m()
    }
    fn ks(&self) -> usize {
        self.pq.ks()
    }
    fn ds(&self) -> usize {
        self.pq.ds()
    }
    fn codewords(&self) -> &[Vec<Vec<f32>>] {
        self.pq.codewords()
    }
    fn apply_rotation(&self, raw: &[f32]) -> Vec<f32> {
        linalg::apply_rotation(&self.rotation, raw, self.d)
    }
    fn encode_one(&self, raw: &[f32]) -> Vec<Code> {
        self.pq.encode_one(raw)
    }
}

fn identity_matrix(n: usize) -> Vec<f32> {
    let mut m = vec![0.0f32; n * n];
    for i in 0..n {
        m[i * n + i] = 1.0;
    }
    m
}

fn reconstruct(code: &[Code], codewords: &[Vec<Vec<f32>>], ds: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(code.len() * ds);
    for (sub, &k) in code.iter().enumerate() {
        out.extend_from_slice(&codewords[sub][k as usize]);
    }
    out
}

fn encode_with_codebooks(raw: &[f32], codewords: &[Vec<Vec<f32>>], m: usize, ds: usize) -> Vec<Code> {
    (0..m)
        .map(|sub| {
            let sub_vec = &raw[sub * ds..(sub + 1) * ds];
            codewords[sub]
                .iter()
                .enumerate()
                .map(|(k, cw)| (k, squared_l2(sub_vec, cw)))
                .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
                .map(|(k, _)| k as Code)
                .unwrap_or(0)
        })
        .collect()
}

/// Lloyd's algorithm over a set of equal-length sub-vectors, seeded by
/// random selection without replacement for reproducibility.
fn kmeans_train(subvectors: &[&[f32]], ks: usize, ds: usize, seed: u64, max_iter: usize) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..subvectors.len()).collect();
    indices.shuffle(&mut rng);
    let mut centroids: Vec<Vec<f32>> = indices[..ks].iter().map(|&i| subvectors[i].to_vec()).collect();

    let mut assignments = vec![0usize; subvectors.len()];
    for _ in 0..max_iter {
        let mut changed = false;
        for (i, sub) in subvectors.iter().enumerate() {
            let best = centroids
                .iter()
                .enumerate()
                .map(|(k, c)| (k, squared_l2(sub, c)))
                .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap())
                .map(|(k, _)| k)
                .unwrap_or(0);
            if best != assignments[i] {
                changed = true;
            }
            assignments[i] = best;
        }

        let mut sums = vec![vec![0.0f32; ds]; ks];
        let mut counts = vec![0usize; ks];
        for (i, sub) in subvectors.iter().enumerate() {
            let c = assignments[i];
            counts[c] += 1;
            for (acc, &v) in sums[c].iter_mut().zip(sub.iter()) {
                *acc += v;
            }
        }
        for k in 0..ks {
            if counts[k] == 0 {
                continue;
            }
            for v in sums[k].iter_mut() {
                *v /= counts[k] as f32;
            }
            centroids[k] = sums[k].clone();
        }

        if !changed {
            break;
        }
    }

    centroids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_vectors() -> (Vec<f32>, usize, usize, usize, usize) {
        // 8 vectors, d=4, m=2, ds=2.
        let vectors: Vec<f32> = vec![
            0.0, 0.0, 10.0, 10.0, 0.1, 0.1, 10.1, 10.1, 0.2, -0.1, 9.9, 10.2, -0.1, 0.0, 10.2, 9.8,
            5.0, 5.0, 0.0, 10.0, 5.1, 4.9, 0.1, 10.1, 4.9, 5.1, -0.1, 9.9, 5.0, 5.0, 0.2, 10.2,
        ];
        (vectors, 8, 2, 2, 2)
    }

    #[test]
    fn pq_train_produces_correct_shapes() {
        let (vectors, n, m, ks, ds) = toy_vectors();
        let pq = ProductQuantizer::train(&vectors, n, m, ks, ds, 42, 20).unwrap();
        assert_eq!(pq.codewords().len(), m);
        assert_eq!(pq.codewords()[0].len(), ks);
        assert_eq!(pq.codewords()[0][0].len(), ds);
    }

    #[test]
    fn pq_encode_returns_n_times_m_codes_in_range() {
        let (vectors, n, m, ks, ds) = toy_vectors();
        let pq = ProductQuantizer::train(&vectors, n, m, ks, ds, 42, 20).unwrap();
        let codes = pq.encode(&vectors, n).unwrap();
        assert_eq!(codes.len(), n * m);
        assert!(codes.iter().all(|&c| (c as usize) < ks));
    }

    #[test]
    fn pq_encode_rejects_wrong_width() {
        let (vectors, n, m, ks, ds) = toy_vectors();
        let pq = ProductQuantizer::train(&vectors, n, m, ks, ds, 42, 20).unwrap();
        let bad = vec![0.0f32; n * 3];
        assert!(matches!(pq.encode(&bad, n), Err(EngineError::ShapeMismatch { .. })));
    }

    #[test]
    fn opq_rotation_is_applied_to_queries() {
        let (vectors, n, m, ks, ds) = toy_vectors();
        let opq = OpqQuantizer::train(&vectors, n, m, ks, ds, 7, 20, 2).unwrap();
        let rotated = opq.apply_rotation(&vectors[0..4]);
        assert_eq!(rotated.len(), 4);
    }
}
