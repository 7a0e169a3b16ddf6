//! Numeric kernels shared by the coarse partitioner and the scanners: squared
//! Euclidean distance over sub-vectors, asymmetric distance table (ADC)
//! construction, and symmetric PQ-code distance.
//!
//! Mirrors the role of the teacher's `distances` module (referenced from
//! `inverted_index.rs` as `dot_product_dense_sparse` / `dot_product_with_merge`)
//! but adapted from sparse dot products to dense squared-L2 over PQ sub-vectors.

use crate::codec::Code;

/// Squared Euclidean distance between two equal-length slices.
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Builds the `M x Ks` asymmetric distance table for a (possibly rotated)
/// query vector against a codebook tensor laid out as `codewords[m][k]` (each
/// entry a `Ds`-length sub-vector).
///
/// `query` must already have any codec pre-rotation applied and have length
/// `m * ds`.
pub fn build_adc_table(query: &[f32], codewords: &[Vec<Vec<f32>>], m: usize, ds: usize) -> DistanceTable {
    let ks = codewords.first().map_or(0, |cb| cb.len());
    let mut table = vec![0.0f32; m * ks];
    for sub in 0..m {
        let q_sub = &query[sub * ds..(sub + 1) * ds];
        for (k, codeword) in codewords[sub].iter().enumerate() {
            table[sub * ks + k] = squared_l2(q_sub, codeword);
        }
    }
    DistanceTable { table, m, ks }
}

/// A precomputed `M x Ks` table of partial squared distances, permitting ADC
/// lookup of query-to-code distance in `M` lookups + `M - 1` adds.
#[derive(Debug, Clone)]
pub struct DistanceTable {
    table: Vec<f32>,
    m: usize,
    ks: usize,
}

impl DistanceTable {
    #[inline]
    pub fn m(&self) -> usize {
        self.m
    }

    #[inline]
    pub fn ks(&self) -> usize {
        self.ks
    }

    /// ADC distance between the query this table was built for and the PQ
    /// code `code` (a slice of length `m`, entries in `[0, ks)`).
    #[inline]
    pub fn adc_distance(&self, code: &[Code]) -> f32 {
        debug_assert_eq!(code.len(), self.m);
        let mut acc = 0.0f32;
        for (sub, &k) in code.iter().enumerate() {
            acc += self.table[sub * self.ks + k as usize];
        }
        acc
    }
}

/// Symmetric PQ distance between two codes: the sum over sub-quantizers of
/// squared codeword distances, via the shared codebook tensor.
pub fn symmetric_pq_distance(a: &[Code], b: &[Code], codewords: &[Vec<Vec<f32>>]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .enumerate()
        .map(|(sub, (&ak, &bk))| squared_l2(&codewords[sub][ak as usize], &codewords[sub][bk as usize]))
        .sum()
}
