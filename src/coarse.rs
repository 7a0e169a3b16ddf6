//! Clusters existing PQ codes into `nlist` coarse centers (themselves PQ
//! codes) and assigns every item to its nearest center.
//!
//! Grounded on `other_examples/.../idx_ivfpq.rs`'s per-sub-quantizer
//! clustering shape (`create_codebook` / `find_nearest_centroids` /
//! `find_nearest_code`) and the teacher's `utils::do_random_kmeans_on_docids`
//! (k-means over existing item ids in this crate's own code space).

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::codec::Code;
use crate::distances::symmetric_pq_distance;
use crate::error::{EngineError, Result};

pub const DEFAULT_MAX_ITER: usize = 20;
pub const DEFAULT_SEED: u64 = 123;

/// Result of `configure`: the new coarse centers (`nlist x m` codes) and the
/// posting lists (`nlist` ascending-id-order `Vec<i64>`s).
pub struct CoarseLayout {
    pub centers: Vec<Code>,
    pub posting_lists: Vec<Vec<i64>>,
}

/// Runs k-means in PQ-code space over `codes` (`n x m`) to produce `nlist`
/// coarse centers, then assigns every item `[0, n)` to its nearest center.
pub fn configure(
    codes: &[Code],
    n: usize,
    m: usize,
    nlist: usize,
    codewords: &[Vec<Vec<f32>>],
    seed: u64,
    max_iter: usize,
) -> Result<CoarseLayout> {
    if nlist == 0 {
        return Err(EngineError::InvalidArgument("nlist must be positive".into()));
    }
    if n < nlist {
        return Err(EngineError::TooFewItems { nlist, n });
    }

    let ks = codewords.first().map_or(0, |cb| cb.len());

    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);
    let mut centers: Vec<Code> = indices[..nlist]
        .iter()
        .flat_map(|&i| codes[i * m..(i + 1) * m].to_vec())
        .collect();

    let mut assignments = vec![0usize; n];
    for iter in 0..max_iter {
        let mut changed = false;
        for i in 0..n {
            let row = &codes[i * m..(i + 1) * m];
            let best = nearest_center(row, &centers, nlist, m, codewords);
            if best != assignments[i] {
                changed = true;
            }
            assignments[i] = best;
        }

        log::debug!("coarse k-means iteration {iter}, changed={changed}");

        if !changed && iter > 0 {
            break;
        }

        let clusters: Vec<Vec<usize>> = {
            let mut clusters = vec![Vec::new(); nlist];
            for (i, &c) in assignments.iter().enumerate() {
                clusters[c].push(i);
            }
            clusters
        };

        let new_centers: Vec<Vec<Code>> = (0..nlist)
            .into_par_iter()
            .map(|cluster_id| {
                let members = &clusters[cluster_id];
                if members.is_empty() {
                    return centers[cluster_id * m..(cluster_id + 1) * m].to_vec();
                }
                update_center(members, codes, m, ks, codewords)
            })
            .collect();
        centers = new_centers.into_iter().flatten().collect();

        if !changed {
            break;
        }
    }

    // Final assignment pass against the converged centers, so posting lists
    // reflect the centers actually returned.
    for i in 0..n {
        let row = &codes[i * m..(i + 1) * m];
        assignments[i] = nearest_center(row, &centers, nlist, m, codewords);
    }

    let mut posting_lists: Vec<Vec<i64>> = vec![Vec::new(); nlist];
    for (i, &c) in assignments.iter().enumerate() {
        posting_lists[c].push(i as i64);
    }
    // Items are visited in ascending id order above, so each list is already
    // sorted; no further sort is needed.

    Ok(CoarseLayout { centers, posting_lists })
}

/// Finds the nearest (ties: lowest index) of `nlist` coarse centers to `code`.
pub(crate) fn nearest_center(code: &[Code], centers: &[Code], nlist: usize, m: usize, codewords: &[Vec<Vec<f32>>]) -> usize {
    let mut best_idx = 0;
    let mut best_dist = f32::INFINITY;
    for c in 0..nlist {
        let center_row = &centers[c * m..(c + 1) * m];
        let dist = symmetric_pq_distance(code, center_row, codewords);
        if dist < best_dist {
            best_dist = dist;
            best_idx = c;
        }
    }
    best_idx
}

/// Per sub-quantizer, picks the codeword index minimizing the sum of squared
/// distances to the cluster members' codes at that sub-quantizer.
fn update_center(members: &[usize], codes: &[Code], m: usize, ks: usize, codewords: &[Vec<Vec<f32>>]) -> Vec<Code> {
    (0..m)
        .into_par_iter()
        .map(|sub| {
            let mut best_k = 0usize;
            let mut best_sum = f32::INFINITY;
            for k in 0..ks {
                let codeword = &codewords[sub][k];
                let sum: f32 = members
                    .iter()
                    .map(|&item| {
                        let item_code = codes[item * m + sub] as usize;
                        crate::distances::squared_l2(codeword, &codewords[sub][item_code])
                    })
                    .sum();
                if sum < best_sum {
                    best_sum = sum;
                    best_k = k;
                }
            }
            best_k as Code
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_codewords() -> Vec<Vec<Vec<f32>>> {
        vec![vec![vec![0.0], vec![10.0], vec![20.0]]]
    }

    #[test]
    fn configure_rejects_nlist_greater_than_n() {
        let codewords = toy_codewords();
        let codes = vec![0, 1, 2];
        let err = configure(&codes, 3, 1, 5, &codewords, 0, 5).unwrap_err();
        assert!(matches!(err, EngineError::TooFewItems { .. }));
    }

    #[test]
    fn configure_assigns_every_item_exactly_once() {
        let codewords = toy_codewords();
        let codes = vec![0u16, 0, 1, 1, 2, 2];
        let layout = configure(&codes, 6, 1, 3, &codewords, 0, 20).unwrap();
        let total: usize = layout.posting_lists.iter().map(|l| l.len()).sum();
        assert_eq!(total, 6);
        assert_eq!(layout.posting_lists.len(), 3);
        let mut seen = std::collections::HashSet::new();
        for list in &layout.posting_lists {
            for &id in list {
                assert!(seen.insert(id), "id {id} appeared twice");
            }
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn posting_lists_are_in_ascending_id_order() {
        let codewords = toy_codewords();
        let codes = vec![0u16, 2, 0, 1, 2, 0];
        let layout = configure(&codes, 6, 1, 3, &codewords, 1, 20).unwrap();
        for list in &layout.posting_lists {
            let mut sorted = list.clone();
            sorted.sort_unstable();
            assert_eq!(*list, sorted);
        }
    }
}
