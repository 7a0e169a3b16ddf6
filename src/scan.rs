//! The exhaustive linear scanner and the coarse-pruned IVF scanner, plus the
//! candidate-evaluation kernel they share.
//!
//! Grounded on the teacher's `InvertedIndex::search` / `PostingList::search`
//! (sorted-by-score traversal with an early-exit heap check), generalized
//! from "sparse dot product over posting-list blocks" to "ADC over
//! posting-list identifiers, coarse centers visited in ascending distance
//! order until `L` candidates accumulate".

use std::collections::HashSet;

use itertools::Itertools;
use rayon::prelude::*;

use crate::code_store::CodeStore;
use crate::distances::DistanceTable;
use crate::error::{EngineError, Result};
use crate::inverted_index::InvertedIndex;
use crate::topk_selectors::TopKHeap;

const CHUNK_SIZE: usize = 4096;

/// Evaluates ADC distance for every id in `candidates`, partitioned across a
/// rayon thread pool, and merges the per-chunk bounded heaps into one.
fn scan_candidates(dtable: &DistanceTable, codes: &CodeStore, candidates: &[i64], topk: usize) -> TopKHeap {
    let chunk_heaps: Vec<TopKHeap> = candidates
        .par_chunks(CHUNK_SIZE.max(1))
        .map(|chunk| {
            let mut heap = TopKHeap::new(topk);
            for &id in chunk {
                if id < 0 || id as usize >= codes.n() {
                    continue;
                }
                let row = codes.row(id as usize);
                let dist = dtable.adc_distance(row) as f64;
                heap.push(dist, id);
            }
            heap
        })
        .collect();

    let mut result = TopKHeap::new(topk);
    for heap in &chunk_heaps {
        result.merge(heap);
    }
    result
}

fn validate_query_args(topk: usize, target_ids: &[i64]) -> Result<()> {
    if topk < 1 {
        return Err(EngineError::InvalidArgument("topk must be >= 1".into()));
    }
    if target_ids.iter().any(|&id| id < 0) {
        return Err(EngineError::InvalidArgument(
            "target_ids must not contain negative identifiers".into(),
        ));
    }
    Ok(())
}

/// Exhaustive ADC scan over `target_ids` (or all of `[0, N)` if empty).
pub fn query_linear(dtable: &DistanceTable, codes: &CodeStore, topk: usize, target_ids: &[i64]) -> Result<(Vec<i64>, Vec<f64>)> {
    validate_query_args(topk, target_ids)?;
    if codes.n() == 0 {
        return Err(EngineError::EmptyIndex);
    }

    let heap = if target_ids.is_empty() {
        let all: Vec<i64> = (0..codes.n() as i64).collect();
        scan_candidates(dtable, codes, &all, topk)
    } else {
        scan_candidates(dtable, codes, target_ids, topk)
    };

    Ok(heap.into_sorted())
}

/// Coarse-to-fine scan: visits posting lists in ascending coarse distance
/// until at least `L` candidates have been evaluated, then runs the linear
/// scanner's heap selection over the accumulated set.
#[allow(clippy::too_many_arguments)]
pub fn query_ivf(
    dtable: &DistanceTable,
    codes: &CodeStore,
    index: &InvertedIndex,
    coarse_centers: &[crate::codec::Code],
    m: usize,
    topk: usize,
    target_ids: &[i64],
    l: usize,
) -> Result<(Vec<i64>, Vec<f64>)> {
    validate_query_args(topk, target_ids)?;
    if codes.n() == 0 {
        return Err(EngineError::EmptyIndex);
    }
    if index.nlist() == 0 {
        return Err(EngineError::NotConfigured);
    }
    if l < 1 {
        return Err(EngineError::InvalidArgument("L must be >= 1".into()));
    }

    let nlist = index.nlist();
    let center_order: Vec<(f32, usize)> = (0..nlist)
        .map(|c| {
            let center_row = &coarse_centers[c * m..(c + 1) * m];
            (dtable.adc_distance(center_row), c)
        })
        .sorted_unstable_by(|a, b| a.0.partial_cmp(&b.0).unwrap())
        .collect();

    let target_set: Option<HashSet<i64>> = if target_ids.is_empty() {
        None
    } else {
        Some(target_ids.iter().copied().collect())
    };

    let mut accumulated: Vec<i64> = Vec::new();
    for &(_, center) in &center_order {
        let list = index.list(center);
        match &target_set {
            None => accumulated.extend_from_slice(list),
            Some(set) => accumulated.extend(list.iter().copied().filter(|id| set.contains(id))),
        }
        if accumulated.len() >= l {
            break;
        }
    }

    let heap = scan_candidates(dtable, codes, &accumulated, topk);
    Ok(heap.into_sorted())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distances::build_adc_table;

    fn simple_codewords() -> Vec<Vec<Vec<f32>>> {
        vec![vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]]]
    }

    #[test]
    fn query_linear_returns_closest_candidates_sorted() {
        let codewords = simple_codewords();
        let mut store = CodeStore::new(1);
        store.append_rows(vec![0, 1, 2, 3]).unwrap();
        let table = build_adc_table(&[1.1], &codewords, 1, 1);
        let (ids, dists) = query_linear(&table, &store, 2, &[]).unwrap();
        assert_eq!(ids, vec![1, 2]);
        assert!(dists[0] <= dists[1]);
    }

    #[test]
    fn query_linear_empty_index_errors() {
        let codewords = simple_codewords();
        let store = CodeStore::new(1);
        let table = build_adc_table(&[0.0], &codewords, 1, 1);
        assert!(matches!(query_linear(&table, &store, 1, &[]), Err(EngineError::EmptyIndex)));
    }

    #[test]
    fn query_linear_restricted_to_subset() {
        let codewords = simple_codewords();
        let mut store = CodeStore::new(1);
        store.append_rows(vec![0, 1, 2, 3]).unwrap();
        let table = build_adc_table(&[0.0], &codewords, 1, 1);
        let (ids, _) = query_linear(&table, &store, 5, &[2, 3]).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.iter().all(|id| [2, 3].contains(id)));
    }

    #[test]
    fn query_ivf_without_configuration_errors() {
        let codewords = simple_codewords();
        let mut store = CodeStore::new(1);
        store.append_rows(vec![0, 1]).unwrap();
        let table = build_adc_table(&[0.0], &codewords, 1, 1);
        let index = InvertedIndex::empty();
        let err = query_ivf(&table, &store, &index, &[], 1, 1, &[], 1).unwrap_err();
        assert!(matches!(err, EngineError::NotConfigured));
    }

    #[test]
    fn query_linear_rejects_zero_topk() {
        let codewords = simple_codewords();
        let mut store = CodeStore::new(1);
        store.append_rows(vec![0, 1]).unwrap();
        let table = build_adc_table(&[0.0], &codewords, 1, 1);
        let err = query_linear(&table, &store, 0, &[]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn query_linear_rejects_negative_target_ids() {
        let codewords = simple_codewords();
        let mut store = CodeStore::new(1);
        store.append_rows(vec![0, 1]).unwrap();
        let table = build_adc_table(&[0.0], &codewords, 1, 1);
        let err = query_linear(&table, &store, 1, &[-1]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn query_ivf_rejects_zero_l() {
        let codewords = simple_codewords();
        let mut store = CodeStore::new(1);
        store.append_rows(vec![0, 1]).unwrap();
        let table = build_adc_table(&[0.0], &codewords, 1, 1);
        let index = InvertedIndex::from_lists(vec![vec![0, 1]]);
        let err = query_ivf(&table, &store, &index, &[0], 1, 1, &[], 0).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }
}
