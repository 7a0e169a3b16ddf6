//! Posting lists: one ordered sequence of database identifiers per coarse
//! centroid. Same file name and role as the teacher's `inverted_index.rs`
//! `PostingList`, simplified from the teacher's block-packed,
//! quantized-summary representation to a plain sorted `Vec<i64>` per list —
//! this spec's coarse centers are already PQ codes sharing the engine's one
//! `dtable`, so no secondary per-block summary quantization is needed.

use serde::{Deserialize, Serialize};

use crate::space_usage::SpaceUsage;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvertedIndex {
    posting_lists: Vec<Vec<i64>>,
}

impl InvertedIndex {
    pub fn empty() -> Self {
        Self { posting_lists: Vec::new() }
    }

    pub fn from_lists(posting_lists: Vec<Vec<i64>>) -> Self {
        Self { posting_lists }
    }

    #[inline]
    pub fn nlist(&self) -> usize {
        self.posting_lists.len()
    }

    #[inline]
    pub fn list(&self, center: usize) -> &[i64] {
        &self.posting_lists[center]
    }

    pub fn lists(&self) -> &[Vec<i64>] {
        &self.posting_lists
    }

    pub fn clear(&mut self) {
        self.posting_lists.clear();
    }

    /// Appends `id` to the posting list of `center`. Callers only ever append
    /// ids greater than any id already present, so list order stays ascending.
    pub fn push(&mut self, center: usize, id: i64) {
        self.posting_lists[center].push(id);
    }

    /// Sum of posting list lengths, expected to equal `N` whenever the index
    /// has been configured.
    pub fn total_len(&self) -> usize {
        self.posting_lists.iter().map(Vec::len).sum()
    }
}

impl SpaceUsage for InvertedIndex {
    fn space_usage_byte(&self) -> usize {
        self.posting_lists.iter().map(|l| l.space_usage_byte()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_len_sums_all_lists() {
        let idx = InvertedIndex::from_lists(vec![vec![0, 1], vec![2], vec![]]);
        assert_eq!(idx.total_len(), 3);
        assert_eq!(idx.nlist(), 3);
    }
}
