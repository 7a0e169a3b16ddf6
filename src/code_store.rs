//! Holds the PQ code matrix: an `N x M` row-major buffer of codes in
//! `[0, Ks)`. Mirrors the teacher's ownership of a flat backing buffer behind
//! `dim()`/`len()` accessors (`forward_index` in `inverted_index.rs`).

use crate::codec::Code;
use crate::error::{EngineError, Result};
use crate::space_usage::SpaceUsage;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct CodeStore {
    codes: Vec<Code>,
    m: usize,
}

impl CodeStore {
    pub fn new(m: usize) -> Self {
        Self { codes: Vec::new(), m }
    }

    #[inline]
    pub fn m(&self) -> usize {
        self.m
    }

    #[inline]
    pub fn n(&self) -> usize {
        if self.m == 0 {
            0
        } else {
            self.codes.len() / self.m
        }
    }

    #[inline]
    pub fn row(&self, id: usize) -> &[Code] {
        &self.codes[id * self.m..(id + 1) * self.m]
    }

    #[inline]
    pub fn codes(&self) -> &[Code] {
        &self.codes
    }

    /// Appends `n_new` rows already encoded by the codec (`n_new * m` codes).
    pub fn append_rows(&mut self, new_codes: Vec<Code>) -> Result<usize> {
        if new_codes.len() % self.m != 0 {
            return Err(EngineError::ShapeMismatch {
                expected: (new_codes.len() / self.m.max(1)) * self.m,
                got: new_codes.len(),
            });
        }
        let n_new = new_codes.len() / self.m;
        self.codes.extend(new_codes);
        Ok(n_new)
    }

    pub fn clear(&mut self) {
        self.codes.clear();
    }
}

impl SpaceUsage for CodeStore {
    fn space_usage_byte(&self) -> usize {
        self.codes.space_usage_byte()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_grows_n_by_row_count() {
        let mut store = CodeStore::new(2);
        assert_eq!(store.n(), 0);
        store.append_rows(vec![1, 2, 3, 4]).unwrap();
        assert_eq!(store.n(), 2);
        assert_eq!(store.row(0), &[1, 2]);
        assert_eq!(store.row(1), &[3, 4]);
    }

    #[test]
    fn append_rejects_partial_rows() {
        let mut store = CodeStore::new(3);
        assert!(store.append_rows(vec![1, 2]).is_err());
    }

    #[test]
    fn clear_resets_to_empty() {
        let mut store = CodeStore::new(2);
        store.append_rows(vec![1, 2, 3, 4]).unwrap();
        store.clear();
        assert_eq!(store.n(), 0);
    }
}
