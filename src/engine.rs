//! The engine facade: `RiiIndex<C>` ties the code store, coarse partitioner,
//! inverted index and query planner into the lifecycle from `SPEC_FULL.md`
//! §6 (`construct`, `append`, `configure`, `append_and_configure`, the
//! `query*` family, `clear`, `snapshot`/`restore`).
//!
//! Grounded on the teacher's `InvertedIndex` (the top-level struct owning
//! `forward_index` + `posting_lists` + `config`): the same "one struct owns
//! the store and the posting lists" shape, generalized to also own the
//! coarse centers and the planner's threshold cache.

use std::time::Instant;

use crate::coarse;
use crate::code_store::CodeStore;
use crate::codec::{Code, PqCodec};
use crate::config::EngineConfig;
use crate::distances::build_adc_table;
use crate::error::{EngineError, Result};
use crate::inverted_index::InvertedIndex;
use crate::planner::Planner;
use crate::scan;
use crate::snapshot;
use crate::space_usage::SpaceUsage;

/// The reconfigurable inverted-index ANN search engine.
pub struct RiiIndex<C: PqCodec> {
    codec: C,
    code_store: CodeStore,
    coarse_centers: Vec<Code>,
    index: InvertedIndex,
    planner: Planner,
    config: EngineConfig,
}

impl<C: PqCodec> RiiIndex<C> {
    pub fn new(codec: C) -> Self {
        Self::with_config(codec, EngineConfig::default())
    }

    pub fn with_config(codec: C, config: EngineConfig) -> Self {
        let m = codec.m();
        Self {
            codec,
            code_store: CodeStore::new(m),
            coarse_centers: Vec::new(),
            index: InvertedIndex::empty(),
            planner: Planner::new(),
            config,
        }
    }

    #[inline]
    pub fn n(&self) -> usize {
        self.code_store.n()
    }

    #[inline]
    pub fn nlist(&self) -> usize {
        self.index.nlist()
    }

    #[inline]
    pub fn m(&self) -> usize {
        self.codec.m()
    }

    #[inline]
    pub fn d(&self) -> usize {
        self.codec.d()
    }

    #[inline]
    pub fn threshold(&self) -> Option<f64> {
        self.planner.threshold()
    }

    #[inline]
    pub fn codec(&self) -> &C {
        &self.codec
    }

    #[inline]
    pub fn coarse_centers(&self) -> &[Code] {
        &self.coarse_centers
    }

    #[inline]
    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn codes(&self) -> &[Code] {
        self.code_store.codes()
    }

    /// Appends `n_new` row-major raw vectors (`n_new * D` floats). If
    /// `update_posting_lists` is true and the index has already been
    /// configured, each new item is also assigned to its nearest coarse
    /// center; otherwise posting lists are left stale (caller must
    /// `configure` again).
    pub fn append(&mut self, raw: &[f32], n_new: usize, update_posting_lists: bool) -> Result<()> {
        let d = self.codec.d();
        if raw.len() != n_new * d {
            return Err(EngineError::ShapeMismatch { expected: n_new * d, got: raw.len() });
        }

        let new_codes = self.codec.encode(raw, n_new)?;
        let start_id = self.code_store.n() as i64;
        self.code_store.append_rows(new_codes)?;

        if update_posting_lists && self.index.nlist() > 0 {
            let m = self.codec.m();
            let nlist = self.index.nlist();
            for offset in 0..n_new {
                let id = start_id + offset as i64;
                let row = self.code_store.row(id as usize);
                let center = coarse::nearest_center(row, &self.coarse_centers, nlist, m, self.codec.codewords());
                self.index.push(center, id);
            }
        }

        log::info!("append: n is now {}", self.code_store.n());
        Ok(())
    }

    /// Rebuilds the coarse structure from the current codes, using the
    /// engine's configured k-means iteration count and seed.
    pub fn configure(&mut self, nlist: usize) -> Result<()> {
        self.configure_with(nlist, None, None)
    }

    pub fn configure_with(&mut self, nlist: usize, iter: Option<usize>, seed: Option<u64>) -> Result<()> {
        let max_iter = iter.unwrap_or(self.config.get_kmeans_max_iter());
        let seed = seed.unwrap_or(self.config.get_seed());

        let layout = coarse::configure(
            self.code_store.codes(),
            self.code_store.n(),
            self.codec.m(),
            nlist,
            self.codec.codewords(),
            seed,
            max_iter,
        )?;

        self.coarse_centers = layout.centers;
        self.index = InvertedIndex::from_lists(layout.posting_lists);
        log::info!("configure: nlist={nlist}, total posting entries={}", self.index.total_len());
        Ok(())
    }

    /// Equivalent to `append(raw, n_new, false)` followed by `configure(nlist)`.
    pub fn append_and_configure(&mut self, raw: &[f32], n_new: usize, nlist: usize) -> Result<()> {
        self.append(raw, n_new, false)?;
        self.configure(nlist)
    }

    fn build_query_table(&self, q: &[f32]) -> Result<crate::distances::DistanceTable> {
        if q.len() != self.codec.d() {
            return Err(EngineError::ShapeMismatch { expected: self.codec.d(), got: q.len() });
        }
        let rotated = self.codec.apply_rotation(q);
        Ok(build_adc_table(&rotated, self.codec.codewords(), self.codec.m(), self.codec.ds()))
    }

    pub fn query_linear(&self, q: &[f32], topk: usize, target_ids: &[i64]) -> Result<(Vec<i64>, Vec<f64>)> {
        let table = self.build_query_table(q)?;
        scan::query_linear(&table, &self.code_store, topk, target_ids)
    }

    pub fn query_ivf(&self, q: &[f32], topk: usize, target_ids: &[i64], l: usize) -> Result<(Vec<i64>, Vec<f64>)> {
        let table = self.build_query_table(q)?;
        scan::query_ivf(&table, &self.code_store, &self.index, &self.coarse_centers, self.codec.m(), topk, target_ids, l)
    }

    /// Selects linear vs. ivf based on the estimated candidate count and the
    /// (possibly just-calibrated) threshold, then dispatches.
    pub fn query(&self, q: &[f32], topk: usize, target_ids: &[i64], l: Option<usize>) -> Result<(Vec<i64>, Vec<f64>)> {
        if topk < 1 {
            return Err(EngineError::InvalidArgument("topk must be >= 1".into()));
        }
        if self.code_store.n() == 0 {
            return Err(EngineError::EmptyIndex);
        }

        if self.index.nlist() == 0 {
            return Err(EngineError::NotConfigured);
        }

        let s = if target_ids.is_empty() { self.code_store.n() } else { target_ids.len() };

        let threshold = self.planner.get_or_calibrate(|| self.calibrate_threshold(q, s));

        match Planner::decide(s, threshold) {
            crate::planner::Strategy::Linear => self.query_linear(q, topk, target_ids),
            crate::planner::Strategy::Ivf => {
                let l = l.unwrap_or_else(|| Planner::auto_l(topk, s, self.code_store.n(), self.index.nlist()));
                self.query_ivf(q, topk, target_ids, l)
            }
        }
    }

    /// Short calibration: times both scanners at the current candidate count,
    /// averaged over `EngineConfig::calibration_samples` probes each, and
    /// nudges the default threshold towards whichever is faster.
    fn calibrate_threshold(&self, q: &[f32], s: usize) -> f64 {
        let default = Planner::default_threshold(self.code_store.n(), self.index.nlist());
        let probe_targets: Vec<i64> = if s >= self.code_store.n() { Vec::new() } else { (0..s as i64).collect() };
        let samples = self.config.get_calibration_samples().max(1);

        let start = Instant::now();
        for _ in 0..samples {
            let _ = self.query_linear(q, 1, &probe_targets);
        }
        let linear_elapsed = start.elapsed() / samples as u32;

        let l = Planner::auto_l(1, s.max(1), self.code_store.n(), self.index.nlist());
        let start = Instant::now();
        for _ in 0..samples {
            let _ = self.query_ivf(q, 1, &probe_targets, l);
        }
        let ivf_elapsed = start.elapsed() / samples as u32;

        let threshold = if ivf_elapsed < linear_elapsed { (s as f64 * 0.5).max(1.0) } else { default.max(s as f64) };
        log::debug!(
            "planner calibration: s={s} samples={samples} linear={linear_elapsed:?} ivf={ivf_elapsed:?} threshold={threshold}"
        );
        threshold
    }

    /// Resets to empty; preserves the codec.
    pub fn clear(&mut self) {
        self.code_store.clear();
        self.coarse_centers.clear();
        self.index.clear();
        self.planner = Planner::new();
        log::info!("clear: index reset to empty");
    }

    pub fn snapshot(&self) -> Result<Vec<u8>> {
        snapshot::dump(
            self.codec.m(),
            self.codec.ks(),
            self.codec.d(),
            self.code_store.n(),
            self.index.nlist(),
            self.planner.threshold(),
            self.code_store.codes().to_vec(),
            self.coarse_centers.clone(),
            self.index.lists().to_vec(),
            self.config.clone(),
        )
    }

    pub fn restore(codec: C, bytes: &[u8]) -> Result<Self> {
        let state = snapshot::restore(bytes, &codec)?;
        let mut code_store = CodeStore::new(codec.m());
        code_store.append_rows(state.codes)?;
        Ok(Self {
            codec,
            code_store,
            coarse_centers: state.coarse_centers,
            index: InvertedIndex::from_lists(state.posting_lists),
            planner: Planner::with_threshold(state.threshold),
            config: state.config,
        })
    }
}

impl<C: PqCodec> SpaceUsage for RiiIndex<C> {
    fn space_usage_byte(&self) -> usize {
        self.code_store.space_usage_byte() + self.coarse_centers.space_usage_byte() + self.index.space_usage_byte()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ProductQuantizer;
    use rand::rngs::StdRng;
    use rand::Rng;
    use rand::SeedableRng;

    fn random_vectors(n: usize, d: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n * d).map(|_| rng.gen::<f32>()).collect()
    }

    fn build_engine(n: usize, d: usize, m: usize, ks: usize, seed: u64) -> (RiiIndex<ProductQuantizer>, Vec<f32>) {
        let x = random_vectors(n, d, seed);
        let codec = ProductQuantizer::train(&x, n, m, ks, d / m, seed, 15).unwrap();
        (RiiIndex::new(codec), x)
    }

    #[test]
    fn scenario_append_grows_n() {
        let (mut engine, x) = build_engine(1000, 40, 4, 20, 123);
        assert_eq!(engine.n(), 0);
        engine.append(&x, 1000, false).unwrap();
        assert_eq!(engine.n(), 1000);
        engine.append(&x, 1000, false).unwrap();
        assert_eq!(engine.n(), 2000);
    }

    #[test]
    fn scenario_configure_sums_to_n() {
        let (mut engine, x) = build_engine(1000, 40, 4, 20, 123);
        engine.append(&x, 1000, false).unwrap();
        for nlist in [5, 100] {
            engine.configure(nlist).unwrap();
            assert_eq!(engine.index().total_len(), 1000);
            assert_eq!(engine.index().nlist(), nlist);
        }
    }

    #[test]
    fn append_and_configure_matches_manual_sequence() {
        let (mut e1, x) = build_engine(1000, 40, 4, 20, 123);
        e1.append_and_configure(&x, 1000, 20).unwrap();

        let codec2 = ProductQuantizer::train(&x, 1000, 4, 20, 10, 123, 15).unwrap();
        let mut e2 = RiiIndex::new(codec2);
        e2.append(&x, 1000, false).unwrap();
        e2.configure(20).unwrap();

        assert_eq!(e1.codes(), e2.codes());
        assert_eq!(e1.index().lists(), e2.index().lists());
    }

    #[test]
    fn query_linear_finds_self_in_top_k() {
        let (mut engine, x) = build_engine(1000, 40, 20, 40, 123);
        engine.append_and_configure(&x, 1000, 20).unwrap();

        for n in 0..10 {
            let q = &x[n * 40..(n + 1) * 40];
            let (ids, dists) = engine.query_linear(q, 10, &[]).unwrap();
            assert!(ids.contains(&(n as i64)));
            for w in dists.windows(2) {
                assert!(w[0] <= w[1]);
            }
        }
    }

    #[test]
    fn query_ivf_matches_linear_when_l_exhausts_all_centers() {
        let (mut engine, x) = build_engine(1000, 40, 20, 40, 123);
        engine.append_and_configure(&x, 1000, 20).unwrap();

        let s = [2, 24, 43, 55, 102, 139, 221, 542, 667, 873, 874, 899];

        for n in 0..10 {
            let q = &x[n * 40..(n + 1) * 40];
            let (ids_full, dists_full) = engine.query_ivf(q, 10, &[], 1000).unwrap();
            let (ids_lin, dists_lin) = engine.query_linear(q, 10, &[]).unwrap();
            assert_eq!(ids_full, ids_lin);
            assert_eq!(dists_full, dists_lin);

            let target: Vec<i64> = s.to_vec();
            let (ids_ivf_s, dists_ivf_s) = engine.query_ivf(q, 10, &target, 200).unwrap();
            let (ids_lin_s, dists_lin_s) = engine.query_linear(q, 10, &target).unwrap();
            assert_eq!(ids_ivf_s, ids_lin_s);
            assert_eq!(dists_ivf_s, dists_lin_s);
            assert!(ids_ivf_s.iter().all(|id| target.contains(id)));
        }
    }

    #[test]
    fn query_dispatches_via_planner_and_returns_min_topk_s() {
        let (mut engine, x) = build_engine(1000, 40, 4, 20, 123);
        engine.append_and_configure(&x, 1000, 20).unwrap();
        let q = &x[0..40];
        let (ids, dists) = engine.query(q, 50, &[], None).unwrap();
        assert_eq!(ids.len(), 50);
        assert_eq!(dists.len(), 50);
        for w in dists.windows(2) {
            assert!(w[0] <= w[1]);
        }
    }

    #[test]
    fn clear_resets_to_empty_state() {
        let (mut engine, x) = build_engine(1000, 40, 4, 20, 123);
        engine.append_and_configure(&x, 1000, 20).unwrap();
        engine.clear();
        assert_eq!(engine.n(), 0);
        assert_eq!(engine.nlist(), 0);
        assert_eq!(engine.threshold(), None);
    }

    #[test]
    fn query_ivf_before_configure_errors() {
        let (mut engine, x) = build_engine(100, 40, 4, 20, 123);
        engine.append(&x, 100, false).unwrap();
        let q = &x[0..40];
        let err = engine.query_ivf(q, 5, &[], 10).unwrap_err();
        assert!(matches!(err, EngineError::NotConfigured));
    }

    #[test]
    fn query_before_configure_errors() {
        let (mut engine, x) = build_engine(100, 40, 4, 20, 123);
        engine.append(&x, 100, false).unwrap();
        let q = &x[0..40];
        let err = engine.query(q, 5, &[], None).unwrap_err();
        assert!(matches!(err, EngineError::NotConfigured));
    }

    #[test]
    fn configure_too_few_items_errors() {
        let (mut engine, x) = build_engine(10, 40, 4, 5, 123);
        engine.append(&x, 10, false).unwrap();
        let err = engine.configure(20).unwrap_err();
        assert!(matches!(err, EngineError::TooFewItems { .. }));
    }

    #[test]
    fn snapshot_round_trip_preserves_state() {
        let (mut engine, x) = build_engine(300, 40, 4, 20, 123);
        engine.append_and_configure(&x, 300, 10).unwrap();
        let q = &x[0..40];
        let _ = engine.query(q, 5, &[], None).unwrap();

        let bytes = engine.snapshot().unwrap();
        let restored = RiiIndex::restore(ProductQuantizer::train(&x, 300, 4, 20, 10, 123, 15).unwrap(), &bytes).unwrap();

        assert_eq!(restored.n(), engine.n());
        assert_eq!(restored.nlist(), engine.nlist());
        assert_eq!(restored.threshold(), engine.threshold());
        assert_eq!(restored.codes(), engine.codes());
        assert_eq!(restored.coarse_centers(), engine.coarse_centers());
        assert_eq!(restored.index().lists(), engine.index().lists());
    }

    #[test]
    fn snapshot_round_trip_preserves_unset_threshold() {
        let (mut engine, x) = build_engine(300, 40, 4, 20, 123);
        engine.append_and_configure(&x, 300, 10).unwrap();
        assert_eq!(engine.threshold(), None);

        let bytes = engine.snapshot().unwrap();
        let restored = RiiIndex::restore(ProductQuantizer::train(&x, 300, 4, 20, 10, 123, 15).unwrap(), &bytes).unwrap();

        assert_eq!(restored.threshold(), None);
        assert_eq!(restored.n(), engine.n());
        assert_eq!(restored.nlist(), engine.nlist());
    }
}
