//! Chooses linear vs. ivf per query based on estimated candidate count and
//! an auto-tuned threshold, cached on the index.
//!
//! Grounded on `original_source/tests/test_rii.py::test_query`'s contract (a
//! single `query()` entry point that dispatches transparently, with both
//! scanners agreeing on result shape) and this crate's own design note on
//! calibration (§4.7/§9 of `SPEC_FULL.md`).

use parking_lot::Mutex;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Strategy {
    Linear,
    Ivf,
}

/// The threshold cache: lock-free in the common case (read under the mutex,
/// released immediately), first-calibration-wins on contention.
pub struct Planner {
    threshold: Mutex<Option<f64>>,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new()
    }
}

impl Planner {
    pub fn new() -> Self {
        Self { threshold: Mutex::new(None) }
    }

    pub fn with_threshold(threshold: Option<f64>) -> Self {
        Self { threshold: Mutex::new(threshold) }
    }

    pub fn threshold(&self) -> Option<f64> {
        *self.threshold.lock()
    }

    /// Returns the cached threshold, computing and installing it via
    /// `calibrate` if unset. First writer wins; redundant recalibration by a
    /// racing reader is harmless (the value is idempotent given the same
    /// index state).
    pub fn get_or_calibrate(&self, calibrate: impl FnOnce() -> f64) -> f64 {
        let mut guard = self.threshold.lock();
        if let Some(value) = *guard {
            return value;
        }
        let value = calibrate();
        *guard = Some(value);
        value
    }

    /// A safe default threshold proportional to `N / nlist`, used when
    /// calibration is skipped (see `SPEC_FULL.md` §9).
    pub fn default_threshold(n: usize, nlist: usize) -> f64 {
        n as f64 / (nlist.max(1) as f64)
    }

    pub fn decide(s: usize, threshold: f64) -> Strategy {
        if (s as f64) < threshold {
            Strategy::Linear
        } else {
            Strategy::Ivf
        }
    }

    /// Heuristic target candidate count for the IVF scanner: grows with
    /// `topk` and with `S / N`, clamped to `[topk, S]`.
    pub fn auto_l(topk: usize, s: usize, n: usize, nlist: usize) -> usize {
        if s == 0 {
            return topk.max(1);
        }
        let fraction = s as f64 / n.max(1) as f64;
        let scale = 1.0 + fraction * nlist.max(1) as f64;
        let raw = (topk as f64 * scale).ceil() as usize;
        raw.clamp(topk, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_calibrate_runs_only_once() {
        let planner = Planner::new();
        let mut calls = 0;
        let first = planner.get_or_calibrate(|| {
            calls += 1;
            42.0
        });
        assert_eq!(first, 42.0);
        let second = planner.get_or_calibrate(|| {
            calls += 1;
            99.0
        });
        assert_eq!(second, 42.0);
        assert_eq!(calls, 1);
    }

    #[test]
    fn auto_l_is_clamped_between_topk_and_s() {
        let l = Planner::auto_l(10, 50, 1000, 20);
        assert!(l >= 10);
        assert!(l <= 50);
    }

    #[test]
    fn decide_picks_linear_below_threshold() {
        assert_eq!(Planner::decide(5, 10.0), Strategy::Linear);
        assert_eq!(Planner::decide(15, 10.0), Strategy::Ivf);
    }
}
