use crate::error::{EngineError, Result};
use crate::output;
use crate::primality;
use crate::report::SegmentReport;
use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

pub struct WindowParams<'a> {
    pub n_start: u64,
    pub window_evens: u64,
    pub gear: &'a [u64],
    pub threads: usize,
    pub miss_cap: usize,
    pub out_dir: &'a Path,
}

/// Verify one sparse window of evens by per-even witness search. Every even
/// runs the same wheel-plus-MR64 probe the seam verifier uses; there is no
/// sieve and no bitset at these heights.
pub fn run_window(params: &WindowParams<'_>) -> Result<SegmentReport> {
    let started = Instant::now();
    let n_end = params.n_start + 2 * (params.window_evens - 1);

    let covered = AtomicU64::new(0);
    let misses: Mutex<Vec<u64>> = Mutex::new(Vec::new());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.threads.max(1))
        .build()
        .map_err(|e| EngineError::Parallel(e.to_string()))?;

    pool.install(|| {
        (0..params.window_evens).into_par_iter().for_each(|i| {
            let n = params.n_start + 2 * i;
            if primality::has_gear_witness(n, params.gear) {
                covered.fetch_add(1, Ordering::Relaxed);
            } else if params.miss_cap > 0 {
                let mut buf = misses.lock().unwrap_or_else(PoisonError::into_inner);
                if buf.len() < params.miss_cap {
                    buf.push(n);
                }
            }
        });
    });

    let covered = covered.into_inner();
    let mut misses = misses.into_inner().unwrap_or_else(PoisonError::into_inner);
    misses.sort_unstable(); // parallel arrival order is not deterministic

    let report = SegmentReport {
        index: 0,
        n_start: params.n_start,
        n_end,
        covered,
        total_evens: params.window_evens,
        pct: SegmentReport::coverage_pct(covered, params.window_evens),
        seconds: started.elapsed().as_secs_f64(),
    };
    output::write_report(
        &output::window_report_path(params.out_dir, params.n_start, params.window_evens),
        &report,
    )?;
    if !misses.is_empty() {
        output::write_miss_list(
            &output::window_misses_path(params.out_dir, params.n_start, params.window_evens),
            &misses,
        )?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sieve::gear_primes;

    #[test]
    fn test_window_fully_covered() {
        // Minimal Goldbach witnesses below 43532 never exceed 211, so 50
        // odd gear primes (up to 233) cover this whole window.
        let dir = tempfile::tempdir().unwrap();
        let gear = gear_primes(50);
        let report = run_window(&WindowParams {
            n_start: 10_000,
            window_evens: 100,
            gear: &gear,
            threads: 2,
            miss_cap: 16,
            out_dir: dir.path(),
        })
        .unwrap();

        assert_eq!(report.covered, 100);
        assert_eq!(report.total_evens, 100);
        assert_eq!(report.pct, 100.0);
        assert_eq!((report.n_start, report.n_end), (10_000, 10_198));
        assert!(output::window_report_path(dir.path(), 10_000, 100).exists());
        assert!(!output::window_misses_path(dir.path(), 10_000, 100).exists());
    }

    #[test]
    fn test_window_misses_sorted_and_bounded() {
        let dir = tempfile::tempdir().unwrap();
        // Gear {3} over 90..98: only 92 has a witness (92 - 3 = 89).
        let report = run_window(&WindowParams {
            n_start: 90,
            window_evens: 5,
            gear: &[3],
            threads: 4,
            miss_cap: 3,
            out_dir: dir.path(),
        })
        .unwrap();

        assert_eq!(report.covered, 1);
        let body =
            std::fs::read_to_string(output::window_misses_path(dir.path(), 90, 5)).unwrap();
        let misses: Vec<u64> = body.lines().map(|l| l.parse().unwrap()).collect();
        assert_eq!(misses.len(), 3); // 4 misses capped at 3
        assert!(misses.windows(2).all(|w| w[0] < w[1]));
        assert!(misses.iter().all(|n| [90, 94, 96, 98].contains(n)));
    }

    #[test]
    fn test_window_loaded_back_as_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let gear = gear_primes(50);
        let report = run_window(&WindowParams {
            n_start: 20_000,
            window_evens: 8,
            gear: &gear,
            threads: 1,
            miss_cap: 0,
            out_dir: dir.path(),
        })
        .unwrap();
        let path = output::window_report_path(dir.path(), 20_000, 8);
        assert_eq!(output::load_report(&path), Some(report));
    }
}
