use crate::bitset::CoverageBitset;
use crate::error::{EngineError, Result};
use crate::output;
use crate::primality;
use crate::report::SegmentReport;
use crate::sieve::PrimeWindow;
use std::path::Path;
use std::time::Instant;

/// Everything a segment worker needs besides its index. Shared across the
/// outer dispatch; the bitset capability is logically scoped to one segment
/// per worker by the disjoint slot ranges.
pub struct SegmentParams<'a> {
    pub bitset: &'a CoverageBitset,
    pub gear: &'a [u64],
    pub limit: u64,
    pub block_len: u64,
    pub threads: usize,
    pub miss_cap: usize,
    pub verify_seams: bool,
    /// Seam band width in n-units (evens span band/2 slots on each side).
    pub seam_band: u64,
    /// 0 = auto: max(1024, 2 * Q_max).
    pub overlap_slots: u64,
    pub out_dir: &'a Path,
}

pub struct SegmentOutcome {
    pub report: SegmentReport,
    pub seam_anomalies: usize,
}

/// Run one segment: expand the window, enumerate primes, fan p+q writes out
/// into thread-local words, merge after the join, seam-verify, tally, and
/// persist the audit record.
pub fn run_segment(params: &SegmentParams<'_>, index: usize) -> Result<SegmentOutcome> {
    let started = Instant::now();
    let segment_evens = params.bitset.segment_evens();
    let material_slots = params.limit / 2;

    let idx_start = index as u64 * segment_evens;
    if idx_start >= material_slots {
        // The allocation rounds slots up past the last material even; the
        // spare tail segment has nothing to verify.
        let n_start = (idx_start + 1) * 2;
        let report = SegmentReport {
            index,
            n_start,
            n_end: n_start,
            covered: 0,
            total_evens: 0,
            pct: 100.0,
            seconds: started.elapsed().as_secs_f64(),
        };
        output::write_report(&output::segment_report_path(params.out_dir, index), &report)?;
        return Ok(SegmentOutcome {
            report,
            seam_anomalies: 0,
        });
    }

    let idx_end = (idx_start + segment_evens).min(material_slots) - 1;
    let n_start = ((idx_start + 1) * 2).max(2);
    let n_end = (idx_end + 1) * 2;

    let q_min = params.gear.first().copied().unwrap_or(3);
    let q_max = params.gear.last().copied().unwrap_or(3);
    let overlap = if params.overlap_slots > 0 {
        params.overlap_slots
    } else {
        1024u64.max(2 * q_max)
    };

    // Expanded slot window, then the prime window that can reach any even in
    // the true segment through some gear element.
    let idx_start_x = idx_start.saturating_sub(overlap);
    let idx_end_x = idx_end.saturating_add(overlap).min(material_slots - 1);
    let n_start_x = (idx_start_x + 1) * 2;
    let n_end_x = (idx_end_x + 1) * 2;
    let p_lo = n_start_x.saturating_sub(q_max).max(2);
    let p_hi = n_end_x.saturating_sub(q_min).max(2);

    let seg_primes: Vec<u64> = PrimeWindow::new(p_lo, p_hi, params.block_len).collect();

    let word_count = params.bitset.segment_word_count(index);
    let seg_slots = params.bitset.segment_slots(index);
    let threads = params.threads.max(1);
    let prime_count = seg_primes.len();
    let gear = params.gear;

    // Parallel phase: each worker owns one static slice of the prime list
    // and one private word array. No shared writes until the join below.
    let joined: std::thread::Result<Vec<Vec<u64>>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let chunk = &seg_primes[t * prime_count / threads..(t + 1) * prime_count / threads];
                scope.spawn(move || {
                    let mut words = vec![0u64; word_count];
                    for &p in chunk {
                        for &q in gear {
                            let n = p + q;
                            if n & 1 == 1 {
                                continue;
                            }
                            let idx = n / 2 - 1;
                            if idx < idx_start {
                                continue;
                            }
                            let local = idx - idx_start;
                            if local >= seg_slots {
                                continue;
                            }
                            words[(local / 64) as usize] |= 1u64 << (local % 64);
                        }
                    }
                    words
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect()
    });
    let locals = joined
        .map_err(|_| EngineError::Parallel(format!("segment {index}: fan-out worker panicked")))?;

    // The scope join is the barrier: every thread-local write above
    // happened-before these single-threaded merges.
    for words in &locals {
        params.bitset.merge_segment(index, words)?;
    }

    let seam_anomalies = if params.verify_seams {
        verify_seams(params, index, n_start, n_end)
    } else {
        0
    };

    // Tally. The first segment excludes the trivial evens 2 and 4 from the
    // statistics.
    let effective_n_start = if index == 0 { n_start.max(6) } else { n_start };
    let mut covered = 0u64;
    let mut misses = Vec::new();
    {
        let bits = params.bitset.segment_bits(index);
        let mut n = effective_n_start;
        while n <= n_end {
            let local = (n / 2 - 1 - idx_start) as usize;
            if bits[local] {
                covered += 1;
            } else if params.miss_cap > 0 && misses.len() < params.miss_cap {
                misses.push(n);
            }
            n += 2;
        }
    }
    let total_evens = if effective_n_start > n_end {
        0
    } else {
        (n_end - effective_n_start) / 2 + 1
    };

    let report = SegmentReport {
        index,
        n_start,
        n_end,
        covered,
        total_evens,
        pct: SegmentReport::coverage_pct(covered, total_evens),
        seconds: started.elapsed().as_secs_f64(),
    };
    output::write_report(&output::segment_report_path(params.out_dir, index), &report)?;
    if !misses.is_empty() {
        output::write_miss_list(&output::segment_misses_path(params.out_dir, index), &misses)?;
    }

    Ok(SegmentOutcome {
        report,
        seam_anomalies,
    })
}

/// Cross-check the first and last evens of the segment against the
/// Miller-Rabin witness search. An unset bit with an existing witness means
/// the window math under-counted somewhere; the finding is diagnostic only
/// and never changes the tally.
fn verify_seams(params: &SegmentParams<'_>, index: usize, n_start: u64, n_end: u64) -> usize {
    let band = params.seam_band.max(2);

    let mut anomalies = 0;
    let low_band = (n_start.max(6), n_start.saturating_add(band).min(n_end));
    let high_band = (n_start.max(n_end.saturating_sub(band - 2)), n_end);
    for (from, to) in [low_band, high_band] {
        let mut n = from + from % 2;
        while n <= to {
            if !params.bitset.get(n) && primality::has_gear_witness(n, params.gear) {
                eprintln!("[seg {index:05}] seam anomaly: n={n} has a gear witness but is unmarked");
                anomalies += 1;
            }
            n += 2;
        }
    }
    anomalies
}
