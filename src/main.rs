mod affinity;
mod bitset;
mod config;
mod error;
mod output;
mod primality;
mod report;
mod segment;
mod sieve;
mod window;

use clap::Parser;
use indicatif::ProgressBar;
use rayon::prelude::*;

use crate::bitset::CoverageBitset;
use crate::config::{Config, Mode};
use crate::error::EngineError;
use crate::report::{RunTotals, SegmentReport};
use crate::segment::{SegmentOutcome, SegmentParams};
use crate::window::WindowParams;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    // --- Config Validation ---
    if config.gear == 0 {
        eprintln!("Error: --gear must be >= 1.");
        std::process::exit(1);
    }
    if config.segment_evens == 0 {
        eprintln!("Error: --segmentEvens must be >= 1.");
        std::process::exit(1);
    }
    if config.max_concurrent_segments == 0 {
        eprintln!("Error: --maxConcurrentSegments must be >= 1.");
        std::process::exit(1);
    }
    if config.threads == Some(0) || config.threads_inside == Some(0) {
        eprintln!("Error: thread counts must be >= 1.");
        std::process::exit(1);
    }

    let threads = config.threads.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });
    let threads_inside = config.threads_inside.unwrap_or(threads);

    if let Some(raw) = &config.affinity_mask {
        match affinity::parse_mask(raw) {
            Ok(mask) => {
                let applied = affinity::apply_mask(mask);
                println!("[cfg] affinityMask={raw} applied={applied}");
            }
            Err(err) => {
                eprintln!("Error: {err}");
                std::process::exit(1);
            }
        }
    }

    let block_len = if config.block_len > 0 {
        config.block_len
    } else {
        default_block_len()
    };

    let gear = sieve::gear_primes(config.gear);
    println!(
        "[gear] K={} q_min={} q_max={}",
        gear.len(),
        gear.first().copied().unwrap_or(0),
        gear.last().copied().unwrap_or(0)
    );

    match config.mode {
        Mode::Sieve => {
            let Some(limit) = config.limit else {
                eprintln!("Error: --mode sieve requires --limit.");
                std::process::exit(1);
            };
            if limit == 0 {
                eprintln!("Error: --limit must be > 0.");
                std::process::exit(1);
            }
            println!(
                "[cfg] mode=sieve limit={limit} segmentEvens={} maxConcurrentSegments={} \
                 threadsInside={threads_inside} misses={} resume={} verifySeams={} blockLen={block_len}",
                config.segment_evens,
                config.max_concurrent_segments,
                config.misses,
                config.resume,
                config.verify_seams
            );
            let outer_threads = config.max_concurrent_segments.min(threads);
            run_sieve(limit, &config, &gear, outer_threads, threads_inside, block_len)
        }
        Mode::Mr => {
            let Some(start_n) = config.start_n else {
                eprintln!("Error: --mode mr requires --startN.");
                std::process::exit(1);
            };
            let Some(window_evens) = config.window_evens else {
                eprintln!("Error: --mode mr requires --windowEvens.");
                std::process::exit(1);
            };
            if start_n == 0 || start_n % 2 != 0 {
                eprintln!("Error: --startN must be even and > 0.");
                std::process::exit(1);
            }
            if window_evens == 0 {
                eprintln!("Error: --windowEvens must be > 0.");
                std::process::exit(1);
            }
            if start_n.checked_add((window_evens - 1).saturating_mul(2)).is_none() {
                eprintln!("Error: window extends past the 64-bit range.");
                std::process::exit(1);
            }
            println!(
                "[cfg] mode=mr startN={start_n} windowEvens={window_evens} \
                 threadsInside={threads_inside} misses={}",
                config.misses
            );
            run_mr(start_n, window_evens, &config, &gear, threads_inside)
        }
    }
}

/// Default inner sieve block: one mark bit per number, sized to sit in the
/// last-level cache.
fn default_block_len() -> u64 {
    cache_size::l3_cache_size()
        .map(|bytes| (bytes as u64 * 8).clamp(1 << 22, 256_000_000))
        .unwrap_or(32_000_000)
}

fn run_sieve(
    limit: u64,
    config: &Config,
    gear: &[u64],
    outer_threads: usize,
    threads_inside: usize,
    block_len: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = Path::new(&config.output_dir);
    let bitset = CoverageBitset::new(limit / 2 + 1, config.segment_evens)?;
    let segment_count = bitset.segment_count();
    println!(
        "[Bitset] totalSlots={} segmentEvens={} segments={segment_count}",
        bitset.total_slots(),
        bitset.segment_evens()
    );

    let params = SegmentParams {
        bitset: &bitset,
        gear,
        limit,
        block_len,
        threads: threads_inside,
        miss_cap: config.misses,
        verify_seams: config.verify_seams,
        seam_band: config.seam_band,
        overlap_slots: config.overlap_slots,
        out_dir,
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(outer_threads.max(1))
        .build()?;
    let bar = ProgressBar::new(segment_count as u64);
    bar.set_style(
        indicatif::ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>5}/{len:5} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );

    // Ordinary worker errors fail only their segment; a broken bitset
    // invariant is fatal to the whole run, so the first one stops any
    // further dispatch and is propagated once the in-flight segments drain.
    let abort = AtomicBool::new(false);
    let fatal: Mutex<Option<EngineError>> = Mutex::new(None);

    let results: Vec<Option<SegmentOutcome>> = pool.install(|| {
        (0..segment_count)
            .into_par_iter()
            .map(|s| {
                if abort.load(Ordering::Relaxed) {
                    return None;
                }
                if config.resume {
                    if let Some(report) =
                        output::load_report(&output::segment_report_path(out_dir, s))
                    {
                        println!(
                            "[seg {s:05}] resumed: covered={}/{} pct={:.6}",
                            report.covered, report.total_evens, report.pct
                        );
                        bar.inc(1);
                        return Some(SegmentOutcome {
                            report,
                            seam_anomalies: 0,
                        });
                    }
                }
                let outcome = segment::run_segment(&params, s);
                bar.inc(1);
                match outcome {
                    Ok(outcome) => {
                        let r = &outcome.report;
                        println!(
                            "[seg {s:05}] covered={}/{} pct={:.6} ({:.2}s)",
                            r.covered, r.total_evens, r.pct, r.seconds
                        );
                        Some(outcome)
                    }
                    Err(err) => {
                        let invariant_broken = matches!(
                            err,
                            EngineError::WordCountMismatch { .. }
                                | EngineError::CapacityExceeded(_)
                        );
                        if invariant_broken {
                            eprintln!("[seg {s:05}] fatal: {err}");
                            abort.store(true, Ordering::Relaxed);
                            let mut slot = fatal.lock().unwrap_or_else(PoisonError::into_inner);
                            if slot.is_none() {
                                *slot = Some(err);
                            }
                        } else {
                            eprintln!("[seg {s:05}] failed: {err}");
                        }
                        None
                    }
                }
            })
            .collect()
    });
    bar.finish_and_clear();

    if let Some(err) = fatal.into_inner().unwrap_or_else(PoisonError::into_inner) {
        return Err(err.into());
    }

    let mut totals = RunTotals::default();
    let mut anomalies = 0usize;
    for outcome in results.iter().flatten() {
        totals.absorb(&outcome.report);
        anomalies += outcome.seam_anomalies;
    }

    let reports: Vec<Option<SegmentReport>> = results
        .iter()
        .map(|o| o.as_ref().map(|o| o.report.clone()))
        .collect();
    output::write_summary(out_dir, &reports)?;

    if anomalies > 0 {
        eprintln!("[TOTAL] seam anomalies: {anomalies} (window math needs investigation)");
    }
    println!(
        "[TOTAL] covered={} total={} pct={:.6} segments={}/{segment_count}",
        totals.covered,
        totals.total_evens,
        totals.pct(),
        totals.segments
    );

    let failed = results.iter().filter(|o| o.is_none()).count();
    if failed > 0 {
        eprintln!("{failed} segment(s) failed; rerun with --resume to retry the rest");
        std::process::exit(1);
    }
    Ok(())
}

fn run_mr(
    start_n: u64,
    window_evens: u64,
    config: &Config,
    gear: &[u64],
    threads_inside: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = window::run_window(&WindowParams {
        n_start: start_n,
        window_evens,
        gear,
        threads: threads_inside,
        miss_cap: config.misses,
        out_dir: Path::new(&config.output_dir),
    })?;

    println!(
        "[window] nStart={} windowEvens={} covered={}/{} pct={:.6} ({:.2}s)",
        report.n_start, report.total_evens, report.covered, report.total_evens, report.pct, report.seconds
    );
    println!(
        "[TOTAL] covered={} total={} pct={:.6}",
        report.covered,
        report.total_evens,
        report.pct
    );
    Ok(())
}
