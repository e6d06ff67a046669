use clap::{Parser, ValueEnum};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Dense verification of every even in [4, limit] via the segmented
    /// coverage bitset.
    Sieve,
    /// Sparse verification of a window of evens via per-even Miller-Rabin
    /// witness search.
    Mr,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Sieve => write!(f, "sieve"),
            Mode::Mr => write!(f, "mr"),
        }
    }
}

/// Empirical verification of the even Goldbach conjecture by fixed-gear
/// witness reduction: an even n counts as covered when some small odd prime
/// q in the gear makes n - q prime.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Execution regime.
    #[arg(long, value_enum, default_value_t = Mode::Sieve)]
    pub mode: Mode,

    /// L: largest even to verify (sieve mode).
    #[arg(long)]
    pub limit: Option<u64>,

    /// First even of the window (mr mode). Must be even and > 0.
    #[arg(long = "startN")]
    pub start_n: Option<u64>,

    /// Number of evens in the window (mr mode).
    #[arg(long = "windowEvens")]
    pub window_evens: Option<u64>,

    /// K: gear cardinality (first K odd primes).
    #[arg(long, default_value_t = 310)]
    pub gear: usize,

    /// Outer parallelism hint. Defaults to the available hardware threads.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Requested evens per segment (clamped to the platform cap).
    #[arg(long = "segmentEvens", default_value_t = 100_000_000)]
    pub segment_evens: u64,

    /// Upper bound on segments verified concurrently.
    #[arg(long = "maxConcurrentSegments", default_value_t = 1)]
    pub max_concurrent_segments: usize,

    /// T: worker threads inside one segment or window. Defaults to
    /// --threads.
    #[arg(long = "threadsInside")]
    pub threads_inside: Option<usize>,

    /// Miss sample cap per segment/window; 0 disables miss recording.
    #[arg(long, default_value_t = 1000)]
    pub misses: usize,

    /// Skip segments whose audit file already exists.
    #[arg(long)]
    pub resume: bool,

    /// Cross-check segment boundaries against the Miller-Rabin witness
    /// search (on by default; pass `--verifySeams false` to disable).
    #[arg(
        long = "verifySeams",
        default_value_t = true,
        default_missing_value = "true",
        num_args = 0..=1,
        action = clap::ArgAction::Set
    )]
    pub verify_seams: bool,

    /// CPU mask for the process, decimal or 0xHEX. Best effort; a no-op on
    /// platforms without affinity control.
    #[arg(long = "affinityMask")]
    pub affinity_mask: Option<String>,

    /// Directory for audit files.
    #[arg(long = "outputDir", default_value = ".")]
    pub output_dir: String,

    /// Inner sieve block length in numbers; 0 sizes it from the cache
    /// hierarchy.
    #[arg(long = "blockLen", default_value_t = 0)]
    pub block_len: u64,

    /// Seam band width in n-units on each side of a segment.
    #[arg(long = "seamBand", default_value_t = 200)]
    pub seam_band: u64,

    /// Slot-overlap padding; 0 = auto max(1024, 2 * Q_max).
    #[arg(long = "overlapSlots", default_value_t = 0)]
    pub overlap_slots: u64,
}
