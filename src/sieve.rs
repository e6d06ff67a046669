use bitvec::prelude::*;

/// Exact integer square root, safe at the top of the u64 range.
pub fn isqrt(n: u64) -> u64 {
    let mut r = (n as f64).sqrt() as u64;
    while r > 0 && r.checked_mul(r).map_or(true, |v| v > n) {
        r -= 1;
    }
    while (r + 1).checked_mul(r + 1).map_or(false, |v| v <= n) {
        r += 1;
    }
    r
}

/// All primes <= limit via a simple composite-marking sieve.
pub fn base_primes(limit: u64) -> Vec<u64> {
    if limit < 2 {
        return Vec::new();
    }

    let mut sieve = bitvec![u8, Lsb0; 1; (limit + 1) as usize];
    sieve.set(0, false);
    sieve.set(1, false);

    for i in 2..=isqrt(limit) {
        if sieve[i as usize] {
            for j in (i * i..=limit).step_by(i as usize) {
                sieve.set(j as usize, false);
            }
        }
    }

    sieve.iter_ones().map(|i| i as u64).collect()
}

/// An iterator over the primes in [lo, hi], ascending, using base primes up
/// to sqrt(hi) and a fixed-length inner block.
///
/// Each block [bLo, bHi] gets a fresh mark array; for every base prime p the
/// multiples starting at max(p^2, ceil(bLo/p)*p) are marked composite, and
/// the unmarked positions are yielded.
pub struct PrimeWindow {
    hi: u64,
    block_len: u64,
    base_primes: Vec<u64>,
    block_lo: u64,
    marks: BitVec<u64, Lsb0>, // 1 = composite within the current block
    cursor: usize,
}

impl PrimeWindow {
    pub fn new(lo: u64, hi: u64, block_len: u64) -> Self {
        let lo = lo.max(2);
        let base_primes = base_primes(isqrt(hi) + 1);

        let mut window = Self {
            hi,
            block_len: block_len.max(64),
            base_primes,
            block_lo: lo,
            marks: BitVec::new(),
            cursor: 0,
        };
        if lo <= hi {
            window.sieve_block();
        }
        window
    }

    fn sieve_block(&mut self) {
        let b_lo = self.block_lo;
        let b_hi = (b_lo + self.block_len - 1).min(self.hi);
        self.marks = bitvec![u64, Lsb0; 0; (b_hi - b_lo + 1) as usize];

        for &p in &self.base_primes {
            // Base primes are ascending; once p^2 passes the block nothing
            // below it remains to mark.
            if p.checked_mul(p).map_or(true, |sq| sq > b_hi) {
                break;
            }
            let start = (p * p).max(b_lo.div_ceil(p) * p);
            for m in (start..=b_hi).step_by(p as usize) {
                self.marks.set((m - b_lo) as usize, true);
            }
        }
    }
}

impl Iterator for PrimeWindow {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            while self.cursor < self.marks.len() {
                let at = self.cursor;
                self.cursor += 1;
                if !self.marks[at] {
                    return Some(self.block_lo + at as u64);
                }
            }

            let next_lo = self.block_lo.checked_add(self.block_len)?;
            if next_lo > self.hi {
                return None;
            }
            self.block_lo = next_lo;
            self.sieve_block();
            self.cursor = 0;
        }
    }
}

/// The first k odd primes, ascending. Starting the window at 3 keeps 2 out
/// by construction, so gear membership needs no further filtering.
pub fn gear_primes(k: usize) -> Vec<u64> {
    let mut upper = 4096u64;
    loop {
        let gear: Vec<u64> = PrimeWindow::new(3, upper, upper).take(k).collect();
        if gear.len() == k {
            return gear;
        }
        upper *= 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trial_division_is_prime(n: u64) -> bool {
        if n < 2 {
            return false;
        }
        let mut d = 2;
        while d * d <= n {
            if n % d == 0 {
                return false;
            }
            d += 1;
        }
        true
    }

    #[test]
    fn test_base_primes_small() {
        assert_eq!(base_primes(30), vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
        assert_eq!(base_primes(2), vec![2]);
        assert!(base_primes(1).is_empty());
        assert!(base_primes(0).is_empty());
    }

    #[test]
    fn test_isqrt_edges() {
        assert_eq!(isqrt(0), 0);
        assert_eq!(isqrt(1), 1);
        assert_eq!(isqrt(15), 3);
        assert_eq!(isqrt(16), 4);
        assert_eq!(isqrt(u64::MAX), (1u64 << 32) - 1);
    }

    #[test]
    fn test_window_matches_base_sieve() {
        let from_window: Vec<u64> = PrimeWindow::new(2, 1000, 64).collect();
        assert_eq!(from_window, base_primes(1000));
    }

    #[test]
    fn test_window_with_interior_lower_bound() {
        let primes: Vec<u64> = PrimeWindow::new(90, 130, 16).collect();
        assert_eq!(primes, vec![97, 101, 103, 107, 109, 113, 127]);
    }

    #[test]
    fn test_window_high_range_against_oracle() {
        let primes: Vec<u64> = PrimeWindow::new(999_900, 1_000_100, 50).collect();
        let oracle: Vec<u64> = (999_900..=1_000_100)
            .filter(|&n| trial_division_is_prime(n))
            .collect();
        assert_eq!(primes, oracle);
    }

    #[test]
    fn test_window_empty_when_lo_exceeds_hi() {
        assert_eq!(PrimeWindow::new(100, 50, 64).count(), 0);
    }

    #[test]
    fn test_gear_first_odd_primes() {
        assert_eq!(gear_primes(1), vec![3]);
        assert_eq!(gear_primes(5), vec![3, 5, 7, 11, 13]);
    }

    #[test]
    fn test_gear_default_cardinality() {
        let gear = gear_primes(310);
        assert_eq!(gear.len(), 310);
        assert_eq!(gear[0], 3);
        assert!(gear.iter().all(|&q| q % 2 == 1));
        assert!(gear.windows(2).all(|w| w[0] < w[1]));
    }
}
