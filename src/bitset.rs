use crate::error::{EngineError, Result};
use bitvec::prelude::*;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Largest number of even slots a single segment may own. The smaller of the
/// 2e9 policy cap and the 2^31-word addressing bound.
pub const SEGMENT_EVENS_CAP: u64 = {
    let word_bound = (1u64 << 31) * 64;
    if word_bound < 2_000_000_000 {
        word_bound
    } else {
        2_000_000_000
    }
};

/// Slot index of an even n: idx(n) = n/2 - 1. Evens 2, 4, 6, ... occupy
/// slots 0, 1, 2, ...
#[inline]
pub fn slot_index(n: u64) -> u64 {
    n / 2 - 1
}

/// Segmented bit array over even slots. Segment s owns the global slot range
/// [s*E, s*E + EvensHere(s)); the last segment may be shorter. Bits past
/// EvensHere in a segment's final word stay zero: writers bound their slot
/// index by the segment's slot count, never by its word capacity.
///
/// Hot-path writes never touch this structure. Workers fill thread-local
/// word arrays and hand them to `merge_segment` after their join, so each
/// per-segment mutex is only ever taken uncontended.
pub struct CoverageBitset {
    segment_evens: u64,
    total_slots: u64,
    segments: Vec<Mutex<BitVec<u64, Lsb0>>>,
}

impl CoverageBitset {
    pub fn new(total_slots: u64, requested_segment_evens: u64) -> Result<Self> {
        let segment_evens = requested_segment_evens.clamp(1, SEGMENT_EVENS_CAP);
        let segment_count = total_slots.div_ceil(segment_evens);
        let segment_count = usize::try_from(segment_count).map_err(|_| {
            EngineError::CapacityExceeded(format!(
                "{segment_count} segments of {segment_evens} evens exceed addressable bounds"
            ))
        })?;
        if usize::try_from(total_slots).is_err() {
            return Err(EngineError::CapacityExceeded(format!(
                "{total_slots} even slots exceed addressable bounds"
            )));
        }

        let segments = (0..segment_count as u64)
            .map(|s| {
                let slots_here = segment_evens.min(total_slots - s * segment_evens);
                Mutex::new(bitvec![u64, Lsb0; 0; slots_here as usize])
            })
            .collect();

        Ok(Self {
            segment_evens,
            total_slots,
            segments,
        })
    }

    pub fn segment_evens(&self) -> u64 {
        self.segment_evens
    }

    pub fn total_slots(&self) -> u64 {
        self.total_slots
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Slots owned by segment s (EvensHere).
    pub fn segment_slots(&self, s: usize) -> u64 {
        self.guard(s).len() as u64
    }

    /// 64-bit words owned by segment s.
    pub fn segment_word_count(&self, s: usize) -> usize {
        self.guard(s).len().div_ceil(64)
    }

    fn guard(&self, s: usize) -> MutexGuard<'_, BitVec<u64, Lsb0>> {
        self.segments[s].lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock segment s for single-threaded reading (seam verify, tally).
    pub fn segment_bits(&self, s: usize) -> MutexGuard<'_, BitVec<u64, Lsb0>> {
        self.guard(s)
    }

    fn address(&self, n: u64) -> Option<(usize, usize)> {
        if n < 2 || n % 2 != 0 {
            return None;
        }
        let idx = slot_index(n);
        if idx >= self.total_slots {
            return None;
        }
        Some(((idx / self.segment_evens) as usize, (idx % self.segment_evens) as usize))
    }

    /// Mark the slot for even n. Out-of-range or odd n is a no-op.
    pub fn set(&self, n: u64) {
        if let Some((s, local)) = self.address(n) {
            self.guard(s).set(local, true);
        }
    }

    pub fn get(&self, n: u64) -> bool {
        match self.address(n) {
            Some((s, local)) => self.guard(s)[local],
            None => false,
        }
    }

    /// OR a thread-local word array into segment s. The only sanctioned
    /// multi-writer path; callers invoke it strictly after the join that
    /// ordered every thread-local write.
    pub fn merge_segment(&self, s: usize, local_words: &[u64]) -> Result<()> {
        let mut bits = self.guard(s);
        let words = bits.as_raw_mut_slice();
        if local_words.len() != words.len() {
            return Err(EngineError::WordCountMismatch {
                segment: s,
                expected: words.len(),
                got: local_words.len(),
            });
        }
        for (word, local) in words.iter_mut().zip(local_words) {
            *word |= local;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_index_mapping() {
        assert_eq!(slot_index(2), 0);
        assert_eq!(slot_index(4), 1);
        assert_eq!(slot_index(100), 49);
    }

    #[test]
    fn test_set_get_round_trip() {
        let bits = CoverageBitset::new(51, 32).unwrap();
        assert!(!bits.get(70));
        bits.set(70);
        assert!(bits.get(70));
        assert!(!bits.get(68));
        assert!(!bits.get(72));
    }

    #[test]
    fn test_out_of_range_is_noop() {
        let bits = CoverageBitset::new(10, 4).unwrap();
        bits.set(2000); // past the last slot
        bits.set(7); // odd
        bits.set(0);
        assert!(!bits.get(2000));
        assert!(!bits.get(7));
        assert!(!bits.get(0));
    }

    #[test]
    fn test_segment_layout_with_short_tail() {
        let bits = CoverageBitset::new(51, 32).unwrap();
        assert_eq!(bits.segment_count(), 2);
        assert_eq!(bits.segment_slots(0), 32);
        assert_eq!(bits.segment_slots(1), 19);
        assert_eq!(bits.segment_word_count(0), 1);
        assert_eq!(bits.segment_word_count(1), 1);
    }

    #[test]
    fn test_requested_evens_clamped() {
        let bits = CoverageBitset::new(100, 0).unwrap();
        assert_eq!(bits.segment_evens(), 1);
        assert_eq!(bits.segment_count(), 100);

        let bits = CoverageBitset::new(100, u64::MAX).unwrap();
        assert_eq!(bits.segment_evens(), SEGMENT_EVENS_CAP);
        assert_eq!(bits.segment_count(), 1);
    }

    #[test]
    fn test_merge_idempotent() {
        let bits = CoverageBitset::new(200, 128).unwrap();
        let mut local = vec![0u64; bits.segment_word_count(0)];
        local[0] = 0b1010_0101;
        bits.merge_segment(0, &local).unwrap();
        let once: Vec<bool> = (0..16).map(|i| bits.get((i + 1) * 2)).collect();
        bits.merge_segment(0, &local).unwrap();
        let twice: Vec<bool> = (0..16).map(|i| bits.get((i + 1) * 2)).collect();
        assert_eq!(once, twice);
        assert!(bits.get(2)); // local bit 0 -> slot 0 -> n = 2
        assert!(!bits.get(4));
        assert!(bits.get(6));
    }

    #[test]
    fn test_merge_word_count_mismatch() {
        let bits = CoverageBitset::new(200, 128).unwrap();
        let wrong = vec![0u64; bits.segment_word_count(0) + 1];
        match bits.merge_segment(0, &wrong) {
            Err(EngineError::WordCountMismatch { segment: 0, .. }) => {}
            other => panic!("expected WordCountMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_merge_is_or_not_overwrite() {
        let bits = CoverageBitset::new(200, 128).unwrap();
        let words = bits.segment_word_count(0);
        let mut a = vec![0u64; words];
        let mut b = vec![0u64; words];
        a[0] = 0b01;
        b[0] = 0b10;
        bits.merge_segment(0, &a).unwrap();
        bits.merge_segment(0, &b).unwrap();
        assert!(bits.get(2));
        assert!(bits.get(4));
    }
}
